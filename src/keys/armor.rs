//! PEM armor of key files.
//!
//! Key files carry a `Note` header describing where the key came from.
//! Header values cannot contain colons.

use pem::{EncodeConfig, LineEnding, Pem, PemError};
use thiserror::Error;

pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

pub const NOTE_HEADER: &str = "Note";

#[derive(Debug, Error)]
pub enum ArmorError {
    #[error(transparent)]
    Pem(#[from] PemError),

    #[error("expected a {PRIVATE_KEY_LABEL:?} pem block, found {0:?}")]
    Label(String),
}

/// PEM document holding PKCS#8 `der`, annotated with `note`.
pub fn encode_private_key(der: &[u8], note: &str) -> Result<String, ArmorError> {
    let mut block = Pem::new(PRIVATE_KEY_LABEL, der);
    block.headers_mut().add(NOTE_HEADER, note)?;
    let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
    Ok(pem::encode_config(&block, config))
}

/// Decodes the first PEM block in `input`, which must hold a private key.
pub fn decode_private_key(input: &[u8]) -> Result<Pem, ArmorError> {
    let block = pem::parse(input)?;
    if block.tag() != PRIVATE_KEY_LABEL {
        return Err(ArmorError::Label(block.tag().to_string()));
    }
    Ok(block)
}
