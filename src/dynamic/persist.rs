//! Persistence of the dynamic configuration document.
//!
//! # Data Flow
//! ```text
//! publish(next)
//!     → round_trip(next)        (serialize + parse, must compare equal)
//!     → Persistence::persist    (temp file, fsync, rename over document)
//!
//! startup
//!     → Persistence::parse      (None if no document yet)
//! ```
//!
//! # Design Decisions
//! - The document is TOML, like the static server config
//! - Writes never leave a truncated document: the new content is fully
//!   written and synced under a temporary name before it replaces the old one

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dynamic::schema::ConfigSnapshot;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serializing config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config does not survive a serialize/parse round trip")]
    RoundTrip,

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistError {
    fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Storage for the dynamic configuration document.
pub trait Persistence: Send + Sync {
    /// Durably stores `snapshot`, replacing the previous document.
    fn persist(&self, snapshot: &ConfigSnapshot) -> Result<(), PersistError>;

    /// Reads the stored document; `Ok(None)` if none was stored yet.
    fn parse(&self) -> Result<Option<ConfigSnapshot>, PersistError>;
}

pub fn to_document(snapshot: &ConfigSnapshot) -> Result<String, PersistError> {
    Ok(toml::to_string(snapshot)?)
}

pub fn from_document(text: &str) -> Result<ConfigSnapshot, PersistError> {
    Ok(toml::from_str(text)?)
}

/// Serializes and re-parses `snapshot`, failing unless the result is equal.
pub fn round_trip(snapshot: &ConfigSnapshot) -> Result<String, PersistError> {
    let text = to_document(snapshot)?;
    let parsed = from_document(&text)?;
    if parsed != *snapshot {
        return Err(PersistError::RoundTrip);
    }
    Ok(text)
}

/// A TOML document on the local filesystem.
#[derive(Debug, Clone)]
pub struct TomlFile {
    path: PathBuf,
}

impl TomlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Persistence for TomlFile {
    fn persist(&self, snapshot: &ConfigSnapshot) -> Result<(), PersistError> {
        let text = to_document(snapshot)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| PersistError::io("creating directory", dir, e))?;
        }

        let tmp = self.temp_path();
        let write = || -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(PersistError::io("writing", &tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(PersistError::io("replacing", &self.path, e));
        }
        Ok(())
    }

    fn parse(&self) -> Result<Option<ConfigSnapshot>, PersistError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => from_document(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::io("reading", &self.path, e)),
        }
    }
}
