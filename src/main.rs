//! mailconf admin daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     admin client (mailconf-cli, curl)
//!         │
//!         ▼
//!     ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌────────────────┐
//!     │  http    │───▶│  admin   │───▶│ consistency  │    │  collaborators │
//!     │ (axum)   │    │ handlers │───▶│   checks     │◀───│ queue, creds   │
//!     └──────────┘    └────┬─────┘    └──────────────┘    └────────────────┘
//!                          │
//!                          ▼
//!                     ┌──────────┐    ┌──────────────┐
//!                     │  store   │───▶│   dynamic    │──▶ domains.toml
//!                     │ tx lock  │    │ schema/index │
//!                     └────┬─────┘    └──────────────┘
//!                          │
//!                          ▼
//!                     ┌──────────┐
//!                     │   keys   │──▶ dkim/*.privatekey.pem, dkim/old/
//!                     └──────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use mailconf::address::Domain;
use mailconf::collab::{MemoryCredentialStore, MemoryQueue};
use mailconf::config::load_config;
use mailconf::dynamic::TomlFile;
use mailconf::http::AdminServer;
use mailconf::keys::KeyMaterialManager;
use mailconf::lifecycle::signals::spawn_signal_handler;
use mailconf::observability::{logging, metrics};
use mailconf::{Admin, AdminSettings, ConfigStore, Shutdown};

#[derive(Parser)]
#[command(name = "mailconf-admind")]
#[command(about = "Admin daemon for the mail server's dynamic configuration", long_about = None)]
struct Args {
    /// Path to the server configuration file.
    #[arg(short, long, default_value = "mailconf.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mailconf-admind starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = ConfigStore::open(
        Box::new(TomlFile::new(config.dynamic_path())),
        KeyMaterialManager::new(&config.config_dir),
        &config.postmaster.account,
    )?;
    let snapshot = store.snapshot();
    tracing::info!(
        path = %config.dynamic_path().display(),
        domains = snapshot.domains.len(),
        accounts = snapshot.accounts.len(),
        "Configuration loaded"
    );

    let settings = AdminSettings {
        hostname: Domain::parse(&config.hostname)?,
        data_dir: config.data_dir.clone(),
        mta_sts_enabled: config.mta_sts_enabled,
    };
    let admin = Arc::new(Admin::new(
        Arc::new(store),
        Arc::new(MemoryQueue::new()),
        Arc::new(MemoryCredentialStore::new()),
        settings,
    ));

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.admin.bind_address).await?;
    AdminServer::new(admin, &config.admin)
        .run(listener, shutdown.wait())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
