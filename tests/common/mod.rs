//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use mailconf::address::{Address, DestinationAddress, Domain, Localpart};
use mailconf::collab::{MemoryCredentialStore, MemoryQueue};
use mailconf::dynamic::schema::{ConfigSnapshot, Destination, DomainConfig};
use mailconf::dynamic::{Persistence, PersistError, TomlFile};
use mailconf::keys::KeyMaterialManager;
use mailconf::{Admin, AdminSettings, ConfigStore};

pub const POSTMASTER: &str = "admin";

/// An admin over a fresh config directory, with in-memory collaborators.
pub struct Harness {
    pub dir: TempDir,
    pub admin: Arc<Admin>,
    pub queue: MemoryQueue,
    pub credentials: MemoryCredentialStore,
    pub fail_persist: Arc<AtomicBool>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fail_persist = Arc::new(AtomicBool::new(false));
        let persistence = FailingPersistence {
            inner: TomlFile::new(dir.path().join("config/domains.toml")),
            fail: fail_persist.clone(),
        };
        let store = ConfigStore::open(
            Box::new(persistence),
            KeyMaterialManager::new(dir.path().join("config")),
            POSTMASTER,
        )
        .unwrap();

        let queue = MemoryQueue::new();
        let credentials = MemoryCredentialStore::new();
        let admin = Arc::new(Admin::new(
            Arc::new(store),
            Arc::new(queue.clone()),
            Arc::new(credentials.clone()),
            AdminSettings {
                hostname: domain("mail.example.org"),
                data_dir: dir.path().join("data"),
                mta_sts_enabled: true,
            },
        ));

        Self {
            dir,
            admin,
            queue,
            credentials,
            fail_persist,
        }
    }

    /// Harness with domain `example.org` (catchall separator `+`, no DKIM)
    /// and account `mjl` owning `mjl@example.org`.
    pub fn seeded() -> Self {
        let h = Self::new();
        h.admin
            .config_save(|snap| {
                let dc = DomainConfig {
                    localpart_catchall_separators: vec!["+".to_string()],
                    ..Default::default()
                };
                *snap = snap.with_domain("example.org", dc);
                *snap = snap.with_account("mjl", account_config("example.org", &["mjl@example.org"]));
                Ok(())
            })
            .unwrap();
        h
    }

    pub fn config_dir(&self) -> PathBuf {
        self.dir.path().join("config")
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.admin.snapshot()
    }

    /// Key files currently in use or pending, excluding retired ones.
    pub fn key_files(&self) -> Vec<PathBuf> {
        list_files(&self.config_dir().join("dkim"))
    }

    pub fn retired_key_files(&self) -> Vec<PathBuf> {
        list_files(&self.config_dir().join("dkim/old"))
    }

    pub fn persisted_document(&self) -> String {
        fs::read_to_string(self.config_dir().join("domains.toml")).unwrap()
    }

    pub fn set_persist_failing(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }
}

/// Persistence that can be told to fail writes.
pub struct FailingPersistence {
    inner: TomlFile,
    fail: Arc<AtomicBool>,
}

impl Persistence for FailingPersistence {
    fn persist(&self, snapshot: &ConfigSnapshot) -> Result<(), PersistError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistError::Io {
                op: "write",
                path: self.inner.path().to_path_buf(),
                source: std::io::Error::other("injected failure"),
            });
        }
        self.inner.persist(snapshot)
    }

    fn parse(&self) -> Result<Option<ConfigSnapshot>, PersistError> {
        self.inner.parse()
    }
}

pub fn account_config(domain: &str, destinations: &[&str]) -> mailconf::dynamic::schema::AccountConfig {
    mailconf::dynamic::schema::AccountConfig {
        domain: domain.to_string(),
        destinations: destinations
            .iter()
            .map(|d| (d.to_string(), Destination::default()))
            .collect(),
        ..Default::default()
    }
}

pub fn domain(s: &str) -> Domain {
    Domain::parse(s).unwrap()
}

pub fn localpart(s: &str) -> Localpart {
    Localpart::parse(s).unwrap()
}

pub fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

pub fn dest(s: &str) -> DestinationAddress {
    DestinationAddress::parse(s).unwrap()
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}
