//! End-to-end behavior of admin operations against a real store.

mod common;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use common::{addr, dest, domain, localpart, Harness, POSTMASTER};
use mailconf::admin::DkimAddParams;
use mailconf::collab::{MessageFilter, QueueService};
use mailconf::dynamic::index::DestinationRole;
use mailconf::dynamic::schema::{Alias, AliasSettings, DkimAlgorithm, DomainConfig, ReportingConfig, Selector};
use mailconf::dynamic::TomlFile;
use mailconf::keys::KeyMaterialManager;
use mailconf::{AdminError, ConfigStore, RequestError};

fn request(err: AdminError) -> RequestError {
    match err {
        AdminError::Request(e) => e,
        other => panic!("expected request error, got {other}"),
    }
}

#[test]
fn test_domain_lifecycle() {
    let h = Harness::new();
    let example = domain("example.org");

    h.admin
        .domain_add(false, &example, "admin", Some(&localpart("postmaster")))
        .unwrap();

    let year = chrono::Local::now().format("%Y").to_string();
    let (sel_a, sel_b) = (format!("{year}a"), format!("{year}b"));
    let snap = h.snapshot();
    let dc = snap.domain("example.org").unwrap();
    assert_eq!(dc.dkim.sign, vec![sel_a.clone()]);
    assert_eq!(dc.dkim.selectors.len(), 2);
    for sel in [&sel_a, &sel_b] {
        assert_eq!(dc.dkim.selectors[sel.as_str()].algorithm, DkimAlgorithm::Rsa2048);
    }
    assert_eq!(dc.dmarc.as_ref().unwrap().account, "admin");
    assert!(dc.mta_sts.is_some());
    let admin = snap.account("admin").unwrap();
    assert!(admin.destinations.contains_key("postmaster@example.org"));
    assert_eq!(h.key_files().len(), 2);

    // Repeating the call is rejected and leaves no new key files behind.
    let document = h.persisted_document();
    let err = request(
        h.admin
            .domain_add(false, &example, "admin", Some(&localpart("postmaster")))
            .unwrap_err(),
    );
    assert_eq!(err, RequestError::DomainExists(example.clone()));
    assert_eq!(h.key_files().len(), 2);
    assert_eq!(h.persisted_document(), document);

    // The account still has an address in the domain.
    let err = request(h.admin.domain_remove(&example).unwrap_err());
    assert!(matches!(err, RequestError::InvalidConfig(_)), "{err}");
    assert_eq!(h.key_files().len(), 2);
    assert!(h.retired_key_files().is_empty());
}

#[test]
fn test_domain_remove_retires_keys() {
    let h = Harness::seeded();
    h.admin.domain_add(false, &domain("example.com"), "mjl", None).unwrap();

    // Not the postmaster account, so it gets the address explicitly.
    let snap = h.snapshot();
    assert!(snap.account("mjl").unwrap().destinations.contains_key("postmaster@example.com"));
    assert_eq!(snap.domain("example.com").unwrap().tlsrpt.as_ref().unwrap().account, "mjl");
    assert_eq!(h.key_files().len(), 2);

    h.admin.address_remove(&dest("postmaster@example.com")).unwrap();
    h.admin.domain_remove(&domain("example.com")).unwrap();

    assert!(h.snapshot().domain("example.com").is_none());
    assert!(h.key_files().is_empty());
    assert_eq!(h.retired_key_files().len(), 2);
    assert!(h
        .retired_key_files()
        .iter()
        .all(|p| p.to_string_lossy().contains("._domainkey.example.com.")));
}

/// Runs a callback on every "Retired dkim private key" event.
struct OnRetire<F>(F);

struct MessageField(Option<String>);

impl Visit for MessageField {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S, F> Layer<S> for OnRetire<F>
where
    S: tracing::Subscriber,
    F: Fn() + Send + Sync + 'static,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageField(None);
        event.record(&mut message);
        if message.0.as_deref() == Some("Retired dkim private key") {
            (self.0)();
        }
    }
}

fn domain_with_selector(name: &str, sel: Selector) -> DomainConfig {
    let mut dc = DomainConfig::default();
    dc.dkim.selectors.insert(name.to_string(), sel);
    dc.dkim.sign = vec![name.to_string()];
    dc
}

#[test]
fn test_retirement_finishes_before_next_writer() {
    let h = Harness::seeded();
    h.admin.domain_add(false, &domain("example.com"), "mjl", None).unwrap();
    h.admin.address_remove(&dest("postmaster@example.com")).unwrap();

    // Selectors retire in name order; reuse the one that goes last.
    let year = chrono::Local::now().format("%Y").to_string();
    let last = h.snapshot().domain("example.com").unwrap().dkim.selectors[&format!("{year}b")].clone();

    // A writer that starts while the first key is being retired and
    // still wants the second one.
    type Writer = thread::JoinHandle<Result<(), mailconf::AdminError>>;
    let writer: Arc<Mutex<Option<Writer>>> = Arc::default();
    let layer = OnRetire({
        let admin = h.admin.clone();
        let writer = writer.clone();
        move || {
            let mut slot = writer.lock().unwrap();
            if slot.is_some() {
                return;
            }
            let admin = admin.clone();
            let sel = last.clone();
            *slot = Some(thread::spawn(move || {
                admin.config_save(|snap| {
                    *snap = snap.with_domain("other.org", domain_with_selector("reused", sel));
                    Ok(())
                })
            }));
            drop(slot);
            thread::sleep(Duration::from_millis(200));
        }
    });

    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        h.admin.domain_remove(&domain("example.com")).unwrap();
    });

    let handle = writer.lock().unwrap().take().expect("retirement logged");
    let err = request(handle.join().unwrap().unwrap_err());
    assert!(matches!(err, RequestError::InvalidConfig(_)), "{err}");
    assert!(h.snapshot().domain("other.org").is_none());
    assert!(h.key_files().is_empty());
    assert_eq!(h.retired_key_files().len(), 2);
}

#[test]
fn test_shared_key_retired_with_last_domain() {
    let h = Harness::seeded();
    h.admin
        .dkim_add(&domain("example.org"), &domain("sel1"), &DkimAddParams::default())
        .unwrap();
    let shared = h.snapshot().domain("example.org").unwrap().dkim.selectors["sel1"].clone();
    h.admin
        .config_save(|snap| {
            for name in ["example.com", "example.net"] {
                *snap = snap.with_domain(name, domain_with_selector("shared", shared.clone()));
            }
            Ok(())
        })
        .unwrap();
    let key = h.key_files().remove(0);

    h.admin.dkim_remove(&domain("example.org"), &domain("sel1")).unwrap();
    assert!(key.exists());
    assert!(h.retired_key_files().is_empty());

    h.admin.domain_remove(&domain("example.com")).unwrap();
    assert!(key.exists());
    assert!(h.retired_key_files().is_empty());

    h.admin.domain_remove(&domain("example.net")).unwrap();
    assert!(!key.exists());
    let retired = h.retired_key_files();
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].file_name(), key.file_name());
}

#[test]
fn test_domain_add_account_rules() {
    let h = Harness::seeded();
    let err = request(
        h.admin
            .domain_add(false, &domain("example.com"), "mjl", Some(&localpart("mjl")))
            .unwrap_err(),
    );
    assert!(matches!(err, RequestError::Invalid(_)));

    let err = request(h.admin.domain_add(false, &domain("example.com"), "nobody", None).unwrap_err());
    assert!(matches!(err, RequestError::Invalid(_)));
    assert!(h.key_files().is_empty());
}

#[test]
fn test_failed_persist_leaves_no_trace() {
    let h = Harness::seeded();
    let example = domain("example.org");
    let before = h.snapshot();
    let document = h.persisted_document();

    h.set_persist_failing(true);
    let err = h
        .admin
        .dkim_add(&example, &domain("sel1"), &DkimAddParams::default())
        .unwrap_err();
    assert!(!err.is_request(), "{err}");
    assert_eq!(*h.snapshot(), *before);
    assert_eq!(h.persisted_document(), document);
    assert!(h.key_files().is_empty());

    h.set_persist_failing(false);
    h.admin
        .dkim_add(&example, &domain("sel1"), &DkimAddParams::default())
        .unwrap();
    assert_eq!(h.key_files().len(), 1);
    let snap = h.snapshot();
    let sel = &snap.domain("example.org").unwrap().dkim.selectors["sel1"];
    assert_eq!(sel.algorithm, DkimAlgorithm::Ed25519);
    assert!(!sel.dont_seal_headers);
}

#[test]
fn test_rejected_edit_publishes_nothing() {
    let h = Harness::seeded();
    let before = h.snapshot();

    // Caught by snapshot validation: an alias without members.
    let err = request(
        h.admin
            .domain_save("example.org", |dc| {
                dc.aliases.insert("empty".to_string(), Alias::default());
                Ok(())
            })
            .unwrap_err(),
    );
    assert!(matches!(err, RequestError::InvalidConfig(_)));

    // Returned by the edit itself.
    let err = request(
        h.admin
            .account_save("mjl", |acc| {
                acc.rejects_mailbox = "Elsewhere".to_string();
                Err(RequestError::Invalid("changed my mind".to_string()).into())
            })
            .unwrap_err(),
    );
    assert_eq!(err, RequestError::Invalid("changed my mind".to_string()));

    let err = request(h.admin.account_save("nobody", |_| Ok(())).unwrap_err());
    assert_eq!(err, RequestError::UnknownAccount("nobody".to_string()));

    assert_eq!(*h.snapshot(), *before);
}

#[test]
fn test_repeated_operations_are_rejected() {
    let h = Harness::seeded();

    h.admin.account_add("other", &addr("other@example.org")).unwrap();
    let err = request(h.admin.account_add("other", &addr("other2@example.org")).unwrap_err());
    assert_eq!(err, RequestError::AccountExists("other".to_string()));

    h.admin.address_add(&dest("extra@example.org"), "mjl").unwrap();
    let err = request(h.admin.address_add(&dest("Extra@example.org"), "other").unwrap_err());
    assert_eq!(err, RequestError::AddressExists("extra@example.org".to_string()));

    h.admin.address_remove(&dest("extra@example.org")).unwrap();
    let err = request(h.admin.address_remove(&dest("extra@example.org")).unwrap_err());
    assert_eq!(err, RequestError::UnknownAddress("extra@example.org".to_string()));

    h.admin.account_remove("other").unwrap();
    let err = request(h.admin.account_remove("other").unwrap_err());
    assert_eq!(err, RequestError::UnknownAccount("other".to_string()));
}

#[test]
fn test_address_add_checks() {
    let h = Harness::seeded();

    let err = request(h.admin.address_add(&dest("new+tag@example.org"), "mjl").unwrap_err());
    assert!(matches!(err, RequestError::CatchallSeparator { .. }));

    let err = request(h.admin.address_add(&dest("new@example.com"), "mjl").unwrap_err());
    assert_eq!(err, RequestError::UnknownDomain("example.com".to_string()));

    let err = request(h.admin.address_add(&dest("new@example.org"), "nobody").unwrap_err());
    assert_eq!(err, RequestError::UnknownAccount("nobody".to_string()));

    h.admin.address_add(&dest("@example.org"), "mjl").unwrap();
    let err = request(h.admin.address_add(&dest("@example.org"), "mjl").unwrap_err());
    assert_eq!(err, RequestError::AddressExists("@example.org".to_string()));

    h.admin
        .alias_add(
            &addr("team@example.org"),
            Alias {
                addresses: vec!["mjl@example.org".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
    let err = request(h.admin.address_add(&dest("team@example.org"), "mjl").unwrap_err());
    assert_eq!(err, RequestError::AddressIsAlias("team@example.org".to_string()));
}

#[test]
fn test_address_add_keeps_written_form() {
    let h = Harness::seeded();
    h.admin.address_add(&dest("New@example.org"), "mjl").unwrap();
    let snap = h.snapshot();
    let destinations = &snap.account("mjl").unwrap().destinations;
    assert!(destinations.contains_key("New@example.org"));
    assert!(!destinations.contains_key("new@example.org"));

    let err = request(h.admin.address_add(&dest("new@example.org"), "mjl").unwrap_err());
    assert_eq!(err, RequestError::AddressExists("new@example.org".to_string()));

    h.admin.address_remove(&dest("new@example.org")).unwrap();
    assert!(!h.snapshot().account("mjl").unwrap().destinations.contains_key("New@example.org"));
}

#[test]
fn test_account_add_refuses_leftover_directory() {
    let h = Harness::seeded();
    std::fs::create_dir_all(h.dir.path().join("data/accounts/ghost")).unwrap();

    let err = request(h.admin.account_add("ghost", &addr("ghost@example.org")).unwrap_err());
    assert!(matches!(err, RequestError::AccountDirExists { .. }));
    assert!(h.snapshot().account("ghost").is_none());
}

#[test]
fn test_catchall_removal_guarded_by_queue() {
    let h = Harness::seeded();
    h.admin.address_add(&dest("@example.org"), "mjl").unwrap();
    h.queue.enqueue("mjl", addr("someone@example.org"));
    h.queue.enqueue("mjl", addr("mjl@example.org"));

    let err = request(h.admin.address_remove(&dest("@example.org")).unwrap_err());
    assert_eq!(
        err,
        RequestError::QueuedMessages {
            address: "@example.org".to_string(),
            count: 1,
        }
    );

    // The catchall of the same account keeps covering the sender.
    h.admin.address_remove(&dest("mjl@example.org")).unwrap();

    h.queue.fail_messages(&MessageFilter::account("mjl")).unwrap();
    h.admin.address_remove(&dest("@example.org")).unwrap();
    assert!(h.snapshot().account("mjl").unwrap().destinations.is_empty());
}

#[test]
fn test_plain_address_removal_guarded_by_queue() {
    let h = Harness::seeded();
    h.admin.address_add(&dest("sales@example.org"), "mjl").unwrap();
    h.queue.enqueue("mjl", addr("Sales+offers@example.org"));

    let err = request(h.admin.address_remove(&dest("sales@example.org")).unwrap_err());
    assert_eq!(
        err,
        RequestError::QueuedMessages {
            address: "sales@example.org".to_string(),
            count: 1,
        }
    );
    assert!(h
        .snapshot()
        .account("mjl")
        .unwrap()
        .destinations
        .contains_key("sales@example.org"));
}

#[test]
fn test_address_remove_checks_credentials_and_reserved() {
    let h = Harness::seeded();
    h.admin
        .domain_save("example.org", |dc| {
            dc.dmarc = Some(ReportingConfig {
                account: "mjl".to_string(),
                localpart: "dmarcreports".to_string(),
                mailbox: "DMARC".to_string(),
            });
            Ok(())
        })
        .unwrap();

    let err = request(h.admin.address_remove(&dest("dmarcreports@example.org")).unwrap_err());
    assert_eq!(
        err,
        RequestError::ReservedAddress {
            address: "dmarcreports@example.org".to_string(),
            role: DestinationRole::DmarcReports,
        }
    );
    let err = request(h.admin.address_remove(&dest("postmaster@example.org")).unwrap_err());
    assert!(matches!(
        err,
        RequestError::ReservedAddress {
            role: DestinationRole::Postmaster,
            ..
        }
    ));

    h.credentials.add_credential("fp1", "mjl", "MJL+imap@example.org");
    let err = request(h.admin.address_remove(&dest("mjl@example.org")).unwrap_err());
    assert!(matches!(err, RequestError::CredentialInUse { .. }), "{err}");

    let err = request(h.admin.domain_remove(&domain("example.org")).unwrap_err());
    assert!(matches!(err, RequestError::DomainInUse { .. }), "{err}");
}

#[test]
fn test_address_remove_drops_login_addresses() {
    let h = Harness::seeded();
    h.admin.address_add(&dest("extra@example.org"), "mjl").unwrap();
    h.admin
        .account_save("mjl", |acc| {
            acc.from_id_login_addresses = vec!["extra@example.org".to_string(), "mjl@example.org".to_string()];
            Ok(())
        })
        .unwrap();

    h.admin.address_remove(&dest("extra@example.org")).unwrap();
    let snap = h.snapshot();
    let acc = snap.account("mjl").unwrap();
    assert_eq!(acc.from_id_login_addresses, vec!["mjl@example.org".to_string()]);
    assert!(!acc.destinations.contains_key("extra@example.org"));
}

#[test]
fn test_key_retirement_skips_live_files() {
    let h = Harness::seeded();
    let example = domain("example.org");
    h.admin
        .dkim_add(&example, &domain("sel1"), &DkimAddParams::default())
        .unwrap();
    h.admin
        .domain_save("example.org", |dc| {
            let shared = dc.dkim.selectors["sel1"].clone();
            dc.dkim.selectors.insert("sel2".to_string(), shared);
            dc.dkim.sign = vec!["sel1".to_string(), "sel2".to_string()];
            Ok(())
        })
        .unwrap();

    h.admin.dkim_remove(&example, &domain("sel1")).unwrap();
    assert_eq!(h.snapshot().domain("example.org").unwrap().dkim.sign, vec!["sel2".to_string()]);
    assert_eq!(h.key_files().len(), 1);
    assert!(h.retired_key_files().is_empty());

    h.admin.dkim_remove(&example, &domain("sel2")).unwrap();
    assert!(h.key_files().is_empty());
    assert_eq!(h.retired_key_files().len(), 1);

    let err = request(h.admin.dkim_remove(&example, &domain("sel2")).unwrap_err());
    assert!(matches!(err, RequestError::UnknownSelector { .. }));
}

#[test]
fn test_key_retirement_never_overwrites() {
    let h = Harness::seeded();
    let example = domain("example.org");
    h.admin
        .dkim_add(&example, &domain("sel1"), &DkimAddParams::default())
        .unwrap();
    let key = h.key_files().remove(0);
    let old = h.config_dir().join("dkim/old");
    std::fs::create_dir_all(&old).unwrap();
    std::fs::write(old.join(key.file_name().unwrap()), "previous").unwrap();

    h.admin.dkim_remove(&example, &domain("sel1")).unwrap();
    assert!(key.exists());
    assert_eq!(
        std::fs::read_to_string(old.join(key.file_name().unwrap())).unwrap(),
        "previous"
    );
}

#[test]
fn test_dkim_add_checks() {
    let h = Harness::seeded();
    let example = domain("example.org");

    let params = DkimAddParams {
        hash: "md5".to_string(),
        ..Default::default()
    };
    let err = request(h.admin.dkim_add(&example, &domain("sel1"), &params).unwrap_err());
    assert_eq!(err, RequestError::UnsupportedHash("md5".to_string()));

    let params = DkimAddParams {
        algorithm: "dsa".to_string(),
        ..Default::default()
    };
    let err = request(h.admin.dkim_add(&example, &domain("sel1"), &params).unwrap_err());
    assert_eq!(err, RequestError::UnsupportedAlgorithm("dsa".to_string()));

    let err = request(
        h.admin
            .dkim_add(&domain("example.com"), &domain("sel1"), &DkimAddParams::default())
            .unwrap_err(),
    );
    assert_eq!(err, RequestError::UnknownDomain("example.com".to_string()));

    h.admin
        .dkim_add(&example, &domain("sel1"), &DkimAddParams::default())
        .unwrap();
    let err = request(
        h.admin
            .dkim_add(&example, &domain("sel1"), &DkimAddParams::default())
            .unwrap_err(),
    );
    assert!(matches!(err, RequestError::SelectorExists { .. }));
    assert_eq!(h.key_files().len(), 1);
}

#[test]
fn test_alias_keeps_a_member() {
    let h = Harness::seeded();
    let team = addr("team@example.org");
    h.admin
        .alias_add(
            &team,
            Alias {
                addresses: vec!["mjl@example.org".to_string()],
                ..Default::default()
            },
        )
        .unwrap();

    let err = request(
        h.admin
            .alias_addresses_remove(&team, &["mjl@example.org".to_string()])
            .unwrap_err(),
    );
    assert_eq!(err, RequestError::EmptyAlias);

    let err = request(h.admin.address_remove(&dest("mjl@example.org")).unwrap_err());
    assert_eq!(
        err,
        RequestError::LastAliasMember {
            alias: "team@example.org".to_string(),
            address: "mjl@example.org".to_string(),
        }
    );

    h.admin.address_add(&dest("other@example.org"), "mjl").unwrap();
    h.admin
        .alias_addresses_add(&team, &["other@example.org".to_string()])
        .unwrap();
    let err = request(
        h.admin
            .alias_addresses_add(&team, &["Other@example.org".to_string()])
            .unwrap_err(),
    );
    assert!(matches!(err, RequestError::AliasMemberExists { .. }));

    // Removing a member address also removes it from the alias.
    h.admin.address_remove(&dest("mjl@example.org")).unwrap();
    assert_eq!(
        h.admin.alias_get(&team).unwrap().addresses,
        vec!["other@example.org".to_string()]
    );
}

#[test]
fn test_alias_operations() {
    let h = Harness::seeded();
    let team = addr("team@example.org");

    let err = request(h.admin.alias_add(&team, Alias::default()).unwrap_err());
    assert_eq!(err, RequestError::EmptyAlias);

    let err = request(
        h.admin
            .alias_add(
                &team,
                Alias {
                    addresses: vec!["nobody@example.org".to_string()],
                    ..Default::default()
                },
            )
            .unwrap_err(),
    );
    assert_eq!(err, RequestError::UnknownAddress("nobody@example.org".to_string()));

    let err = request(
        h.admin
            .alias_add(
                &addr("mjl@example.org"),
                Alias {
                    addresses: vec!["mjl@example.org".to_string()],
                    ..Default::default()
                },
            )
            .unwrap_err(),
    );
    assert_eq!(err, RequestError::AddressExists("mjl@example.org".to_string()));

    h.admin
        .alias_add(
            &addr("Team@example.org"),
            Alias {
                addresses: vec!["mjl@example.org".to_string()],
                post_public: true,
                ..Default::default()
            },
        )
        .unwrap();
    let err = request(
        h.admin
            .alias_add(
                &team,
                Alias {
                    addresses: vec!["mjl@example.org".to_string()],
                    ..Default::default()
                },
            )
            .unwrap_err(),
    );
    assert_eq!(err, RequestError::AliasExists("team@example.org".to_string()));

    h.admin
        .alias_update(
            &team,
            AliasSettings {
                post_public: false,
                list_members: true,
                allow_msg_from: true,
            },
        )
        .unwrap();
    let alias = h.admin.alias_get(&team).unwrap();
    assert!(!alias.post_public);
    assert!(alias.list_members && alias.allow_msg_from);
    assert_eq!(alias.addresses, vec!["mjl@example.org".to_string()]);

    let err = request(
        h.admin
            .alias_addresses_remove(&team, &["other@example.org".to_string()])
            .unwrap_err(),
    );
    assert!(matches!(err, RequestError::UnknownAliasMember { .. }));

    h.admin.alias_remove(&team).unwrap();
    let err = request(h.admin.alias_remove(&team).unwrap_err());
    assert_eq!(err, RequestError::UnknownAlias("team@example.org".to_string()));
}

#[test]
fn test_account_remove_drains_queue_first() {
    let h = Harness::seeded();
    h.admin.account_add("other", &addr("other@example.org")).unwrap();
    h.queue.enqueue("mjl", addr("mjl@example.org"));
    h.queue.enqueue("other", addr("other@example.org"));
    h.queue.add_webhook("mjl");
    h.queue.suppress("mjl", addr("bounce@example.com"));
    h.credentials.add_credential("fp1", "mjl", "mjl@example.org");
    h.credentials.add_session("mjl");

    h.queue.set_unavailable(true);
    let err = h.admin.account_remove("mjl").unwrap_err();
    assert!(!err.is_request(), "{err}");
    assert!(h.snapshot().account("mjl").is_some());
    assert!(!h.credentials.is_marked_for_removal("mjl"));
    assert_eq!(h.credentials.open_handles("mjl"), 0);
    assert_eq!(h.credentials.sessions("mjl"), 0);

    h.credentials.add_session("mjl");
    h.queue.set_unavailable(false);
    h.admin.account_remove("mjl").unwrap();
    assert!(h.snapshot().account("mjl").is_none());
    assert_eq!(h.queue.message_count(), 1);
    assert_eq!(h.queue.webhook_count(), 0);
    assert!(h.queue.list_suppressions("mjl").unwrap().is_empty());
    assert!(h.credentials.is_marked_for_removal("mjl"));
    assert_eq!(h.credentials.open_handles("mjl"), 0);
    assert_eq!(h.credentials.sessions("mjl"), 0);
}

#[test]
fn test_concurrent_adds_keep_addresses_unique() {
    let h = Harness::seeded();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let admin = &h.admin;
                s.spawn(move || admin.account_add(&format!("acct{i}"), &addr("shared@example.org")))
            })
            .collect();
        handles.into_iter().map(|t| t.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(request(err), RequestError::AddressExists("shared@example.org".to_string()));
    }
    let owners = h
        .snapshot()
        .accounts
        .values()
        .filter(|acc| acc.destinations.contains_key("shared@example.org"))
        .count();
    assert_eq!(owners, 1);
}

#[test]
fn test_readers_do_not_wait_for_writers() {
    let h = Harness::seeded();
    let store = h.admin.store().clone();
    let tx = store.begin_transaction();

    let reader = {
        let store = store.clone();
        thread::spawn(move || store.snapshot())
    };
    assert!(reader.join().unwrap().domain("example.org").is_some());

    let writer = {
        let admin = h.admin.clone();
        thread::spawn(move || admin.address_add(&dest("late@example.org"), "mjl"))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!writer.is_finished());
    assert!(!h.snapshot().account("mjl").unwrap().destinations.contains_key("late@example.org"));

    drop(tx);
    writer.join().unwrap().unwrap();
    assert!(h.snapshot().account("mjl").unwrap().destinations.contains_key("late@example.org"));
}

#[test]
fn test_restart_loads_published_snapshot() {
    let h = Harness::seeded();
    h.admin
        .dkim_add(&domain("example.org"), &domain("sel1"), &DkimAddParams::default())
        .unwrap();
    h.admin.address_add(&dest("@example.org"), "mjl").unwrap();

    let reopened = ConfigStore::open(
        Box::new(TomlFile::new(h.config_dir().join("domains.toml"))),
        KeyMaterialManager::new(h.config_dir()),
        POSTMASTER,
    )
    .unwrap();
    assert_eq!(*reopened.snapshot(), *h.snapshot());
}

#[test]
fn test_startup_refuses_missing_key_file() {
    let h = Harness::seeded();
    h.admin
        .dkim_add(&domain("example.org"), &domain("sel1"), &DkimAddParams::default())
        .unwrap();
    for key in h.key_files() {
        std::fs::remove_file(key).unwrap();
    }

    let result = ConfigStore::open(
        Box::new(TomlFile::new(h.config_dir().join("domains.toml"))),
        KeyMaterialManager::new(h.config_dir()),
        POSTMASTER,
    );
    assert!(matches!(result, Err(mailconf::store::StoreError::Invalid(_))));
}
