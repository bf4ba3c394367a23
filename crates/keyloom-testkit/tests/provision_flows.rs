//! End-to-end provisioning flows against the mock collaborators.

use keyloom::{ClientKind, DeviceType, Username};
use keyloom_account::PAPER_KEY_MEMORY_TIMEOUT;
use keyloom_core::{DeviceKeys, Kid, PaperKey, PaperPhrase, Uid};
use keyloom_provision::channel::memory::SecretDirection;
use keyloom_provision::{
    GpgKeyInfo, GpgMethod, Identity, IdentityLookup, KeyFamily, ProvisionEngine, ProvisionError,
    ProvisionRequest,
};
use keyloom_testkit::{peer_channel, pgp_material, SecretScript, TestWorld};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn invalid_device_class_fails_before_any_mutation() {
    init_tracing();
    let world = TestWorld::new();
    world.directory.add_user("alice", "hunter2");
    let prov = world.provisioner();

    let err = prov
        .provision("paper", ClientKind::Cli, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidArgument(_)));

    let account = prov.account().await;
    assert!(!account.logged_in());
    assert!(account.username().is_none());
    assert!(account.keyring().is_none());
    // nothing was ever shown to the user
    assert!(world.prompts.devices_offered().is_empty());
    assert!(world.prompts.successes().is_empty());
}

#[tokio::test]
async fn brand_new_identity_takes_eldest_path() {
    init_tracing();
    let world = TestWorld::new();
    world.directory.add_user("alice", "hunter2");
    world
        .prompts
        .script_passphrase("hunter2")
        .script_device_name("first light");
    let prov = world.provisioner();

    let outcome = prov
        .provision("desktop", ClientKind::Cli, "alice")
        .await
        .unwrap();
    assert_eq!(outcome.device_name, "first light");

    // bootstrap never offers a device or method selection
    assert!(world.prompts.devices_offered().is_empty());
    assert_eq!(world.prompts.successes().len(), 1);

    let account = prov.account().await;
    assert!(account.logged_in());
    assert_eq!(account.keyring().map(|k| k.len()), Some(2));

    // the paper-key post-condition ran
    assert_eq!(world.prompts.shown_phrases().len(), 1);
    let identity = world
        .directory
        .resolve(&Username::new("alice"))
        .await
        .unwrap();
    assert!(identity.key_family.has_paper_device());
    assert_eq!(identity.key_family.devices.len(), 2);
}

#[tokio::test]
async fn declining_all_devices_falls_through_to_pgp() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("bob");
    world.directory.add_user("bob", "hunter2");
    world
        .directory
        .attach_device(&name, "workstation", DeviceType::Desktop, &DeviceKeys::generate());
    let pgp = pgp_material("hunter2");
    world.directory.attach_pgp(
        &name,
        pgp.key_ref,
        pgp.keypair.public_key(),
        Some(pgp.locked),
    );

    world
        .prompts
        .script_device_choice(None)
        .script_passphrase("hunter2")
        .script_device_name("sidecar");
    let prov = world.provisioner();

    let outcome = prov
        .provision("desktop", ClientKind::Cli, "bob")
        .await
        .unwrap();
    assert_eq!(outcome.device_name, "sidecar");
    assert!(prov.account().await.logged_in());
}

#[tokio::test]
async fn declining_all_devices_without_pgp_is_unavailable() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("carol");
    world.directory.add_user("carol", "hunter2");
    world
        .directory
        .attach_device(&name, "laptop", DeviceType::Desktop, &DeviceKeys::generate());
    world.prompts.script_device_choice(None);
    let prov = world.provisioner();

    let err = prov
        .provision("desktop", ClientKind::Cli, "carol")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::ProvisionUnavailable));
    assert!(!prov.account().await.logged_in());
}

#[tokio::test]
async fn foreign_paper_key_exhausts_retries_with_mismatch() {
    init_tracing();
    let world = TestWorld::new();
    let dave = Username::new("dave");
    world.directory.add_user("dave", "hunter2");
    world.directory.add_user("eve", "qwerty");

    let dave_paper = world.directory.attach_paper(
        &dave,
        "dusty ledger",
        &PaperKey::derive(&PaperPhrase::generate()),
    );
    // eve's phrase is perfectly valid, just not dave's
    let eve_phrase = PaperPhrase::generate();
    world
        .directory
        .attach_paper(&Username::new("eve"), "eve backup", &PaperKey::derive(&eve_phrase));

    world.prompts.script_device_choice(Some(dave_paper));
    for _ in 0..10 {
        world.prompts.script_paper_phrase(eve_phrase.as_str());
    }
    let prov = world.provisioner();

    let err = prov
        .provision("desktop", ClientKind::Cli, "dave")
        .await
        .unwrap_err();
    match err {
        ProvisionError::RetryExhausted { last } => {
            assert!(matches!(*last, ProvisionError::IdentityMismatch { .. }))
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    assert!(!prov.account().await.logged_in());
}

#[tokio::test]
async fn paper_key_cache_expires_when_idle() {
    let world = TestWorld::new();
    let mut account = world.account();

    account.set_unlocked_paper_key(PaperKey::derive(&PaperPhrase::generate()));
    assert!(account.unlocked_paper_sig_key().is_some());
    assert!(account.unlocked_paper_enc_key().is_some());

    world.clock.advance(PAPER_KEY_MEMORY_TIMEOUT + Duration::from_secs(1));
    account.sweep_expired();
    assert!(account.unlocked_paper_sig_key().is_none());
    assert!(account.unlocked_paper_enc_key().is_none());
}

#[tokio::test]
async fn gpg_import_persists_a_signing_key() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("frank");
    world.directory.add_user("frank", "hunter2");
    let pgp = pgp_material("hunter2");
    // key family knows the pgp key but nothing was synced
    world
        .directory
        .attach_pgp(&name, pgp.key_ref, pgp.keypair.public_key(), None);
    world.gpg.add_key(
        GpgKeyInfo {
            fingerprint: pgp.fingerprint,
            user_ids: vec!["Frank <frank@example.com>".into()],
        },
        pgp.keypair.clone(),
    );

    world
        .prompts
        .script_passphrase("hunter2")
        .script_gpg_method(GpgMethod::Import)
        .script_device_name("desk");
    let prov = world.provisioner();

    prov.provision("desktop", ClientKind::Cli, "frank")
        .await
        .unwrap();

    // the imported key is sealed locally and can sign without the tool
    let account = prov.account().await;
    let lks = account.lks().unwrap().clone();
    let ring = account.keyring().unwrap();
    let restored = ring.unseal_signing(&lks, &pgp.keypair.kid()).unwrap();
    let sig = restored.sign(b"offline signature");
    pgp.keypair
        .public_key()
        .verify(b"offline signature", &sig)
        .unwrap();
}

#[tokio::test]
async fn unmatched_local_gpg_keyring_reports_expected_fingerprints() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("judy");
    world.directory.add_user("judy", "hunter2");
    let pgp = pgp_material("hunter2");
    world
        .directory
        .attach_pgp(&name, pgp.key_ref, pgp.keypair.public_key(), None);
    // the local tool holds a private key, just not one of judy's
    let stray = pgp_material("something-else");
    world.gpg.add_key(
        GpgKeyInfo {
            fingerprint: stray.fingerprint,
            user_ids: vec!["Someone Else <else@example.com>".into()],
        },
        stray.keypair,
    );

    world.prompts.script_passphrase("hunter2");
    let prov = world.provisioner();

    let err = prov
        .provision("desktop", ClientKind::Cli, "judy")
        .await
        .unwrap_err();
    match err {
        ProvisionError::NoMatchingGpgKeys {
            fingerprints,
            has_active_device,
        } => {
            assert_eq!(fingerprints, vec![pgp.fingerprint]);
            assert!(!has_active_device);
        }
        other => panic!("expected NoMatchingGpgKeys, got {other:?}"),
    }
    assert!(!prov.account().await.logged_in());
}

#[tokio::test]
async fn gpg_sign_fallback_never_imports_the_key() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("frank");
    world.directory.add_user("frank", "hunter2");
    let pgp = pgp_material("hunter2");
    world
        .directory
        .attach_pgp(&name, pgp.key_ref, pgp.keypair.public_key(), None);
    world.gpg.add_key(
        GpgKeyInfo {
            fingerprint: pgp.fingerprint,
            user_ids: vec!["Frank <frank@example.com>".into()],
        },
        pgp.keypair.clone(),
    );
    world.gpg.fail_imports(true);

    world
        .prompts
        .script_passphrase("hunter2")
        .script_gpg_method(GpgMethod::Import)
        .script_sign_fallback(true)
        .script_device_name("desk");
    let prov = world.provisioner();

    prov.provision("desktop", ClientKind::Cli, "frank")
        .await
        .unwrap();

    // provisioned, but no private pgp key ever landed locally
    let account = prov.account().await;
    assert!(account.logged_in());
    let ring = account.keyring().unwrap();
    assert!(ring.kind_of(&pgp.keypair.kid()).is_none());
}

#[tokio::test]
async fn declining_gpg_sign_fallback_fails_and_rolls_back() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("frank");
    world.directory.add_user("frank", "hunter2");
    let pgp = pgp_material("hunter2");
    world
        .directory
        .attach_pgp(&name, pgp.key_ref, pgp.keypair.public_key(), None);
    world.gpg.add_key(
        GpgKeyInfo {
            fingerprint: pgp.fingerprint,
            user_ids: vec!["Frank <frank@example.com>".into()],
        },
        pgp.keypair.clone(),
    );
    world.gpg.fail_imports(true);

    world
        .prompts
        .script_passphrase("hunter2")
        .script_gpg_method(GpgMethod::Import)
        .script_sign_fallback(false);
    let prov = world.provisioner();

    let err = prov
        .provision("desktop", ClientKind::Cli, "frank")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::GpgImportRefused { .. }));

    // login state from the pgp attempt was rolled back
    let account = prov.account().await;
    assert!(!account.logged_in());
    assert!(account.passphrase_stream().is_none());
}

#[tokio::test]
async fn synced_pgp_unlock_failure_is_fatal_not_a_fallback() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("gina");
    world.directory.add_user("gina", "hunter2");
    // synced key locked under a different passphrase than login
    let pgp = pgp_material("not-the-login-passphrase");
    world.directory.attach_pgp(
        &name,
        pgp.key_ref,
        pgp.keypair.public_key(),
        Some(pgp.locked),
    );

    world.prompts.script_passphrase("hunter2");
    let prov = world.provisioner();

    let err = prov
        .provision("desktop", ClientKind::Cli, "gina")
        .await
        .unwrap_err();
    // precisely a passphrase failure: the external-keyring fallback
    // must not fire for this error class
    assert!(matches!(err, ProvisionError::Passphrase));
    assert!(!prov.account().await.logged_in());
}

#[tokio::test]
async fn canceled_passphrase_prompt_sets_cooldown() {
    init_tracing();
    let world = TestWorld::new();
    world.directory.add_user("heidi", "hunter2");
    world.prompts.script_passphrase_cancel();
    let prov = world.provisioner();

    let err = prov
        .provision("desktop", ClientKind::Cli, "heidi")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Canceled));

    // within the cooldown the prompt is suppressed entirely
    let err = prov
        .provision("desktop", ClientKind::Cli, "heidi")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::SecretPromptSkipped));

    // after the cooldown the flow prompts again and succeeds
    world.clock.advance(Duration::from_secs(301));
    world
        .prompts
        .script_passphrase("hunter2")
        .script_device_name("patience");
    prov.provision("desktop", ClientKind::Cli, "heidi")
        .await
        .unwrap();
}

#[tokio::test]
async fn eldest_invariant_violation_is_fatal() {
    init_tracing();
    let world = TestWorld::new();
    let engine = ProvisionEngine::new(world.deps());
    let mut account = world.account();

    // an identity claiming a founding key but presenting no family
    let request = ProvisionRequest {
        device_class: keyloom::DeviceClass::Desktop,
        client_kind: ClientKind::Cli,
        identity: Identity {
            uid: Uid::from_bytes([1; 16]),
            username: Username::new("ivan"),
            eldest_kid: Some(Kid::from_bytes([2; 32])),
            key_family: KeyFamily::default(),
        },
    };
    let err = engine.run(&mut account, &request).await.unwrap_err();
    assert!(matches!(err, ProvisionError::EldestKeyExists));
}

#[tokio::test]
async fn provisioning_twice_without_logout_is_rejected() {
    init_tracing();
    let world = TestWorld::new();
    world.directory.add_user("alice", "hunter2");
    world
        .prompts
        .script_passphrase("hunter2")
        .script_device_name("only one");
    let prov = world.provisioner();

    prov.provision("desktop", ClientKind::Cli, "alice")
        .await
        .unwrap();
    let err = prov
        .provision("desktop", ClientKind::Cli, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::DeviceAlreadyProvisioned));
}

#[tokio::test]
async fn peer_exchange_then_paper_key_roundtrip() -> anyhow::Result<()> {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("grace");
    world.directory.add_user("grace", "hunter2");
    let homebase = world.directory.attach_device(
        &name,
        "homebase",
        DeviceType::Desktop,
        &DeviceKeys::generate(),
    );

    let channel = peer_channel(
        world.directory.clone(),
        &name,
        "hunter2",
        SecretDirection::PeerReadsOurs,
    );
    let prov = world.provisioner_with_channel(channel);

    // leg 1: provision a phone from the existing desktop
    world
        .prompts
        .script_device_choice(Some(homebase))
        .script_device_name("fieldkit")
        .script_secret(SecretScript::Dismiss);
    let outcome = prov.provision("mobile", ClientKind::Gui, "grace").await?;
    assert_eq!(outcome.device_name, "fieldkit");

    // the engine backfilled a paper key and displayed its phrase
    let phrases = world.prompts.shown_phrases();
    assert_eq!(phrases.len(), 1);
    let paper_phrase = phrases[0].clone();

    prov.logout().await;

    // leg 2: recover onto a new device using that paper key,
    // first trying a taken name and getting re-prompted
    let identity = world.directory.resolve(&name).await?;
    let paper_device = identity
        .key_family
        .devices
        .iter()
        .find(|d| d.device_type == DeviceType::Paper)
        .expect("paper device registered")
        .id;
    world
        .prompts
        .script_device_choice(Some(paper_device))
        .script_paper_phrase(&paper_phrase)
        .script_device_name("fieldkit")
        .script_device_name("skiff");
    let outcome = prov.provision("desktop", ClientKind::Cli, "grace").await?;
    assert_eq!(outcome.device_name, "skiff");

    // no second paper key was minted
    assert_eq!(world.prompts.shown_phrases().len(), 1);

    let identity = world.directory.resolve(&name).await?;
    let non_paper = identity
        .key_family
        .devices
        .iter()
        .filter(|d| d.device_type != DeviceType::Paper)
        .count();
    assert!(non_paper >= 2);
    let mut names: Vec<_> = identity
        .key_family
        .devices
        .iter()
        .map(|d| d.name.to_lowercase())
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), identity.key_family.devices.len());
    Ok(())
}

#[tokio::test]
async fn canceling_the_secret_display_stops_the_exchange() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("peggy");
    world.directory.add_user("peggy", "hunter2");
    let desk = world.directory.attach_device(
        &name,
        "desk",
        DeviceType::Desktop,
        &DeviceKeys::generate(),
    );

    // the provisionee side would wait forever for a typed secret; the
    // cancel must reach it or this test never finishes
    let channel = peer_channel(
        world.directory.clone(),
        &name,
        "hunter2",
        SecretDirection::UserTypesPeers(keyloom::ExchangeSecret::generate()),
    );
    let prov = world.provisioner_with_channel(channel);

    world
        .prompts
        .script_device_choice(Some(desk))
        .script_device_name("porch")
        .script_secret(SecretScript::Cancel);

    let err = prov
        .provision("mobile", ClientKind::Gui, "peggy")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Canceled));

    // the half-started exchange was rolled back and nothing registered
    let account = prov.account().await;
    assert!(!account.logged_in());
    assert!(world.prompts.successes().is_empty());
    let identity = world.directory.resolve(&name).await.unwrap();
    assert_eq!(identity.key_family.devices.len(), 1);
}

#[tokio::test]
async fn typed_peer_secret_completes_the_exchange() {
    init_tracing();
    let world = TestWorld::new();
    let name = Username::new("oscar");
    world.directory.add_user("oscar", "hunter2");
    let desk = world.directory.attach_device(
        &name,
        "desk",
        DeviceType::Desktop,
        &DeviceKeys::generate(),
    );

    // this time the user transcribes the secret shown on the peer
    let peers_secret = keyloom::ExchangeSecret::generate();
    let channel = peer_channel(
        world.directory.clone(),
        &name,
        "hunter2",
        SecretDirection::UserTypesPeers(peers_secret.clone()),
    );
    let prov = world.provisioner_with_channel(channel);

    world
        .prompts
        .script_device_choice(Some(desk))
        .script_device_name("porch")
        .script_secret(SecretScript::Type(peers_secret));
    let outcome = prov
        .provision("mobile", ClientKind::Gui, "oscar")
        .await
        .unwrap();
    assert_eq!(outcome.device_name, "porch");
    assert!(prov.account().await.logged_in());
}
