//! Ready-made worlds for provisioning tests.

use std::sync::Arc;

use keyloom::Provisioner;
use keyloom_account::{Account, ManualClock};
use keyloom_core::{
    DeviceKeys, LockedPgpKey, PassphraseStream, PgpFingerprint, SigningKeypair, Username,
};
use keyloom_provision::channel::memory::{MemoryChannel, SecretDirection};
use keyloom_provision::{
    EngineDeps, PgpKeyRef, ProvisioneePayload, ProvisionError, SecureChannel,
};

use crate::directory::MockDirectory;
use crate::gpg::MockGpg;
use crate::prompts::ScriptedPrompts;

/// A directory, a prompt script, a gpg mock, and a manual clock,
/// bundled the way most tests want them.
pub struct TestWorld {
    pub directory: Arc<MockDirectory>,
    pub prompts: Arc<ScriptedPrompts>,
    pub gpg: Arc<MockGpg>,
    pub clock: ManualClock,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            directory: Arc::new(MockDirectory::new()),
            prompts: Arc::new(ScriptedPrompts::new()),
            gpg: Arc::new(MockGpg::new()),
            clock: ManualClock::new(),
        }
    }

    /// Engine wiring with a channel that fails if the peer path is
    /// ever reached.
    pub fn deps(&self) -> EngineDeps {
        self.deps_with_channel(dead_channel())
    }

    pub fn deps_with_channel(&self, channel: Arc<dyn SecureChannel>) -> EngineDeps {
        EngineDeps {
            lookup: self.directory.clone(),
            login: self.directory.clone(),
            keygen: self.directory.clone(),
            channel,
            gpg: self.gpg.clone(),
            prompts: self.prompts.clone(),
        }
    }

    /// An account driven by this world's manual clock.
    pub fn account(&self) -> Account {
        Account::new(Arc::new(self.clock.clone()))
    }

    pub fn provisioner(&self) -> Provisioner {
        Provisioner::with_account(self.deps(), self.account())
    }

    pub fn provisioner_with_channel(&self, channel: Arc<dyn SecureChannel>) -> Provisioner {
        Provisioner::with_account(self.deps_with_channel(channel), self.account())
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// A channel for tests that must never reach the peer path.
pub fn dead_channel() -> Arc<dyn SecureChannel> {
    Arc::new(MemoryChannel::new(SecretDirection::PeerReadsOurs, |_| {
        Err(ProvisionError::Transport("no peer available".into()))
    }))
}

/// A loopback channel whose peer side registers the pending device in
/// the directory and hands back signed keys plus the passphrase stream,
/// like a real provisioner device would.
pub fn peer_channel(
    directory: Arc<MockDirectory>,
    username: &Username,
    passphrase: &str,
    direction: SecretDirection,
) -> Arc<dyn SecureChannel> {
    let uid = directory.uid_of(username).expect("unknown user");
    let salt = directory.salt_of(username).expect("unknown user");
    let username = username.clone();
    let passphrase = passphrase.to_string();
    Arc::new(MemoryChannel::new(direction, move |pending| {
        let keys = DeviceKeys::generate();
        directory.register_provisioned_device(
            uid,
            pending.device_id,
            &pending.device_name,
            pending.device_type,
            &keys,
        )?;
        Ok(ProvisioneePayload {
            uid,
            username: username.clone(),
            keys,
            stream: PassphraseStream::stretch(&passphrase, &salt),
        })
    }))
}

/// PGP key material for one user: the keypair, its family reference,
/// and the passphrase-locked form for server-side syncing.
pub struct PgpMaterial {
    pub keypair: SigningKeypair,
    pub fingerprint: PgpFingerprint,
    pub key_ref: PgpKeyRef,
    pub locked: LockedPgpKey,
}

pub fn pgp_material(passphrase: &str) -> PgpMaterial {
    let keypair = SigningKeypair::generate();
    let fingerprint = PgpFingerprint::from_bytes(rand::random::<[u8; 20]>());
    let locked =
        LockedPgpKey::lock(fingerprint, &keypair, passphrase).expect("lock pgp fixture key");
    PgpMaterial {
        key_ref: PgpKeyRef {
            kid: keypair.kid(),
            fingerprint,
        },
        keypair,
        fingerprint,
        locked,
    }
}
