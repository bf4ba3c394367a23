//! Fail-injecting external keyring client.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use keyloom_core::{Ed25519Signature, PgpFingerprint, SigningKeypair, UnlockedPgpKey};
use keyloom_provision::{GpgClient, GpgKeyInfo, ProvisionError};

type Result<T> = std::result::Result<T, ProvisionError>;

/// Mock GPG tool: a configurable private-key set, with a switch that
/// makes import fail the way a broken local gpg install would.
#[derive(Default)]
pub struct MockGpg {
    keys: Mutex<Vec<(GpgKeyInfo, SigningKeypair)>>,
    fail_import: AtomicBool,
}

impl MockGpg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a private key into the mock keyring.
    pub fn add_key(&self, info: GpgKeyInfo, keypair: SigningKeypair) {
        self.keys.lock().expect("gpg lock").push((info, keypair));
    }

    /// Make subsequent imports fail.
    pub fn fail_imports(&self, fail: bool) {
        self.fail_import.store(fail, Ordering::SeqCst);
    }

    fn find(&self, fingerprint: &PgpFingerprint) -> Result<SigningKeypair> {
        self.keys
            .lock()
            .expect("gpg lock")
            .iter()
            .find(|(info, _)| info.fingerprint == *fingerprint)
            .map(|(_, kp)| kp.clone())
            .ok_or_else(|| ProvisionError::Lookup(format!("gpg: no secret key {fingerprint}")))
    }
}

#[async_trait]
impl GpgClient for MockGpg {
    async fn index_private_keys(&self) -> Result<Vec<GpgKeyInfo>> {
        Ok(self
            .keys
            .lock()
            .expect("gpg lock")
            .iter()
            .map(|(info, _)| info.clone())
            .collect())
    }

    async fn import_key(&self, fingerprint: &PgpFingerprint) -> Result<UnlockedPgpKey> {
        if self.fail_import.load(Ordering::SeqCst) {
            return Err(ProvisionError::Transport(
                "gpg: key export not permitted by this installation".into(),
            ));
        }
        let keypair = self.find(fingerprint)?;
        Ok(UnlockedPgpKey::new(*fingerprint, keypair))
    }

    async fn sign(&self, fingerprint: &PgpFingerprint, message: &[u8]) -> Result<Ed25519Signature> {
        Ok(self.find(fingerprint)?.sign(message))
    }
}
