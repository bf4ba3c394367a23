//! The local secret keyring.
//!
//! Secret key seeds never touch disk in the clear: every entry is
//! sealed under the user's LKS context. The keyring itself is a plain
//! CBOR blob and can be written to or restored from a file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use keyloom_core::{
    DeviceKeys, EncryptionKeypair, Kid, Lks, PgpFingerprint, SealedBox, SigningKeypair, Uid,
    UnlockedPgpKey,
};

use crate::error::{AccountError, Result};

/// What a sealed keyring entry contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    DeviceSigning,
    DeviceEncryption,
    Pgp { fingerprint: PgpFingerprint },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyringEntry {
    kid: Kid,
    kind: EntryKind,
    sealed: SealedBox,
}

/// All sealed secret keys held locally for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretKeyring {
    uid: Uid,
    entries: Vec<KeyringEntry>,
}

impl SecretKeyring {
    /// An empty keyring for a user.
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            entries: Vec::new(),
        }
    }

    /// The user this keyring belongs to.
    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// KIDs of all stored entries.
    pub fn kids(&self) -> Vec<Kid> {
        self.entries.iter().map(|e| e.kid).collect()
    }

    /// The kind of the entry with this KID, if present.
    pub fn kind_of(&self, kid: &Kid) -> Option<&EntryKind> {
        self.entries.iter().find(|e| e.kid == *kid).map(|e| &e.kind)
    }

    /// True if a PGP key with this fingerprint is stored.
    pub fn has_pgp(&self, fingerprint: &PgpFingerprint) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(&e.kind, EntryKind::Pgp { fingerprint: f } if f == fingerprint))
    }

    /// Seal and store a device's signing and encryption keys.
    pub fn insert_device_keys(&mut self, lks: &Lks, keys: &DeviceKeys) -> Result<()> {
        self.check_lks(lks)?;
        let sig_sealed = lks.seal_seed(&keys.signing.seed())?;
        let enc_sealed = lks.seal_seed(&keys.encryption.seed())?;
        self.put(keys.signing.kid(), EntryKind::DeviceSigning, sig_sealed);
        self.put(keys.encryption.kid(), EntryKind::DeviceEncryption, enc_sealed);
        tracing::debug!(sig = %keys.signing.kid(), enc = %keys.encryption.kid(), "stored device keys");
        Ok(())
    }

    /// Seal and store an imported PGP key.
    pub fn insert_pgp_key(&mut self, lks: &Lks, key: &UnlockedPgpKey) -> Result<()> {
        self.check_lks(lks)?;
        let sealed = lks.seal_seed(&key.keypair().seed())?;
        self.put(
            key.kid(),
            EntryKind::Pgp {
                fingerprint: key.fingerprint(),
            },
            sealed,
        );
        tracing::debug!(kid = %key.kid(), "stored imported pgp key");
        Ok(())
    }

    /// Unseal a stored signing key (device or PGP).
    pub fn unseal_signing(&self, lks: &Lks, kid: &Kid) -> Result<SigningKeypair> {
        self.check_lks(lks)?;
        let entry = self.find(kid)?;
        match entry.kind {
            EntryKind::DeviceSigning | EntryKind::Pgp { .. } => {
                let seed = lks.unseal_seed(&entry.sealed)?;
                Ok(SigningKeypair::from_seed(&seed))
            }
            EntryKind::DeviceEncryption => Err(AccountError::KeyNotFound(kid.to_string())),
        }
    }

    /// Unseal a stored encryption key.
    pub fn unseal_encryption(&self, lks: &Lks, kid: &Kid) -> Result<EncryptionKeypair> {
        self.check_lks(lks)?;
        let entry = self.find(kid)?;
        match entry.kind {
            EntryKind::DeviceEncryption => {
                let seed = lks.unseal_seed(&entry.sealed)?;
                Ok(EncryptionKeypair::from_seed(&seed))
            }
            _ => Err(AccountError::KeyNotFound(kid.to_string())),
        }
    }

    /// Write the keyring to a file as CBOR.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| AccountError::KeyringEncode(e.to_string()))?;
        std::fs::write(path, buf)?;
        Ok(())
    }

    /// Read a keyring back from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let buf = std::fs::read(path)?;
        ciborium::from_reader(buf.as_slice())
            .map_err(|e| AccountError::KeyringEncode(e.to_string()))
    }

    fn check_lks(&self, lks: &Lks) -> Result<()> {
        if lks.uid() != self.uid {
            return Err(AccountError::WrongUser);
        }
        Ok(())
    }

    fn find(&self, kid: &Kid) -> Result<&KeyringEntry> {
        self.entries
            .iter()
            .find(|e| e.kid == *kid)
            .ok_or_else(|| AccountError::KeyNotFound(kid.to_string()))
    }

    fn put(&mut self, kid: Kid, kind: EntryKind, sealed: SealedBox) {
        // re-inserting the same key replaces the old entry
        self.entries.retain(|e| e.kid != kid);
        self.entries.push(KeyringEntry { kid, kind, sealed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyloom_core::PassphraseStream;

    fn lks_for(uid: Uid) -> Lks {
        let stream = PassphraseStream::stretch("hunter2", b"salt");
        Lks::from_stream(&stream, uid)
    }

    #[test]
    fn test_device_keys_roundtrip() {
        let uid = Uid::from_bytes([3; 16]);
        let lks = lks_for(uid);
        let keys = DeviceKeys::generate();
        let mut ring = SecretKeyring::new(uid);
        ring.insert_device_keys(&lks, &keys).unwrap();

        let sig = ring.unseal_signing(&lks, &keys.signing.kid()).unwrap();
        assert_eq!(sig.kid(), keys.signing.kid());
        let enc = ring.unseal_encryption(&lks, &keys.encryption.kid()).unwrap();
        assert_eq!(enc.kid(), keys.encryption.kid());
    }

    #[test]
    fn test_kind_mismatch_is_not_found() {
        let uid = Uid::from_bytes([3; 16]);
        let lks = lks_for(uid);
        let keys = DeviceKeys::generate();
        let mut ring = SecretKeyring::new(uid);
        ring.insert_device_keys(&lks, &keys).unwrap();

        assert!(matches!(
            ring.unseal_signing(&lks, &keys.encryption.kid()),
            Err(AccountError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_wrong_user_lks_rejected() {
        let uid = Uid::from_bytes([3; 16]);
        let other = lks_for(Uid::from_bytes([4; 16]));
        let mut ring = SecretKeyring::new(uid);
        assert!(matches!(
            ring.insert_device_keys(&other, &DeviceKeys::generate()),
            Err(AccountError::WrongUser)
        ));
    }

    #[test]
    fn test_save_and_load() {
        let uid = Uid::from_bytes([5; 16]);
        let lks = lks_for(uid);
        let keys = DeviceKeys::generate();
        let mut ring = SecretKeyring::new(uid);
        ring.insert_device_keys(&lks, &keys).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring.cbor");
        ring.save(&path).unwrap();

        let restored = SecretKeyring::load(&path).unwrap();
        assert_eq!(restored.len(), 2);
        let sig = restored.unseal_signing(&lks, &keys.signing.kid()).unwrap();
        assert_eq!(sig.kid(), keys.signing.kid());
    }
}
