//! PGP key material as it appears in provisioning.
//!
//! A synced PGP key arrives from the server as a passphrase-locked
//! blob; an external-keyring key is only ever referenced by
//! fingerprint. Either way the usable form is an [`UnlockedPgpKey`]
//! that can sign the new device into the key family.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Ed25519Signature, SigningKeypair};
use crate::error::CoreError;
use crate::passphrase::{SealKey, SealedBox};
use crate::types::Kid;

/// A 20-byte PGP key fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PgpFingerprint(pub [u8; 20]);

impl PgpFingerprint {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Uppercase hex in groups of four, the way fingerprints are
    /// printed for humans to compare.
    pub fn to_quads(&self) -> String {
        let upper = self.to_hex().to_uppercase();
        upper
            .as_bytes()
            .chunks(4)
            .map(|c| std::str::from_utf8(c).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for PgpFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PgpFingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PgpFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_quads())
    }
}

/// A PGP private key sealed under the user's passphrase, as stored
/// server-side for synced keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedPgpKey {
    fingerprint: PgpFingerprint,
    kid: Kid,
    sealed: SealedBox,
}

impl LockedPgpKey {
    /// Seal a private key under a passphrase.
    pub fn lock(
        fingerprint: PgpFingerprint,
        key: &SigningKeypair,
        passphrase: &str,
    ) -> Result<Self, CoreError> {
        let seal_key = lock_key(passphrase, &fingerprint);
        let sealed = seal_key.seal(key.seed().as_ref())?;
        Ok(Self {
            fingerprint,
            kid: key.kid(),
            sealed,
        })
    }

    /// The key's fingerprint.
    pub fn fingerprint(&self) -> PgpFingerprint {
        self.fingerprint
    }

    /// The key identifier of the wrapped key.
    pub fn kid(&self) -> Kid {
        self.kid
    }

    /// Unlock with the user's passphrase.
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockedPgpKey, CoreError> {
        let seal_key = lock_key(passphrase, &self.fingerprint);
        let seed = seal_key
            .unseal(&self.sealed)
            .map_err(|_| CoreError::WrongPassphrase)?;
        let arr: [u8; 32] = seed.as_slice().try_into().map_err(|_| CoreError::Malformed {
            what: "locked pgp key",
            msg: format!("expected 32-byte seed, got {}", seed.len()),
        })?;
        Ok(UnlockedPgpKey {
            fingerprint: self.fingerprint,
            signing: SigningKeypair::from_seed(&arr),
        })
    }
}

fn lock_key(passphrase: &str, fingerprint: &PgpFingerprint) -> SealKey {
    SealKey::derive(
        "keyloom-pgp-lock-v1",
        passphrase.as_bytes(),
        fingerprint.as_bytes(),
    )
}

/// A decrypted PGP private key, able to sign a new device into the
/// key family.
#[derive(Clone)]
pub struct UnlockedPgpKey {
    fingerprint: PgpFingerprint,
    signing: SigningKeypair,
}

impl UnlockedPgpKey {
    /// Wrap an already-decrypted keypair (the external-keyring import
    /// path produces these directly).
    pub fn new(fingerprint: PgpFingerprint, signing: SigningKeypair) -> Self {
        Self {
            fingerprint,
            signing,
        }
    }

    /// The key's fingerprint.
    pub fn fingerprint(&self) -> PgpFingerprint {
        self.fingerprint
    }

    /// The key identifier.
    pub fn kid(&self) -> Kid {
        self.signing.kid()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.signing.sign(message)
    }

    /// The underlying keypair, for sealing into a local keyring.
    pub fn keypair(&self) -> &SigningKeypair {
        &self.signing
    }
}

impl fmt::Debug for UnlockedPgpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnlockedPgpKey({:?})", self.fingerprint)
    }
}
