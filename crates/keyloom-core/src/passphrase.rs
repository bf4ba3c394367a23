//! Passphrase stretching and local key security (LKS).
//!
//! The passphrase stream is the stretched form of the user's
//! passphrase. Local-key-security material is a deterministic function
//! of the stream plus the user id; it seals device key seeds at rest.
//! Both are secret material and are wiped on drop.
//!
//! Blake3 `derive_key` stands in for the production password-stretching
//! KDF, which is an external primitive with its own parameters.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::EncryptionKeypair;
use crate::error::CoreError;
use crate::types::Uid;

/// The stretched passphrase, cached per login.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PassphraseStream {
    material: [u8; 64],
}

impl PassphraseStream {
    /// Stretch a passphrase with the login salt.
    pub fn stretch(passphrase: &str, salt: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("keyloom-passphrase-stretch-v1");
        hasher.update(salt);
        hasher.update(passphrase.as_bytes());
        let mut material = [0u8; 64];
        hasher.finalize_xof().fill(&mut material);
        Self { material }
    }

    /// Derive the LKS client half for a user.
    pub fn lks_client_half(&self, uid: &Uid) -> Zeroizing<[u8; 32]> {
        let mut hasher = blake3::Hasher::new_derive_key("keyloom-lks-client-half-v1");
        hasher.update(&self.material);
        hasher.update(uid.as_bytes());
        Zeroizing::new(*hasher.finalize().as_bytes())
    }
}

impl std::fmt::Debug for PassphraseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the material
        f.write_str("PassphraseStream(..)")
    }
}

/// A 256-bit sealing key for ChaCha20-Poly1305.
#[derive(Clone)]
pub struct SealKey(Zeroizing<[u8; 32]>);

impl SealKey {
    /// Derive a sealing key from secret input under a context string.
    pub fn derive(context: &str, secret: &[u8], extra: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(context);
        hasher.update(secret);
        hasher.update(extra);
        Self(Zeroizing::new(*hasher.finalize().as_bytes()))
    }

    /// Seal a plaintext under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBox, CoreError> {
        let cipher = ChaCha20Poly1305::new_from_slice(self.0.as_ref())
            .map_err(|e| CoreError::SealError(e.to_string()))?;
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CoreError::SealError(e.to_string()))?;
        Ok(SealedBox { nonce, ciphertext })
    }

    /// Open a sealed box. Fails if the key is wrong or the box corrupt.
    pub fn unseal(&self, sealed: &SealedBox) -> Result<Zeroizing<Vec<u8>>, CoreError> {
        let cipher = ChaCha20Poly1305::new_from_slice(self.0.as_ref())
            .map_err(|e| CoreError::SealError(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_ref())
            .map(Zeroizing::new)
            .map_err(|_| CoreError::UnsealError)
    }
}

/// Nonce plus ciphertext, as produced by [`SealKey::seal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Local-key-security context: seals key seeds at rest for one user.
///
/// Freshness invariant: LKS is a pure function of the passphrase stream
/// (or a paper encryption key) plus the uid, so clearing the stream
/// cache must also discard the LKS context.
#[derive(Clone)]
pub struct Lks {
    key: SealKey,
    uid: Uid,
}

impl Lks {
    /// Derive LKS material from a cached passphrase stream.
    pub fn from_stream(stream: &PassphraseStream, uid: Uid) -> Self {
        let half = stream.lks_client_half(&uid);
        Self {
            key: SealKey::derive("keyloom-lks-seal-v1", half.as_ref(), uid.as_bytes()),
            uid,
        }
    }

    /// Derive LKS material from a paper encryption key.
    ///
    /// Used when provisioning from a paper key, where no passphrase
    /// stream exists yet.
    pub fn from_encryption_key(key: &EncryptionKeypair, uid: Uid) -> Self {
        let seed = key.seed();
        Self {
            key: SealKey::derive("keyloom-lks-seal-v1", seed.as_ref(), uid.as_bytes()),
            uid,
        }
    }

    /// The user this context belongs to.
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Seal a 32-byte key seed.
    pub fn seal_seed(&self, seed: &[u8; 32]) -> Result<SealedBox, CoreError> {
        self.key.seal(seed)
    }

    /// Unseal a 32-byte key seed.
    pub fn unseal_seed(&self, sealed: &SealedBox) -> Result<Zeroizing<[u8; 32]>, CoreError> {
        let plain = self.key.unseal(sealed)?;
        let arr: [u8; 32] = plain.as_slice().try_into().map_err(|_| CoreError::Malformed {
            what: "sealed seed",
            msg: format!("expected 32 bytes, got {}", plain.len()),
        })?;
        Ok(Zeroizing::new(arr))
    }
}

impl std::fmt::Debug for Lks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lks({:?})", self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> Uid {
        Uid::from_bytes([7u8; 16])
    }

    #[test]
    fn test_stretch_deterministic() {
        let a = PassphraseStream::stretch("hunter2", b"salt");
        let b = PassphraseStream::stretch("hunter2", b"salt");
        assert_eq!(*a.lks_client_half(&uid()), *b.lks_client_half(&uid()));
    }

    #[test]
    fn test_stretch_salt_matters() {
        let a = PassphraseStream::stretch("hunter2", b"salt-a");
        let b = PassphraseStream::stretch("hunter2", b"salt-b");
        assert_ne!(*a.lks_client_half(&uid()), *b.lks_client_half(&uid()));
    }

    #[test]
    fn test_lks_seal_roundtrip() {
        let stream = PassphraseStream::stretch("hunter2", b"salt");
        let lks = Lks::from_stream(&stream, uid());
        let seed = [0x5a; 32];
        let sealed = lks.seal_seed(&seed).unwrap();
        assert_eq!(*lks.unseal_seed(&sealed).unwrap(), seed);
    }

    #[test]
    fn test_lks_wrong_context_fails() {
        let lks_a = Lks::from_stream(&PassphraseStream::stretch("a", b"salt"), uid());
        let lks_b = Lks::from_stream(&PassphraseStream::stretch("b", b"salt"), uid());
        let sealed = lks_a.seal_seed(&[1u8; 32]).unwrap();
        assert!(matches!(
            lks_b.unseal_seed(&sealed),
            Err(CoreError::UnsealError)
        ));
    }

    #[test]
    fn test_lks_from_paper_encryption_key() {
        let enc = EncryptionKeypair::from_seed(&[9u8; 32]);
        let lks = Lks::from_encryption_key(&enc, uid());
        let again = Lks::from_encryption_key(&enc, uid());
        let sealed = lks.seal_seed(&[2u8; 32]).unwrap();
        assert_eq!(*again.unseal_seed(&sealed).unwrap(), [2u8; 32]);
    }
}
