//! The signer seam: whatever vouches for a new device.
//!
//! Every provisioning path except eldest bootstrap needs an existing
//! key to sign the new device into the family. That key can be a local
//! keypair (paper key, peer-signed device key), an unlocked PGP key, or
//! an external tool acting as a signing oracle.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use keyloom_core::{Ed25519Signature, Kid, PgpFingerprint, SigningKeypair, UnlockedPgpKey};

use crate::error::Result;
use crate::traits::GpgClient;

/// An existing key able to sign a new device into a key family.
#[async_trait]
pub trait DeviceSigner: Send + Sync {
    /// The signer's key identifier.
    fn kid(&self) -> Kid;

    /// Sign a registration statement.
    async fn sign(&self, message: &[u8]) -> Result<Ed25519Signature>;
}

/// A locally held signing keypair.
pub struct KeypairSigner(SigningKeypair);

impl KeypairSigner {
    pub fn new(keypair: SigningKeypair) -> Self {
        Self(keypair)
    }
}

#[async_trait]
impl DeviceSigner for KeypairSigner {
    fn kid(&self) -> Kid {
        self.0.kid()
    }

    async fn sign(&self, message: &[u8]) -> Result<Ed25519Signature> {
        Ok(self.0.sign(message))
    }
}

impl fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeypairSigner({})", self.kid())
    }
}

#[async_trait]
impl DeviceSigner for UnlockedPgpKey {
    fn kid(&self) -> Kid {
        UnlockedPgpKey::kid(self)
    }

    async fn sign(&self, message: &[u8]) -> Result<Ed25519Signature> {
        Ok(UnlockedPgpKey::sign(self, message))
    }
}

/// A signer that never holds the private key: each signature is
/// delegated to the external keyring tool. The sign-don't-import path.
pub struct GpgOracleSigner {
    client: Arc<dyn GpgClient>,
    fingerprint: PgpFingerprint,
    kid: Kid,
}

impl GpgOracleSigner {
    pub fn new(client: Arc<dyn GpgClient>, fingerprint: PgpFingerprint, kid: Kid) -> Self {
        Self {
            client,
            fingerprint,
            kid,
        }
    }
}

#[async_trait]
impl DeviceSigner for GpgOracleSigner {
    fn kid(&self) -> Kid {
        self.kid
    }

    async fn sign(&self, message: &[u8]) -> Result<Ed25519Signature> {
        self.client.sign(&self.fingerprint, message).await
    }
}

impl fmt::Debug for GpgOracleSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpgOracleSigner({:?})", self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keypair_signer_signs() {
        let keypair = SigningKeypair::generate();
        let signer = KeypairSigner::new(keypair.clone());
        assert_eq!(signer.kid(), keypair.kid());

        let sig = signer.sign(b"register device").await.unwrap();
        keypair
            .public_key()
            .verify(b"register device", &sig)
            .unwrap();
    }
}
