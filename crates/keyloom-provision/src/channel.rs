//! The peer-device exchange channel.
//!
//! The wire protocol of the exchange is out of scope; this module owns
//! only the seam: the exchange secret, the pending-device description,
//! the payload a provisionee receives, and the [`SecureChannel`] trait.
//! A loopback implementation for tests lives in [`memory`].

use async_trait::async_trait;
use rand::RngCore;
use std::fmt;
use tokio::sync::{mpsc, watch};
use zeroize::Zeroize;

use keyloom_core::{
    decode_phrase, encode_phrase, DeviceId, DeviceKeys, DeviceType, PassphraseStream, Uid,
    Username,
};

use crate::error::{ProvisionError, Result};

/// Length of the shared exchange secret in bytes.
pub const EXCHANGE_SECRET_LEN: usize = 32;

/// The random secret both sides of a peer exchange must hold.
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangeSecret([u8; EXCHANGE_SECRET_LEN]);

impl ExchangeSecret {
    /// Generate a fresh random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; EXCHANGE_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; EXCHANGE_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; EXCHANGE_SECRET_LEN] {
        &self.0
    }

    /// Render as a word phrase for human transcription.
    pub fn phrase(&self) -> String {
        encode_phrase(&self.0)
    }

    /// Parse a transcribed phrase back to a secret.
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let bytes = decode_phrase(phrase)?;
        let arr: [u8; EXCHANGE_SECRET_LEN] = bytes.as_slice().try_into().map_err(|_| {
            ProvisionError::InvalidArgument(format!(
                "exchange phrase must be {EXCHANGE_SECRET_LEN} words, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl Drop for ExchangeSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for ExchangeSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the secret
        f.write_str("ExchangeSecret(..)")
    }
}

/// What the provisionee tells the peer about the device being created.
#[derive(Debug, Clone)]
pub struct PendingDevice {
    pub device_id: DeviceId,
    pub device_name: String,
    pub device_type: DeviceType,
    /// The existing device the user chose to provision from.
    pub peer_device_id: DeviceId,
}

/// What a successful exchange hands back to the provisionee: keys the
/// peer signed into the family, plus the passphrase stream so this
/// device can derive its own LKS context.
#[derive(Debug)]
pub struct ProvisioneePayload {
    pub uid: Uid,
    pub username: Username,
    pub keys: DeviceKeys,
    pub stream: PassphraseStream,
}

/// The provisionee side of the secure exchange.
///
/// `peer_secret` delivers a secret the user transcribed from the peer's
/// screen, if the exchange runs in that direction. `cancel` flips to
/// true when the engine abandons the exchange; implementations must
/// return [`ProvisionError::Canceled`] promptly instead of waiting on.
#[async_trait]
pub trait SecureChannel: Send + Sync {
    async fn provisionee(
        &self,
        pending: PendingDevice,
        our_secret: ExchangeSecret,
        peer_secret: mpsc::Receiver<ExchangeSecret>,
        cancel: watch::Receiver<bool>,
    ) -> Result<ProvisioneePayload>;
}

pub mod memory {
    //! Loopback channel for tests: the peer is a closure.

    use super::*;
    use std::sync::Arc;

    /// Which direction the secret travels in a scripted exchange.
    pub enum SecretDirection {
        /// The peer reads the secret off our screen; the channel can
        /// proceed as soon as the exchange starts.
        PeerReadsOurs,
        /// The user must type the peer's secret; the channel waits for
        /// it and checks it matches.
        UserTypesPeers(ExchangeSecret),
    }

    type PeerFn = dyn Fn(&PendingDevice) -> Result<ProvisioneePayload> + Send + Sync;

    /// In-process [`SecureChannel`] with a scriptable peer side.
    pub struct MemoryChannel {
        direction: SecretDirection,
        peer: Arc<PeerFn>,
    }

    impl MemoryChannel {
        pub fn new<F>(direction: SecretDirection, peer: F) -> Self
        where
            F: Fn(&PendingDevice) -> Result<ProvisioneePayload> + Send + Sync + 'static,
        {
            Self {
                direction,
                peer: Arc::new(peer),
            }
        }
    }

    #[async_trait]
    impl SecureChannel for MemoryChannel {
        async fn provisionee(
            &self,
            pending: PendingDevice,
            our_secret: ExchangeSecret,
            mut peer_secret: mpsc::Receiver<ExchangeSecret>,
            mut cancel: watch::Receiver<bool>,
        ) -> Result<ProvisioneePayload> {
            if let SecretDirection::UserTypesPeers(expected) = &self.direction {
                tokio::select! {
                    typed = peer_secret.recv() => {
                        let typed = typed.ok_or(ProvisionError::Canceled)?;
                        if typed != *expected {
                            return Err(ProvisionError::Transport(
                                "exchange secret mismatch".into(),
                            ));
                        }
                    }
                    res = cancel.wait_for(|c| *c) => {
                        res.map_err(|e| ProvisionError::Transport(e.to_string()))?;
                        return Err(ProvisionError::Canceled);
                    }
                }
            } else if *cancel.borrow() {
                return Err(ProvisionError::Canceled);
            }
            // both sides now hold the secret; run the peer's half
            let _ = our_secret;
            (self.peer)(&pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_phrase_roundtrip() {
        let secret = ExchangeSecret::generate();
        let typed = ExchangeSecret::from_phrase(&secret.phrase()).unwrap();
        assert_eq!(typed, secret);
    }

    #[test]
    fn test_short_phrase_rejected() {
        assert!(matches!(
            ExchangeSecret::from_phrase("acid acorn"),
            Err(ProvisionError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_channel_cancel() {
        let channel = memory::MemoryChannel::new(
            memory::SecretDirection::UserTypesPeers(ExchangeSecret::generate()),
            |_| Err(ProvisionError::Transport("unreachable".into())),
        );
        let (_secret_tx, secret_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        cancel_tx.send(true).unwrap();

        let pending = PendingDevice {
            device_id: DeviceId::generate(),
            device_name: "laptop".into(),
            device_type: DeviceType::Desktop,
            peer_device_id: DeviceId::generate(),
        };
        let err = channel
            .provisionee(pending, ExchangeSecret::generate(), secret_rx, cancel_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Canceled));
    }
}
