//! The target identity and its active key family.

use serde::{Deserialize, Serialize};

use keyloom_core::{Device, DeviceType, Kid, PgpFingerprint, Uid, Username};

/// A PGP key as it appears in a key family: referenced, never held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgpKeyRef {
    pub kid: Kid,
    pub fingerprint: PgpFingerprint,
}

/// The active (non-revoked) keys of one identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyFamily {
    pub devices: Vec<Device>,
    pub pgp_keys: Vec<PgpKeyRef>,
}

impl KeyFamily {
    /// True if the identity has at least one active device
    /// (paper keys count: they are devices in the family).
    pub fn has_active_device(&self) -> bool {
        !self.devices.is_empty()
    }

    /// True if the identity has at least one active PGP key.
    pub fn has_pgp(&self) -> bool {
        !self.pgp_keys.is_empty()
    }

    /// True if the identity already holds a paper key.
    pub fn has_paper_device(&self) -> bool {
        self.devices
            .iter()
            .any(|d| d.device_type == DeviceType::Paper)
    }

    /// Fingerprints of all active PGP keys.
    pub fn pgp_fingerprints(&self) -> Vec<PgpFingerprint> {
        self.pgp_keys.iter().map(|k| k.fingerprint).collect()
    }

    /// The KID registered for a PGP fingerprint, if any.
    pub fn kid_for_fingerprint(&self, fingerprint: &PgpFingerprint) -> Option<Kid> {
        self.pgp_keys
            .iter()
            .find(|k| k.fingerprint == *fingerprint)
            .map(|k| k.kid)
    }

    /// Active device display names, lowercased for duplicate checks.
    pub fn device_names_lower(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.to_lowercase()).collect()
    }
}

/// A resolved identity: the provisioning target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub uid: Uid,
    pub username: Username,
    /// KID of the founding key, `None` for a brand-new identity.
    pub eldest_kid: Option<Kid>,
    pub key_family: KeyFamily,
}

/// A private key found in the user's external (GPG) keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgKeyInfo {
    pub fingerprint: PgpFingerprint,
    /// Human-readable user ids on the key ("Alice <alice@example.com>").
    pub user_ids: Vec<String>,
}

/// How the external-keyring path uses the selected key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpgMethod {
    /// Extract the private key into local custody.
    Import,
    /// Leave the key where it is; use the tool as a signing oracle.
    Sign,
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyloom_core::DeviceId;

    fn family_with(types: &[DeviceType]) -> KeyFamily {
        KeyFamily {
            devices: types
                .iter()
                .enumerate()
                .map(|(i, t)| Device {
                    id: DeviceId::generate(),
                    name: format!("dev{i}"),
                    device_type: *t,
                })
                .collect(),
            pgp_keys: Vec::new(),
        }
    }

    #[test]
    fn test_paper_detection() {
        assert!(!family_with(&[DeviceType::Desktop]).has_paper_device());
        assert!(family_with(&[DeviceType::Desktop, DeviceType::Paper]).has_paper_device());
    }

    #[test]
    fn test_fingerprint_kid_index() {
        let fpr = PgpFingerprint::from_bytes([1; 20]);
        let kid = Kid::from_bytes([2; 32]);
        let family = KeyFamily {
            devices: Vec::new(),
            pgp_keys: vec![PgpKeyRef {
                kid,
                fingerprint: fpr,
            }],
        };
        assert!(family.has_pgp());
        assert_eq!(family.kid_for_fingerprint(&fpr), Some(kid));
        assert_eq!(
            family.kid_for_fingerprint(&PgpFingerprint::from_bytes([9; 20])),
            None
        );
    }
}
