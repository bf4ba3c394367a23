//! Strong type definitions for Keyloom.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A 16-byte user identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid(pub [u8; 16]);

impl Uid {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 16-byte device identifier, generated fresh for every new device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub [u8; 16]);

impl DeviceId {
    /// Generate a new random device id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 32-byte key identifier, derived from the public key bytes with a
/// domain-separated Blake3 hash. Signing and encryption keys derive
/// under different domains, so their KIDs never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Kid(pub [u8; 32]);

impl Kid {
    /// Derive the KID of a signing public key.
    pub fn for_signing(public_key: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("keyloom-kid-sig-v1");
        hasher.update(public_key);
        Self(*hasher.finalize().as_bytes())
    }

    /// Derive the KID of an encryption public key.
    pub fn for_encryption(public_key: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("keyloom-kid-enc-v1");
        hasher.update(public_key);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kid({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// A normalized username: lowercased, trimmed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    /// Normalize a raw username.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// The normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the normalized name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Username({})", self.0)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The class of device being provisioned. Paper keys are represented as
/// devices in a key family but are never a valid *input* class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

impl DeviceClass {
    /// Parse from the external string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "desktop" => Some(Self::Desktop),
            "mobile" => Some(Self::Mobile),
            _ => None,
        }
    }

    /// The corresponding device type.
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Desktop => DeviceType::Desktop,
            Self::Mobile => DeviceType::Mobile,
        }
    }

    /// The external string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of client driving provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientKind {
    Cli,
    Gui,
}

/// The type of an existing device in a key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Mobile,
    Desktop,
    Paper,
}

impl DeviceType {
    /// Rank used when presenting devices for provisioning choice:
    /// mobile < desktop < paper.
    pub fn choice_rank(&self) -> u8 {
        match self {
            Self::Mobile => 0,
            Self::Desktop => 1,
            Self::Paper => 2,
        }
    }

    /// The external string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Desktop => "desktop",
            Self::Paper => "paper",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An active device in an identity's key family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
}

/// Sort devices for presentation to the user: by type rank
/// (mobile < desktop < paper), then by name.
pub fn sort_for_choice(devices: &mut [Device]) {
    devices.sort_by(|a, b| {
        a.device_type
            .choice_rank()
            .cmp(&b.device_type.choice_rank())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Maximum length of a device name.
pub const MAX_DEVICE_NAME_LEN: usize = 64;

/// Validate a device display name: 1..=64 chars from
/// `[A-Za-z0-9 _'-]`, no leading or trailing space.
pub fn check_device_name(name: &str) -> Result<(), CoreError> {
    let bad = |msg: &str| CoreError::InvalidDeviceName(msg.to_string());
    if name.is_empty() || name.len() > MAX_DEVICE_NAME_LEN {
        return Err(bad("must be 1-64 characters"));
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(bad("must not start or end with a space"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '\'' | '-'))
    {
        return Err(bad("letters, digits, space, _, ', - only"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(name: &str, t: DeviceType) -> Device {
        Device {
            id: DeviceId::generate(),
            name: name.to_string(),
            device_type: t,
        }
    }

    #[test]
    fn test_choice_order_type_then_name() {
        let mut devices = vec![
            dev("zeppelin", DeviceType::Desktop),
            dev("backup", DeviceType::Paper),
            dev("anchor", DeviceType::Desktop),
            dev("phone", DeviceType::Mobile),
        ];
        sort_for_choice(&mut devices);

        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["phone", "anchor", "zeppelin", "backup"]);
    }

    #[test]
    fn test_kid_domains_differ() {
        let pk = [0x42u8; 32];
        assert_ne!(Kid::for_signing(&pk), Kid::for_encryption(&pk));
    }

    #[test]
    fn test_uid_hex_roundtrip() {
        let uid = Uid::from_bytes([0xab; 16]);
        assert_eq!(Uid::from_hex(&uid.to_hex()).unwrap(), uid);
    }

    #[test]
    fn test_device_class_parse() {
        assert_eq!(DeviceClass::parse("desktop"), Some(DeviceClass::Desktop));
        assert_eq!(DeviceClass::parse("mobile"), Some(DeviceClass::Mobile));
        assert_eq!(DeviceClass::parse("paper"), None);
        assert_eq!(DeviceClass::parse("backup"), None);
    }

    #[test]
    fn test_username_normalization() {
        assert_eq!(Username::new("  Alice ").as_str(), "alice");
    }

    #[test]
    fn test_device_name_validation() {
        assert!(check_device_name("home laptop").is_ok());
        assert!(check_device_name("sam's-phone_2").is_ok());
        assert!(check_device_name("").is_err());
        assert!(check_device_name(" padded").is_err());
        assert!(check_device_name("tab\tname").is_err());
        assert!(check_device_name(&"x".repeat(65)).is_err());
    }
}
