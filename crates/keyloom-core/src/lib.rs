//! # Keyloom Core
//!
//! Pure primitives for Keyloom: key material, identifiers, phrases, and
//! sealing.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Kid`] - Domain-separated key identifier (Blake3 hash)
//! - [`DeviceKeys`] - The signing + encryption pair minted per device
//! - [`PaperKey`] - Keypairs derived from a 12-word backup phrase
//! - [`Lks`] - Local-key-security sealing context for key seeds at rest
//! - [`LockedPgpKey`] - A passphrase-sealed synced PGP key
//!
//! ## Phrases
//!
//! Paper keys and peer-exchange secrets are rendered as word phrases
//! for human transcription. See the [`phrase`] module.

pub mod crypto;
pub mod error;
pub mod paper;
pub mod passphrase;
pub mod pgp;
pub mod phrase;
pub mod types;

pub use crypto::{
    DeviceKeys, Ed25519Signature, EncryptionKeypair, EncryptionPublicKey, SigningKeypair,
    SigningPublicKey,
};
pub use error::CoreError;
pub use paper::{PaperKey, PaperPhrase, PAPER_PHRASE_WORDS};
pub use passphrase::{Lks, PassphraseStream, SealKey, SealedBox};
pub use pgp::{LockedPgpKey, PgpFingerprint, UnlockedPgpKey};
pub use phrase::{decode_phrase, encode_phrase, normalize_phrase, WORDS};
pub use types::{
    check_device_name, sort_for_choice, ClientKind, Device, DeviceClass, DeviceId, DeviceType,
    Kid, Uid, Username, MAX_DEVICE_NAME_LEN,
};
