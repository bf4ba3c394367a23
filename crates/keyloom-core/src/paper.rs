//! Paper backup keys.
//!
//! A paper key is a 12-word phrase from which a signing and an
//! encryption keypair are derived deterministically. Whoever holds the
//! phrase holds the keys, so unlocked paper keys are only ever cached
//! behind an idle timeout (see the account crate).

use rand::RngCore;
use std::fmt;
use zeroize::Zeroize;

use crate::crypto::{EncryptionKeypair, SigningKeypair};
use crate::error::CoreError;
use crate::phrase::{decode_phrase, encode_phrase, normalize_phrase};

/// Number of words in a paper key phrase (one byte of entropy each).
pub const PAPER_PHRASE_WORDS: usize = 12;

/// A validated, normalized paper key phrase.
///
/// The backing string is wiped on drop.
pub struct PaperPhrase(String);

impl PaperPhrase {
    /// Validate and normalize a phrase typed by the user.
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        let bytes = decode_phrase(raw)?;
        if bytes.len() != PAPER_PHRASE_WORDS {
            return Err(CoreError::BadWordCount {
                expected: PAPER_PHRASE_WORDS,
                got: bytes.len(),
            });
        }
        Ok(Self(normalize_phrase(raw)))
    }

    /// Generate a fresh random phrase.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; PAPER_PHRASE_WORDS];
        rng.fill_bytes(&mut bytes);
        Self(encode_phrase(&bytes))
    }

    /// The canonical phrase text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The display name paper keys get as devices: the first two words.
    pub fn device_name(&self) -> String {
        self.0.split(' ').take(2).collect::<Vec<_>>().join(" ")
    }
}

impl Drop for PaperPhrase {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for PaperPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the phrase
        write!(f, "PaperPhrase({} words)", PAPER_PHRASE_WORDS)
    }
}

/// The keypairs derived from a paper phrase.
#[derive(Debug, Clone)]
pub struct PaperKey {
    pub signing: SigningKeypair,
    pub encryption: EncryptionKeypair,
}

impl PaperKey {
    /// Derive the paper keypairs from a phrase.
    ///
    /// Derivation is deterministic: the same phrase always yields the
    /// same keys, on any device.
    pub fn derive(phrase: &PaperPhrase) -> Self {
        let sig_seed = derive_seed("keyloom-paper-sig-v1", phrase.as_str());
        let enc_seed = derive_seed("keyloom-paper-enc-v1", phrase.as_str());
        Self {
            signing: SigningKeypair::from_seed(&sig_seed),
            encryption: EncryptionKeypair::from_seed(&enc_seed),
        }
    }
}

fn derive_seed(domain: &str, phrase: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(domain);
    hasher.update(phrase.as_bytes());
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_deterministic() {
        let phrase = PaperPhrase::generate();
        let a = PaperKey::derive(&phrase);
        let b = PaperKey::derive(&phrase);
        assert_eq!(a.signing.kid(), b.signing.kid());
        assert_eq!(a.encryption.kid(), b.encryption.kid());
    }

    #[test]
    fn test_normalization_does_not_change_keys() {
        let phrase = PaperPhrase::generate();
        let sloppy = format!("  {}  ", phrase.as_str().to_uppercase());
        let reparsed = PaperPhrase::new(&sloppy).unwrap();
        assert_eq!(
            PaperKey::derive(&phrase).signing.kid(),
            PaperKey::derive(&reparsed).signing.kid()
        );
    }

    #[test]
    fn test_wrong_word_count_rejected() {
        let err = PaperPhrase::new("acid acorn alarm").unwrap_err();
        assert!(matches!(err, CoreError::BadWordCount { got: 3, .. }));
    }

    #[test]
    fn test_distinct_phrases_distinct_keys() {
        let a = PaperKey::derive(&PaperPhrase::generate());
        let b = PaperKey::derive(&PaperPhrase::generate());
        assert_ne!(a.signing.kid(), b.signing.kid());
    }

    #[test]
    fn test_device_name_is_two_words() {
        let phrase = PaperPhrase::new(
            "acid acorn alarm amber angle ankle apple arrow atlas attic badge bagel",
        )
        .unwrap();
        assert_eq!(phrase.device_name(), "acid acorn");
    }
}
