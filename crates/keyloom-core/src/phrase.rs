//! Word-phrase encoding of secret bytes.
//!
//! Paper keys and peer-exchange secrets are transcribed by humans, so
//! they are rendered as words rather than hex. One byte maps to one
//! word from a fixed 256-word list. Decoding is case- and
//! whitespace-insensitive.

use crate::error::CoreError;

/// The fixed 256-word encoding list. Order is part of the format.
pub const WORDS: [&str; 256] = [
    "acid", "acorn", "alarm", "amber", "angle", "ankle", "apple", "arrow",
    "atlas", "attic", "badge", "bagel", "baker", "bamboo", "barrel", "basil",
    "beacon", "bell", "bench", "birch", "bison", "blade", "blossom", "bolt",
    "bonus", "book", "boots", "bounce", "brick", "bridge", "brook", "bubble",
    "bucket", "bugle", "butter", "cabin", "cactus", "camel", "candle", "canoe",
    "canyon", "carbon", "cargo", "carrot", "castle", "cedar", "cello", "chalk",
    "cherry", "chess", "chime", "cider", "cinema", "citrus", "clay", "cliff",
    "clover", "cobalt", "coconut", "comet", "copper", "coral", "cotton", "cradle",
    "crane", "crater", "crayon", "cricket", "crystal", "cypress", "daisy", "dawn",
    "delta", "denim", "dew", "diesel", "dome", "donkey", "dragon", "drum",
    "dune", "eagle", "easel", "echo", "eclipse", "elbow", "elder", "ember",
    "engine", "falcon", "fern", "fiddle", "flint", "flute", "forest", "fossil",
    "fox", "garlic", "gazebo", "gecko", "ginger", "glacier", "goose", "granite",
    "grape", "gravel", "hammock", "harbor", "hazel", "heron", "hickory", "honey",
    "horizon", "hornet", "iceberg", "igloo", "iris", "ivory", "jade", "jaguar",
    "jasmine", "jigsaw", "juniper", "kayak", "kettle", "kiwi", "knight", "lagoon",
    "lantern", "lava", "lemon", "lentil", "lilac", "lily", "lizard", "llama",
    "lobster", "locket", "lotus", "lumber", "mango", "maple", "marble", "meadow",
    "melon", "mesa", "mint", "mirror", "mocha", "mosaic", "moss", "moth",
    "mulberry", "mural", "mustard", "nectar", "nickel", "nutmeg", "oasis", "ocean",
    "olive", "onion", "opal", "orbit", "orchid", "otter", "owl", "oyster",
    "paddle", "pagoda", "palm", "panda", "parrot", "peach", "pebble", "pecan",
    "pelican", "pepper", "petal", "piano", "pickle", "pine", "pistachio", "plaza",
    "plum", "pocket", "pond", "poppy", "prairie", "prism", "pumpkin", "quartz",
    "quill", "rabbit", "raccoon", "radish", "raft", "rainbow", "raisin", "raven",
    "reef", "ribbon", "river", "robin", "rocket", "rosemary", "ruby", "saddle",
    "saffron", "sage", "salmon", "sandal", "sapphire", "satchel", "seal", "sesame",
    "shadow", "shell", "sierra", "silver", "sleigh", "socket", "sparrow", "spruce",
    "squash", "squirrel", "stamp", "stone", "sugar", "sumac", "sunset", "syrup",
    "tango", "teapot", "thistle", "tiger", "timber", "topaz", "trumpet", "tulip",
    "tundra", "turnip", "turtle", "umbrella", "urchin", "velvet", "violet", "walnut",
    "walrus", "wasabi", "willow", "winter", "wolf", "yarrow", "zebra", "zephyr",
];

/// Encode bytes as a space-separated word phrase.
pub fn encode_phrase(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| WORDS[b as usize])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a word phrase back to bytes.
///
/// Tolerates mixed case and irregular whitespace; any word not in the
/// list is an error.
pub fn decode_phrase(phrase: &str) -> Result<Vec<u8>, CoreError> {
    phrase
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            WORDS
                .iter()
                .position(|&w| w == lower)
                .map(|i| i as u8)
                .ok_or_else(|| CoreError::UnknownWord(word.to_string()))
        })
        .collect()
}

/// Normalize a phrase to its canonical form: lowercase, single spaces.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wordlist_is_unique() {
        let mut sorted = WORDS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 256);
    }

    #[test]
    fn test_decode_tolerates_case_and_spacing() {
        let bytes = vec![0, 255, 17];
        let phrase = encode_phrase(&bytes);
        let sloppy = format!("  {}  ", phrase.to_uppercase().replace(' ', "   "));
        assert_eq!(decode_phrase(&sloppy).unwrap(), bytes);
    }

    #[test]
    fn test_unknown_word_rejected() {
        let err = decode_phrase("acid blorp").unwrap_err();
        assert!(matches!(err, crate::error::CoreError::UnknownWord(w) if w == "blorp"));
    }

    proptest! {
        #[test]
        fn prop_phrase_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let phrase = encode_phrase(&bytes);
            prop_assert_eq!(decode_phrase(&phrase).unwrap(), bytes);
        }
    }
}
