//! Field decoder behaviour on real-world link segments.

use mapleads::decoder::{decode, decode_place_segment, LinkPattern};
use proptest::prelude::*;

#[test]
fn test_decodes_place_links() {
    assert_eq!(
        decode_place_segment("https://www.google.com/maps/place/Padaria+Bella+Paulista/@-23.5617,-46.6559,17z"),
        Some("Padaria Bella Paulista".to_string())
    );
    assert_eq!(
        decode_place_segment("https://www.google.com/maps/place/Caf%C3%A9+do+Z%C3%A9/data=!4m7"),
        Some("Café do Zé".to_string())
    );
    assert_eq!(
        decode_place_segment("https://www.google.com/maps/place/Padaria+%26+Confeitaria?entry=ttu"),
        Some("Padaria & Confeitaria".to_string())
    );
}

#[test]
fn test_links_without_place_segment() {
    assert_eq!(decode_place_segment("https://www.google.com/maps/search/padarias/"), None);
    assert_eq!(decode_place_segment("https://www.google.com/maps/place/"), None);
    assert_eq!(decode_place_segment(""), None);
}

#[test]
fn test_uppercase_accents_and_spaces() {
    assert_eq!(decode("S%C3%83O+PAULO+%C3%81GUA"), "SÃO PAULO ÁGUA");
    assert_eq!(decode("+++Bar+do+Ô+++"), "Bar do Ô");
    assert_eq!(decode("Caf%C3%A9%20Central"), "Café Central");
}

#[test]
fn test_malformed_segments_degrade() {
    assert_eq!(decode("50%+OFF"), "50% OFF");
    assert_eq!(decode("%"), "%");
    assert_eq!(decode("Loja%ZZ"), "Loja%ZZ");
}

#[test]
fn test_custom_marker() {
    let pattern = LinkPattern::new("/lugar/").unwrap();
    assert_eq!(pattern.marker(), "/lugar/");
    assert!(pattern.matches("https://mapas.example/lugar/Feira+Livre/"));
    assert_eq!(pattern.place_name("https://mapas.example/lugar/Feira+Livre/"), Some("Feira Livre".to_string()));
    assert!(!pattern.matches("https://www.google.com/maps/place/Feira+Livre/"));
}

proptest! {
    #[test]
    fn prop_decode_is_idempotent(s in ".{0,40}") {
        let once = decode(&s);
        prop_assert_eq!(decode(&once), once);
    }

    #[test]
    fn prop_encoded_looking_input_is_idempotent(s in "([A-Za-z+%]|%[0-9A-Fa-f]{2}){0,20}") {
        let once = decode(&s);
        prop_assert_eq!(decode(&once), once);
    }

    #[test]
    fn prop_non_empty_in_non_empty_out(s in ".{1,40}") {
        prop_assert!(!decode(&s).is_empty());
    }

    #[test]
    fn prop_plain_words_round_trip(words in prop::collection::vec("[a-zA-Z0-9]{1,8}", 1..5)) {
        let segment = words.join("+");
        prop_assert_eq!(decode(&segment), words.join(" "));
    }
}
