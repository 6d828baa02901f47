//! Property tests for query tags.

use proptest::prelude::*;
use quarry_core::tag;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every generated tag validates, and its suffix is 8 lowercase hex
    /// characters.
    #[test]
    fn generated_tags_always_validate(_seed in 0u8..) {
        let tag = tag::generate();
        prop_assert!(tag::is_valid(&tag));
        let suffix = tag::extract(&tag).unwrap();
        prop_assert_eq!(suffix.len(), 8);
        prop_assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    /// Arbitrary strings only validate when they match the documented
    /// shape exactly.
    #[test]
    fn validation_matches_the_shape(input in "\\PC*") {
        let expected = input.strip_prefix("cdesk_").is_some_and(|suffix| {
            suffix.len() == 8
                && suffix
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        });
        prop_assert_eq!(tag::is_valid(&input), expected);
    }

    /// Valid suffixes round-trip through extract.
    #[test]
    fn extract_round_trips(suffix in "[0-9a-f]{8}") {
        let tag = format!("cdesk_{suffix}");
        prop_assert!(tag::is_valid(&tag));
        prop_assert_eq!(tag::extract(&tag), Some(suffix.as_str()));
    }
}
