//! Property tests for provenance hashing.

use proptest::prelude::*;
use quarry_insight::provenance_hash;
use serde_json::{json, Value};

fn params_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    proptest::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..8).prop_map(|pairs| {
        let mut pairs = pairs;
        pairs.sort();
        pairs.dedup_by(|a, b| a.0 == b.0);
        pairs
    })
}

fn to_object(pairs: &[(String, i64)]) -> Value {
    let mut map = serde_json::Map::new();
    for (key, value) in pairs {
        map.insert(key.clone(), json!(value));
    }
    Value::Object(map)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// The hash is deterministic and always 16 lowercase hex chars.
    #[test]
    fn hash_shape_and_determinism(template in "[ -~]{0,64}", pairs in params_strategy()) {
        let params = to_object(&pairs);
        let first = provenance_hash(&template, &params);
        let second = provenance_hash(&template, &params);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), 16);
        prop_assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    /// Insertion order of parameter keys never changes the hash.
    #[test]
    fn param_order_is_irrelevant(pairs in params_strategy()) {
        let forward = to_object(&pairs);
        let mut reversed_pairs = pairs.clone();
        reversed_pairs.reverse();
        let reversed = to_object(&reversed_pairs);
        prop_assert_eq!(
            provenance_hash("SELECT 1", &forward),
            provenance_hash("SELECT 1", &reversed)
        );
    }

    /// Whitespace runs inside the template are insignificant.
    #[test]
    fn whitespace_is_normalized(words in proptest::collection::vec("[a-zA-Z]{1,8}", 1..8)) {
        let single = words.join(" ");
        let sloppy = words.join("  \t\n ");
        prop_assert_eq!(
            provenance_hash(&single, &json!({})),
            provenance_hash(&sloppy, &json!({}))
        );
    }
}
