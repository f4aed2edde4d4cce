// ABOUTME: Configuration fingerprinting for drift detection.
// ABOUTME: SHA-256 over a canonical JSON encoding of options plus image id.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Hash a JSON value canonically: `serde_json` maps are ordered, and
/// `to_string` emits no insignificant whitespace, so equal values always
/// produce equal digests.
pub fn json_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// The service's config fingerprint: its effective options plus the identity
/// of the image it would run. A container whose `config_hash` label differs
/// from this has diverged.
pub fn config_hash(options: &Value, image_id: &str) -> String {
    json_hash(&json!({
        "options": options,
        "image_id": image_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_hash_equal() {
        let options = json!({"image": "nginx", "ports": ["80"]});
        assert_eq!(
            config_hash(&options, "sha256:abc"),
            config_hash(&options, "sha256:abc")
        );
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).expect("valid json");
        let b: Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).expect("valid json");
        assert_eq!(json_hash(&a), json_hash(&b));
    }

    #[test]
    fn image_id_participates() {
        let options = json!({"image": "nginx"});
        assert_ne!(
            config_hash(&options, "sha256:abc"),
            config_hash(&options, "sha256:def")
        );
    }

    #[test]
    fn option_changes_change_the_hash() {
        assert_ne!(
            config_hash(&json!({"environment": {"A": "1"}}), "id"),
            config_hash(&json!({"environment": {"A": "2"}}), "id")
        );
    }
}
