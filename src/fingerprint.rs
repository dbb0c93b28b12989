//! Dataset and prompt fingerprinting for checkpoint validation
//!
//! Fingerprints are equality checks only: two datasets with the same
//! identifier set hash the same regardless of item order, so a resumed job
//! stays valid even when the mail API returns messages in a different order.

use sha2::{Digest, Sha256};

/// Seam between the fingerprinting layer and dataset items.
///
/// Items without a stable identifier fall back to their position in the
/// sequence, which makes the fingerprint order-sensitive for those items.
pub trait DatasetItem {
    fn identifier(&self) -> Option<&str>;
}

/// Fingerprint a dataset by its sorted identifier set.
pub fn fingerprint_items<T: DatasetItem>(items: &[T]) -> String {
    let mut ids: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| match item.identifier() {
            Some(id) => id.to_string(),
            None => i.to_string(),
        })
        .collect();
    ids.sort();
    sha256_hex(&ids.join("|"))
}

/// Fingerprint raw text (prompts). Order and content sensitive.
pub fn fingerprint_text(text: &str) -> String {
    sha256_hex(text)
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(Option<&'static str>);

    impl DatasetItem for Item {
        fn identifier(&self) -> Option<&str> {
            self.0
        }
    }

    #[test]
    fn test_fingerprint_is_order_insensitive() {
        let abc = [Item(Some("a")), Item(Some("b")), Item(Some("c"))];
        let cab = [Item(Some("c")), Item(Some("a")), Item(Some("b"))];
        assert_eq!(fingerprint_items(&abc), fingerprint_items(&cab));
    }

    #[test]
    fn test_fingerprint_changes_with_set() {
        let ab = [Item(Some("a")), Item(Some("b"))];
        let abc = [Item(Some("a")), Item(Some("b")), Item(Some("c"))];
        assert_ne!(fingerprint_items(&ab), fingerprint_items(&abc));
    }

    #[test]
    fn test_missing_identifier_uses_position() {
        let with_gap = [Item(Some("a")), Item(None)];
        let expected = fingerprint_text("1|a");
        assert_eq!(fingerprint_items(&with_gap), expected);
    }

    #[test]
    fn test_empty_dataset_is_stable() {
        let empty: [Item; 0] = [];
        assert_eq!(fingerprint_items(&empty), fingerprint_items(&empty));
        assert_eq!(fingerprint_items(&empty), fingerprint_text(""));
    }

    #[test]
    fn test_text_fingerprint_is_content_sensitive() {
        assert_ne!(fingerprint_text("a|b"), fingerprint_text("b|a"));
    }
}
