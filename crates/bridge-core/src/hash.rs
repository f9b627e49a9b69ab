//! Deterministic Message-ID hashing (§4.4, §2.2 expansion).

use sha2::{Digest, Sha256};

/// A stable hex digest of `(pr-entity-id, item-id)`, used as the local part
/// of a synthesized Message-ID (`<digest@domain>`).
pub fn message_id_local_part(pr_entity_id: &str, item_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pr_entity_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(item_id.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Full Message-ID: `<digest@domain>`.
pub fn message_id(pr_entity_id: &str, item_id: &str, domain: &str) -> String {
    format!("<{}@{}>", message_id_local_part(pr_entity_id, item_id), domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_yield_same_id() {
        let a = message_id("openjdk/jdk#1234", "item-1", "mail.test");
        let b = message_id("openjdk/jdk#1234", "item-1", "mail.test");
        assert_eq!(a, b);
    }

    #[test]
    fn different_item_ids_yield_different_message_ids() {
        let a = message_id("openjdk/jdk#1234", "item-1", "mail.test");
        let b = message_id("openjdk/jdk#1234", "item-2", "mail.test");
        assert_ne!(a, b);
    }

    #[test]
    fn different_prs_yield_different_message_ids() {
        let a = message_id("openjdk/jdk#1234", "item-1", "mail.test");
        let b = message_id("openjdk/jdk#9999", "item-1", "mail.test");
        assert_ne!(a, b);
    }

    #[test]
    fn message_id_has_angle_brackets_and_domain() {
        let id = message_id("openjdk/jdk#1234", "item-1", "mail.openjdk.test");
        assert!(id.starts_with('<'));
        assert!(id.ends_with('>'));
        assert!(id.contains("@mail.openjdk.test"));
    }
}
