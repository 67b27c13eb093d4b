//! Deduplication Layer (C2).
//!
//! Fingerprint = `sha256(apn ":" county ":" event_type ":" source)`,
//! hex-encoded. Inserting a duplicate fingerprint is a no-op success, not
//! an error — see `store::InsertOutcome`.

use sha2::{Digest, Sha256};

use crate::models::EventType;

pub fn fingerprint(apn: &str, county: &str, event_type: EventType, source: &str) -> String {
    let input = format!("{apn}:{county}:{}:{source}", event_type.as_str());
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("123", "Travis", EventType::Probate, "propertyradar");
        let b = fingerprint("123", "Travis", EventType::Probate, "propertyradar");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_when_any_component_differs() {
        let base = fingerprint("123", "Travis", EventType::Probate, "propertyradar");
        assert_ne!(base, fingerprint("124", "Travis", EventType::Probate, "propertyradar"));
        assert_ne!(base, fingerprint("123", "Hays", EventType::Probate, "propertyradar"));
        assert_ne!(base, fingerprint("123", "Travis", EventType::Vacant, "propertyradar"));
        assert_ne!(base, fingerprint("123", "Travis", EventType::Probate, "webhook"));
    }

    #[test]
    fn fingerprint_is_64_char_hex() {
        let fp = fingerprint("123", "Travis", EventType::Probate, "propertyradar");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
