use sha2::{Digest, Sha256};

use crate::core::types::ThresholdBand;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content hash recorded on uploaded evidence files.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("sha256:{}", sha256_hex(bytes))
}

/// Identity the router uses to suppress duplicate notifications for the
/// same incident and threshold band.
pub fn alert_dedupe_key(incident_id: &str, band: ThresholdBand) -> String {
    format!("{}:{}", incident_id, band.as_str())
}

/// Opaque anonymous reporter id derived from whatever the portal handed us.
pub fn anonymous_reporter_id(seed: &str) -> String {
    let digest = sha256_hex(seed.as_bytes());
    format!("anon_{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_separates_bands() {
        let high = alert_dedupe_key("inc_000001", ThresholdBand::High);
        let medium = alert_dedupe_key("inc_000001", ThresholdBand::Medium);
        assert_ne!(high, medium);
        assert_eq!(high, "inc_000001:high");
    }

    #[test]
    fn anonymous_id_is_stable_and_opaque() {
        let a = anonymous_reporter_id("session-42");
        let b = anonymous_reporter_id("session-42");
        assert_eq!(a, b);
        assert!(a.starts_with("anon_"));
        assert!(!a.contains("session"));
    }
}
