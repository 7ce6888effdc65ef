use url::{Host, Url};

use crate::core::policy::Policy;
use crate::core::types::{EvidenceBundle, SignalSet};
use crate::pipeline::normalizer::MAX_FILE_BYTES;

pub const SIG_KEYWORD_MATCH: &str = "keyword_match";
pub const SIG_KEYWORD_MALWARE: &str = "keyword_malware";
pub const SIG_KEYWORD_PHISHING: &str = "keyword_phishing";
pub const SIG_KEYWORD_EXPOSURE: &str = "keyword_exposure";
pub const SIG_URL_SHAPE: &str = "url_shape";
pub const SIG_FILE_TYPE: &str = "file_type";
pub const SIG_PAYLOAD_SIZE: &str = "payload_size";

// Term hits at or beyond this count saturate the keyword severity.
const FULL_MATCH_HITS: f64 = 3.0;

/// Derive the fixed signal set from a bundle. Pure: identical bundle and
/// policy always produce the identical set; no network is consulted.
pub fn extract(bundle: &EvidenceBundle, policy: &Policy) -> SignalSet {
    let mut signals = SignalSet::new();

    let text = bundle
        .text_content
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let kw_malware = keyword_severity(&text, &policy.terms.malware);
    let kw_phishing = keyword_severity(&text, &policy.terms.phishing);
    let kw_exposure = keyword_severity(&text, &policy.terms.exposure);
    signals.push(SIG_KEYWORD_MALWARE, kw_malware);
    signals.push(SIG_KEYWORD_PHISHING, kw_phishing);
    signals.push(SIG_KEYWORD_EXPOSURE, kw_exposure);
    signals.push(
        SIG_KEYWORD_MATCH,
        kw_malware.max(kw_phishing).max(kw_exposure),
    );

    let url_shape = bundle
        .url
        .as_deref()
        .map(|u| url_shape_severity(u, policy))
        .unwrap_or(0.0);
    signals.push(SIG_URL_SHAPE, url_shape);

    let file_type = bundle
        .file
        .as_ref()
        .map(|f| {
            policy
                .files
                .severities
                .get(&f.declared_type)
                .copied()
                .unwrap_or(policy.files.unknown_severity)
        })
        .unwrap_or(0.0);
    signals.push(SIG_FILE_TYPE, file_type);

    let text_share = text.chars().count() as f64 / policy.limits.max_text_chars as f64;
    let file_share = bundle
        .file
        .as_ref()
        .map(|f| f.size_bytes as f64 / MAX_FILE_BYTES as f64)
        .unwrap_or(0.0);
    signals.push(SIG_PAYLOAD_SIZE, text_share.max(file_share));

    signals
}

/// Fraction of the curated term list found in the text, scaled so that
/// `FULL_MATCH_HITS` distinct hits saturate at 1.0.
fn keyword_severity(text: &str, terms: &[String]) -> f64 {
    if text.is_empty() || terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|term| text.contains(term.as_str())).count();
    (hits as f64 / FULL_MATCH_HITS).min(1.0)
}

/// Additive URL-shape heuristics, capped at 1.0: IP-literal host,
/// suspicious TLD, excessive subdomain depth, embedded credentials.
fn url_shape_severity(url: &str, policy: &Policy) -> f64 {
    let Ok(parsed) = Url::parse(url) else {
        return 0.0;
    };
    let mut severity: f64 = 0.0;

    match parsed.host() {
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => severity += 0.4,
        Some(Host::Domain(domain)) => {
            let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
            if let Some(tld) = labels.last() {
                if policy
                    .url
                    .suspicious_tlds
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(tld))
                {
                    severity += 0.3;
                }
            }
            let subdomain_depth = labels.len().saturating_sub(2);
            if subdomain_depth > policy.url.max_subdomain_depth {
                severity += 0.2;
            }
        }
        None => {}
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        severity += 0.3;
    }

    severity.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::core::types::{EvidenceKind, FileRef};

    fn now() -> DateTime<Utc> {
        "2026-02-01T12:00:00Z".parse().unwrap()
    }

    fn text_bundle(text: &str) -> EvidenceBundle {
        EvidenceBundle {
            kinds: vec![EvidenceKind::Description],
            text_content: Some(text.to_string()),
            url: None,
            file: None,
            submitted_at: now(),
            reporter_id: "rep".to_string(),
        }
    }

    fn url_bundle(url: &str) -> EvidenceBundle {
        EvidenceBundle {
            kinds: vec![EvidenceKind::Url],
            text_content: None,
            url: Some(url.to_string()),
            file: None,
            submitted_at: now(),
            reporter_id: "rep".to_string(),
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let policy = Policy::builtin();
        let bundle = text_bundle("ransomware encrypted all files, demanding payment");
        let a = extract(&bundle, &policy);
        let b = extract(&bundle, &policy);
        assert_eq!(a, b);
    }

    #[test]
    fn ransomware_text_saturates_malware_keywords() {
        let policy = Policy::builtin();
        let signals = extract(
            &text_bundle("ransomware encrypted all files, demanding payment"),
            &policy,
        );
        assert_eq!(signals.severity(SIG_KEYWORD_MALWARE), 1.0);
        assert_eq!(signals.severity(SIG_KEYWORD_MATCH), 1.0);
        assert_eq!(signals.severity(SIG_URL_SHAPE), 0.0);
    }

    #[test]
    fn benign_text_yields_no_keyword_signal() {
        let policy = Policy::builtin();
        let signals = extract(&text_bundle("hello, just testing"), &policy);
        assert_eq!(signals.severity(SIG_KEYWORD_MATCH), 0.0);
        assert!(signals.max_severity() < 0.1);
    }

    #[test]
    fn ip_literal_host_scores_url_shape() {
        let policy = Policy::builtin();
        let signals = extract(&url_bundle("http://203.0.113.5/login-update"), &policy);
        assert!(signals.severity(SIG_URL_SHAPE) > 0.0);
        assert_eq!(signals.severity(SIG_URL_SHAPE), 0.4);
    }

    #[test]
    fn url_heuristics_add_up_and_cap() {
        let policy = Policy::builtin();
        let deep = url_bundle("http://user:pw@a.b.c.d.e.f.example.zip/");
        let signals = extract(&deep, &policy);
        // suspicious tld + depth + credentials: 0.3 + 0.2 + 0.3
        assert!((signals.severity(SIG_URL_SHAPE) - 0.8).abs() < 1e-9);

        let plain = url_bundle("https://example.com/report");
        let signals = extract(&plain, &policy);
        assert_eq!(signals.severity(SIG_URL_SHAPE), 0.0);
    }

    #[test]
    fn unknown_file_type_defaults_to_mid_severity() {
        let policy = Policy::builtin();
        let mut bundle = text_bundle("attached");
        bundle.kinds.push(EvidenceKind::File);
        bundle.file = Some(FileRef {
            name: "weird.blob".to_string(),
            size_bytes: 1024,
            declared_type: "blob".to_string(),
            content_hash: "sha256:00".to_string(),
        });
        let signals = extract(&bundle, &policy);
        assert_eq!(signals.severity(SIG_FILE_TYPE), 0.5);

        bundle.file = Some(FileRef {
            name: "payload.exe".to_string(),
            size_bytes: 1024,
            declared_type: "exe".to_string(),
            content_hash: "sha256:00".to_string(),
        });
        let signals = extract(&bundle, &policy);
        assert_eq!(signals.severity(SIG_FILE_TYPE), 0.9);
    }
}
