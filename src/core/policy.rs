use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::core::error::TriageError;

/// Validated triage policy: term tables, heuristics, limits, and alerting
/// thresholds. Loaded from TOML or built from defaults.
#[derive(Debug, Clone)]
pub struct Policy {
    pub terms: TermLists,
    pub url: UrlHeuristics,
    pub files: FilePolicy,
    pub limits: Limits,
    pub privacy: Privacy,
    pub alerting: AlertPolicy,
    pub triage: TriageRules,
}

#[derive(Debug, Clone)]
pub struct TermLists {
    pub malware: Vec<String>,
    pub phishing: Vec<String>,
    pub exposure: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UrlHeuristics {
    pub suspicious_tlds: Vec<String>,
    pub max_subdomain_depth: usize,
}

#[derive(Debug, Clone)]
pub struct FilePolicy {
    pub severities: BTreeMap<String, f64>,
    pub unknown_severity: f64,
}

#[derive(Debug, Clone)]
pub struct Limits {
    pub max_text_chars: usize,
}

#[derive(Debug, Clone)]
pub struct Privacy {
    pub redact_patterns: Vec<Regex>,
    pub redact_patterns_raw: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub high_score: f64,
    pub medium_score: f64,
    pub medium_confidence: f64,
    pub channel: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TriageRules {
    pub auto_resolve_confidence: f64,
    pub require_verified_reporter: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct PolicyRaw {
    #[serde(default)]
    terms: TermsRaw,
    #[serde(default)]
    url: UrlRaw,
    #[serde(default)]
    files: FilesRaw,
    #[serde(default)]
    limits: LimitsRaw,
    #[serde(default)]
    privacy: PrivacyRaw,
    #[serde(default)]
    alerting: AlertingRaw,
    #[serde(default)]
    triage: TriageRaw,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct TermsRaw {
    #[serde(default)]
    malware: Vec<String>,
    #[serde(default)]
    phishing: Vec<String>,
    #[serde(default)]
    exposure: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UrlRaw {
    #[serde(default)]
    suspicious_tlds: Vec<String>,
    #[serde(default = "default_subdomain_depth")]
    max_subdomain_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct FilesRaw {
    #[serde(default)]
    severities: BTreeMap<String, f64>,
    #[serde(default = "default_unknown_severity")]
    unknown_severity: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LimitsRaw {
    #[serde(default = "default_max_text_chars")]
    max_text_chars: usize,
}

impl Default for UrlRaw {
    fn default() -> Self {
        Self {
            suspicious_tlds: Vec::new(),
            max_subdomain_depth: default_subdomain_depth(),
        }
    }
}

impl Default for FilesRaw {
    fn default() -> Self {
        Self {
            severities: BTreeMap::new(),
            unknown_severity: default_unknown_severity(),
        }
    }
}

impl Default for LimitsRaw {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PrivacyRaw {
    #[serde(default)]
    redact_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlertingRaw {
    #[serde(default = "default_high_score")]
    high_score: f64,
    #[serde(default = "default_medium_score")]
    medium_score: f64,
    #[serde(default = "default_medium_confidence")]
    medium_confidence: f64,
    #[serde(default = "default_channel")]
    channel: String,
    #[serde(default)]
    webhook_url: Option<String>,
    #[serde(default = "default_webhook_secret")]
    webhook_secret: String,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    backoff_ms: u64,
}

impl Default for AlertingRaw {
    fn default() -> Self {
        Self {
            high_score: default_high_score(),
            medium_score: default_medium_score(),
            medium_confidence: default_medium_confidence(),
            channel: default_channel(),
            webhook_url: None,
            webhook_secret: default_webhook_secret(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TriageRaw {
    #[serde(default = "default_auto_resolve_confidence")]
    auto_resolve_confidence: f64,
    #[serde(default)]
    require_verified_reporter: bool,
}

impl Default for TriageRaw {
    fn default() -> Self {
        Self {
            auto_resolve_confidence: default_auto_resolve_confidence(),
            require_verified_reporter: false,
        }
    }
}

pub fn load_policy(path: &Path) -> Result<Policy, TriageError> {
    let data =
        std::fs::read_to_string(path).map_err(|e| TriageError::Config(e.to_string()))?;
    let raw: PolicyRaw =
        toml::from_str(&data).map_err(|e| TriageError::Config(e.to_string()))?;
    Policy::from_raw(raw)
}

impl Policy {
    /// Built-in policy used when no file is given.
    pub fn builtin() -> Self {
        Policy::from_raw(PolicyRaw::default()).expect("builtin policy is valid")
    }

    pub(crate) fn from_raw(raw: PolicyRaw) -> Result<Self, TriageError> {
        let mut compiled = Vec::new();
        for pat in raw.privacy.redact_patterns.iter() {
            compiled.push(Regex::new(pat).map_err(|e| TriageError::Config(e.to_string()))?);
        }

        let terms = TermLists {
            malware: or_default(raw.terms.malware, default_malware_terms),
            phishing: or_default(raw.terms.phishing, default_phishing_terms),
            exposure: or_default(raw.terms.exposure, default_exposure_terms),
        };

        let policy = Self {
            terms,
            url: UrlHeuristics {
                suspicious_tlds: or_default(raw.url.suspicious_tlds, default_suspicious_tlds),
                max_subdomain_depth: raw.url.max_subdomain_depth,
            },
            files: FilePolicy {
                severities: if raw.files.severities.is_empty() {
                    default_file_severities()
                } else {
                    raw.files.severities
                },
                unknown_severity: raw.files.unknown_severity,
            },
            limits: Limits {
                max_text_chars: raw.limits.max_text_chars,
            },
            privacy: Privacy {
                redact_patterns: compiled,
                redact_patterns_raw: raw.privacy.redact_patterns,
            },
            alerting: AlertPolicy {
                high_score: raw.alerting.high_score,
                medium_score: raw.alerting.medium_score,
                medium_confidence: raw.alerting.medium_confidence,
                channel: raw.alerting.channel,
                webhook_url: raw.alerting.webhook_url,
                webhook_secret: raw.alerting.webhook_secret,
                timeout_ms: raw.alerting.timeout_ms,
                max_attempts: raw.alerting.max_attempts,
                backoff_ms: raw.alerting.backoff_ms,
            },
            triage: TriageRules {
                auto_resolve_confidence: raw.triage.auto_resolve_confidence,
                require_verified_reporter: raw.triage.require_verified_reporter,
            },
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), TriageError> {
        if self.limits.max_text_chars == 0 {
            return Err(TriageError::Config(
                "limits.max_text_chars must be positive".into(),
            ));
        }
        if self.alerting.medium_score > self.alerting.high_score {
            return Err(TriageError::Config(
                "alerting.medium_score must not exceed alerting.high_score".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alerting.medium_confidence) {
            return Err(TriageError::Config(
                "alerting.medium_confidence must be in [0,1]".into(),
            ));
        }
        if self.alerting.max_attempts == 0 {
            return Err(TriageError::Config(
                "alerting.max_attempts must be at least 1".into(),
            ));
        }
        for (ext, sev) in self.files.severities.iter() {
            if !(0.0..=1.0).contains(sev) {
                return Err(TriageError::Config(format!(
                    "files.severities.{} must be in [0,1]",
                    ext
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.files.unknown_severity) {
            return Err(TriageError::Config(
                "files.unknown_severity must be in [0,1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.triage.auto_resolve_confidence) {
            return Err(TriageError::Config(
                "triage.auto_resolve_confidence must be in [0,1]".into(),
            ));
        }
        Ok(())
    }
}

fn or_default(values: Vec<String>, fallback: fn() -> Vec<String>) -> Vec<String> {
    if values.is_empty() {
        fallback()
    } else {
        values.iter().map(|s| s.to_lowercase()).collect()
    }
}

fn default_malware_terms() -> Vec<String> {
    [
        "ransomware",
        "ransom",
        "encrypt",
        "malware",
        "trojan",
        "virus",
        "worm",
        "spyware",
        "keylogger",
        "botnet",
        "backdoor",
        "rootkit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_phishing_terms() -> Vec<String> {
    [
        "phishing",
        "verify your account",
        "suspended",
        "click here",
        "urgent action",
        "password reset",
        "banking details",
        "login credentials",
        "confirm your identity",
        "unusual activity",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exposure_terms() -> Vec<String> {
    [
        "data breach",
        "leaked",
        "leak",
        "exposed database",
        "credentials dump",
        "stolen records",
        "personal data",
        "exfiltrat",
        "dumped",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_suspicious_tlds() -> Vec<String> {
    ["zip", "mov", "tk", "top", "gq", "ml", "cf", "xyz", "click", "icu"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_file_severities() -> BTreeMap<String, f64> {
    let table = [
        ("exe", 0.9),
        ("dll", 0.9),
        ("scr", 0.9),
        ("bat", 0.85),
        ("cmd", 0.85),
        ("ps1", 0.85),
        ("js", 0.8),
        ("vbs", 0.8),
        ("jar", 0.75),
        ("zip", 0.7),
        ("rar", 0.7),
        ("7z", 0.7),
        ("iso", 0.7),
        ("docm", 0.65),
        ("xlsm", 0.65),
        ("doc", 0.55),
        ("xls", 0.55),
        ("pdf", 0.4),
        ("html", 0.4),
        ("txt", 0.2),
        ("log", 0.2),
        ("png", 0.2),
        ("jpg", 0.2),
        ("jpeg", 0.2),
        ("eml", 0.5),
    ];
    table
        .iter()
        .map(|(ext, sev)| (ext.to_string(), *sev))
        .collect()
}

fn default_subdomain_depth() -> usize {
    3
}

fn default_unknown_severity() -> f64 {
    0.5
}

fn default_max_text_chars() -> usize {
    4000
}

fn default_high_score() -> f64 {
    8.0
}

fn default_medium_score() -> f64 {
    6.0
}

fn default_medium_confidence() -> f64 {
    0.7
}

fn default_channel() -> String {
    "cert-response".to_string()
}

fn default_webhook_secret() -> String {
    "dev_cert_secret".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    200
}

fn default_auto_resolve_confidence() -> f64 {
    0.4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policy_validates() {
        let policy = Policy::builtin();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.alerting.high_score, 8.0);
        assert!(policy.terms.malware.contains(&"ransomware".to_string()));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let toml_str = "[alerting]\nhigh_score = 5.0\nmedium_score = 6.0\n";
        let raw: PolicyRaw = toml::from_str(toml_str).unwrap();
        assert!(Policy::from_raw(raw).is_err());
    }

    #[test]
    fn file_overrides_replace_defaults() {
        let toml_str = "[files]\n[files.severities]\nexe = 1.0\n";
        let raw: PolicyRaw = toml::from_str(toml_str).unwrap();
        let policy = Policy::from_raw(raw).unwrap();
        assert_eq!(policy.files.severities.get("exe"), Some(&1.0));
        assert_eq!(policy.files.severities.get("pdf"), None);
    }

    #[test]
    fn bad_redact_pattern_is_a_config_error() {
        let toml_str = "[privacy]\nredact_patterns = [\"(\"]\n";
        let raw: PolicyRaw = toml::from_str(toml_str).unwrap();
        assert!(Policy::from_raw(raw).is_err());
    }
}
