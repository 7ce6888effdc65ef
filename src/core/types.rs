use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw submission fields as received from a portal, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSubmission {
    pub description: Option<String>,
    pub url: Option<String>,
    pub file: Option<RawFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFile {
    pub name: String,
    pub declared_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EvidenceKind {
    Description,
    Url,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub size_bytes: u64,
    pub declared_type: String,
    pub content_hash: String,
}

/// One submission's normalized payload. At least one evidence field is
/// present; `url` is a validated absolute URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub kinds: Vec<EvidenceKind>,
    pub text_content: Option<String>,
    pub url: Option<String>,
    pub file: Option<FileRef>,
    pub submitted_at: DateTime<Utc>,
    pub reporter_id: String,
}

/// A named feature derived from evidence, severity bounded to [0,1].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub name: String,
    pub severity: f64,
}

/// Ordered collection of signals, produced once per bundle and immutable
/// thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SignalSet {
    signals: Vec<Signal>,
}

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, severity: f64) {
        let severity = if severity.is_finite() {
            severity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.signals.push(Signal {
            name: name.to_string(),
            severity,
        });
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.signals
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.severity)
    }

    pub fn severity(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn max_severity(&self) -> f64 {
        self.signals.iter().map(|s| s.severity).fold(0.0, f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Closed threat category enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Malware,
    Phishing,
    SuspiciousUrl,
    DataExposure,
    Unclassified,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Malware,
        Category::Phishing,
        Category::SuspiciousUrl,
        Category::DataExposure,
        Category::Unclassified,
    ];

    /// Fixed base weight consumed by the priority scorer.
    pub fn base_weight(self) -> f64 {
        match self {
            Category::Malware => 6.0,
            Category::Phishing => 5.0,
            Category::SuspiciousUrl => 4.0,
            Category::DataExposure => 5.0,
            Category::Unclassified => 1.0,
        }
    }

    /// Fixed total order used to break classification ties; higher rank wins.
    pub fn severity_rank(self) -> u8 {
        match self {
            Category::Malware => 4,
            Category::Phishing => 3,
            Category::DataExposure => 2,
            Category::SuspiciousUrl => 1,
            Category::Unclassified => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Malware => "malware",
            Category::Phishing => "phishing",
            Category::SuspiciousUrl => "suspicious-url",
            Category::DataExposure => "data-exposure",
            Category::Unclassified => "unclassified",
        }
    }

    pub fn parse(value: &str) -> Option<Category> {
        match value.to_lowercase().as_str() {
            "malware" => Some(Category::Malware),
            "phishing" => Some(Category::Phishing),
            "suspicious-url" | "suspicious_url" => Some(Category::SuspiciousUrl),
            "data-exposure" | "data_exposure" => Some(Category::DataExposure),
            "unclassified" => Some(Category::Unclassified),
            _ => None,
        }
    }
}

/// Classifier verdict for one signal set. Never mutated; re-classification
/// stores a new version under the same incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub confidence: f64,
    pub signals_used: Vec<String>,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IncidentStatus {
    Active,
    UnderInvestigation,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::UnderInvestigation => "under-investigation",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<IncidentStatus> {
        match value.to_lowercase().as_str() {
            "active" => Some(IncidentStatus::Active),
            "under-investigation" | "under_investigation" | "investigating" => {
                Some(IncidentStatus::UnderInvestigation)
            }
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }

    /// Legal edges: Active -> UnderInvestigation, UnderInvestigation ->
    /// Resolved, and Active -> Resolved only when the incident is trivially
    /// non-actionable. Resolved is terminal.
    pub fn can_transition(self, to: IncidentStatus, trivially_non_actionable: bool) -> bool {
        match (self, to) {
            (IncidentStatus::Active, IncidentStatus::UnderInvestigation) => true,
            (IncidentStatus::UnderInvestigation, IncidentStatus::Resolved) => true,
            (IncidentStatus::Active, IncidentStatus::Resolved) => trivially_non_actionable,
            _ => false,
        }
    }
}

/// The durable unit of work owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub reporter_id: String,
    pub channel: String,
    pub evidence: EvidenceBundle,
    pub signals: SignalSet,
    pub classification: Classification,
    pub classification_version: u32,
    pub priority_score: f64,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fully classified record ready for the store to persist and key.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub reporter_id: String,
    pub channel: String,
    pub evidence: EvidenceBundle,
    pub signals: SignalSet,
    pub classification: Classification,
    pub priority_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThresholdBand {
    High,
    Medium,
}

impl ThresholdBand {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdBand::High => "high",
            ThresholdBand::Medium => "medium",
        }
    }

    pub fn parse(value: &str) -> Option<ThresholdBand> {
        match value.to_lowercase().as_str() {
            "high" => Some(ThresholdBand::High),
            "medium" => Some(ThresholdBand::Medium),
            _ => None,
        }
    }
}

/// Escalation ledger entry; at most one per dedupe key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub incident_id: String,
    pub dedupe_key: String,
    pub band: ThresholdBand,
    pub channel: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Result of a full pipeline run for one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub incident_id: String,
    pub category: Category,
    pub priority_score: f64,
    pub alert_sent: bool,
    pub next_steps: Vec<String>,
}

/// Composable, AND-combined dashboard predicates. Query-time only; never
/// mutates stored data.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub category: Option<Category>,
    pub min_score: Option<f64>,
    pub channel: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncidentSort {
    /// Priority descending, ties broken newest-first.
    #[default]
    PriorityDesc,
    CreatedDesc,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: u64,
    pub by_status: std::collections::BTreeMap<String, u64>,
    pub by_category: std::collections::BTreeMap<String, u64>,
    pub high_priority_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Markdown,
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_set_clamps_severity() {
        let mut set = SignalSet::new();
        set.push("a", 1.7);
        set.push("b", -0.3);
        set.push("c", f64::NAN);
        assert_eq!(set.severity("a"), 1.0);
        assert_eq!(set.severity("b"), 0.0);
        assert_eq!(set.severity("c"), 0.0);
        assert_eq!(set.max_severity(), 1.0);
    }

    #[test]
    fn status_machine_allows_only_forward_edges() {
        use IncidentStatus::*;
        assert!(Active.can_transition(UnderInvestigation, false));
        assert!(UnderInvestigation.can_transition(Resolved, false));
        assert!(Active.can_transition(Resolved, true));
        assert!(!Active.can_transition(Resolved, false));
        assert!(!Resolved.can_transition(Active, true));
        assert!(!Resolved.can_transition(UnderInvestigation, true));
        assert!(!UnderInvestigation.can_transition(Active, false));
    }

    #[test]
    fn category_ranks_are_distinct() {
        let mut ranks: Vec<u8> = Category::ALL.iter().map(|c| c.severity_rank()).collect();
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks.len(), Category::ALL.len());
    }
}
