use crate::core::types::{Category, Classification, SignalSet};
use crate::pipeline::extractor::{
    SIG_FILE_TYPE, SIG_KEYWORD_EXPOSURE, SIG_KEYWORD_MALWARE, SIG_KEYWORD_PHISHING, SIG_URL_SHAPE,
};

// Category evidence below this floor maps to Unclassified.
const MIN_CATEGORY_SIGNAL: f64 = 0.25;
const UNCLASSIFIED_CONFIDENCE: f64 = 0.2;
// Executable-grade attachments count as malware evidence on their own.
const EXECUTABLE_FILE_SEVERITY: f64 = 0.8;

/// Maps a signal set to a category and confidence. Implementations must be
/// deterministic and total: every signal set maps to exactly one result,
/// never an error. A statistical-model implementation can replace the rule
/// table without changing callers.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn classify(&self, signals: &SignalSet) -> Classification;
}

/// Rule-table classifier: each category is scored from its tagged signals;
/// the arg-max wins, with ties broken by the fixed category severity rank.
#[derive(Debug, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn category_score(signals: &SignalSet, category: Category) -> (f64, Vec<&'static str>) {
        match category {
            Category::Malware => {
                let keywords = signals.severity(SIG_KEYWORD_MALWARE);
                let file = signals.severity(SIG_FILE_TYPE);
                let file_evidence = if file >= EXECUTABLE_FILE_SEVERITY {
                    file * 0.75
                } else {
                    0.0
                };
                if file_evidence > keywords {
                    (file_evidence, vec![SIG_FILE_TYPE])
                } else {
                    (keywords, vec![SIG_KEYWORD_MALWARE])
                }
            }
            Category::Phishing => {
                let keywords = signals.severity(SIG_KEYWORD_PHISHING);
                let shape = signals.severity(SIG_URL_SHAPE);
                if keywords > 0.0 && shape > 0.0 {
                    // A lure with a matching link corroborates the keywords.
                    (
                        (keywords + shape * 0.25).min(1.0),
                        vec![SIG_KEYWORD_PHISHING, SIG_URL_SHAPE],
                    )
                } else {
                    (keywords, vec![SIG_KEYWORD_PHISHING])
                }
            }
            Category::SuspiciousUrl => (signals.severity(SIG_URL_SHAPE), vec![SIG_URL_SHAPE]),
            Category::DataExposure => (
                signals.severity(SIG_KEYWORD_EXPOSURE),
                vec![SIG_KEYWORD_EXPOSURE],
            ),
            Category::Unclassified => (0.0, vec![]),
        }
    }
}

impl Classifier for RuleClassifier {
    fn name(&self) -> &'static str {
        "rule-table"
    }

    fn classify(&self, signals: &SignalSet) -> Classification {
        let mut best: Option<(Category, f64, Vec<&'static str>)> = None;
        for category in Category::ALL {
            if category == Category::Unclassified {
                continue;
            }
            let (score, used) = Self::category_score(signals, category);
            let wins = match &best {
                None => true,
                Some((current, current_score, _)) => {
                    score > *current_score
                        || (score == *current_score
                            && category.severity_rank() > current.severity_rank())
                }
            };
            if wins {
                best = Some((category, score, used));
            }
        }

        match best {
            Some((category, score, used)) if score >= MIN_CATEGORY_SIGNAL => Classification {
                category,
                confidence: score.clamp(0.0, 1.0),
                signals_used: used
                    .into_iter()
                    .filter(|name| signals.severity(name) > 0.0)
                    .map(|name| name.to_string())
                    .collect(),
                rationale: format!(
                    "{} evidence at severity {:.2}",
                    category.as_str(),
                    score
                ),
            },
            _ => Classification {
                category: Category::Unclassified,
                confidence: UNCLASSIFIED_CONFIDENCE,
                signals_used: vec![],
                rationale: "no category signal above the classification floor".to_string(),
            },
        }
    }
}

/// Guidance echoed back to the reporter alongside the triage result.
pub fn recommended_actions(category: Category) -> Vec<String> {
    let steps: &[&str] = match category {
        Category::Malware => &[
            "Disconnect affected systems from the network",
            "Preserve logs and the suspicious artifact",
            "Do not pay any ransom demand; contact your security team",
        ],
        Category::Phishing => &[
            "Do not enter credentials on the linked page",
            "Reset any password already submitted",
            "Report the sender to your mail provider",
        ],
        Category::SuspiciousUrl => &[
            "Avoid visiting the reported address",
            "Verify the destination through an official channel",
        ],
        Category::DataExposure => &[
            "Identify the affected records and rotate exposed credentials",
            "Notify the data owner",
        ],
        Category::Unclassified => &[
            "No immediate action required; the report stays on file for analysts",
        ],
    };
    steps.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(entries: &[(&str, f64)]) -> SignalSet {
        let mut set = SignalSet::new();
        for (name, severity) in entries {
            set.push(name, *severity);
        }
        set
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = RuleClassifier::new();
        let set = signals(&[(SIG_KEYWORD_MALWARE, 0.7), (SIG_URL_SHAPE, 0.4)]);
        assert_eq!(classifier.classify(&set), classifier.classify(&set));
    }

    #[test]
    fn empty_signal_set_is_unclassified_not_an_error() {
        let classifier = RuleClassifier::new();
        let result = classifier.classify(&SignalSet::new());
        assert_eq!(result.category, Category::Unclassified);
        assert!(result.confidence <= 0.3);
    }

    #[test]
    fn equal_scores_break_ties_by_severity_rank() {
        let classifier = RuleClassifier::new();

        let set = signals(&[(SIG_KEYWORD_MALWARE, 0.5), (SIG_KEYWORD_EXPOSURE, 0.5)]);
        assert_eq!(classifier.classify(&set).category, Category::Malware);

        let set = signals(&[(SIG_KEYWORD_EXPOSURE, 0.5), (SIG_URL_SHAPE, 0.5)]);
        assert_eq!(classifier.classify(&set).category, Category::DataExposure);
    }

    #[test]
    fn ip_literal_url_alone_is_suspicious_url() {
        let classifier = RuleClassifier::new();
        let set = signals(&[(SIG_URL_SHAPE, 0.4)]);
        let result = classifier.classify(&set);
        assert_eq!(result.category, Category::SuspiciousUrl);
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert_eq!(result.signals_used, vec![SIG_URL_SHAPE.to_string()]);
    }

    #[test]
    fn executable_attachment_classifies_as_malware() {
        let classifier = RuleClassifier::new();
        let set = signals(&[(SIG_FILE_TYPE, 0.9)]);
        let result = classifier.classify(&set);
        assert_eq!(result.category, Category::Malware);

        // Mid-severity unknown types are not malware evidence by themselves.
        let set = signals(&[(SIG_FILE_TYPE, 0.5)]);
        let result = classifier.classify(&set);
        assert_eq!(result.category, Category::Unclassified);
    }

    #[test]
    fn weak_signals_fall_below_the_floor() {
        let classifier = RuleClassifier::new();
        let set = signals(&[(SIG_KEYWORD_PHISHING, 0.2)]);
        assert_eq!(classifier.classify(&set).category, Category::Unclassified);
    }

    #[test]
    fn every_category_has_recommended_actions() {
        for category in Category::ALL {
            assert!(!recommended_actions(category).is_empty());
        }
    }
}
