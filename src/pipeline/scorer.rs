use crate::core::types::{Category, SignalSet};

/// Closed-form priority score in [0, 10], rounded to one decimal:
/// `base_weight(category) + confidence * 4 + max_signal_severity * 3`.
/// Pure and total; out-of-range inputs are clamped, never rejected.
/// Monotone non-decreasing in confidence and in the maximum severity.
pub fn priority_score(category: Category, confidence: f64, signals: &SignalSet) -> f64 {
    let confidence = clamp_unit(confidence);
    let max_severity = clamp_unit(signals.max_severity());
    let raw = category.base_weight() + confidence * 4.0 + max_severity * 3.0;
    round_one_decimal(raw.clamp(0.0, 10.0))
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(severity: f64) -> SignalSet {
        let mut set = SignalSet::new();
        set.push("keyword_match", severity);
        set
    }

    #[test]
    fn scores_stay_in_range_for_all_categories() {
        for category in Category::ALL {
            for conf in [0.0, 0.25, 0.5, 1.0] {
                for sev in [0.0, 0.5, 1.0] {
                    let score = priority_score(category, conf, &signals(sev));
                    assert!((0.0..=10.0).contains(&score), "{:?} -> {}", category, score);
                }
            }
        }
    }

    #[test]
    fn monotone_in_confidence_for_fixed_category_and_signals() {
        let set = signals(0.5);
        let mut last = 0.0;
        for step in 0..=20 {
            let conf = step as f64 / 20.0;
            let score = priority_score(Category::Phishing, conf, &set);
            assert!(score >= last, "score decreased at confidence {}", conf);
            last = score;
        }
    }

    #[test]
    fn monotone_in_max_signal_severity() {
        let mut last = 0.0;
        for step in 0..=20 {
            let sev = step as f64 / 20.0;
            let score = priority_score(Category::Malware, 0.5, &signals(sev));
            assert!(score >= last, "score decreased at severity {}", sev);
            last = score;
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped_not_rejected() {
        let set = signals(1.0);
        let capped = priority_score(Category::Malware, 1.0, &set);
        assert_eq!(priority_score(Category::Malware, 7.5, &set), capped);
        assert_eq!(priority_score(Category::Malware, f64::NAN, &signals(0.0)), 6.0);
        assert_eq!(priority_score(Category::Malware, -3.0, &signals(0.0)), 6.0);
    }

    #[test]
    fn result_is_rounded_to_one_decimal() {
        let score = priority_score(Category::SuspiciousUrl, 0.33, &signals(0.11));
        assert_eq!(score, (score * 10.0).round() / 10.0);
    }

    #[test]
    fn saturated_malware_evidence_clamps_at_ten() {
        assert_eq!(priority_score(Category::Malware, 1.0, &signals(1.0)), 10.0);
    }
}
