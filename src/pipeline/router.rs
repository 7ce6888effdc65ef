use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::core::error::TriageError;
use crate::core::hash::alert_dedupe_key;
use crate::core::policy::AlertPolicy;
use crate::core::store::IncidentStore;
use crate::core::time::now_utc;
use crate::core::types::{Incident, ThresholdBand};

type HmacSha256 = Hmac<Sha256>;

/// Threshold policy: high band on score alone, medium band only with
/// corroborating confidence.
pub fn decide(policy: &AlertPolicy, score: f64, confidence: f64) -> Option<ThresholdBand> {
    if score >= policy.high_score {
        Some(ThresholdBand::High)
    } else if score >= policy.medium_score && confidence >= policy.medium_confidence {
        Some(ThresholdBand::Medium)
    } else {
        None
    }
}

/// Notification payload handed to the response-team channel.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentSummary {
    pub incident_id: String,
    pub category: String,
    pub priority_score: f64,
    pub confidence: f64,
    pub band: String,
    pub channel: String,
    pub reporter_id: String,
    pub created_at: DateTime<Utc>,
    pub rationale: String,
    pub text: String,
}

impl IncidentSummary {
    pub fn from_incident(incident: &Incident, band: ThresholdBand) -> Self {
        let text = format!(
            "[{}] {} scored {:.1} ({} band): {}",
            incident.channel,
            incident.id,
            incident.priority_score,
            band.as_str(),
            incident.classification.rationale
        );
        Self {
            incident_id: incident.id.clone(),
            category: incident.classification.category.as_str().to_string(),
            priority_score: incident.priority_score,
            confidence: incident.classification.confidence,
            band: band.as_str().to_string(),
            channel: incident.channel.clone(),
            reporter_id: incident.reporter_id.clone(),
            created_at: incident.created_at,
            rationale: incident.classification.rationale.clone(),
            text,
        }
    }
}

/// `X-CERT-Signature: t=<ts>,v1=<hmac-sha256 hex over "<ts>." + payload>`.
pub fn signature_header(payload: &[u8], secret: &str, ts: i64) -> Result<String, TriageError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TriageError::Notify(e.to_string()))?;
    mac.update(format!("{}.", ts).as_bytes());
    mac.update(payload);
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={},v1={}", ts, digest))
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, secret: &str, timeout_ms: u64) -> Result<Self, TriageError> {
        let client = reqwest::Client::builder()
            .user_agent("cert-triage/1.0")
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(TriageError::from)?;
        Ok(Self {
            client,
            url: url.to_string(),
            secret: secret.to_string(),
        })
    }

    pub async fn send(&self, summary: &IncidentSummary) -> Result<(), TriageError> {
        let payload = serde_json::to_vec(summary)
            .map_err(|e| TriageError::Notify(e.to_string()))?;
        let signature = signature_header(&payload, &self.secret, now_utc().timestamp())?;
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-CERT-Signature", signature)
            .body(payload)
            .send()
            .await
            .map_err(TriageError::from)?;
        if !response.status().is_success() {
            return Err(TriageError::Notify(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Decides, deduplicates, and dispatches escalation notices. Reads the
/// finished incident only; never touches classification or score.
pub struct AlertRouter {
    policy: AlertPolicy,
    notifier: Option<WebhookNotifier>,
}

impl AlertRouter {
    pub fn new(policy: AlertPolicy) -> Result<Self, TriageError> {
        let notifier = match &policy.webhook_url {
            Some(url) => Some(WebhookNotifier::new(
                url,
                &policy.webhook_secret,
                policy.timeout_ms,
            )?),
            None => None,
        };
        Ok(Self { policy, notifier })
    }

    /// Evaluate a freshly stored incident. Returns whether a notification
    /// was delivered. Delivery failures are recorded and surfaced, never
    /// propagated back into the submission path.
    pub async fn route(
        &self,
        store: &mut IncidentStore,
        incident: &Incident,
    ) -> Result<bool, TriageError> {
        let Some(band) = decide(
            &self.policy,
            incident.priority_score,
            incident.classification.confidence,
        ) else {
            return Ok(false);
        };

        if !store.try_reserve_alert(&incident.id, band, &self.policy.channel)? {
            tracing::debug!(
                "alert for {} already recorded in {} band",
                incident.id,
                band.as_str()
            );
            return Ok(false);
        }
        let key = alert_dedupe_key(&incident.id, band);

        let Some(notifier) = &self.notifier else {
            store.mark_alert_failed(&key, 0, "no notification channel configured")?;
            tracing::warn!(
                "incident {} crossed the {} threshold but no webhook is configured",
                incident.id,
                band.as_str()
            );
            return Ok(false);
        };

        let summary = IncidentSummary::from_incident(incident, band);
        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match notifier.send(&summary).await {
                Ok(()) => {
                    store.mark_alert_delivered(&key, attempt, now_utc())?;
                    tracing::info!(
                        "alert for {} delivered on attempt {} ({} band)",
                        incident.id,
                        attempt,
                        band.as_str()
                    );
                    return Ok(true);
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        "alert attempt {}/{} for {} failed: {}",
                        attempt,
                        self.policy.max_attempts,
                        incident.id,
                        last_error
                    );
                    if attempt < self.policy.max_attempts {
                        let backoff = self.policy.backoff_ms * (1u64 << (attempt - 1));
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        store.mark_alert_failed(&key, self.policy.max_attempts, &last_error)?;
        tracing::error!(
            "alert for {} abandoned after {} attempts: {}",
            incident.id,
            self.policy.max_attempts,
            last_error
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::Policy;

    fn alert_policy() -> AlertPolicy {
        Policy::builtin().alerting
    }

    #[test]
    fn score_at_high_threshold_fires_high_band() {
        let policy = alert_policy();
        assert_eq!(decide(&policy, 8.0, 0.1), Some(ThresholdBand::High));
        assert_eq!(decide(&policy, 9.9, 0.0), Some(ThresholdBand::High));
    }

    #[test]
    fn score_just_below_high_threshold_does_not() {
        let policy = alert_policy();
        assert_eq!(decide(&policy, 7.999, 0.5), None);
        assert_eq!(decide(&policy, 7.999, 0.7), Some(ThresholdBand::Medium));
    }

    #[test]
    fn medium_band_requires_confidence() {
        let policy = alert_policy();
        assert_eq!(decide(&policy, 6.0, 0.7), Some(ThresholdBand::Medium));
        assert_eq!(decide(&policy, 6.0, 0.69), None);
        assert_eq!(decide(&policy, 5.9, 0.9), None);
    }

    #[test]
    fn signature_header_is_deterministic_for_fixed_inputs() {
        let a = signature_header(b"{}", "secret", 1_700_000_000).unwrap();
        let b = signature_header(b"{}", "secret", 1_700_000_000).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("t=1700000000,v1="));

        let other_secret = signature_header(b"{}", "other", 1_700_000_000).unwrap();
        assert_ne!(a, other_secret);
    }
}
