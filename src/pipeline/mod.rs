//! The triage pipeline: normalization, feature extraction, classification,
//! scoring, alert routing. Stages within one submission run strictly in
//! order; submissions are independent of each other.

pub mod classifier;
pub mod extractor;
pub mod normalizer;
pub mod query;
pub mod reporter;
pub mod router;
pub mod scorer;

use crate::core::account::ResolvedReporter;
use crate::core::error::{TriageError, ValidationError};
use crate::core::policy::Policy;
use crate::core::store::IncidentStore;
use crate::core::time::now_utc;
use crate::core::types::{NewIncident, RawSubmission, SubmitOutcome};
use crate::pipeline::classifier::{Classifier, RuleClassifier};
use crate::pipeline::router::AlertRouter;

/// Stateless orchestration over the pipeline stages. The store is handed
/// in per call; it is the only shared mutable resource.
pub struct TriagePipeline {
    policy: Policy,
    classifier: Box<dyn Classifier>,
    router: AlertRouter,
}

impl TriagePipeline {
    pub fn new(policy: Policy) -> Result<Self, TriageError> {
        Self::with_classifier(policy, Box::new(RuleClassifier::new()))
    }

    pub fn with_classifier(
        policy: Policy,
        classifier: Box<dyn Classifier>,
    ) -> Result<Self, TriageError> {
        let router = AlertRouter::new(policy.alerting.clone())?;
        Ok(Self {
            policy,
            classifier,
            router,
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run the full pipeline for one submission: normalize, extract,
    /// classify, score, persist, then route. Synchronous from the caller's
    /// perspective; alert delivery failure never fails the submission.
    pub async fn submit(
        &self,
        store: &mut IncidentStore,
        reporter: &ResolvedReporter,
        channel: &str,
        raw: RawSubmission,
    ) -> Result<SubmitOutcome, TriageError> {
        if self.policy.triage.require_verified_reporter && !reporter.verified {
            return Err(ValidationError::UnverifiedReporter.into());
        }

        let now = now_utc();
        let bundle = normalizer::normalize(raw, &reporter.id, &self.policy, now)?;
        let signals = extractor::extract(&bundle, &self.policy);
        let classification = self.classifier.classify(&signals);
        let priority_score =
            scorer::priority_score(classification.category, classification.confidence, &signals);

        let incident = store.create(
            NewIncident {
                reporter_id: reporter.id.clone(),
                channel: channel.to_string(),
                evidence: bundle,
                signals,
                classification,
                priority_score,
            },
            now,
        )?;
        tracing::info!(
            "incident {} classified {} at {:.1} by {}",
            incident.id,
            incident.classification.category.as_str(),
            incident.priority_score,
            self.classifier.name()
        );

        let alert_sent = self.router.route(store, &incident).await?;

        Ok(SubmitOutcome {
            incident_id: incident.id,
            category: incident.classification.category,
            priority_score: incident.priority_score,
            alert_sent,
            next_steps: classifier::recommended_actions(incident.classification.category),
        })
    }

    /// Re-run extraction and classification over the stored evidence. The
    /// previous result is superseded by a new version; the score is
    /// recomputed from the new classification and routing is re-evaluated
    /// (per-band dedup makes that idempotent).
    pub async fn reclassify(
        &self,
        store: &mut IncidentStore,
        id: &str,
    ) -> Result<Option<SubmitOutcome>, TriageError> {
        let Some(incident) = store.get(id)? else {
            return Ok(None);
        };

        let signals = extractor::extract(&incident.evidence, &self.policy);
        let classification = self.classifier.classify(&signals);
        let priority_score =
            scorer::priority_score(classification.category, classification.confidence, &signals);

        let Some(updated) =
            store.update_classification(id, classification, priority_score, now_utc())?
        else {
            return Ok(None);
        };
        tracing::info!(
            "incident {} reclassified {} at {:.1} (version {})",
            updated.id,
            updated.classification.category.as_str(),
            updated.priority_score,
            updated.classification_version
        );

        let alert_sent = self.router.route(store, &updated).await?;

        Ok(Some(SubmitOutcome {
            incident_id: updated.id,
            category: updated.classification.category,
            priority_score: updated.priority_score,
            alert_sent,
            next_steps: classifier::recommended_actions(updated.classification.category),
        }))
    }
}
