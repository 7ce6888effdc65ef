use cert_triage::core::account::ResolvedReporter;
use cert_triage::core::policy::Policy;
use cert_triage::core::store::IncidentStore;
use cert_triage::core::types::{RawSubmission, ThresholdBand};
use cert_triage::pipeline::TriagePipeline;
use httpmock::prelude::*;

fn high_priority_submission() -> RawSubmission {
    RawSubmission {
        description: Some("ransomware encrypted all files, demanding payment".to_string()),
        url: None,
        file: None,
    }
}

fn policy_with_webhook(url: String) -> Policy {
    let mut policy = Policy::builtin();
    policy.alerting.webhook_url = Some(url);
    policy.alerting.backoff_ms = 1;
    policy
}

#[tokio::test]
async fn delivery_is_recorded_with_signature_and_summary() {
    let server = MockServer::start();
    let webhook = server.mock(|when, then| {
        when.method(POST)
            .path("/webhook")
            .header("Content-Type", "application/json")
            .header_exists("X-CERT-Signature")
            .body_contains("priority_score");
        then.status(200);
    });

    let mut store = IncidentStore::open_in_memory().unwrap();
    let pipeline = TriagePipeline::new(policy_with_webhook(server.url("/webhook"))).unwrap();
    let outcome = pipeline
        .submit(
            &mut store,
            &ResolvedReporter::anonymous("s"),
            "incident-portal",
            high_priority_submission(),
        )
        .await
        .unwrap();

    assert!(outcome.alert_sent);
    webhook.assert();

    let alerts = store.alerts_for_incident(&outcome.incident_id).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].band, ThresholdBand::High);
    assert!(alerts[0].delivered);
    assert_eq!(alerts[0].attempts, 1);
    assert!(alerts[0].sent_at.is_some());
}

#[tokio::test]
async fn terminal_failure_exhausts_retries_and_keeps_the_incident() {
    let server = MockServer::start();
    let webhook = server.mock(|when, then| {
        when.method(POST).path("/webhook");
        then.status(500);
    });

    let mut store = IncidentStore::open_in_memory().unwrap();
    let policy = policy_with_webhook(server.url("/webhook"));
    let max_attempts = policy.alerting.max_attempts;
    let pipeline = TriagePipeline::new(policy).unwrap();
    let outcome = pipeline
        .submit(
            &mut store,
            &ResolvedReporter::anonymous("s"),
            "incident-portal",
            high_priority_submission(),
        )
        .await
        .unwrap();

    // Submission succeeds regardless of delivery.
    assert!(!outcome.alert_sent);
    assert_eq!(webhook.hits(), max_attempts as usize);
    assert!(store.get(&outcome.incident_id).unwrap().is_some());

    let failed = store.undelivered_alerts().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, max_attempts);
    assert!(failed[0].last_error.is_some());
}

#[tokio::test]
async fn triggering_the_same_band_twice_sends_exactly_one_notification() {
    let server = MockServer::start();
    let webhook = server.mock(|when, then| {
        when.method(POST).path("/webhook");
        then.status(200);
    });

    let mut store = IncidentStore::open_in_memory().unwrap();
    let pipeline = TriagePipeline::new(policy_with_webhook(server.url("/webhook"))).unwrap();
    let outcome = pipeline
        .submit(
            &mut store,
            &ResolvedReporter::anonymous("s"),
            "incident-portal",
            high_priority_submission(),
        )
        .await
        .unwrap();
    assert!(outcome.alert_sent);

    let second = pipeline
        .reclassify(&mut store, &outcome.incident_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!second.alert_sent);
    assert_eq!(webhook.hits(), 1);
    assert_eq!(
        store
            .alerts_for_incident(&outcome.incident_id)
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn missing_webhook_records_the_undeliverable_alert() {
    let mut policy = Policy::builtin();
    policy.alerting.webhook_url = None;

    let mut store = IncidentStore::open_in_memory().unwrap();
    let pipeline = TriagePipeline::new(policy).unwrap();
    let outcome = pipeline
        .submit(
            &mut store,
            &ResolvedReporter::anonymous("s"),
            "incident-portal",
            high_priority_submission(),
        )
        .await
        .unwrap();

    assert!(!outcome.alert_sent);
    let alerts = store.alerts_for_incident(&outcome.incident_id).unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(!alerts[0].delivered);
}
