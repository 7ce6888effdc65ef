use std::fs;
use std::path::Path;

use anyhow::Result;

use crate::core::types::{Incident, OutputFormat, StoreStats};

/// Render an incident listing for the dashboard surface or export.
pub fn render_incidents(incidents: &[Incident], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(incidents),
        OutputFormat::Jsonl => render_jsonl(incidents),
        OutputFormat::Markdown => Ok(render_markdown(incidents)),
        OutputFormat::Csv => Ok(render_csv(incidents)),
    }
}

pub fn write_incidents(
    incidents: &[Incident],
    format: OutputFormat,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_incidents(incidents, format)?)?;
    Ok(())
}

fn render_json(incidents: &[Incident]) -> Result<String> {
    Ok(serde_json::to_string_pretty(incidents)?)
}

fn render_jsonl(incidents: &[Incident]) -> Result<String> {
    let mut out = String::new();
    for incident in incidents {
        out.push_str(&serde_json::to_string(incident)?);
        out.push('\n');
    }
    Ok(out)
}

fn render_markdown(incidents: &[Incident]) -> String {
    let mut out = String::new();
    out.push_str("# Incident Triage Report\n\n");
    out.push_str(&format!("- Incidents: {}\n\n", incidents.len()));
    if incidents.is_empty() {
        out.push_str("No incidents.\n");
        return out;
    }
    for incident in incidents {
        out.push_str(&format!(
            "## {} — {}\n",
            incident.id,
            incident.classification.category.as_str()
        ));
        out.push_str(&format!("- Priority: {:.1}/10\n", incident.priority_score));
        out.push_str(&format!(
            "- Confidence: {:.2}\n",
            incident.classification.confidence
        ));
        out.push_str(&format!("- Status: {}\n", incident.status.as_str()));
        out.push_str(&format!("- Channel: {}\n", incident.channel));
        out.push_str(&format!("- Reporter: {}\n", incident.reporter_id));
        out.push_str(&format!(
            "- Created: {}\n",
            incident.created_at.to_rfc3339()
        ));
        out.push_str(&format!(
            "- Rationale: {}\n",
            incident.classification.rationale
        ));
        if let Some(url) = &incident.evidence.url {
            out.push_str(&format!("- URL evidence: {}\n", url));
        }
        if let Some(file) = &incident.evidence.file {
            out.push_str(&format!(
                "- File evidence: {} ({} bytes, {})\n",
                file.name, file.size_bytes, file.content_hash
            ));
        }
        out.push('\n');
    }
    out
}

fn render_csv(incidents: &[Incident]) -> String {
    let mut out = String::new();
    out.push_str("id,category,confidence,priority_score,status,channel,reporter_id,created_at\n");
    for incident in incidents {
        out.push_str(&format!(
            "{},{},{:.2},{:.1},{},{},{},{}\n",
            incident.id,
            incident.classification.category.as_str(),
            incident.classification.confidence,
            incident.priority_score,
            incident.status.as_str(),
            incident.channel,
            incident.reporter_id,
            incident.created_at.to_rfc3339()
        ));
    }
    out
}

pub fn render_stats_markdown(stats: &StoreStats) -> String {
    let mut out = String::new();
    out.push_str("# Triage Dashboard Stats\n\n");
    out.push_str(&format!("- Total incidents: {}\n", stats.total));
    out.push_str(&format!(
        "- High priority: {}\n\n",
        stats.high_priority_count
    ));
    out.push_str("## By Status\n");
    for (status, count) in &stats.by_status {
        out.push_str(&format!("- {}: {}\n", status, count));
    }
    out.push_str("\n## By Category\n");
    for (category, count) in &stats.by_category {
        out.push_str(&format!("- {}: {}\n", category, count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::core::types::{
        Category, Classification, EvidenceBundle, EvidenceKind, IncidentStatus, SignalSet,
    };

    fn incident() -> Incident {
        let now: DateTime<Utc> = "2026-02-01T12:00:00Z".parse().unwrap();
        Incident {
            id: "inc_000001".to_string(),
            reporter_id: "rep-1".to_string(),
            channel: "incident-portal".to_string(),
            evidence: EvidenceBundle {
                kinds: vec![EvidenceKind::Url],
                text_content: None,
                url: Some("http://203.0.113.5/login-update".to_string()),
                file: None,
                submitted_at: now,
                reporter_id: "rep-1".to_string(),
            },
            signals: SignalSet::new(),
            classification: Classification {
                category: Category::SuspiciousUrl,
                confidence: 0.4,
                signals_used: vec!["url_shape".to_string()],
                rationale: "suspicious-url evidence at severity 0.40".to_string(),
            },
            classification_version: 1,
            priority_score: 6.8,
            status: IncidentStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn markdown_lists_the_core_fields() {
        let out = render_markdown(&[incident()]);
        assert!(out.contains("inc_000001"));
        assert!(out.contains("suspicious-url"));
        assert!(out.contains("6.8/10"));
        assert!(out.contains("203.0.113.5"));
    }

    #[test]
    fn csv_has_one_row_per_incident_plus_header() {
        let out = render_csv(&[incident(), incident()]);
        assert_eq!(out.lines().count(), 3);
        assert!(out.starts_with("id,category"));
    }

    #[test]
    fn jsonl_round_trips() {
        let out = render_jsonl(&[incident()]).unwrap();
        let parsed: Incident = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(parsed.id, "inc_000001");
    }
}
