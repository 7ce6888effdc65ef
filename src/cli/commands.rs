use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::cli::flags::{Cli, Command};
use crate::core::account::ReporterDirectory;
use crate::core::policy::{load_policy, Policy};
use crate::core::store::IncidentStore;
use crate::core::time::now_utc;
use crate::core::types::{
    Category, IncidentFilter, IncidentStatus, Page, RawFile, RawSubmission,
};
use crate::pipeline::query::DashboardQuery;
use crate::pipeline::reporter::{render_incidents, render_stats_markdown, write_incidents};
use crate::pipeline::TriagePipeline;

pub async fn run(cli: Cli) -> Result<()> {
    let mut policy = resolve_policy(&cli)?;
    if let Some(url) = &cli.webhook_url {
        policy.alerting.webhook_url = Some(url.clone());
    }
    let mut store = IncidentStore::new(&cli.db_path)?;

    match cli.command {
        Command::Submit {
            description,
            url,
            file,
            token,
            channel,
        } => {
            let raw = RawSubmission {
                description,
                url,
                file: match file {
                    Some(path) => {
                        let bytes = std::fs::read(&path)
                            .with_context(|| format!("reading evidence file {}", path.display()))?;
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| "evidence".to_string());
                        Some(RawFile {
                            name,
                            declared_type: None,
                            bytes,
                        })
                    }
                    None => None,
                },
            };

            // Token resolution backed by the account collaborator; unknown
            // tokens degrade to an opaque anonymous reporter.
            let directory = ReporterDirectory::new();
            let reporter = directory.resolve_reporter(token.as_deref());

            let pipeline = TriagePipeline::new(policy)?;
            let outcome = pipeline.submit(&mut store, &reporter, &channel, raw).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Show { id } => {
            let incident = store
                .get(&id)?
                .ok_or_else(|| anyhow!("incident not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(&incident)?);
        }
        Command::Reclassify { id } => {
            let pipeline = TriagePipeline::new(policy)?;
            let outcome = pipeline
                .reclassify(&mut store, &id)
                .await?
                .ok_or_else(|| anyhow!("incident not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::List {
            status,
            category,
            min_score,
            channel,
            since,
            until,
            sort,
            limit,
            offset,
            format,
            output,
        } => {
            let filter = IncidentFilter {
                status: parse_opt(status.as_deref(), IncidentStatus::parse, "status")?,
                category: parse_opt(category.as_deref(), Category::parse, "category")?,
                min_score,
                channel,
                since: parse_time(since.as_deref(), "since")?,
                until: parse_time(until.as_deref(), "until")?,
            };
            let page = Page { limit, offset };
            let query = DashboardQuery::new(&store);
            let incidents = query.list(&filter, sort.into(), &page)?;
            match output {
                Some(path) => {
                    write_incidents(&incidents, format.into(), &path)?;
                    tracing::info!("wrote {} incidents to {}", incidents.len(), path.display());
                }
                None => print!("{}", render_incidents(&incidents, format.into())?),
            }
        }
        Command::Stats => {
            let query = DashboardQuery::new(&store);
            let stats = query.stats(policy.alerting.high_score)?;
            print!("{}", render_stats_markdown(&stats));
        }
        Command::Status { id, action } => {
            let incident = store
                .set_status(
                    &id,
                    action.into(),
                    policy.triage.auto_resolve_confidence,
                    now_utc(),
                )?
                .ok_or_else(|| anyhow!("incident not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(&incident)?);
        }
        Command::FailedAlerts => {
            let failed = store.undelivered_alerts()?;
            println!("{}", serde_json::to_string_pretty(&failed)?);
        }
    }
    Ok(())
}

fn resolve_policy(cli: &Cli) -> Result<Policy> {
    match &cli.policy {
        Some(path) => {
            let policy = load_policy(path)
                .with_context(|| format!("loading policy {}", path.display()))?;
            tracing::info!("policy loaded from {}", path.display());
            Ok(policy)
        }
        None => Ok(Policy::builtin()),
    }
}

fn parse_opt<T>(
    value: Option<&str>,
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> Result<Option<T>> {
    match value {
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| anyhow!("invalid {}: {}", what, raw)),
        None => Ok(None),
    }
}

fn parse_time(value: Option<&str>, what: &str) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| anyhow!("invalid {} timestamp: {}", what, e)),
        None => Ok(None),
    }
}
