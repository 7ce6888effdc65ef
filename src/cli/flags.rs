use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::core::types::{IncidentSort, IncidentStatus, OutputFormat};

#[derive(Parser, Debug)]
#[command(
    name = "cert-triage",
    version,
    about = "CERT incident triage pipeline and dashboard queries"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Triage policy file (TOML); built-in defaults when omitted
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// SQLite path for incidents and alert records
    #[arg(long, default_value = "data/triage.db")]
    pub db_path: PathBuf,

    /// Webhook URL for response-team alerts (overrides policy)
    #[arg(long)]
    pub webhook_url: Option<String>,

    /// Increase verbosity (info, debug, trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Optional log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit an incident report and run the full pipeline
    Submit {
        /// Free-text incident description
        #[arg(long)]
        description: Option<String>,
        /// Related URL evidence
        #[arg(long)]
        url: Option<String>,
        /// Path to an evidence file to attach (max 10 MiB)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Reporter session token; submission is anonymous when omitted
        #[arg(long)]
        token: Option<String>,
        /// Source portal channel
        #[arg(long, default_value = "incident-portal")]
        channel: String,
    },
    /// Show one incident by id
    Show { id: String },
    /// Re-run classification over a stored incident's evidence
    Reclassify { id: String },
    /// List incidents for the triage dashboard
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Minimum priority score
        #[arg(long)]
        min_score: Option<f64>,
        #[arg(long)]
        channel: Option<String>,
        /// Created-at lower bound (RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Created-at upper bound (RFC 3339, exclusive)
        #[arg(long)]
        until: Option<String>,
        #[arg(long, value_enum, default_value = "priority")]
        sort: SortArg,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, value_enum, default_value = "jsonl")]
        format: OutputFormatArg,
        /// Output file path; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Aggregate counts for the dashboard
    Stats,
    /// Apply an analyst status transition
    Status {
        id: String,
        #[arg(value_enum)]
        action: StatusAction,
    },
    /// Alerts that exhausted their retry budget
    FailedAlerts,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SortArg {
    Priority,
    Created,
}

impl From<SortArg> for IncidentSort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Priority => IncidentSort::PriorityDesc,
            SortArg::Created => IncidentSort::CreatedDesc,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StatusAction {
    Investigate,
    Resolve,
}

impl From<StatusAction> for IncidentStatus {
    fn from(value: StatusAction) -> Self {
        match value {
            StatusAction::Investigate => IncidentStatus::UnderInvestigation,
            StatusAction::Resolve => IncidentStatus::Resolved,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormatArg {
    Json,
    Jsonl,
    Markdown,
    Csv,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(value: OutputFormatArg) -> Self {
        match value {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Jsonl => OutputFormat::Jsonl,
            OutputFormatArg::Markdown => OutputFormat::Markdown,
            OutputFormatArg::Csv => OutputFormat::Csv,
        }
    }
}
