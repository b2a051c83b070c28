use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use jm_common::db::{
    DbPoolError, MemoryStore, MigrationError, PgStore, PostingStore, StoreError,
    create_pool_from_url, run_migrations,
};
use jm_common::ingest::{
    IngestReport, ReclassifyReport, UpsertConfig, deactivate_stale, ingest_raw_postings,
    reclassify_pool,
};
use jm_common::logging::init_tracing_subscriber;
use jm_common::run_id;
use jm_metrics::{METRICS_PORT_ENV, init_metrics};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "jm-ingestor",
    about = "Normalize, classify and store a batch of raw job postings"
)]
struct Cli {
    /// JSON array (or JSON lines) of raw posting records; `-` reads stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Use an in-memory store instead of PostgreSQL
    #[arg(long)]
    dry_run: bool,

    /// Postings per upsert chunk
    #[arg(long, env = "JM_INGEST_CHUNK_SIZE", default_value_t = 100)]
    chunk_size: usize,

    /// Concurrent writes within one chunk
    #[arg(long, env = "JM_INGEST_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Pause between chunks in milliseconds
    #[arg(long, env = "JM_INGEST_CHUNK_DELAY_MS", default_value_t = 0)]
    chunk_delay_ms: u64,

    /// Per-posting write timeout in seconds
    #[arg(long, env = "JM_INGEST_WRITE_TIMEOUT_SECS", default_value_t = 10)]
    write_timeout_secs: u64,

    /// Re-run the eligibility rules over the stored active pool afterwards
    #[arg(long)]
    reclassify: bool,

    /// Deactivate postings not seen for this many days
    #[arg(long, env = "JM_STALE_AFTER_DAYS")]
    stale_after_days: Option<i64>,

    /// Skip reading input and only run pool maintenance
    #[arg(long)]
    maintenance_only: bool,

    /// Write the run report here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn upsert_config(&self) -> UpsertConfig {
        UpsertConfig {
            chunk_size: self.chunk_size.max(1),
            concurrency: self.concurrency.max(1),
            inter_chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            write_timeout: Duration::from_secs(self.write_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Error)]
enum IngestorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("DATABASE_URL is required unless --dry-run is set")]
    MissingDatabaseUrl,
    #[error("database pool error: {0}")]
    DbPool(#[from] DbPoolError),
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("posting store error: {0}")]
    Store(#[from] StoreError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ingest: Option<IngestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reclassify: Option<ReclassifyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_deactivated: Option<u64>,
}

/// Accepts a JSON array, or one JSON value per line.
fn parse_records(text: &str) -> Result<Vec<Value>, IngestorError> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Value>(trimmed)? {
            Value::Array(records) => Ok(records),
            _ => Err(IngestorError::Input("expected a JSON array".into())),
        };
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| IngestorError::Input(format!("line {}: {e}", n + 1)))
        })
        .collect()
}

async fn read_input(input: &str) -> Result<String, IngestorError> {
    if input == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(text);
    }
    Ok(tokio::fs::read_to_string(input).await?)
}

async fn execute<S: PostingStore>(
    cli: &Cli,
    store: &S,
    records: Vec<Value>,
) -> Result<RunReport, IngestorError> {
    let now = Utc::now();
    let mut report = RunReport {
        run_id: run_id::get().to_string(),
        ..RunReport::default()
    };

    if !cli.maintenance_only {
        report.ingest = Some(ingest_raw_postings(records, store, &cli.upsert_config(), now).await);
    }
    if cli.reclassify {
        report.reclassify = Some(reclassify_pool(store).await?);
    }
    if let Some(days) = cli.stale_after_days {
        let affected = deactivate_stale(store, chrono::Duration::days(days.max(0)), now).await?;
        report.stale_deactivated = Some(affected);
    }

    Ok(report)
}

async fn emit(cli: &Cli, report: &RunReport) -> Result<(), IngestorError> {
    let body = serde_json::to_string_pretty(report)?;
    match &cli.report {
        Some(path) => tokio::fs::write(path, body).await?,
        None => println!("{body}"),
    }
    Ok(())
}

async fn run() -> Result<(), IngestorError> {
    dotenv().ok();
    init_tracing_subscriber("jm-ingestor");
    init_metrics("jm-ingestor", METRICS_PORT_ENV, 9464);

    let cli = Cli::parse();
    let records = if cli.maintenance_only {
        Vec::new()
    } else {
        parse_records(&read_input(&cli.input).await?)?
    };
    info!(
        records = records.len(),
        dry_run = cli.dry_run,
        reclassify = cli.reclassify,
        "starting ingest run"
    );

    let report = if cli.dry_run {
        execute(&cli, &MemoryStore::new(), records).await?
    } else {
        let url = cli
            .database_url
            .as_deref()
            .ok_or(IngestorError::MissingDatabaseUrl)?;
        let pool = create_pool_from_url(url)?;
        run_migrations(&pool).await?;
        execute(&cli, &PgStore::new(pool), records).await?
    };

    if let Some(ingest) = &report.ingest {
        if !ingest.write_errors.is_empty() {
            warn!(write_errors = ingest.write_errors.len(), "some postings were not stored");
        }
    }
    emit(&cli, &report).await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("jm-ingestor failed: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["jm-ingestor"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn raw(title: &str, employer: &str, location: &str) -> Value {
        json!({
            "title": title,
            "company": employer,
            "location": location,
            "url": format!("https://jobs.example.com/{}", title.replace(' ', "-")),
            "source": "fixture",
            "description": "Entry-level role for recent graduates.",
        })
    }

    #[test]
    fn parses_arrays_and_json_lines() {
        let array = parse_records(r#"[{"title":"A"},{"title":"B"}]"#).unwrap();
        assert_eq!(array.len(), 2);

        let lines = parse_records("{\"title\":\"A\"}\n\n{\"title\":\"B\"}\n").unwrap();
        assert_eq!(lines.len(), 2);

        assert!(parse_records("   ").unwrap().is_empty());
        assert!(matches!(parse_records(r#"{"title":"A"}
not json"#), Err(IngestorError::Input(msg)) if msg.starts_with("line 2")));
    }

    #[test]
    fn cli_builds_upsert_config() {
        let cli = cli(&["--dry-run", "--chunk-size", "0", "--chunk-delay-ms", "250"]);
        let config = cli.upsert_config();

        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.inter_chunk_delay, Duration::from_millis(250));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn dry_run_ingests_and_reports() {
        let cli = cli(&["--dry-run", "--reclassify", "--stale-after-days", "30"]);
        let store = MemoryStore::new();
        let records = vec![
            raw("Graduate Analyst", "Acme", "London, GB"),
            raw("Graduate Analyst", "Acme", "London, GB"),
            json!({"title": "No url"}),
        ];

        let report = execute(&cli, &store, records).await.unwrap();

        let ingest = report.ingest.unwrap();
        assert_eq!(ingest.received, 3);
        assert_eq!(ingest.rejected.len(), 1);
        assert_eq!(store.all_postings().await.len(), 1);
        assert!(report.reclassify.is_some());
        assert_eq!(report.stale_deactivated, Some(0));
    }

    #[tokio::test]
    async fn maintenance_only_skips_ingest() {
        let cli = cli(&["--dry-run", "--maintenance-only", "--reclassify"]);

        let report = execute(&cli, &MemoryStore::new(), Vec::new()).await.unwrap();

        assert!(report.ingest.is_none());
        assert_eq!(report.reclassify.map(|r| r.saved), Some(0));
    }
}
