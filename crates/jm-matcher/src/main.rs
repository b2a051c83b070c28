use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use jm_common::UserProfile;
use jm_common::db::{
    DbPoolError, MatchStore, MemoryStore, MigrationError, PgStore, PostingStore,
    create_pool_from_url, run_migrations,
};
use jm_common::ingest::{UpsertConfig, ingest_raw_postings};
use jm_common::logging::init_tracing_subscriber;
use jm_common::matching::{
    DistributorConfig, HttpScoringBackend, LlmRuntimeConfig, MatchRun, MatchingConfig,
    MatchingEngine, PipelineError, ScoringBackend, SelectorConfig, SourceKey,
};
use jm_metrics::{METRICS_PORT_ENV, init_metrics};
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKeyArg {
    Employer,
    Origin,
}

impl From<SourceKeyArg> for SourceKey {
    fn from(arg: SourceKeyArg) -> Self {
        match arg {
            SourceKeyArg::Employer => SourceKey::Employer,
            SourceKeyArg::Origin => SourceKey::OriginSource,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "jm-matcher",
    about = "Match user profiles against the active posting pool"
)]
struct Cli {
    /// JSON array of user profiles
    #[arg(long)]
    profiles: PathBuf,

    /// Notification payloads as JSON lines; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Use an in-memory store instead of PostgreSQL
    #[arg(long)]
    dry_run: bool,

    /// Raw postings to seed the in-memory store with (dry runs only)
    #[arg(long, requires = "dry_run")]
    postings: Option<PathBuf>,

    /// Users matched concurrently
    #[arg(long, env = "JM_USER_CONCURRENCY", default_value_t = 4)]
    user_concurrency: usize,

    /// Below this many in-city postings the city filter is widened
    #[arg(long, default_value_t = 5)]
    min_pool_size: usize,

    /// Candidates sent to the scorer per user
    #[arg(long, default_value_t = 50)]
    max_candidates: usize,

    /// Matches per user
    #[arg(long, env = "JM_TARGET_COUNT", default_value_t = 5)]
    target_count: usize,

    #[arg(long, env = "JM_MAX_PER_SOURCE", default_value_t = 2)]
    max_per_source: usize,

    /// Minimum score a pick should reach before the gate is relaxed
    #[arg(long, env = "JM_QUALITY_GATE", default_value_t = 0.60)]
    quality_gate: f64,

    /// Do not spread picks across a user's target cities
    #[arg(long)]
    no_city_balance: bool,

    /// What counts as one source for the per-source cap
    #[arg(long, value_enum, default_value_t = SourceKeyArg::Employer)]
    source_key: SourceKeyArg,
}

impl Cli {
    fn matching_config(&self, scoring_timeout: Duration) -> MatchingConfig {
        MatchingConfig {
            user_concurrency: self.user_concurrency.max(1),
            selector: SelectorConfig {
                min_pool_size: self.min_pool_size,
                max_candidates: self.max_candidates.max(1),
            },
            distributor: DistributorConfig {
                target_count: self.target_count,
                max_per_source: self.max_per_source.max(1),
                city_balance: !self.no_city_balance,
                quality_gate: self.quality_gate.clamp(0.0, 1.0),
                source_key: self.source_key.into(),
            },
            scoring_timeout,
        }
    }
}

#[derive(Debug, Error)]
enum MatcherError {
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
    #[error("matching run failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

async fn load_profiles(path: &Path) -> Result<Vec<UserProfile>, MatcherError> {
    let text = tokio::fs::read_to_string(path).await?;
    let profiles: Vec<UserProfile> = serde_json::from_str(&text)?;
    if let Some(blank) = profiles.iter().position(|p| p.user_key.trim().is_empty()) {
        return Err(MatcherError::Input(format!("profile {blank} has no userKey")));
    }
    Ok(profiles)
}

async fn seed_store(store: &MemoryStore, path: &Path) -> Result<(), MatcherError> {
    let text = tokio::fs::read_to_string(path).await?;
    let records: Vec<Value> = serde_json::from_str(&text)?;
    let report = ingest_raw_postings(records, store, &UpsertConfig::default(), Utc::now()).await;
    info!(
        inserted = report.inserted,
        rejected = report.rejected.len(),
        "seeded in-memory posting pool"
    );
    Ok(())
}

/// One notification payload per line, in profile order.
fn render_notifications(run: &MatchRun) -> Result<String, MatcherError> {
    let mut out = String::new();
    for outcome in &run.outcomes {
        out.push_str(&serde_json::to_string(&outcome.notification)?);
        out.push('\n');
    }
    Ok(out)
}

async fn execute<S, B>(
    engine: &MatchingEngine<B>,
    store: &S,
    profiles: &[UserProfile],
) -> Result<MatchRun, MatcherError>
where
    S: PostingStore + MatchStore,
    B: ScoringBackend,
{
    let run = engine.run_matching(store, profiles, Utc::now()).await?;
    for outcome in run.outcomes.iter().filter(|o| !o.write_errors.is_empty()) {
        warn!(
            user_key = %outcome.user_key,
            write_errors = outcome.write_errors.len(),
            "some matches were not stored"
        );
    }
    Ok(run)
}

async fn emit(cli: &Cli, run: &MatchRun) -> Result<(), MatcherError> {
    let body = render_notifications(run)?;
    match &cli.output {
        Some(path) => tokio::fs::write(path, body).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(body.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    info!(summary = %serde_json::to_string(&run.summary)?, "matching summary");
    Ok(())
}

async fn run() -> Result<(), MatcherError> {
    dotenv().ok();
    init_tracing_subscriber("jm-matcher");
    init_metrics("jm-matcher", METRICS_PORT_ENV, 9465);

    let cli = Cli::parse();
    let llm_config = LlmRuntimeConfig::from_env();
    info!(
        provider = %llm_config.provider,
        model = %llm_config.model,
        ai_enabled = llm_config.enabled,
        "loaded scoring config"
    );

    let engine = MatchingEngine::new(
        cli.matching_config(llm_config.timeout()),
        HttpScoringBackend::new(llm_config),
    );
    let profiles = load_profiles(&cli.profiles).await?;

    let run = if cli.dry_run {
        let store = MemoryStore::new();
        if let Some(path) = &cli.postings {
            seed_store(&store, path).await?;
        }
        execute(&engine, &store, &profiles).await?
    } else {
        let url = cli
            .database_url
            .as_deref()
            .ok_or(MatcherError::MissingDatabaseUrl)?;
        let pool = create_pool_from_url(url)?;
        run_migrations(&pool).await?;
        execute(&engine, &PgStore::new(pool), &profiles).await?
    };

    emit(&cli, &run).await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("jm-matcher failed: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jm_common::api::MatchStatus;
    use jm_common::matching::ScoringError;
    use jm_common::Posting;
    use serde_json::json;

    struct Offline;

    impl ScoringBackend for Offline {
        async fn score_batch(
            &self,
            _profile: &UserProfile,
            _candidates: &[Posting],
        ) -> Result<String, ScoringError> {
            Err(ScoringError::Unavailable("offline".into()))
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["jm-matcher", "--profiles", "profiles.json"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn raw(title: &str, employer: &str) -> Value {
        json!({
            "title": title,
            "employer": employer,
            "location": "London, GB",
            "description": "Graduate programme in data analytics.",
            "url": format!("https://jobs.example.com/{}", employer.to_lowercase()),
            "source": "fixture",
        })
    }

    #[test]
    fn flags_map_onto_matching_config() {
        let cli = cli(&[
            "--dry-run",
            "--target-count",
            "3",
            "--no-city-balance",
            "--source-key",
            "origin",
            "--quality-gate",
            "1.5",
        ]);
        let config = cli.matching_config(Duration::from_secs(7));

        assert_eq!(config.distributor.target_count, 3);
        assert!(!config.distributor.city_balance);
        assert_eq!(config.distributor.source_key, SourceKey::OriginSource);
        assert_eq!(config.distributor.quality_gate, 1.0);
        assert_eq!(config.scoring_timeout, Duration::from_secs(7));
        assert_eq!(config.user_concurrency, 4);
    }

    #[test]
    fn seeding_postings_requires_dry_run() {
        let result = Cli::try_parse_from([
            "jm-matcher",
            "--profiles",
            "profiles.json",
            "--postings",
            "postings.json",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dry_run_emits_one_line_per_profile() {
        let cli = cli(&["--dry-run"]);
        let store = MemoryStore::new();
        let records = (0..6).map(|i| raw(&format!("Graduate Analyst {i}"), &format!("Employer {i}")));
        ingest_raw_postings(records.collect(), &store, &UpsertConfig::default(), Utc::now()).await;

        let profiles: Vec<UserProfile> = serde_json::from_value(json!([
            {"userKey": "u-1", "targetCities": ["London"], "careerPaths": ["Data & Analytics"]},
            {"userKey": "u-2", "targetCities": ["London"]}
        ]))
        .unwrap();
        let engine = MatchingEngine::new(cli.matching_config(Duration::from_secs(1)), Offline);

        let run = execute(&engine, &store, &profiles).await.unwrap();
        let body = render_notifications(&run).unwrap();
        let lines: Vec<Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["userKey"], "u-1");
        assert_eq!(lines[1]["userKey"], "u-2");
        assert_eq!(run.outcomes[0].status, MatchStatus::Matched);
        assert_eq!(run.summary.fallback_used, 2);
        assert_eq!(lines[0]["items"].as_array().map(Vec::len), Some(5));
    }
}
