#![allow(async_fn_in_trait)]

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use deadpool_postgres::GenericClient;
use metrics::histogram;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::warn;

use crate::run_id;

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

fn slow_query_threshold() -> Option<Duration> {
    static CACHE: OnceLock<Option<Duration>> = OnceLock::new();

    *CACHE.get_or_init(|| parse_threshold(std::env::var("JM_DB_LOG_MIN_DURATION_MS").ok()))
}

/// Milliseconds from the env var; zero, negative or garbage disables the warning.
fn parse_threshold(raw: Option<String>) -> Option<Duration> {
    let ms = raw?.trim().parse::<i64>().ok()?;
    (ms > 0).then(|| Duration::from_millis(ms as u64))
}

/// Wall time of one statement, recorded by [`QueryTimer::finish`].
struct QueryTimer {
    label: &'static str,
    started: Instant,
}

impl QueryTimer {
    fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    fn finish(self, threshold: Option<Duration>) {
        let elapsed = self.started.elapsed();
        histogram!("jm_db_query_seconds", "query" => self.label).record(elapsed.as_secs_f64());
        if threshold.is_some_and(|limit| elapsed >= limit) {
            warn!(
                run_id = run_id::get(),
                query = self.label,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow query"
            );
        }
    }
}

/// Cached-statement helpers for the posting and match tables. Every call is
/// timed into `jm_db_query_seconds{query}`; calls slower than
/// `JM_DB_LOG_MIN_DURATION_MS` are also warned about.
pub trait TimedClientExt: GenericClient {
    async fn timed_query_cached(
        &self,
        statement: &str,
        params: Params<'_>,
        label: &'static str,
    ) -> Result<Vec<Row>, tokio_postgres::Error> {
        let timer = QueryTimer::start(label);
        let prepared = self.prepare_cached(statement).await?;
        let result = self.query(&prepared, params).await;
        timer.finish(slow_query_threshold());
        result
    }

    async fn timed_query_one_cached(
        &self,
        statement: &str,
        params: Params<'_>,
        label: &'static str,
    ) -> Result<Row, tokio_postgres::Error> {
        let timer = QueryTimer::start(label);
        let prepared = self.prepare_cached(statement).await?;
        let result = self.query_one(&prepared, params).await;
        timer.finish(slow_query_threshold());
        result
    }

    async fn timed_execute_cached(
        &self,
        statement: &str,
        params: Params<'_>,
        label: &'static str,
    ) -> Result<u64, tokio_postgres::Error> {
        let timer = QueryTimer::start(label);
        let prepared = self.prepare_cached(statement).await?;
        let result = self.execute(&prepared, params).await;
        timer.finish(slow_query_threshold());
        result
    }
}

impl<T: GenericClient + ?Sized> TimedClientExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_ignores_zero_negative_and_garbage() {
        assert_eq!(parse_threshold(Some("250".into())), Some(Duration::from_millis(250)));
        assert_eq!(parse_threshold(Some(" 0 ".into())), None);
        assert_eq!(parse_threshold(Some("-5".into())), None);
        assert_eq!(parse_threshold(Some("slow".into())), None);
        assert_eq!(parse_threshold(None), None);
    }

    #[test]
    fn finishing_a_timer_without_a_threshold_is_quiet() {
        QueryTimer::start("count_postings").finish(None);
        QueryTimer::start("count_postings").finish(Some(Duration::from_secs(3600)));
    }
}
