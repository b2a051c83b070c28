//! Prometheus exporter bootstrap shared by the `jm-*` batch binaries.

use std::env;
use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Env var the binaries read the exporter port from.
pub const METRICS_PORT_ENV: &str = "JM_METRICS_PORT";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Port from `port_env`, or `default_port` when unset or unparsable.
/// `0` disables the exporter.
pub fn metrics_port(port_env: &str, default_port: u16) -> u16 {
    env::var(port_env)
        .ok()
        .and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Start a Prometheus exporter on `0.0.0.0:<port>` for a batch run.
///
/// Returns `None` when the exporter is disabled or fails to bind.
pub fn init_metrics(
    app_name: &'static str,
    port_env: &str,
    default_port: u16,
) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = metrics_port(port_env, default_port);
    if port == 0 {
        info!(app = app_name, "metrics exporter disabled");
        return None;
    }

    match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .add_global_label("app", app_name)
        .install_recorder()
    {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            describe_pipeline_metrics();
            gauge!("jm_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            info!(app = app_name, metrics_port = port, "started prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
        Err(err) => {
            warn!(app = app_name, error = %err, metrics_port = port, "failed to start prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
    }
}

/// Rendered exposition text, if an exporter is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_pipeline_metrics() {
    describe_counter!("jm_postings_upserted_total", "Postings written, by insert/update outcome");
    describe_counter!("jm_posting_write_errors_total", "Posting upserts that failed or timed out");
    describe_counter!("jm_postings_filtered_total", "Postings deactivated by an eligibility rule");
    describe_counter!("jm_scoring_fallback_total", "Users scored by rules after the AI call failed");
    describe_counter!(
        "jm_scoring_rule_filled_total",
        "Candidates a successful AI reply left out, scored by rules"
    );
    describe_counter!("jm_relaxations_total", "Selection and distribution constraints relaxed");
    describe_counter!("jm_matches_written_total", "Match rows upserted");
    describe_histogram!("jm_db_query_seconds", "PostgreSQL statement latency by query");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_to_default() {
        assert_eq!(metrics_port("JM_METRICS_PORT_UNSET_IN_TESTS", 9464), 9464);
    }

    #[test]
    fn zero_port_disables_exporter() {
        assert!(init_metrics("jm-test", "JM_METRICS_PORT_UNSET_IN_TESTS", 0).is_none());
        assert!(render().is_none());
    }
}
