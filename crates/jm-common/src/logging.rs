use std::any::Any;
use std::panic;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::run_id;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where a batch run writes its log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogTarget {
    Stderr,
    /// `<dir>/<app>.log`, rotated daily.
    DailyFile(PathBuf),
}

impl LogTarget {
    fn from_env_value(dir: Option<std::ffi::OsString>) -> Self {
        match dir {
            Some(dir) if !dir.is_empty() => LogTarget::DailyFile(PathBuf::from(dir)),
            _ => LogTarget::Stderr,
        }
    }

    fn writer(&self, app_name: &'static str) -> Option<BoxMakeWriter> {
        let LogTarget::DailyFile(dir) = self else {
            return None;
        };
        if let Err(err) = std::fs::create_dir_all(dir) {
            eprintln!("{app_name}: cannot create JM_LOG_DIR {} ({err}); logging to stderr", dir.display());
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        Some(BoxMakeWriter::new(non_blocking))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

fn backtrace_requested(raw: Option<String>) -> bool {
    raw.is_some_and(|value| {
        let value = value.trim();
        value == "1" || value.eq_ignore_ascii_case("true")
    })
}

/// Route panics through `tracing`, tagged with the run id, so a crashed
/// run still leaves a structured record. Installed once per process.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let default_hook = panic::take_hook();
        let include_backtrace =
            backtrace_requested(std::env::var("JM_LOG_INCLUDE_BACKTRACE").ok());

        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()));

            tracing::error!(
                app = app_name,
                run_id = run_id::get(),
                thread = thread.name().unwrap_or("unnamed"),
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %panic_message(info.payload()),
                "run panicked"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` controls filtering (default `info`). When `JM_LOG_DIR` is set
/// logs go to `<JM_LOG_DIR>/<app>.log` with daily rotation, otherwise to
/// stderr. Stdout is left to the binaries' JSON output.
pub fn init_tracing_subscriber(app_name: &'static str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let target = LogTarget::from_env_value(std::env::var_os("JM_LOG_DIR"));
    match target.writer(app_name) {
        Some(writer) => {
            let _ = builder.with_ansi(false).with_writer(writer).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }

    install_tracing_panic_hook(app_name);
    tracing::debug!(app = app_name, run_id = run_id::get(), ?target, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_selects_daily_file() {
        assert_eq!(LogTarget::from_env_value(None), LogTarget::Stderr);
        assert_eq!(LogTarget::from_env_value(Some("".into())), LogTarget::Stderr);
        assert_eq!(
            LogTarget::from_env_value(Some("/var/log/jm".into())),
            LogTarget::DailyFile(PathBuf::from("/var/log/jm"))
        );
        assert!(LogTarget::Stderr.writer("jm-test").is_none());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("pool exhausted"));
        let borrowed: Box<dyn Any + Send> = Box::new("bad row");
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(owned.as_ref()), "pool exhausted");
        assert_eq!(panic_message(borrowed.as_ref()), "bad row");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn backtrace_flag_accepts_one_and_true() {
        assert!(backtrace_requested(Some("1".into())));
        assert!(backtrace_requested(Some(" TRUE ".into())));
        assert!(!backtrace_requested(Some("yes".into())));
        assert!(!backtrace_requested(None));
    }
}
