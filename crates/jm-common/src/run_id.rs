//! Process-level run identifier.
//!
//! Every ingest or matching run is a short-lived process, so one ULID per
//! process is enough to correlate all stage logs and to stamp the match rows
//! a run wrote (`matches.match_run_id`).
//!
//! ```
//! use jm_common::run_id;
//!
//! let run = run_id::get();
//! assert_eq!(run, run_id::get());
//!
//! let request = run_id::generate();
//! assert_ne!(request, run);
//! ```

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Returns the run id shared by the whole process.
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// Generates a fresh ULID for sub-operations.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_stable_for_the_process() {
        assert_eq!(get(), get());
        assert_eq!(get().len(), 26);
    }

    #[test]
    fn generated_ids_are_unique_and_time_ordered() {
        let older = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = generate();
        assert_ne!(older, newer);
        assert!(older < newer);
    }
}
