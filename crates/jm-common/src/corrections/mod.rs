pub mod early_career;
pub mod location;
pub mod work_mode;

pub use early_career::{EarlyCareerSignals, detect_early_career};
pub use location::{is_remote_marker, lookup_city, normalize_location, same_city};
pub use work_mode::detect_work_mode;
