use serde::{Deserialize, Serialize};

/// Core protocol timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Period of the per-session crash detection timer, in milliseconds.
    pub crash_check_interval_ms: u64,
    /// Recovery attempts per session side before forcing rollback.
    pub default_max_retries: u32,
    /// Age of the latest "done" log entry beyond which a session is
    /// considered stalled and rolled back, in milliseconds.
    pub default_max_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            crash_check_interval_ms: 2_000,
            default_max_retries: crate::session::DEFAULT_MAX_RETRIES,
            default_max_timeout_ms: crate::session::DEFAULT_MAX_TIMEOUT_MS,
        }
    }
}
