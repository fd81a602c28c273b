//! Application-level configuration constants.

// Cache
pub const MAX_CACHED_SESSIONS: usize = 3;

// Streaming
pub const PROGRESS_BATCH_SIZE: usize = 500;
pub const INCREMENTAL_COMMIT_THRESHOLD: usize = 5_000;

// Endpoints
pub const DEFAULT_API_BASE: &str = "/api";

/// Tunables for a [`crate::VariantResults`] controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsConfig {
    /// How many sessions the LRU cache retains.
    pub max_cached_sessions: usize,
    /// Number of gene records between progress reports.
    pub progress_batch_size: usize,
    /// Declared gene count at which the collection is committed per batch
    /// instead of once on completion.
    pub incremental_commit_threshold: usize,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            max_cached_sessions: MAX_CACHED_SESSIONS,
            progress_batch_size: PROGRESS_BATCH_SIZE,
            incremental_commit_threshold: INCREMENTAL_COMMIT_THRESHOLD,
        }
    }
}
