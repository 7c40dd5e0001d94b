use std::time::Duration;

use docuferry_transfer::DEFAULT_CHUNK_SIZE;

/// Files at or above this size take the chunked path; smaller files go
/// through the single-request simple transport. Chunking overhead (per-chunk
/// round-trips, session persistence writes) is not worth paying below this,
/// where restarting from zero is cheap anyway.
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Upload engine configuration. Dependency-injected at construction, never
/// read from globals.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Base URL of the upload API, e.g. `https://api.example.com`.
    pub api_base: String,
    /// Chunk size for the chunked path.
    pub chunk_size: u64,
    /// Minimum file size for the chunked path.
    pub chunk_threshold: u64,
    /// Per-request timeout; a timed-out call retries like any other failure.
    pub request_timeout: Duration,
    /// Attempts per chunk before the failure is terminal.
    pub max_chunk_attempts: u32,
    /// Base backoff delay; attempt `n` waits `n × retry_delay`.
    pub retry_delay: Duration,
}

impl UploaderConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            request_timeout: Duration::from_secs(60),
            max_chunk_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}
