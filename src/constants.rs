//! Engine-wide default values.
//!
//! Invalid or negative configuration inputs are silently clamped back to
//! these values rather than rejected; a step with a nonsensical retry policy
//! still executes with sane defaults.

/// Retry and backoff defaults applied when a step omits or misconfigures its policy.
pub mod retry {
    /// Additional attempts after the first failure. Zero means fail fast.
    pub const DEFAULT_MAX_RETRIES: u32 = 0;

    /// Base delay before the first retry.
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;

    /// Ceiling for any computed backoff delay.
    pub const DEFAULT_MAX_RETRY_BACKOFF_MS: u64 = 30_000;

    /// Exponential growth factor between consecutive retry delays.
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
}

/// Connection pool and discovery-cache defaults.
pub mod connection {
    /// How long a cached discovery resolution stays valid.
    pub const DEFAULT_DISCOVERY_CACHE_TTL_MS: u64 = 5_000;

    /// Budget for a graceful connection close before it is forced.
    pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 3_000;

    /// Budget for establishing a new worker channel.
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
}

/// Default cluster identity used when none is configured.
pub const DEFAULT_CLUSTER_ID: &str = "default";
