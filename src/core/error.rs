use crate::plugins::registry::FetchError;

/// Failure of one fetch attempt, as seen by the retry loop. All variants are
/// counted and retried the same way; the distinction only survives into logs.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("fetch did not settle within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("retry budget exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}
