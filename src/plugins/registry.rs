use async_trait::async_trait;
use bytes::Bytes;
use clap::{ArgMatches, Command};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Where asset keys resolve from: a base URL or a local directory, as given
/// on the command line. Services score it without interpreting it further.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub raw: String,
}

impl SourceSpec {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

#[derive(Debug, Clone)]
pub struct FetchContext {
    pub user_agent: String,
    pub headers: HashMap<String, String>,
}

impl Default for FetchContext {
    fn default() -> Self {
        Self {
            user_agent: "hotload/0.1".to_string(),
            headers: HashMap::new(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status error: {0}")]
    Status(reqwest::StatusCode),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not resolvable: {0}")]
    MissingKey(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// The service task went away without settling the handle.
    #[error("fetch aborted")]
    Aborted,
}

/// Progress of one in-flight fetch, published by the service task.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FetchProgress {
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub done: bool,
    pub percent_complete: f32,
}

/// Async handle for one batched fetch: a watch side for progress polling and
/// a oneshot side for settlement. Dropping the handle abandons the fetch
/// without cancelling the service task.
pub struct FetchHandle {
    pub progress: watch::Receiver<FetchProgress>,
    pub result: oneshot::Receiver<Result<Vec<Bytes>, FetchError>>,
}

impl FetchHandle {
    /// Channel pair for service implementations: the returned sender halves
    /// go into the task doing the work.
    pub fn channel() -> (FetchHandleSender, FetchHandle) {
        let (progress_tx, progress_rx) = watch::channel(FetchProgress::default());
        let (result_tx, result_rx) = oneshot::channel();
        (
            FetchHandleSender { progress: progress_tx, result: result_tx },
            FetchHandle { progress: progress_rx, result: result_rx },
        )
    }
}

pub struct FetchHandleSender {
    pub progress: watch::Sender<FetchProgress>,
    pub result: oneshot::Sender<Result<Vec<Bytes>, FetchError>>,
}

impl FetchHandleSender {
    pub fn publish(&self, total_bytes: u64, downloaded_bytes: u64, done: bool) {
        let downloaded_bytes = if total_bytes > 0 {
            downloaded_bytes.min(total_bytes)
        } else {
            downloaded_bytes
        };
        let percent_complete = if total_bytes > 0 {
            (downloaded_bytes as f32 / total_bytes as f32).clamp(0.0, 1.0)
        } else if done {
            1.0
        } else {
            0.0
        };
        let _ = self.progress.send(FetchProgress {
            total_bytes,
            downloaded_bytes,
            done,
            percent_complete,
        });
    }

    pub fn settle(self, result: Result<Vec<Bytes>, FetchError>) {
        let _ = self.result.send(result);
    }
}

/// Resolves a batch of asset keys to loaded byte blobs. How a key maps to
/// bytes (URL join, directory lookup, ...) is entirely the service's concern.
#[async_trait]
pub trait AssetFetchService: Send + Sync {
    fn name(&self) -> &'static str;

    /// Suitability score for a source; 0 means "cannot handle".
    fn can_handle(&self, source: &SourceSpec) -> u8;

    /// Start fetching all keys as one batch. Setup errors (bad source, bad
    /// key syntax) surface here; everything after lands on the handle.
    async fn fetch_by_keys(
        &self,
        source: &SourceSpec,
        keys: &[String],
        ctx: &FetchContext,
    ) -> Result<FetchHandle, FetchError>;
}

#[derive(Debug, Clone)]
pub struct LaunchCliConfig {
    pub fetch_ctx: FetchContext,
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_launch_command(&self, cmd: Command) -> Command;
    fn apply_launch_matches(&self, matches: &ArgMatches, cfg: &mut LaunchCliConfig) -> anyhow::Result<()>;
}

pub struct FetchServiceRegistry {
    services: Vec<Arc<dyn AssetFetchService>>,
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl FetchServiceRegistry {
    pub fn with_defaults() -> Self {
        let mut reg = Self { services: vec![], cli_plugins: vec![] };

        reg.services.push(Arc::new(crate::plugins::http::service::HttpFetchService::new()));
        reg.services.push(Arc::new(crate::plugins::fs::service::FsFetchService::new()));

        reg.cli_plugins.push(Box::new(crate::plugins::http::cli::HttpCliPlugin::new()));
        reg
    }

    pub fn augment_launch_command(&self, cmd: Command) -> Command {
        self.cli_plugins
            .iter()
            .fold(cmd, |c, p| p.augment_launch_command(c))
    }

    pub fn apply_launch_matches(&self, matches: &ArgMatches, cfg: &mut LaunchCliConfig) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            p.apply_launch_matches(matches, cfg)?;
        }
        Ok(())
    }

    pub fn best_service(&self, source: &SourceSpec) -> Option<Arc<dyn AssetFetchService>> {
        self.services
            .iter()
            .map(|s| (s.can_handle(source), s))
            .max_by_key(|(c, _)| *c)
            .and_then(|(c, s)| if c == 0 { None } else { Some(s.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_service_picks_http_for_urls_and_fs_for_paths() {
        let reg = FetchServiceRegistry::with_defaults();
        let http = reg.best_service(&SourceSpec::new("https://cdn.example.com/bundles")).unwrap();
        assert_eq!(http.name(), "http-fetch");
        let fs = reg.best_service(&SourceSpec::new("./bundles")).unwrap();
        assert_eq!(fs.name(), "fs-fetch");
    }

    #[test]
    fn publish_clamps_downloaded_to_total() {
        let (tx, handle) = FetchHandle::channel();
        tx.publish(10, 25, false);
        let p = *handle.progress.borrow();
        assert_eq!(p.downloaded_bytes, 10);
        assert_eq!(p.percent_complete, 1.0);
    }
}
