use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BootId = Uuid;

/// Orchestration state for one logical load; transitions are forward-only
/// (`Succeeded` and `Failed` are terminal for the invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Loading,
    WaitingRetry,
    Failed,
    Succeeded,
}

/// The two launcher stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    HotUpdate,
    AotMetadata,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::HotUpdate => write!(f, "hot-update"),
            LoadStage::AotMetadata => write!(f, "aot-metadata"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStatus {
    Running,
    Completed,
    Failed,
}

/// Immutable progress snapshot, produced on every phase transition and on
/// every poll tick while a fetch is in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadStatus {
    pub phase: LoadPhase,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub download_done: bool,
    pub percent_complete: f32,
}

impl LoadStatus {
    pub fn new(
        phase: LoadPhase,
        total_bytes: u64,
        downloaded_bytes: u64,
        download_done: bool,
        percent_complete: f32,
    ) -> Self {
        // downloaded may never run ahead of a known total
        let downloaded_bytes = if total_bytes > 0 {
            downloaded_bytes.min(total_bytes)
        } else {
            downloaded_bytes
        };
        Self {
            phase,
            total_bytes,
            downloaded_bytes,
            download_done,
            percent_complete: percent_complete.clamp(0.0, 1.0),
        }
    }

    pub fn downloaded_percent(&self) -> f32 {
        if self.total_bytes > 0 {
            self.downloaded_bytes as f32 / self.total_bytes as f32
        } else {
            0.0
        }
    }
}

/// Recovery strategy when a fetch attempt fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryPolicy {
    /// Give up after `max_retry_count` attempts.
    #[default]
    Bounded,
    /// Keep retrying with the fixed delay until the fetch succeeds.
    InfiniteBackoff,
}

/// One orchestration call. Immutable for its duration.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub stage: LoadStage,
    pub keys: Vec<String>,
    pub max_retry_count: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub recovery: RecoveryPolicy,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub success: bool,
    pub items: Vec<bytes::Bytes>,
}

impl LoadResult {
    pub fn succeeded(items: Vec<bytes::Bytes>) -> Self {
        Self { success: true, items }
    }

    pub fn failed() -> Self {
        Self { success: false, items: vec![] }
    }
}

fn default_max_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Launcher manifest, read from a JSON file. The key lists are produced by
/// the packaging side; the retry knobs default to the launcher's stock values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub hot_update_keys: Vec<String>,
    #[serde(default)]
    pub aot_metadata_keys: Vec<String>,
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
}

impl LauncherConfig {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        if cfg.max_retry_count == 0 {
            anyhow::bail!("max_retry_count must be >= 1");
        }
        Ok(cfg)
    }

    pub fn request_for(&self, stage: LoadStage) -> LoadRequest {
        let keys = match stage {
            LoadStage::HotUpdate => self.hot_update_keys.clone(),
            LoadStage::AotMetadata => self.aot_metadata_keys.clone(),
        };
        LoadRequest {
            stage,
            keys,
            max_retry_count: self.max_retry_count,
            retry_delay_ms: self.retry_delay_ms,
            timeout_ms: self.timeout_ms,
            recovery: self.recovery,
        }
    }
}
