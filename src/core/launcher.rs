use crate::core::bootstrap::{EntryPointRegistry, ModuleBootstrap};
use crate::core::events::LauncherEvent;
use crate::core::model::{
    BootId, BootStatus, LauncherConfig, LoadResult, LoadStage, LoadStatus,
};
use crate::core::orchestrator::{LoadOrchestrator, ProgressSink};
use crate::plugins::registry::{AssetFetchService, FetchContext, SourceSpec};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BootReport {
    pub boot_id: BootId,
    pub modules: usize,
    pub aot_blobs: usize,
    pub entry_points: usize,
}

/// Runs the full bootstrap sequence: hot-update load, then AOT metadata
/// load, then module bootstrap. A failed stage short-circuits everything
/// after it.
pub struct Launcher {
    config: LauncherConfig,
    orchestrator: LoadOrchestrator,
    bootstrap: Arc<dyn ModuleBootstrap>,
    event_tx: broadcast::Sender<LauncherEvent>,
}

impl Launcher {
    pub fn new(
        config: LauncherConfig,
        service: Arc<dyn AssetFetchService>,
        source: SourceSpec,
        fetch_ctx: FetchContext,
        bootstrap: Arc<dyn ModuleBootstrap>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let orchestrator = LoadOrchestrator::new(service, source, fetch_ctx, event_tx.clone());
        Self {
            config,
            orchestrator,
            bootstrap,
            event_tx,
        }
    }

    pub fn set_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.orchestrator.set_progress_sink(sink);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LauncherEvent> {
        self.event_tx.subscribe()
    }

    pub fn status(&self) -> Option<LoadStatus> {
        self.orchestrator.status()
    }

    pub async fn boot(&self) -> anyhow::Result<BootReport> {
        let boot_id = Uuid::new_v4();
        let _ = self.event_tx.send(LauncherEvent::BootStatusChanged {
            boot_id,
            status: BootStatus::Running,
        });

        match self.run_sequence(boot_id).await {
            Ok(report) => {
                let _ = self.event_tx.send(LauncherEvent::BootStatusChanged {
                    boot_id,
                    status: BootStatus::Completed,
                });
                Ok(report)
            }
            Err(e) => {
                let _ = self.event_tx.send(LauncherEvent::Error {
                    scope: format!("boot({boot_id})"),
                    message: format!("{e:#}"),
                });
                let _ = self.event_tx.send(LauncherEvent::BootStatusChanged {
                    boot_id,
                    status: BootStatus::Failed,
                });
                Err(e)
            }
        }
    }

    async fn run_sequence(&self, boot_id: BootId) -> anyhow::Result<BootReport> {
        let modules = self.run_stage(LoadStage::HotUpdate).await;
        if !modules.success {
            anyhow::bail!("hot-update load failed after exhausting retries");
        }

        let metadata = self.run_stage(LoadStage::AotMetadata).await;
        if !metadata.success {
            anyhow::bail!("aot metadata load failed after exhausting retries");
        }

        let mut registry = EntryPointRegistry::new();
        self.bootstrap
            .load_modules(&modules.items, &mut registry)
            .context("load hot-update modules")?;
        self.bootstrap
            .load_aot_metadata(&metadata.items)
            .context("load aot metadata")?;

        let entries = registry.into_ordered();
        let entry_points = entries.len();
        for entry in entries {
            let _ = self.event_tx.send(LauncherEvent::EntryPointInvoked {
                name: entry.name.clone(),
            });
            (entry.run)().with_context(|| format!("entry point {}", entry.name))?;
        }

        Ok(BootReport {
            boot_id,
            modules: modules.items.len(),
            aot_blobs: metadata.items.len(),
            entry_points,
        })
    }

    /// A stage with no configured keys has nothing to fetch and passes
    /// trivially; otherwise it goes through the retry orchestrator.
    async fn run_stage(&self, stage: LoadStage) -> LoadResult {
        let request = self.config.request_for(stage);
        if request.keys.is_empty() {
            let _ = self.event_tx.send(LauncherEvent::Info {
                scope: format!("load({stage})"),
                message: "no asset keys configured, skipping stage".to_string(),
            });
            return LoadResult::succeeded(vec![]);
        }

        let _ = self.event_tx.send(LauncherEvent::StageStarted {
            stage,
            keys: request.keys.len(),
        });
        let result = self.orchestrator.load_with_retry(&request).await;
        let _ = self.event_tx.send(LauncherEvent::StageFinished {
            stage,
            success: result.success,
        });
        result
    }
}
