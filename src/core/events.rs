use crate::core::model::{BootId, BootStatus, LoadPhase, LoadStage, LoadStatus};

#[derive(Debug, Clone)]
pub enum LauncherEvent {
    BootStatusChanged { boot_id: BootId, status: BootStatus },
    StageStarted { stage: LoadStage, keys: usize },
    PhaseChanged { stage: LoadStage, phase: LoadPhase },
    Progress { stage: LoadStage, status: LoadStatus },
    AttemptFailed { stage: LoadStage, attempt: u32, max_attempts: u32, message: String },
    StageFinished { stage: LoadStage, success: bool },
    EntryPointInvoked { name: String },
    Error { scope: String, message: String },
    Info { scope: String, message: String },
}
