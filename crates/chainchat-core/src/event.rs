use serde::Serialize;

use crate::{DownloadProgress, PullPhase};

/// Notifications from the controller to whatever view is attached
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Loading { active: bool },
    SelectionCleared,
    AvailableModels { count: usize },
    Chunk { content: String },
    GenerationDone,
    Progress { progress: DownloadProgress },
    PullDone { phase: PullPhase },
    Error { message: String },
}
