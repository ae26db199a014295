use serde::{Deserialize, Serialize};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub const STATUS_STARTING: &str = "Starting...";
pub const STATUS_COMPLETED: &str = "Download completed";

/// One record of the pull-model progress stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullProgress {
    pub fn new(status: impl Into<String>, completed: u64, total: u64) -> Self {
        Self {
            status: status.into(),
            completed: Some(completed),
            total: Some(total),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Progress of the in-flight pull as shown to the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub status: String,
    pub completed: u64,
    pub total: u64,
}

impl DownloadProgress {
    pub fn starting() -> Self {
        Self {
            status: STATUS_STARTING.to_string(),
            completed: 0,
            total: 0,
        }
    }

    /// Map a stream record onto the display state. `success` gets a friendlier label.
    pub fn from_record(record: &PullProgress) -> Self {
        let status = match record.is_success() {
            true => STATUS_COMPLETED.to_string(),
            false => record.status.clone(),
        };
        Self {
            status,
            completed: record.completed.unwrap_or(0),
            total: record.total.unwrap_or(0),
        }
    }

    /// Fraction in `[0, 1]`, or `None` while the total is unknown
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.completed as f64 / self.total as f64).min(1.0))
    }

    pub fn gb_summary(&self) -> String {
        format!(
            "{:.2} GB / {:.2} GB",
            self.completed as f64 / GIB,
            self.total as f64 / GIB
        )
    }
}

/// Pull lifecycle: Idle → Requesting → Streaming* → Completed | TimedOut | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PullPhase {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Completed,
    TimedOut,
    Failed,
}

impl PullPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, PullPhase::Requesting | PullPhase::Streaming)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PullPhase::Idle => "idle",
            PullPhase::Requesting => "requesting",
            PullPhase::Streaming => "streaming",
            PullPhase::Completed => "completed",
            PullPhase::TimedOut => "timed out",
            PullPhase::Failed => "failed",
        }
    }
}
