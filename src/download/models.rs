//! 下载相关的数据模型定义。
//!
//! 包含进度事件、单曲结果、整批结果等核心数据结构。

use std::fmt;
use std::sync::Arc;

/// 单曲在一批下载中的状态变化。`Display` 即对外的进度文案。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    Downloading { name: String },
    Completed { name: String },
    Failed { name: String, message: String },
    Skipped { name: String, duplicate: bool },
    Cancelled { name: String },
}

impl TrackEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Downloading { name }
            | Self::Completed { name }
            | Self::Failed { name, .. }
            | Self::Skipped { name, .. }
            | Self::Cancelled { name } => name,
        }
    }

    /// 除 `Downloading` 外都是终态，每首曲目恰好出现一次。
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading { .. })
    }
}

impl fmt::Display for TrackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downloading { name } => write!(f, "Downloading: {name}"),
            Self::Completed { name } => write!(f, "Completed: {name}"),
            Self::Failed { name, message } => write!(f, "Failed: {name} - {message}"),
            Self::Skipped {
                name,
                duplicate: true,
            } => write!(f, "Skipped: {name} (duplicate)"),
            Self::Skipped { name, .. } => write!(f, "Skipped: {name}"),
            Self::Cancelled { name } => write!(f, "Cancelled: {name}"),
        }
    }
}

/// `(completed, total, label)` 三元组。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEvent {
    pub completed: usize,
    pub total: usize,
    pub event: TrackEvent,
}

impl BatchEvent {
    pub fn label(&self) -> String {
        self.event.to_string()
    }
}

/// 进度回调；多个下载任务会并发调用。
pub type EventCallback = Arc<dyn Fn(BatchEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Completed,
    SkippedExisting,
    SkippedDuplicate,
    Failed,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl DownloadResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: TrackOutcome) {
        match outcome {
            TrackOutcome::Completed => self.success += 1,
            TrackOutcome::SkippedExisting => self.skipped += 1,
            TrackOutcome::SkippedDuplicate => self.duplicates += 1,
            TrackOutcome::Failed => self.failed += 1,
            TrackOutcome::Cancelled => self.canceled += 1,
        }
    }

    /// 已到达终态的曲目数。
    pub fn settled(&self) -> usize {
        self.success + self.skipped + self.duplicates + self.failed + self.canceled
    }

    pub fn was_cancelled(&self) -> bool {
        self.canceled > 0
    }
}
