//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：进度事件 / 单曲结果 / 整批统计
//! - `progress`：整批共享的计数与去重账本
//! - `engine`：并发调度、流式写盘、单曲下载

pub mod engine;
pub mod models;
pub mod progress;

pub use engine::{download_track, run_batch};
pub use models::{BatchEvent, DownloadResult, EventCallback, TrackEvent};
