//! 抓取与下载流程的统一错误类型。
//!
//! 专辑级错误（`Validation` / `Parse`）直接中止整个操作；单曲级错误
//! （`Resolution` / `Network` / `Io`）在下载任务边界被降级为 `Failed` 事件。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid album url: {0}")]
    Validation(String),
    #[error("unexpected page structure: {0}")]
    Parse(String),
    #[error("no audio source found on {0}")]
    Resolution(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            };
        }
        Self::Network(err.to_string())
    }
}
