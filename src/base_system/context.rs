//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

pub const DEFAULT_MAX_WORKERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // 路径配置
    #[serde(default)]
    pub save_path: String,

    // 网络配置
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_false")]
    pub validate_before_download: bool,

    // 下载后行为
    #[serde(default = "default_false")]
    pub auto_open_folder: bool,

    // 调试
    #[serde(default = "default_false")]
    pub debug_dump_html: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            max_workers: default_max_workers(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            validate_before_download: default_false(),
            auto_open_folder: default_false(),
            debug_dump_html: default_false(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 8] = [
            FieldMeta {
                name: "save_path",
                description: "Root folder for downloaded albums (empty = current directory)",
            },
            FieldMeta {
                name: "max_workers",
                description: "Number of tracks resolved/downloaded at the same time",
            },
            FieldMeta {
                name: "request_timeout",
                description: "Per-request timeout in seconds",
            },
            FieldMeta {
                name: "user_agent",
                description: "User-Agent header sent with every request",
            },
            FieldMeta {
                name: "accept_language",
                description: "Accept-Language header sent with page requests",
            },
            FieldMeta {
                name: "validate_before_download",
                description: "Check the album URL with a HEAD request before fetching it",
            },
            FieldMeta {
                name: "auto_open_folder",
                description: "Open the album folder in the file manager after downloading",
            },
            FieldMeta {
                name: "debug_dump_html",
                description: "Save fetched album pages under debug/ and log their structure",
            },
        ];
        &FIELDS
    }

    fn normalize(&mut self) {
        self.max_workers = self.max_workers.max(1);
        self.request_timeout = self.request_timeout.max(1);
        self.save_path = self.save_path.trim().to_string();
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn default_false() -> bool {
    false
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_request_timeout() -> u64 {
    300
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:141.0) Gecko/20100101 Firefox/141.0".to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.5".to_string()
}
