//! 专辑页：抓取、解析、数据模型。
//!
//! 子模块：
//! - `models`：AlbumInfo / TrackInfo
//! - `extractor`：HTML → AlbumInfo
//! - `html_utils`：实体解码、空白折叠等文本工具

pub mod extractor;
pub(crate) mod html_utils;
pub mod models;

use std::path::Path;

use tracing::{info, warn};

use crate::base_system::debug_dump;
use crate::error::FetchError;
use crate::network::client::Fetcher;
use crate::network::site::validate_album_url;
use models::AlbumInfo;

/// 校验 → 抓取 → 解析。`dump_dir` 非空时把原始页面留档并记录结构摘要。
pub async fn fetch_album<F: Fetcher>(
    fetcher: &F,
    album_url: &str,
    dump_dir: Option<&Path>,
) -> Result<AlbumInfo, FetchError> {
    let url = validate_album_url(album_url)?;
    let html = fetcher.fetch_page(url.as_str()).await?;

    if let Some(dir) = dump_dir {
        if let Err(err) = debug_dump::save_page(dir, url.as_str(), &html) {
            warn!(target: "album", "failed to save debug page: {err}");
        }
        debug_dump::log_outline(&html);
    }

    let album = extractor::extract(&html, url.as_str())?;
    info!(
        target: "album",
        "album '{}': {} tracks, cover {}",
        album.title,
        album.tracks.len(),
        if album.cover_url.is_empty() { "none" } else { album.cover_url.as_str() }
    );
    Ok(album)
}
