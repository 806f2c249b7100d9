//! 曲目详情页 → 真实音频地址。
//!
//! 优先取页面内嵌 `<audio>` 的 `src`（站点给出的流地址），
//! 没有时退回第一个指向 `.mp3` 的超链接。没有其它启发式。

use std::sync::OnceLock;

use scraper::{Html, Selector};
use tracing::debug;

use super::client::Fetcher;
use super::site::absolutize;
use crate::album::models::AUDIO_EXT;
use crate::error::FetchError;

fn audio_selector() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("audio[src]").unwrap())
}

fn audio_link_selector() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("a[href]").unwrap())
}

pub async fn resolve_audio_url<F: Fetcher>(
    fetcher: &F,
    track_page_url: &str,
) -> Result<String, FetchError> {
    let html = fetcher.fetch_page(track_page_url).await?;
    let audio = find_audio_source(&html)
        .ok_or_else(|| FetchError::Resolution(track_page_url.to_string()))?;
    debug!(target: "resolver", "{track_page_url} -> {audio}");
    Ok(audio)
}

/// 纯解析部分，便于单测。
pub fn find_audio_source(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    let embedded = doc
        .select(audio_selector())
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty());
    if let Some(src) = embedded {
        return Some(absolutize(src));
    }

    doc.select(audio_link_selector())
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| href.contains(AUDIO_EXT))
        .map(absolutize)
}
