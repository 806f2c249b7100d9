//! 专辑页解析：标题、封面、曲目列表。
//!
//! 页面结构并不稳定，每个字段都由一组按顺序尝试的策略得到；
//! 策略是纯函数 `(&Page) -> Option<T>`，第一个给出结果的胜出。

use std::collections::HashSet;
use std::sync::OnceLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::html_utils::{decode_entities, element_text};
use super::models::{AlbumInfo, TrackInfo};
use crate::base_system::fs_names::{UNKNOWN_ALBUM, clean_file_name};
use crate::error::FetchError;
use crate::network::site::{SITE_BRAND, absolutize};

const IMAGE_EXTS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

const COVER_SELECTORS: [&str; 9] = [
    "img#albumImage",
    "img[class*='albumImage']",
    "img[alt*='album']",
    "img[alt*='Album']",
    "div[class*='albumImage'] img",
    "td[class*='albumImage'] img",
    "img[src*='album']",
    "table img[src*='covers']",
    "img[src*='cover']",
];

/// 待解析的页面：DOM 与页面地址（标题兜底要用到地址）。
pub struct Page<'a> {
    pub doc: &'a Html,
    pub url: &'a str,
}

pub type Strategy<T> = fn(&Page<'_>) -> Option<T>;

pub const TITLE_STRATEGIES: [Strategy<String>; 3] =
    [title_from_h2, title_from_h1, title_from_url_slug];

struct Selectors {
    h1: Selector,
    h2: Selector,
    song_table: Selector,
    anchor: Selector,
    cell: Selector,
    covers: Vec<Selector>,
}

fn selectors() -> &'static Selectors {
    static S: OnceLock<Selectors> = OnceLock::new();
    S.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).unwrap();
        Selectors {
            h1: parse("h1"),
            h2: parse("h2"),
            song_table: parse("table#songlist"),
            anchor: parse("a"),
            cell: parse("td"),
            covers: COVER_SELECTORS.iter().map(|css| parse(css)).collect(),
        }
    })
}

pub fn first_match<T>(page: &Page<'_>, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(page))
}

/// 解析整页。找不到曲目表或曲目为空时返回 `FetchError::Parse`。
pub fn extract(html: &str, album_url: &str) -> Result<AlbumInfo, FetchError> {
    let doc = Html::parse_document(html);
    let page = Page {
        doc: &doc,
        url: album_url,
    };

    let title = first_match(&page, &TITLE_STRATEGIES).unwrap_or_else(|| UNKNOWN_ALBUM.to_string());
    let cover_url = extract_cover(&page).unwrap_or_default();
    let tracks = extract_tracks(&doc)?;

    debug!(target: "album", title = %title, cover = %cover_url, tracks = tracks.len(), "album parsed");

    Ok(AlbumInfo {
        title,
        cover_url,
        tracks,
    })
}

// ── 标题 ────────────────────────────────────────────────────────

fn accept_heading(text: &str) -> Option<String> {
    let text = decode_entities(text.trim()).trim().to_string();
    let long_enough = text.chars().count() > 5;
    let is_banner = text.to_lowercase().contains(SITE_BRAND);
    (long_enough && !is_banner).then_some(text)
}

pub fn title_from_h2(page: &Page<'_>) -> Option<String> {
    let heading = page.doc.select(&selectors().h2).next()?;
    accept_heading(&element_text(&heading))
}

/// 仅在页面完全没有 `<h2>` 时才看 `<h1>`；`<h2>` 存在但被拒时直接落到地址末段。
pub fn title_from_h1(page: &Page<'_>) -> Option<String> {
    if page.doc.select(&selectors().h2).next().is_some() {
        return None;
    }
    let heading = page.doc.select(&selectors().h1).next()?;
    accept_heading(&element_text(&heading))
}

pub fn title_from_url_slug(page: &Page<'_>) -> Option<String> {
    let url = Url::parse(page.url).ok()?;
    let slug = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(slug.replace('-', " "))
}

// ── 封面 ────────────────────────────────────────────────────────

pub fn extract_cover(page: &Page<'_>) -> Option<String> {
    selectors()
        .covers
        .iter()
        .find_map(|sel| cover_from_selector(page.doc, sel))
}

/// 每个选择器只看第一个命中的元素。
fn cover_from_selector(doc: &Html, sel: &Selector) -> Option<String> {
    let img = doc.select(sel).next()?;
    let src = img.value().attr("src").map(str::trim).filter(|s| !s.is_empty())?;
    let src = absolutize(src);
    let lower = src.to_ascii_lowercase();
    IMAGE_EXTS
        .iter()
        .any(|ext| lower.contains(ext))
        .then_some(src)
}

// ── 曲目 ────────────────────────────────────────────────────────

pub fn extract_tracks(doc: &Html) -> Result<Vec<TrackInfo>, FetchError> {
    let s = selectors();
    let table = doc
        .select(&s.song_table)
        .next()
        .ok_or_else(|| FetchError::Parse("could not find song list table".to_string()))?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut tracks = Vec::new();
    let mut anchors = 0usize;

    for anchor in table.select(&s.anchor) {
        anchors += 1;
        let Some(href) = anchor
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty() && h.contains("mp3"))
        else {
            continue;
        };

        let url = absolutize(href);
        if seen.contains(&url) {
            continue;
        }

        let Some(raw_name) = song_name(&anchor) else {
            continue;
        };
        let name = clean_file_name(&raw_name);
        if name.is_empty() {
            continue;
        }

        seen.insert(url.clone());
        tracks.push(TrackInfo::new(name, url));
    }

    if anchors == 0 {
        return Err(FetchError::Parse("no song links found".to_string()));
    }
    if tracks.is_empty() {
        return Err(FetchError::Parse("no tracks found".to_string()));
    }
    Ok(tracks)
}

/// 链接文字为空或是 "download" 一类按钮时，取所在行的第二个单元格。
fn song_name(anchor: &ElementRef<'_>) -> Option<String> {
    let mut name = element_text(anchor);

    if name.is_empty() || name.to_lowercase().contains("download") {
        let row = anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name().eq_ignore_ascii_case("tr"));
        if let Some(cell) = row.and_then(|r| r.select(&selectors().cell).nth(1)) {
            name = element_text(&cell);
        }
    }

    (name.chars().count() > 1).then_some(name)
}
