//! 调试用：把抓到的专辑页原样落盘，并在 DEBUG 级别记录页面结构概要。
//!
//! 站点改版导致解析失败时，用这份快照对照选择器。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use scraper::{Html, Selector};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::debug;

use super::fs_names::clean_folder_name;
use crate::album::models::AUDIO_EXT;

pub const DEBUG_DIR: &str = "debug";
const SAMPLE_LINKS: usize = 10;

struct Selectors {
    table: Selector,
    row: Selector,
    link: Selector,
    heading: Selector,
}

fn selectors() -> &'static Selectors {
    static S: OnceLock<Selectors> = OnceLock::new();
    S.get_or_init(|| Selectors {
        table: Selector::parse("table").unwrap(),
        row: Selector::parse("tr").unwrap(),
        link: Selector::parse("a[href]").unwrap(),
        heading: Selector::parse("h1, h2").unwrap(),
    })
}

/// 写入 `<base>/debug/<slug>_<时间戳>.html`，返回文件路径。
pub fn save_page(base_dir: &Path, album_url: &str, html: &str) -> std::io::Result<PathBuf> {
    let dir = base_dir.join(DEBUG_DIR);
    fs::create_dir_all(&dir)?;

    let slug = album_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "unknown".to_string());

    let path = dir.join(format!("{}_{stamp}.html", clean_folder_name(slug)));
    fs::write(&path, html)?;
    debug!(target: "debug_dump", "page saved to {}", path.display());
    Ok(path)
}

/// 页面结构摘要，供日志与测试使用。
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PageOutline {
    pub headings: Vec<String>,
    /// `(id, 行数)`
    pub tables: Vec<(String, usize)>,
    pub audio_links: usize,
    pub sample_links: Vec<String>,
}

pub fn outline(html: &str) -> PageOutline {
    let doc = Html::parse_document(html);
    let s = selectors();

    let headings = doc
        .select(&s.heading)
        .map(|h| h.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let tables = doc
        .select(&s.table)
        .map(|t| {
            let id = t.value().id().unwrap_or("-").to_string();
            (id, t.select(&s.row).count())
        })
        .collect();

    let hrefs: Vec<&str> = doc
        .select(&s.link)
        .filter_map(|a| a.value().attr("href"))
        .collect();
    let audio_links = hrefs.iter().filter(|h| h.contains(AUDIO_EXT)).count();
    let sample_links = hrefs
        .iter()
        .take(SAMPLE_LINKS)
        .map(|h| h.to_string())
        .collect();

    PageOutline {
        headings,
        tables,
        audio_links,
        sample_links,
    }
}

pub fn log_outline(html: &str) {
    let o = outline(html);
    debug!(target: "debug_dump", "headings: {:?}", o.headings);
    for (id, rows) in &o.tables {
        debug!(target: "debug_dump", "table id={id} rows={rows}");
    }
    debug!(target: "debug_dump", "links containing {AUDIO_EXT}: {}", o.audio_links);
    for href in &o.sample_links {
        debug!(target: "debug_dump", "link: {href}");
    }
}
