//! 站点常量与地址规范化。

use reqwest::Url;

use crate::error::FetchError;

pub const SITE_BASE: &str = "https://downloads.khinsider.com";
pub const SITE_HOST: &str = "downloads.khinsider.com";
pub const ALBUM_PATH_PREFIX: &str = "/game-soundtracks/album/";
/// 标题兜底时需要排除的站点名（导航/横幅标题）。
pub const SITE_BRAND: &str = "khinsider";

/// 下载请求的 Referer；源站拒绝不带该头的音频请求。
pub fn site_referer() -> String {
    format!("{SITE_BASE}/")
}

/// 页面里的相对地址转绝对地址：
/// `//x` 补 `https:`，`/x` 拼站点根，其余按站点根下的相对路径处理。
pub fn absolutize(src: &str) -> String {
    let src = src.trim();
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        src.to_string()
    } else if src.starts_with("//") {
        format!("https:{src}")
    } else if src.starts_with('/') {
        format!("{SITE_BASE}{src}")
    } else {
        format!("{SITE_BASE}/{src}")
    }
}

/// 在任何网络请求之前校验专辑地址。
pub fn validate_album_url(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FetchError::Validation("empty url".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| FetchError::Validation(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::Validation(format!(
            "{raw}: unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if !url
        .host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(SITE_HOST))
    {
        return Err(FetchError::Validation(format!(
            "{raw}: must be hosted on {SITE_HOST}"
        )));
    }
    let slug = url
        .path()
        .strip_prefix(ALBUM_PATH_PREFIX)
        .map(|rest| rest.trim_matches('/'))
        .unwrap_or_default();
    if slug.is_empty() {
        return Err(FetchError::Validation(format!(
            "{raw}: expected a {ALBUM_PATH_PREFIX}<name> album page"
        )));
    }

    Ok(url)
}
