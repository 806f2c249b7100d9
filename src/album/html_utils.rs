//! HTML 文本处理工具。
//!
//! 实体解码、空白折叠、节点文本提取等纯文本操作。

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;
use scraper::ElementRef;

fn re_whitespace() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn re_entity() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").unwrap())
}

// ── 实体解码 ────────────────────────────────────────────────────

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        _ => return None,
    };
    Some(ch)
}

fn decode_one(entity: &str) -> Option<char> {
    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    named_entity(entity)
}

fn decode_pass(s: &str) -> Cow<'_, str> {
    re_entity().replace_all(s, |caps: &regex::Captures<'_>| {
        let whole = &caps[0];
        match decode_one(&caps[1]) {
            Some(ch) => ch.to_string(),
            None => whole.to_string(),
        }
    })
}

/// 反复解码直到结果不再变化，保证 `decode(decode(x)) == decode(x)`。
pub(crate) fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut current = s.to_string();
    loop {
        let next = decode_pass(&current).into_owned();
        if next == current {
            return Cow::Owned(current);
        }
        current = next;
    }
}

// ── 空白与节点文本 ──────────────────────────────────────────────

pub(crate) fn collapse_whitespace(s: &str) -> Cow<'_, str> {
    re_whitespace().replace_all(s, " ")
}

/// 元素的全部后代文本，首尾去空白。
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
