//! 文件/文件夹命名清理。

use crate::album::html_utils::{collapse_whitespace, decode_entities};
use crate::album::models::AUDIO_EXT;

pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Windows 与 POSIX 非法字符的并集，外加 ASCII 控制字符。
pub fn is_illegal_fs_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (ch as u32) < 32
}

/// 曲目文件名：实体解码、非法字符替换为 `_`、折叠空白、去首尾空白，
/// 并保证恰好带一个 `.mp3` 后缀（大小写不敏感）。全空白输入返回空串。
pub fn clean_file_name(raw: &str) -> String {
    let decoded = decode_entities(raw);
    let replaced: String = decoded
        .chars()
        .map(|ch| if is_illegal_fs_char(ch) { '_' } else { ch })
        .collect();
    let cleaned = collapse_whitespace(&replaced).trim().to_string();
    if cleaned.is_empty() {
        return cleaned;
    }
    ensure_audio_ext(cleaned)
}

pub fn ensure_audio_ext(name: String) -> String {
    if has_audio_ext(&name) {
        name
    } else {
        format!("{name}{AUDIO_EXT}")
    }
}

pub fn has_audio_ext(name: &str) -> bool {
    name.len() >= AUDIO_EXT.len()
        && name.is_char_boundary(name.len() - AUDIO_EXT.len())
        && name[name.len() - AUDIO_EXT.len()..].eq_ignore_ascii_case(AUDIO_EXT)
}

/// 专辑文件夹名：直接丢弃非法字符；为空时回退为 `Unknown Album`。
pub fn clean_folder_name(title: &str) -> String {
    let mut cleaned: String = title
        .chars()
        .filter(|ch| !is_illegal_fs_char(*ch))
        .collect::<String>()
        .trim()
        .to_string();

    // Windows 不接受以点或空格结尾的目录名
    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        return UNKNOWN_ALBUM.to_string();
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned.insert(0, '_');
    }

    cleaned
}
