//! 专辑与曲目数据模型。

/// 曲目文件的固定扩展名。
pub const AUDIO_EXT: &str = ".mp3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumInfo {
    pub title: String,
    /// 空串表示页面上没有可用封面。
    pub cover_url: String,
    pub tracks: Vec<TrackInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// 已清理的文件名，总是带 `.mp3` 后缀；不同曲目允许重名。
    pub name: String,
    /// 曲目详情页地址（还不是音频文件本身）。
    pub url: String,
    /// 预留字段：解析器目前总是产出 `false`，下载时一律先解析详情页。
    pub is_direct_download: bool,
}

impl TrackInfo {
    pub fn new(name: String, url: String) -> Self {
        Self {
            name,
            url,
            is_direct_download: false,
        }
    }
}
