//! HTTP 访问层。
//!
//! 下载引擎和解析器只依赖 [`Fetcher`]；生产实现是基于 reqwest 的 [`HttpFetcher`]，
//! 测试里换成内存实现。

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use tracing::debug;

use super::site::site_referer;
use crate::base_system::context::Config;
use crate::error::FetchError;

/// 已经拿到响应头、等待读取的音频字节流。
pub struct AudioStream {
    /// 响应声明的长度；未声明时为 `None`，此时不上报百分比。
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, FetchError>>,
}

pub trait Fetcher: Send + Sync + 'static {
    /// GET 一个 HTML 页面，非 2xx 视为错误。
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;

    /// GET 音频文件并返回流式响应体（带 Referer）。
    fn open_audio(&self, url: &str)
    -> impl Future<Output = Result<AudioStream, FetchError>> + Send;

    /// HEAD 探测地址是否可达；任何错误都返回 `false`。
    fn is_reachable(&self, url: &str) -> impl Future<Output = bool> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub request_timeout: Duration,
    pub user_agent: String,
    pub accept_language: String,
    pub referer: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for HttpConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            request_timeout: cfg.request_timeout(),
            user_agent: cfg.user_agent.clone(),
            accept_language: cfg.accept_language.clone(),
            referer: site_referer(),
        }
    }
}

/// 整批共享一个 `Client`；请求级的头（Referer）每次单独设置。
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    referer: HeaderValue,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        default_headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .unwrap_or(HeaderValue::from_static("en-US,en;q=0.5")),
        );

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build http client: {e}")))?;

        let referer = HeaderValue::from_str(&config.referer)
            .map_err(|e| FetchError::Network(format!("invalid referer: {e}")))?;

        Ok(Self { client, referer })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        debug!(target: "network", "GET {url}");
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }

    async fn open_audio(&self, url: &str) -> Result<AudioStream, FetchError> {
        debug!(target: "network", "GET (audio) {url}");
        let resp = self
            .client
            .get(url)
            .header(REFERER, self.referer.clone())
            .send()
            .await?
            .error_for_status()?;

        let content_length = resp.content_length().filter(|n| *n > 0);
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from))
            .boxed();

        Ok(AudioStream {
            content_length,
            body,
        })
    }

    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(target: "network", "HEAD {url} failed: {e}");
                false
            }
        }
    }
}
