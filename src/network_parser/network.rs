//! HTTP 会话封装。
//!
//! 统一维护浏览器 UA / Referer 头与请求超时；
//! 页面抓取、JSON 端点、CDN 探测与流式下载都从这里走。

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::base_system::context::Config;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("invalid url: {url}")]
    InvalidUrl { url: String },
    #[error("request failed for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },
}

impl FetchError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_builder() {
            FetchError::InvalidUrl {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }

    /// 连接层故障（可重试）；HTTP 状态错误与非法 URL 不算。
    pub fn is_connection(&self) -> bool {
        match self {
            FetchError::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }
}

/// 抓取到的页面：正文 + 重定向后的最终 URL。
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    pub final_url: String,
}

pub struct Session {
    client: Client,
}

impl Session {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        if let Ok(v) = HeaderValue::from_str(&config.referer) {
            default_headers.insert(REFERER, v);
        }

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self { client })
    }

    /// GET 一个 HTML 页面。非 2xx 状态按错误返回。
    pub fn get_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(FetchedPage { body, final_url })
    }

    /// GET 一个 JSON 端点。
    pub fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!("GET(json) {}", url);
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json().map_err(|e| FetchError::from_reqwest(url, e))
    }

    /// POST 一个 JSON 请求体并解析 JSON 响应。
    pub fn post_json(&self, url: &str, body: &Value) -> Result<Value, FetchError> {
        debug!("POST(json) {}", url);
        let resp = self
            .client
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(body)
            .send()
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json().map_err(|e| FetchError::from_reqwest(url, e))
    }

    /// CDN 探测：只取状态码，响应体直接丢弃。
    pub fn probe(&self, url: &str) -> Result<StatusCode, FetchError> {
        debug!("PROBE {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(resp.status())
    }

    /// 打开一个可流式读取的响应，供下载端增量写盘。
    pub fn open_stream(&self, url: &str) -> Result<Response, FetchError> {
        debug!("GET(stream) {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}
