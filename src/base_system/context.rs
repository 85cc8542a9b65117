//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，
//! 以及文件名清理与下载目录准备等路径工具。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_wait")]
    pub retry_wait: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_referer")]
    pub referer: String,

    // 路径配置
    #[serde(default = "default_save_path")]
    pub save_path: String,

    // 解析配置
    #[serde(default = "default_cdn_hosts")]
    pub cdn_hosts: Vec<String>,

    // 过滤配置（CLI 参数优先于此处的默认值）
    #[serde(default)]
    pub allow_extensions: Vec<String>,
    #[serde(default)]
    pub block_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_wait: default_retry_wait(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            save_path: default_save_path(),
            cdn_hosts: default_cdn_hosts(),
            allow_extensions: Vec::new(),
            block_extensions: Vec::new(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 9] = [
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "下载失败重试次数",
            },
            FieldMeta {
                name: "retry_wait",
                description: "重试之间的等待时间（秒）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "referer",
                description: "请求使用的 Referer（站点反盗链需要）",
            },
            FieldMeta {
                name: "save_path",
                description: "下载保存根目录（每个相册一个子目录）",
            },
            FieldMeta {
                name: "cdn_hosts",
                description: "兜底探测用的 CDN 主机名列表（按顺序尝试）",
            },
            FieldMeta {
                name: "allow_extensions",
                description: "默认只下载这些扩展名（留空为全部）",
            },
            FieldMeta {
                name: "block_extensions",
                description: "默认跳过这些扩展名",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            PathBuf::from("downloads")
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    /// 为一个相册准备下载目录：`<根目录>/<清理后的相册名>`。
    /// 首次使用时懒创建；账本文件由账本自己补建。
    pub fn prepare_album_dir(
        &self,
        custom_root: Option<&Path>,
        album_name: &str,
    ) -> io::Result<PathBuf> {
        let root = custom_root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_save_dir());
        let path = root.join(safe_fs_name(album_name, "_", 120));
        fs::create_dir_all(&path)?;
        Ok(path)
    }
}

/// 清理非法文件名字符（Windows 限制最严格，按它来）。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' | '"' | '<' | '>' | '/' | '\\' | '|' | '?' | '*' => {
                replacement.chars().next().unwrap_or('_')
            }
            c if (c as u32) < 32 => replacement.chars().next().unwrap_or('_'),
            _ => ch,
        })
        .collect();

    cleaned = cleaned.trim().to_string();
    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("Unknown");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断导致 panic
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("Unknown");
        }
    }

    cleaned
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_wait() -> u64 {
    2
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36".to_string()
}

fn default_referer() -> String {
    "https://bunkr.sk/".to_string()
}

fn default_save_path() -> String {
    "downloads".to_string()
}

fn default_cdn_hosts() -> Vec<String> {
    vec![
        "media-files.bunkr.ru".to_string(),
        "media-files2.bunkr.ru".to_string(),
        "media-files3.bunkr.ru".to_string(),
        "media-files4.bunkr.ru".to_string(),
    ]
}
