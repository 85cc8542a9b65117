//! 下载相关的数据模型定义。

use std::path::PathBuf;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// 列表页枚举出的一个条目引用。
/// 只在一次解析流程内存活，解析完即丢弃。
#[derive(Debug, Clone)]
pub struct ItemRef {
    /// 相对或绝对 URL
    pub url: String,
    /// 已知字节数，-1 表示未知
    pub size: i64,
    pub name: Option<String>,
    /// 上传时刻（列表页标注了才有）
    pub uploaded: Option<OffsetDateTime>,
}

impl ItemRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size: -1,
            name: None,
            uploaded: None,
        }
    }
}

/// 解析完成的直链。产生之后同一次运行内不再二次解析。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub url: String,
    /// 声明的字节数，-1 表示未知（未知时跳过完整性校验）
    pub size: i64,
    pub name: Option<String>,
}

impl ResolvedItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size: -1,
            name: None,
        }
    }
}

/// 一次运行的累计统计。
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub downloaded: u32,
    pub exported: u32,
    pub skipped: u32,
    pub failed: u32,
    pub canceled: u32,
}

impl RunStats {
    pub fn merge(&mut self, other: RunStats) {
        self.downloaded += other.downloaded;
        self.exported += other.exported;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.canceled += other.canceled;
    }
}

/// 一次运行的下载选项（CLI 覆盖配置后的最终值）。
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub retries: u32,
    /// 留空为不限制；不带点、小写
    pub allow_extensions: Vec<String>,
    pub block_extensions: Vec<String>,
    pub export_only: bool,
    pub custom_root: Option<PathBuf>,
    pub date_window: DateWindow,
}

/// 按上传时刻过滤的窗口。没有标注上传时刻的条目不受过滤。
#[derive(Debug, Clone, Copy, Default)]
pub struct DateWindow {
    pub after: Option<OffsetDateTime>,
    pub before: Option<OffsetDateTime>,
}

impl DateWindow {
    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }

    pub fn contains(&self, uploaded: Option<OffsetDateTime>) -> bool {
        let Some(ts) = uploaded else {
            return true;
        };
        if let Some(after) = self.after {
            if ts < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if ts > before {
                return false;
            }
        }
        true
    }
}

/// 解析列表页/CLI 使用的上传时刻格式：`HH:MM:SS DD/MM/YYYY`。
pub fn parse_upload_time(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let format = format_description!("[hour]:[minute]:[second] [day]/[month]/[year]");
    PrimitiveDateTime::parse(raw.trim(), &format).map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_time() {
        let ts = parse_upload_time("12:30:05 28/02/2024").unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(u8::from(ts.month()), 2);
        assert_eq!(ts.day(), 28);
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.second(), 5);
    }

    #[test]
    fn rejects_bad_upload_time() {
        assert!(parse_upload_time("2024-02-28 12:30").is_err());
    }

    #[test]
    fn date_window_filters_only_dated_items() {
        let after = parse_upload_time("00:00:00 01/01/2024").unwrap();
        let window = DateWindow {
            after: Some(after),
            before: None,
        };
        let old = parse_upload_time("23:59:59 31/12/2023").unwrap();
        let new = parse_upload_time("00:00:01 01/01/2024").unwrap();
        assert!(!window.contains(Some(old)));
        assert!(window.contains(Some(new)));
        // 没有时间戳的条目不参与过滤
        assert!(window.contains(None));
    }
}
