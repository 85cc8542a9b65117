//! 下载主流程编排。
//!
//! 一个列表页 URL 进来：分类 → 逐页枚举 → 逐条解析直链 → 过滤/查账 →
//! 带重试的流式传输 → 校验后记账。全程单工作线程，条目按文档序、
//! 页面按页号递增处理；每页处理完才翻页，崩溃后的进度由账本保住。

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::album_parser::classifier::ListingPage;
use crate::album_parser::enumerator;
use crate::album_parser::pagination;
use crate::album_parser::resolver;
use crate::base_system::cancel;
use crate::base_system::context::{Config, safe_fs_name};
use crate::base_system::ledger::{self, DownloadLedger};
use crate::download::models::{DownloadOptions, ItemRef, ResolvedItem, RunStats};
use crate::download::progress;
use crate::network_parser::network::{FetchError, Session};

/// 站点维护占位响应：命中即判定维护中，不重试不记账。
const MAINTENANCE_URL: &str = "https://bnkr.b-cdn.net/maintenance.mp4";

#[derive(Debug, Error)]
enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("server is down for maintenance")]
    Maintenance,
    #[error("size check failed: expected {expected} bytes, got {actual} (file could be broken)")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl DownloadError {
    /// 只有连接层故障与传输中断值得原地重试；
    /// 状态码错误、维护占位、大小不符都直接放弃（大小不符留给下次运行）。
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Fetch(err) => err.is_connection(),
            DownloadError::Io(_) => true,
            _ => false,
        }
    }
}

/// 处理一个列表页 URL（含全部翻页）。
/// 顶层抓取失败会上抛，由调用方决定对整个批次是否致命。
pub fn run_listing(
    session: &Session,
    config: &Config,
    options: &DownloadOptions,
    listing_url: &str,
) -> Result<RunStats> {
    let url =
        Url::parse(listing_url).with_context(|| format!("非法的列表页 URL: {listing_url}"))?;

    let fetched = session.get_page(url.as_str())?;
    let mut page = ListingPage::parse(url, &fetched.body);
    let album = enumerator::enumerate(&page);

    info!(
        "识别为 {:?}/{:?}，相册名 \"{}\"，本页 {} 个条目",
        page.family,
        page.kind,
        album.name,
        album.items.len()
    );

    let dest = config
        .prepare_album_dir(options.custom_root.as_deref(), &album.name)
        .with_context(|| format!("创建下载目录失败: {}", album.name))?;
    let mut book = DownloadLedger::open(&dest).context("打开下载账本失败")?;
    if !book.is_empty() {
        info!("账本已有 {} 条记录", book.len());
    }

    let mut stats = RunStats::default();
    let mut items = album.items;
    loop {
        process_page_items(
            session, config, options, &page, items, &dest, &mut book, &mut stats,
        );
        if cancel::cancel_requested() {
            break;
        }
        let Some(next_url) = pagination::next_page_url(&page.url, page.document()) else {
            break;
        };
        info!("翻到下一页: {}", next_url);
        match session.get_page(next_url.as_str()) {
            Ok(fetched) => {
                page = ListingPage::parse(next_url, &fetched.body);
                items = enumerator::enumerate(&page).items;
            }
            Err(err) => {
                // 已处理完的页的成果都在账本里，翻页失败就到此为止
                warn!("下一页抓取失败，提前结束翻页: {}", err);
                break;
            }
        }
    }

    if options.export_only {
        info!(
            "文件列表已导出到 {}",
            dest.join(ledger::URL_LIST_FILE_NAME).display()
        );
    } else {
        info!(
            "本列表完成: 下载 {}，跳过 {}，失败 {}",
            stats.downloaded, stats.skipped, stats.failed
        );
    }
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn process_page_items(
    session: &Session,
    config: &Config,
    options: &DownloadOptions,
    page: &ListingPage,
    items: Vec<ItemRef>,
    dest: &Path,
    book: &mut DownloadLedger,
    stats: &mut RunStats,
) {
    for item in items {
        if cancel::cancel_requested() {
            warn!("收到取消请求，不再开始新的条目");
            stats.canceled += 1;
            return;
        }

        // 上传时间过滤在解析前做，省掉一次条目页抓取
        if !options.date_window.contains(item.uploaded) {
            debug!("上传时间不在窗口内，跳过 {}", item.url);
            stats.skipped += 1;
            continue;
        }

        let resolved = match resolver::resolve(session, config, page.family, &page.url, &item) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!("无法获得 {} 的直链: {}", item.url, err);
                stats.failed += 1;
                continue;
            }
        };

        if resolved.url.is_empty() || resolved.url == "#" {
            warn!("解析出非法直链 \"{}\"，跳过", resolved.url);
            stats.failed += 1;
            continue;
        }

        let extension = extension_of(&resolved.url);
        if !passes_extension_filters(
            extension.as_deref(),
            &options.allow_extensions,
            &options.block_extensions,
        ) {
            debug!("扩展名被过滤，跳过 {}", resolved.url);
            stats.skipped += 1;
            continue;
        }

        if book.contains(&resolved.url) {
            debug!("账本已有记录，跳过 {}", resolved.url);
            stats.skipped += 1;
            continue;
        }

        if options.export_only {
            match ledger::append_url_list(dest, &resolved.url) {
                Ok(()) => stats.exported += 1,
                Err(err) => {
                    warn!("写入 url_list.txt 失败: {}", err);
                    stats.failed += 1;
                }
            }
            continue;
        }

        match download_item(session, config, options, &resolved, dest) {
            Ok(()) => {
                // 记账是成功传输的最后一步
                if let Err(err) = book.append(&resolved.url) {
                    warn!("写入账本失败（下次运行会重新下载 {}）: {}", resolved.url, err);
                }
                info!("下载成功: {}", file_name_for(&resolved));
                stats.downloaded += 1;
            }
            Err(err) => {
                warn!("下载 {} 失败: {}", resolved.url, err);
                stats.failed += 1;
            }
        }
    }
}

/// 带重试的单条目下载。固定间隔，只重试连接层故障。
fn download_item(
    session: &Session,
    config: &Config,
    options: &DownloadOptions,
    item: &ResolvedItem,
    dest: &Path,
) -> Result<(), DownloadError> {
    let retries = options.retries.max(1);
    let mut attempt = 1;
    loop {
        info!("下载 {} (第 {}/{} 次)", item.url, attempt, retries);
        match attempt_transfer(session, item, dest) {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt < retries => {
                warn!("传输中断，{} 秒后重试: {}", config.retry_wait, err);
                thread::sleep(Duration::from_secs(config.retry_wait));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// 单次传输：流式写盘，整个响应体从不进内存。
fn attempt_transfer(
    session: &Session,
    item: &ResolvedItem,
    dest: &Path,
) -> Result<(), DownloadError> {
    let resp = session.open_stream(&item.url)?;

    if resp.url().as_str() == MAINTENANCE_URL {
        return Err(DownloadError::Maintenance);
    }

    // 声明大小优先，其次 Content-Length；都没有就跳过校验
    let expected = if item.size >= 0 {
        Some(item.size as u64)
    } else {
        resp.content_length()
    };

    let file_name = file_name_for(item);
    let final_path = dest.join(safe_fs_name(&file_name, "_", 180));

    let bar = progress::transfer_bar(expected, &file_name);
    let mut reader = bar.wrap_read(resp);
    let mut writer = BufWriter::new(File::create(&final_path)?);
    let copied = io::copy(&mut reader, &mut writer);
    bar.finish_and_clear();

    let written = copied?;
    writer.flush()?;

    if let Some(expected) = expected {
        if written != expected {
            // 文件留在盘上以便检查，但不记账，下次运行会重试
            return Err(DownloadError::SizeMismatch {
                expected,
                actual: written,
            });
        }
    }
    Ok(())
}

/// 条目落盘文件名：优先解析得到的名字，缺扩展名时从 URL 补。
fn file_name_for(item: &ResolvedItem) -> String {
    let from_url = file_name_from_url(&item.url);
    let mut name = item
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| from_url.clone());

    if Path::new(&name).extension().is_none() {
        if let Some(ext) = extension_of(&item.url) {
            name = format!("{}.{}", name, ext);
        }
    }
    if name.is_empty() {
        name = "unnamed".to_string();
    }
    name
}

fn file_name_from_url(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// URL 路径里文件名的扩展名（小写、不带点）。查询串不算路径。
fn extension_of(url: &str) -> Option<String> {
    let path = Url::parse(url).ok().map(|u| u.path().to_string())?;
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// 扩展名过滤：拒绝名单优先于允许名单。
/// 没有扩展名的 URL 只有在未配置允许名单时放行。
fn passes_extension_filters(ext: Option<&str>, allow: &[String], block: &[String]) -> bool {
    let Some(ext) = ext else {
        return allow.is_empty();
    };
    if block.iter().any(|b| b.eq_ignore_ascii_case(ext)) {
        return false;
    }
    if !allow.is_empty() && !allow.iter().any(|a| a.eq_ignore_ascii_case(ext)) {
        return false;
    }
    true
}
