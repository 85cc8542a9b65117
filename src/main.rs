//! Bunkr / Cyberdrop 相册下载器 Rust 实现。
//!
//! 本 crate 负责：把相册/单文件列表页解析成直链并带校验地批量下载，
//! 重复运行靠每个目录的账本文件保持幂等。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/账本/取消标记等基础设施
//! - `network_parser`：HTTP 会话封装（UA/Referer/超时/流式下载）
//! - `album_parser`：列表页分类、条目枚举、翻页、直链解析级联
//! - `download`：下载编排（过滤、重试、校验、记账、进度）

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{error, info};

mod album_parser;
mod base_system;
mod download;
mod network_parser;

use base_system::cancel;
use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use download::models::{DateWindow, DownloadOptions, RunStats, parse_upload_time};
use network_parser::network::Session;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "bunkr-album-downloader")]
#[command(about = "Bunkr / Cyberdrop Album Downloader (Rust CLI)")]
struct Cli {
    /// 要处理的相册/单文件页 URL
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// 批量模式：包含 URL 的文件（每行一个）
    #[arg(short = 'f', long)]
    file: Option<String>,

    /// 失败重试次数（默认取配置文件，配置默认 10）
    #[arg(short = 'r', long)]
    retries: Option<u32>,

    /// 只下载这些扩展名，逗号分隔（如 "jpg,png,mp4"）
    #[arg(short = 'e', long)]
    extensions: Option<String>,

    /// 跳过这些扩展名，逗号分隔
    #[arg(long)]
    skip_extensions: Option<String>,

    /// 只导出 URL 列表（写入 url_list.txt），不实际下载
    #[arg(short = 'w', long, default_value_t = false)]
    export_only: bool,

    /// 自定义下载根目录
    #[arg(short = 'p', long)]
    path: Option<String>,

    /// 只处理此时刻之后上传的条目（格式 HH:MM:SS DD/MM/YYYY）
    #[arg(long)]
    uploaded_after: Option<String>,

    /// 只处理此时刻之前上传的条目（格式 HH:MM:SS DD/MM/YYYY）
    #[arg(long)]
    uploaded_before: Option<String>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Bunkr Album Downloader v{}", VERSION);
        return Ok(());
    }

    let _log = LogSystem::init(LogOptions {
        debug: cli.debug,
        ..Default::default()
    })?;

    let config = load_or_create::<Config>(None).map_err(|e| anyhow!(e.to_string()))?;
    let options = build_options(&cli, &config)?;
    let urls = collect_inputs(&cli)?;

    let session = Session::new(&config)?;
    // 单 URL 模式下顶层抓取失败是致命的；批量模式逐条隔离
    let single = cli.url.is_some();

    let mut total = RunStats::default();
    for url in urls {
        if cancel::cancel_requested() {
            break;
        }
        info!("开始处理 {}", url);
        match download::downloader::run_listing(&session, &config, &options, &url) {
            Ok(stats) => total.merge(stats),
            Err(err) if single => return Err(err),
            Err(err) => error!("处理 {} 失败: {:#}", url, err),
        }
    }

    if options.export_only {
        info!("运行结束: 共导出 {} 条 URL", total.exported);
    } else {
        info!(
            "运行结束: 下载 {}，跳过 {}，失败 {}",
            total.downloaded, total.skipped, total.failed
        );
    }
    Ok(())
}

/// CLI 覆盖配置文件，得到本次运行的最终选项。
fn build_options(cli: &Cli, config: &Config) -> Result<DownloadOptions> {
    let allow_extensions = cli
        .extensions
        .as_deref()
        .map(split_extension_list)
        .unwrap_or_else(|| config.allow_extensions.clone());
    let block_extensions = cli
        .skip_extensions
        .as_deref()
        .map(split_extension_list)
        .unwrap_or_else(|| config.block_extensions.clone());

    let date_window = DateWindow {
        after: cli
            .uploaded_after
            .as_deref()
            .map(|raw| parse_upload_time(raw).with_context(|| format!("非法的时间: {raw}")))
            .transpose()?,
        before: cli
            .uploaded_before
            .as_deref()
            .map(|raw| parse_upload_time(raw).with_context(|| format!("非法的时间: {raw}")))
            .transpose()?,
    };

    Ok(DownloadOptions {
        retries: cli.retries.unwrap_or(config.max_retries),
        allow_extensions,
        block_extensions,
        export_only: cli.export_only,
        custom_root: cli.path.as_deref().map(PathBuf::from),
        date_window,
    })
}

/// 输入既可以是单个 URL，也可以是每行一个 URL 的文件；都没给直接退出。
fn collect_inputs(cli: &Cli) -> Result<Vec<String>> {
    if let Some(url) = &cli.url {
        return Ok(vec![url.trim().to_string()]);
    }
    if let Some(file) = &cli.file {
        let raw = fs::read_to_string(file).with_context(|| format!("读取 URL 文件失败: {file}"))?;
        let urls: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            bail!("URL 文件 {} 里没有可用的 URL", file);
        }
        return Ok(urls);
    }
    bail!("必须提供 -u <URL> 或 -f <FILE> 其中之一（--help 查看用法）");
}

/// "jpg, .PNG ,mp4" → ["jpg", "png", "mp4"]
fn split_extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_list_is_normalized() {
        assert_eq!(
            split_extension_list("jpg, .PNG ,mp4,,"),
            vec!["jpg", "png", "mp4"]
        );
        assert!(split_extension_list("").is_empty());
    }
}
