//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`     — 数据模型（ItemRef / ResolvedItem / 运行统计等）
//! - `progress`   — 单文件传输进度条
//! - `downloader` — 下载主流程编排（分页、解析、重试、账本）

pub mod downloader;
pub mod models;
pub(crate) mod progress;
