//! 基础设施模块入口。
//!
//! 子模块：
//! - `cancel`  — 全局取消标记（Ctrl+C）
//! - `config`  — 配置文件读写与带注释生成
//! - `context` — 全局配置结构、文件名清理、下载目录准备
//! - `ledger`  — 已下载账本（already_downloaded.txt / url_list.txt）
//! - `logging` — 日志系统（控制台 + 文件 + 退出归档）

pub mod cancel;
pub mod config;
pub mod context;
pub mod ledger;
pub mod logging;
