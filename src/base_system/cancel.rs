//! 全局取消标记。
//!
//! Ctrl+C 处理器置位；下载循环在每个条目开始传输前检查，
//! 保证不会留下"已写入账本但文件不完整"的状态。

use std::sync::atomic::{AtomicBool, Ordering};

static CANCEL: AtomicBool = AtomicBool::new(false);

/// 请求取消，返回是否为首次请求。
/// 第二次 Ctrl+C 由调用方直接强制退出。
pub fn request_cancel() -> bool {
    !CANCEL.swap(true, Ordering::SeqCst)
}

pub fn cancel_requested() -> bool {
    CANCEL.load(Ordering::SeqCst)
}
