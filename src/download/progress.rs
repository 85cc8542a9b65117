//! 单文件传输进度条。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 已知大小给字节进度条，未知大小退化为螺旋指示器。
pub(crate) fn transfer_bar(expected: Option<u64>, file_name: &str) -> ProgressBar {
    let bar = match expected {
        Some(len) => {
            let bar = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::with_template(
                    "{prefix} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::with_template("{prefix} {spinner} {bytes} ({bytes_per_sec})")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        }
    };
    bar.set_prefix(file_name.to_string());
    bar
}
