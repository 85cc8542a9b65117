//! 已下载账本。
//!
//! 每个下载目录持有一个 `already_downloaded.txt`，一行一个 URL，
//! 只追加不修改。它是"是否已下载"的唯一事实来源：
//! 只有传输完成且字节数校验通过（或无法校验）的 URL 才会被写入。
//! 传输完成与写入账本之间崩溃的情况下，下次运行会重新下载该 URL，
//! 这是有意的取舍（跨崩溃至少一次）。

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const LEDGER_FILE_NAME: &str = "already_downloaded.txt";
pub const URL_LIST_FILE_NAME: &str = "url_list.txt";

#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    entries: HashSet<String>,
}

impl DownloadLedger {
    /// 打开目录下的账本，全量读入一次；文件不存在时创建空文件。
    pub fn open(dir: &Path) -> io::Result<Self> {
        let path = dir.join(LEDGER_FILE_NAME);
        if !path.is_file() {
            fs::write(&path, "")?;
        }
        let entries = fs::read_to_string(&path)?
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self { path, entries })
    }

    /// 大小写敏感的精确匹配。
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 追加一条记录。只允许在传输校验完成后调用。
    pub fn append(&mut self, url: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", url)?;
        self.entries.insert(url.to_string());
        Ok(())
    }
}

/// 导出模式：把 URL 追加进 `url_list.txt`，不下载。
pub fn append_url_list(dir: &Path, url: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(URL_LIST_FILE_NAME))?;
    writeln!(file, "{}", url)
}
