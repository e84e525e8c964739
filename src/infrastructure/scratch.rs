//! 编译草稿目录
//!
//! 多个渲染线程共享同一个目录，只通过"生成唯一文件名"和"按名删除"两种操作访问，
//! 因而无需加锁。文件名由时间戳、进程内递增序号和尝试序号组成。

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

/// 共享的草稿目录
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    sequence: AtomicU64,
}

impl ScratchDir {
    /// 打开（必要时创建）草稿目录
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// 生成唯一的文件主名（不含扩展名）
    pub fn unique_stem(&self, label: &str, attempt: u32) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}_a{}", label, millis, seq, attempt)
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// 按名删除；文件不存在不算错误
    pub fn remove(&self, name: &str) -> io::Result<()> {
        match std::fs::remove_file(self.file_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 删除一组文件，失败只记录日志
    pub fn remove_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if let Err(e) = self.remove(name) {
                warn!("⚠️ 清理临时文件 {} 失败: {}", name, e);
            }
        }
    }
}
