use crate::error::EngineError;
use anyhow::Result;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// 日志落地目标 trait
///
/// 引擎核心只依赖这组能力：追加写入、持久化落盘、关闭。
/// 实现无需线程安全，运行期间仅由后台工作线程独占访问。
pub trait LogSink: Send {
    /// 追加写入一段字节
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// 将已写入的数据持久化到稳定存储（fsync 语义）
    fn sync(&mut self) -> Result<()>;

    /// 关闭目标，关闭后的写入返回错误
    fn close(&mut self) -> Result<()>;

    /// 目标是否仍然打开
    fn is_open(&self) -> bool;
}

/// 文件落地目标
///
/// 以追加模式打开日志文件，父目录不存在时自动创建
pub struct FileSink {
    file: Option<File>,
    path: String,
}

impl FileSink {
    /// 打开日志文件，失败作为引擎构造错误上报
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let pathbuf = PathBuf::from(path);

        // 确保父目录存在
        if let Some(parent) = pathbuf.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| EngineError::OpenSink {
                    path: path.to_string(),
                    source: e,
                })?;
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&pathbuf)
            .map_err(|e| EngineError::OpenSink {
                path: path.to_string(),
                source: e,
            })?;

        Ok(Self {
            file: Some(file),
            path: path.to_string(),
        })
    }

    /// 获取日志文件路径
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(bytes)?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("sink already closed: {}", self.path)),
        }
    }

    fn sync(&mut self) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => {
                file.sync_all()?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("sink already closed: {}", self.path)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}
