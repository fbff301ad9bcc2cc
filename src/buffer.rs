use crate::sink::LogSink;
use anyhow::Result;

/// 工作线程独占的写缓冲区
///
/// 把多次小写入攒成一次大的落地写入，使落地层的写入次数
/// 约为 `总字节数 / 容量` 而不是每条日志一次。
/// 无内部同步，运行期间仅由后台工作线程访问。
pub struct WriteBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl WriteBuffer {
    /// 创建指定容量的缓冲区，容量合法性由引擎构造时校验
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// 追加一段字节，必要时先冲刷缓冲区
    ///
    /// - 超过整个缓冲区容量的数据直接旁路写入落地目标；
    /// - 放不下当前内容时先冲刷再拷入，保证缓冲区永不越界。
    pub fn append(&mut self, bytes: &[u8], sink: &mut dyn LogSink) -> Result<()> {
        if bytes.len() > self.capacity {
            self.flush_to(sink)?;
            sink.write(bytes)?;
            return Ok(());
        }

        if self.buf.len() + bytes.len() > self.capacity {
            self.flush_to(sink)?;
        }

        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// 把缓冲区中未落地的内容写入目标并清空，空缓冲区时为空操作
    pub fn flush_to(&mut self, sink: &mut dyn LogSink) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        sink.write(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// 当前未落地的字节数
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    /// 缓冲区容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
