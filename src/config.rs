use serde::Deserialize;
use smart_default::SmartDefault;

/// 引擎默认的写缓冲区容量（字节）
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// 引擎默认的队列容量（条目数）
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// 日志引擎配置
#[derive(Debug, Clone, Deserialize, SmartDefault, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// 日志文件路径（以追加模式打开）
    pub path: String,

    /// 写缓冲区容量（字节），为 0 时引擎构造失败
    #[default(DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// 是否在每条日志写入后立即持久化落盘
    ///
    /// 开启后以吞吐量换取单行持久性
    #[default = false]
    pub flush_on_each_write: bool,

    /// 队列容量（条目数），超出后淘汰最旧的条目
    #[default(DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}
