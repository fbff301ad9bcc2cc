use thiserror::Error;

/// 引擎构造阶段的统一错误类型
///
/// 按约定，所有对调用方可见的失败都发生在构造阶段；
/// 引擎启动之后的写入失败在内部降级处理，不再向外传播。
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("无效的写缓冲区容量: {0}（必须大于 0）")]
    InvalidBufferSize(usize),

    #[error("无效的队列容量: {0}（必须大于 0）")]
    InvalidQueueCapacity(usize),

    #[error("打开日志文件失败: {path}")]
    OpenSink {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("创建后台工作线程失败")]
    SpawnWorker(#[source] std::io::Error),
}
