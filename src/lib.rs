//! LogX - 进程内异步缓冲日志引擎
//!
//! 接收任意多个并发调用方的结构化日志，格式化后进入有界队列，
//! 由唯一的后台工作线程经写缓冲区批量落盘。调用方延迟与磁盘 I/O
//! 完全解耦：`log` 永不阻塞，显式 `flush` 和 `shutdown` 保证持久性。
//!
//! ## 模块
//!
//! - **level**: 日志级别
//! - **format**: 条目格式化（纯函数）
//! - **config**: 引擎配置
//! - **queue**: 有界条目队列（满时淘汰最旧条目）
//! - **buffer**: 工作线程独占的写缓冲区
//! - **sink**: 落地目标抽象与文件实现
//! - **engine**: 引擎门面与后台工作线程
//!
//! ## 设计要点
//!
//! - 🚀 **非阻塞写入**: `log` 只做格式化和入队，永不等待磁盘
//! - 📦 **有界内存**: 队列满时淘汰最旧条目（drop-oldest），持续过载下内存有上界
//! - 🔒 **单写者**: 落地目标和写缓冲区仅由工作线程触碰，自身无需同步
//! - 🤝 **票据握手**: `flush` 通过单调票据号等待持久化确认，支持并发调用
//! - 🛡️ **优雅降级**: 构造之后的一切失败都在内部消化，绝不波及调用方
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use logx::{Engine, EngineConfig, LogLevel};
//!
//! // 使用 json5::from_str 构建 EngineConfig
//! let config: EngineConfig = json5::from_str(r#"
//!     {
//!         path: "/tmp/app.log",
//!         buffer_size: 8192,
//!         queue_capacity: 1024
//!     }
//! "#).unwrap();
//!
//! let engine = Engine::new(config).unwrap();
//!
//! engine.info("Application started");
//! engine.log(LogLevel::Error, "Connection failed");
//!
//! // 阻塞到此前的条目全部持久化
//! engine.flush();
//!
//! // 幂等关停：排空、落盘、释放资源
//! engine.shutdown();
//! ```

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod level;
pub mod queue;
pub mod sink;

// 重新导出主要的公共 API
pub use buffer::WriteBuffer;
pub use config::{EngineConfig, DEFAULT_BUFFER_SIZE, DEFAULT_QUEUE_CAPACITY};
pub use engine::Engine;
pub use error::EngineError;
pub use format::format_entry;
pub use level::LogLevel;
pub use queue::BoundedQueue;
pub use sink::{FileSink, LogSink};
