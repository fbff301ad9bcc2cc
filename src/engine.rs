use crate::buffer::WriteBuffer;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::format::format_entry;
use crate::level::LogLevel;
use crate::queue::BoundedQueue;
use crate::sink::{FileSink, LogSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// 引擎生命周期状态，单向推进：Alive → ShuttingDown → Dead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Alive,
    ShuttingDown,
    Dead,
}

/// 互斥锁保护的共享状态
///
/// 队列和 flush 握手计数是仅有的跨线程数据；
/// 落地目标和写缓冲区归工作线程独占，从不加锁。
struct Inner {
    queue: BoundedQueue,
    state: EngineState,
    /// 已发出的 flush 票据号，单调不减
    flush_requested: u64,
    /// 已确认（持久化完成）的票据号，恒 <= flush_requested
    flush_acknowledged: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    /// 唤醒工作线程：队列非空 / 有 flush 请求 / 开始关停
    wake_worker: Condvar,
    /// 通知 flush 调用者：票据已确认或引擎已终结
    flush_done: Condvar,
    /// 因队列溢出被淘汰的条目数
    dropped: AtomicU64,
}

impl Shared {
    // 日志线程不允许 panic，锁中毒时继续使用内部数据
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_wake<'a>(&self, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.wake_worker.wait(guard).unwrap_or_else(|e| e.into_inner())
    }

    fn wait_flush<'a>(&self, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.flush_done.wait(guard).unwrap_or_else(|e| e.into_inner())
    }
}

/// 异步缓冲日志引擎
///
/// 调用方持有的门面对象：`log` 永不阻塞、永不失败；`flush` 阻塞到
/// 此前入队的条目全部持久化；`shutdown` 幂等地排空并释放全部资源。
/// 所有落地 I/O 由唯一的后台工作线程执行，调用方与磁盘完全解耦。
///
/// # 示例
///
/// ```no_run
/// use logx::{Engine, EngineConfig, LogLevel};
///
/// let config: EngineConfig = json5::from_str(r#"{ path: "/tmp/app.log" }"#).unwrap();
/// let engine = Engine::new(config).unwrap();
///
/// engine.info("service started");
/// engine.log(LogLevel::Warn, "cache miss rate high");
/// engine.flush();
/// engine.shutdown();
/// ```
pub struct Engine {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<Box<dyn LogSink>>>>,
    path: String,
}

impl Engine {
    /// 按配置构造引擎：打开日志文件、分配写缓冲区、启动工作线程
    ///
    /// 任何一步失败都整体失败，不留下半启动的引擎和未关闭的文件句柄。
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        // 先校验容量，再打开文件，保证失败时没有文件句柄泄漏
        Self::validate(&config)?;
        let sink = FileSink::open(&config.path)?;
        Self::with_sink(config, Box::new(sink))
    }

    /// 用外部提供的落地目标构造引擎
    ///
    /// 引擎核心只依赖 [`LogSink`] 能力，自定义目标（或测试替身）由此注入
    pub fn with_sink(
        config: EngineConfig,
        sink: Box<dyn LogSink>,
    ) -> Result<Self, EngineError> {
        Self::validate(&config)?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: BoundedQueue::new(config.queue_capacity),
                state: EngineState::Alive,
                flush_requested: 0,
                flush_acknowledged: 0,
            }),
            wake_worker: Condvar::new(),
            flush_done: Condvar::new(),
            dropped: AtomicU64::new(0),
        });

        let buffer = WriteBuffer::new(config.buffer_size);
        let flush_on_each_write = config.flush_on_each_write;
        let worker_shared = Arc::clone(&shared);

        let handle = std::thread::Builder::new()
            .name("logx-worker".to_string())
            .spawn(move || worker_main(worker_shared, sink, buffer, flush_on_each_write))
            .map_err(EngineError::SpawnWorker)?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            path: config.path,
        })
    }

    fn validate(config: &EngineConfig) -> Result<(), EngineError> {
        if config.buffer_size == 0 {
            return Err(EngineError::InvalidBufferSize(config.buffer_size));
        }
        if config.queue_capacity == 0 {
            return Err(EngineError::InvalidQueueCapacity(config.queue_capacity));
        }
        Ok(())
    }

    /// 记录一条日志
    ///
    /// 永不阻塞、永不失败；引擎不处于 Alive 状态时静默丢弃。
    /// 队列已满时淘汰最旧的条目为新条目腾位（drop-oldest）。
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        // 格式化是纯函数，放在锁外
        let line = format_entry(level, message.as_ref());

        let mut inner = self.shared.lock();
        if inner.state != EngineState::Alive {
            return;
        }
        if inner.queue.push(line).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.wake_worker.notify_one();
    }

    /// 记录 DEBUG 级别日志
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    /// 记录 INFO 级别日志
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    /// 记录 WARN 级别日志
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    /// 记录 ERROR 级别日志
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    /// 阻塞等待，直到本次调用之前入队的条目全部持久化
    ///
    /// 通过票据握手实现：取一个请求号，等待确认号追上它。
    /// 引擎不处于 Alive 状态时立即返回（空操作，不是错误）；
    /// 等待期间引擎终结同样直接返回。
    pub fn flush(&self) {
        let mut inner = self.shared.lock();
        if inner.state != EngineState::Alive {
            return;
        }

        inner.flush_requested += 1;
        let ticket = inner.flush_requested;
        self.shared.wake_worker.notify_one();

        while inner.flush_acknowledged < ticket && inner.state != EngineState::Dead {
            inner = self.shared.wait_flush(inner);
        }
    }

    /// 排空队列、持久化并释放全部资源
    ///
    /// 阻塞直到工作线程退出、落地目标关闭。幂等，且允许多个线程
    /// 并发调用：只有一个线程驱动实际的拆除，其余等待 Dead 状态。
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            match inner.state {
                EngineState::Dead => return,
                EngineState::Alive => {
                    inner.state = EngineState::ShuttingDown;
                    self.shared.wake_worker.notify_all();
                }
                // 其他线程已发起关停，下面等待其完成
                EngineState::ShuttingDown => {}
            }
        }

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match handle {
            Some(handle) => {
                // 工作线程退出时交还落地目标，由门面完成关闭
                match handle.join() {
                    Ok(mut sink) => {
                        if let Err(e) = sink.close() {
                            log::warn!("logx: failed to close sink: {:#}", e);
                        }
                    }
                    Err(_) => {
                        log::warn!("logx: worker thread terminated abnormally");
                    }
                }
                let mut inner = self.shared.lock();
                inner.state = EngineState::Dead;
                // 终结态：队列与握手计数归零
                inner.queue.drain_all();
                inner.flush_requested = 0;
                inner.flush_acknowledged = 0;
                self.shared.flush_done.notify_all();
            }
            None => {
                let mut inner = self.shared.lock();
                while inner.state != EngineState::Dead {
                    inner = self.shared.wait_flush(inner);
                }
            }
        }
    }

    /// 引擎当前是否接受日志
    pub fn is_alive(&self) -> bool {
        self.shared.lock().state == EngineState::Alive
    }

    /// 因队列溢出被淘汰的条目总数
    pub fn dropped_entries(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// 当前排队待写的条目数
    pub fn pending_entries(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// 日志文件路径
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 后台工作线程主循环
///
/// 独占落地目标与写缓冲区。每轮：等待唤醒（队列非空 / flush 请求 /
/// 关停三合一条件）→ 持锁排空队列 → 锁外逐条写入缓冲区 → 每批次
/// 无条件冲刷一次 → 有待确认票据时持久化并推进确认号 → 观察到
/// 关停且无遗留工作时做最终冲刷并退出，交还落地目标。
fn worker_main(
    shared: Arc<Shared>,
    mut sink: Box<dyn LogSink>,
    mut buffer: WriteBuffer,
    flush_on_each_write: bool,
) -> Box<dyn LogSink> {
    let mut acked: u64 = 0;

    loop {
        let (batch, ack_target, exiting) = {
            let mut inner = shared.lock();
            while inner.queue.is_empty()
                && inner.flush_requested == inner.flush_acknowledged
                && inner.state == EngineState::Alive
            {
                inner = shared.wait_wake(inner);
            }
            // 关停只在 Alive 之后发生，此后不会再有新条目或新票据，
            // 本轮处理完 batch 与 ack_target 即可安全退出
            (
                inner.queue.drain_all(),
                inner.flush_requested,
                inner.state != EngineState::Alive,
            )
        };

        for entry in &batch {
            write_entry(&mut buffer, sink.as_mut(), entry.as_bytes());
            if flush_on_each_write {
                flush_buffer(&mut buffer, sink.as_mut());
                sync_sink(sink.as_mut());
            }
        }

        // 每批次无条件冲刷，数据及时进入落地层的 OS 缓冲
        flush_buffer(&mut buffer, sink.as_mut());

        if ack_target > acked {
            // 先持久化再推进确认号，flush 的持久性承诺依赖这个顺序
            sync_sink(sink.as_mut());
            acked = ack_target;
            let mut inner = shared.lock();
            inner.flush_acknowledged = ack_target;
            shared.flush_done.notify_all();
        }

        if exiting {
            // 最终冲刷并持久化
            flush_buffer(&mut buffer, sink.as_mut());
            sync_sink(sink.as_mut());
            // 兜底确认全部票据，唤醒仍在等待的 flush 调用者
            let mut inner = shared.lock();
            inner.flush_acknowledged = inner.flush_requested;
            shared.flush_done.notify_all();
            return sink;
        }
    }
}

/// 写入一条日志，失败重试一次后丢弃
///
/// 写入失败对 `log` 的调用方不可见，工作线程也绝不能因此 panic：
/// 工作线程一旦消失，后续所有日志都会无声丢失。
fn write_entry(buffer: &mut WriteBuffer, sink: &mut dyn LogSink, bytes: &[u8]) {
    if buffer.append(bytes, sink).is_ok() {
        return;
    }
    if let Err(e) = buffer.append(bytes, sink) {
        log::warn!("logx: dropping entry after failed retry: {:#}", e);
    }
}

fn flush_buffer(buffer: &mut WriteBuffer, sink: &mut dyn LogSink) {
    if let Err(e) = buffer.flush_to(sink) {
        log::warn!("logx: failed to flush write buffer: {:#}", e);
    }
}

fn sync_sink(sink: &mut dyn LogSink) {
    if let Err(e) = sink.sync() {
        log::warn!("logx: failed to sync sink: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::MemorySink;

    fn test_config() -> EngineConfig {
        EngineConfig {
            path: String::new(),
            buffer_size: 64,
            flush_on_each_write: false,
            queue_capacity: 1024,
        }
    }

    #[test]
    fn test_engine_construction_rejects_zero_buffer() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("zero.log");

        let config = EngineConfig {
            path: path.to_string_lossy().to_string(),
            buffer_size: 0,
            ..EngineConfig::default()
        };

        let result = Engine::new(config);
        assert!(matches!(result, Err(EngineError::InvalidBufferSize(0))));
        // 校验先于打开文件，失败时不留下文件
        assert!(!path.exists());
    }

    #[test]
    fn test_engine_construction_rejects_zero_queue_capacity() {
        let config = EngineConfig {
            queue_capacity: 0,
            ..test_config()
        };
        let result = Engine::with_sink(config, Box::new(MemorySink::new()));
        assert!(matches!(result, Err(EngineError::InvalidQueueCapacity(0))));
    }

    #[test]
    fn test_engine_log_then_flush_is_durable() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine = Engine::with_sink(test_config(), Box::new(sink)).unwrap();

        engine.log(LogLevel::Info, "one");
        engine.log(LogLevel::Warn, "two");
        engine.log(LogLevel::Error, "three");
        engine.flush();

        // flush 返回即意味着条目已写入并持久化
        assert_eq!(probe.contents(), "[INFO] one\n[WARN] two\n[ERROR] three\n");
        assert!(probe.syncs() >= 1);

        engine.shutdown();
    }

    #[test]
    fn test_engine_single_caller_order_preserved() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine = Engine::with_sink(test_config(), Box::new(sink)).unwrap();

        for i in 0..100 {
            engine.info(format!("i={}", i));
        }
        engine.flush();

        let expected: String = (0..100).map(|i| format!("[INFO] i={}\n", i)).collect();
        assert_eq!(probe.contents(), expected);

        engine.shutdown();
    }

    #[test]
    fn test_engine_convenience_level_methods() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine = Engine::with_sink(test_config(), Box::new(sink)).unwrap();

        engine.debug("d");
        engine.info("i");
        engine.warn("w");
        engine.error("e");
        engine.flush();

        assert_eq!(probe.contents(), "[DEBUG] d\n[INFO] i\n[WARN] w\n[ERROR] e\n");

        engine.shutdown();
    }

    #[test]
    fn test_engine_shutdown_is_idempotent() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine = Engine::with_sink(test_config(), Box::new(sink)).unwrap();

        engine.info("before shutdown");
        engine.shutdown();
        engine.shutdown();

        assert!(!engine.is_alive());
        assert!(probe.closed());
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.contents(), "[INFO] before shutdown\n");
    }

    #[test]
    fn test_engine_post_shutdown_calls_are_noops() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine = Engine::with_sink(test_config(), Box::new(sink)).unwrap();

        engine.shutdown();
        assert!(!engine.is_alive());

        // 关停后 log / flush 均为空操作，不报错不崩溃
        engine.info("late entry");
        engine.flush();

        assert_eq!(probe.contents(), "");
        assert_eq!(engine.pending_entries(), 0);
    }

    #[test]
    fn test_engine_shutdown_drains_pending_entries() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine = Engine::with_sink(test_config(), Box::new(sink)).unwrap();

        for i in 0..50 {
            engine.info(format!("entry {}", i));
        }
        // 不显式 flush，shutdown 自身保证排空并持久化
        engine.shutdown();

        let contents = probe.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[0], "[INFO] entry 0");
        assert_eq!(lines[49], "[INFO] entry 49");
        assert!(probe.syncs() >= 1);
    }

    #[test]
    fn test_engine_drop_performs_shutdown() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine = Engine::with_sink(test_config(), Box::new(sink)).unwrap();

        engine.info("from drop");
        drop(engine);

        assert_eq!(probe.contents(), "[INFO] from drop\n");
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn test_engine_concurrent_shutdown_single_teardown() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine =
            Arc::new(Engine::with_sink(test_config(), Box::new(sink)).unwrap());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || engine.shutdown()));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!engine.is_alive());
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn test_engine_drop_oldest_under_overload() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let gate = probe.gate.clone();

        let config = EngineConfig {
            // 缓冲区设为 1 字节，任何条目都走旁路直接写入
            buffer_size: 1,
            queue_capacity: 2,
            ..test_config()
        };
        let engine = Engine::with_sink(config, Box::new(sink)).unwrap();

        // 占住写入闸门，让工作线程阻塞在第一条的落地写入上
        let guard = gate.lock().unwrap();
        engine.info("e0");
        // 等工作线程把 e0 取走（此后它阻塞在 write 上）
        while engine.pending_entries() > 0 {
            std::thread::yield_now();
        }

        // 容量为 2 的队列连入 4 条：e1、e2 被淘汰
        engine.info("e1");
        engine.info("e2");
        engine.info("e3");
        engine.info("e4");
        assert_eq!(engine.pending_entries(), 2);
        drop(guard);

        engine.flush();
        engine.shutdown();

        assert_eq!(engine.dropped_entries(), 2);
        assert_eq!(probe.contents(), "[INFO] e0\n[INFO] e3\n[INFO] e4\n");
    }

    #[test]
    fn test_engine_write_failure_does_not_kill_worker() {
        let sink = MemorySink::new();
        let probe = sink.clone();

        let config = EngineConfig {
            buffer_size: 1,
            ..test_config()
        };
        let engine = Engine::with_sink(config, Box::new(sink)).unwrap();

        // 注入写入失败：该条目重试一次后被丢弃，工作线程存活
        probe.set_fail_writes(true);
        engine.info("lost");
        engine.flush();
        assert!(engine.is_alive());

        probe.set_fail_writes(false);
        engine.info("recovered");
        engine.flush();

        assert_eq!(probe.contents(), "[INFO] recovered\n");
        engine.shutdown();
    }

    #[test]
    fn test_engine_flush_on_each_write_syncs_per_entry() {
        let sink = MemorySink::new();
        let probe = sink.clone();

        let config = EngineConfig {
            flush_on_each_write: true,
            ..test_config()
        };
        let engine = Engine::with_sink(config, Box::new(sink)).unwrap();

        engine.info("a");
        engine.info("b");
        engine.info("c");
        engine.flush();

        // 每条写入至少伴随一次持久化
        assert!(probe.syncs() >= 3);
        assert_eq!(probe.contents(), "[INFO] a\n[INFO] b\n[INFO] c\n");

        engine.shutdown();
    }

    #[test]
    fn test_engine_concurrent_flush_callers() {
        let sink = MemorySink::new();
        let probe = sink.clone();
        let engine =
            Arc::new(Engine::with_sink(test_config(), Box::new(sink)).unwrap());

        let mut handles = Vec::new();
        for t in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    engine.info(format!("t={} i={}", t, i));
                    if i % 10 == 0 {
                        engine.flush();
                    }
                }
                engine.flush();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        engine.shutdown();

        let contents = probe.contents();
        assert_eq!(contents.lines().count(), 400);
        for line in contents.lines() {
            assert!(line.starts_with("[INFO] t="));
        }
    }

    #[test]
    fn test_engine_path_accessor() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.log");
        let path_str = path.to_string_lossy().to_string();

        let config = EngineConfig {
            path: path_str.clone(),
            ..EngineConfig::default()
        };
        let engine = Engine::new(config).unwrap();
        assert_eq!(engine.path(), path_str);
        engine.shutdown();
    }
}
