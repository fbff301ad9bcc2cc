use std::collections::VecDeque;

/// 有界日志条目队列
///
/// FIFO 语义；满时淘汰最旧的条目为新条目腾出位置（drop-oldest），
/// 因此 `push` 永不阻塞、永不失败。本身不做同步，由引擎的互斥锁保护。
pub struct BoundedQueue {
    items: VecDeque<String>,
    capacity: usize,
}

impl BoundedQueue {
    /// 创建指定容量的队列，容量合法性由引擎构造时校验
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// 入队一条已格式化的日志
    ///
    /// 队列已满时先淘汰队头（最旧）条目并返回它，否则返回 None。
    /// 任何时刻操作完成后 `len() <= capacity` 成立。
    pub fn push(&mut self, entry: String) -> Option<String> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(entry);
        evicted
    }

    /// 一次性取走当前的全部条目，队列随之清空
    ///
    /// 工作线程在持锁期间调用，之后在锁外逐条写入，
    /// 把持锁时间压到最短。
    pub fn drain_all(&mut self) -> Vec<String> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
