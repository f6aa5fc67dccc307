use crate::backoff::Backoff;
use crate::handle::StackHandle;
use crate::link::Link;
use crate::state::{Config, SharedState};
use crate::sync::{Arc, Ordering};

// --- 1. Builder ---
// --- 1. 构建器 ---

/// Builder for configuring a [`TreiberStack`].
///
/// - `grace_period`: epoch advances a retired node must outlive before reuse
/// - `advance_interval`: operations per handle between epoch advances
/// - `retire_threshold`: deferred-list length that forces an epoch advance
/// - `capacity_limit`: upper bound on arena slots
///
/// # Example
/// ```
/// use treiber_epoch::TreiberStack;
///
/// let stack: TreiberStack<u64> = TreiberStack::builder()
///     .grace_period(2)
///     .advance_interval(256)
///     .retire_threshold(128)
///     .capacity_limit(1 << 20)
///     .build();
/// ```
///
/// 用于配置 [`TreiberStack`] 的构建器。
#[derive(Debug, Clone)]
pub struct StackBuilder {
    config: Config,
    capacity_limit: Option<usize>,
}

impl StackBuilder {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            capacity_limit: None,
        }
    }

    /// Number of epoch advances a retired node must outlive before it can be
    /// handed back to the pool. Values below `1` are raised to `1`.
    ///
    /// Larger values delay reuse and grow the deferred lists; smaller values
    /// recycle sooner.
    ///
    /// Default: `1`
    ///
    /// 已退休节点在交还给节点池之前必须经历的纪元推进次数。小于 `1` 的值会被提升为 `1`。
    /// 较大的值延迟复用并使延迟列表变长；较小的值回收更快。
    #[inline]
    pub fn grace_period(mut self, epochs: u64) -> Self {
        self.config.grace_period = epochs.max(1);
        self
    }

    /// Advance the global epoch after every `interval` successful operations
    /// on a handle. `0` disables this trigger.
    ///
    /// Default: `1024`
    ///
    /// 每个句柄每完成 `interval` 次成功操作后推进全局纪元。`0` 禁用此触发条件。
    #[inline]
    pub fn advance_interval(mut self, interval: usize) -> Self {
        self.config.advance_interval = interval;
        self
    }

    /// Advance the global epoch whenever a handle holds more than this many
    /// retired nodes. Pass `None` to disable this trigger.
    ///
    /// Default: `Some(64)`
    ///
    /// 当句柄持有的已退休节点超过此数量时推进全局纪元。传递 `None` 可禁用此触发条件。
    #[inline]
    pub fn retire_threshold(mut self, threshold: impl Into<Option<usize>>) -> Self {
        self.config.retire_threshold = threshold.into();
        self
    }

    /// Maximum number of arena slots. Once every slot is in use and the
    /// free list is empty, pushes fail with [`Error::Exhausted`](crate::Error).
    ///
    /// Default: `None` (the arena's addressable maximum)
    ///
    /// 竞技场槽位的最大数量。当所有槽位都在使用且空闲列表为空时，
    /// 压栈以 [`Error::Exhausted`](crate::Error) 失败。
    #[inline]
    pub fn capacity_limit(mut self, limit: impl Into<Option<usize>>) -> Self {
        self.capacity_limit = limit.into();
        self
    }

    /// Build the stack with the configured settings.
    /// 使用配置的设置构建栈。
    #[inline]
    pub fn build<T>(self) -> TreiberStack<T> {
        TreiberStack {
            shared: Arc::new(SharedState::new(self.config, self.capacity_limit)),
        }
    }
}

impl Default for StackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// --- 2. Public stack ---
// --- 2. 公共栈 ---

/// A lock-free, unbounded LIFO stack with epoch-based node recycling.
///
/// `TreiberStack` is a cheap, cloneable reference to the shared structure.
/// Values are pushed and popped through a [`StackHandle`], the per-thread
/// context obtained from [`register`](TreiberStack::register), which owns
/// the thread's deferred-retirement list.
///
/// ```
/// use std::thread;
/// use treiber_epoch::TreiberStack;
///
/// let stack = TreiberStack::new();
///
/// let producer = {
///     let stack = stack.clone();
///     thread::spawn(move || {
///         let mut handle = stack.register();
///         for i in 0..100u32 {
///             handle.push(i).unwrap();
///         }
///     })
/// };
/// producer.join().unwrap();
///
/// let mut handle = stack.register();
/// assert_eq!(handle.pop(), Some(99));
/// ```
///
/// 基于纪元回收节点的无锁、无界 LIFO 栈。
///
/// `TreiberStack` 是对共享结构的廉价、可克隆的引用。
/// 值通过 [`StackHandle`] 压入和弹出；该句柄是由 [`register`](TreiberStack::register)
/// 获得的每线程上下文，持有线程的延迟退休列表。
pub struct TreiberStack<T> {
    pub(crate) shared: Arc<SharedState<T>>,
}

impl TreiberStack<()> {
    /// Create a builder for configuring the stack. The payload type is
    /// chosen by [`build`](StackBuilder::build).
    ///
    /// 创建用于配置栈的构建器。负载类型由 [`build`](StackBuilder::build) 决定。
    #[inline]
    pub fn builder() -> StackBuilder {
        StackBuilder::new()
    }
}

impl<T> TreiberStack<T> {
    /// Create a stack with the default configuration.
    /// 使用默认配置创建栈。
    #[inline]
    pub fn new() -> Self {
        StackBuilder::new().build()
    }

    /// Register the calling thread and return its handle.
    ///
    /// Each thread should hold one handle for as long as it uses the stack.
    /// Dropping the handle deregisters it.
    ///
    /// 注册调用线程并返回其句柄。
    /// 每个线程在使用栈期间应持有一个句柄。drop 句柄即注销。
    #[inline]
    pub fn register(&self) -> StackHandle<T> {
        StackHandle::new(self.shared.clone())
    }

    /// Momentary, unsynchronised view of whether the stack is empty.
    ///
    /// The answer may be stale by the time it is returned; only a `None`
    /// from `pop` is authoritative.
    ///
    /// 栈是否为空的瞬时、非同步视图。
    /// 返回时结果可能已经过时；只有 `pop` 返回的 `None` 才具有权威性。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Current value of the global epoch counter.
    /// 全局纪元计数器的当前值。
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.shared.global_epoch.load(Ordering::Relaxed)
    }

    /// Maximum number of nodes the arena can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.pool.arena().capacity()
    }

    /// Signal cooperative shutdown.
    ///
    /// From now on `push` discards its value instead of publishing it and
    /// `pop` reports an empty stack. Values already on the stack are dropped
    /// with the stack.
    ///
    /// 发出协作式关闭信号。
    /// 此后 `push` 丢弃其值而不发布，`pop` 报告栈为空。栈上已有的值随栈一起被 drop。
    #[inline]
    pub fn shutdown(&self) {
        if !self.shared.shutdown.swap(true, Ordering::Release) {
            log::debug!("stack shutdown requested");
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Relaxed)
    }
}

impl<T> Clone for TreiberStack<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for TreiberStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TreiberStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreiberStack")
            .field("empty", &self.is_empty())
            .field("epoch", &self.epoch())
            .field("allocated", &self.shared.pool.arena().allocated())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

// --- 3. Stack core: push/pop protocol over the head link ---
// --- 3. 栈核心：基于头链接的压栈/弹栈协议 ---

impl<T> SharedState<T> {
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_nil()
    }

    #[inline]
    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Splices the privately built chain `first ..= last` on top of the
    /// stack.
    ///
    /// The successful CAS is the publication point: it releases every write
    /// made while building the chain to any thread that acquires the head.
    /// Returns `false` if shutdown was observed before publishing, in which
    /// case the chain is still owned by the caller.
    ///
    /// 将私有构建的链 `first ..= last` 拼接到栈顶。
    ///
    /// 成功的 CAS 即发布点：它把构建链时的所有写入释放给之后获取头部的任何线程。
    /// 如果在发布前观察到关闭信号则返回 `false`，此时链仍归调用者所有。
    pub(crate) fn publish(&self, first: Link, last: Link) -> bool {
        let last_slot = self.pool.slot(last);
        let mut backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            if self.is_shutting_down() {
                return false;
            }
            last_slot.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                first,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => {
                    head = actual;
                    backoff.snooze();
                }
            }
        }
    }

    /// Unlinks the top node and moves its value out.
    ///
    /// Returns the unlinked node, now exclusively owned by the caller, which
    /// must retire it.
    ///
    /// 摘下栈顶节点并移出其值。
    /// 返回被摘下的节点，此时它由调用者独占，调用者必须将其退休。
    pub(crate) fn pop(&self) -> Option<(Link, T)> {
        let mut backoff = Backoff::new();
        // Acquire pairs with the publishing CAS, so the top node's `next`
        // written before it is visible below.
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head.is_nil() || self.is_shutting_down() {
                return None;
            }
            let slot = self.pool.slot(head);
            let next = slot.next.load(Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                next,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // SAFETY: the CAS made this thread the sole owner of the
                    // node, and nodes on the stack chain hold a value.
                    let value = unsafe { slot.take_value() };
                    return Some((head, value));
                }
                Err(actual) => {
                    head = actual;
                    backoff.snooze();
                }
            }
        }
    }

    /// Drops the values of an unpublished chain `first ..= last` and returns
    /// its nodes straight to the pool.
    ///
    /// drop 未发布链 `first ..= last` 中的值，并将其节点直接归还节点池。
    pub(crate) fn discard(&self, first: Link, last: Link) {
        let mut cursor = first;
        loop {
            let slot = self.pool.slot(cursor);
            let next = slot.next.load(Ordering::Relaxed);
            // SAFETY: the chain was never published; the caller owns it.
            unsafe { slot.drop_value() };
            self.pool.deallocate(cursor);
            if cursor == last {
                break;
            }
            cursor = next;
        }
    }
}
