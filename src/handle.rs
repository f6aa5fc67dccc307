use crate::error::Error;
use crate::link::Link;
use crate::reclaim::ThreadContext;
use crate::state::SharedState;
use crate::sync::{Arc, Ordering};

/// A thread's registration with a [`TreiberStack`](crate::TreiberStack).
///
/// The handle carries the thread's retirement context: the last observed
/// global epoch, an operation counter that decides when to advance the
/// epoch, and the list of nodes this thread popped that may not be reused
/// yet. Every mutating method takes `&mut self`, so the context is never
/// touched by two threads at once. A handle may be moved to another thread
/// but not shared or cloned.
///
/// Dropping the handle deregisters it: nodes whose grace period has passed
/// go back to the pool, and the rest are handed to the stack so another
/// handle can recycle them later.
///
/// 线程在 [`TreiberStack`](crate::TreiberStack) 上的注册。
///
/// 句柄携带线程的退休上下文：最近观察到的全局纪元、决定何时推进纪元的操作计数器，
/// 以及此线程弹出但尚不能复用的节点列表。所有修改方法都接收 `&mut self`，
/// 因此上下文永远不会被两个线程同时访问。句柄可以移动到其他线程，但不能共享或克隆。
///
/// drop 句柄即注销：宽限期已过的节点回到节点池，其余节点交给栈，
/// 以便其他句柄稍后回收。
pub struct StackHandle<T> {
    shared: Arc<SharedState<T>>,
    pub(crate) ctx: ThreadContext,
}

impl<T> StackHandle<T> {
    pub(crate) fn new(shared: Arc<SharedState<T>>) -> Self {
        let snapshot = shared.global_epoch.load(Ordering::Acquire);
        StackHandle {
            shared,
            ctx: ThreadContext {
                snapshot,
                ..ThreadContext::default()
            },
        }
    }

    /// Push a value on top of the stack.
    ///
    /// Never blocks. Fails only with [`Error::Exhausted`] when no node can
    /// be obtained, in which case the stack is unchanged. After
    /// [`shutdown`](crate::TreiberStack::shutdown) the value is dropped and
    /// `Ok(())` is returned.
    ///
    /// 将一个值压入栈顶。
    ///
    /// 从不阻塞。仅在无法获得节点时以 [`Error::Exhausted`] 失败，此时栈保持不变。
    /// 在 [`shutdown`](crate::TreiberStack::shutdown) 之后，值被 drop 并返回 `Ok(())`。
    pub fn push(&mut self, value: T) -> Result<(), Error> {
        let link = self.shared.pool.allocate(value)?;
        if !self.shared.publish(link, link) {
            self.shared.discard(link, link);
            return Ok(());
        }
        self.shared.after_operation(&mut self.ctx);
        Ok(())
    }

    /// Push every value of `values` with a single publishing CAS.
    ///
    /// The batch is linked privately inside this handle and spliced on top of
    /// the stack atomically, so concurrent callers never interleave inside a
    /// batch. The resulting order equals pushing the values one by one: the
    /// last value is popped first.
    ///
    /// If a node cannot be allocated midway, or the iterator panics, the
    /// values taken so far are dropped, their nodes are returned to the pool
    /// and the stack is left unchanged.
    ///
    /// ```
    /// use treiber_epoch::TreiberStack;
    ///
    /// let stack = TreiberStack::new();
    /// let mut handle = stack.register();
    /// handle.push_batch(["a", "b", "c"]).unwrap();
    /// assert_eq!(handle.pop(), Some("c"));
    /// assert_eq!(handle.pop(), Some("b"));
    /// assert_eq!(handle.pop(), Some("a"));
    /// ```
    ///
    /// 用一次发布 CAS 压入 `values` 中的所有值。
    ///
    /// 批次在此句柄内私有链接，然后原子地拼接到栈顶，因此并发调用者永远不会在批次内部交错。
    /// 结果顺序与逐个压入相同：最后一个值最先弹出。
    ///
    /// 如果中途无法分配节点或迭代器 panic，已取得的值会被 drop，
    /// 其节点归还节点池，栈保持不变。
    pub fn push_batch<I>(&mut self, values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        let mut chain = PendingChain::new(&self.shared);
        for value in values {
            let link = self.shared.pool.allocate(value)?;
            chain.link(link);
        }

        if chain.is_empty() {
            return Ok(());
        }
        if chain.publish() {
            self.shared.after_operation(&mut self.ctx);
        }
        Ok(())
    }

    /// Pop the most recently pushed value, or `None` if the stack was
    /// observed empty. Never blocks.
    ///
    /// 弹出最近压入的值；如果观察到栈为空则返回 `None`。从不阻塞。
    pub fn pop(&mut self) -> Option<T> {
        let (link, value) = self.shared.pop()?;
        self.shared.retire(&mut self.ctx, link);
        self.shared.after_operation(&mut self.ctx);
        Some(value)
    }

    /// Same as [`TreiberStack::is_empty`](crate::TreiberStack::is_empty).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Number of popped nodes this handle is still holding back from reuse.
    /// 此句柄仍在阻止复用的已弹出节点数量。
    #[inline]
    pub fn retired_len(&self) -> usize {
        self.ctx.garbage.len()
    }

    /// The global epoch as last observed by this handle.
    #[inline]
    pub fn epoch_snapshot(&self) -> u64 {
        self.ctx.snapshot
    }

    /// Advance the global epoch now, then [`reclaim`](StackHandle::reclaim).
    /// Returns the number of nodes recycled.
    ///
    /// 立即推进全局纪元，然后执行 [`reclaim`](StackHandle::reclaim)。返回回收的节点数量。
    #[inline]
    pub fn advance_epoch(&mut self) -> usize {
        self.shared.advance_epoch(&mut self.ctx)
    }

    /// Recycle every node of this handle whose grace period has elapsed.
    ///
    /// Scans this handle's own deferred list only and never advances the
    /// epoch, so it makes progress only after some handle advanced it.
    /// Returns the number of nodes recycled.
    ///
    /// 回收此句柄中宽限期已过的所有节点。
    ///
    /// 只扫描此句柄自己的延迟列表，从不推进纪元，因此只有在某个句柄推进纪元之后才会有进展。
    /// 返回回收的节点数量。
    #[inline]
    pub fn reclaim(&mut self) -> usize {
        self.shared.reclaim(&mut self.ctx)
    }
}

impl<T> std::fmt::Debug for StackHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackHandle")
            .field("epoch_snapshot", &self.ctx.snapshot)
            .field("ops", &self.ctx.ops)
            .field("retired", &self.ctx.garbage.len())
            .finish()
    }
}

impl<T> Drop for StackHandle<T> {
    fn drop(&mut self) {
        self.shared.abandon(&mut self.ctx);
    }
}

/// A batch that has been allocated but not yet published.
///
/// Until [`publish`](PendingChain::publish) succeeds the chain owns its
/// nodes; dropping it drops their values and returns the nodes to the pool.
///
/// 已分配但尚未发布的批次。
/// 在 [`publish`](PendingChain::publish) 成功之前，链拥有其节点；
/// drop 它会 drop 其中的值并将节点归还节点池。
struct PendingChain<'a, T> {
    shared: &'a SharedState<T>,
    /// Top of the batch, the most recently linked node.
    first: Link,
    /// Bottom of the batch, the first linked node.
    last: Link,
}

impl<'a, T> PendingChain<'a, T> {
    fn new(shared: &'a SharedState<T>) -> Self {
        Self {
            shared,
            first: Link::NIL,
            last: Link::NIL,
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.first.is_nil()
    }

    /// Puts `link` on top of the batch.
    #[inline]
    fn link(&mut self, link: Link) {
        self.shared
            .pool
            .slot(link)
            .next
            .store(self.first, Ordering::Relaxed);
        if self.last.is_nil() {
            self.last = link;
        }
        self.first = link;
    }

    /// Splices the batch onto the stack. On shutdown the batch is discarded
    /// and `false` is returned.
    fn publish(mut self) -> bool {
        let published = self.shared.publish(self.first, self.last);
        if published {
            self.first = Link::NIL;
        }
        published
    }
}

impl<T> Drop for PendingChain<'_, T> {
    fn drop(&mut self) {
        if !self.first.is_nil() {
            self.shared.discard(self.first, self.last);
        }
    }
}
