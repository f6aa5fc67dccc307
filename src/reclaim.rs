use crate::backoff::Backoff;
use crate::link::Link;
use crate::state::SharedState;
use crate::sync::Ordering;
use std::collections::VecDeque;

/// Whether a node retired at `retired` may be recycled once the global epoch
/// reads `current`.
///
/// The node must be older than `current - grace_period`, i.e. the epoch has
/// advanced more than `grace_period` times since the retirement.
///
/// 当全局纪元为 `current` 时，在 `retired` 退休的节点是否可以回收。
/// 节点必须早于 `current - grace_period`，即自退休以来纪元已推进超过 `grace_period` 次。
#[inline]
pub(crate) fn is_reclaimable(retired: u64, current: u64, grace_period: u64) -> bool {
    current
        .checked_sub(grace_period)
        .is_some_and(|limit| retired < limit)
}

/// A thread's retired-but-not-yet-reclaimed nodes.
///
/// Nodes are grouped into bags by retirement epoch, oldest bag first, so a
/// sweep only ever pops from the front. Emptied bags are kept for reuse.
///
/// 线程已退休但尚未回收的节点。
///
/// 节点按退休纪元分组到袋子中，最旧的袋子在前，因此清扫只从队首弹出。
/// 清空的袋子会保留以供复用。
#[derive(Debug, Default)]
pub(crate) struct RetireList {
    /// Bags of retired links, ordered by epoch.
    /// Each element is (epoch, bag_of_links).
    queue: VecDeque<(u64, Vec<Link>)>,
    /// Empty bags kept to avoid reallocating.
    pool: Vec<Vec<Link>>,
    /// Total number of links across all bags.
    count: usize,
}

impl RetireList {
    /// Get the total number of retired nodes.
    /// 获取已退休节点的总数。
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Adds a node retired at `epoch`. Epochs retired by one thread never
    /// decrease, so this appends to the back.
    ///
    /// 添加一个在 `epoch` 退休的节点。同一线程的退休纪元从不递减，因此追加到队尾。
    #[inline]
    pub(crate) fn push(&mut self, link: Link, epoch: u64) {
        let last_epoch = self.queue.back().map(|(e, _)| *e);
        match last_epoch {
            Some(last) if last > epoch => return self.insert(link, epoch),
            Some(last) if last == epoch => {
                if let Some((_, bag)) = self.queue.back_mut() {
                    bag.push(link);
                }
            }
            _ => {
                let mut bag = self.pool.pop().unwrap_or_else(|| Vec::with_capacity(16));
                bag.push(link);
                self.queue.push_back((epoch, bag));
            }
        }
        self.count += 1;
    }

    /// Adds a node whose epoch may be older than the newest bag (adopted
    /// orphans), keeping the queue ordered.
    fn insert(&mut self, link: Link, epoch: u64) {
        let pos = self.queue.partition_point(|(e, _)| *e < epoch);
        match self.queue.get_mut(pos) {
            Some((e, bag)) if *e == epoch => bag.push(link),
            _ => {
                let mut bag = self.pool.pop().unwrap_or_else(|| Vec::with_capacity(16));
                bag.push(link);
                self.queue.insert(pos, (epoch, bag));
            }
        }
        self.count += 1;
    }

    /// Hands every node retired before `current - grace_period` to
    /// `release` and returns how many were released.
    ///
    /// 将所有早于 `current - grace_period` 退休的节点交给 `release`，并返回释放的数量。
    pub(crate) fn collect(
        &mut self,
        current: u64,
        grace_period: u64,
        mut release: impl FnMut(Link),
    ) -> usize {
        let mut released = 0;
        while let Some((epoch, _)) = self.queue.front() {
            if !is_reclaimable(*epoch, current, grace_period) {
                break;
            }
            if let Some((_, mut bag)) = self.queue.pop_front() {
                released += bag.len();
                bag.drain(..).for_each(&mut release);
                self.pool.push(bag);
            }
        }
        self.count -= released;
        released
    }

    /// Empties the list, oldest nodes first.
    pub(crate) fn take_all(&mut self) -> Vec<Link> {
        let mut all = Vec::with_capacity(self.count);
        for (_, mut bag) in self.queue.drain(..) {
            all.append(&mut bag);
            self.pool.push(bag);
        }
        self.count = 0;
        all
    }
}

/// Per-thread retirement context owned by a registered handle.
/// 由已注册句柄持有的每线程退休上下文。
#[derive(Debug, Default)]
pub(crate) struct ThreadContext {
    /// Last global epoch this thread observed.
    pub(crate) snapshot: u64,
    /// Successful push/pop operations since registration.
    pub(crate) ops: usize,
    pub(crate) garbage: RetireList,
}

// --- Reclamation manager: retirement, epoch advance, sweeping ---
// --- 回收管理器：退休、纪元推进、清扫 ---

impl<T> SharedState<T> {
    /// Moves `link` into `ctx`'s deferred list, tagged with the global epoch
    /// current at the moment of retirement. Never blocks.
    ///
    /// 将 `link` 移入 `ctx` 的延迟列表，并标记为退休时刻的全局纪元。从不阻塞。
    pub(crate) fn retire(&self, ctx: &mut ThreadContext, link: Link) {
        ctx.snapshot = self.global_epoch.load(Ordering::Acquire);
        self.pool.slot(link).set_retired_epoch(ctx.snapshot);
        ctx.garbage.push(link, ctx.snapshot);
    }

    /// Counts one completed operation and advances the epoch if the
    /// operation count or the deferred list size says so.
    ///
    /// 记录一次完成的操作；当操作计数或延迟列表长度达到阈值时推进纪元。
    pub(crate) fn after_operation(&self, ctx: &mut ThreadContext) {
        ctx.ops = ctx.ops.wrapping_add(1);
        let interval = self.config.advance_interval;
        let by_count = interval > 0 && ctx.ops % interval == 0;
        let by_size = self
            .config
            .retire_threshold
            .is_some_and(|threshold| ctx.garbage.len() > threshold);
        if by_count || by_size {
            self.advance_epoch(ctx);
        }
    }

    /// Bumps the global epoch, then sweeps `ctx`.
    /// 递增全局纪元，然后清扫 `ctx`。
    pub(crate) fn advance_epoch(&self, ctx: &mut ThreadContext) -> usize {
        let epoch = self.global_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        log::trace!("advanced global epoch to {epoch}");
        self.reclaim(ctx)
    }

    /// Returns every node of `ctx` that is past its grace period to the
    /// pool. Only this thread's list is scanned; nothing is advanced.
    ///
    /// 将 `ctx` 中所有宽限期已过的节点归还节点池。只扫描本线程的列表，不推进任何东西。
    pub(crate) fn reclaim(&self, ctx: &mut ThreadContext) -> usize {
        self.adopt_orphans(ctx);
        let current = self.global_epoch.load(Ordering::Acquire);
        ctx.snapshot = current;
        let released = ctx
            .garbage
            .collect(current, self.config.grace_period, |link| {
                self.pool.deallocate(link)
            });
        if released > 0 {
            log::trace!(
                "reclaimed {released} nodes at epoch {current}, {} still deferred",
                ctx.garbage.len()
            );
        }
        released
    }

    /// Deregistration: sweep once, then publish whatever is still inside its
    /// grace period on the orphan chain with a single CAS.
    ///
    /// 注销：先清扫一次，然后用一次 CAS 将仍在宽限期内的节点发布到孤儿链上。
    pub(crate) fn abandon(&self, ctx: &mut ThreadContext) {
        self.reclaim(ctx);
        if ctx.garbage.is_empty() {
            return;
        }

        let links = ctx.garbage.take_all();
        let count = links.len();
        let first = links[0];
        let last = links[count - 1];
        for pair in links.windows(2) {
            self.pool.slot(pair[0]).next.store(pair[1], Ordering::Relaxed);
        }

        let last_slot = self.pool.slot(last);
        let mut backoff = Backoff::new();
        let mut head = self.orphans.load(Ordering::Relaxed);
        loop {
            last_slot.next.store(head, Ordering::Relaxed);
            match self.orphans.compare_exchange_weak(
                head,
                first,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => {
                    head = actual;
                    backoff.snooze();
                }
            }
        }
        log::debug!("handle deregistered with {count} deferred nodes, moved to orphan chain");
    }

    /// Takes the whole orphan chain, if any, into `ctx`'s deferred list.
    /// 将整个孤儿链（如果有）收入 `ctx` 的延迟列表。
    fn adopt_orphans(&self, ctx: &mut ThreadContext) {
        if self.orphans.load(Ordering::Relaxed).is_nil() {
            return;
        }
        let mut cursor = self.orphans.swap(Link::NIL, Ordering::Acquire);
        let mut adopted = 0usize;
        while !cursor.is_nil() {
            let slot = self.pool.slot(cursor);
            let next = slot.next.load(Ordering::Relaxed);
            ctx.garbage.push(cursor, slot.retired_epoch());
            cursor = next;
            adopted += 1;
        }
        if adopted > 0 {
            log::debug!("adopted {adopted} orphaned nodes");
        }
    }
}
