use crate::link::AtomicLink;
use crate::pool::NodePool;
use crate::sync::{AtomicBool, AtomicU64, Ordering};
use std::ops::Deref;

/// Default number of epoch advances a retired node must outlive.
/// 已退休节点必须经历的默认纪元推进次数。
pub(crate) const DEFAULT_GRACE_PERIOD: u64 = 1;

/// Default number of successful operations per handle between forced epoch
/// advances.
pub(crate) const DEFAULT_ADVANCE_INTERVAL: usize = 1024;

/// Default deferred-list length above which a handle advances the epoch.
/// 句柄推进纪元的默认延迟列表长度阈值。
pub(crate) const AUTO_RECLAIM_THRESHOLD: usize = 64;

/// Aligns the wrapped value to its own cache line.
/// 将包装的值对齐到独立的缓存行。
#[derive(Debug, Default)]
#[repr(align(64))]
pub(crate) struct CachePadded<T>(pub(crate) T);

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

/// Reclamation tuning, fixed at build time.
/// 回收调优参数，在构建时固定。
#[derive(Debug, Clone, Copy)]
pub(crate) struct Config {
    pub(crate) grace_period: u64,
    /// `0` disables the operation-count trigger.
    pub(crate) advance_interval: usize,
    /// `None` disables the deferred-list-size trigger.
    pub(crate) retire_threshold: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            advance_interval: DEFAULT_ADVANCE_INTERVAL,
            retire_threshold: Some(AUTO_RECLAIM_THRESHOLD),
        }
    }
}

/// State shared by every clone of a stack and every registered handle.
///
/// The three chain heads and the epoch counter each sit on their own cache
/// line; they are the only words all threads CAS or increment.
///
/// 由栈的所有克隆和所有已注册句柄共享的状态。
/// 三个链头和纪元计数器各自位于独立的缓存行上；它们是所有线程进行 CAS 或递增的唯一字。
pub(crate) struct SharedState<T> {
    /// Top of the stack chain.
    pub(crate) head: CachePadded<AtomicLink>,
    /// Global epoch, advanced by any handle.
    pub(crate) global_epoch: CachePadded<AtomicU64>,
    /// Retired nodes left behind by deregistered handles.
    pub(crate) orphans: CachePadded<AtomicLink>,
    pub(crate) shutdown: AtomicBool,
    pub(crate) pool: NodePool<T>,
    pub(crate) config: Config,
}

impl<T> SharedState<T> {
    pub(crate) fn new(config: Config, capacity: Option<usize>) -> Self {
        Self {
            head: CachePadded(AtomicLink::nil()),
            global_epoch: CachePadded(AtomicU64::new(0)),
            orphans: CachePadded(AtomicLink::nil()),
            shutdown: AtomicBool::new(false),
            pool: NodePool::new(capacity),
            config,
        }
    }
}

impl<T> Drop for SharedState<T> {
    /// Drops every payload still linked from the head. Retired, orphaned and
    /// free slots hold no payload; the arena frees their storage.
    fn drop(&mut self) {
        let mut cursor = self.head.load(Ordering::Relaxed);
        let mut dropped = 0usize;
        while !cursor.is_nil() {
            let slot = self.pool.slot(cursor);
            cursor = slot.next.load(Ordering::Relaxed);
            // SAFETY: no other reference to the state exists, and every slot
            // on the stack chain holds an initialised value.
            unsafe { slot.drop_value() };
            dropped += 1;
        }
        if dropped > 0 {
            log::trace!("dropped {dropped} values left on the stack");
        }
    }
}
