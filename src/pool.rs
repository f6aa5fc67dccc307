use crate::arena::{Arena, Slot};
use crate::backoff::Backoff;
use crate::error::Error;
use crate::link::{AtomicLink, Link};
use crate::state::CachePadded;
use crate::sync::Ordering;

/// Lock-free node allocator.
///
/// Recycled slots sit on an index-linked free list that is pushed and popped
/// with the same CAS protocol as the stack itself; when the list is empty the
/// pool falls back to a fresh arena slot.
///
/// 无锁节点分配器。
///
/// 回收的槽位位于按索引链接的空闲列表上，其压入和弹出使用与栈本身相同的 CAS 协议；
/// 当列表为空时，节点池回退到竞技场中的新槽位。
pub(crate) struct NodePool<T> {
    arena: Arena<T>,
    free: CachePadded<AtomicLink>,
}

impl<T> NodePool<T> {
    /// Create an empty pool over an arena of at most `capacity` slots.
    /// 在最多 `capacity` 个槽位的竞技场上创建一个空节点池。
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            arena: Arena::new(capacity),
            free: CachePadded(AtomicLink::nil()),
        }
    }

    #[inline]
    pub(crate) fn slot(&self, link: Link) -> &Slot<T> {
        self.arena.slot(link.index())
    }

    #[inline]
    pub(crate) fn arena(&self) -> &Arena<T> {
        &self.arena
    }

    /// Hands out a slot holding `value`, with a fresh generation, a null
    /// forward link and a cleared retirement tag.
    ///
    /// The writes are plain stores: nothing is visible to other threads until
    /// the caller publishes the returned link with a release CAS.
    ///
    /// 交出一个持有 `value` 的槽位，带有新的世代、空的前向链接和清除的退休标记。
    ///
    /// 这些写入都是普通存储：在调用者用 release CAS 发布返回的链接之前，
    /// 其他线程看不到它们。
    pub(crate) fn allocate(&self, value: T) -> Result<Link, Error> {
        let index = match self.pop_free() {
            Some(index) => index,
            None => self.arena.alloc_fresh().inspect_err(|err| {
                log::warn!("node allocation failed: {err}");
            })?,
        };

        let slot = self.arena.slot(index);
        let generation = slot.bump_generation();
        slot.next.store(Link::NIL, Ordering::Relaxed);
        slot.set_retired_epoch(0);
        // SAFETY: the slot was just taken off the free list (or never used),
        // so this thread owns it and its value is uninitialised.
        unsafe { slot.write_value(value) };
        Ok(Link::new(index, generation))
    }

    /// Returns a slot to the free list.
    ///
    /// The slot's value must already be moved out or dropped, and the caller
    /// must own the slot exclusively.
    ///
    /// 将槽位归还空闲列表。
    /// 槽位的值必须已被移出或 drop，且调用者必须独占该槽位。
    pub(crate) fn deallocate(&self, link: Link) {
        let slot = self.slot(link);
        let mut backoff = Backoff::new();
        let mut head = self.free.load(Ordering::Relaxed);
        loop {
            slot.next.store(head, Ordering::Relaxed);
            match self
                .free
                .compare_exchange_weak(head, link, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => {
                    head = actual;
                    backoff.snooze();
                }
            }
        }
    }

    /// Takes the top of the free list, if any.
    /// 取出空闲列表顶部的槽位（如果有）。
    fn pop_free(&self) -> Option<u32> {
        let mut backoff = Backoff::new();
        let mut head = self.free.load(Ordering::Acquire);
        loop {
            if head.is_nil() {
                return None;
            }
            // A stale `head` may name a slot that was reallocated meanwhile;
            // the generation makes the CAS below fail in that case.
            let next = self.slot(head).next.load(Ordering::Relaxed);
            match self
                .free
                .compare_exchange_weak(head, next, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(_) => return Some(head.index()),
                Err(actual) => {
                    head = actual;
                    backoff.snooze();
                }
            }
        }
    }

    /// Length of the free list. Only meaningful while no other thread is
    /// touching the pool.
    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.free.load(Ordering::Acquire);
        while !cursor.is_nil() {
            len += 1;
            cursor = self.slot(cursor).next.load(Ordering::Relaxed);
        }
        len
    }

    /// Whether the slot behind `link` is currently on the free list. Same
    /// caveat as [`free_len`](NodePool::free_len).
    #[cfg(test)]
    pub(crate) fn is_free(&self, link: Link) -> bool {
        let mut cursor = self.free.load(Ordering::Acquire);
        while !cursor.is_nil() {
            if cursor.index() == link.index() {
                return true;
            }
            cursor = self.slot(cursor).next.load(Ordering::Relaxed);
        }
        false
    }
}
