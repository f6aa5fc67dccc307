use crate::error::Error;
use crate::link::AtomicLink;
use crate::sync::{AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;

/// Segment 0 holds `1 << FIRST_SEGMENT_SHIFT` slots; each later segment
/// doubles the previous one.
#[cfg(not(feature = "loom"))]
const FIRST_SEGMENT_SHIFT: u32 = 5;
#[cfg(not(feature = "loom"))]
const SEGMENT_COUNT: usize = 26;

// Small segments keep the loom state space tractable.
#[cfg(feature = "loom")]
const FIRST_SEGMENT_SHIFT: u32 = 1;
#[cfg(feature = "loom")]
const SEGMENT_COUNT: usize = 8;

const FIRST_SEGMENT_LEN: usize = 1 << FIRST_SEGMENT_SHIFT;

/// Largest number of slots the arena can address. Always below
/// [`Link::NIL_INDEX`](crate::link::Link::NIL_INDEX).
pub(crate) const MAX_CAPACITY: usize = FIRST_SEGMENT_LEN * ((1 << SEGMENT_COUNT) - 1);

/// One storage cell of the arena.
///
/// Cache-aligned so that neighbouring nodes touched by different threads do
/// not share a line.
///
/// At any moment exactly one of the stack chain, the free list, the orphan
/// chain or a single thread's deferred list owns the slot's `next` field.
/// `value` is initialised only while the slot is live in the stack chain.
///
/// 竞技场中的一个存储单元。
///
/// 按缓存行对齐，使不同线程访问的相邻节点不共享同一缓存行。
/// 任一时刻，栈链、空闲列表、孤儿链或单个线程的延迟列表中恰有一个拥有槽位的 `next` 字段。
/// `value` 仅在槽位位于栈链上时被初始化。
#[repr(align(64))]
pub(crate) struct Slot<T> {
    pub(crate) next: AtomicLink,
    generation: AtomicU32,
    retired_epoch: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            next: AtomicLink::nil(),
            generation: AtomicU32::new(0),
            retired_epoch: AtomicU64::new(0),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The generation of the slot's current incarnation.
    #[inline]
    pub(crate) fn generation(&self) -> u32 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Start a new incarnation. Only the thread that just took the slot off
    /// the free list calls this.
    #[inline]
    pub(crate) fn bump_generation(&self) -> u32 {
        let generation = self.generation().wrapping_add(1);
        self.generation.store(generation, Ordering::Relaxed);
        generation
    }

    #[inline]
    pub(crate) fn retired_epoch(&self) -> u64 {
        self.retired_epoch.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_retired_epoch(&self, epoch: u64) {
        self.retired_epoch.store(epoch, Ordering::Relaxed);
    }

    /// # Safety
    ///
    /// The caller must own the slot exclusively and the value must be
    /// uninitialised.
    #[inline]
    pub(crate) unsafe fn write_value(&self, value: T) {
        self.value.with_mut(|p| unsafe {
            (*p).write(value);
        });
    }

    /// # Safety
    ///
    /// The caller must own the slot exclusively and the value must be
    /// initialised. The slot is uninitialised afterwards.
    #[inline]
    pub(crate) unsafe fn take_value(&self) -> T {
        self.value.with_mut(|p| unsafe { (*p).assume_init_read() })
    }

    /// # Safety
    ///
    /// Same contract as [`take_value`](Slot::take_value).
    #[inline]
    pub(crate) unsafe fn drop_value(&self) {
        self.value.with_mut(|p| unsafe { (*p).assume_init_drop() });
    }
}

/// Segmented, append-only slot storage addressed by `u32` indices.
///
/// Segments are allocated on first use and installed with a CAS; once
/// installed a segment never moves and is only freed when the arena is
/// dropped, so every index handed out stays dereferenceable.
///
/// 分段的、只追加的槽位存储，以 `u32` 索引寻址。
///
/// 段在首次使用时分配并通过 CAS 安装；安装后段永不移动，仅在竞技场被 drop 时释放，
/// 因此每个交出的索引都保持可解引用。
pub(crate) struct Arena<T> {
    segments: [AtomicPtr<Slot<T>>; SEGMENT_COUNT],
    /// Number of indices handed out by `alloc_fresh`.
    fresh: AtomicUsize,
    capacity: usize,
    _marker: PhantomData<*mut T>,
}

// Values are moved between threads, never shared by reference.
unsafe impl<T: Send> Send for Arena<T> {}
unsafe impl<T: Send> Sync for Arena<T> {}

#[inline]
fn segment_len(segment: usize) -> usize {
    FIRST_SEGMENT_LEN << segment
}

/// Maps an index to `(segment, offset)`.
#[inline]
fn locate(index: u32) -> (usize, usize) {
    let i = index as usize + FIRST_SEGMENT_LEN;
    let segment = (usize::BITS - 1 - i.leading_zeros() - FIRST_SEGMENT_SHIFT) as usize;
    (segment, i - segment_len(segment))
}

impl<T> Arena<T> {
    /// `capacity` is clamped to [`MAX_CAPACITY`].
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            segments: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            fresh: AtomicUsize::new(0),
            capacity: capacity.map_or(MAX_CAPACITY, |c| c.min(MAX_CAPACITY)),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots ever handed out fresh.
    #[inline]
    pub(crate) fn allocated(&self) -> usize {
        self.fresh.load(Ordering::Relaxed)
    }

    /// Returns the slot behind `index`.
    ///
    /// `index` must have been returned by `alloc_fresh` on this arena; every
    /// link reachable from a shared chain satisfies that.
    #[inline]
    pub(crate) fn slot(&self, index: u32) -> &Slot<T> {
        let (segment, offset) = locate(index);
        let base = self.segments[segment].load(Ordering::Acquire);
        debug_assert!(!base.is_null(), "index {index} is not backed by a segment");
        // SAFETY: the segment was installed before `index` was handed out and
        // lives as long as `self`; `offset < segment_len(segment)`.
        unsafe { &*base.add(offset) }
    }

    /// Claims a never-used slot index.
    ///
    /// The segment backing the candidate index is installed before the
    /// counter moves, so a failed segment allocation leaves the arena as it
    /// was.
    ///
    /// 申领一个从未使用过的槽位索引。
    ///
    /// 候选索引所在的段在计数器前进之前安装，因此段分配失败不会改变竞技场。
    pub(crate) fn alloc_fresh(&self) -> Result<u32, Error> {
        let mut current = self.fresh.load(Ordering::Relaxed);
        loop {
            if current >= self.capacity {
                return Err(Error::Exhausted {
                    capacity: self.capacity,
                });
            }
            let (segment, _) = locate(current as u32);
            self.ensure_segment(segment)?;
            match self.fresh.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(current as u32),
                Err(actual) => current = actual,
            }
        }
    }

    /// Installs `segment` unless some thread already did.
    ///
    /// 安装 `segment`，除非已有线程安装过。
    fn ensure_segment(&self, segment: usize) -> Result<(), Error> {
        if !self.segments[segment].load(Ordering::Acquire).is_null() {
            return Ok(());
        }

        let len = segment_len(segment);
        let mut slots: Vec<Slot<T>> = Vec::new();
        slots.try_reserve_exact(len).map_err(|_| {
            log::warn!("failed to reserve arena segment {segment} ({len} slots)");
            Error::Exhausted {
                capacity: self.capacity,
            }
        })?;
        slots.extend((0..len).map(|_| Slot::new()));
        let fresh = Box::into_raw(slots.into_boxed_slice()) as *mut Slot<T>;

        match self.segments[segment].compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                log::debug!("installed arena segment {segment} ({len} slots)");
            }
            Err(_) => {
                // Another thread installed it first.
                // SAFETY: `fresh` came from `Box::into_raw` above and was never shared.
                unsafe { free_segment(fresh, len) };
            }
        }
        Ok(())
    }
}

/// # Safety
///
/// `base` must come from a boxed slice of exactly `len` slots.
unsafe fn free_segment<T>(base: *mut Slot<T>, len: usize) {
    unsafe {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(base, len)));
    }
}

impl<T> Drop for Arena<T> {
    /// Frees the segments. Payloads still live must have been dropped by the
    /// owner of the stack chain beforehand.
    fn drop(&mut self) {
        for (segment, slot) in self.segments.iter().enumerate() {
            let base = slot.load(Ordering::Relaxed);
            if !base.is_null() {
                unsafe { free_segment(base, segment_len(segment)) };
            }
        }
    }
}
