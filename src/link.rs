//! Generation-tagged slot links.

use crate::sync::{AtomicU64, Ordering};

/// A reference to an arena slot, tagged with the generation the slot had
/// when the link was formed.
///
/// Packed as `generation << 32 | index` so that a single 64-bit CAS compares
/// both halves. A slot's generation changes every time the pool hands it
/// out again, so a link taken before the slot was recycled never equals a
/// link to the new incarnation.
///
/// 对竞技场槽位的引用，带有形成链接时槽位的世代标记。
///
/// 打包为 `generation << 32 | index`，使一次 64 位 CAS 同时比较两半。
/// 槽位每次被节点池重新交出时世代都会改变，因此回收前取得的链接永远不等于指向新化身的链接。
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Link {
    data: u64,
}

impl Link {
    /// Index reserved for the null link.
    pub(crate) const NIL_INDEX: u32 = u32::MAX;

    /// The null link: empty stack, end of chain.
    pub(crate) const NIL: Link = Link {
        data: Self::NIL_INDEX as u64,
    };

    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        debug_assert_ne!(index, Self::NIL_INDEX);
        Self {
            data: ((generation as u64) << 32) | index as u64,
        }
    }

    #[inline]
    pub(crate) fn index(self) -> u32 {
        self.data as u32
    }

    #[inline]
    pub(crate) fn generation(self) -> u32 {
        (self.data >> 32) as u32
    }

    #[inline]
    pub(crate) fn is_nil(self) -> bool {
        self.index() == Self::NIL_INDEX
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_nil() {
            f.write_str("Link(nil)")
        } else {
            write!(f, "Link({}@{})", self.index(), self.generation())
        }
    }
}

/// An atomic [`Link`], represented as an `AtomicU64`.
/// 以 `AtomicU64` 表示的原子 [`Link`]。
#[derive(Debug)]
pub(crate) struct AtomicLink {
    data: AtomicU64,
}

impl AtomicLink {
    #[inline]
    pub(crate) fn new(link: Link) -> Self {
        Self {
            data: AtomicU64::new(link.data),
        }
    }

    #[inline]
    pub(crate) fn nil() -> Self {
        Self::new(Link::NIL)
    }

    #[inline]
    pub(crate) fn load(&self, ord: Ordering) -> Link {
        Link {
            data: self.data.load(ord),
        }
    }

    #[inline]
    pub(crate) fn store(&self, link: Link, ord: Ordering) {
        self.data.store(link.data, ord);
    }

    #[inline]
    pub(crate) fn swap(&self, link: Link, ord: Ordering) -> Link {
        Link {
            data: self.data.swap(link.data, ord),
        }
    }

    /// Weak CAS on the whole `(index, generation)` pair. On failure returns
    /// the value actually observed.
    #[inline]
    pub(crate) fn compare_exchange_weak(
        &self,
        current: Link,
        new: Link,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Link, Link> {
        self.data
            .compare_exchange_weak(current.data, new.data, success, failure)
            .map(|data| Link { data })
            .map_err(|data| Link { data })
    }
}
