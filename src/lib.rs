//! A lock-free Treiber stack with epoch-based node recycling.
//!
//! Nodes live in a segmented arena and are linked by `(index, generation)`
//! pairs, so every compare-and-swap on the head, the free list or a forward
//! link compares a generation-tagged index rather than a raw address.
//!
//! A popped node is not reused immediately. The popping thread keeps it in
//! its own deferred list, tagged with the global epoch at the moment of
//! retirement, and hands it back to the node pool only after the epoch has
//! advanced past the configured grace period. The epoch is advanced
//! opportunistically by any thread, after a number of operations or when its
//! deferred list grows too long.
//!
//! Each thread works through a [`StackHandle`] obtained from
//! [`TreiberStack::register`]. The handle is the explicit per-thread
//! retirement context; dropping it deregisters the thread.
//!
//! 基于纪元回收节点的无锁 Treiber 栈。
//!
//! 节点存放在分段竞技场中，通过 `(索引, 世代)` 对链接，因此对栈头、空闲列表或前向链接的
//! 每次比较并交换比较的都是带世代标记的索引，而不是裸地址。
//!
//! 弹出的节点不会立即复用。弹出线程把它保存在自己的延迟列表中，并标记退休时刻的全局纪元，
//! 只有在纪元推进超过配置的宽限期之后才交还节点池。
//!
//! 每个线程通过 [`TreiberStack::register`] 获得的 [`StackHandle`] 工作。
//! 句柄即显式的每线程退休上下文；drop 它即注销该线程。
//!
//! ```
//! use std::thread;
//! use treiber_epoch::TreiberStack;
//!
//! let stack = TreiberStack::new();
//!
//! let producers: Vec<_> = (0..4u64)
//!     .map(|p| {
//!         let stack = stack.clone();
//!         thread::spawn(move || {
//!             let mut handle = stack.register();
//!             for i in 0..1000 {
//!                 handle.push(p * 1000 + i).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//! for p in producers {
//!     p.join().unwrap();
//! }
//!
//! let mut handle = stack.register();
//! let mut popped = 0;
//! while handle.pop().is_some() {
//!     popped += 1;
//! }
//! assert_eq!(popped, 4000);
//! ```

// --- 1. Storage: arena, links and node pool ---
// --- 1. 存储：竞技场、链接与节点池 ---
mod arena;
mod link;
mod pool;

// --- 2. Shared state and reclamation ---
// --- 2. 共享状态与回收 ---
mod reclaim;
mod state;
mod sync;

// --- 3. Public API ---
// --- 3. 公共 API ---
mod backoff;
mod error;
mod handle;
mod stack;

pub use backoff::Backoff;
pub use error::Error;
pub use handle::StackHandle;
pub use stack::{StackBuilder, TreiberStack};

#[cfg(all(test, not(feature = "loom")))]
mod tests;
