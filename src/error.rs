//! Error type returned by the insertion paths.

use std::fmt;

/// Failure of a stack operation.
///
/// An empty stack is not an error (`pop` returns `None`), and neither is a
/// push aborted by [`TreiberStack::shutdown`](crate::TreiberStack::shutdown).
///
/// 栈操作的失败。
/// 空栈不是错误（`pop` 返回 `None`），被 [`TreiberStack::shutdown`](crate::TreiberStack::shutdown)
/// 中止的压栈也不是错误。
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Error {
    /// The free list was empty and no fresh slot could be allocated, either
    /// because `capacity` slots are already in use or because the segment
    /// allocation itself failed.
    Exhausted {
        /// Slot capacity in force when the allocation failed.
        capacity: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Exhausted { capacity } => {
                write!(f, "node arena exhausted (capacity {capacity})")
            }
        }
    }
}

impl std::error::Error for Error {}
