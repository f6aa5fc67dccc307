use crate::sync::{spin_loop, yield_now};

/// Steps below this spin on the CPU; steps above it yield to the scheduler.
const SPIN_LIMIT: u32 = 6;

/// Ceiling for the step counter: at most `1 << (YIELD_LIMIT - SPIN_LIMIT)`
/// yields per call.
const YIELD_LIMIT: u32 = 10;

/// Exponential backoff for failed compare-and-swap attempts.
///
/// Every call to [`snooze`](Backoff::snooze) waits twice as long as the
/// previous one, first by spinning and then by yielding, until the ceiling
/// is reached. Loops create a fresh `Backoff` per operation, so a successful
/// CAS always starts the next operation from the minimum delay.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use treiber_epoch::Backoff;
///
/// let counter = AtomicUsize::new(0);
/// let mut backoff = Backoff::new();
/// let mut current = counter.load(Ordering::Relaxed);
/// while let Err(actual) = counter.compare_exchange_weak(
///     current,
///     current + 1,
///     Ordering::AcqRel,
///     Ordering::Relaxed,
/// ) {
///     current = actual;
///     backoff.snooze();
/// }
/// assert_eq!(counter.load(Ordering::Relaxed), 1);
/// ```
///
/// 用于失败的比较并交换尝试的指数退避。
///
/// 每次调用 [`snooze`](Backoff::snooze) 的等待时间是上一次的两倍，先自旋后让出，
/// 直到达到上限。循环为每次操作创建新的 `Backoff`，因此成功的 CAS 总是让下一次操作从最小延迟开始。
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Back to the minimum delay.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Wait once, then double the next wait unless already at the ceiling.
    /// 等待一次，然后将下一次等待加倍，除非已达上限。
    #[inline]
    pub fn snooze(&mut self) {
        if cfg!(feature = "loom") {
            // one scheduling point per failed attempt keeps the model finite
            yield_now();
        } else if self.step <= SPIN_LIMIT {
            for _ in 0..1u32 << self.step {
                spin_loop();
            }
        } else {
            for _ in 0..1u32 << (self.step - SPIN_LIMIT) {
                yield_now();
            }
        }

        if self.step < YIELD_LIMIT {
            self.step += 1;
        }
    }

    /// Returns `true` once the delay has stopped growing.
    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.step >= YIELD_LIMIT
    }
}
