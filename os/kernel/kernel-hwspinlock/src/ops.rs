use crate::HwSpinlock;

/// Platform-specific hwspinlock handlers.
///
/// A backend implements this trait once per kind of lock hardware and is shared
/// by every lock of a [`HwSpinlockDevice`](crate::HwSpinlockDevice). All three
/// operations may be called from contexts that cannot sleep (interrupt handlers,
/// code holding other spinlocks), so none of them may block, yield or acquire a
/// resource that can block.
pub trait HwSpinlockOps: Send + Sync {
    /// Makes a single attempt to take the lock.
    ///
    /// Returns `true` on success. On failure no state may have changed.
    fn trylock(&self, lock: &HwSpinlock) -> bool;

    /// Releases the lock. Always succeeds.
    ///
    /// Releasing a lock the hardware does not consider held is backend-defined,
    /// but must not disturb any other lock.
    fn unlock(&self, lock: &HwSpinlock);

    /// Backoff hint, called between two successive [`trylock`](Self::trylock)
    /// attempts while spinning.
    ///
    /// Only affects contention behavior, never correctness.
    #[inline]
    fn relax(&self, lock: &HwSpinlock) {
        let _ = lock;
    }
}
