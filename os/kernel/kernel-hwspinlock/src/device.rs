use crate::of::{self, PropertyStore};
use crate::{HwSpinlock, HwSpinlockError, HwSpinlockOps};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::ops::Range;
use core::sync::atomic::{Ordering, fence};

/// A device spanning a contiguous range of hardware spinlocks.
///
/// All locks share one backend ([`HwSpinlockOps`]) and one `base_id`; the lock
/// at local index `i` has the global id `base_id + i`. The set of locks is
/// allocated once at construction and never resized.
pub struct HwSpinlockDevice {
    ops: Arc<dyn HwSpinlockOps>,
    base_id: u32,
    locks: Box<[HwSpinlock]>,
}

impl HwSpinlockDevice {
    /// Creates a bank whose locks carry their local index as private data.
    ///
    /// # Errors
    /// * [`HwSpinlockError::NoDevice`] if `num_locks` is zero.
    /// * [`HwSpinlockError::IdOverflow`] if the id range does not fit in `u32`.
    pub fn new(
        ops: Arc<dyn HwSpinlockOps>,
        base_id: u32,
        num_locks: u32,
    ) -> Result<Self, HwSpinlockError> {
        Self::with_priv(ops, base_id, num_locks, |local| local as usize)
    }

    /// Creates a bank, asking `priv_data` for each lock's backend cookie.
    ///
    /// # Errors
    /// See [`HwSpinlockDevice::new`].
    pub fn with_priv(
        ops: Arc<dyn HwSpinlockOps>,
        base_id: u32,
        num_locks: u32,
        priv_data: impl Fn(u32) -> usize,
    ) -> Result<Self, HwSpinlockError> {
        if num_locks == 0 {
            return Err(HwSpinlockError::NoDevice);
        }
        base_id
            .checked_add(num_locks)
            .ok_or(HwSpinlockError::IdOverflow)?;

        let locks = (0..num_locks)
            .map(|local| HwSpinlock::new(local, priv_data(local)))
            .collect();

        Ok(Self {
            ops,
            base_id,
            locks,
        })
    }

    /// Creates a bank described by the `hwlock-base-id` and `hwlock-num-locks`
    /// properties of `node`.
    ///
    /// # Errors
    /// Propagates the lookup errors of [`of::lookup_base_id`] and
    /// [`of::lookup_num_locks`], plus those of [`HwSpinlockDevice::new`].
    pub fn from_node(
        ops: Arc<dyn HwSpinlockOps>,
        node: &dyn PropertyStore,
    ) -> Result<Self, HwSpinlockError> {
        let base_id = of::lookup_base_id(node)?;
        let num_locks = of::lookup_num_locks(node)?;
        Self::new(ops, base_id, num_locks.get())
    }

    /// Global id of the first lock.
    #[inline]
    #[must_use]
    pub const fn base_id(&self) -> u32 {
        self.base_id
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn num_locks(&self) -> u32 {
        // Bounded by the `u32` count given at construction.
        self.locks.len() as u32
    }

    /// The half-open range of global ids owned by this bank.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> Range<u32> {
        self.base_id..self.base_id + self.num_locks()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        id >= self.base_id && id - self.base_id < self.num_locks()
    }

    /// Whether the id ranges of two banks intersect.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let (a, b) = (self.ids(), other.ids());
        a.start < b.end && b.start < a.end
    }

    /// Global id of the lock at `local_id`, if the index is in range.
    #[inline]
    #[must_use]
    pub fn global_id(&self, local_id: u32) -> Option<u32> {
        if local_id < self.num_locks() {
            Some(self.base_id + local_id)
        } else {
            None
        }
    }

    /// Global id of a lock owned by this bank.
    #[inline]
    #[must_use]
    pub const fn lock_id(&self, lock: &HwSpinlock) -> u32 {
        self.base_id + lock.local_id()
    }

    #[inline]
    #[must_use]
    pub fn lock(&self, local_id: u32) -> Option<&HwSpinlock> {
        self.locks.get(local_id as usize)
    }

    /// The lock with the given global id, if this bank owns it.
    #[inline]
    #[must_use]
    pub fn lock_by_id(&self, id: u32) -> Option<&HwSpinlock> {
        if self.contains(id) {
            self.lock(id - self.base_id)
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub fn locks(&self) -> &[HwSpinlock] {
        &self.locks
    }

    /// Makes one attempt to take the lock at `local_id`.
    ///
    /// The local guard is held only while the backend is consulted; if another
    /// local caller is mid-attempt the lock is reported busy.
    ///
    /// # Errors
    /// * [`HwSpinlockError::InvalidArgument`] if `local_id` is out of range.
    /// * [`HwSpinlockError::Busy`] if the guard or the hardware refused.
    pub fn trylock(&self, local_id: u32) -> Result<(), HwSpinlockError> {
        let lock = self
            .lock(local_id)
            .ok_or(HwSpinlockError::InvalidArgument)?;
        let Some(_token) = lock.guard().try_enter() else {
            return Err(HwSpinlockError::Busy);
        };

        if !self.ops.trylock(lock) {
            return Err(HwSpinlockError::Busy);
        }

        // Order the critical section after the hardware acquire.
        fence(Ordering::Acquire);
        Ok(())
    }

    /// Releases the lock at `local_id`. Out-of-range indices are ignored.
    pub fn unlock(&self, local_id: u32) {
        let Some(lock) = self.lock(local_id) else {
            return;
        };

        // Publish the critical section before the hardware release.
        fence(Ordering::Release);
        self.ops.unlock(lock);
    }

    /// Forwards the backoff hint for the lock at `local_id`.
    pub fn relax(&self, local_id: u32) {
        if let Some(lock) = self.lock(local_id) {
            self.ops.relax(lock);
        }
    }
}

impl core::fmt::Debug for HwSpinlockDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HwSpinlockDevice")
            .field("base_id", &self.base_id)
            .field("num_locks", &self.num_locks())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::of::DeviceNode;
    use crate::of::PropertyError;
    use core::sync::atomic::AtomicU64;

    /// One bit per lock; enough for the small banks used here.
    #[derive(Default)]
    struct BitOps {
        held: AtomicU64,
        relaxed: AtomicU64,
    }

    impl HwSpinlockOps for BitOps {
        fn trylock(&self, lock: &HwSpinlock) -> bool {
            let bit = 1 << lock.local_id();
            self.held.fetch_or(bit, Ordering::AcqRel) & bit == 0
        }

        fn unlock(&self, lock: &HwSpinlock) {
            self.held.fetch_and(!(1 << lock.local_id()), Ordering::AcqRel);
        }

        fn relax(&self, _lock: &HwSpinlock) {
            self.relaxed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn bank(base_id: u32, num_locks: u32) -> HwSpinlockDevice {
        HwSpinlockDevice::new(Arc::new(BitOps::default()), base_id, num_locks).unwrap()
    }

    #[test]
    fn global_id_is_base_plus_index() {
        let b = bank(64, 32);
        for i in 0..32 {
            assert_eq!(b.global_id(i), Some(64 + i));
            let lock = b.lock(i).unwrap();
            assert_eq!(b.lock_id(lock), 64 + i);
            assert_eq!(b.lock_by_id(64 + i).unwrap().local_id(), i);
        }
        assert_eq!(b.global_id(32), None);
        assert!(b.lock_by_id(63).is_none());
        assert!(b.lock_by_id(96).is_none());
        assert_eq!(b.ids(), 64..96);
    }

    #[test]
    fn zero_based_bank_is_valid() {
        let b = bank(0, 1);
        assert_eq!(b.global_id(0), Some(0));
        assert!(b.contains(0));
        assert!(!b.contains(1));
    }

    #[test]
    fn rejects_empty_and_overflowing_banks() {
        let ops: Arc<dyn HwSpinlockOps> = Arc::new(BitOps::default());
        assert_eq!(
            HwSpinlockDevice::new(Arc::clone(&ops), 0, 0).unwrap_err(),
            HwSpinlockError::NoDevice
        );
        assert_eq!(
            HwSpinlockDevice::new(ops, u32::MAX - 1, 2).unwrap_err(),
            HwSpinlockError::IdOverflow
        );
    }

    #[test]
    fn overlap_detection() {
        let a = bank(0, 32);
        assert!(!a.overlaps(&bank(32, 32)));
        assert!(a.overlaps(&bank(31, 2)));
        assert!(a.overlaps(&bank(8, 4)));
        assert!(bank(8, 4).overlaps(&a));
    }

    #[test]
    fn trylock_dispatches_through_ops() {
        let b = bank(0, 4);
        assert_eq!(b.trylock(2), Ok(()));
        assert_eq!(b.trylock(2), Err(HwSpinlockError::Busy));
        assert_eq!(b.trylock(1), Ok(()));
        b.unlock(2);
        assert_eq!(b.trylock(2), Ok(()));
        assert_eq!(b.trylock(4), Err(HwSpinlockError::InvalidArgument));
    }

    #[test]
    fn contended_local_guard_reports_busy() {
        let b = bank(0, 2);
        let lock = b.lock(0).unwrap();
        let token = lock.guard().try_enter();
        assert!(token.is_some());
        assert_eq!(b.trylock(0), Err(HwSpinlockError::Busy));
        drop(token);
        assert_eq!(b.trylock(0), Ok(()));
    }

    #[test]
    fn from_node_reads_both_properties() {
        let node = DeviceNode::new("spinlock@4a0f6000")
            .with_u32(of::BASE_ID_PROPERTY, 32)
            .with_u32(of::NUM_LOCKS_PROPERTY, 64);
        let b = HwSpinlockDevice::from_node(Arc::new(BitOps::default()), &node).unwrap();
        assert_eq!(b.ids(), 32..96);

        let missing = DeviceNode::new("spinlock").with_u32(of::NUM_LOCKS_PROPERTY, 64);
        assert_eq!(
            HwSpinlockDevice::from_node(Arc::new(BitOps::default()), &missing).unwrap_err(),
            HwSpinlockError::Property(PropertyError::NotFound)
        );
    }
}
