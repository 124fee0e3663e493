use crate::of::{self, HWLOCK_CELLS_PROPERTY, HWLOCKS_PROPERTY, PhandleResolver, PropertyStore};
use crate::{HwSpinlockDevice, HwSpinlockError};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

/// Checkout and dispatch of hardware spinlocks by global id.
///
/// This is the only interface the self-test depends on. Implementations must
/// hand out a given id at most once at a time and must never block.
pub trait LockRegistry {
    /// Proof of checkout for one lock.
    type Handle;

    /// Checks out the lock with global id `id`.
    ///
    /// # Errors
    /// Fails if the id is unknown or already checked out.
    fn request_specific(&self, id: u32) -> Result<Self::Handle, HwSpinlockError>;

    /// Returns a lock to the registry.
    ///
    /// # Errors
    /// Fails if the registry no longer considers the lock checked out.
    fn free(&self, lock: Self::Handle) -> Result<(), HwSpinlockError>;

    /// Makes a single attempt to take the lock.
    ///
    /// # Errors
    /// [`HwSpinlockError::Busy`] if the lock is held.
    fn trylock(&self, lock: &Self::Handle) -> Result<(), HwSpinlockError>;

    /// Releases the lock.
    fn unlock(&self, lock: &Self::Handle);

    /// Global id of the lock.
    fn lock_id(&self, lock: &Self::Handle) -> u32;

    /// Resolves the `index`-th `hwlocks` reference of `node` to a global id.
    ///
    /// # Errors
    /// Any failure to decode the reference or to find its provider.
    fn of_get_id(
        &self,
        resolver: &dyn PhandleResolver,
        node: &dyn PropertyStore,
        index: usize,
    ) -> Result<u32, HwSpinlockError>;
}

/// A checked-out lock of a [`HwSpinlockRegistry`].
#[derive(Debug, PartialEq, Eq)]
pub struct HwLock {
    id: u32,
}

impl HwLock {
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }
}

struct RegisteredBank {
    device: HwSpinlockDevice,
    phandle: Option<u32>,
    requested: Box<[AtomicBool]>,
}

impl RegisteredBank {
    fn slot(&self, id: u32) -> &AtomicBool {
        &self.requested[(id - self.device.base_id()) as usize]
    }

    fn any_requested(&self) -> bool {
        self.requested.iter().any(|r| r.load(Ordering::Acquire))
    }
}

/// In-memory registry over a set of non-overlapping banks.
///
/// Banks are registered at attach time (`&mut self`); checkout and dispatch
/// work through `&self` and are lock-free.
#[derive(Default)]
pub struct HwSpinlockRegistry {
    /// Sorted by `base_id`.
    banks: Vec<RegisteredBank>,
}

impl HwSpinlockRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { banks: Vec::new() }
    }

    /// Registers a bank, optionally addressable by `phandle` from `hwlocks`
    /// references.
    ///
    /// # Errors
    /// [`HwSpinlockError::Overlap`] if the bank's ids intersect a registered bank.
    pub fn register(
        &mut self,
        device: HwSpinlockDevice,
        phandle: Option<u32>,
    ) -> Result<(), HwSpinlockError> {
        if self.banks.iter().any(|b| b.device.overlaps(&device)) {
            let ids = device.ids();
            return Err(HwSpinlockError::Overlap {
                base: ids.start,
                end: ids.end,
            });
        }

        log::debug!(
            "registering hwspinlock bank {:?} (phandle {phandle:?})",
            device.ids()
        );

        let requested = (0..device.num_locks())
            .map(|_| AtomicBool::new(false))
            .collect();
        let pos = self
            .banks
            .partition_point(|b| b.device.base_id() < device.base_id());
        self.banks.insert(
            pos,
            RegisteredBank {
                device,
                phandle,
                requested,
            },
        );
        Ok(())
    }

    /// Removes the bank starting at `base_id` and hands it back.
    ///
    /// # Errors
    /// * [`HwSpinlockError::UnknownId`] if no bank starts at `base_id`.
    /// * [`HwSpinlockError::Busy`] if any of its locks is still checked out.
    pub fn unregister(&mut self, base_id: u32) -> Result<HwSpinlockDevice, HwSpinlockError> {
        let pos = self
            .banks
            .iter()
            .position(|b| b.device.base_id() == base_id)
            .ok_or(HwSpinlockError::UnknownId(base_id))?;
        if self.banks[pos].any_requested() {
            return Err(HwSpinlockError::Busy);
        }
        Ok(self.banks.remove(pos).device)
    }

    fn bank(&self, id: u32) -> Result<&RegisteredBank, HwSpinlockError> {
        let pos = self
            .banks
            .partition_point(|b| b.device.base_id() <= id)
            .checked_sub(1)
            .ok_or(HwSpinlockError::UnknownId(id))?;
        let bank = &self.banks[pos];
        if bank.device.contains(id) {
            Ok(bank)
        } else {
            Err(HwSpinlockError::UnknownId(id))
        }
    }

    /// The bank owning `id`, if any.
    #[must_use]
    pub fn device(&self, id: u32) -> Option<&HwSpinlockDevice> {
        self.bank(id).ok().map(|b| &b.device)
    }

    pub fn devices(&self) -> impl Iterator<Item = &HwSpinlockDevice> {
        self.banks.iter().map(|b| &b.device)
    }

    /// Whether `id` is currently checked out.
    #[must_use]
    pub fn is_requested(&self, id: u32) -> bool {
        self.bank(id).is_ok_and(|b| b.slot(id).load(Ordering::Acquire))
    }

    /// Spins on `trylock` for at most `max_attempts` attempts, calling the
    /// backend's `relax` hook between two attempts.
    ///
    /// # Errors
    /// [`HwSpinlockError::Busy`] if every attempt failed.
    pub fn lock_spinning(&self, lock: &HwLock, max_attempts: u32) -> Result<(), HwSpinlockError> {
        let device = &self.bank(lock.id)?.device;
        let local_id = lock.id - device.base_id();

        for attempt in 0..max_attempts {
            match device.trylock(local_id) {
                Ok(()) => return Ok(()),
                Err(HwSpinlockError::Busy) => {}
                Err(e) => return Err(e),
            }
            if attempt + 1 < max_attempts {
                device.relax(local_id);
            }
        }
        Err(HwSpinlockError::Busy)
    }
}

impl LockRegistry for HwSpinlockRegistry {
    type Handle = HwLock;

    fn request_specific(&self, id: u32) -> Result<HwLock, HwSpinlockError> {
        self.bank(id)?
            .slot(id)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HwSpinlockError::AlreadyRequested(id))?;
        Ok(HwLock { id })
    }

    fn free(&self, lock: HwLock) -> Result<(), HwSpinlockError> {
        self.bank(lock.id)?
            .slot(lock.id)
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| HwSpinlockError::NotRequested(lock.id))
    }

    fn trylock(&self, lock: &HwLock) -> Result<(), HwSpinlockError> {
        let device = &self.bank(lock.id)?.device;
        device.trylock(lock.id - device.base_id())
    }

    fn unlock(&self, lock: &HwLock) {
        if let Ok(bank) = self.bank(lock.id) {
            bank.device.unlock(lock.id - bank.device.base_id());
        }
    }

    fn lock_id(&self, lock: &HwLock) -> u32 {
        lock.id
    }

    fn of_get_id(
        &self,
        resolver: &dyn PhandleResolver,
        node: &dyn PropertyStore,
        index: usize,
    ) -> Result<u32, HwSpinlockError> {
        let spec = of::parse_phandle_with_args(
            node,
            HWLOCKS_PROPERTY,
            HWLOCK_CELLS_PROPERTY,
            index,
            resolver,
        )?;

        let bank = self
            .banks
            .iter()
            .find(|b| b.phandle == Some(spec.phandle))
            .ok_or(HwSpinlockError::ProbeDefer)?;

        let local_id = of::simple_xlate(&spec)?;
        bank.device
            .global_id(local_id)
            .ok_or(HwSpinlockError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::of::{DeviceNode, DeviceTree};
    use crate::{RegisterFile, RegisterFileOps};
    use alloc::sync::Arc;

    /// A bank of 32 register-backed locks.
    fn bank(base_id: u32) -> HwSpinlockDevice {
        let ops = Arc::new(RegisterFileOps::new(Arc::new(RegisterFile::new(1))));
        HwSpinlockDevice::from_regfile(ops, base_id).unwrap()
    }

    fn registry() -> HwSpinlockRegistry {
        let mut r = HwSpinlockRegistry::new();
        r.register(bank(32), Some(2)).unwrap();
        r.register(bank(0), Some(1)).unwrap();
        r
    }

    #[test]
    fn rejects_overlapping_banks() {
        let mut r = registry();
        assert_eq!(
            r.register(bank(48), None),
            Err(HwSpinlockError::Overlap { base: 48, end: 80 })
        );
        assert!(r.register(bank(64), None).is_ok());
        assert_eq!(r.devices().count(), 3);
    }

    #[test]
    fn request_is_exclusive_until_free() {
        let r = registry();
        let l = r.request_specific(40).unwrap();
        assert_eq!(r.lock_id(&l), 40);
        assert!(r.is_requested(40));
        assert_eq!(
            r.request_specific(40),
            Err(HwSpinlockError::AlreadyRequested(40))
        );
        r.free(l).unwrap();
        assert!(!r.is_requested(40));
        assert!(r.request_specific(40).is_ok());
    }

    #[test]
    fn unknown_ids_and_double_free_are_errors() {
        let r = registry();
        assert_eq!(r.request_specific(64), Err(HwSpinlockError::UnknownId(64)));
        assert_eq!(r.free(HwLock { id: 3 }), Err(HwSpinlockError::NotRequested(3)));
        assert_eq!(r.free(HwLock { id: 99 }), Err(HwSpinlockError::UnknownId(99)));
    }

    #[test]
    fn trylock_unlock_through_handle() {
        let r = registry();
        let l = r.request_specific(33).unwrap();
        assert_eq!(r.trylock(&l), Ok(()));
        assert_eq!(r.trylock(&l), Err(HwSpinlockError::Busy));
        r.unlock(&l);
        assert_eq!(r.trylock(&l), Ok(()));
        r.unlock(&l);
        r.free(l).unwrap();
    }

    #[test]
    fn lock_spinning_gives_up_after_max_attempts() {
        let r = registry();
        let l = r.request_specific(5).unwrap();
        assert_eq!(r.lock_spinning(&l, 1), Ok(()));
        assert_eq!(r.lock_spinning(&l, 4), Err(HwSpinlockError::Busy));
        r.unlock(&l);
        assert_eq!(r.lock_spinning(&l, 4), Ok(()));
        r.unlock(&l);
    }

    #[test]
    fn unregister_refuses_busy_banks() {
        let mut r = registry();
        let l = r.request_specific(1).unwrap();
        assert_eq!(r.unregister(0).unwrap_err(), HwSpinlockError::Busy);
        r.free(l).unwrap();
        assert_eq!(r.unregister(0).unwrap().base_id(), 0);
        assert_eq!(r.request_specific(1), Err(HwSpinlockError::UnknownId(1)));
        assert_eq!(r.unregister(0).unwrap_err(), HwSpinlockError::UnknownId(0));
    }

    #[test]
    fn resolves_hwlocks_references() {
        let r = registry();
        let provider = |name: &str, phandle| {
            DeviceNode::new(name)
                .with_phandle(phandle)
                .with_u32(HWLOCK_CELLS_PROPERTY, 1)
        };
        let tree = DeviceTree::new()
            .with_node(provider("spinlock@0", 1))
            .with_node(provider("spinlock@1", 2))
            .with_node(provider("spinlock@2", 3));
        let node =
            DeviceNode::new("test").with_cells(HWLOCKS_PROPERTY, &[1, 5, 2, 9, 2, 40, 3, 0]);

        assert_eq!(r.of_get_id(&tree, &node, 0), Ok(5));
        assert_eq!(r.of_get_id(&tree, &node, 1), Ok(41));
        assert_eq!(r.of_get_id(&tree, &node, 2), Err(HwSpinlockError::InvalidArgument));
        assert_eq!(r.of_get_id(&tree, &node, 3), Err(HwSpinlockError::ProbeDefer));
        let missing = r.of_get_id(&tree, &node, 4).unwrap_err();
        assert_eq!(missing, HwSpinlockError::Property(of::PropertyError::NotFound));
        assert!(missing.errno() < 0);
    }
}
