use core::sync::atomic::{AtomicBool, Ordering};

/// A single hardware spinlock inside a [`HwSpinlockDevice`](crate::HwSpinlockDevice).
///
/// The lock does not point back to its bank; it only remembers its position
/// (`local_id`), which together with the bank's `base_id` yields the global id.
/// Whether the lock is checked out is tracked by the registry, whether it is
/// held is decided by the hardware.
pub struct HwSpinlock {
    local_id: u32,
    guard: LocalGuard,
    priv_data: usize,
}

impl HwSpinlock {
    pub(crate) const fn new(local_id: u32, priv_data: usize) -> Self {
        Self {
            local_id,
            guard: LocalGuard::new(),
            priv_data,
        }
    }

    /// Position of this lock within its bank.
    #[inline]
    #[must_use]
    pub const fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Opaque value owned by the backend, typically a register offset.
    #[inline]
    #[must_use]
    pub const fn priv_data(&self) -> usize {
        self.priv_data
    }

    #[inline]
    pub(crate) const fn guard(&self) -> &LocalGuard {
        &self.guard
    }
}

impl core::fmt::Debug for HwSpinlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HwSpinlock")
            .field("local_id", &self.local_id)
            .field("priv_data", &self.priv_data)
            .field("guarded", &self.guard.is_entered())
            .finish()
    }
}

/// Try-only local serialization flag.
///
/// Keeps two callers of the same domain from interleaving their accesses to
/// one lock's hardware register. It never spins: a contended guard is reported
/// to the caller as a busy lock. Cross-domain exclusion is the hardware's job.
pub(crate) struct LocalGuard {
    held: AtomicBool,
}

impl LocalGuard {
    pub(crate) const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Try once; returns immediately.
    #[inline]
    pub(crate) fn try_enter(&self) -> Option<LocalGuardToken<'_>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(LocalGuardToken { guard: self })
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn is_entered(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// Leaves the guard on drop.
pub(crate) struct LocalGuardToken<'a> {
    guard: &'a LocalGuard,
}

impl Drop for LocalGuardToken<'_> {
    fn drop(&mut self) {
        // Release publishes the backend access.
        self.guard.held.store(false, Ordering::Release);
    }
}
