//! Register-level model of an OMAP-style spinlock module.
//!
//! The module exposes a `SYSSTATUS` register announcing how many blocks of 32
//! locks it implements, followed by one 32-bit register per lock at
//! [`LOCK_BASE_OFFSET`]. Reading a lock register is the acquire attempt: it
//! returns `0` and latches the lock if it was free, `1` if it was already
//! taken. Writing `0` releases the lock.
//!
//! [`RegisterFile`] keeps those registers in atomics so the backend can be
//! driven from several threads, which is how the self-test and the host tool
//! exercise the core without real silicon.

use crate::{HwSpinlock, HwSpinlockDevice, HwSpinlockError, HwSpinlockOps};
use alloc::boxed::Box;
use alloc::sync::Arc;
use bitfield_struct::bitfield;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Offset of `SYSSTATUS` within the module.
pub const SYSSTATUS_OFFSET: usize = 0x0014;
/// Offset of the first lock register.
pub const LOCK_BASE_OFFSET: usize = 0x0800;
/// Locks per block announced in `SYSSTATUS`.
pub const LOCKS_PER_BLOCK: u32 = 32;

/// Lock register value: free (write) / acquired by this read (read).
pub const LOCK_FREE: u32 = 0;
/// Lock register value when it was already taken.
pub const LOCK_TAKEN: u32 = 1;

/// Spin iterations per `relax` call, roughly the 50ns back-off of the hardware.
const RELAX_SPINS: u32 = 50;

/// `SYSSTATUS` register of the spinlock module.
#[bitfield(u32, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct SysStatus {
    /// Bit 0, RESETDONE: the module finished its reset sequence.
    pub reset_done: bool,

    /// Bits 1-23: reserved.
    #[bits(23)]
    pub reserved0: u32,

    /// Bits 24-31: number of implemented blocks of 32 locks.
    #[bits(8)]
    pub num_blocks: u8,
}

impl SysStatus {
    /// Number of locks announced by this status word.
    #[inline]
    #[must_use]
    pub fn num_locks(self) -> u32 {
        u32::from(self.num_blocks()) * LOCKS_PER_BLOCK
    }
}

/// Register offset of the lock at `local_id`.
#[inline]
#[must_use]
pub const fn lock_offset(local_id: u32) -> usize {
    LOCK_BASE_OFFSET + local_id as usize * size_of::<u32>()
}

/// In-memory register file of one spinlock module.
pub struct RegisterFile {
    sysstatus: SysStatus,
    locks: Box<[AtomicU32]>,
}

impl RegisterFile {
    /// A module with `num_blocks` blocks of 32 locks, out of reset, all free.
    #[must_use]
    pub fn new(num_blocks: u8) -> Self {
        let sysstatus = SysStatus::new()
            .with_reset_done(true)
            .with_num_blocks(num_blocks);
        let locks = (0..sysstatus.num_locks())
            .map(|_| AtomicU32::new(LOCK_FREE))
            .collect();
        Self { sysstatus, locks }
    }

    #[inline]
    #[must_use]
    pub const fn sysstatus(&self) -> SysStatus {
        self.sysstatus
    }

    /// Reads the register at `offset`; unmapped offsets read as zero.
    ///
    /// Reading a lock register has the acquire side effect described in the
    /// module documentation.
    #[must_use]
    pub fn read(&self, offset: usize) -> u32 {
        if offset == SYSSTATUS_OFFSET {
            return self.sysstatus.into_bits();
        }
        self.lock_register(offset)
            .map_or(0, |r| r.swap(LOCK_TAKEN, Ordering::AcqRel))
    }

    /// Writes the register at `offset`; writes to anything but a lock register
    /// are ignored, as are values other than [`LOCK_FREE`].
    pub fn write(&self, offset: usize, value: u32) {
        if value != LOCK_FREE {
            return;
        }
        if let Some(r) = self.lock_register(offset) {
            r.store(LOCK_FREE, Ordering::Release);
        }
    }

    /// Whether the lock at `local_id` is latched, without acquiring it.
    #[must_use]
    pub fn is_taken(&self, local_id: u32) -> bool {
        self.locks
            .get(local_id as usize)
            .is_some_and(|r| r.load(Ordering::Acquire) == LOCK_TAKEN)
    }

    fn lock_register(&self, offset: usize) -> Option<&AtomicU32> {
        let rel = offset.checked_sub(LOCK_BASE_OFFSET)?;
        if rel % size_of::<u32>() != 0 {
            return None;
        }
        self.locks.get(rel / size_of::<u32>())
    }
}

/// [`HwSpinlockOps`] backend driving a [`RegisterFile`].
///
/// Each lock's private data is its register offset.
pub struct RegisterFileOps {
    regs: Arc<RegisterFile>,
    relaxed: AtomicU64,
}

impl RegisterFileOps {
    #[must_use]
    pub const fn new(regs: Arc<RegisterFile>) -> Self {
        Self {
            regs,
            relaxed: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Number of `relax` calls so far.
    #[must_use]
    pub fn relax_count(&self) -> u64 {
        self.relaxed.load(Ordering::Relaxed)
    }
}

impl HwSpinlockOps for RegisterFileOps {
    fn trylock(&self, lock: &HwSpinlock) -> bool {
        // Attempt to acquire the lock by reading its value.
        self.regs.read(lock.priv_data()) == LOCK_FREE
    }

    fn unlock(&self, lock: &HwSpinlock) {
        self.regs.write(lock.priv_data(), LOCK_FREE);
    }

    fn relax(&self, _lock: &HwSpinlock) {
        self.relaxed.fetch_add(1, Ordering::Relaxed);
        for _ in 0..RELAX_SPINS {
            spin_loop();
        }
    }
}

impl HwSpinlockDevice {
    /// Creates a bank covering every lock announced by the module's
    /// `SYSSTATUS` register.
    ///
    /// # Errors
    /// * [`HwSpinlockError::NoDevice`] if the module announces no locks.
    /// * [`HwSpinlockError::IdOverflow`] if the id range does not fit in `u32`.
    pub fn from_regfile(ops: Arc<RegisterFileOps>, base_id: u32) -> Result<Self, HwSpinlockError> {
        let num_locks = ops.registers().sysstatus().num_locks();
        Self::with_priv(ops, base_id, num_locks, lock_offset)
    }
}
