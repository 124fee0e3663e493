//! # Hardware Spinlocks
//!
//! Hardware spinlocks are mutual-exclusion primitives arbitrated by a hardware
//! module shared between processors that do not share an operating system
//! (e.g. an application core and a remote DSP). Software on each side can only
//! *try* to take a lock; the hardware decides who wins.
//!
//! ## Architecture
//!
//! ```text
//! LockRegistry (request / free by global id)
//!     ↓
//! HwSpinlockDevice (bank: base_id + num_locks locks)
//!     ↓
//! HwSpinlock (local guard + backend cookie)
//!     ↓
//! HwSpinlockOps (trylock / unlock / relax, never blocking)
//! ```
//!
//! * **Global ids**: the lock at local index `i` of a bank is `base_id + i`.
//!   Banks registered in one [`HwSpinlockRegistry`] never overlap.
//! * **Backends**: a platform implements [`HwSpinlockOps`] once and shares it
//!   between all locks of a bank. [`RegisterFileOps`] drives an in-memory
//!   model of an OMAP-style register file.
//! * **Configuration**: [`of`] reads `hwlock-base-id`, `hwlock-num-locks` and
//!   resolves `hwlocks` references to global ids.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_hwspinlock::{
//!     HwSpinlockDevice, HwSpinlockRegistry, LockRegistry, RegisterFile, RegisterFileOps,
//! };
//! use std::sync::Arc;
//!
//! let ops = Arc::new(RegisterFileOps::new(Arc::new(RegisterFile::new(1))));
//! let bank = HwSpinlockDevice::from_regfile(ops, 0).unwrap();
//!
//! let mut registry = HwSpinlockRegistry::new();
//! registry.register(bank, None).unwrap();
//!
//! let lock = registry.request_specific(7).unwrap();
//! registry.trylock(&lock).unwrap();
//! // critical section shared with the other processors
//! registry.unlock(&lock);
//! registry.free(lock).unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod device;
mod error;
mod lock;
pub mod of;
mod ops;
pub mod regfile;
mod registry;

pub use device::HwSpinlockDevice;
pub use error::HwSpinlockError;
pub use lock::HwSpinlock;
pub use ops::HwSpinlockOps;
pub use regfile::{RegisterFile, RegisterFileOps, SysStatus};
pub use registry::{HwLock, HwSpinlockRegistry, LockRegistry};
