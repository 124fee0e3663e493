//! # Hardware Spinlock Self-Test
//!
//! Validates the correctness contract of hardware spinlocks through the
//! [`LockRegistry`](kernel_hwspinlock::LockRegistry) boundary:
//!
//! * **Mutual exclusion / non-recursion**: a held lock cannot be taken again.
//! * **Release visibility**: after `unlock` the lock can be taken again.
//!
//! Locks are selected in two modes that always run back to back:
//!
//! * **References**: each entry of the test node's `hwlocks` list.
//! * **Sweep**: every id below the lock count of the node's SoC variant
//!   (see [`variant::TEST_VARIANTS`]).
//!
//! Every failure is recorded against its lock and reported in the
//! [`SelftestReport`] returned by [`Selftest::run`]; the caller decides whether
//! the run passed.
//!
//! ```rust
//! use kernel_hwspinlock::of::{self, DeviceNode, DeviceTree};
//! use kernel_hwspinlock::{HwSpinlockDevice, HwSpinlockRegistry, RegisterFile, RegisterFileOps};
//! use kernel_hwspinlock_selftest::{Selftest, SelftestConfig};
//! use std::sync::Arc;
//!
//! let ops = Arc::new(RegisterFileOps::new(Arc::new(RegisterFile::new(1))));
//! let mut registry = HwSpinlockRegistry::new();
//! registry
//!     .register(HwSpinlockDevice::from_regfile(ops, 0).unwrap(), None)
//!     .unwrap();
//!
//! let node = DeviceNode::new("hwspinlock-test")
//!     .with_string(of::COMPATIBLE_PROPERTY, "ti,omap4-hwspinlock-test");
//!
//! let report = Selftest::new(&registry, SelftestConfig::default())
//!     .run(&DeviceTree::new(), &node)
//!     .unwrap();
//! assert!(report.is_pass());
//! assert_eq!(report.sweep.tested.len(), 32);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod config;
mod error;
mod harness;
pub mod protocol;
pub mod variant;

pub use config::{DEFAULT_COUNT, SelftestConfig};
pub use error::{FailureRecord, LockFailure, ParamError, SelftestError, TestMode};
pub use harness::{ModeReport, Selftest, SelftestReport};
pub use protocol::{ProtocolRun, STEPS_PER_ITERATION, Step, StepEvent, check_lock, run_protocol};
pub use variant::TestVariant;
