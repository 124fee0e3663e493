use alloc::string::String;
use core::fmt;
use kernel_hwspinlock::HwSpinlockError;
use kernel_hwspinlock::of::PropertyError;

/// Why a single lock (or reference) failed the self-test.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockFailure {
    /// The first `trylock` of an iteration failed.
    #[error("initial trylock failed in iteration {iteration}: {source}")]
    AcquisitionFailure {
        iteration: u32,
        source: HwSpinlockError,
    },
    /// Taking the already held lock again succeeded.
    #[error("recursive trylock succeeded unexpectedly in iteration {iteration}")]
    UnexpectedRecursiveAcquisition { iteration: u32 },
    /// The lock could not be taken again right after `unlock`.
    #[error("trylock after unlock failed in iteration {iteration}: {source}")]
    ReleaseFailure {
        iteration: u32,
        source: HwSpinlockError,
    },
    /// A `hwlocks` reference did not resolve to a lock id.
    #[error("unable to resolve hwlock reference {index}: {source}")]
    IdResolutionError {
        index: usize,
        source: HwSpinlockError,
    },
    /// The registry refused to hand out the lock.
    #[error("request failed: {source}")]
    RequestFailure { source: HwSpinlockError },
    /// The registry refused to take the lock back.
    #[error("free failed: {source}")]
    FreeFailure { source: HwSpinlockError },
}

/// Which addressing mode selected the locks under test.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TestMode {
    /// Locks named by the test node's `hwlocks` references.
    References,
    /// Every id below the variant's lock count.
    Sweep,
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::References => f.write_str("hwlocks references"),
            Self::Sweep => f.write_str("all locks"),
        }
    }
}

/// A failure recorded against one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub mode: TestMode,
    /// Global id, unknown when the reference itself did not resolve.
    pub id: Option<u32>,
    pub failure: LockFailure,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "[{}] lock {id}: {}", self.mode, self.failure),
            None => write!(f, "[{}] {}", self.mode, self.failure),
        }
    }
}

/// Errors that keep the self-test from running at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelftestError {
    #[error("test node has no usable compatible string: {0}")]
    MissingCompatible(PropertyError),
    #[error("no hwspinlock test variant matches `{0}`")]
    UnknownVariant(String),
}

/// Errors parsing module-parameter style configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("parameter `{0}` is not of the form key=value")]
    Malformed(String),
    #[error("invalid value `{value}` for parameter `{key}`")]
    InvalidValue { key: String, value: String },
}
