use crate::of::PropertyError;

/// `EBUSY`
const EBUSY: i32 = 16;
/// `EINVAL`
const EINVAL: i32 = 22;
/// `ENODEV`
const ENODEV: i32 = 19;
/// `ENOENT`
const ENOENT: i32 = 2;
/// `ENODATA`
const ENODATA: i32 = 61;
/// `EOVERFLOW`
const EOVERFLOW: i32 = 75;
/// `EEXIST`
const EEXIST: i32 = 17;
/// `EPROBE_DEFER` (kernel-internal)
const EPROBE_DEFER: i32 = 517;

/// Errors reported by the hwspinlock core and its registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HwSpinlockError {
    /// The lock is currently taken, either by hardware arbitration or by a
    /// concurrent local caller.
    #[error("hwspinlock is busy")]
    Busy,
    /// No device (or zero locks) was described.
    #[error("no such device")]
    NoDevice,
    /// A reference or argument could not be interpreted.
    #[error("invalid argument")]
    InvalidArgument,
    /// No registered bank covers the requested global id.
    #[error("hwspinlock {0} is not registered")]
    UnknownId(u32),
    /// The lock is already checked out.
    #[error("hwspinlock {0} is already requested")]
    AlreadyRequested(u32),
    /// The lock is not checked out (e.g. double free).
    #[error("hwspinlock {0} is not requested")]
    NotRequested(u32),
    /// The referenced bank has not been registered yet.
    #[error("hwspinlock provider not registered yet")]
    ProbeDefer,
    /// A bank's id range intersects one that is already registered.
    #[error("id range {base}..{end} overlaps a registered bank")]
    Overlap { base: u32, end: u32 },
    /// `base_id + num_locks` does not fit the id space.
    #[error("lock id range overflows")]
    IdOverflow,
    /// A configuration property lookup failed.
    #[error(transparent)]
    Property(#[from] PropertyError),
}

impl HwSpinlockError {
    /// Returns the negative errno value used at the kernel boundary.
    ///
    /// Valid lock ids are non-negative, so the result can never be confused
    /// with a successfully resolved id.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::Busy => -EBUSY,
            Self::NoDevice => -ENODEV,
            Self::InvalidArgument | Self::IdOverflow | Self::NotRequested(_) => -EINVAL,
            Self::UnknownId(_) => -ENOENT,
            Self::AlreadyRequested(_) | Self::Overlap { .. } => -EEXIST,
            Self::ProbeDefer => -EPROBE_DEFER,
            Self::Property(e) => e.errno(),
        }
    }
}

impl PropertyError {
    /// Returns the negative errno the property layer reports for this error.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::NotFound => -EINVAL,
            Self::NoData => -ENODATA,
            Self::Overflow => -EOVERFLOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_are_negative() {
        let all = [
            HwSpinlockError::Busy,
            HwSpinlockError::NoDevice,
            HwSpinlockError::InvalidArgument,
            HwSpinlockError::UnknownId(3),
            HwSpinlockError::AlreadyRequested(3),
            HwSpinlockError::NotRequested(3),
            HwSpinlockError::ProbeDefer,
            HwSpinlockError::Overlap { base: 0, end: 32 },
            HwSpinlockError::IdOverflow,
            HwSpinlockError::Property(PropertyError::NoData),
        ];
        for e in all {
            assert!(e.errno() < 0, "{e:?}");
        }
    }

    #[test]
    fn property_errors_pass_through() {
        let e: HwSpinlockError = PropertyError::Overflow.into();
        assert_eq!(e.errno(), PropertyError::Overflow.errno());
        assert_eq!(HwSpinlockError::NoDevice.errno(), -19);
    }
}
