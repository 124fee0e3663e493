use crate::protocol::check_lock;
use crate::{FailureRecord, LockFailure, SelftestConfig, SelftestError, TestMode, variant};
use alloc::vec::Vec;
use core::fmt;
use kernel_hwspinlock::LockRegistry;
use kernel_hwspinlock::of::{
    self, HWLOCK_CELLS_PROPERTY, HWLOCKS_PROPERTY, PhandleResolver, PropertyStore,
};

/// Aggregate of one addressing mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeReport {
    pub mode: TestMode,
    /// Ids that were checked out and ran the protocol, in test order.
    pub tested: Vec<u32>,
    pub failures: Vec<FailureRecord>,
}

impl ModeReport {
    const fn new(mode: TestMode) -> Self {
        Self {
            mode,
            tested: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, id: Option<u32>, failure: LockFailure) {
        self.failures.push(FailureRecord {
            mode: self.mode,
            id,
            failure,
        });
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ModeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} locks tested, {} failures",
            self.mode,
            self.tested.len(),
            self.failures.len()
        )
    }
}

/// Result of a full self-test run: both modes, back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelftestReport {
    pub references: ModeReport,
    pub sweep: ModeReport,
}

impl SelftestReport {
    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.references.failures.iter().chain(&self.sweep.failures)
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.references.failure_count() + self.sweep.failure_count()
    }

    /// Sorted, de-duplicated ids of the locks that failed.
    #[must_use]
    pub fn failing_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.failures().filter_map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.failure_count() == 0
    }
}

impl fmt::Display for SelftestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.references)?;
        write!(f, "{}", self.sweep)
    }
}

/// Drives the validation protocol over the locks of a [`LockRegistry`].
pub struct Selftest<'a, R> {
    registry: &'a R,
    config: SelftestConfig,
}

impl<'a, R: LockRegistry> Selftest<'a, R> {
    #[must_use]
    pub const fn new(registry: &'a R, config: SelftestConfig) -> Self {
        Self { registry, config }
    }

    #[must_use]
    pub const fn config(&self) -> &SelftestConfig {
        &self.config
    }

    /// Runs the reference mode, then the sweep mode over every lock of the
    /// node's variant, and returns both aggregates.
    ///
    /// # Errors
    /// [`SelftestError`] if the node does not name a known test variant; no
    /// lock is touched in that case.
    pub fn run(
        &self,
        resolver: &dyn PhandleResolver,
        node: &dyn PropertyStore,
    ) -> Result<SelftestReport, SelftestError> {
        let variant = variant::match_node(node)?;
        log::info!(
            "hwspinlock self-test for {} ({} locks, {} iterations)",
            variant.compatible,
            variant.max_locks,
            self.config.count
        );

        log::info!("***** Begin - Test All hwlocks References *****");
        let references = self.test_references(resolver, node);
        log_summary(&references);
        log::info!("***** End - Test All hwlocks References *****");

        log::info!("***** Begin - Test All Locks *****");
        let sweep = self.test_all_locks(variant.max_locks);
        log_summary(&sweep);
        log::info!("***** End - Test All Locks *****");

        Ok(SelftestReport { references, sweep })
    }

    /// Tests each lock named by the node's `hwlocks` references.
    ///
    /// A missing `hwlocks` property means there is nothing to test; a list that
    /// cannot be decoded is recorded as a resolution failure of entry 0.
    #[must_use]
    pub fn test_references(
        &self,
        resolver: &dyn PhandleResolver,
        node: &dyn PropertyStore,
    ) -> ModeReport {
        let mut report = ModeReport::new(TestMode::References);

        let count = if node.property(HWLOCKS_PROPERTY).is_none() {
            log::info!("test node has no hwlocks references");
            0
        } else {
            of::count_phandle_with_args(node, HWLOCKS_PROPERTY, HWLOCK_CELLS_PROPERTY, resolver)
                .unwrap_or_else(|e| {
                    log::error!("unable to count hwlocks references: {e}");
                    report.record(
                        None,
                        LockFailure::IdResolutionError {
                            index: 0,
                            source: e.into(),
                        },
                    );
                    0
                })
        };
        log::info!("number of hwlocks references = {count}");

        for index in 0..count {
            match self.registry.of_get_id(resolver, node, index) {
                Ok(id) => self.test_one(id, &mut report),
                Err(source) => {
                    log::error!("unable to get hwlock id of reference {index}: {source}");
                    report.record(None, LockFailure::IdResolutionError { index, source });
                }
            }
        }
        report
    }

    /// Tests every global id in `0..max_locks`.
    #[must_use]
    pub fn test_all_locks(&self, max_locks: u32) -> ModeReport {
        let mut report = ModeReport::new(TestMode::Sweep);
        for id in 0..max_locks {
            self.test_one(id, &mut report);
        }
        report
    }

    /// Request, protocol, free; every failure is recorded, none aborts the mode.
    fn test_one(&self, id: u32, report: &mut ModeReport) {
        let lock = match self.registry.request_specific(id) {
            Ok(lock) => lock,
            Err(source) => {
                log::error!("request of hwspinlock {id} failed: {source}");
                report.record(Some(id), LockFailure::RequestFailure { source });
                return;
            }
        };

        report.tested.push(id);
        if let Err(failure) = check_lock(self.registry, &lock, self.config.count) {
            log::error!("hwspinlock tests failed on lock {id}");
            report.record(Some(id), failure);
        }

        if let Err(source) = self.registry.free(lock) {
            log::error!("free of hwspinlock {id} failed: {source}");
            report.record(Some(id), LockFailure::FreeFailure { source });
        }
    }
}

fn log_summary(report: &ModeReport) {
    if report.is_pass() {
        log::info!("{report}");
    } else {
        log::error!("{report}");
        for failure in &report.failures {
            log::error!("  {failure}");
        }
    }
}
