//! The per-lock validation protocol.
//!
//! Each iteration runs five steps against a lock that starts out free:
//!
//! 1. `trylock` must succeed,
//! 2. a second `trylock` must fail (no recursion),
//! 3. `unlock`,
//! 4. `trylock` must succeed again (the unlock took effect),
//! 5. `unlock`, leaving the lock free.
//!
//! The first violated expectation ends the run for that lock.

use crate::LockFailure;
use alloc::vec::Vec;
use kernel_hwspinlock::LockRegistry;

/// Steps of one passing iteration.
pub const STEPS_PER_ITERATION: usize = 5;

/// One operation issued by the protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    Trylock,
    RecursiveTrylock,
    Unlock,
    TrylockAfterUnlock,
    FinalUnlock,
    /// Extra `unlock` balancing an unexpected recursive acquisition.
    RebalanceUnlock,
}

/// A traced step: which iteration, which step, whether it went as expected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StepEvent {
    pub iteration: u32,
    pub step: Step,
    pub ok: bool,
}

/// Outcome of running the protocol on one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRun {
    pub id: u32,
    pub trace: Vec<StepEvent>,
    pub result: Result<(), LockFailure>,
}

/// Upper bound on the iterations the trace reserves room for up front.
const TRACE_HINT_ITERATIONS: u32 = 16;

struct Tracer {
    id: u32,
    /// `None` when only the log carries the steps.
    trace: Option<Vec<StepEvent>>,
}

impl Tracer {
    fn record(&mut self, iteration: u32, step: Step, ok: bool) {
        log::debug!(
            "hwspinlock {}: [{iteration}] {step:?} {}",
            self.id,
            if ok { "ok" } else { "FAILED" }
        );
        if let Some(trace) = &mut self.trace {
            trace.push(StepEvent {
                iteration,
                step,
                ok,
            });
        }
    }
}

/// Runs `count` protocol iterations on a checked-out lock and records every
/// step issued.
///
/// Every successful `trylock` issued here is matched by an `unlock`, whatever
/// the outcome.
#[must_use]
pub fn run_protocol<R: LockRegistry>(registry: &R, lock: &R::Handle, count: u32) -> ProtocolRun {
    let hint = count.min(TRACE_HINT_ITERATIONS) as usize * STEPS_PER_ITERATION;
    let mut tracer = Tracer {
        id: registry.lock_id(lock),
        trace: Some(Vec::with_capacity(hint)),
    };
    let result = run(registry, lock, count, &mut tracer);

    ProtocolRun {
        id: tracer.id,
        trace: tracer.trace.unwrap_or_default(),
        result,
    }
}

/// As [`run_protocol`], without keeping the trace; steps are only logged.
///
/// # Errors
/// The first [`LockFailure`] hit, which ends the run for this lock.
pub fn check_lock<R: LockRegistry>(
    registry: &R,
    lock: &R::Handle,
    count: u32,
) -> Result<(), LockFailure> {
    let mut tracer = Tracer {
        id: registry.lock_id(lock),
        trace: None,
    };
    run(registry, lock, count, &mut tracer)
}

fn run<R: LockRegistry>(
    registry: &R,
    lock: &R::Handle,
    count: u32,
    tracer: &mut Tracer,
) -> Result<(), LockFailure> {
    let id = tracer.id;
    log::info!("testing hwspinlock {id}");

    let result = iterate(registry, lock, count, tracer);
    if let Err(failure) = &result {
        log::error!("hwspinlock {id}: {failure}");
    }
    result
}

fn iterate<R: LockRegistry>(
    registry: &R,
    lock: &R::Handle,
    count: u32,
    tracer: &mut Tracer,
) -> Result<(), LockFailure> {
    for iteration in 0..count {
        let first = registry.trylock(lock);
        tracer.record(iteration, Step::Trylock, first.is_ok());
        if let Err(source) = first {
            return Err(LockFailure::AcquisitionFailure { iteration, source });
        }

        // Verify the lock actually works: re-acquiring it must fail.
        let recursive = registry.trylock(lock);
        tracer.record(iteration, Step::RecursiveTrylock, recursive.is_err());
        if recursive.is_ok() {
            // Keep the lock balanced even in failure cases.
            for _ in 0..2 {
                registry.unlock(lock);
                tracer.record(iteration, Step::RebalanceUnlock, true);
            }
            return Err(LockFailure::UnexpectedRecursiveAcquisition { iteration });
        }

        registry.unlock(lock);
        tracer.record(iteration, Step::Unlock, true);

        // Verify unlock by re-acquiring the lock after releasing it.
        let again = registry.trylock(lock);
        tracer.record(iteration, Step::TrylockAfterUnlock, again.is_ok());
        if let Err(source) = again {
            return Err(LockFailure::ReleaseFailure { iteration, source });
        }

        registry.unlock(lock);
        tracer.record(iteration, Step::FinalUnlock, true);
    }
    Ok(())
}
