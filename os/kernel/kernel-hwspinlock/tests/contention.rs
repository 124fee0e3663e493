use kernel_hwspinlock::{
    HwSpinlockDevice, HwSpinlockError, HwSpinlockRegistry, LockRegistry, RegisterFile,
    RegisterFileOps,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn registry(num_blocks: u8) -> (Arc<HwSpinlockRegistry>, Arc<RegisterFileOps>) {
    let ops = Arc::new(RegisterFileOps::new(Arc::new(RegisterFile::new(num_blocks))));
    let bank = HwSpinlockDevice::from_regfile(Arc::clone(&ops), 0).unwrap();
    let mut r = HwSpinlockRegistry::new();
    r.register(bank, None).unwrap();
    (Arc::new(r), ops)
}

#[test]
fn request_specific_hands_out_an_id_once() {
    let threads = 8;
    let (r, _) = registry(1);
    let start = Arc::new(Barrier::new(threads));
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let r = Arc::clone(&r);
            let start = Arc::clone(&start);
            let winners = Arc::clone(&winners);
            thread::spawn(move || {
                start.wait();
                match r.request_specific(17) {
                    Ok(lock) => {
                        winners.fetch_add(1, Ordering::SeqCst);
                        Some(lock)
                    }
                    Err(e) => {
                        assert_eq!(e, HwSpinlockError::AlreadyRequested(17));
                        None
                    }
                }
            })
        })
        .collect();

    let mut locks: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(locks.len(), 1);

    r.free(locks.pop().unwrap()).unwrap();
    assert!(!r.is_requested(17));
}

#[test]
fn hardware_arbitration_is_exclusive_across_threads() {
    // Each thread plays a separate processor: it spins on the same lock id
    // through its own view of the bank.
    let threads = 4;
    let iters = 2_000;

    let (r, ops) = registry(1);
    let lock = Arc::new(r.request_specific(3).unwrap());
    let in_cs = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let r = Arc::clone(&r);
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let total = Arc::clone(&total);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    while r.lock_spinning(&lock, 64).is_err() {
                        thread::yield_now();
                    }
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    total.fetch_add(1, Ordering::Relaxed);
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                    r.unlock(&lock);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(total.load(Ordering::Relaxed), threads * iters);
    assert!(!ops.registers().is_taken(3));

    let lock = Arc::into_inner(lock).unwrap();
    r.free(lock).unwrap();
}

#[test]
fn lock_spinning_relaxes_between_attempts() {
    let (r, ops) = registry(1);
    let lock = r.request_specific(0).unwrap();
    r.trylock(&lock).unwrap();

    assert_eq!(r.lock_spinning(&lock, 5), Err(HwSpinlockError::Busy));
    assert_eq!(ops.relax_count(), 4);

    r.unlock(&lock);
    r.free(lock).unwrap();
}
