extern crate hazard_domain;
extern crate rand;
extern crate rayon;

use hazard_domain::memory::{Domain, Reclaim};
use rand::{thread_rng, Rng};
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const NUM_HANDLES: usize = 20000;

/// Handles are indices into `live`; freeing one flips its flag so that any later
/// read through a protection would be caught.
fn audited_domain() -> (Arc<Domain<impl Fn(usize) + Send + Sync>>, Arc<Vec<AtomicBool>>) {
    let live: Arc<Vec<AtomicBool>> = Arc::new((0..NUM_HANDLES + 1).map(|_| AtomicBool::new(true)).collect());
    let live_copy = live.clone();
    let domain = Domain::new(move |handle: usize| {
        assert!(live_copy[handle].swap(false, Ordering::SeqCst), "handle {} deallocated twice", handle);
    });
    (Arc::new(domain), live)
}

#[test]
fn test_no_protected_handle_is_freed() {
    let (domain, live) = audited_domain();
    let shared = AtomicUsize::new(1);
    let next_handle = AtomicUsize::new(2);
    let pool = ThreadPoolBuilder::new().num_threads(8).build().unwrap();

    pool.scope(|scope| {
        for _ in 0..6 {
            scope.spawn(|_| {
                let mut rng = thread_rng();
                for _ in 0..20000 {
                    let handle = domain.load(&shared).unwrap();
                    assert!(live[handle].load(Ordering::SeqCst), "handle {} freed while protected", handle);
                    for _ in 0..rng.gen_range(0, 4) {
                        thread::yield_now();
                    }
                    assert!(live[handle].load(Ordering::SeqCst), "handle {} freed while protected", handle);
                    domain.release(handle);
                }
            });
        }
        for _ in 0..2 {
            scope.spawn(|_| {
                let mut rng = thread_rng();
                loop {
                    let handle = next_handle.fetch_add(1, Ordering::SeqCst);
                    if handle > NUM_HANDLES {
                        break;
                    }
                    let mode = if rng.gen_bool(0.5) { Reclaim::Blocking } else { Reclaim::Deferred };
                    domain.swap(&shared, handle, mode);
                    if rng.gen_range(0, 100) == 0 {
                        domain.cleanup(Reclaim::Deferred);
                    }
                }
            });
        }
    });

    domain.cleanup(Reclaim::Blocking);
    assert_eq!(domain.retired_count(), 0);

    let current = shared.load(Ordering::SeqCst);
    for handle in 1..NUM_HANDLES + 1 {
        assert_eq!(live[handle].load(Ordering::SeqCst), handle == current, "handle {}", handle);
    }
}

#[test]
fn test_blocking_swap_waits_for_release() {
    let order: Arc<Mutex<Vec<(&'static str, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let order_copy = order.clone();
    let domain = Domain::new(move |handle| order_copy.lock().unwrap().push(("freed", handle)));
    let shared = AtomicUsize::new(1);
    let swapped = AtomicBool::new(false);
    let swapping = AtomicBool::new(false);
    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();

    let first = domain.load(&shared).unwrap();
    pool.scope(|scope| {
        scope.spawn(|_| {
            swapping.store(true, Ordering::SeqCst);
            domain.swap(&shared, 2, Reclaim::Blocking);
            swapped.store(true, Ordering::SeqCst);
        });
        scope.spawn(|_| {
            while !swapping.load(Ordering::SeqCst) {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(50));
            // The swap must still be spinning on our protection
            assert!(!swapped.load(Ordering::SeqCst));
            assert_eq!(shared.load(Ordering::SeqCst), 2);
            order.lock().unwrap().push(("released", first));
            domain.release(first);
        });
    });

    assert!(swapped.load(Ordering::SeqCst));
    assert_eq!(*order.lock().unwrap(), vec![("released", 1), ("freed", 1)]);
}

#[test]
fn test_domains_are_independent() {
    let freed_a = Arc::new(AtomicUsize::new(0));
    let freed_b = Arc::new(AtomicUsize::new(0));
    let (freed_a_copy, freed_b_copy) = (freed_a.clone(), freed_b.clone());
    let domain_a = Domain::new(move |_| { freed_a_copy.fetch_add(1, Ordering::SeqCst); });
    let domain_b = Domain::new(move |_| { freed_b_copy.fetch_add(1, Ordering::SeqCst); });
    let shared_a = AtomicUsize::new(7);
    let shared_b = AtomicUsize::new(7);

    // A protection in one domain means nothing to the other
    let handle = domain_a.load(&shared_a).unwrap();
    domain_b.swap(&shared_b, 8, Reclaim::Deferred);
    assert_eq!(freed_b.load(Ordering::SeqCst), 1);
    assert_eq!(domain_b.retired_count(), 0);

    domain_a.swap(&shared_a, 8, Reclaim::Deferred);
    assert_eq!(freed_a.load(Ordering::SeqCst), 0);
    assert_eq!(domain_a.retired_count(), 1);

    domain_a.release(handle);
    assert_eq!(domain_a.cleanup(Reclaim::Deferred), 1);
    assert_eq!(freed_a.load(Ordering::SeqCst), 1);
}
