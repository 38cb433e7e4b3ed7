//! # Latch Contention Tests
//!
//! Multi-threaded verification of the SharedResource claim protocol:
//! reader/writer exclusion, non-strict FIFO fairness under reader
//! churn, upgrade discipline, and timeout hygiene.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use larchdb::SharedResource;

#[test]
fn writers_are_mutually_exclusive() {
    let latch = Arc::new(SharedResource::new());
    let counter = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let latch = Arc::clone(&latch);
        let counter = Arc::clone(&counter);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                assert!(latch.claim_within(true, Duration::from_secs(10)));
                // Non-atomic read-modify-write; torn interleavings
                // would lose increments.
                let seen = counter.load(Ordering::Relaxed);
                thread::yield_now();
                counter.store(seen + 1, Ordering::Relaxed);
                latch.release().unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::Relaxed), 8 * 200);
}

#[test]
fn readers_share_while_writer_excludes() {
    let latch = Arc::new(SharedResource::new());
    assert!(latch.claim_within(false, Duration::ZERO));
    thread::scope(|scope| {
        // A second reader joins freely.
        let latch2 = Arc::clone(&latch);
        assert!(scope
            .spawn(move || latch2.claim_within(false, Duration::ZERO))
            .join()
            .unwrap());
        // A writer cannot enter while readers hold claims.
        let latch3 = Arc::clone(&latch);
        assert!(!scope
            .spawn(move || latch3.claim_within(true, Duration::from_millis(50)))
            .join()
            .unwrap());
    });
    latch.release().unwrap();
    latch.release().unwrap();
}

#[test]
fn writer_is_not_starved_by_reader_churn() {
    let latch = Arc::new(SharedResource::new());
    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..6 {
        let latch = Arc::clone(&latch);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            while !stop.load(Ordering::Relaxed) {
                if latch.claim_within(false, Duration::from_secs(5)) {
                    thread::sleep(Duration::from_micros(rng.gen_range(10..200)));
                    latch.release().unwrap();
                }
            }
        }));
    }
    // Give the churn a head start, then demand a write claim.
    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    let acquired = latch.claim_within(true, Duration::from_secs(5));
    let waited = start.elapsed();
    stop.store(true, Ordering::Relaxed);
    if acquired {
        latch.release().unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(acquired, "writer starved behind reader churn");
    assert!(
        waited < Duration::from_secs(5),
        "writer waited the full timeout"
    );
}

#[test]
fn queued_writer_gets_the_latch_when_readers_drain() {
    let latch = Arc::new(SharedResource::new());
    assert!(latch.claim_within(false, Duration::ZERO));
    let latch2 = Arc::clone(&latch);
    let writer = thread::spawn(move || {
        let ok = latch2.claim_within(true, Duration::from_secs(5));
        if ok {
            latch2.release().unwrap();
        }
        ok
    });
    thread::sleep(Duration::from_millis(50));
    latch.release().unwrap();
    assert!(writer.join().unwrap());
}

#[test]
fn timeout_leaves_no_claim_behind() {
    let latch = Arc::new(SharedResource::new());
    assert!(latch.claim_within(true, Duration::ZERO));
    thread::scope(|scope| {
        let latch2 = Arc::clone(&latch);
        let handle = scope.spawn(move || {
            let start = Instant::now();
            let ok = latch2.claim_within(false, Duration::from_millis(100));
            (ok, start.elapsed())
        });
        let (ok, waited) = handle.join().unwrap();
        assert!(!ok);
        assert!(waited >= Duration::from_millis(100));
    });
    // The failed claim left nothing: a single release fully frees it.
    latch.release().unwrap();
    assert!(latch.is_available(true));
    assert!(latch.claim_within(true, Duration::ZERO));
    latch.release().unwrap();
}

#[test]
fn upgrade_fails_while_a_peer_reads() {
    let latch = Arc::new(SharedResource::new());
    assert!(latch.claim_within(false, Duration::ZERO));
    thread::scope(|scope| {
        let latch2 = Arc::clone(&latch);
        scope
            .spawn(move || {
                assert!(latch2.claim_within(false, Duration::ZERO));
                // Two claims held: nobody may upgrade.
                assert!(!latch2.upgrade_claim());
                latch2.release().unwrap();
            })
            .join()
            .unwrap();
    });
    // Down to one claim: the survivor upgrades and downgrades.
    assert!(latch.upgrade_claim());
    assert!(latch.is_mine());
    assert!(latch.downgrade_claim());
    assert!(!latch.is_mine());
    latch.release().unwrap();
}

#[test]
fn release_publishes_writes_to_the_next_claimer() {
    let latch = Arc::new(SharedResource::new());
    let cell = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();
    for round in 1..=4u64 {
        let latch = Arc::clone(&latch);
        let cell = Arc::clone(&cell);
        handles.push(thread::spawn(move || {
            assert!(latch.claim_within(true, Duration::from_secs(10)));
            let before = cell.load(Ordering::Relaxed);
            cell.store(before + round, Ordering::Relaxed);
            latch.bump_generation();
            latch.release().unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cell.load(Ordering::Relaxed), 1 + 2 + 3 + 4);
    assert_eq!(latch.generation(), 4);
}
