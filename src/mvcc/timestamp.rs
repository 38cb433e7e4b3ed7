//! # Timestamp Allocation and Version Handles
//!
//! A single monotonically increasing counter supplies both transaction
//! start timestamps and commit timestamps, so any two events in the
//! system are totally ordered by one u64.
//!
//! ## Version Handles
//!
//! MVV readers identify a record version by a *version handle* packing
//! the writer's start timestamp and an intra-transaction step:
//!
//! ```text
//! 63                    16 15            0
//! +----------------------+---------------+
//! |      timestamp       |     step      |
//! +----------------------+---------------+
//! ```
//!
//! `ts_to_vh(t) + k` is strictly greater than `ts_to_vh(t)` for any
//! step `k > 0`, and handles of the same transaction order by step, so
//! a later write of the same key inside one transaction always carries
//! a larger handle.
//!
//! ## Overflow Policy
//!
//! The 48-bit timestamp field gives centuries of headroom at 100K
//! transactions per second. If it ever runs out the index fails
//! registration with `ResourceExhausted` rather than wrapping; see
//! `MAX_TIMESTAMP`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{MAX_STEP, VERSION_STEP_BITS};

/// Lock-free allocator for the global timestamp counter.
#[derive(Debug, Default)]
pub struct TimestampAllocator {
    counter: AtomicU64,
}

impl TimestampAllocator {
    pub fn new() -> TimestampAllocator {
        TimestampAllocator {
            counter: AtomicU64::new(0),
        }
    }

    /// Reserves and returns the next timestamp.
    pub fn update_timestamp(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently allocated timestamp.
    pub fn current_timestamp(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Packs a start timestamp into a step-0 version handle.
pub fn ts_to_vh(ts: u64) -> u64 {
    ts << VERSION_STEP_BITS
}

/// The start timestamp a version handle was issued under.
pub fn vh_to_ts(vh: u64) -> u64 {
    vh >> VERSION_STEP_BITS
}

/// The intra-transaction step of a version handle.
pub fn vh_to_step(vh: u64) -> u16 {
    (vh & MAX_STEP) as u16
}
