//! # Configuration Constants
//!
//! This module centralizes the tuning constants of the core, grouping
//! interdependent values together and documenting their relationships.
//! Constants that depend on each other are co-located so a change to one
//! forces a look at the others.
//!
//! ## Dependency Graph
//!
//! ```text
//! VERSION_STEP_BITS (16)
//!       │
//!       ├─> MAX_STEP (derived: 2^16 - 1)
//!       │     A transaction may write the same key at most MAX_STEP
//!       │     times; the step field of a version handle saturates there.
//!       │
//!       └─> MAX_TIMESTAMP (derived: 2^(64-16) - 1)
//!             Once the allocator passes this value, register_transaction
//!             fails with ResourceExhausted rather than wrapping.
//!
//! LONG_RUNNING_THRESHOLD (10)
//!       │
//!       └─> Per-bucket bound on the active portion of the current list.
//!           Older active transactions spill to the long-running list so
//!           hot-path bucket scans stay short.
//!
//! MAX_FREE_LIST_SIZE (20)
//!       │
//!       └─> Recycled TransactionStatus entries kept per bucket. Overflow
//!           is dropped and counted, never an error.
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by compile-time assertions at the bottom of this file:
//!
//! 1. `VERSION_STEP_BITS < 64` and the timestamp field keeps at least
//!    48 bits (centuries of headroom at 100K transactions/sec).
//! 2. `LONG_RUNNING_THRESHOLD >= 1` (the current list must be usable).
//! 3. `MAX_CLAIM_COUNT` fits the 15-bit claim field of the latch word.

use std::time::Duration;

// ============================================================================
// LATCH CONFIGURATION
// ============================================================================

/// Default maximum time to wait for a claim on a [`SharedResource`].
/// Callers that exceed it observe an `InUse` outcome.
///
/// [`SharedResource`]: crate::latch::SharedResource
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum number of concurrent claims on one latch. This is the full
/// range of the 15-bit claim field in the lock word.
pub const MAX_CLAIM_COUNT: u32 = 0x7FFF;

// ============================================================================
// TRANSACTION INDEX CONFIGURATION
// These values are tightly coupled to the reduction (cleanup) algorithm.
// ============================================================================

/// Default number of hash buckets in the transaction index. Start
/// timestamps map to buckets by modulo.
pub const TRANSACTION_HASH_BUCKETS: usize = 8;

/// Per-bucket bound on active entries kept on the current list; older
/// active transactions move to the long-running list.
pub const LONG_RUNNING_THRESHOLD: usize = 10;

/// Per-bucket bound on recycled TransactionStatus entries. Entries
/// reclaimed past this bound are dropped and counted.
pub const MAX_FREE_LIST_SIZE: usize = 20;

/// Hard cap on concurrently registered transactions across all buckets.
/// `register_transaction` fails with ResourceExhausted past this point.
pub const MAX_ACTIVE_TRANSACTIONS: usize = 0x8000;

// ============================================================================
// VERSION HANDLE LAYOUT
// A version handle packs (timestamp, step) into one u64.
// ============================================================================

/// Low bits of a version handle reserved for the intra-transaction step.
pub const VERSION_STEP_BITS: u32 = 16;

/// Maximum step value representable in a version handle.
pub const MAX_STEP: u64 = (1 << VERSION_STEP_BITS) - 1;

/// Maximum allocatable start/commit timestamp. The allocator refuses to
/// register transactions past this point (overflow policy: fail, never
/// wrap).
pub const MAX_TIMESTAMP: u64 = (1u64 << (64 - VERSION_STEP_BITS)) - 1;

const _: () = assert!(VERSION_STEP_BITS < 64);
const _: () = assert!(
    64 - VERSION_STEP_BITS >= 48,
    "timestamp field must keep at least 48 bits"
);
const _: () = assert!(LONG_RUNNING_THRESHOLD >= 1);
const _: () = assert!(MAX_FREE_LIST_SIZE >= 1);
const _: () = assert!(MAX_CLAIM_COUNT == 0x7FFF, "claim field is 15 bits");
