//! # Multi-Version Concurrency Control (MVCC)
//!
//! Snapshot-isolation machinery for the store: timestamp allocation,
//! per-transaction status, and the transaction index that answers
//! visibility and conflict questions during fetch, traverse and store.
//!
//! ## Component Map
//!
//! ```text
//! ┌──────────────────────┐   register / notify_completed
//! │  TransactionIndex    │◄──────────────── sessions
//! │  (sharded buckets,   │
//! │   active-set cache)  │◄──────────────── readers: commit_status,
//! └─────────┬────────────┘                  has_concurrent_transaction
//!           │ allocates via
//! ┌─────────▼────────────┐
//! │  TimestampAllocator  │  one u64 counter orders every event
//! └──────────────────────┘
//! ```
//!
//! ## Reader Protocol
//!
//! A reader captures its start timestamp and step, then judges each
//! record version by `commit_status(version_handle, start_ts, step)`:
//! its own writes are visible up to the current step, committed writes
//! are visible when their commit timestamp is at or below the snapshot,
//! and `UNCOMMITTED`/`ABORTED` versions are skipped along the version
//! chain.
//!
//! ## Writer Protocol
//!
//! A writer that finds a version owned by another transaction calls
//! `ww_dependency`, which blocks until the owner finalizes (or the
//! timeout lapses) and reports the outcome; the caller then decides
//! between proceeding, retrying, and aborting. Waits are strictly
//! one-directional, so transaction pairs cannot deadlock.
//!
//! ## Reduction
//!
//! Completed state is continuously reduced to canonical form: committed
//! entries are recycled once no live snapshot could still need their
//! commit timestamp, aborted entries once their versions are drained
//! and the completion horizon passes the live floor. `cleanup` verifies
//! and enforces the canonical census.

pub mod index;
pub mod status;
pub mod timestamp;

pub use index::{ActiveTransactionCache, TransactionIndex};
pub use status::{TransactionState, TransactionStatus, ABORTED, PRIMORDIAL, UNCOMMITTED};
pub use timestamp::{ts_to_vh, vh_to_step, vh_to_ts, TimestampAllocator};
