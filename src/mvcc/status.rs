//! # Transaction Status
//!
//! Per-transaction MVCC bookkeeping: the start timestamp, the commit
//! state, the completion horizon and the count of undrained
//! multi-version values.
//!
//! ## Commit State Encoding
//!
//! The `tc` cell encodes the whole commit lifecycle in one i64:
//!
//! ```text
//! 0          running, no commit proposed
//! -t         proposing commit at timestamp t (pre-finalize window)
//! t > 0      committed at timestamp t (final)
//! ABORTED    aborted (i64::MIN)
//! ```
//!
//! The sentinels [`UNCOMMITTED`] and [`ABORTED`] are wire-observable:
//! any durable encoding of a version handle outcome must use these
//! exact values.
//!
//! ## Lifecycle
//!
//! ```text
//! register ──> ACTIVE ──commit(tc)──> proposing ──notify_completed──> COMMITTED
//!                │                                                       │
//!                └──abort()──────────────────────notify_completed──> ABORTED
//!                                                                        │
//!                                              mvv drained + cleanup ──> FREE
//! ```
//!
//! `ta` records when the transaction completed; for aborted entries it
//! is the horizon after which no active transaction could still observe
//! the aborted writes, which gates reclamation.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use eyre::Result;

use crate::error::LarchError;

/// Commit-status sentinel: the writer is still running.
pub const UNCOMMITTED: i64 = i64::MAX;
/// Commit-status sentinel: the writer aborted.
pub const ABORTED: i64 = i64::MIN;
/// Commit-status sentinel: the writer committed before every live
/// snapshot; universally visible.
pub const PRIMORDIAL: i64 = 0;

/// Derived lifecycle state of a [`TransactionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
    Free,
}

/// MVCC bookkeeping for one transaction. Shared between the index and
/// the owning session via `Arc`; all fields are atomics.
pub struct TransactionStatus {
    ts: AtomicU64,
    tc: AtomicI64,
    ta: AtomicU64,
    mvv_count: AtomicU32,
}

impl TransactionStatus {
    pub(crate) fn new(ts: u64) -> TransactionStatus {
        TransactionStatus {
            ts: AtomicU64::new(ts),
            tc: AtomicI64::new(0),
            ta: AtomicU64::new(0),
            mvv_count: AtomicU32::new(0),
        }
    }

    /// Reinitializes a recycled entry for a new transaction.
    pub(crate) fn reset(&self, ts: u64) {
        self.ts.store(ts, Ordering::SeqCst);
        self.tc.store(0, Ordering::SeqCst);
        self.ta.store(0, Ordering::SeqCst);
        self.mvv_count.store(0, Ordering::SeqCst);
    }

    pub(crate) fn mark_free(&self) {
        self.ts.store(0, Ordering::SeqCst);
    }

    /// Start timestamp.
    pub fn ts(&self) -> u64 {
        self.ts.load(Ordering::SeqCst)
    }

    /// Raw commit state; see the module docs for the encoding.
    pub fn tc(&self) -> i64 {
        self.tc.load(Ordering::SeqCst)
    }

    /// Completion timestamp; 0 while the transaction is live.
    pub fn ta(&self) -> u64 {
        self.ta.load(Ordering::SeqCst)
    }

    pub fn mvv_count(&self) -> u32 {
        self.mvv_count.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.ta() != 0
    }

    pub fn is_aborted(&self) -> bool {
        self.tc() == ABORTED
    }

    pub fn is_committed(&self) -> bool {
        self.is_completed() && self.tc() > 0
    }

    pub fn state(&self) -> TransactionState {
        if self.ts() == 0 {
            TransactionState::Free
        } else if !self.is_completed() {
            TransactionState::Active
        } else if self.is_aborted() {
            TransactionState::Aborted
        } else {
            TransactionState::Committed
        }
    }

    /// Proposes a commit timestamp. Must precede `notify_completed`.
    pub fn commit(&self, tc: u64) -> Result<()> {
        if tc == 0 || tc as i64 <= 0 {
            return Err(
                LarchError::IllegalArgument("commit timestamp must be positive".into()).into(),
            );
        }
        if self.is_completed() {
            return Err(
                LarchError::IllegalState("commit after transaction completed".into()).into(),
            );
        }
        let proposed = -(tc as i64);
        if self
            .tc
            .compare_exchange(0, proposed, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LarchError::IllegalState(
                "commit on a transaction that already proposed or aborted".into(),
            )
            .into());
        }
        Ok(())
    }

    /// Marks the transaction aborted. Must precede `notify_completed`.
    pub fn abort(&self) -> Result<()> {
        if self.is_completed() {
            return Err(
                LarchError::IllegalState("abort after transaction completed".into()).into(),
            );
        }
        self.tc.store(ABORTED, Ordering::SeqCst);
        Ok(())
    }

    /// Records one more undrained multi-version value.
    pub fn increment_mvv_count(&self) -> u32 {
        self.mvv_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records that one multi-version value was reaped.
    pub fn decrement_mvv_count(&self) -> Result<u32> {
        loop {
            let current = self.mvv_count.load(Ordering::SeqCst);
            if current == 0 {
                return Err(
                    LarchError::IllegalState("mvv count decremented below zero".into()).into(),
                );
            }
            if self
                .mvv_count
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(current - 1);
            }
        }
    }

    /// Finalizes the proposed commit timestamp and stamps the
    /// completion horizon. Index-internal; called under the bucket
    /// lock by `notify_completed`.
    pub(crate) fn finalize(&self, ta: u64) {
        let raw = self.tc.load(Ordering::SeqCst);
        if raw < 0 && raw != ABORTED {
            self.tc.store(-raw, Ordering::SeqCst);
        }
        self.ta.store(ta, Ordering::SeqCst);
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<ts={} tc={} ta={} mvv={}>",
            self.ts(),
            self.tc(),
            self.ta(),
            self.mvv_count()
        )
    }
}

impl fmt::Debug for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionStatus{self}")
    }
}
