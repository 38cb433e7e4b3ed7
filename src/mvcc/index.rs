//! # Transaction Index
//!
//! The MVCC status registry: registration, commit/abort finalization,
//! version visibility, write-write dependency blocking, and reduction
//! of completed state to canonical form.
//!
//! ## Structure
//!
//! ```text
//! TransactionIndex
//! ├── buckets[ts % N]: Mutex<Bucket>
//! │     ├── current       active entries, newest LONG_RUNNING_THRESHOLD
//! │     ├── long_running  older active entries + committed entries
//! │     │                 retained for concurrent readers
//! │     ├── aborted       aborted entries with undrained MVVs
//! │     └── free          recycled entries, bounded by MAX_FREE_LIST_SIZE
//! ├── active: Mutex<BTreeSet<ts>>     live floor for reclamation
//! └── cache: RwLock<Arc<ActiveTransactionCache>>   read-mostly snapshot
//! ```
//!
//! Each bucket lock is held only for short list manipulations. The
//! active-set snapshot is immutable and installed by a single pointer
//! swap; readers that hold the previous `Arc` keep reading it safely.
//!
//! ## Visibility Protocol
//!
//! `commit_status(vh, floor_ts, step)` answers "what is the commit
//! timestamp of the writer of this version, from the perspective of a
//! reader that started at `floor_ts`":
//!
//! - the reader's own transaction sees its own writes up to its current
//!   step, and `UNCOMMITTED` beyond it
//! - an unknown timestamp means the writer committed before every live
//!   snapshot and was reclaimed: `PRIMORDIAL`, universally visible
//! - a registered writer reports `UNCOMMITTED` (running or proposing),
//!   `ABORTED`, or its final commit timestamp, which the caller
//!   compares against its own snapshot
//!
//! ## Retention Rules
//!
//! A committed entry stays findable until no active transaction started
//! before its commit timestamp; only then may it be recycled, because
//! until then some reader could need its tc to decide concurrency. An
//! aborted entry stays findable until its MVV count is drained AND the
//! completion horizon `ta` has fallen below the live floor, because
//! until then an active reader may still encounter one of its dead
//! versions. The snapshot cache may lag reality; every lag direction
//! shows more conflicts, never fewer.
//!
//! ## Blocking
//!
//! `ww_dependency` is the only blocking entry point: a writer that hits
//! a version owned by a live transaction parks on the completion
//! condvar until the owner finalizes or the timeout lapses. The wait is
//! one-directional (source waits on target, never the reverse) so
//! distinct transactions cannot deadlock; self-dependency is refused.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::{
    LONG_RUNNING_THRESHOLD, MAX_ACTIVE_TRANSACTIONS, MAX_FREE_LIST_SIZE, MAX_TIMESTAMP,
    TRANSACTION_HASH_BUCKETS,
};
use crate::error::LarchError;
use crate::mvcc::status::{TransactionStatus, ABORTED, PRIMORDIAL, UNCOMMITTED};
use crate::mvcc::timestamp::{vh_to_step, vh_to_ts, TimestampAllocator};

/// Read-mostly snapshot of the transactions that were live at rebuild
/// time, sorted by start timestamp.
#[derive(Debug)]
pub struct ActiveTransactionCache {
    /// `(ts, tc)` pairs: tc is 0 while the writer had neither proposed
    /// nor finalized a commit at snapshot time, else the (proposed)
    /// commit timestamp.
    entries: Vec<(u64, i64)>,
    floor: u64,
    ceiling: u64,
}

impl ActiveTransactionCache {
    fn empty() -> ActiveTransactionCache {
        ActiveTransactionCache {
            entries: Vec::new(),
            floor: 0,
            ceiling: 0,
        }
    }

    /// Minimum start timestamp of any transaction live at snapshot
    /// time; one past the ceiling when none were.
    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// Highest timestamp the snapshot covers. Transactions born later
    /// are conservatively treated as concurrent.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    fn has_concurrent(&self, low: u64, high: u64) -> bool {
        if high > self.ceiling.saturating_add(1) {
            // The interval reaches past what this snapshot knows.
            return true;
        }
        let start = self.entries.partition_point(|&(ts, _)| ts <= low);
        self.entries[start..]
            .iter()
            .take_while(|&&(ts, _)| ts < high)
            .any(|&(_, tc)| tc == 0)
    }
}

#[derive(Default)]
struct Bucket {
    current: Vec<Arc<TransactionStatus>>,
    long_running: Vec<Arc<TransactionStatus>>,
    aborted: Vec<Arc<TransactionStatus>>,
    free: Vec<Arc<TransactionStatus>>,
}

impl Bucket {
    fn find(&self, ts: u64) -> Option<&Arc<TransactionStatus>> {
        self.current
            .iter()
            .chain(&self.long_running)
            .chain(&self.aborted)
            .find(|st| st.ts() == ts)
    }
}

/// Sharded MVCC status registry. See the module docs.
pub struct TransactionIndex {
    allocator: Arc<TimestampAllocator>,
    buckets: Box<[Mutex<Bucket>]>,
    active: Mutex<BTreeSet<u64>>,
    cache: RwLock<Arc<ActiveTransactionCache>>,
    completion_lock: Mutex<()>,
    completion: Condvar,
    current_count: AtomicUsize,
    aborted_count: AtomicUsize,
    free_count: AtomicUsize,
    long_running_count: AtomicUsize,
    dropped_count: AtomicUsize,
}

impl TransactionIndex {
    /// Creates an index with the default bucket count.
    pub fn new(allocator: Arc<TimestampAllocator>) -> TransactionIndex {
        TransactionIndex::with_buckets(allocator, TRANSACTION_HASH_BUCKETS)
    }

    /// Creates an index with an explicit hash bucket count.
    pub fn with_buckets(allocator: Arc<TimestampAllocator>, buckets: usize) -> TransactionIndex {
        assert!(buckets >= 1, "transaction index needs at least one bucket");
        TransactionIndex {
            allocator,
            buckets: (0..buckets).map(|_| Mutex::new(Bucket::default())).collect(),
            active: Mutex::new(BTreeSet::new()),
            cache: RwLock::new(Arc::new(ActiveTransactionCache::empty())),
            completion_lock: Mutex::new(()),
            completion: Condvar::new(),
            current_count: AtomicUsize::new(0),
            aborted_count: AtomicUsize::new(0),
            free_count: AtomicUsize::new(0),
            long_running_count: AtomicUsize::new(0),
            dropped_count: AtomicUsize::new(0),
        }
    }

    pub fn allocator(&self) -> &Arc<TimestampAllocator> {
        &self.allocator
    }

    pub fn long_running_threshold(&self) -> usize {
        LONG_RUNNING_THRESHOLD
    }

    pub fn max_free_list_size(&self) -> usize {
        MAX_FREE_LIST_SIZE
    }

    /// Active entries on the current lists.
    pub fn current_count(&self) -> usize {
        self.current_count.load(Ordering::SeqCst)
    }

    /// Aborted entries still retained for their undrained versions.
    pub fn aborted_count(&self) -> usize {
        self.aborted_count.load(Ordering::SeqCst)
    }

    /// Recycled entries available for reuse.
    pub fn free_count(&self) -> usize {
        self.free_count.load(Ordering::SeqCst)
    }

    /// Entries on the long-running lists: spilled actives plus
    /// committed entries retained for concurrent readers.
    pub fn long_running_count(&self) -> usize {
        self.long_running_count.load(Ordering::SeqCst)
    }

    /// Entries reclaimed past the free-list bound.
    pub fn dropped_count(&self) -> usize {
        self.dropped_count.load(Ordering::SeqCst)
    }

    fn bucket_of(&self, ts: u64) -> &Mutex<Bucket> {
        &self.buckets[(ts % self.buckets.len() as u64) as usize]
    }

    /// Registers a new transaction: a fresh start timestamp, state
    /// ACTIVE, recycled storage when available. O(1) amortized.
    pub fn register_transaction(&self) -> Result<Arc<TransactionStatus>> {
        let ts = self.allocator.update_timestamp();
        if ts > MAX_TIMESTAMP {
            return Err(LarchError::ResourceExhausted(
                "timestamp space exhausted".into(),
            )
            .into());
        }
        let mut bucket = self.bucket_of(ts).lock();
        {
            let mut active = self.active.lock();
            if active.len() >= MAX_ACTIVE_TRANSACTIONS {
                return Err(LarchError::ResourceExhausted(format!(
                    "transaction index is full ({MAX_ACTIVE_TRANSACTIONS} active)"
                ))
                .into());
            }
            active.insert(ts);
        }
        let status = match bucket.free.pop() {
            Some(recycled) => {
                self.free_count.fetch_sub(1, Ordering::SeqCst);
                recycled.reset(ts);
                recycled
            }
            None => Arc::new(TransactionStatus::new(ts)),
        };
        bucket.current.push(Arc::clone(&status));
        self.current_count.fetch_add(1, Ordering::SeqCst);
        self.spill_long_running(&mut bucket);
        Ok(status)
    }

    /// Keeps at most LONG_RUNNING_THRESHOLD active entries on the
    /// current list; the oldest spill to the long-running list.
    fn spill_long_running(&self, bucket: &mut Bucket) {
        while bucket.current.len() > LONG_RUNNING_THRESHOLD {
            let moved = bucket.current.remove(0);
            tracing::debug!(ts = moved.ts(), "transaction spilled to long-running list");
            bucket.long_running.push(moved);
            self.current_count.fetch_sub(1, Ordering::SeqCst);
            self.long_running_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Finalizes a committed or aborted transaction. `timestamp` is the
    /// completion horizon stamped into the entry (`ta`).
    pub fn notify_completed(&self, status: &Arc<TransactionStatus>, timestamp: u64) -> Result<()> {
        let ts = status.ts();
        if status.is_completed() {
            return Err(
                LarchError::IllegalState("transaction already finalized".into()).into(),
            );
        }
        if status.tc() == 0 {
            return Err(LarchError::IllegalState(
                "commit or abort must precede notify_completed".into(),
            )
            .into());
        }
        let mut bucket = self.bucket_of(ts).lock();
        let entry = if let Some(pos) = bucket.current.iter().position(|e| Arc::ptr_eq(e, status)) {
            self.current_count.fetch_sub(1, Ordering::SeqCst);
            bucket.current.remove(pos)
        } else if let Some(pos) = bucket
            .long_running
            .iter()
            .position(|e| Arc::ptr_eq(e, status))
        {
            self.long_running_count.fetch_sub(1, Ordering::SeqCst);
            bucket.long_running.remove(pos)
        } else {
            return Err(
                LarchError::IllegalState("transaction is not registered".into()).into(),
            );
        };
        entry.finalize(timestamp);
        let floor = {
            let mut active = self.active.lock();
            active.remove(&ts);
            active.first().copied().unwrap_or(u64::MAX)
        };
        if entry.is_aborted() {
            if entry.mvv_count() > 0 {
                bucket.aborted.push(entry);
                self.aborted_count.fetch_add(1, Ordering::SeqCst);
            } else {
                self.recycle(&mut bucket, entry);
            }
        } else {
            let tc = entry.tc() as u64;
            if floor < tc {
                // A live transaction started before this commit; keep
                // the entry findable for its concurrency checks.
                bucket.long_running.push(entry);
                self.long_running_count.fetch_add(1, Ordering::SeqCst);
            } else {
                self.recycle(&mut bucket, entry);
            }
        }
        self.sweep_retained(&mut bucket, floor);
        drop(bucket);
        // Wake ww-dependency waiters parked on this transaction.
        let _guard = self.completion_lock.lock();
        self.completion.notify_all();
        Ok(())
    }

    /// Frees committed entries whose commit timestamp has fallen at or
    /// below the live floor.
    fn sweep_retained(&self, bucket: &mut Bucket, floor: u64) {
        let mut i = 0;
        while i < bucket.long_running.len() {
            let entry = &bucket.long_running[i];
            if entry.is_committed() && entry.tc() as u64 <= floor {
                let entry = bucket.long_running.remove(i);
                self.long_running_count.fetch_sub(1, Ordering::SeqCst);
                self.recycle(bucket, entry);
            } else {
                i += 1;
            }
        }
    }

    fn recycle(&self, bucket: &mut Bucket, entry: Arc<TransactionStatus>) {
        if bucket.free.len() < MAX_FREE_LIST_SIZE {
            entry.mark_free();
            bucket.free.push(entry);
            self.free_count.fetch_add(1, Ordering::SeqCst);
        } else {
            self.dropped_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// The commit timestamp of the writer of `vh` from the perspective
    /// of a reader that started at `floor_ts` and is executing `step`.
    /// Never errs, never blocks; see the module docs for the contract.
    pub fn commit_status(&self, vh: u64, floor_ts: u64, step: u16) -> i64 {
        let ts = vh_to_ts(vh);
        let vh_step = vh_to_step(vh);
        if ts == floor_ts {
            // The reader's own transaction: writes at or below the
            // reader's current step are visible.
            return if vh_step <= step {
                ts as i64
            } else {
                UNCOMMITTED
            };
        }
        let bucket = self.bucket_of(ts).lock();
        match bucket.find(ts) {
            None => PRIMORDIAL,
            Some(status) => {
                let tc = status.tc();
                if tc == ABORTED {
                    ABORTED
                } else if tc <= 0 {
                    // Running, or proposing a commit that is not final.
                    UNCOMMITTED
                } else {
                    tc
                }
            }
        }
    }

    /// Whether some transaction with start timestamp in `(low, high)`
    /// had not committed as of the active-set snapshot. Conservative
    /// under staleness: may report a transaction that has since
    /// committed, never the reverse.
    pub fn has_concurrent_transaction(&self, low: u64, high: u64) -> bool {
        self.cache.read().has_concurrent(low, high)
    }

    /// The current active-set snapshot.
    pub fn active_transaction_cache(&self) -> Arc<ActiveTransactionCache> {
        Arc::clone(&self.cache.read())
    }

    /// Rebuilds the active-set snapshot and installs it with a single
    /// pointer swap. Nonblocking apart from one bucket lock at a time.
    pub fn update_active_transaction_cache(&self) {
        let ceiling = self.allocator.current_timestamp();
        let mut entries: Vec<(u64, i64)> = Vec::new();
        for bucket in self.buckets.iter() {
            let bucket = bucket.lock();
            for status in bucket.current.iter().chain(&bucket.long_running) {
                if status.is_completed() {
                    continue;
                }
                let tc = match status.tc() {
                    ABORTED => 0,
                    raw if raw < 0 => -raw,
                    raw => raw,
                };
                entries.push((status.ts(), tc));
            }
        }
        entries.sort_unstable();
        let floor = entries
            .iter()
            .map(|&(ts, _)| ts)
            .next()
            .unwrap_or(ceiling + 1);
        let snapshot = Arc::new(ActiveTransactionCache {
            entries,
            floor,
            ceiling,
        });
        *self.cache.write() = snapshot;
    }

    fn live_floor(&self) -> u64 {
        self.active.lock().first().copied().unwrap_or(u64::MAX)
    }

    /// Blocks until the transaction that wrote `vh` finalizes, up to
    /// `timeout`. Returns the writer's commit timestamp, `ABORTED` when
    /// it aborted with undrained versions, `PRIMORDIAL` when no
    /// dependency exists, or `UNCOMMITTED` on timeout.
    pub fn ww_dependency(
        &self,
        vh: u64,
        source: &TransactionStatus,
        timeout: Duration,
    ) -> Result<i64> {
        let ts = vh_to_ts(vh);
        if ts == 0 || ts > self.allocator.current_timestamp() {
            return Err(LarchError::IllegalArgument(
                "version handle was never allocated".into(),
            )
            .into());
        }
        if ts == source.ts() {
            return Err(LarchError::IllegalArgument(
                "transaction cannot declare a write-write dependency on itself".into(),
            )
            .into());
        }
        let deadline = Instant::now() + timeout;
        loop {
            let target = {
                let bucket = self.bucket_of(ts).lock();
                bucket.find(ts).cloned()
            };
            let Some(target) = target else {
                return Ok(PRIMORDIAL);
            };
            if target.ts() != ts {
                return Ok(PRIMORDIAL);
            }
            if target.is_completed() {
                let tc = target.tc();
                return Ok(if tc == ABORTED {
                    if target.mvv_count() > 0 {
                        ABORTED
                    } else {
                        PRIMORDIAL
                    }
                } else {
                    tc
                });
            }
            let mut guard = self.completion_lock.lock();
            // The target may have finalized between the bucket probe
            // and taking the completion lock.
            if target.is_completed() {
                continue;
            }
            if timeout.is_zero()
                || self.completion.wait_until(&mut guard, deadline).timed_out()
            {
                tracing::warn!(
                    target_ts = ts,
                    source_ts = source.ts(),
                    timeout_ms = timeout.as_millis() as u64,
                    "write-write dependency wait timed out"
                );
                return Ok(UNCOMMITTED);
            }
        }
    }

    /// Reduces the index to canonical form: frees committed entries at
    /// or below the live floor, reclaims drained aborted entries whose
    /// completion horizon has passed, and re-applies the long-running
    /// spill bound.
    pub fn cleanup(&self) {
        let floor = self.live_floor();
        let mut freed_aborted = 0usize;
        for bucket in self.buckets.iter() {
            let mut bucket = bucket.lock();
            self.sweep_retained(&mut bucket, floor);
            let mut i = 0;
            while i < bucket.aborted.len() {
                let entry = &bucket.aborted[i];
                if entry.mvv_count() == 0 && entry.ta() < floor {
                    let entry = bucket.aborted.remove(i);
                    self.aborted_count.fetch_sub(1, Ordering::SeqCst);
                    freed_aborted += 1;
                    self.recycle(&mut bucket, entry);
                } else {
                    i += 1;
                }
            }
            self.spill_long_running(&mut bucket);
        }
        tracing::debug!(
            floor,
            freed_aborted,
            current = self.current_count(),
            aborted = self.aborted_count(),
            free = self.free_count(),
            long_running = self.long_running_count(),
            dropped = self.dropped_count(),
            "transaction index cleanup"
        );
    }
}

impl std::fmt::Debug for TransactionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionIndex")
            .field("buckets", &self.buckets.len())
            .field("current", &self.current_count())
            .field("aborted", &self.aborted_count())
            .field("free", &self.free_count())
            .field("long_running", &self.long_running_count())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::timestamp::ts_to_vh;

    fn index_with_one_bucket() -> (Arc<TimestampAllocator>, TransactionIndex) {
        let tsa = Arc::new(TimestampAllocator::new());
        let ti = TransactionIndex::with_buckets(Arc::clone(&tsa), 1);
        (tsa, ti)
    }

    #[test]
    fn register_assigns_increasing_timestamps() {
        let (_tsa, ti) = index_with_one_bucket();
        let a = ti.register_transaction().unwrap();
        let b = ti.register_transaction().unwrap();
        assert!(b.ts() > a.ts());
        assert_eq!(ti.current_count(), 2);
    }

    #[test]
    fn own_writes_visible_up_to_reader_step() {
        let (_tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        let vh = ts_to_vh(tx.ts());
        assert_eq!(ti.commit_status(vh, tx.ts(), 0), tx.ts() as i64);
        assert_eq!(ti.commit_status(vh + 1, tx.ts(), 1), tx.ts() as i64);
        assert_eq!(ti.commit_status(vh + 2, tx.ts(), 1), UNCOMMITTED);
        assert_eq!(ti.commit_status(vh + 2, tx.ts(), 2), tx.ts() as i64);
    }

    #[test]
    fn commit_status_reports_running_writers_as_uncommitted() {
        let (tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        let reader_ts = tsa.update_timestamp();
        assert_eq!(ti.commit_status(ts_to_vh(tx.ts()), reader_ts, 0), UNCOMMITTED);
    }

    #[test]
    fn commit_status_reports_aborts_immediately() {
        let (tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        tx.increment_mvv_count();
        tx.abort().unwrap();
        let reader_ts = tsa.update_timestamp();
        assert_eq!(ti.commit_status(ts_to_vh(tx.ts()), reader_ts, 0), ABORTED);
    }

    #[test]
    fn unknown_timestamps_are_primordial() {
        let (tsa, ti) = index_with_one_bucket();
        let ts = tsa.update_timestamp();
        assert_eq!(ti.commit_status(ts_to_vh(ts), ts + 1, 0), PRIMORDIAL);
    }

    #[test]
    fn completed_transactions_recycle_through_the_free_list() {
        let (tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        tx.commit(tsa.update_timestamp()).unwrap();
        ti.notify_completed(&tx, tsa.update_timestamp()).unwrap();
        assert_eq!(ti.current_count(), 0);
        assert_eq!(ti.free_count(), 1);
        let tx2 = ti.register_transaction().unwrap();
        assert_eq!(ti.free_count(), 0, "the freed entry was reused");
        assert!(Arc::ptr_eq(&tx, &tx2), "storage is recycled");
        assert!(tx2.ts() > 0);
    }

    #[test]
    fn notify_completed_requires_commit_or_abort() {
        let (tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        let err = ti.notify_completed(&tx, tsa.update_timestamp()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LarchError>(),
            Some(LarchError::IllegalState(_))
        ));
    }

    #[test]
    fn notify_completed_twice_is_illegal() {
        let (tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        tx.commit(tsa.update_timestamp()).unwrap();
        ti.notify_completed(&tx, tsa.update_timestamp()).unwrap();
        // The entry was recycled; a second completion must be refused
        // no matter what state the recycled entry is in.
        assert!(ti.notify_completed(&tx, tsa.update_timestamp()).is_err());
    }

    #[test]
    fn ww_dependency_refuses_self() {
        let (_tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        let err = ti
            .ww_dependency(ts_to_vh(tx.ts()), &tx, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LarchError>(),
            Some(LarchError::IllegalArgument(_))
        ));
    }

    #[test]
    fn ww_dependency_refuses_unallocated_handles() {
        let (tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        let future = ts_to_vh(tsa.current_timestamp() + 100);
        assert!(ti.ww_dependency(future, &tx, Duration::ZERO).is_err());
        assert!(ti.ww_dependency(ts_to_vh(0), &tx, Duration::ZERO).is_err());
    }

    #[test]
    fn ww_dependency_times_out_on_live_target() {
        let (_tsa, ti) = index_with_one_bucket();
        let target = ti.register_transaction().unwrap();
        let source = ti.register_transaction().unwrap();
        let verdict = ti
            .ww_dependency(ts_to_vh(target.ts()), &source, Duration::from_millis(50))
            .unwrap();
        assert_eq!(verdict, UNCOMMITTED);
    }

    #[test]
    fn cache_staleness_is_conservative() {
        let (tsa, ti) = index_with_one_bucket();
        let tx = ti.register_transaction().unwrap();
        ti.update_active_transaction_cache();
        assert!(ti.has_concurrent_transaction(0, tx.ts() + 1));
        tx.commit(tsa.update_timestamp()).unwrap();
        // Stale: still reported concurrent until the next rebuild.
        assert!(ti.has_concurrent_transaction(0, tx.ts() + 1));
        ti.update_active_transaction_cache();
        assert!(!ti.has_concurrent_transaction(0, tx.ts() + 1));
    }

    #[test]
    fn cache_floor_tracks_oldest_live_transaction() {
        let (tsa, ti) = index_with_one_bucket();
        ti.update_active_transaction_cache();
        assert_eq!(ti.active_transaction_cache().floor(), tsa.current_timestamp() + 1);
        let tx = ti.register_transaction().unwrap();
        ti.update_active_transaction_cache();
        assert_eq!(ti.active_transaction_cache().floor(), tx.ts());
    }

    #[test]
    fn register_spills_oldest_actives_past_threshold() {
        let (_tsa, ti) = index_with_one_bucket();
        let txs: Vec<_> = (0..LONG_RUNNING_THRESHOLD + 5)
            .map(|_| ti.register_transaction().unwrap())
            .collect();
        assert_eq!(ti.current_count(), LONG_RUNNING_THRESHOLD);
        assert_eq!(ti.long_running_count(), 5);
        // Spilled entries stay findable.
        let reader_ts = ti.allocator().update_timestamp();
        assert_eq!(
            ti.commit_status(ts_to_vh(txs[0].ts()), reader_ts, 0),
            UNCOMMITTED
        );
    }
}
