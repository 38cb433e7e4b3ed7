//! # SharedResource Latch
//!
//! A multi-reader / single-writer latch guarding buffers, trees and the
//! transaction index, with claim counting, upgrade/downgrade, status
//! flags and a generation counter for optimistic readers.
//!
//! ## State Layout
//!
//! The synchronizer state and the status flags live on *separate*
//! atomic cells, so a flag update can never race a claim CAS:
//!
//! ```text
//! lock  (AtomicU32):  [ WRITER | claim count (15 bits) ]
//! flags (AtomicU32):  [ FIXED CLOSING SUSPENDED TOUCHED TRANSIENT
//!                       STRUCTURE DELETED VALID DIRTY ]
//! owner (AtomicU64):  exclusive owner thread id, 0 when none
//! generation:         monotonic change counter
//! ```
//!
//! ## Acquisition Rules
//!
//! - a read claim is admitted when no writer holds the latch (or the
//!   writer is this thread) and the count is below the 15-bit maximum
//! - a write claim is admitted when the count is zero, or this thread
//!   already owns the latch exclusively (recursive write)
//! - upgrade succeeds only from exactly one claim with no writer bit
//! - downgrade clears the writer bit, keeps the claim, wakes waiters
//!
//! ## Fairness
//!
//! Non-strict FIFO: an arriving claimer yields to the head of the wait
//! queue unless that head is itself, and a writer additionally barges
//! when it already owns the latch (re-entrancy must not queue behind
//! threads that can never make progress). This keeps writers from
//! starving under reader churn without the cost of strict ordering.
//!
//! ## Blocking and Cancellation
//!
//! `claim` parks on a condvar with a deadline; a zero timeout is a pure
//! try-acquire. A timed-out claim leaves the latch state untouched.
//! Timeouts are the only cancellation vector.
//!
//! ## Memory Ordering
//!
//! Claims acquire with `Acquire`, releases publish with `Release`: a
//! thread that claims after a writer's release observes every write the
//! writer made to the guarded content.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use eyre::Result;
use parking_lot::{Condvar, Mutex};

use crate::config::{DEFAULT_CLAIM_TIMEOUT, MAX_CLAIM_COUNT};
use crate::error::LarchError;

/// Mask for the claim count field of the lock word.
pub const CLAIMED_MASK: u32 = 0x0000_7FFF;
/// Writer flag of the lock word.
pub const WRITER_MASK: u32 = 0x0000_8000;

/// Resource content must be written back.
pub const DIRTY_MASK: u32 = 0x0001_0000;
/// Resource content accurately reflects durable state.
pub const VALID_MASK: u32 = 0x0002_0000;
/// Resource belongs to a container being deleted.
pub const DELETE_MASK: u32 = 0x0004_0000;
/// Dirty as part of a structural change; must be recovered with its
/// checkpoint.
pub const STRUCTURE_MASK: u32 = 0x0010_0000;
/// Dirty but exempt from checkpoints.
pub const TRANSIENT_MASK: u32 = 0x0040_0000;
/// Recently used; consulted by clock-style replacement.
pub const TOUCHED_MASK: u32 = 0x0800_0000;
/// Updates are suspended.
pub const SUSPENDED_MASK: u32 = 0x1000_0000;
/// Resource is shutting down.
pub const CLOSING_MASK: u32 = 0x2000_0000;
/// Resource is pinned to a fixed location.
pub const FIXED_MASK: u32 = 0x4000_0000;

const STATUS_MASK: u32 = DIRTY_MASK
    | VALID_MASK
    | DELETE_MASK
    | STRUCTURE_MASK
    | TRANSIENT_MASK
    | TOUCHED_MASK
    | SUSPENDED_MASK
    | CLOSING_MASK
    | FIXED_MASK;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Crate-assigned dense thread id; 0 is reserved for "no owner".
pub(crate) fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// MR/SW latch with status bits and a generation counter.
pub struct SharedResource {
    lock: AtomicU32,
    flags: AtomicU32,
    owner: AtomicU64,
    generation: AtomicU64,
    waiters: Mutex<VecDeque<u64>>,
    wakeup: Condvar,
}

impl Default for SharedResource {
    fn default() -> Self {
        SharedResource::new()
    }
}

impl SharedResource {
    pub fn new() -> SharedResource {
        SharedResource {
            lock: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            owner: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            waiters: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
        }
    }

    /// Acquires a claim with the default timeout.
    pub fn claim(&self, writer: bool) -> bool {
        self.claim_within(writer, DEFAULT_CLAIM_TIMEOUT)
    }

    /// Acquires a claim, waiting up to `timeout`. A zero timeout is a
    /// pure try-acquire. Returns `false` on timeout with no side
    /// effect.
    pub fn claim_within(&self, writer: bool, timeout: Duration) -> bool {
        let me = current_thread_id();
        if self.try_claim(writer, me, true) {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        let mut queue = self.waiters.lock();
        queue.push_back(me);
        loop {
            let admitted = queue.front() == Some(&me)
                || self.owner.load(Ordering::Relaxed) == me;
            if admitted && self.try_claim(writer, me, false) {
                remove_waiter(&mut queue, me);
                self.wakeup.notify_all();
                return true;
            }
            if self.wakeup.wait_until(&mut queue, deadline).timed_out() {
                remove_waiter(&mut queue, me);
                self.wakeup.notify_all();
                tracing::debug!(
                    writer,
                    timeout_ms = timeout.as_millis() as u64,
                    "latch claim timed out"
                );
                return false;
            }
        }
    }

    fn try_claim(&self, writer: bool, me: u64, barging: bool) -> bool {
        if barging && self.yields_to_queue(writer, me) {
            return false;
        }
        loop {
            let state = self.lock.load(Ordering::Relaxed);
            let claims = state & CLAIMED_MASK;
            if claims >= MAX_CLAIM_COUNT {
                return false;
            }
            if writer {
                if claims != 0 && self.owner.load(Ordering::Relaxed) != me {
                    return false;
                }
                if self
                    .lock
                    .compare_exchange(
                        state,
                        (state | WRITER_MASK) + 1,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    self.owner.store(me, Ordering::Relaxed);
                    return true;
                }
            } else {
                if state & WRITER_MASK != 0 && self.owner.load(Ordering::Relaxed) != me {
                    return false;
                }
                if self
                    .lock
                    .compare_exchange(state, state + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return true;
                }
            }
        }
    }

    /// Non-strict fairness: yield to a queued waiter that is not this
    /// thread, unless this thread already owns the latch exclusively.
    fn yields_to_queue(&self, writer: bool, me: u64) -> bool {
        let queue = self.waiters.lock();
        match queue.front() {
            None => false,
            Some(&head) if head == me => false,
            Some(_) => !(writer && self.owner.load(Ordering::Relaxed) == me),
        }
    }

    /// Releases one claim. When the count reaches zero the writer flag
    /// and owner are cleared and waiters wake. An unmatched release is
    /// an `IllegalState` error and leaves the latch untouched.
    pub fn release(&self) -> Result<()> {
        loop {
            let state = self.lock.load(Ordering::Relaxed);
            match state & CLAIMED_MASK {
                0 => {
                    return Err(LarchError::IllegalState(format!(
                        "unmatched release of {self}"
                    ))
                    .into());
                }
                1 => {
                    let new = (state - 1) & !WRITER_MASK;
                    if self
                        .lock
                        .compare_exchange(state, new, Ordering::Release, Ordering::Relaxed)
                        .is_ok()
                    {
                        self.owner.store(0, Ordering::Relaxed);
                        self.wake();
                        return Ok(());
                    }
                }
                _ => {
                    if self
                        .lock
                        .compare_exchange(state, state - 1, Ordering::Release, Ordering::Relaxed)
                        .is_ok()
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Converts the single held read claim into a write claim. Succeeds
    /// only when exactly one claim is held and no writer bit is set;
    /// fails without mutation otherwise.
    pub fn upgrade_claim(&self) -> bool {
        let me = current_thread_id();
        loop {
            let state = self.lock.load(Ordering::Relaxed);
            if state & CLAIMED_MASK != 1 || state & WRITER_MASK != 0 {
                return false;
            }
            if self
                .lock
                .compare_exchange(
                    state,
                    state | WRITER_MASK,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.owner.store(me, Ordering::Relaxed);
                return true;
            }
        }
    }

    /// Clears the writer bit while retaining the claim as a read claim,
    /// waking waiters. Returns `false` when this thread is not the
    /// exclusive owner.
    pub fn downgrade_claim(&self) -> bool {
        let me = current_thread_id();
        if self.owner.load(Ordering::Relaxed) != me {
            return false;
        }
        loop {
            let state = self.lock.load(Ordering::Relaxed);
            if state & WRITER_MASK == 0 {
                return false;
            }
            if self
                .lock
                .compare_exchange(
                    state,
                    state & !WRITER_MASK,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.owner.store(0, Ordering::Relaxed);
                self.wake();
                return true;
            }
        }
    }

    /// Whether a claim of the given kind would be admitted right now,
    /// ignoring queue order.
    pub fn is_available(&self, writer: bool) -> bool {
        let state = self.lock.load(Ordering::Relaxed);
        let claims = state & CLAIMED_MASK;
        if claims >= MAX_CLAIM_COUNT {
            return false;
        }
        let me = current_thread_id();
        if writer {
            claims == 0 || self.owner.load(Ordering::Relaxed) == me
        } else {
            state & WRITER_MASK == 0 || self.owner.load(Ordering::Relaxed) == me
        }
    }

    /// Whether this thread holds the exclusive claim.
    pub fn is_mine(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_thread_id()
            && self.lock.load(Ordering::Relaxed) & WRITER_MASK != 0
    }

    fn wake(&self) {
        // Hold the queue lock while notifying so a waiter between its
        // admission check and the park cannot miss the wakeup.
        let _queue = self.waiters.lock();
        self.wakeup.notify_all();
    }

    // ------------------------------------------------------------------
    // Status flags. These never touch the lock word.
    // ------------------------------------------------------------------

    fn set_bits(&self, mask: u32) {
        self.flags.fetch_or(mask & STATUS_MASK, Ordering::Relaxed);
    }

    fn clear_bits(&self, mask: u32) {
        self.flags.fetch_and(!mask, Ordering::Relaxed);
    }

    fn test_bits(&self, mask: u32) -> bool {
        self.flags.load(Ordering::Relaxed) & mask != 0
    }

    /// Replaces all status flags atomically. Lock bits in the mask are
    /// discarded by construction.
    pub fn set_status(&self, mask: u32) {
        self.flags.store(mask & STATUS_MASK, Ordering::Relaxed);
    }

    pub fn is_dirty(&self) -> bool {
        self.test_bits(DIRTY_MASK)
    }

    pub fn is_clean(&self) -> bool {
        !self.is_dirty()
    }

    pub fn set_dirty(&self) {
        self.set_bits(DIRTY_MASK);
    }

    pub fn set_dirty_structure(&self) {
        self.set_bits(DIRTY_MASK | STRUCTURE_MASK);
    }

    pub fn set_clean(&self) {
        self.clear_bits(DIRTY_MASK | STRUCTURE_MASK);
    }

    pub fn is_valid(&self) -> bool {
        self.test_bits(VALID_MASK)
    }

    pub fn set_valid(&self, valid: bool) {
        if valid {
            self.set_bits(VALID_MASK);
        } else {
            self.clear_bits(VALID_MASK);
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.test_bits(DELETE_MASK)
    }

    pub fn set_deleted(&self, deleted: bool) {
        if deleted {
            self.set_bits(DELETE_MASK);
        } else {
            self.clear_bits(DELETE_MASK);
        }
    }

    pub fn is_structure(&self) -> bool {
        self.test_bits(STRUCTURE_MASK)
    }

    pub fn is_transient(&self) -> bool {
        self.test_bits(TRANSIENT_MASK)
    }

    pub fn set_transient(&self, transient: bool) {
        if transient {
            self.set_bits(TRANSIENT_MASK);
        } else {
            self.clear_bits(TRANSIENT_MASK);
        }
    }

    pub fn is_touched(&self) -> bool {
        self.test_bits(TOUCHED_MASK)
    }

    pub fn set_touched(&self) {
        self.set_bits(TOUCHED_MASK);
    }

    pub fn clear_touched(&self) {
        self.clear_bits(TOUCHED_MASK);
    }

    pub fn is_suspended(&self) -> bool {
        self.test_bits(SUSPENDED_MASK)
    }

    pub fn is_closing(&self) -> bool {
        self.test_bits(CLOSING_MASK)
    }

    pub fn is_fixed(&self) -> bool {
        self.test_bits(FIXED_MASK)
    }

    pub fn set_fixed(&self, fixed: bool) {
        if fixed {
            self.set_bits(FIXED_MASK);
        } else {
            self.clear_bits(FIXED_MASK);
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Combined status word: flags plus current lock state, for display
    /// and the management surface.
    pub fn status_word(&self) -> u32 {
        self.flags.load(Ordering::Relaxed) | self.lock.load(Ordering::Relaxed)
    }

    /// Compact letter form of a status word, e.g. `vdwr1`.
    pub fn status_code_of(state: u32) -> String {
        let mut code = String::with_capacity(8);
        if state & SUSPENDED_MASK != 0 {
            code.push('s');
        }
        if state & CLOSING_MASK != 0 {
            code.push('c');
        }
        if state & VALID_MASK != 0 {
            code.push('v');
        }
        if state & DIRTY_MASK != 0 {
            code.push('d');
        }
        if state & TRANSIENT_MASK != 0 {
            code.push('t');
        }
        if state & STRUCTURE_MASK != 0 {
            code.push('s');
        }
        if state & WRITER_MASK != 0 {
            code.push('w');
        }
        let claims = state & CLAIMED_MASK;
        if claims != 0 {
            code.push('r');
            code.push_str(&claims.to_string());
        }
        code
    }

    pub fn status_code(&self) -> String {
        Self::status_code_of(self.status_word())
    }

    /// Exclusive owner thread id, if any.
    pub fn writer_thread(&self) -> Option<u64> {
        match self.owner.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    /// Current generation; bumped whenever guarded content changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

fn remove_waiter(queue: &mut VecDeque<u64>, me: u64) {
    if let Some(pos) = queue.iter().position(|&t| t == me) {
        queue.remove(pos);
    }
}

impl fmt::Display for SharedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.writer_thread() {
            Some(owner) => write!(f, "SharedResource[{} <{owner}>]", self.status_code()),
            None => write!(f, "SharedResource[{}]", self.status_code()),
        }
    }
}

impl fmt::Debug for SharedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("status", &self.status_code())
            .field("generation", &self.generation())
            .finish()
    }
}

/// RAII claim on a [`SharedResource`], released on drop.
pub struct ClaimGuard<'a> {
    resource: &'a SharedResource,
}

impl<'a> ClaimGuard<'a> {
    /// Acquires a read claim, or `InUse` on timeout.
    pub fn acquire(resource: &'a SharedResource, timeout: Duration) -> Result<ClaimGuard<'a>> {
        Self::acquire_inner(resource, false, timeout)
    }

    /// Acquires a write claim, or `InUse` on timeout.
    pub fn acquire_write(
        resource: &'a SharedResource,
        timeout: Duration,
    ) -> Result<ClaimGuard<'a>> {
        Self::acquire_inner(resource, true, timeout)
    }

    fn acquire_inner(
        resource: &'a SharedResource,
        writer: bool,
        timeout: Duration,
    ) -> Result<ClaimGuard<'a>> {
        if resource.claim_within(writer, timeout) {
            Ok(ClaimGuard { resource })
        } else {
            Err(LarchError::InUse.into())
        }
    }

    pub fn resource(&self) -> &SharedResource {
        self.resource
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        // A destructor cannot propagate; an unmatched release here is a
        // guard-accounting bug and must not vanish silently.
        if let Err(e) = self.resource.release() {
            tracing::error!(error = %e, "claim guard release failed");
        }
    }
}
