//! # LarchDB Core
//!
//! The concurrency and ordering core of an embedded, transactional,
//! on-disk key/value store organized as B-link trees over
//! page-addressable volume files with a write-ahead journal and
//! snapshot-isolation MVCC.
//!
//! This crate is the engine's hard center; page layout, journal format
//! and the outer administrative surfaces compose on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   Management records (read-only snapshots)   │
//! ├──────────────────────────────────────────────┤
//! │ TransactionIndex │ SharedResource latches    │
//! │ (MVCC registry)  │ (buffers, trees, index)   │
//! ├──────────────────┴───────────────────────────┤
//! │   KeyFilter (selection + cursor navigation)  │
//! ├──────────────────────────────────────────────┤
//! │   Key codec (order-preserving encoding)      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! - [`encoding`]: typed key segments with an order-preserving,
//!   terminator-safe byte encoding; keys compare with one `memcmp`
//! - [`filter`]: compiled selection predicates over encoded keys with a
//!   traversal oracle that teleports ordered cursors past rejected
//!   regions
//! - [`latch`]: the multi-reader/single-writer claim primitive with
//!   status bits and generation counting
//! - [`mvcc`]: timestamp allocation, transaction status, the sharded
//!   transaction index with snapshot visibility, write-write dependency
//!   blocking and reduction to canonical form
//! - [`management`]: point-in-time introspection records
//! - [`config`]: centralized, cross-checked tuning constants
//!
//! ## Quick Start
//!
//! ```ignore
//! use larchdb::{Key, KeyFilter, Term};
//!
//! let mut key = Key::new();
//! key.append("atlantic").append(1.3f32);
//! let filter = KeyFilter::from_key(&key)
//!     .append(Term::range("x", "z"))
//!     .limit(2, 5);
//!
//! // Scan an ordered store, skipping non-matching regions.
//! while let Some(found) = store.next_greater(&key) {
//!     key = found;
//!     if filter.selected(&key) {
//!         visit(&key);
//!     } else if !filter.traverse(&mut key, true) {
//!         break;
//!     }
//! }
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod latch;
pub mod management;
pub mod mvcc;

pub use encoding::{Key, KeyCursor, KeyState, Segment};
pub use error::LarchError;
pub use filter::{KeyFilter, Term};
pub use latch::{ClaimGuard, SharedResource};
pub use mvcc::{
    ts_to_vh, vh_to_step, vh_to_ts, TimestampAllocator, TransactionIndex, TransactionState,
    TransactionStatus, ABORTED, PRIMORDIAL, UNCOMMITTED,
};
