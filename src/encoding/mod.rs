//! # Encoding Module
//!
//! Order-preserving key encoding for the B-link trees:
//!
//! - [`Key`]: mutable segment buffer whose encoded form compares with a
//!   single `memcmp`
//! - [`Segment`]: the typed values a key is built from
//! - [`KeyCursor`]: decode cursor over a key's segments
//! - [`KeyState`]: immutable snapshot for map keys and cross-thread use

pub mod key;

pub use key::{prefix, Key, KeyCursor, KeyState, Segment};
