//! # Configuration Module
//!
//! Centralizes the core's tuning constants. Interdependent values live
//! together in [`constants`] with their relationships documented and
//! compile-time checked, so a latch field width or a reduction bound
//! cannot silently drift apart from the code that depends on it.

pub mod constants;
pub use constants::*;
