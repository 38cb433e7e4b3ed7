//! # Core Error Types
//!
//! This module defines the typed error enum for LarchDB's core. Fallible
//! operations return `eyre::Result` with a `LarchError` payload, so call
//! sites compose with `?` while tests and callers can still match on the
//! concrete kind via `downcast_ref::<LarchError>()`.
//!
//! ## Error Categories
//!
//! | Kind | Trigger | Recovery |
//! |------|---------|----------|
//! | `TypeMismatch` | decoding a key segment against the wrong type | caller-local, key unchanged |
//! | `Underflow` | decoding past the end of a key | caller-local |
//! | `InUse` | latch claim timed out | retry or escalate |
//! | `IllegalState` | lifecycle violation (release of an unclaimed latch, finalize twice, commit after completion) | caller bug |
//! | `IllegalArgument` | invalid parameter (self ww-dependency, unallocated handle) | caller bug |
//! | `ResourceExhausted` | transaction index at capacity | propagate, shed load |
//! | `FilterSyntax` | invalid key filter string | report offset to the user |
//!
//! Read-only operations (`selected`, `commit_status`,
//! `has_concurrent_transaction`) never return errors; they observe a
//! consistent snapshot and report outcomes as values. Writing
//! operations fail fast and leave state unchanged on failure.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LarchError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("key underflow: {0}")]
    Underflow(&'static str),

    #[error("resource is in use")]
    InUse,

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("invalid key filter string at byte {offset}: {message}")]
    FilterSyntax { offset: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_display() {
        let err = LarchError::TypeMismatch {
            expected: "int",
            found: "text",
        };
        assert_eq!(err.to_string(), "type mismatch: expected int, found text");
    }

    #[test]
    fn filter_syntax_carries_offset() {
        let err = LarchError::FilterSyntax {
            offset: 7,
            message: "unexpected character".to_string(),
        };
        assert!(err.to_string().contains("byte 7"));
    }

    #[test]
    fn errors_downcast_through_eyre() {
        let report: eyre::Report = LarchError::InUse.into();
        assert!(matches!(
            report.downcast_ref::<LarchError>(),
            Some(LarchError::InUse)
        ));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LarchError>();
    }
}
