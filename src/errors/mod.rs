//! # Error Handling
//!
//! Crate-wide error type for the credential broker, built on `thiserror`.
//! Per-attempt upstream failures live in [`crate::exchange::ExchangeError`] and
//! only surface here wrapped in [`Error::Issuance`].

pub mod types;

pub use types::{Error, Result};
