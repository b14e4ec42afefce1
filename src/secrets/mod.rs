//! Sensitive value handling.
//!
//! Credentials and issued tokens are wrapped in [`SecretString`] from the moment
//! they enter the broker until they are handed to the upstream exchange or
//! returned to the caller.

pub mod types;

pub use types::{exposed, SecretString};
