//! # Configuration Management
//!
//! Startup settings resolved from an environment lookup. See
//! [`BrokerSettings::resolve`].

pub mod settings;

pub use settings::{BreakerSettings, BrokerSettings, LoggingSettings};
