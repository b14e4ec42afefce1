//! Typed repositories over [`Storage`](super::Storage).

pub mod config;
pub mod role;

pub use config::ConfigRepository;
pub use role::RoleRepository;
