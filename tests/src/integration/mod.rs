//! Cross-crate integration tests

pub mod leases;
pub mod properties;
pub mod scenarios;
pub mod service;
