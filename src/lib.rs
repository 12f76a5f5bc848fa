//! bur: backup lifecycle orchestration.
//!
//! Discovers dated backup directories onsite, processes each one through
//! an archive and encrypt pipeline, replicates the artifacts to an offsite
//! root and enforces retention on both ends.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod notify;
pub mod tools;
