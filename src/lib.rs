//! aie-profile library
//!
//! Resolves AI Engine profiling settings into per-tile metric sets and binds
//! them to hardware performance counters.

pub mod counters;
pub mod device;
pub mod message;
pub mod metadata;
pub mod metrics;
pub mod profile;
pub mod session;
pub mod settings;
