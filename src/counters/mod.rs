//! Performance counter allocation.
//!
//! Turns a resolved [`ProfileMetadata`](crate::profile::ProfileMetadata)
//! into reserved, running hardware counters and a table describing them.
//!
//! # Layers
//!
//! ```text
//! ProfileBackend        update_device / poll / free_resources
//!   ResourceBackend     tile walk, profile-API wiring, counter table
//!     ports, payload    stream switch monitors, reported payloads
//!       ResourceManager counters, port monitors, broadcasts, registers
//! ```
//!
//! The resource manager is injected, so the same backend drives real
//! hardware or a [`SimulatedDevice`](crate::device::SimulatedDevice).

pub mod backend;
pub mod payload;
pub mod ports;
pub mod record;
pub mod resource;

pub use backend::{ApiResult, BackendError, ProfileBackend, ResourceBackend};
pub use record::{AieSample, CounterRecord, TileHistogram};
pub use resource::{
    BroadcastHandle, CounterConfig, CounterHandle, CounterMode, PortHandle, PortKind,
    PortSelection, ResourceError, ResourceManager,
};
