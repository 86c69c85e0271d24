//! Hardware resource manager boundary.
//!
//! Counters, stream switch port monitors and broadcast channels are finite
//! per-device pools shared with other clients (trace, status). A
//! [`ResourceManager`] hands them out and serializes access internally, so
//! every method takes `&self`.

use std::fmt;

use crate::device::{ModuleType, TileLoc};
use crate::metrics::Event;

/// A reserved performance counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterHandle {
    pub tile: TileLoc,
    pub module: ModuleType,
    /// Physical counter index inside the module.
    pub index: u8,
}

/// How the counter start condition is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterMode {
    /// Count from `start` to `end`.
    #[default]
    Direct,
    /// Start on a 4-state combo FSM `(reset | user 1) -> start -> start -> end`,
    /// used by the byte-count metric.
    ComboFsm,
}

/// Programming of one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterConfig {
    pub start: Event,
    pub end: Event,
    pub reset: Event,
    /// Counter event fires after this many counts (0 = no threshold).
    pub threshold: u32,
    pub mode: CounterMode,
}

/// Stream switch port family selected for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// Tile DMA channel port.
    Dma,
    /// Trace port (core: 0, memory: 1).
    Trace,
    /// South port of an interface tile.
    South,
}

/// Which stream switch port a monitor observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSelection {
    pub kind: PortKind,
    pub is_master: bool,
    /// Channel, trace select or stream id depending on `kind`.
    pub id: u8,
}

impl fmt::Display for PortSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.is_master { "master" } else { "slave" };
        write!(f, "{:?} {} {}", self.kind, dir, self.id)
    }
}

/// A reserved stream switch port monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortHandle {
    pub tile: TileLoc,
    pub module: ModuleType,
    /// Monitor index; port events of this monitor use this port number.
    pub index: u8,
}

/// A reserved broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BroadcastHandle {
    pub channel: u8,
    pub tiles: Vec<TileLoc>,
}

impl BroadcastHandle {
    /// Event seen by every tile on the channel.
    pub fn event(&self) -> Event {
        Event::Pl(crate::metrics::PlEvent::Broadcast(self.channel))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("no free performance counter in {module} module of tile {tile}")]
    NoCounter { tile: TileLoc, module: ModuleType },
    #[error("no free stream switch port monitor on tile {0}")]
    NoPort(TileLoc),
    #[error("no free broadcast channel")]
    NoBroadcast,
    #[error("counter {0:?} is not reserved")]
    UnknownCounter(CounterHandle),
    #[error("counter {0:?} was never configured")]
    Unconfigured(CounterHandle),
    #[error("event {event} cannot be used in {module} module")]
    InvalidEvent { module: ModuleType, event: Event },
}

/// Device-side allocator of profiling resources.
pub trait ResourceManager: Send + Sync + fmt::Debug {
    /// Counters currently free in `module` of `tile`.
    fn available_counters(&self, tile: TileLoc, module: ModuleType) -> usize;

    fn reserve_counter(&self, tile: TileLoc, module: ModuleType)
        -> Result<CounterHandle, ResourceError>;

    fn configure_counter(
        &self,
        counter: &CounterHandle,
        config: &CounterConfig,
    ) -> Result<(), ResourceError>;

    fn start_counter(&self, counter: &CounterHandle) -> Result<(), ResourceError>;

    fn stop_counter(&self, counter: &CounterHandle) -> Result<(), ResourceError>;

    fn release_counter(&self, counter: &CounterHandle) -> Result<(), ResourceError>;

    fn read_counter(&self, counter: &CounterHandle) -> Result<u64, ResourceError>;

    /// Reserve a port monitor in `module` of `tile` and point it at `port`.
    fn reserve_stream_port(
        &self,
        tile: TileLoc,
        module: ModuleType,
        port: PortSelection,
    ) -> Result<PortHandle, ResourceError>;

    fn release_stream_port(&self, port: &PortHandle) -> Result<(), ResourceError>;

    /// Reserve a broadcast channel connecting `tiles`.
    fn reserve_broadcast(&self, tiles: &[TileLoc]) -> Result<BroadcastHandle, ResourceError>;

    fn release_broadcast(&self, broadcast: &BroadcastHandle) -> Result<(), ResourceError>;

    /// Broadcast event raised when the graph reaches `iteration`, shared by
    /// all interface tiles in `tiles`.
    fn reserve_graph_iterator_event(
        &self,
        tiles: &[TileLoc],
        iteration: u32,
    ) -> Result<BroadcastHandle, ResourceError>;

    /// Physical event id of a logical event in `module`.
    fn physical_event(&self, module: ModuleType, event: Event) -> Result<u16, ResourceError>;

    /// Raw 32-bit register read at a tile-relative offset.
    fn read_register(&self, tile: TileLoc, offset: u32) -> Result<u32, ResourceError>;

    /// Free-running timer of the module owning `tile`.
    fn read_timer(&self, tile: TileLoc, module: ModuleType) -> Result<u64, ResourceError>;
}
