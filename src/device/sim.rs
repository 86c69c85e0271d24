//! Simulated device resources.
//!
//! [`SimulatedDevice`] implements [`ResourceManager`] in memory. Counter
//! pools come from the architecture and can be shrunk per tile to model
//! other clients (trace, status) holding counters. Counter values, timers
//! and registers are set by the caller.
//!
//! Used by the dry-run binary and by tests of the counter backend.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ArchConfig, ModuleType, TileLoc};
use crate::counters::{
    BroadcastHandle, CounterConfig, CounterHandle, PortHandle, PortSelection, ResourceError,
    ResourceManager,
};
use crate::metrics::Event;

/// Port monitors per tile module.
pub const PORT_MONITORS: usize = 8;

/// Broadcast channels per device.
pub const BROADCAST_CHANNELS: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
struct SimCounter {
    config: Option<CounterConfig>,
    running: bool,
}

#[derive(Debug)]
struct SimState {
    capacity: HashMap<(TileLoc, ModuleType), usize>,
    reserve_limit: HashMap<(TileLoc, ModuleType), usize>,
    reservations: HashMap<(TileLoc, ModuleType), usize>,
    counters: HashMap<CounterHandle, SimCounter>,
    values: HashMap<CounterHandle, u64>,
    failing_starts: HashSet<(TileLoc, ModuleType)>,
    ports: HashMap<PortHandle, PortSelection>,
    port_capacity: HashMap<TileLoc, usize>,
    broadcasts: BTreeSet<u8>,
    broadcast_capacity: usize,
    registers: HashMap<(TileLoc, u32), u32>,
    timers: HashMap<TileLoc, u64>,
}

/// In-memory resource manager.
#[derive(Debug)]
pub struct SimulatedDevice {
    arch: Arc<dyn ArchConfig>,
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    pub fn new(arch: Arc<dyn ArchConfig>) -> Self {
        Self {
            arch,
            state: Mutex::new(SimState {
                capacity: HashMap::new(),
                reserve_limit: HashMap::new(),
                reservations: HashMap::new(),
                counters: HashMap::new(),
                values: HashMap::new(),
                failing_starts: HashSet::new(),
                ports: HashMap::new(),
                port_capacity: HashMap::new(),
                broadcasts: BTreeSet::new(),
                broadcast_capacity: BROADCAST_CHANNELS,
                registers: HashMap::new(),
                timers: HashMap::new(),
            }),
        }
    }

    pub fn arch(&self) -> &Arc<dyn ArchConfig> {
        &self.arch
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn capacity(&self, state: &SimState, tile: TileLoc, module: ModuleType) -> usize {
        state
            .capacity
            .get(&(tile, module))
            .copied()
            .unwrap_or_else(|| self.arch.counters_per_module(module))
    }

    /// Shrink (or grow) the counter pool of one module.
    pub fn set_counter_capacity(&self, tile: TileLoc, module: ModuleType, counters: usize) {
        self.lock().capacity.insert((tile, module), counters);
    }

    /// Let only `limit` reservations succeed, while still reporting the full
    /// pool as available. Models another client taking counters between the
    /// availability query and the reservation.
    pub fn set_reserve_limit(&self, tile: TileLoc, module: ModuleType, limit: usize) {
        self.lock().reserve_limit.insert((tile, module), limit);
    }

    /// Make `start_counter` fail for one module.
    pub fn fail_starts(&self, tile: TileLoc, module: ModuleType) {
        self.lock().failing_starts.insert((tile, module));
    }

    pub fn set_port_capacity(&self, tile: TileLoc, monitors: usize) {
        self.lock().port_capacity.insert(tile, monitors);
    }

    pub fn set_broadcast_capacity(&self, channels: usize) {
        self.lock().broadcast_capacity = channels;
    }

    pub fn set_counter_value(&self, tile: TileLoc, module: ModuleType, index: u8, value: u64) {
        self.lock()
            .values
            .insert(CounterHandle { tile, module, index }, value);
    }

    pub fn write_register(&self, tile: TileLoc, offset: u32, value: u32) {
        self.lock().registers.insert((tile, offset), value);
    }

    pub fn set_timer(&self, tile: TileLoc, value: u64) {
        self.lock().timers.insert(tile, value);
    }

    /// Programming of a reserved counter.
    pub fn counter_config(&self, counter: &CounterHandle) -> Option<CounterConfig> {
        self.lock().counters.get(counter).and_then(|c| c.config)
    }

    /// Reserved counters, sorted by tile, module and index.
    pub fn reserved_counters(&self) -> Vec<CounterHandle> {
        let mut handles: Vec<_> = self.lock().counters.keys().copied().collect();
        handles.sort_by_key(|h| (h.tile, h.module, h.index));
        handles
    }

    pub fn running_counters(&self) -> usize {
        self.lock().counters.values().filter(|c| c.running).count()
    }

    /// Reserved port monitors and what they observe.
    pub fn reserved_ports(&self) -> Vec<(PortHandle, PortSelection)> {
        let mut ports: Vec<_> = self.lock().ports.iter().map(|(h, s)| (*h, *s)).collect();
        ports.sort_by_key(|(h, _)| (h.tile, h.module, h.index));
        ports
    }

    pub fn reserved_broadcasts(&self) -> usize {
        self.lock().broadcasts.len()
    }

    fn take_broadcast(&self, tiles: &[TileLoc]) -> Result<BroadcastHandle, ResourceError> {
        let mut state = self.lock();
        let capacity = state.broadcast_capacity.min(u8::MAX as usize);
        let channel = (0..capacity as u8)
            .find(|c| !state.broadcasts.contains(c))
            .ok_or(ResourceError::NoBroadcast)?;
        state.broadcasts.insert(channel);
        Ok(BroadcastHandle {
            channel,
            tiles: tiles.to_vec(),
        })
    }
}

fn event_fits(module: ModuleType, event: Event) -> bool {
    matches!(
        (module, event),
        (_, Event::None)
            | (ModuleType::Core, Event::Core(_))
            | (ModuleType::Dma, Event::Memory(_))
            | (ModuleType::Shim, Event::Pl(_))
            | (ModuleType::MemTile, Event::MemTile(_))
            | (ModuleType::Uc, Event::Uc(_))
    )
}

impl ResourceManager for SimulatedDevice {
    fn available_counters(&self, tile: TileLoc, module: ModuleType) -> usize {
        let state = self.lock();
        let used = state
            .counters
            .keys()
            .filter(|h| h.tile == tile && h.module == module)
            .count();
        self.capacity(&state, tile, module).saturating_sub(used)
    }

    fn reserve_counter(
        &self,
        tile: TileLoc,
        module: ModuleType,
    ) -> Result<CounterHandle, ResourceError> {
        let mut state = self.lock();
        let key = (tile, module);
        let exhausted = ResourceError::NoCounter { tile, module };

        let made = state.reservations.get(&key).copied().unwrap_or(0);
        if state.reserve_limit.get(&key).is_some_and(|limit| made >= *limit) {
            return Err(exhausted);
        }

        let capacity = self.capacity(&state, tile, module).min(u8::MAX as usize);
        let index = (0..capacity as u8)
            .find(|index| {
                !state.counters.contains_key(&CounterHandle {
                    tile,
                    module,
                    index: *index,
                })
            })
            .ok_or(exhausted)?;

        let handle = CounterHandle { tile, module, index };
        state.counters.insert(handle, SimCounter::default());
        *state.reservations.entry(key).or_default() += 1;
        Ok(handle)
    }

    fn configure_counter(
        &self,
        counter: &CounterHandle,
        config: &CounterConfig,
    ) -> Result<(), ResourceError> {
        for event in [config.start, config.end, config.reset] {
            if !event_fits(counter.module, event) {
                return Err(ResourceError::InvalidEvent {
                    module: counter.module,
                    event,
                });
            }
        }
        let mut state = self.lock();
        let slot = state
            .counters
            .get_mut(counter)
            .ok_or(ResourceError::UnknownCounter(*counter))?;
        slot.config = Some(*config);
        Ok(())
    }

    fn start_counter(&self, counter: &CounterHandle) -> Result<(), ResourceError> {
        let mut state = self.lock();
        let failing = state.failing_starts.contains(&(counter.tile, counter.module));
        let slot = state
            .counters
            .get_mut(counter)
            .ok_or(ResourceError::UnknownCounter(*counter))?;
        if slot.config.is_none() || failing {
            return Err(ResourceError::Unconfigured(*counter));
        }
        slot.running = true;
        Ok(())
    }

    fn stop_counter(&self, counter: &CounterHandle) -> Result<(), ResourceError> {
        let mut state = self.lock();
        let slot = state
            .counters
            .get_mut(counter)
            .ok_or(ResourceError::UnknownCounter(*counter))?;
        slot.running = false;
        Ok(())
    }

    fn release_counter(&self, counter: &CounterHandle) -> Result<(), ResourceError> {
        self.lock()
            .counters
            .remove(counter)
            .map(|_| ())
            .ok_or(ResourceError::UnknownCounter(*counter))
    }

    fn read_counter(&self, counter: &CounterHandle) -> Result<u64, ResourceError> {
        let state = self.lock();
        if !state.counters.contains_key(counter) {
            return Err(ResourceError::UnknownCounter(*counter));
        }
        Ok(state.values.get(counter).copied().unwrap_or(0))
    }

    fn reserve_stream_port(
        &self,
        tile: TileLoc,
        module: ModuleType,
        port: PortSelection,
    ) -> Result<PortHandle, ResourceError> {
        let mut state = self.lock();
        let capacity = state
            .port_capacity
            .get(&tile)
            .copied()
            .unwrap_or(PORT_MONITORS)
            .min(u8::MAX as usize);
        let index = (0..capacity as u8)
            .find(|index| {
                !state.ports.contains_key(&PortHandle {
                    tile,
                    module,
                    index: *index,
                })
            })
            .ok_or(ResourceError::NoPort(tile))?;

        let handle = PortHandle { tile, module, index };
        state.ports.insert(handle, port);
        Ok(handle)
    }

    fn release_stream_port(&self, port: &PortHandle) -> Result<(), ResourceError> {
        self.lock()
            .ports
            .remove(port)
            .map(|_| ())
            .ok_or(ResourceError::NoPort(port.tile))
    }

    fn reserve_broadcast(&self, tiles: &[TileLoc]) -> Result<BroadcastHandle, ResourceError> {
        self.take_broadcast(tiles)
    }

    fn release_broadcast(&self, broadcast: &BroadcastHandle) -> Result<(), ResourceError> {
        if self.lock().broadcasts.remove(&broadcast.channel) {
            Ok(())
        } else {
            Err(ResourceError::NoBroadcast)
        }
    }

    fn reserve_graph_iterator_event(
        &self,
        tiles: &[TileLoc],
        iteration: u32,
    ) -> Result<BroadcastHandle, ResourceError> {
        log::debug!("Graph iterator broadcast armed for iteration {}", iteration);
        self.take_broadcast(tiles)
    }

    fn physical_event(&self, module: ModuleType, event: Event) -> Result<u16, ResourceError> {
        if !event_fits(module, event) {
            return Err(ResourceError::InvalidEvent { module, event });
        }
        Ok(event.code())
    }

    fn read_register(&self, tile: TileLoc, offset: u32) -> Result<u32, ResourceError> {
        Ok(self
            .lock()
            .registers
            .get(&(tile, offset))
            .copied()
            .unwrap_or(0))
    }

    fn read_timer(&self, tile: TileLoc, _module: ModuleType) -> Result<u64, ResourceError> {
        Ok(self.lock().timers.get(&tile).copied().unwrap_or(0))
    }
}
