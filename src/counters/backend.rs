//! Counter allocation and hardware binding.
//!
//! [`ResourceBackend`] walks the resolved configuration maps, reserves one
//! counter per event of each tile's metric set and records what it
//! configured. Resource problems degrade the configuration, they never
//! abort it:
//!
//! ```text
//! for module, for tile:
//!     skip inactive modules
//!     n = min(events, free counters)      warn when truncated
//!     reserve port monitors for port events
//!     for i in 0..n:
//!         reserve + configure + start     failure: stop this tile
//!         record {ids, payload, ...}
//!     histogram[n] += 1
//! ```
//!
//! Interface tiles with latency pairs are configured first, destination
//! before source, so the pair's broadcast channel exists when the source
//! counter is set up.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::payload::counter_payload;
use super::ports::{channel_for_port, configure_stream_ports};
use super::record::{histogram_summary, AieSample, CounterRecord, TileHistogram};
use super::resource::{
    BroadcastHandle, CounterConfig, CounterHandle, CounterMode, PortHandle, ResourceError,
    ResourceManager,
};
use crate::device::{relative_row, ModuleType, Tile, TileLoc};
use crate::metrics::{
    counter_base, event_list, is_profile_api_metric, modify_events, pair_module, reserved_event_id,
    supports_graph_iterator, Event, PlEvent, METRIC_BYTE_COUNT, METRIC_LATENCY,
};
use crate::profile::{latency_key, LatencyError, ProfileMetadata};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Latency(#[from] LatencyError),
}

/// Hardware binding of a resolved profile configuration.
pub trait ProfileBackend: Send {
    /// Reserve, configure and start counters. Returns `true` when at least
    /// one module was configured.
    fn update_device(&mut self) -> Result<bool, BackendError>;

    /// Read every configured counter once.
    fn poll(&mut self) -> Vec<AieSample>;

    /// Report profile-API results, then stop and release everything.
    fn free_resources(&mut self);

    /// Configured counters, in reservation order.
    fn counters(&self) -> &[CounterRecord];
}

/// Result of one profile-API measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiResult {
    /// Counter (index into the counter table) on the source side.
    pub src_index: Option<usize>,
    pub dest_index: Option<usize>,
    /// Last value seen while polling.
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ApiLink {
    Latency(String),
    ByteCount(String),
}

#[derive(Debug)]
struct ActiveCounter {
    handle: CounterHandle,
    link: Option<ApiLink>,
}

/// Backend driving a [`ResourceManager`].
#[derive(Debug)]
pub struct ResourceBackend {
    profile: Arc<ProfileMetadata>,
    resources: Arc<dyn ResourceManager>,
    active: Vec<ActiveCounter>,
    records: Vec<CounterRecord>,
    ports: Vec<PortHandle>,
    pair_broadcasts: HashMap<String, BroadcastHandle>,
    graph_iterator: Option<BroadcastHandle>,
    latency_results: BTreeMap<String, ApiResult>,
    byte_count_results: BTreeMap<String, ApiResult>,
    histograms: [TileHistogram; ModuleType::COUNT],
    summaries: Vec<String>,
}

impl ResourceBackend {
    pub fn new(profile: Arc<ProfileMetadata>, resources: Arc<dyn ResourceManager>) -> Self {
        Self {
            profile,
            resources,
            active: Vec::new(),
            records: Vec::new(),
            ports: Vec::new(),
            pair_broadcasts: HashMap::new(),
            graph_iterator: None,
            latency_results: BTreeMap::new(),
            byte_count_results: BTreeMap::new(),
            histograms: Default::default(),
            summaries: Vec::new(),
        }
    }

    pub fn profile(&self) -> &Arc<ProfileMetadata> {
        &self.profile
    }

    /// `counters per tile -> tiles` for one module.
    pub fn histogram(&self, module: ModuleType) -> &TileHistogram {
        &self.histograms[module.index()]
    }

    /// Per-module reservation summaries, as reported.
    pub fn summaries(&self) -> &[String] {
        &self.summaries
    }

    /// Latency results keyed by source/destination pair key.
    pub fn latency_results(&self) -> &BTreeMap<String, ApiResult> {
        &self.latency_results
    }

    /// Byte-count results keyed by `"(col,row)"`.
    pub fn byte_count_results(&self) -> &BTreeMap<String, ApiResult> {
        &self.byte_count_results
    }

    /// Tiles of a module in configuration order.
    ///
    /// Latency endpoints come first, one per `(col, row, stream)`, so two
    /// endpoints on the same interface tile are both configured.
    fn tile_order(&self, module: ModuleType) -> Vec<(Tile, String)> {
        let config = self.profile.config_metrics(module);
        if module != ModuleType::Shim {
            return config.iter().map(|(t, m)| (t.clone(), m.clone())).collect();
        }

        let mut order = Vec::with_capacity(config.len());
        let mut endpoints = BTreeSet::new();
        for endpoint in self.profile.latency().order() {
            if endpoints.insert(latency_key(endpoint)) {
                order.push((endpoint.clone(), METRIC_LATENCY.to_string()));
            }
        }
        order.extend(
            config
                .iter()
                .filter(|(_, metric)| *metric != METRIC_LATENCY)
                .map(|(t, m)| (t.clone(), m.clone())),
        );
        order
    }

    fn configure_module(&mut self, module: ModuleType) -> Result<bool, BackendError> {
        if self.profile.config_metrics(module).is_empty() {
            return Ok(false);
        }

        let mut histogram = TileHistogram::new();
        for (tile, metric) in self.tile_order(module) {
            if let Some(reserved) = self.configure_tile(module, &tile, &metric)? {
                *histogram.entry(reserved).or_default() += 1;
            }
        }

        if let Some(summary) = histogram_summary(module, &histogram) {
            self.profile
                .sink()
                .info(&format!("AIE profile counters reserved in {}", summary));
            self.summaries.push(summary);
        }
        self.histograms[module.index()] = histogram;
        Ok(true)
    }

    /// Configure one tile. Returns the number of counters reserved, or
    /// `None` when the tile was skipped.
    fn configure_tile(
        &mut self,
        module: ModuleType,
        tile: &Tile,
        metric: &str,
    ) -> Result<Option<usize>, BackendError> {
        if module == ModuleType::Dma && !tile.active_memory {
            return Ok(None);
        }
        // Inactive cores still host the port monitors of paired DMA sets
        if module == ModuleType::Core
            && !tile.active_core
            && pair_module(metric, module).is_none()
        {
            return Ok(None);
        }

        let hw_gen = self.profile.hardware_generation();
        let Some(mut start_events) = event_list(module, metric, hw_gen) else {
            return Ok(None);
        };

        let mut hw_tile = tile.clone();
        hw_tile.col = tile.col.saturating_add(self.profile.partition_start_column());
        let loc = hw_tile.loc();

        let available = self.resources.available_counters(loc, module);
        let count = start_events.len().min(available);
        if count < start_events.len() {
            let dropped: Vec<String> =
                start_events[count..].iter().map(|e| e.to_string()).collect();
            self.profile.sink().warning(&format!(
                "Only {} of {} counters available in {} module of tile {} for metric set {}. Not counting: {}.",
                count,
                start_events.len(),
                module,
                loc,
                metric,
                dropped.join(", ")
            ));
        }

        let api = is_profile_api_metric(metric);
        let threshold = if api {
            let bytes = self.profile.user_specified_threshold(tile, metric);
            if metric == METRIC_BYTE_COUNT {
                self.profile.convert_to_beats(bytes)
            } else {
                bytes
            }
        } else {
            0
        };
        // The second counter is only programmed when a threshold chains it
        let needed = if threshold > 0 { 2 } else { 1 };
        if api && count < needed {
            log::debug!(
                "Metric set {} needs {} counters on tile {}; skipping",
                metric,
                needed,
                loc
            );
            return Ok(None);
        }

        let channels = (
            self.profile.config_channel0().get(tile).copied().unwrap_or(0),
            self.profile.config_channel1().get(tile).copied().unwrap_or(1),
        );
        modify_events(module, tile.subtype, channels.0, &mut start_events, hw_gen);
        let mut end_events = start_events.clone();
        // Port events before they are rewritten to monitor indices
        let mut logical_events = start_events.clone();

        let ports = configure_stream_ports(
            self.resources.as_ref(),
            &hw_tile,
            module,
            metric,
            channels,
            count,
            &mut start_events,
            &mut end_events,
        );
        self.ports.extend(ports);

        if self.profile.use_graph_iterator()
            && self.graph_iterator.is_none()
            && module == ModuleType::Shim
            && supports_graph_iterator(metric)
        {
            match self
                .resources
                .reserve_graph_iterator_event(&[loc], self.profile.start_iteration())
            {
                Ok(broadcast) => self.graph_iterator = Some(broadcast),
                Err(e) => self.profile.sink().warning(&format!(
                    "Graph iterator broadcast is unavailable ({}), graph iteration profiling will not be available.",
                    e
                )),
            }
        }

        let mut resets = [Event::None; 2];
        if api {
            let last = start_events.len() - 1;
            start_events[last] = start_events[0];
            end_events[last] = end_events[0];
            logical_events[last] = logical_events[0];

            if module == ModuleType::Shim {
                resets = match (&self.graph_iterator, self.profile.use_graph_iterator()) {
                    (Some(broadcast), true) => [broadcast.event(); 2],
                    (None, true) => [Event::None; 2],
                    _ => [Event::None, Event::Pl(PlEvent::UserEvent(1))],
                };
            }
        }

        let mut reserved = 0;
        for i in 0..count {
            let start = start_events[i];
            let mut end = end_events[i];
            let logical = logical_events[i];
            let channel = channel_for_port(logical.port_number().unwrap_or(0), channels);

            let configured = if api {
                if i == 0 && threshold > 0 {
                    end = Event::Pl(PlEvent::PerfCnt(1));
                }
                if i == 1 && threshold == 0 {
                    continue;
                }
                let reset = resets.get(i).copied().unwrap_or(Event::None);
                let api_counter = self.configure_api_counter(
                    module, tile, loc, metric, i, start, end, reset, threshold,
                )?;
                match api_counter {
                    Some(configured) => configured,
                    None => continue,
                }
            } else {
                let config = CounterConfig {
                    start,
                    end,
                    reset: Event::None,
                    threshold: 0,
                    mode: CounterMode::Direct,
                };
                match self.start_counter(loc, module, &config) {
                    Ok(handle) => (handle, None),
                    Err(e) => {
                        log::debug!("Counter {} on tile {} not configured: {}", i, loc, e);
                        break;
                    }
                }
            };

            self.record_counter(
                module,
                &hw_tile,
                metric,
                i,
                (start, end),
                logical,
                channel,
                hw_gen,
                configured,
            );
            reserved += 1;
        }

        self.profile.sink().debug(&format!(
            "Reserved {} counters for profiling AIE tile ({},{}) using metric set {}.",
            reserved, loc.col, loc.row, metric
        ));
        Ok(Some(reserved))
    }

    /// Counters of the latency and byte-count metric sets.
    #[allow(clippy::too_many_arguments)]
    fn configure_api_counter(
        &mut self,
        module: ModuleType,
        tile: &Tile,
        loc: TileLoc,
        metric: &str,
        index: usize,
        start: Event,
        end: Event,
        reset: Event,
        threshold: u32,
    ) -> Result<Option<(CounterHandle, Option<ApiLink>)>, BackendError> {
        if module != ModuleType::Shim {
            return Ok(None);
        }
        let next = self.active.len();

        if metric == METRIC_LATENCY && index == 0 {
            let Some(pair) = self.profile.latency().config_for(tile) else {
                return Ok(None);
            };
            let is_source = pair.is_source;
            let shift = self.profile.partition_start_column();
            let src = TileLoc::new(pair.src.col.saturating_add(shift), pair.src.row);
            let dest = TileLoc::new(pair.dest.col.saturating_add(shift), pair.dest.row);
            let key = self
                .profile
                .latency()
                .src_dest_pair_key(tile.col, tile.row, tile.stream_id(0))?
                .to_string();

            let Some(broadcast) = self.pair_broadcast(&key, &[src, dest]) else {
                return Ok(None);
            };
            let start = if is_source {
                Event::Pl(PlEvent::UserEvent(0))
            } else {
                broadcast.event()
            };
            let config = CounterConfig {
                start,
                end,
                reset: Event::None,
                threshold: 0,
                mode: CounterMode::Direct,
            };
            let Some(handle) = self.start_api_counter(loc, module, index, &config) else {
                return Ok(None);
            };

            let result = self.latency_results.entry(key.clone()).or_default();
            if is_source {
                result.src_index = Some(next);
            } else {
                result.dest_index = Some(next);
            }
            return Ok(Some((handle, Some(ApiLink::Latency(key)))));
        }

        if metric == METRIC_BYTE_COUNT && index == 0 {
            let config = CounterConfig {
                start,
                end,
                reset,
                threshold: 0,
                mode: CounterMode::ComboFsm,
            };
            let Some(handle) = self.start_api_counter(loc, module, index, &config) else {
                return Ok(None);
            };
            let key = format!("({},{})", tile.col, tile.row);
            self.byte_count_results.entry(key.clone()).or_default().src_index = Some(next);
            return Ok(Some((handle, Some(ApiLink::ByteCount(key)))));
        }

        let config = CounterConfig {
            start,
            end,
            reset,
            threshold,
            mode: CounterMode::Direct,
        };
        let Some(handle) = self.start_api_counter(loc, module, index, &config) else {
            return Ok(None);
        };
        let link = match metric {
            METRIC_LATENCY => self
                .profile
                .latency()
                .src_dest_pair_key(tile.col, tile.row, tile.stream_id(0))
                .ok()
                .map(|key| ApiLink::Latency(key.to_string())),
            _ => Some(ApiLink::ByteCount(format!("({},{})", tile.col, tile.row))),
        };
        Ok(Some((handle, link)))
    }

    /// Broadcast channel shared by both ends of a latency pair.
    fn pair_broadcast(&mut self, key: &str, tiles: &[TileLoc]) -> Option<BroadcastHandle> {
        if let Some(broadcast) = self.pair_broadcasts.get(key) {
            return Some(broadcast.clone());
        }
        match self.resources.reserve_broadcast(tiles) {
            Ok(broadcast) => {
                self.pair_broadcasts.insert(key.to_string(), broadcast.clone());
                Some(broadcast)
            }
            Err(e) => {
                log::debug!("No broadcast channel for latency pair {}: {}", key, e);
                None
            }
        }
    }

    fn start_counter(
        &self,
        loc: TileLoc,
        module: ModuleType,
        config: &CounterConfig,
    ) -> Result<CounterHandle, ResourceError> {
        let handle = self.resources.reserve_counter(loc, module)?;
        let started = self
            .resources
            .configure_counter(&handle, config)
            .and_then(|()| self.resources.start_counter(&handle));
        if let Err(e) = started {
            if let Err(release) = self.resources.release_counter(&handle) {
                log::debug!("Releasing counter {:?} failed: {}", handle, release);
            }
            return Err(e);
        }
        Ok(handle)
    }

    fn start_api_counter(
        &self,
        loc: TileLoc,
        module: ModuleType,
        index: usize,
        config: &CounterConfig,
    ) -> Option<CounterHandle> {
        match self.start_counter(loc, module, config) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::debug!("Counter {} on tile {} not configured: {}", index, loc, e);
                None
            }
        }
    }

    fn physical_id(&self, module: ModuleType, event: Event) -> u16 {
        let id = self.resources.physical_event(module, event).unwrap_or_else(|e| {
            log::debug!("No physical id for {}: {}", event, e);
            0
        });
        id + counter_base(module)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_counter(
        &mut self,
        module: ModuleType,
        hw_tile: &Tile,
        metric: &str,
        index: usize,
        (start, end): (Event, Event),
        logical: Event,
        channel: u8,
        hw_gen: u8,
        (handle, link): (CounterHandle, Option<ApiLink>),
    ) {
        let (start_event, end_event) = match reserved_event_id(metric) {
            Some(id) => (id, id),
            None => (self.physical_id(module, start), self.physical_id(module, end)),
        };

        let payload = counter_payload(
            self.resources.as_ref(),
            hw_tile,
            module,
            metric,
            logical,
            channel,
            hw_gen,
        )
        .unwrap_or_else(|e| {
            log::debug!("Payload for tile {} unavailable: {}", hw_tile, e);
            0
        });

        let counter_id = self.records.len() as u32;
        self.records.push(CounterRecord {
            counter_id,
            column: hw_tile.col,
            row: hw_tile.row,
            counter_number: index as u8,
            start_event,
            end_event,
            reset_event: 0,
            payload,
            clock_freq_mhz: self.profile.clock_freq_mhz(),
            module_name: module.name().to_string(),
            counter_name: format!("AIE Counter {}", counter_id),
        });
        self.active.push(ActiveCounter { handle, link });
    }

    fn read(&self, index: usize) -> Option<u64> {
        let handle = self.active.get(index)?.handle;
        match self.resources.read_counter(&handle) {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Reading counter {:?} failed: {}", handle, e);
                None
            }
        }
    }

    fn read_linked(&mut self, index: usize) -> Option<u64> {
        match self.active.get(index)?.link.clone() {
            None => self.read(index),
            Some(ApiLink::Latency(key)) => {
                let result = *self.latency_results.get(&key)?;
                let src = self.read(result.src_index?)?;
                let dest = self.read(result.dest_index?)?;
                let value = src.abs_diff(dest);
                if let Some(stored) = self.latency_results.get_mut(&key) {
                    stored.value = value;
                }
                Some(value)
            }
            Some(ApiLink::ByteCount(key)) => {
                let result = *self.byte_count_results.get(&key)?;
                let value = self.read(result.src_index?)?;
                if let Some(stored) = self.byte_count_results.get_mut(&key) {
                    stored.value = value;
                }
                Some(value)
            }
        }
    }

    fn display_api_results(&self) {
        let sink = self.profile.sink();
        for (key, result) in &self.byte_count_results {
            sink.info(&format!(
                "Total start to bytes transferred for tile {} is {} clock cycles for specified bytes.",
                key, result.value
            ));
        }
        for (key, result) in &self.latency_results {
            let Ok(ports) = self.profile.latency().src_dest_graph_pair(key) else {
                continue;
            };
            sink.info(&format!(
                "Total latency between specified first beat of {}:{} to first beat of {}:{} is {} clock cycles.",
                ports.src_graph, ports.src_port, ports.dest_graph, ports.dest_port, result.value
            ));
        }
    }
}

impl ProfileBackend for ResourceBackend {
    fn update_device(&mut self) -> Result<bool, BackendError> {
        if self.profile.is_empty() {
            self.profile.sink().warning(
                "AIE Profile Counters were not found for this design. Please specify tile_based_[aie|aie_memory|interface_tile]_metrics under \"AIE_profile_settings\" section in your xrt.ini.",
            );
            return Ok(false);
        }

        let mut configured = false;
        for module in ModuleType::ALL {
            configured |= self.configure_module(module)?;
        }
        log::info!(
            "Configured {} AIE profile counters on {}",
            self.records.len(),
            self.profile.arch().name()
        );
        Ok(configured)
    }

    fn poll(&mut self) -> Vec<AieSample> {
        let row_start = self.profile.aie_tile_row_offset();
        let mut samples = Vec::with_capacity(self.active.len());
        let mut timer_tile: Option<TileLoc> = None;
        let mut timer = 0;

        for index in 0..self.active.len() {
            let Some(value) = self.read_linked(index) else {
                continue;
            };
            let record = &self.records[index];
            let loc = TileLoc::new(record.column, record.row);

            if timer_tile != Some(loc) {
                timer_tile = Some(loc);
                let module = ModuleType::from_row(loc.row, row_start);
                timer = self.resources.read_timer(loc, module).unwrap_or_else(|e| {
                    log::debug!("Timer read on tile {} failed: {}", loc, e);
                    timer
                });
            }

            samples.push(AieSample {
                timestamp_ms: now_ms(),
                values: [
                    u64::from(record.column),
                    u64::from(relative_row(record.row, row_start)),
                    u64::from(record.start_event),
                    u64::from(record.end_event),
                    u64::from(record.reset_event),
                    value,
                    timer,
                    record.payload,
                ],
            });
        }
        samples
    }

    fn free_resources(&mut self) {
        self.display_api_results();

        for counter in self.active.drain(..) {
            let stopped = self
                .resources
                .stop_counter(&counter.handle)
                .and_then(|()| self.resources.release_counter(&counter.handle));
            if let Err(e) = stopped {
                log::debug!("Releasing counter {:?} failed: {}", counter.handle, e);
            }
        }
        for port in self.ports.drain(..) {
            if let Err(e) = self.resources.release_stream_port(&port) {
                log::debug!("Releasing port monitor {:?} failed: {}", port, e);
            }
        }
        let broadcasts = self
            .pair_broadcasts
            .drain()
            .map(|(_, b)| b)
            .chain(self.graph_iterator.take());
        for broadcast in broadcasts {
            if let Err(e) = self.resources.release_broadcast(&broadcast) {
                log::debug!("Releasing broadcast {} failed: {}", broadcast.channel, e);
            }
        }
    }

    fn counters(&self) -> &[CounterRecord] {
        &self.records
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{arch_for_generation, SimulatedDevice};
    use crate::message::{RecordingSink, Severity};
    use crate::metadata::static_metadata::tests::fixture;
    use crate::metrics::{MemoryEvent, LATENCY_EVENT_ID};
    use crate::settings::ProfileSettings;

    struct Harness {
        backend: ResourceBackend,
        device: Arc<SimulatedDevice>,
        sink: Arc<RecordingSink>,
    }

    fn harness(settings: ProfileSettings) -> Harness {
        harness_with(settings, |_| {})
    }

    fn harness_with(settings: ProfileSettings, setup: impl FnOnce(&SimulatedDevice)) -> Harness {
        let sink = Arc::new(RecordingSink::new());
        let profile = ProfileMetadata::new(Arc::new(fixture()), &settings, sink.clone());
        let device = Arc::new(SimulatedDevice::new(arch_for_generation(2)));
        setup(&device);
        let backend = ResourceBackend::new(Arc::new(profile), device.clone());
        Harness {
            backend,
            device,
            sink,
        }
    }

    fn settings(key: &str, value: &str) -> ProfileSettings {
        ProfileSettings::default().with(key, value)
    }

    #[test]
    fn test_nothing_configured_warns() {
        let mut h = harness(ProfileSettings::default());
        assert!(!h.backend.update_device().unwrap());
        assert_eq!(h.sink.count_containing(Severity::Warning, "were not found"), 1);
        assert!(h.backend.counters().is_empty());
    }

    #[test]
    fn test_heat_map_reserves_four_counters() {
        let mut h = harness(settings("tile_based_aie_metrics", "{1,1}:heat_map"));
        assert!(h.backend.update_device().unwrap());

        let counters = h.backend.counters();
        assert_eq!(counters.len(), 4);
        assert!(counters.iter().all(|c| (c.column, c.row) == (1, 3)));
        assert_eq!(counters[0].counter_name, "AIE Counter 0");
        assert_eq!(counters[3].counter_number, 3);
        assert_eq!(counters[0].module_name, "aie");
        assert_eq!(counters[0].start_event, 28);
        assert_eq!(h.device.running_counters(), 4);

        assert_eq!(h.backend.histogram(ModuleType::Core).get(&4), Some(&1));
        assert_eq!(
            h.sink.count_containing(Severity::Info, "AIE profile counters reserved in aie - 4: 1 tiles"),
            1
        );
        assert_eq!(h.sink.count_containing(Severity::Debug, "Reserved 4 counters"), 1);
    }

    #[test]
    fn test_truncated_to_available_counters() {
        let mut h = harness_with(settings("tile_based_aie_metrics", "{1,1}:stalls"), |dev| {
            dev.set_counter_capacity(TileLoc::new(1, 3), ModuleType::Core, 2);
        });
        h.backend.update_device().unwrap();

        assert_eq!(h.backend.counters().len(), 2);
        let warnings = h.sink.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Only 2 of 4"));
        assert!(warnings[0].contains("LockStall_CORE"));
    }

    #[test]
    fn test_reservation_failure_stops_only_that_tile() {
        let mut h = harness_with(settings("tile_based_aie_metrics", "all:heat_map"), |dev| {
            dev.set_reserve_limit(TileLoc::new(0, 2), ModuleType::Core, 1);
        });
        h.backend.update_device().unwrap();

        let hist = h.backend.histogram(ModuleType::Core);
        assert_eq!(hist.get(&1), Some(&1));
        // (1,2) (1,3) (3,5) fully configured; (2,2) has no active core
        assert_eq!(hist.get(&4), Some(&3));
        assert_eq!(h.backend.counters().len(), 13);
    }

    #[test]
    fn test_start_failure_releases_counter() {
        let mut h = harness_with(settings("tile_based_aie_metrics", "{1,1}:heat_map"), |dev| {
            dev.fail_starts(TileLoc::new(1, 3), ModuleType::Core);
        });
        h.backend.update_device().unwrap();
        assert!(h.backend.counters().is_empty());
        assert!(h.device.reserved_counters().is_empty());
        assert_eq!(h.backend.histogram(ModuleType::Core).get(&0), Some(&1));
    }

    #[test]
    fn test_inactive_memory_module_skipped() {
        // (1,3) runs a core but its memory module is unused
        let mut h = harness(settings("tile_based_aie_memory_metrics", "all:conflicts"));
        h.backend.update_device().unwrap();
        let tiles: Vec<_> = h.backend.counters().iter().map(|c| (c.column, c.row)).collect();
        assert!(!tiles.contains(&(1, 3)));
        assert!(tiles.contains(&(2, 2)));
        assert!(h.backend.counters().iter().all(|c| c.start_event >= 128));
    }

    #[test]
    fn test_interface_ports_and_payload() {
        let mut h = harness(settings("tile_based_interface_tile_metrics", "0:packets"));
        h.backend.update_device().unwrap();

        let ports = h.device.reserved_ports();
        assert_eq!(ports.len(), 2);
        assert_eq!((ports[0].1.id, ports[0].1.is_master), (3, false));
        assert_eq!((ports[1].1.id, ports[1].1.is_master), (5, true));

        let payloads: Vec<_> = h.backend.counters().iter().map(|c| c.payload).collect();
        assert_eq!(payloads, vec![3, (1 << 8) | 5]);
    }

    #[test]
    fn test_partition_column_shift() {
        let toml = format!(
            "partition_start_columns = [4]\n{}",
            crate::metadata::static_metadata::tests::FIXTURE
        );
        let metadata = crate::metadata::StaticMetadata::from_toml_str(&toml).unwrap();
        let sink = Arc::new(RecordingSink::new());
        let settings = settings("tile_based_aie_metrics", "{1,1}:heat_map");
        let profile = Arc::new(ProfileMetadata::new(Arc::new(metadata), &settings, sink));
        let device = Arc::new(SimulatedDevice::new(arch_for_generation(2)));
        let mut backend = ResourceBackend::new(profile, device.clone());

        backend.update_device().unwrap();
        assert!(backend.counters().iter().all(|c| c.column == 5));
        assert!(device.reserved_counters().iter().all(|h| h.tile == TileLoc::new(5, 3)));
    }

    #[test]
    fn test_poll_reads_values_and_timer() {
        let mut h = harness(settings("tile_based_aie_metrics", "{1,1}:heat_map"));
        h.backend.update_device().unwrap();
        let tile = TileLoc::new(1, 3);
        h.device.set_counter_value(tile, ModuleType::Core, 2, 77);
        h.device.set_timer(tile, 9000);

        let samples = h.backend.poll();
        assert_eq!(samples.len(), 4);
        let s = &samples[2];
        assert_eq!(&s.values[..2], &[1, 1]);
        assert_eq!(s.counter_value(), 77);
        assert_eq!(s.values[6], 9000);
        assert_eq!(s.values[4], 0);
    }

    #[test]
    fn test_free_releases_everything() {
        let mut h = harness(settings("tile_based_interface_tile_metrics", "all:packets"));
        h.backend.update_device().unwrap();
        assert!(!h.device.reserved_counters().is_empty());

        h.backend.free_resources();
        assert!(h.device.reserved_counters().is_empty());
        assert!(h.device.reserved_ports().is_empty());
        assert!(h.backend.poll().is_empty());
        // Table survives for writers
        assert!(!h.backend.counters().is_empty());
    }

    #[test]
    fn test_latency_pair_reports_difference() {
        let mut h = harness(settings("interface_tile_latency_metrics", "gr:in0:other:gm0:5"));
        assert!(h.backend.update_device().unwrap());

        let counters = h.backend.counters();
        // Destination (col 2) configured before source (col 0)
        assert_eq!(counters[0].column, 2);
        assert!(counters.iter().all(|c| c.start_event == LATENCY_EVENT_ID));
        assert_eq!(h.device.reserved_broadcasts(), 1);

        let dest_counter = h
            .device
            .reserved_counters()
            .into_iter()
            .find(|c| c.tile == TileLoc::new(2, 0) && c.index == 0)
            .unwrap();
        let dest_config = h.device.counter_config(&dest_counter).unwrap();
        assert!(matches!(dest_config.start, Event::Pl(PlEvent::Broadcast(_))));

        h.device.set_counter_value(TileLoc::new(0, 0), ModuleType::Shim, 0, 100);
        h.device.set_counter_value(TileLoc::new(2, 0), ModuleType::Shim, 0, 340);
        let samples = h.backend.poll();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.counter_value() == 240));

        let result = h.backend.latency_results().values().next().copied().unwrap();
        assert_eq!(result.value, 240);
        assert!(result.src_index.is_some() && result.dest_index.is_some());

        h.backend.free_resources();
        assert_eq!(
            h.sink.count_containing(
                Severity::Info,
                "Total latency between specified first beat of gr:in0 to first beat of other:gm0 is 240 clock cycles."
            ),
            1
        );
        assert_eq!(h.device.reserved_broadcasts(), 0);
    }

    #[test]
    fn test_latency_pair_on_one_column() {
        let mut h = harness(settings("interface_tile_latency_metrics", "gr:in0:gr:out0"));
        assert!(h.backend.update_device().unwrap());

        // Without a transaction count each endpoint needs a single counter
        let counters = h.backend.counters();
        assert_eq!(counters.len(), 2);
        assert!(counters.iter().all(|c| (c.column, c.row) == (0, 0)));
        let payloads: Vec<_> = counters.iter().map(|c| c.payload).collect();
        assert_eq!(payloads, vec![(1 << 8) | 5, 3]);
        assert_eq!(h.backend.histogram(ModuleType::Shim).get(&1), Some(&2));

        let selected: Vec<_> = h
            .device
            .reserved_ports()
            .iter()
            .map(|(_, s)| (s.id, s.is_master))
            .collect();
        assert_eq!(selected, vec![(5, true), (3, false)]);

        let result = h.backend.latency_results()["src(0,0,3):dest(0,0,5)"];
        assert_eq!((result.src_index, result.dest_index), (Some(1), Some(0)));

        h.device.set_counter_value(TileLoc::new(0, 0), ModuleType::Shim, 0, 90);
        h.device.set_counter_value(TileLoc::new(0, 0), ModuleType::Shim, 1, 30);
        let samples = h.backend.poll();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.counter_value() == 60));
    }

    #[test]
    fn test_api_start_failure_is_skipped() {
        let mut h = harness_with(
            settings("graph_based_interface_tile_metrics", "gr:in0:start_to_bytes_transferred:64"),
            |dev| dev.fail_starts(TileLoc::new(0, 0), ModuleType::Shim),
        );
        h.backend.update_device().unwrap();
        assert!(h.backend.counters().is_empty());
        assert!(h.device.reserved_counters().is_empty());
        assert_eq!(h.backend.histogram(ModuleType::Shim).get(&0), Some(&1));
    }

    #[test]
    fn test_byte_count_threshold_chains_counters() {
        let mut h = harness(settings(
            "graph_based_interface_tile_metrics",
            "gr:in0:start_to_bytes_transferred:64",
        ));
        h.backend.update_device().unwrap();

        let handles = h.device.reserved_counters();
        assert_eq!(handles.len(), 2);
        let first = h.device.counter_config(&handles[0]).unwrap();
        assert_eq!(first.mode, CounterMode::ComboFsm);
        assert_eq!(first.end, Event::Pl(PlEvent::PerfCnt(1)));
        assert_eq!(first.reset, Event::None);

        let second = h.device.counter_config(&handles[1]).unwrap();
        assert_eq!(second.threshold, 16);
        assert_eq!(second.reset, Event::Pl(PlEvent::UserEvent(1)));

        h.device.set_counter_value(TileLoc::new(0, 0), ModuleType::Shim, 0, 512);
        assert!(h.backend.poll().iter().all(|s| s.counter_value() == 512));
        h.backend.free_resources();
        assert_eq!(
            h.sink.count_containing(Severity::Info, "for tile (0,0) is 512 clock cycles"),
            1
        );
    }

    #[test]
    fn test_byte_count_without_threshold_uses_one_counter() {
        let mut h = harness(settings(
            "graph_based_interface_tile_metrics",
            "gr:in0:start_to_bytes_transferred:2",
        ));
        h.backend.update_device().unwrap();
        // 2 bytes is less than one beat
        assert_eq!(h.backend.counters().len(), 1);
        assert_eq!(h.backend.histogram(ModuleType::Shim).get(&1), Some(&1));
    }

    #[test]
    fn test_graph_iterator_reset_event() {
        let settings = ProfileSettings::default()
            .with("graph_based_interface_tile_metrics", "gr:in0:start_to_bytes_transferred:64")
            .with("start_type", "iteration")
            .with("start_iteration", "3");
        let mut h = harness(settings);
        h.backend.update_device().unwrap();

        assert_eq!(h.device.reserved_broadcasts(), 1);
        let handles = h.device.reserved_counters();
        let first = h.device.counter_config(&handles[0]).unwrap();
        assert!(matches!(first.reset, Event::Pl(PlEvent::Broadcast(_))));
    }

    #[test]
    fn test_profile_api_needs_two_counters() {
        let mut h = harness_with(
            settings("graph_based_interface_tile_metrics", "gr:in0:start_to_bytes_transferred:64"),
            |dev| dev.set_counter_capacity(TileLoc::new(0, 0), ModuleType::Shim, 1),
        );
        h.backend.update_device().unwrap();
        assert!(h.backend.counters().is_empty());
        assert!(h.backend.histogram(ModuleType::Shim).is_empty());
    }

    #[test]
    fn test_dma_channel_events() {
        let mut h = harness(settings("tile_based_aie_memory_metrics", "{2,0}:dma_stalls_s2mm:1"));
        h.backend.update_device().unwrap();
        let handles = h.device.reserved_counters();
        let config = h.device.counter_config(&handles[0]).unwrap();
        assert_eq!(config.start, Event::Memory(MemoryEvent::S2mmStalledLock(1)));
    }
}
