//! Profiling metadata for one device session.
//!
//! [`ProfileMetadata`] turns the user's settings into one configuration map
//! per module type (`tile -> metric set`), plus the side tables the counter
//! backend needs: channel selections, byte thresholds, latency pairs and
//! complementary-pair records.
//!
//! # Resolution Order
//!
//! ```text
//! settings.check()          unknown / deprecated keys
//!   |
//!   +-- core      graph passes -> tile passes -> validate -> pair -> drop "off"
//!   +-- dma       (same, keeping pairs forced by core)
//!   +-- shim      graph passes -> tile passes -> validate -> latency pairs
//!   +-- mem_tile  (same as core, generation 2+)
//!   +-- uc        tile passes -> validate (generation 5+)
//! ```
//!
//! Within one module every later pass overwrites earlier ones for the same
//! tile, so specific settings override general ones.
//!
//! Once built, a `ProfileMetadata` is never mutated again and can be shared
//! with the polling thread behind an `Arc`.

pub mod interface;
pub mod latency;
pub mod threshold;
pub mod tiles;

pub use latency::{latency_key, GraphPortPair, LatencyConfig, LatencyError, LatencyKey, LatencyPairs};
pub use threshold::{process_user_specified_bytes, DEFAULT_NUM_BYTES};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::device::{arch_for_generation, ArchConfig, ModuleType, Tile};
use crate::message::MessageSink;
use crate::metadata::MetadataReader;
use crate::settings::{parse_settings, ProfileSettings, StartType};

/// Resolved profiling configuration of one device.
#[derive(Debug)]
pub struct ProfileMetadata {
    metadata: Arc<dyn MetadataReader>,
    sink: Arc<dyn MessageSink>,
    arch: Arc<dyn ArchConfig>,
    polling_interval_us: u64,
    start_type: StartType,
    start_iteration: u32,
    config_metrics: [BTreeMap<Tile, String>; ModuleType::COUNT],
    config_channel0: BTreeMap<Tile, u8>,
    config_channel1: BTreeMap<Tile, u8>,
    bytes_to_transfer: BTreeMap<Tile, u32>,
    pair_config_metrics: BTreeMap<Tile, String>,
    latency: LatencyPairs,
}

impl ProfileMetadata {
    /// Resolve `settings` against the application described by `metadata`.
    ///
    /// Problems in the settings are reported to `sink` and never fail the
    /// construction.
    pub fn new(
        metadata: Arc<dyn MetadataReader>,
        settings: &ProfileSettings,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        settings.check(sink.as_ref());

        let arch = arch_for_generation(metadata.hardware_generation());
        let mut profile = Self {
            polling_interval_us: settings.interval_us(sink.as_ref()),
            start_type: settings.start_type(sink.as_ref()),
            start_iteration: settings.start_iteration(),
            metadata,
            sink,
            arch,
            config_metrics: Default::default(),
            config_channel0: BTreeMap::new(),
            config_channel1: BTreeMap::new(),
            bytes_to_transfer: BTreeMap::new(),
            pair_config_metrics: BTreeMap::new(),
            latency: LatencyPairs::default(),
        };
        profile.resolve(settings);
        profile
    }

    fn resolve(&mut self, settings: &ProfileSettings) {
        for module in ModuleType::ALL {
            let tile_settings = parse_settings(&settings.tile_based_metrics(module));
            let graph_settings = parse_settings(&settings.graph_based_metrics(module));

            match module {
                ModuleType::Shim => {
                    self.config_metrics_for_interface_tiles(&tile_settings, &graph_settings);
                    let latency = parse_settings(&settings.latency_metrics());
                    self.config_metrics_for_latency(&latency);
                }
                ModuleType::Uc => self.config_metrics_for_microcontrollers(&tile_settings),
                _ => self.config_metrics_for_tiles(module, &tile_settings, &graph_settings),
            }
        }

        let configured: usize = self.config_metrics.iter().map(BTreeMap::len).sum();
        log::debug!(
            "Resolved AIE profile settings for {} tile modules on {}",
            configured,
            self.arch.name()
        );
    }

    /// Final `tile -> metric set` map of a module.
    pub fn config_metrics(&self, module: ModuleType) -> &BTreeMap<Tile, String> {
        &self.config_metrics[module.index()]
    }

    /// True when no module has anything to profile.
    pub fn is_empty(&self) -> bool {
        self.config_metrics.iter().all(BTreeMap::is_empty)
    }

    pub fn config_channel0(&self) -> &BTreeMap<Tile, u8> {
        &self.config_channel0
    }

    pub fn config_channel1(&self) -> &BTreeMap<Tile, u8> {
        &self.config_channel1
    }

    /// Metric sets forced onto a tile by core/memory pairing.
    pub fn pair_config_metrics(&self) -> &BTreeMap<Tile, String> {
        &self.pair_config_metrics
    }

    pub fn latency(&self) -> &LatencyPairs {
        &self.latency
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataReader> {
        &self.metadata
    }

    pub fn sink(&self) -> &Arc<dyn MessageSink> {
        &self.sink
    }

    pub fn arch(&self) -> &Arc<dyn ArchConfig> {
        &self.arch
    }

    pub fn hardware_generation(&self) -> u8 {
        self.metadata.hardware_generation()
    }

    pub fn aie_tile_row_offset(&self) -> u8 {
        self.metadata.aie_tile_row_offset()
    }

    pub fn clock_freq_mhz(&self) -> f64 {
        self.metadata.clock_freq_mhz()
    }

    /// First column of the partition the application runs in.
    pub fn partition_start_column(&self) -> u8 {
        self.metadata
            .partition_start_columns()
            .first()
            .copied()
            .unwrap_or(0)
    }

    pub fn polling_interval_us(&self) -> u64 {
        self.polling_interval_us
    }

    pub fn start_type(&self) -> StartType {
        self.start_type
    }

    pub fn start_iteration(&self) -> u32 {
        self.start_iteration
    }

    /// Deferred start on a graph iteration was requested.
    pub fn use_graph_iterator(&self) -> bool {
        self.start_type == StartType::Iteration
    }

    fn map_mut(&mut self, module: ModuleType) -> &mut BTreeMap<Tile, String> {
        &mut self.config_metrics[module.index()]
    }

    /// Give each tile `metric`. The stored key is replaced as well, so the
    /// stream and IO attributes always come from the latest assignment.
    fn assign_metric<'a>(
        &mut self,
        module: ModuleType,
        tiles: impl IntoIterator<Item = &'a Tile>,
        metric: &str,
    ) {
        let map = self.map_mut(module);
        for tile in tiles {
            map.remove(tile);
            map.insert(tile.clone(), metric.to_string());
        }
    }

    fn set_channels<'a>(&mut self, tiles: impl IntoIterator<Item = &'a Tile>, channels: (u8, u8)) {
        for tile in tiles {
            self.config_channel0.insert(tile.clone(), channels.0);
            self.config_channel1.insert(tile.clone(), channels.1);
        }
    }
}
