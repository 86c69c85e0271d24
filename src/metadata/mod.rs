//! Application metadata boundary.
//!
//! The profiler never reads compiled application metadata directly. It asks a
//! [`MetadataReader`] which tiles a graph, kernel, buffer or port maps to, and
//! what the device looks like. [`StaticMetadata`] is a TOML-backed reader used
//! by the binary and the tests.
//!
//! # Coordinate Space
//!
//! Readers report tiles with absolute rows:
//!
//! ```text
//! metadata row (relative)      reported row (absolute)
//! -----------------------      -----------------------
//! AIE tile row r          ->   r + aie_tile_row_offset
//! memory tile row r       ->   r + 1
//! interface tile          ->   0
//! ```

pub mod static_metadata;

pub use static_metadata::StaticMetadata;

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::device::{ModuleType, Tile};

/// Errors loading a metadata description.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid metadata: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("inconsistent metadata: {0}")]
    Invalid(String),
}

/// Array geometry reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub hw_gen: u8,
    pub num_rows: u8,
    pub num_columns: u8,
    pub mem_row_start: u8,
    pub mem_num_rows: u8,
    pub aie_tile_row_start: u8,
    pub aie_tile_num_rows: u8,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            hw_gen: 2,
            num_rows: 6,
            num_columns: 4,
            mem_row_start: 1,
            mem_num_rows: 1,
            aie_tile_row_start: 2,
            aie_tile_num_rows: 4,
        }
    }
}

/// Filters for interface tile lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceQuery {
    /// Only IOs using this stream id (PLIO) or channel/stream id (GMIO).
    pub channel_id: Option<u8>,
    /// Only IOs on shim columns in this inclusive range; graph names are
    /// ignored when set.
    pub columns: Option<(u8, u8)>,
}

impl InterfaceQuery {
    pub fn with_channel(channel_id: u8) -> Self {
        Self {
            channel_id: Some(channel_id),
            columns: None,
        }
    }

    pub fn with_columns(min_col: u8, max_col: u8) -> Self {
        Self {
            channel_id: None,
            columns: Some((min_col, max_col)),
        }
    }
}

/// Resolves application names to tiles.
///
/// Unknown names yield empty results, never errors; callers decide whether to
/// warn or fall back.
pub trait MetadataReader: Send + Sync + std::fmt::Debug {
    fn hardware_generation(&self) -> u8;

    /// First AIE tile row (offset applied to relative AIE rows).
    fn aie_tile_row_offset(&self) -> u8;

    fn driver_config(&self) -> DriverConfig;

    fn clock_freq_mhz(&self) -> f64;

    /// First column of each partition overlay.
    fn partition_start_columns(&self) -> Vec<u8>;

    fn valid_graphs(&self) -> BTreeSet<String>;

    /// Kernel function names (every `.`-separated component).
    fn valid_kernels(&self) -> BTreeSet<String>;

    fn valid_buffers(&self) -> BTreeSet<String>;

    /// Port names and logical names of all IOs.
    fn valid_ports(&self) -> BTreeSet<String>;

    /// AIE or memory tiles used by `graph` and kernel/buffer `name`.
    ///
    /// `"all"` matches every graph or name.
    fn tiles(&self, graph: &str, module: ModuleType, name: &str) -> Vec<Tile>;

    /// Interface tiles carrying IOs of `graph`/`port` with the direction
    /// required by `metric`.
    fn interface_tiles(
        &self,
        graph: &str,
        port: &str,
        metric: &str,
        query: InterfaceQuery,
    ) -> Vec<Tile>;

    /// Microcontroller tiles, optionally limited to a column range.
    fn microcontrollers(&self, columns: Option<(u8, u8)>) -> Vec<Tile>;
}
