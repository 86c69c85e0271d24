//! TOML-backed application metadata.
//!
//! # File Format
//!
//! ```toml
//! clock_freq_mhz = 1250.0
//! partition_start_columns = [0]
//!
//! [driver_config]
//! hw_gen = 2
//! aie_tile_row_start = 2
//!
//! [[graphs]]
//! name = "mygraph"
//! core_tiles = [[0, 0], [1, 0]]   # relative (col, row)
//! dma_tiles = [[0, 0], [1, 1]]
//!
//! [[kernels]]
//! graph = "mygraph"
//! function = "mygraph.k0"
//! column = 0
//! row = 0
//!
//! [[buffers]]
//! graph = "mygraph"
//! name = "buf0"
//! column = 1
//! row = 0
//!
//! [[ios]]
//! name = "mygraph.in0"
//! logical_name = "in0"
//! type = "plio"
//! master = false
//! shim_column = 0
//! stream_id = 3
//! channel = 0
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{DriverConfig, InterfaceQuery, MetadataError, MetadataReader};
use crate::device::{IoType, ModuleType, Tile};
use crate::metrics;

/// Core and DMA usage of one graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphEntry {
    pub name: String,
    /// Tiles whose core runs graph code (relative rows).
    pub core_tiles: Vec<[u8; 2]>,
    /// Tiles whose memory module is used by the graph (relative rows).
    pub dma_tiles: Vec<[u8; 2]>,
}

/// Kernel placed on an AIE tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelEntry {
    pub graph: String,
    pub function: String,
    pub column: u8,
    pub row: u8,
}

/// Shared buffer placed on a memory tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferEntry {
    pub graph: String,
    pub name: String,
    pub column: u8,
    pub row: u8,
}

/// PLIO or GMIO endpoint on an interface tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoEntry {
    /// Full name, `graph.port`.
    pub name: String,
    #[serde(default)]
    pub logical_name: String,
    #[serde(rename = "type", default)]
    pub io_type: IoType,
    /// Data leaves the array through this port.
    #[serde(default)]
    pub master: bool,
    pub shim_column: u8,
    #[serde(default)]
    pub stream_id: u8,
    #[serde(default)]
    pub channel: u8,
}

impl IoEntry {
    fn graph(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(g, _)| g)
    }

    fn port(&self) -> &str {
        self.name.rsplit_once('.').map_or(self.name.as_str(), |(_, p)| p)
    }
}

/// Metadata described by a TOML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMetadata {
    pub driver_config: DriverConfig,
    pub clock_freq_mhz: f64,
    pub partition_start_columns: Vec<u8>,
    pub graphs: Vec<GraphEntry>,
    pub kernels: Vec<KernelEntry>,
    pub buffers: Vec<BufferEntry>,
    pub ios: Vec<IoEntry>,
}

impl Default for StaticMetadata {
    fn default() -> Self {
        Self {
            driver_config: DriverConfig::default(),
            clock_freq_mhz: 1250.0,
            partition_start_columns: vec![0],
            graphs: Vec::new(),
            kernels: Vec::new(),
            buffers: Vec::new(),
            ios: Vec::new(),
        }
    }
}

/// Requested graph name matches a metadata graph name.
///
/// Either may be a prefix path of the other (`"g"` vs `"g.sub"`).
fn graph_matches(requested: &str, actual: &str) -> bool {
    requested == "all" || actual.contains(requested) || requested.contains(actual)
}

impl StaticMetadata {
    /// Parse and validate metadata from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, MetadataError> {
        let metadata: Self = toml::from_str(content)?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = Self::from_toml_str(&content)?;
        log::info!(
            "Loaded AIE metadata from {} ({} graphs, {} IOs)",
            path.display(),
            metadata.graphs.len(),
            metadata.ios.len()
        );
        Ok(metadata)
    }

    fn validate(&self) -> Result<(), MetadataError> {
        let cfg = &self.driver_config;
        if cfg.aie_tile_row_start == 0 {
            return Err(MetadataError::Invalid(
                "aie_tile_row_start must be at least 1".to_string(),
            ));
        }
        if cfg.hw_gen == 1 && !self.buffers.is_empty() {
            return Err(MetadataError::Invalid(
                "first-generation devices have no memory tiles".to_string(),
            ));
        }
        if let Some(io) = self.ios.iter().find(|io| io.shim_column >= cfg.num_columns) {
            return Err(MetadataError::Invalid(format!(
                "IO {} uses column {} outside {} columns",
                io.name, io.shim_column, cfg.num_columns
            )));
        }
        Ok(())
    }

    /// AIE tiles of `graph`, combining core and memory-module usage.
    fn all_aie_tiles(&self, graph: &str) -> Vec<Tile> {
        let offset = self.aie_tile_row_offset();
        let mut tiles: Vec<Tile> = Vec::new();

        for entry in self.graphs.iter().filter(|g| graph_matches(graph, &g.name)) {
            for &[col, row] in &entry.core_tiles {
                let tile = Tile::new(col, row + offset).with_activity(true, false);
                if !tiles.contains(&tile) {
                    tiles.push(tile);
                }
            }
        }

        for entry in self.graphs.iter().filter(|g| graph_matches(graph, &g.name)) {
            for &[col, row] in &entry.dma_tiles {
                let loc = Tile::new(col, row + offset);
                match tiles.iter_mut().find(|t| **t == loc) {
                    Some(existing) => existing.active_memory = true,
                    None => tiles.push(loc.with_activity(false, true)),
                }
            }
        }
        tiles
    }

    fn memory_tiles(&self, graph: &str, buffer: &str) -> Vec<Tile> {
        if self.hardware_generation() == 1 {
            return Vec::new();
        }

        let mut tiles: Vec<Tile> = Vec::new();
        for entry in &self.buffers {
            if !graph_matches(graph, &entry.graph) {
                continue;
            }
            if buffer != "all" && !entry.name.contains(buffer) {
                continue;
            }
            let tile = Tile::new(entry.column, entry.row + 1).with_activity(false, true);
            if !tiles.contains(&tile) {
                tiles.push(tile);
            }
        }
        tiles
    }

    fn kernel_tiles(&self, graph: &str, kernel: &str) -> Vec<Tile> {
        let offset = self.aie_tile_row_offset();
        let mut tiles: Vec<Tile> = Vec::new();
        for entry in &self.kernels {
            if !graph_matches(graph, &entry.graph) {
                continue;
            }
            if !entry.function.split('.').any(|part| part == kernel) {
                continue;
            }
            let tile = Tile::new(entry.column, entry.row + offset);
            if !tiles.contains(&tile) {
                tiles.push(tile);
            }
        }
        tiles
    }
}

impl MetadataReader for StaticMetadata {
    fn hardware_generation(&self) -> u8 {
        self.driver_config.hw_gen
    }

    fn aie_tile_row_offset(&self) -> u8 {
        self.driver_config.aie_tile_row_start
    }

    fn driver_config(&self) -> DriverConfig {
        self.driver_config
    }

    fn clock_freq_mhz(&self) -> f64 {
        self.clock_freq_mhz
    }

    fn partition_start_columns(&self) -> Vec<u8> {
        if self.partition_start_columns.is_empty() {
            vec![0]
        } else {
            self.partition_start_columns.clone()
        }
    }

    fn valid_graphs(&self) -> BTreeSet<String> {
        self.graphs
            .iter()
            .map(|g| g.name.clone())
            .chain(self.kernels.iter().map(|k| k.graph.clone()))
            .chain(self.buffers.iter().map(|b| b.graph.clone()))
            .chain(self.ios.iter().map(|io| io.graph().to_string()))
            .filter(|g| !g.is_empty())
            .collect()
    }

    fn valid_kernels(&self) -> BTreeSet<String> {
        self.kernels
            .iter()
            .flat_map(|k| k.function.split('.').map(str::to_string))
            .collect()
    }

    fn valid_buffers(&self) -> BTreeSet<String> {
        self.buffers.iter().map(|b| b.name.clone()).collect()
    }

    fn valid_ports(&self) -> BTreeSet<String> {
        self.ios
            .iter()
            .flat_map(|io| [io.port().to_string(), io.logical_name.clone()])
            .filter(|p| !p.is_empty())
            .collect()
    }

    fn tiles(&self, graph: &str, module: ModuleType, name: &str) -> Vec<Tile> {
        match module {
            ModuleType::MemTile => self.memory_tiles(graph, name),
            ModuleType::Dma => self.all_aie_tiles(graph),
            ModuleType::Core if name == "all" => self.all_aie_tiles(graph),
            ModuleType::Core => self.kernel_tiles(graph, name),
            ModuleType::Shim | ModuleType::Uc => Vec::new(),
        }
    }

    fn interface_tiles(
        &self,
        graph: &str,
        port: &str,
        metric: &str,
        query: InterfaceQuery,
    ) -> Vec<Tile> {
        if metric.starts_with("uc_") {
            return self.microcontrollers(query.columns);
        }

        let polarity = metrics::interface_polarity(metric);
        let mut tiles: Vec<Tile> = Vec::new();

        for io in &self.ios {
            if port != "all" && port != io.port() && port != io.logical_name {
                continue;
            }
            if query.columns.is_none() && graph != "all" && !io.graph().contains(graph) {
                continue;
            }
            if polarity.is_some_and(|master| master != io.master) {
                continue;
            }
            if let Some((min_col, max_col)) = query.columns {
                if io.shim_column < min_col || io.shim_column > max_col {
                    continue;
                }
            }
            if let Some(id) = query.channel_id {
                let matches = match io.io_type {
                    IoType::Plio => id == io.stream_id,
                    IoType::Gmio => id == io.channel || id == io.stream_id,
                };
                if !matches {
                    continue;
                }
            }

            let tile = Tile::interface(io.shim_column, io.io_type, io.stream_id, io.master);
            match tiles.iter_mut().find(|t| **t == tile) {
                Some(existing) => existing.merge_streams(&tile),
                None => tiles.push(tile),
            }
        }
        tiles
    }

    fn microcontrollers(&self, columns: Option<(u8, u8)>) -> Vec<Tile> {
        if self.hardware_generation() < 5 {
            return Vec::new();
        }
        let (first, last) = columns.unwrap_or((0, 0));
        (first..=last)
            .map(|col| Tile::new(col, 0).with_activity(false, false))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two graphs on a 4x4 AIE2 array with one memory tile buffer and three
    /// IOs on two shim columns.
    pub(crate) const FIXTURE: &str = r#"
clock_freq_mhz = 1250.0

[driver_config]
hw_gen = 2
num_columns = 4
aie_tile_row_start = 2

[[graphs]]
name = "gr"
core_tiles = [[0, 0], [1, 0], [1, 1]]
dma_tiles = [[0, 0], [2, 0]]

[[graphs]]
name = "other"
core_tiles = [[3, 3]]

[[kernels]]
graph = "gr"
function = "gr.k_filter"
column = 1
row = 1

[[buffers]]
graph = "gr"
name = "shared_buf"
column = 2
row = 0

[[ios]]
name = "gr.in0"
logical_name = "plio_in0"
type = "plio"
master = false
shim_column = 0
stream_id = 3

[[ios]]
name = "gr.out0"
logical_name = "plio_out0"
type = "plio"
master = true
shim_column = 0
stream_id = 5

[[ios]]
name = "other.gm0"
logical_name = "gmio_in"
type = "gmio"
master = false
shim_column = 2
stream_id = 1
channel = 1
"#;

    pub(crate) fn fixture() -> StaticMetadata {
        StaticMetadata::from_toml_str(FIXTURE).unwrap()
    }

    fn locs(tiles: &[Tile]) -> Vec<(u8, u8)> {
        let mut v: Vec<_> = tiles.iter().map(|t| (t.col, t.row)).collect();
        v.sort();
        v
    }

    #[test]
    fn test_all_aie_tiles_merge_activity() {
        let md = fixture();
        let tiles = md.tiles("all", ModuleType::Core, "all");
        assert_eq!(locs(&tiles), vec![(0, 2), (1, 2), (1, 3), (2, 2), (3, 5)]);

        let t02 = tiles.iter().find(|t| (t.col, t.row) == (0, 2)).unwrap();
        assert!(t02.active_core && t02.active_memory);
        let t22 = tiles.iter().find(|t| (t.col, t.row) == (2, 2)).unwrap();
        assert!(!t22.active_core && t22.active_memory);
    }

    #[test]
    fn test_graph_filter() {
        let md = fixture();
        assert_eq!(locs(&md.tiles("other", ModuleType::Core, "all")), vec![(3, 5)]);
        assert!(md.tiles("missing", ModuleType::Core, "all").is_empty());
        // Sub-graph names resolve to their top-level graph
        assert_eq!(locs(&md.tiles("other.sub", ModuleType::Dma, "x")), vec![(3, 5)]);
    }

    #[test]
    fn test_kernel_and_buffer_lookup() {
        let md = fixture();
        assert_eq!(locs(&md.tiles("gr", ModuleType::Core, "k_filter")), vec![(1, 3)]);
        assert!(md.tiles("gr", ModuleType::Core, "k_missing").is_empty());
        assert_eq!(locs(&md.tiles("all", ModuleType::MemTile, "shared")), vec![(2, 1)]);
    }

    #[test]
    fn test_interface_polarity_and_merge() {
        let md = fixture();
        let inputs = md.interface_tiles("all", "all", "input_throughputs", InterfaceQuery::default());
        assert_eq!(locs(&inputs), vec![(0, 0), (2, 0)]);

        let outputs = md.interface_tiles("all", "all", "output_throughputs", InterfaceQuery::default());
        assert_eq!(locs(&outputs), vec![(0, 0)]);
        assert_eq!(outputs[0].stream_ids, vec![5]);

        let packets = md.interface_tiles("gr", "all", "packets", InterfaceQuery::default());
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].stream_ids, vec![3, 5]);
        assert_eq!(packets[0].is_master, vec![false, true]);
    }

    #[test]
    fn test_interface_port_and_id_filters() {
        let md = fixture();
        let by_logical = md.interface_tiles("all", "gmio_in", "mm2s_throughputs", InterfaceQuery::default());
        assert_eq!(locs(&by_logical), vec![(2, 0)]);
        assert_eq!(by_logical[0].subtype, IoType::Gmio);

        let by_channel =
            md.interface_tiles("all", "all", "input_throughputs", InterfaceQuery::with_channel(1));
        assert_eq!(locs(&by_channel), vec![(2, 0)]);

        let none = md.interface_tiles("all", "all", "input_throughputs", InterfaceQuery::with_channel(9));
        assert!(none.is_empty());
    }

    #[test]
    fn test_interface_column_range_ignores_graph() {
        let md = fixture();
        let tiles = md.interface_tiles("nope", "all", "input_throughputs", InterfaceQuery::with_columns(1, 3));
        assert_eq!(locs(&tiles), vec![(2, 0)]);
    }

    #[test]
    fn test_microcontrollers_need_gen5() {
        let md = fixture();
        assert!(md.microcontrollers(None).is_empty());

        let mut gen5 = fixture();
        gen5.driver_config.hw_gen = 5;
        assert_eq!(locs(&gen5.microcontrollers(None)), vec![(0, 0)]);
        assert_eq!(locs(&gen5.microcontrollers(Some((1, 3)))), vec![(1, 0), (2, 0), (3, 0)]);
        assert_eq!(
            gen5.interface_tiles("all", "all", "uc_dma", InterfaceQuery::with_columns(2, 2)).len(),
            1
        );
    }

    #[test]
    fn test_valid_names() {
        let md = fixture();
        assert!(md.valid_graphs().contains("gr"));
        assert!(md.valid_graphs().contains("other"));
        assert!(md.valid_kernels().contains("k_filter"));
        assert!(md.valid_buffers().contains("shared_buf"));
        let ports = md.valid_ports();
        assert!(ports.contains("in0"));
        assert!(ports.contains("plio_out0"));
    }

    #[test]
    fn test_validation_errors() {
        let bad = "[driver_config]\naie_tile_row_start = 0\n";
        assert!(matches!(
            StaticMetadata::from_toml_str(bad),
            Err(MetadataError::Invalid(_))
        ));

        let bad_col = "[[ios]]\nname = \"g.p\"\nshim_column = 40\n";
        assert!(matches!(
            StaticMetadata::from_toml_str(bad_col),
            Err(MetadataError::Invalid(_))
        ));

        assert!(matches!(
            StaticMetadata::from_toml_str("graphs = 3"),
            Err(MetadataError::Parse(_))
        ));
    }
}
