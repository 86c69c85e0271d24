//! Metric resolution for interface tiles and microcontrollers.
//!
//! ```text
//! graph_based_interface_tile_metrics = "<graph|all>:<port|all>:<metric>[:<ch0>[:<ch1>]]"
//!                                    | "<graph|all>:<port|all>:start_to_bytes_transferred[:<bytes>]"
//! tile_based_interface_tile_metrics  = "all:<metric>[:<channel>[:<bytes>]]"
//!                                    | "<mincol>:<maxcol>:<metric>[:<channel>[:<bytes>]]"
//!                                    | "<col>:<metric>[:<channel>[:<bytes>]]"
//! tile_based_microcontroller_metrics = "all:<metric>" | "<mincol>:<maxcol>:<metric>" | "<col>:<metric>"
//! ```
//!
//! Interface tiles have no user-facing row. A channel narrows the lookup to
//! IOs on that stream or DMA channel and is recorded as the tile's channel 0.

use super::tiles::{join_names, parse_channel_pair};
use super::{process_user_specified_bytes, ProfileMetadata};
use crate::device::{ModuleType, Tile};
use crate::metadata::InterfaceQuery;
use crate::metrics::METRIC_BYTE_COUNT;
use crate::settings::parser::is_integer;
use crate::settings::SettingFields;

const TILE_KEY: &str = "tile_based_interface_tile_metrics";
const GRAPH_KEY: &str = "graph_based_interface_tile_metrics";

impl ProfileMetadata {
    /// Resolve graph and tile settings of interface tiles.
    pub(crate) fn config_metrics_for_interface_tiles(
        &mut self,
        tile_metrics: &[SettingFields],
        graph_metrics: &[SettingFields],
    ) {
        if tile_metrics.is_empty() && graph_metrics.is_empty() {
            return;
        }

        for fields in graph_metrics.iter().filter(|f| f[0] == "all") {
            self.apply_interface_graph_setting(fields);
        }
        for fields in graph_metrics.iter().filter(|f| f[0] != "all") {
            self.apply_interface_graph_setting(fields);
        }

        for fields in tile_metrics.iter().filter(|f| f[0] == "all") {
            if fields.len() < 2 {
                self.warn_interface_format();
                continue;
            }
            self.apply_interface_tile_setting(None, &fields[1], &fields[2..]);
        }

        // Ranges: "<mincol>:<maxcol>:<metric>..."
        for fields in tile_metrics.iter().filter(|f| f[0] != "all" && is_column_range(f)) {
            let (Ok(min_col), Ok(max_col)) = (fields[0].parse::<u8>(), fields[1].parse::<u8>()) else {
                self.sink.warning(&format!(
                    "Minimum column specification in {} is not an integer and hence skipped.",
                    TILE_KEY
                ));
                continue;
            };
            if min_col > max_col {
                self.sink.warning(&format!(
                    "Column range specification in {} is not valid and hence skipped.",
                    TILE_KEY
                ));
                continue;
            }
            self.apply_interface_tile_setting(Some((min_col, max_col)), &fields[2], &fields[3..]);
        }

        // Single columns: "<col>:<metric>..."
        for fields in tile_metrics.iter().filter(|f| f[0] != "all" && !is_column_range(f)) {
            if fields.len() < 2 {
                self.warn_interface_format();
                continue;
            }
            let Ok(col) = fields[0].parse::<u8>() else {
                self.sink.warning(&format!(
                    "Column specification in {} is not an integer and hence skipped.",
                    TILE_KEY
                ));
                continue;
            };
            self.apply_interface_tile_setting(Some((col, col)), &fields[1], &fields[2..]);
        }

        let off_tiles = self.validate_metrics(ModuleType::Shim);
        let map = self.map_mut(ModuleType::Shim);
        for tile in &off_tiles {
            map.remove(tile);
        }
    }

    fn apply_interface_graph_setting(&mut self, fields: &SettingFields) {
        if fields.len() < 3 {
            self.sink.warning(&format!(
                "Graph specification in {} is not valid format and hence skipped.",
                GRAPH_KEY
            ));
            return;
        }

        let (graph, port, metric) = (&fields[0], &fields[1], &fields[2]);
        if graph != "all" {
            let valid_graphs = self.metadata.valid_graphs();
            if !valid_graphs.contains(graph) {
                self.sink.warning(&format!(
                    "Could not find graph {} as specified in {} setting. The following graphs are valid : {}",
                    graph,
                    GRAPH_KEY,
                    join_names(&valid_graphs)
                ));
                return;
            }
        }
        if port != "all" {
            let valid_ports = self.metadata.valid_ports();
            if !valid_ports.contains(port) {
                self.sink.warning(&format!(
                    "Could not find port {} as specified in {} setting. The following ports are valid : {}",
                    port,
                    GRAPH_KEY,
                    join_names(&valid_ports)
                ));
                return;
            }
        }

        if metric == METRIC_BYTE_COUNT {
            let tiles = self
                .metadata
                .interface_tiles(graph, port, metric, InterfaceQuery::default());
            let bytes = fields.get(3).map(|b| process_user_specified_bytes(b));
            self.assign_interface(&tiles, metric, None, bytes);
            return;
        }

        let channels = match fields.get(3) {
            None => None,
            Some(ch0) => match parse_channel_pair(ch0, fields.get(4).map(String::as_str)) {
                Ok(channels) => Some(channels),
                Err(_) => {
                    self.sink.warning(&format!(
                        "Channel specifications in {} are not valid and hence ignored.",
                        GRAPH_KEY
                    ));
                    None
                }
            },
        };

        let query = InterfaceQuery {
            channel_id: channels.map(|(ch0, _)| ch0),
            columns: None,
        };
        let tiles = self.metadata.interface_tiles(graph, port, metric, query);
        self.warn_unused_channel(query, &tiles);
        self.assign_interface(&tiles, metric, channels, None);
    }

    /// Tile-based assignment over an optional column range.
    ///
    /// `extra` holds the optional channel and byte fields after the metric.
    fn apply_interface_tile_setting(&mut self, columns: Option<(u8, u8)>, metric: &str, extra: &[String]) {
        let channel = match extra.first() {
            None => None,
            Some(ch) => match ch.parse::<u8>() {
                Ok(ch) => Some(ch),
                Err(_) => {
                    self.sink.warning(&format!(
                        "Channel ID specification in {} is not an integer and hence ignored.",
                        TILE_KEY
                    ));
                    None
                }
            },
        };
        let bytes = (metric == METRIC_BYTE_COUNT)
            .then(|| extra.get(1).map(|b| process_user_specified_bytes(b)))
            .flatten();

        let query = InterfaceQuery {
            channel_id: channel,
            columns,
        };
        let tiles = self.metadata.interface_tiles("all", "all", metric, query);
        self.warn_unused_channel(query, &tiles);
        self.assign_interface(&tiles, metric, channel.map(|ch| (ch, ch)), bytes);
    }

    fn assign_interface(&mut self, tiles: &[Tile], metric: &str, channels: Option<(u8, u8)>, bytes: Option<u32>) {
        self.assign_metric(ModuleType::Shim, tiles, metric);
        if let Some(channels) = channels {
            self.set_channels(tiles, channels);
        }
        if let Some(bytes) = bytes {
            for tile in tiles {
                self.bytes_to_transfer.insert(tile.clone(), bytes);
            }
        }
    }

    fn warn_unused_channel(&self, query: InterfaceQuery, tiles: &[Tile]) {
        if let (Some(id), true) = (query.channel_id, tiles.is_empty()) {
            self.sink.warning(&format!(
                "No tiles used channel ID {}. Please specify a valid channel ID.",
                id
            ));
        }
    }

    fn warn_interface_format(&self) {
        self.sink.warning(&format!(
            "Tile specification in {} is not valid format and hence skipped.",
            TILE_KEY
        ));
    }

    /// Resolve microcontroller settings (generation 5 and later).
    pub(crate) fn config_metrics_for_microcontrollers(&mut self, tile_metrics: &[SettingFields]) {
        if tile_metrics.is_empty() {
            return;
        }
        if !self.arch.has_microcontrollers() {
            self.sink.warning(
                "Microcontrollers are not available on this device. Profile settings will be ignored.",
            );
            return;
        }

        for fields in tile_metrics {
            let parsed = match fields.as_slice() {
                [all, metric] if all == "all" => Some((None, metric)),
                [col, metric] => col.parse::<u8>().ok().map(|c| (Some((c, c)), metric)),
                [min, max, metric] => match (min.parse::<u8>(), max.parse::<u8>()) {
                    (Ok(min), Ok(max)) if min <= max => Some((Some((min, max)), metric)),
                    _ => None,
                },
                _ => None,
            };

            let Some((columns, metric)) = parsed else {
                self.sink.warning(
                    "Tile specification in tile_based_microcontroller_metrics is not valid format and hence skipped.",
                );
                continue;
            };

            let tiles = self.metadata.microcontrollers(columns);
            self.assign_metric(ModuleType::Uc, &tiles, metric);
        }

        let off_tiles = self.validate_metrics(ModuleType::Uc);
        let map = self.map_mut(ModuleType::Uc);
        for tile in &off_tiles {
            map.remove(tile);
        }
    }
}

/// `<int>:<int>:<metric>...`, recognised by its integer second field.
fn is_column_range(fields: &SettingFields) -> bool {
    fields.len() >= 3 && is_integer(&fields[1])
}
