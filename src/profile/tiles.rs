//! Metric resolution for AIE core, AIE memory and memory tile modules.
//!
//! ```text
//! graph_based_aie_metrics = "<graph|all>:<kernel|all>:<metric>[:<ch0>[:<ch1>]]"
//! tile_based_aie_metrics  = "all:<metric>[:<ch0>[:<ch1>]]"
//!                         | "{col,row}:<metric>[:<ch0>[:<ch1>]]"
//!                         | "{mincol,minrow}:{maxcol,maxrow}:<metric>[:<ch0>[:<ch1>]]"
//! ```
//!
//! Rows are relative to the first row of the module's tile kind. A range is
//! recognised by a tile coordinate in its second field.

use std::collections::BTreeSet;
use std::num::ParseIntError;

use super::ProfileMetadata;
use crate::device::{ModuleType, Tile};
use crate::metrics;
use crate::settings::parser::parse_tile_coords;
use crate::settings::SettingFields;

/// Parse channel fields; a single channel applies to both.
pub(super) fn parse_channel_pair(ch0: &str, ch1: Option<&str>) -> Result<(u8, u8), ParseIntError> {
    let ch0 = ch0.parse::<u8>()?;
    let ch1 = ch1.map(str::parse::<u8>).transpose()?.unwrap_or(ch0);
    Ok((ch0, ch1))
}

pub(super) fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl ProfileMetadata {
    /// Resolve graph and tile settings of a core, memory or memory tile
    /// module.
    pub(crate) fn config_metrics_for_tiles(
        &mut self,
        module: ModuleType,
        tile_metrics: &[SettingFields],
        graph_metrics: &[SettingFields],
    ) {
        if tile_metrics.is_empty() && graph_metrics.is_empty() {
            return;
        }

        if module == ModuleType::MemTile && self.hardware_generation() == 1 {
            self.sink
                .warning("MEM tiles are not available in AIE1. Profile settings will be ignored.");
            return;
        }

        let valid_tiles: BTreeSet<Tile> = self.metadata.tiles("all", module, "all").into_iter().collect();

        // Graph passes: "all" graphs first, then named graphs
        for fields in graph_metrics.iter().filter(|f| f[0] == "all") {
            self.apply_graph_setting(module, fields);
        }
        for fields in graph_metrics.iter().filter(|f| f[0] != "all") {
            self.apply_graph_setting(module, fields);
        }

        // Tile passes: all, ranges, single tiles
        for fields in tile_metrics.iter().filter(|f| f[0] == "all" && f.len() >= 2) {
            let tiles: Vec<Tile> = valid_tiles.iter().cloned().collect();
            self.apply_tile_setting(module, &tiles, &fields[1], &fields[2..]);
        }
        for fields in tile_metrics.iter().filter(|f| is_range(f)) {
            self.apply_range_setting(module, fields, &valid_tiles);
        }
        for fields in tile_metrics.iter().filter(|f| !is_range(f) && !(f[0] == "all" && f.len() >= 2)) {
            self.apply_single_setting(module, fields, &valid_tiles);
        }

        self.restore_complementary_pairs(module);
        let off_tiles = self.validate_metrics(module);
        self.apply_complementary_pairs(module);

        let map = self.map_mut(module);
        for tile in &off_tiles {
            map.remove(tile);
        }
    }

    fn apply_graph_setting(&mut self, module: ModuleType, fields: &SettingFields) {
        let mod_name = module.name();
        if fields.len() < 3 {
            self.sink.warning(&format!(
                "Graph specification in graph_based_{}_metrics is not valid format and hence skipped.",
                mod_name
            ));
            return;
        }

        let (graph, name) = (&fields[0], &fields[1]);
        if graph != "all" {
            let valid_graphs = self.metadata.valid_graphs();
            if !valid_graphs.contains(graph) {
                self.sink.warning(&format!(
                    "Could not find graph {} as specified in graph_based_{}_metrics setting. The following graphs are valid : {}",
                    graph,
                    mod_name,
                    join_names(&valid_graphs)
                ));
                return;
            }
        }

        if name != "all" {
            let (valid_names, kind) = if module == ModuleType::MemTile {
                (self.metadata.valid_buffers(), "buffer")
            } else {
                (self.metadata.valid_kernels(), "kernel")
            };
            if !valid_names.contains(name) {
                self.sink.warning(&format!(
                    "Could not find {} {} as specified in graph_based_{}_metrics setting. The following {}s are valid : {}",
                    kind,
                    name,
                    mod_name,
                    kind,
                    join_names(&valid_names)
                ));
                return;
            }
        }

        let tiles = self.metadata.tiles(graph, module, name);
        self.assign_metric(module, &tiles, &fields[2]);

        if let Some(ch0) = fields.get(3) {
            match parse_channel_pair(ch0, fields.get(4).map(String::as_str)) {
                Ok(channels) => self.set_channels(&tiles, channels),
                Err(_) => self.sink.warning(&format!(
                    "Channel specifications in graph_based_{}_metrics are not valid and hence ignored.",
                    mod_name
                )),
            }
        }
    }

    /// Assign `metric` to `tiles`, then any channels in `extra`.
    fn apply_tile_setting(&mut self, module: ModuleType, tiles: &[Tile], metric: &str, extra: &[String]) {
        self.assign_metric(module, tiles, metric);

        if let Some(ch0) = extra.first() {
            match parse_channel_pair(ch0, extra.get(1).map(String::as_str)) {
                Ok(channels) => self.set_channels(tiles, channels),
                Err(_) => self.sink.warning(&format!(
                    "Channel specifications in tile_based_{}_metrics are not valid and hence ignored.",
                    module.name()
                )),
            }
        }
    }

    fn apply_range_setting(&mut self, module: ModuleType, fields: &SettingFields, valid_tiles: &BTreeSet<Tile>) {
        let row_offset = module.row_offset(self.aie_tile_row_offset());
        let absolute = |field: &str| {
            let (col, row) = parse_tile_coords(field)?;
            Some((col, row.checked_add(row_offset)?))
        };

        let bounds = absolute(fields[0].as_str()).zip(absolute(fields[1].as_str()));
        let Some(((min_col, min_row), (max_col, max_row))) =
            bounds.filter(|((c0, r0), (c1, r1))| c0 <= c1 && r0 <= r1)
        else {
            self.sink.warning(&format!(
                "Tile range specification in tile_based_{}_metrics is not valid format and hence skipped.",
                module.name()
            ));
            return;
        };

        let mut tiles = Vec::new();
        for col in min_col..=max_col {
            for row in min_row..=max_row {
                match valid_tiles.get(&Tile::new(col, row)) {
                    Some(tile) => tiles.push(tile.clone()),
                    None => self.warn_inactive(col, row),
                }
            }
        }
        self.apply_tile_setting(module, &tiles, &fields[2], &fields[3..]);
    }

    fn apply_single_setting(&mut self, module: ModuleType, fields: &SettingFields, valid_tiles: &BTreeSet<Tile>) {
        let row_offset = module.row_offset(self.aie_tile_row_offset());
        let coords = if fields.len() >= 2 {
            parse_tile_coords(&fields[0])
                .and_then(|(col, row)| Some((col, row.checked_add(row_offset)?)))
        } else {
            None
        };

        let Some((col, row)) = coords else {
            self.sink.warning(&format!(
                "Tile specification in tile_based_{}_metrics is not valid format and hence skipped.",
                module.name()
            ));
            return;
        };

        match valid_tiles.get(&Tile::new(col, row)) {
            Some(tile) => {
                let tiles = [tile.clone()];
                self.apply_tile_setting(module, &tiles, &fields[1], &fields[2..]);
            }
            None => self.warn_inactive(col, row),
        }
    }

    fn warn_inactive(&self, col: u8, row: u8) {
        self.sink.warning(&format!(
            "Specified Tile {{{},{}}} is not active. Hence skipped.",
            col, row
        ));
    }

    /// Substitute the default for unsupported names and collect "off" tiles.
    ///
    /// Warns once per module no matter how many tiles used a bad name.
    pub(super) fn validate_metrics(&mut self, module: ModuleType) -> Vec<Tile> {
        let default = metrics::default_metric_set(module);
        let mut off_tiles = Vec::new();
        let mut bad_name = None;

        for (tile, metric) in self.config_metrics[module.index()].iter_mut() {
            if metric.is_empty() || metric == "off" {
                off_tiles.push(tile.clone());
                continue;
            }
            if !metrics::is_supported(module, metric) {
                bad_name.get_or_insert_with(|| metric.clone());
                *metric = default.to_string();
            }
        }

        if let Some(name) = bad_name {
            self.sink.warning(&format!(
                "Unable to find {} metric set {}. Using default of {}.",
                module.name(),
                name,
                default
            ));
        }
        off_tiles
    }

    /// Force complementary sets onto the paired module of each tile.
    fn apply_complementary_pairs(&mut self, module: ModuleType) {
        let forced: Vec<(Tile, String, ModuleType)> = self
            .config_metrics(module)
            .iter()
            .filter_map(|(tile, metric)| {
                metrics::pair_module(metric, module).map(|paired| (tile.clone(), metric.clone(), paired))
            })
            .collect();

        for (tile, metric, paired) in forced {
            let previous = self.map_mut(paired).insert(tile.clone(), metric.clone());
            if let Some(previous) = previous.filter(|p| *p != metric) {
                self.sink.warning(&format!(
                    "Replacing {} metric set {} with complementary set {} on tile {}.",
                    paired.name(),
                    previous,
                    metric,
                    tile
                ));
            }
            self.pair_config_metrics.insert(tile, metric);
        }
    }

    /// Undo overrides of sets forced by an earlier module's pairing.
    fn restore_complementary_pairs(&mut self, module: ModuleType) {
        let conflicts: Vec<(Tile, String, String)> = self
            .pair_config_metrics
            .iter()
            .filter(|(_, forced)| metrics::pair_module(forced, module).is_some())
            .filter_map(|(tile, forced)| {
                let current = self.config_metrics(module).get(tile)?;
                (current != forced).then(|| (tile.clone(), current.clone(), forced.clone()))
            })
            .collect();

        for (tile, requested, forced) in conflicts {
            self.sink.warning(&format!(
                "Ignoring {} metric set {} on tile {} since it requires complementary set {}.",
                module.name(),
                requested,
                tile,
                forced
            ));
            self.map_mut(module).insert(tile, forced);
        }
    }
}

/// `{c,r}:{c,r}:metric[...]`
fn is_range(fields: &SettingFields) -> bool {
    fields[0] != "all" && fields.len() >= 3 && fields[1].contains(',')
}
