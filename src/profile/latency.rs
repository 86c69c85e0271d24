//! Interface tile latency pairs.
//!
//! `interface_tile_latency_metrics = "g1:in0:g2:out0:16"` measures the
//! cycles between the first beat on port `g1:in0` and the first beat on
//! `g2:out0`. Each port resolves to one interface tile; the pair is stored
//! twice, once keyed by each endpoint:
//!
//! ```text
//! (col,row,stream) of g1:in0   -> { src, dest, is_source: true  }
//! (col,row,stream) of g2:out0  -> { src, dest, is_source: false }
//! ```
//!
//! The destination is configured before the source so the source counter
//! can stop on the destination's event.

use std::collections::{BTreeMap, HashMap};

use super::ProfileMetadata;
use crate::device::{ModuleType, Tile};
use crate::metadata::InterfaceQuery;
use crate::metrics::METRIC_LATENCY;
use crate::settings::SettingFields;

/// Physical endpoint key: `(col, row, stream id)`.
pub type LatencyKey = (u8, u8, u8);

/// Graph and port names of both ends of a latency pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPortPair {
    pub src_graph: String,
    pub src_port: String,
    pub dest_graph: String,
    pub dest_port: String,
}

/// One endpoint's view of a latency pair.
#[derive(Debug, Clone)]
pub struct LatencyConfig {
    pub src: Tile,
    pub dest: Tile,
    pub metric: String,
    /// Transactions to observe before stopping.
    pub tranx_no: u32,
    /// The keyed endpoint is the source.
    pub is_source: bool,
    pub ports: GraphPortPair,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LatencyError {
    #[error("no latency pair configured for tile ({0},{1}) stream {2}")]
    UnknownTile(u8, u8, u8),
    #[error("latency pair key {0} was never resolved")]
    UnknownKey(String),
}

/// Endpoint key of an interface tile (first stream on the tile).
pub fn latency_key(tile: &Tile) -> LatencyKey {
    (tile.col, tile.row, tile.stream_id(0))
}

fn pair_key(src: &Tile, dest: &Tile) -> String {
    let (sc, sr, ss) = latency_key(src);
    let (dc, dr, ds) = latency_key(dest);
    format!("src({},{},{}):dest({},{},{})", sc, sr, ss, dc, dr, ds)
}

/// All latency pairs of a session.
///
/// Pair keys are computed once per configured endpoint when the pair is
/// added, so lookups never allocate and never grow the tables.
#[derive(Debug, Default)]
pub struct LatencyPairs {
    entries: BTreeMap<LatencyKey, LatencyConfig>,
    order: Vec<Tile>,
    keys: HashMap<LatencyKey, String>,
    graph_pairs: HashMap<String, GraphPortPair>,
}

impl LatencyPairs {
    fn add(&mut self, src: Tile, dest: Tile, tranx_no: u32, ports: GraphPortPair) {
        let key = pair_key(&src, &dest);
        let config = LatencyConfig {
            src: src.clone(),
            dest: dest.clone(),
            metric: METRIC_LATENCY.to_string(),
            tranx_no,
            is_source: true,
            ports: ports.clone(),
        };

        self.entries.insert(
            latency_key(&dest),
            LatencyConfig {
                is_source: false,
                ..config.clone()
            },
        );
        self.entries.insert(latency_key(&src), config);

        self.keys.insert(latency_key(&src), key.clone());
        self.keys.insert(latency_key(&dest), key.clone());
        self.graph_pairs.insert(key, ports);

        self.order.push(dest);
        self.order.push(src);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of configured endpoints (two per pair).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: LatencyKey) -> Option<&LatencyConfig> {
        self.entries.get(&key)
    }

    /// Pair configured for an interface tile, by its first stream.
    pub fn config_for(&self, tile: &Tile) -> Option<&LatencyConfig> {
        self.get(latency_key(tile))
    }

    /// Endpoints in configuration order (destination before source).
    pub fn order(&self) -> &[Tile] {
        &self.order
    }

    /// Pair key shared by both endpoints of the pair containing
    /// `(col, row, stream_id)`.
    pub fn src_dest_pair_key(&self, col: u8, row: u8, stream_id: u8) -> Result<&str, LatencyError> {
        self.keys
            .get(&(col, row, stream_id))
            .map(String::as_str)
            .ok_or(LatencyError::UnknownTile(col, row, stream_id))
    }

    /// Graph and port names behind a pair key.
    pub fn src_dest_graph_pair(&self, key: &str) -> Result<&GraphPortPair, LatencyError> {
        self.graph_pairs
            .get(key)
            .ok_or_else(|| LatencyError::UnknownKey(key.to_string()))
    }
}

impl ProfileMetadata {
    /// Resolve `graph1:port1:graph2:port2[:tranx_no]` entries.
    pub(crate) fn config_metrics_for_latency(&mut self, settings: &[SettingFields]) {
        for fields in settings {
            if fields.len() < 4 || fields.len() > 5 {
                self.sink.warning(
                    "Latency specification in interface_tile_latency_metrics is not valid format and hence skipped.",
                );
                continue;
            }

            let ports = GraphPortPair {
                src_graph: fields[0].clone(),
                src_port: fields[1].clone(),
                dest_graph: fields[2].clone(),
                dest_port: fields[3].clone(),
            };

            let src_tiles = self.port_tiles(&ports.src_graph, &ports.src_port);
            let dest_tiles = self.port_tiles(&ports.dest_graph, &ports.dest_port);
            if src_tiles.is_empty() || dest_tiles.is_empty() {
                self.sink.info(&format!(
                    "Unable to find interface tiles for latency between {}:{} and {}:{}. Hence skipped.",
                    ports.src_graph, ports.src_port, ports.dest_graph, ports.dest_port
                ));
                continue;
            }
            let src = self.single_endpoint(&ports.src_graph, &ports.src_port, src_tiles);
            let dest = self.single_endpoint(&ports.dest_graph, &ports.dest_port, dest_tiles);
            let (Some(src), Some(dest)) = (src, dest) else {
                continue;
            };

            let tranx = fields.get(4).map_or("0", String::as_str);
            let tranx_no = match tranx.parse::<u32>() {
                Ok(n) if tranx.bytes().all(|b| b.is_ascii_digit()) => n,
                _ => {
                    self.sink.warning(&format!(
                        "Transaction count {} in interface_tile_latency_metrics is not valid and hence skipped.",
                        tranx
                    ));
                    continue;
                }
            };

            self.assign_metric(ModuleType::Shim, [&dest, &src], METRIC_LATENCY);
            self.latency.add(src, dest, tranx_no, ports);
        }
    }

    fn port_tiles(&self, graph: &str, port: &str) -> Vec<Tile> {
        self.metadata
            .interface_tiles(graph, port, METRIC_LATENCY, InterfaceQuery::default())
    }

    /// The one stream endpoint behind `graph:port`, or `None` with a
    /// warning when it names several streams.
    fn single_endpoint(&self, graph: &str, port: &str, mut tiles: Vec<Tile>) -> Option<Tile> {
        let streams: usize = tiles.iter().map(|t| t.stream_ids.len().max(1)).sum();
        if streams > 1 {
            self.sink.warning(&format!(
                "Latency port {}:{} in interface_tile_latency_metrics matches {} streams and hence skipped. Please specify a single port.",
                graph, port, streams
            ));
            return None;
        }
        tiles.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Severity;
    use crate::metadata::static_metadata::tests::fixture;
    use crate::profile::tests::resolve_with;
    use crate::settings::ProfileSettings;

    fn latency_settings(value: &str) -> ProfileSettings {
        ProfileSettings::default().with("interface_tile_latency_metrics", value)
    }

    #[test]
    fn test_pair_symmetry() {
        let (profile, sink) = resolve_with(fixture(), latency_settings("gr:in0:other:gm0:5"));
        let pairs = profile.latency();
        assert_eq!(pairs.len(), 2);

        let src = pairs.get((0, 0, 3)).unwrap();
        assert!(src.is_source);
        assert_eq!(src.tranx_no, 5);
        assert_eq!((src.src.col, src.dest.col), (0, 2));

        let dest = pairs.get((2, 0, 1)).unwrap();
        assert!(!dest.is_source);
        assert_eq!(dest.tranx_no, 5);
        assert_eq!(dest.src, src.src);
        assert_eq!(dest.dest, src.dest);

        let shim = profile.config_metrics(ModuleType::Shim);
        assert_eq!(shim.len(), 2);
        assert!(shim.values().all(|m| m == METRIC_LATENCY));
        assert!(sink.warnings().is_empty());
    }

    #[test]
    fn test_destination_configured_first() {
        let (profile, _) = resolve_with(fixture(), latency_settings("gr:in0:other:gm0"));
        let order: Vec<_> = profile.latency().order().iter().map(|t| t.col).collect();
        assert_eq!(order, vec![2, 0]);
        assert_eq!(profile.latency().get((0, 0, 3)).unwrap().tranx_no, 0);
    }

    #[test]
    fn test_pair_key_cached_and_reversible() {
        let (profile, _) = resolve_with(fixture(), latency_settings("gr:in0:other:gm0:5"));
        let pairs = profile.latency();

        let from_src = pairs.src_dest_pair_key(0, 0, 3).unwrap();
        let from_dest = pairs.src_dest_pair_key(2, 0, 1).unwrap();
        assert_eq!(from_src, from_dest);
        // Same cached string, not a recomputed copy
        assert!(std::ptr::eq(from_src, pairs.src_dest_pair_key(0, 0, 3).unwrap()));

        let names = pairs.src_dest_graph_pair(from_src).unwrap();
        assert_eq!(names.src_port, "in0");
        assert_eq!(names.dest_graph, "other");
    }

    #[test]
    fn test_unknown_keys_are_errors() {
        let (profile, _) = resolve_with(fixture(), latency_settings("gr:in0:other:gm0"));
        assert_eq!(
            profile.latency().src_dest_pair_key(1, 0, 0),
            Err(LatencyError::UnknownTile(1, 0, 0))
        );
        assert!(matches!(
            profile.latency().src_dest_graph_pair("bogus"),
            Err(LatencyError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_unresolved_port_is_info_only() {
        let (profile, sink) = resolve_with(fixture(), latency_settings("gr:nope:other:gm0:5"));
        assert!(profile.latency().is_empty());
        assert!(sink.warnings().is_empty());
        assert_eq!(sink.count_containing(Severity::Info, "gr:nope"), 1);
    }

    #[test]
    fn test_bad_transaction_count_skips_only_that_entry() {
        let value = "gr:in0:other:gm0:lots; gr:out0:other:gm0:7";
        let (profile, sink) = resolve_with(fixture(), latency_settings(value));

        assert_eq!(sink.count_containing(Severity::Warning, "Transaction count lots"), 1);
        assert_eq!(profile.latency().len(), 2);
        assert_eq!(profile.latency().get((0, 0, 5)).unwrap().tranx_no, 7);

        let (profile, _) = resolve_with(fixture(), latency_settings("gr:in0:other:gm0:99999999999"));
        assert!(profile.latency().is_empty());
    }

    #[test]
    fn test_ambiguous_port_skipped() {
        // Both gr ports sit on column 0, so "all" names two streams there
        let (profile, sink) = resolve_with(fixture(), latency_settings("gr:all:other:gm0:5"));
        assert!(profile.latency().is_empty());
        assert!(profile.config_metrics(ModuleType::Shim).is_empty());
        assert_eq!(sink.count_containing(Severity::Warning, "Latency port gr:all"), 1);

        let (profile, sink) = resolve_with(fixture(), latency_settings("all:all:gr:out0"));
        assert!(profile.latency().is_empty());
        assert_eq!(sink.count_containing(Severity::Warning, "matches 3 streams"), 1);
    }

    #[test]
    fn test_same_column_pair_keeps_both_endpoints() {
        let (profile, sink) = resolve_with(fixture(), latency_settings("gr:in0:gr:out0"));
        let pairs = profile.latency();
        assert!(sink.warnings().is_empty());
        assert_eq!(pairs.len(), 2);
        assert!(pairs.get((0, 0, 3)).unwrap().is_source);
        assert!(!pairs.get((0, 0, 5)).unwrap().is_source);

        let order: Vec<_> = pairs.order().iter().map(|t| t.stream_id(0)).collect();
        assert_eq!(order, vec![5, 3]);
    }

    #[test]
    fn test_wrong_field_count_warns() {
        let (profile, sink) = resolve_with(fixture(), latency_settings("gr:in0:other"));
        assert!(profile.latency().is_empty());
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_threshold_lookup() {
        let (profile, _) = resolve_with(fixture(), latency_settings("gr:in0:other:gm0:5"));
        let src = profile.latency().get((0, 0, 3)).unwrap().src.clone();
        assert_eq!(profile.user_specified_threshold(&src, METRIC_LATENCY), 5);
        assert_eq!(profile.user_specified_threshold(&src, "input_throughputs"), 0);
    }
}
