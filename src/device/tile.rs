//! AIE tile identity as seen by the profiler.
//!
//! A [`Tile`] names one physical location in the array plus the attributes
//! the metric resolver cares about: whether a core or DMA is actually used by
//! the application graph, and for interface tiles the kind of IO and the
//! stream switch ports it uses.
//!
//! Tiles compare, order and hash by `(col, row)` only, so they can be used as
//! map keys regardless of the extra attributes attached during resolution.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Kind of interface tile IO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    /// Programmable-logic stream IO.
    #[default]
    Plio,
    /// Global-memory IO through the shim DMA.
    Gmio,
}

/// Physical tile coordinates, without any profiling attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TileLoc {
    pub col: u8,
    pub row: u8,
}

impl TileLoc {
    #[inline]
    pub fn new(col: u8, row: u8) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for TileLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.col, self.row)
    }
}

/// A tile participating in profiling.
#[derive(Debug, Clone, Default)]
pub struct Tile {
    /// Absolute column.
    pub col: u8,
    /// Absolute row (row 0 is the interface row).
    pub row: u8,
    /// Core is used by the application.
    pub active_core: bool,
    /// Memory module / DMA is used by the application.
    pub active_memory: bool,
    /// IO kind for interface tiles.
    pub subtype: IoType,
    /// Stream switch port ids of the IOs mapped to this interface tile.
    pub stream_ids: Vec<u8>,
    /// Master flag per entry of `stream_ids` (master = data leaving the array).
    pub is_master: Vec<bool>,
}

impl Tile {
    /// Create a tile with both modules marked active.
    pub fn new(col: u8, row: u8) -> Self {
        Self {
            col,
            row,
            active_core: true,
            active_memory: true,
            ..Default::default()
        }
    }

    /// Create an interface tile for a single IO.
    pub fn interface(col: u8, subtype: IoType, stream_id: u8, is_master: bool) -> Self {
        Self {
            col,
            row: 0,
            active_core: false,
            active_memory: false,
            subtype,
            stream_ids: vec![stream_id],
            is_master: vec![is_master],
        }
    }

    /// Builder-style activity override.
    pub fn with_activity(mut self, active_core: bool, active_memory: bool) -> Self {
        self.active_core = active_core;
        self.active_memory = active_memory;
        self
    }

    #[inline]
    pub fn loc(&self) -> TileLoc {
        TileLoc::new(self.col, self.row)
    }

    /// Stream id monitored by stream-switch port `port`, or 0 when the tile
    /// has fewer streams.
    pub fn stream_id(&self, port: u8) -> u8 {
        self.stream_ids.get(port as usize).copied().unwrap_or(0)
    }

    /// Master flag for stream-switch port `port` (slave when unknown).
    pub fn is_master_port(&self, port: u8) -> bool {
        self.is_master.get(port as usize).copied().unwrap_or(false)
    }

    /// Merge the IO list of another tile at the same location.
    pub fn merge_streams(&mut self, other: &Tile) {
        self.stream_ids.extend_from_slice(&other.stream_ids);
        self.is_master.extend_from_slice(&other.is_master);
    }
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.col == other.col && self.row == other.row
    }
}

impl Eq for Tile {}

impl PartialOrd for Tile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tile {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.col, self.row).cmp(&(other.col, other.row))
    }
}

impl Hash for Tile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.col.hash(state);
        self.row.hash(state);
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.col, self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_equality_ignores_attributes() {
        let a = Tile::new(2, 3);
        let b = Tile::interface(2, IoType::Gmio, 4, true);
        let c = Tile { row: 3, ..b.clone() };
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_ordering_is_column_major() {
        let mut map = BTreeMap::new();
        map.insert(Tile::new(1, 5), "b");
        map.insert(Tile::new(0, 9), "a");
        map.insert(Tile::new(1, 2), "c");

        let keys: Vec<_> = map.keys().map(|t| (t.col, t.row)).collect();
        assert_eq!(keys, vec![(0, 9), (1, 2), (1, 5)]);
    }

    #[test]
    fn test_stream_lookup() {
        let mut tile = Tile::interface(3, IoType::Plio, 7, false);
        tile.merge_streams(&Tile::interface(3, IoType::Plio, 2, true));

        assert_eq!(tile.stream_id(0), 7);
        assert_eq!(tile.stream_id(1), 2);
        assert_eq!(tile.stream_id(5), 0);
        assert!(!tile.is_master_port(0));
        assert!(tile.is_master_port(1));
        assert!(!tile.is_master_port(9));
    }

    #[test]
    fn test_display() {
        assert_eq!(Tile::new(4, 2).to_string(), "(4,2)");
        assert_eq!(TileLoc::new(0, 1).to_string(), "(0,1)");
    }
}
