//! Device model used by the profiler.
//!
//! This module provides:
//! - Module types (which counter pool a metric lives in)
//! - Tile identity with profiling attributes
//! - Architecture parameters per hardware generation
//! - A simulated device implementing the counter resource manager
//!
//! # Array Layout
//!
//! ```text
//!     Col 0    Col 1    Col 2    Col 3
//!   +--------+--------+--------+--------+
//! 3 | AIE    | AIE    | AIE    | AIE    |  core + memory module
//!   +--------+--------+--------+--------+
//! 2 | AIE    | AIE    | AIE    | AIE    |  <- aie_tile_row_start
//!   +--------+--------+--------+--------+
//! 1 |MemTile |MemTile |MemTile |MemTile |  memory tiles (AIE2+)
//!   +--------+--------+--------+--------+
//! 0 | Shim   | Shim   | Shim   | Shim   |  interface tiles (+ uC on AIE2PS)
//!   +--------+--------+--------+--------+
//! ```
//!
//! User settings address AIE and memory tiles with rows relative to the
//! first row of their kind; internally every tile uses absolute rows.

pub mod arch_config;
pub mod sim;
pub mod tile;

pub use arch_config::{arch_for_generation, ArchConfig};
pub use sim::SimulatedDevice;
pub use tile::{IoType, Tile, TileLoc};

use std::fmt;

/// Profiled module type.
///
/// Each variant owns one configuration map and one counter pool per tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleType {
    /// AIE core module.
    Core,
    /// Memory module next to an AIE core (DMA, locks, banks).
    Dma,
    /// Interface (shim) tile.
    Shim,
    /// Standalone memory tile.
    MemTile,
    /// Interface microcontroller.
    Uc,
}

impl ModuleType {
    /// All module types in configuration-map order.
    pub const ALL: [ModuleType; 5] = [
        ModuleType::Core,
        ModuleType::Dma,
        ModuleType::Shim,
        ModuleType::MemTile,
        ModuleType::Uc,
    ];

    /// Number of module types.
    pub const COUNT: usize = Self::ALL.len();

    /// Index of this module's configuration map.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            ModuleType::Core => 0,
            ModuleType::Dma => 1,
            ModuleType::Shim => 2,
            ModuleType::MemTile => 3,
            ModuleType::Uc => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Name used in settings keys and reports.
    pub fn name(self) -> &'static str {
        match self {
            ModuleType::Core => "aie",
            ModuleType::Dma => "aie_memory",
            ModuleType::Shim => "interface_tile",
            ModuleType::MemTile => "memory_tile",
            ModuleType::Uc => "microcontroller",
        }
    }

    /// Module type owning the tile at `row`.
    ///
    /// AIE rows report `Core`; callers profiling the memory module of an
    /// AIE tile map it to `Dma` themselves.
    pub fn from_row(row: u8, aie_tile_row_start: u8) -> Self {
        if row == 0 {
            ModuleType::Shim
        } else if row < aie_tile_row_start {
            ModuleType::MemTile
        } else {
            ModuleType::Core
        }
    }

    /// Row offset between user-facing and absolute rows.
    pub fn row_offset(self, aie_tile_row_start: u8) -> u8 {
        match self {
            ModuleType::Core | ModuleType::Dma => aie_tile_row_start,
            ModuleType::MemTile => 1,
            ModuleType::Shim | ModuleType::Uc => 0,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Convert an absolute row to the user-facing relative row.
pub fn relative_row(row: u8, aie_tile_row_start: u8) -> u8 {
    match ModuleType::from_row(row, aie_tile_row_start) {
        ModuleType::Shim => 0,
        ModuleType::MemTile => row - 1,
        _ => row - aie_tile_row_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_indices_round_trip() {
        for (i, module) in ModuleType::ALL.iter().enumerate() {
            assert_eq!(module.index(), i);
            assert_eq!(ModuleType::from_index(i), Some(*module));
        }
        assert_eq!(ModuleType::from_index(ModuleType::COUNT), None);
    }

    #[test]
    fn test_tile_classification() {
        assert_eq!(ModuleType::from_row(0, 2), ModuleType::Shim);
        assert_eq!(ModuleType::from_row(1, 2), ModuleType::MemTile);
        assert_eq!(ModuleType::from_row(2, 2), ModuleType::Core);
        assert_eq!(ModuleType::from_row(1, 1), ModuleType::Core);
    }

    #[test]
    fn test_row_offsets() {
        assert_eq!(ModuleType::Core.row_offset(2), 2);
        assert_eq!(ModuleType::Dma.row_offset(3), 3);
        assert_eq!(ModuleType::MemTile.row_offset(2), 1);
        assert_eq!(ModuleType::Shim.row_offset(2), 0);
    }

    #[test]
    fn test_relative_row() {
        assert_eq!(relative_row(0, 2), 0);
        assert_eq!(relative_row(1, 2), 0);
        assert_eq!(relative_row(5, 2), 3);
        assert_eq!(relative_row(3, 1), 2);
    }

    #[test]
    fn test_names() {
        assert_eq!(ModuleType::Dma.to_string(), "aie_memory");
        assert_eq!(ModuleType::Uc.name(), "microcontroller");
    }
}
