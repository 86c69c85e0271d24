//! Architecture configuration trait and implementations.
//!
//! Profiling decisions that depend on the hardware generation (row layout,
//! counter pool sizes, stream width) go through [`ArchConfig`] instead of
//! checking generation numbers inline.
//!
//! # Example
//!
//! ```
//! use aie_profile::device::arch_config::{arch_for_generation, ArchConfig};
//! use aie_profile::device::ModuleType;
//!
//! let arch = arch_for_generation(2);
//! assert_eq!(arch.aie_tile_row_start(), 2);
//! assert_eq!(arch.module_for_row(1), ModuleType::MemTile);
//! assert_eq!(arch.counters_per_module(ModuleType::Core), 4);
//! ```

use std::sync::Arc;

use super::ModuleType;

/// Architecture parameters relevant to profiling.
pub trait ArchConfig: Send + Sync + std::fmt::Debug {
    /// Hardware generation number (1 = AIE, 2 = AIE-ML, 5 = AIE2PS).
    fn generation(&self) -> u8;

    /// First row holding AIE (core) tiles.
    fn aie_tile_row_start(&self) -> u8;

    /// Number of performance counters in one module of the given type.
    fn counters_per_module(&self, module: ModuleType) -> usize;

    /// Width of a stream beat in bits.
    fn stream_width_bits(&self) -> u32;

    /// Get the architecture name for display.
    fn name(&self) -> &'static str;

    /// Memory tiles exist on this generation.
    fn has_mem_tiles(&self) -> bool {
        self.aie_tile_row_start() > 1
    }

    /// Microcontrollers exist on this generation.
    fn has_microcontrollers(&self) -> bool {
        self.generation() >= 5
    }

    /// Module type owning the tile in `row` (core modules for AIE rows).
    fn module_for_row(&self, row: u8) -> ModuleType {
        ModuleType::from_row(row, self.aie_tile_row_start())
    }

    /// Bytes carried by one stream beat.
    fn bytes_per_beat(&self) -> u32 {
        self.stream_width_bits() / 8
    }
}

/// First-generation AI Engine (no memory tiles).
#[derive(Debug, Clone, Copy, Default)]
pub struct Aie1Config;

impl ArchConfig for Aie1Config {
    fn generation(&self) -> u8 {
        1
    }

    fn aie_tile_row_start(&self) -> u8 {
        1
    }

    fn counters_per_module(&self, module: ModuleType) -> usize {
        match module {
            ModuleType::Core => 4,
            ModuleType::Dma | ModuleType::Shim => 2,
            ModuleType::MemTile | ModuleType::Uc => 0,
        }
    }

    fn stream_width_bits(&self) -> u32 {
        32
    }

    fn name(&self) -> &'static str {
        "AIE1"
    }
}

/// AIE-ML (one row of memory tiles).
#[derive(Debug, Clone, Copy, Default)]
pub struct Aie2Config;

impl ArchConfig for Aie2Config {
    fn generation(&self) -> u8 {
        2
    }

    fn aie_tile_row_start(&self) -> u8 {
        2
    }

    fn counters_per_module(&self, module: ModuleType) -> usize {
        match module {
            ModuleType::Core | ModuleType::MemTile => 4,
            ModuleType::Dma | ModuleType::Shim => 2,
            ModuleType::Uc => 0,
        }
    }

    fn stream_width_bits(&self) -> u32 {
        32
    }

    fn name(&self) -> &'static str {
        "AIE2"
    }
}

/// AIE2PS (memory tiles plus interface microcontrollers).
#[derive(Debug, Clone, Copy, Default)]
pub struct Aie2psConfig;

impl ArchConfig for Aie2psConfig {
    fn generation(&self) -> u8 {
        5
    }

    fn aie_tile_row_start(&self) -> u8 {
        2
    }

    fn counters_per_module(&self, module: ModuleType) -> usize {
        match module {
            ModuleType::Core | ModuleType::MemTile | ModuleType::Uc => 4,
            ModuleType::Dma | ModuleType::Shim => 2,
        }
    }

    fn stream_width_bits(&self) -> u32 {
        64
    }

    fn name(&self) -> &'static str {
        "AIE2PS"
    }
}

/// Pick the architecture for a reported hardware generation.
///
/// Unknown generations fall back to AIE2, the most common layout.
pub fn arch_for_generation(generation: u8) -> Arc<dyn ArchConfig> {
    match generation {
        1 => Arc::new(Aie1Config),
        5.. => Arc::new(Aie2psConfig),
        _ => Arc::new(Aie2Config),
    }
}
