//! Metric-set vocabulary.
//!
//! Every module type has a fixed set of metric-set names users may request.
//! Each name expands to an ordered list of logical events, one performance
//! counter per event.
//!
//! # Module Vocabularies
//!
//! ```text
//! Module          Default              Counter base
//! --------------  -------------------  ------------
//! aie             heat_map             0
//! aie_memory      conflicts            128
//! interface_tile  input_throughputs    256
//! memory_tile     input_channels       384
//! microcontroller uc_core              512
//! ```
//!
//! Core and memory modules share the throughput sets (`write_throughputs`,
//! `read_throughputs`, `s2mm_throughputs`, `mm2s_throughputs`): requesting one
//! of them on either module configures the same set on the other module of
//! the same tile.

pub mod events;
pub mod sets;

pub use events::{CoreEvent, Event, MemTileEvent, MemoryEvent, PlEvent, PortEventKind, UcEvent};
pub use sets::event_list;

use smallvec::SmallVec;

use crate::device::{IoType, ModuleType};

/// Events of one metric set.
pub type EventList = SmallVec<[Event; 4]>;

/// Interface tile latency between two graph ports.
pub const METRIC_LATENCY: &str = "interface_tile_latency";

/// Cycles from stream start until a number of bytes has been transferred.
pub const METRIC_BYTE_COUNT: &str = "start_to_bytes_transferred";

/// Event id reported for latency counters.
pub const LATENCY_EVENT_ID: u16 = 3600;

/// Event id reported for byte-count counters.
pub const BYTE_COUNT_EVENT_ID: u16 = 3601;

const CORE_SETS: &[&str] = &[
    "heat_map",
    "stalls",
    "execution",
    "floating_point",
    "stream_put_get",
    "write_throughputs",
    "read_throughputs",
    "s2mm_throughputs",
    "mm2s_throughputs",
    "aie_trace",
    "events",
];

const MEMORY_SETS: &[&str] = &[
    "conflicts",
    "dma_locks",
    "dma_stalls_s2mm",
    "dma_stalls_mm2s",
    "write_throughputs",
    "read_throughputs",
    "s2mm_throughputs",
    "mm2s_throughputs",
];

const INTERFACE_SETS: &[&str] = &[
    "input_throughputs",
    "output_throughputs",
    "s2mm_throughputs",
    "mm2s_throughputs",
    "input_stalls",
    "output_stalls",
    "s2mm_stalls",
    "mm2s_stalls",
    "packets",
    METRIC_LATENCY,
    METRIC_BYTE_COUNT,
];

const MEM_TILE_SETS: &[&str] = &[
    "input_channels",
    "input_channels_details",
    "output_channels",
    "output_channels_details",
    "s2mm_channels",
    "s2mm_channels_details",
    "mm2s_channels",
    "mm2s_channels_details",
    "memory_stats",
    "mem_trace",
    "input_throughputs",
    "output_throughputs",
    "s2mm_throughputs",
    "mm2s_throughputs",
    "conflict_stats1",
    "conflict_stats2",
    "conflict_stats3",
    "conflict_stats4",
];

const UC_SETS: &[&str] = &["uc_dma", "uc_axis", "uc_core", "uc_program_flow"];

/// Supported metric-set names for a module type.
pub fn metric_sets(module: ModuleType) -> &'static [&'static str] {
    match module {
        ModuleType::Core => CORE_SETS,
        ModuleType::Dma => MEMORY_SETS,
        ModuleType::Shim => INTERFACE_SETS,
        ModuleType::MemTile => MEM_TILE_SETS,
        ModuleType::Uc => UC_SETS,
    }
}

pub fn is_supported(module: ModuleType, metric: &str) -> bool {
    metric_sets(module).contains(&metric)
}

/// Metric set substituted for unsupported names.
pub fn default_metric_set(module: ModuleType) -> &'static str {
    match module {
        ModuleType::Core => "heat_map",
        ModuleType::Dma => "conflicts",
        ModuleType::Shim => "input_throughputs",
        ModuleType::MemTile => "input_channels",
        ModuleType::Uc => "uc_core",
    }
}

/// Offset added to physical event ids when reporting.
pub fn counter_base(module: ModuleType) -> u16 {
    match module {
        ModuleType::Core => 0,
        ModuleType::Dma => 128,
        ModuleType::Shim => 256,
        ModuleType::MemTile => 384,
        ModuleType::Uc => 512,
    }
}

/// Module that must carry the same metric set on the same tile.
///
/// Only core and memory modules pair, and only for names present in both
/// vocabularies.
pub fn pair_module(metric: &str, module: ModuleType) -> Option<ModuleType> {
    let other = match module {
        ModuleType::Core => ModuleType::Dma,
        ModuleType::Dma => ModuleType::Core,
        _ => return None,
    };
    (is_supported(module, metric) && is_supported(other, metric)).then_some(other)
}

/// Metric set measures data flowing into the array (MM2S direction).
///
/// Memory tiles name directions from the tile's point of view, so their
/// input sets are the S2MM ones.
pub fn is_input_set(module: ModuleType, metric: &str) -> bool {
    if module == ModuleType::MemTile {
        return metric.contains("input") || metric.contains("s2mm");
    }
    metric.contains("input") || metric.contains("mm2s")
}

/// Metric set is driven through the graph profiling API.
pub fn is_profile_api_metric(metric: &str) -> bool {
    metric == METRIC_LATENCY || metric == METRIC_BYTE_COUNT
}

/// Reserved event id reported for profile-API counters.
pub fn reserved_event_id(metric: &str) -> Option<u16> {
    match metric {
        METRIC_LATENCY => Some(LATENCY_EVENT_ID),
        METRIC_BYTE_COUNT => Some(BYTE_COUNT_EVENT_ID),
        _ => None,
    }
}

/// Metric set can be deferred until a graph iteration is reached.
pub fn supports_graph_iterator(metric: &str) -> bool {
    metric == METRIC_BYTE_COUNT
}

/// Direction filter implied by an interface metric name.
///
/// Returns `Some(true)` for master (output) ports, `Some(false)` for slave
/// (input) ports, `None` when the metric does not restrict direction.
pub fn interface_polarity(metric: &str) -> Option<bool> {
    if metric == "packets" || is_profile_api_metric(metric) || metric.starts_with("uc_") {
        return None;
    }
    if metric.contains("input") || metric.contains("mm2s") {
        Some(false)
    } else if metric.contains("output") || metric.contains("s2mm") {
        Some(true)
    } else {
        None
    }
}

/// Rewrite a metric's events for the configured channel and IO type.
///
/// Memory-module and interface events on DMA channel 0 move to channel 1
/// when `channel > 0`. PLIO interface tiles, and all first-generation
/// devices, measure throughput with the port-stalled event instead of DMA
/// activity.
pub fn modify_events(
    module: ModuleType,
    subtype: IoType,
    channel: u8,
    events: &mut EventList,
    hw_gen: u8,
) {
    if module != ModuleType::Dma && module != ModuleType::Shim {
        return;
    }

    if channel > 0 {
        for event in events.iter_mut() {
            *event = event.to_channel1();
        }
    }

    if subtype == IoType::Plio || hw_gen == 1 {
        for event in events.iter_mut() {
            if *event == Event::Pl(PlEvent::GroupDmaActivity) {
                *event = Event::Pl(PlEvent::PortStalled(0));
            }
        }
    }
}
