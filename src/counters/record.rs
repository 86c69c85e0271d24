//! Counter table and polled samples.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::device::ModuleType;

/// One configured performance counter, as reported to writers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterRecord {
    pub counter_id: u32,
    pub column: u8,
    /// Absolute row.
    pub row: u8,
    /// Index of the counter within its metric set.
    pub counter_number: u8,
    /// Physical start event plus the module's counter base.
    pub start_event: u16,
    pub end_event: u16,
    pub reset_event: u16,
    pub payload: u64,
    pub clock_freq_mhz: f64,
    pub module_name: String,
    pub counter_name: String,
}

/// One polled sample.
///
/// `values` are `[column, relative row, start event, end event, reset event,
/// counter value, timer, payload]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AieSample {
    pub timestamp_ms: u64,
    pub values: [u64; 8],
}

impl AieSample {
    pub fn counter_value(&self) -> u64 {
        self.values[5]
    }
}

/// Counters-per-tile histogram of one module: `counters -> tiles`.
pub type TileHistogram = BTreeMap<usize, usize>;

/// Format a histogram as `"<module> - 1: 1 tiles, 4: 2 tiles"`.
///
/// Entries with zero tiles are omitted; `None` when nothing was reserved.
pub fn histogram_summary(module: ModuleType, histogram: &TileHistogram) -> Option<String> {
    let parts: Vec<String> = histogram
        .iter()
        .filter(|(_, tiles)| **tiles > 0)
        .map(|(counters, tiles)| format!("{}: {} tiles", counters, tiles))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("{} - {}", module, parts.join(", ")))
}
