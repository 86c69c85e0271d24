//! Byte and transaction thresholds for profile-API metric sets.
//!
//! Byte counts accept an optional binary unit suffix:
//!
//! ```text
//! "512"  -> 512
//! "4K"   -> 4096
//! "2M"   -> 2097152
//! "-8K"  -> 8192        (magnitude only)
//! "8KB"  -> DEFAULT_NUM_BYTES
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::ProfileMetadata;
use crate::device::Tile;
use crate::metrics::{METRIC_BYTE_COUNT, METRIC_LATENCY};

/// Byte count used when the user value cannot be parsed.
pub const DEFAULT_NUM_BYTES: u32 = 1;

static BYTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(-?\d+)([KMG])?$").unwrap());

/// Parse a user byte count such as `"16K"`.
///
/// The result saturates at `u32::MAX`. Invalid input yields
/// [`DEFAULT_NUM_BYTES`].
pub fn process_user_specified_bytes(input: &str) -> u32 {
    let Some(caps) = BYTES.captures(input) else {
        return DEFAULT_NUM_BYTES;
    };
    let Ok(value) = caps[1].parse::<i128>() else {
        return DEFAULT_NUM_BYTES;
    };

    let unit: u128 = match caps.get(2).map(|m| m.as_str()) {
        Some("K") => 1 << 10,
        Some("M") => 1 << 20,
        Some("G") => 1 << 30,
        _ => 1,
    };

    u32::try_from(value.unsigned_abs().saturating_mul(unit)).unwrap_or(u32::MAX)
}

impl ProfileMetadata {
    /// Threshold configured for `metric` on `tile`, or 0.
    ///
    /// Byte-count tiles report their byte threshold, latency tiles their
    /// transaction count.
    pub fn user_specified_threshold(&self, tile: &Tile, metric: &str) -> u32 {
        match metric {
            METRIC_BYTE_COUNT => self.bytes_to_transfer.get(tile).copied().unwrap_or(0),
            METRIC_LATENCY => self
                .latency
                .config_for(tile)
                .map_or(0, |config| config.tranx_no),
            _ => 0,
        }
    }

    /// Convert a byte count to stream beats on this device.
    pub fn convert_to_beats(&self, bytes: u32) -> u32 {
        bytes / self.arch.bytes_per_beat()
    }

    pub fn bytes_to_transfer(&self) -> &std::collections::BTreeMap<Tile, u32> {
        &self.bytes_to_transfer
    }
}
