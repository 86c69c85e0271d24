//! Stream switch port monitors.
//!
//! Port events in a metric's event list name a logical monitor number
//! (`PortRunning(0)`, `PortStalled(1)`, ...). Each distinct logical number on
//! a tile gets one reserved monitor, pointed at the port the metric observes:
//!
//! ```text
//! module     metric           monitored port
//! ---------  ---------------  ---------------------------------------
//! core       *trace*          TRACE slave, 1 (memory) / 0 (core)
//! core       other            DMA slave (input) / master, channel
//! shim       any              SOUTH master/slave of the IO, stream id
//! mem_tile   *trace*          TRACE slave 0
//! mem_tile   other            DMA master (input) / slave, channel
//! ```
//!
//! The event is then rewritten to the reserved monitor's index.

use std::collections::BTreeMap;

use super::resource::{PortHandle, PortKind, PortSelection, ResourceManager};
use crate::device::{ModuleType, Tile};
use crate::metrics::{is_input_set, CoreEvent, Event, EventList};

/// Channel monitored by logical port `port`.
#[inline]
pub fn channel_for_port(port: u8, channels: (u8, u8)) -> u8 {
    if port == 0 {
        channels.0
    } else {
        channels.1
    }
}

/// Port a monitor must observe for `start` in `module`.
///
/// Returns `None` for modules without stream switch monitors.
pub fn port_selection(
    module: ModuleType,
    tile: &Tile,
    metric: &str,
    start: Event,
    port: u8,
    channel: u8,
) -> Option<PortSelection> {
    let is_trace = metric.contains("trace");
    let selection = match module {
        ModuleType::Core | ModuleType::Dma if is_trace => {
            let select = u8::from(start == Event::Core(CoreEvent::PortRunning(0)));
            PortSelection {
                kind: PortKind::Trace,
                is_master: false,
                id: select,
            }
        }
        ModuleType::Core | ModuleType::Dma => PortSelection {
            kind: PortKind::Dma,
            is_master: !is_input_set(module, metric),
            id: channel,
        },
        ModuleType::Shim => PortSelection {
            kind: PortKind::South,
            is_master: tile.is_master_port(port),
            id: tile.stream_id(port),
        },
        ModuleType::MemTile if is_trace => PortSelection {
            kind: PortKind::Trace,
            is_master: false,
            id: 0,
        },
        ModuleType::MemTile => PortSelection {
            kind: PortKind::Dma,
            is_master: is_input_set(module, metric),
            id: channel,
        },
        ModuleType::Uc => return None,
    };
    Some(selection)
}

/// Reserve port monitors for the port events among the first `count`
/// events and rewrite those events onto the reserved monitors.
///
/// A failed reservation leaves the event untouched. Returns the reserved
/// monitors so they can be released later.
#[allow(clippy::too_many_arguments)]
pub fn configure_stream_ports(
    resources: &dyn ResourceManager,
    tile: &Tile,
    module: ModuleType,
    metric: &str,
    channels: (u8, u8),
    count: usize,
    start_events: &mut EventList,
    end_events: &mut EventList,
) -> Vec<PortHandle> {
    let mut monitors: BTreeMap<u8, PortHandle> = BTreeMap::new();

    for i in 0..count.min(start_events.len()) {
        let start = start_events[i];
        let Some(port) = start.port_number() else {
            continue;
        };

        let handle = match monitors.get(&port) {
            Some(handle) => *handle,
            None => {
                let channel = channel_for_port(port, channels);
                let Some(selection) = port_selection(module, tile, metric, start, port, channel)
                else {
                    continue;
                };
                match resources.reserve_stream_port(tile.loc(), module, selection) {
                    Ok(handle) => {
                        log::debug!(
                            "Configured {} stream switch on tile {} to monitor {} for metric set {}",
                            module,
                            tile,
                            selection,
                            metric
                        );
                        monitors.insert(port, handle);
                        handle
                    }
                    Err(e) => {
                        log::debug!("Port monitor reservation failed: {}", e);
                        continue;
                    }
                }
            }
        };

        let monitored = start.with_port(handle.index);
        start_events[i] = monitored;
        if let Some(end) = end_events.get_mut(i) {
            *end = monitored;
        }
    }

    monitors.into_values().collect()
}
