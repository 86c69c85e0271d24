//! Counter payloads.
//!
//! A payload is an extra 64-bit value reported with every sample of a
//! counter so writers can interpret it:
//!
//! ```text
//!  bits 16..   max BD size in bytes (AIE1 finished-BD counters only)
//!  bit  8      is master
//!  bit  7      id is a DMA channel (else a stream id)
//!  bits 0..6   channel / stream id
//! ```

use super::resource::{ResourceError, ResourceManager};
use crate::device::{IoType, ModuleType, Tile};
use crate::metrics::{is_input_set, Event, METRIC_BYTE_COUNT, METRIC_LATENCY};

pub const PAYLOAD_IS_MASTER_SHIFT: u32 = 8;
pub const PAYLOAD_IS_CHANNEL_SHIFT: u32 = 7;
pub const PAYLOAD_BD_SIZE_SHIFT: u32 = 16;

/// First memory-module buffer descriptor (AIE1).
pub const DMA_BD_BASE: u32 = 0x1D000;
pub const DMA_BD_STRIDE: u32 = 0x20;
pub const DMA_BD_CTRL_OFFSET: u32 = 0x18;
pub const DMA_BD_COUNT: u32 = 8;
pub const DMA_BD_LENGTH_MASK: u32 = 0x1FFF;
pub const DMA_BD_VALID: u32 = 1 << 31;
const BYTES_PER_WORD: u32 = 4;

/// Pack direction, id kind and id.
#[inline]
pub fn encode(is_master: bool, is_channel: bool, id: u8) -> u64 {
    (u64::from(is_master) << PAYLOAD_IS_MASTER_SHIFT)
        | (u64::from(is_channel) << PAYLOAD_IS_CHANNEL_SHIFT)
        | u64::from(id)
}

/// Interface tile payload: GMIO reports the channel, PLIO the stream id of
/// the monitored port.
pub fn interface_payload(tile: &Tile, start: Event, channel: u8) -> u64 {
    let port = start.port_number().unwrap_or(0);
    let is_gmio = tile.subtype == IoType::Gmio;
    let id = if is_gmio { channel } else { tile.stream_id(port) };
    encode(tile.is_master_port(port), is_gmio, id)
}

/// Payload of a counter counting `start` for `metric` on `tile`.
pub fn counter_payload(
    resources: &dyn ResourceManager,
    tile: &Tile,
    module: ModuleType,
    metric: &str,
    start: Event,
    channel: u8,
    hw_gen: u8,
) -> Result<u64, ResourceError> {
    match metric {
        METRIC_LATENCY => return Ok(interface_payload(tile, start, channel)),
        METRIC_BYTE_COUNT => return Ok(0),
        _ => {}
    }

    if module == ModuleType::Shim {
        return Ok(interface_payload(tile, start, channel));
    }

    let payload = encode(is_input_set(module, metric), true, channel);
    if module == ModuleType::MemTile || hw_gen != 1 || !start.is_finished_bd() {
        return Ok(payload);
    }

    let max_bd = max_bd_size(resources, tile)?;
    Ok(payload | (u64::from(max_bd) << PAYLOAD_BD_SIZE_SHIFT))
}

/// Largest valid buffer descriptor transfer size in bytes.
pub fn max_bd_size(resources: &dyn ResourceManager, tile: &Tile) -> Result<u32, ResourceError> {
    let mut max = 0;
    for bd in 0..DMA_BD_COUNT {
        let offset = DMA_BD_BASE + bd * DMA_BD_STRIDE + DMA_BD_CTRL_OFFSET;
        let value = resources.read_register(tile.loc(), offset)?;
        if value & DMA_BD_VALID != 0 {
            max = max.max(BYTES_PER_WORD * ((value & DMA_BD_LENGTH_MASK) + 1));
        }
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{arch_for_generation, SimulatedDevice};
    use crate::metrics::{MemoryEvent, PlEvent};

    fn bd_offset(bd: u32) -> u32 {
        DMA_BD_BASE + bd * DMA_BD_STRIDE + DMA_BD_CTRL_OFFSET
    }

    #[test]
    fn test_interface_encoding() {
        let gmio = Tile::interface(2, IoType::Gmio, 1, true);
        let e = Event::Pl(PlEvent::PortRunning(0));
        assert_eq!(interface_payload(&gmio, e, 3), (1 << 8) | (1 << 7) | 3);

        let plio = Tile::interface(0, IoType::Plio, 5, false);
        assert_eq!(interface_payload(&plio, e, 3), 5);
    }

    #[test]
    fn test_memory_tile_encoding() {
        let device = SimulatedDevice::new(arch_for_generation(2));
        let tile = Tile::new(2, 1);
        let p = counter_payload(&device, &tile, ModuleType::MemTile, "input_channels", Event::None, 2, 2)
            .unwrap();
        assert_eq!(p, (1 << 8) | (1 << 7) | 2);
        let p = counter_payload(&device, &tile, ModuleType::MemTile, "output_channels", Event::None, 0, 2)
            .unwrap();
        assert_eq!(p, 1 << 7);
    }

    #[test]
    fn test_profile_api_payloads() {
        let device = SimulatedDevice::new(arch_for_generation(2));
        let tile = Tile::interface(0, IoType::Plio, 3, false);
        let start = Event::Pl(PlEvent::PortRunning(0));
        let p = counter_payload(&device, &tile, ModuleType::Shim, METRIC_BYTE_COUNT, start, 0, 2).unwrap();
        assert_eq!(p, 0);
        let p = counter_payload(&device, &tile, ModuleType::Shim, METRIC_LATENCY, start, 0, 2).unwrap();
        assert_eq!(p, 3);
    }

    #[test]
    fn test_bd_size_only_on_aie1_finished_bd() {
        let device = SimulatedDevice::new(arch_for_generation(1));
        let tile = Tile::new(1, 1);
        device.write_register(tile.loc(), bd_offset(0), DMA_BD_VALID | 15);
        device.write_register(tile.loc(), bd_offset(3), DMA_BD_VALID | 255);
        // Not valid: ignored even though larger
        device.write_register(tile.loc(), bd_offset(5), 4000);

        assert_eq!(max_bd_size(&device, &tile).unwrap(), 1024);

        let finished = Event::Memory(MemoryEvent::S2mmFinishedBd(0));
        let p = counter_payload(&device, &tile, ModuleType::Dma, "s2mm_throughputs", finished, 0, 1)
            .unwrap();
        assert_eq!(p, (1024 << 16) | (1 << 7));

        let p = counter_payload(&device, &tile, ModuleType::Dma, "s2mm_throughputs", finished, 0, 2)
            .unwrap();
        assert_eq!(p, 1 << 7);
    }
}
