//! Event lists behind each metric set.
//!
//! A metric set consumes one performance counter per event in its list. The
//! lists here are the logical events before channel and port rewrites; see
//! [`super::modify_events`] and the stream port configuration in
//! `counters::ports`.

use smallvec::smallvec;

use super::events::{CoreEvent, Event, MemTileEvent, MemoryEvent, PlEvent, UcEvent};
use super::{EventList, METRIC_BYTE_COUNT, METRIC_LATENCY};
use crate::device::ModuleType;

/// Event list for `metric` in `module`, or `None` for unknown sets.
pub fn event_list(module: ModuleType, metric: &str, hw_gen: u8) -> Option<EventList> {
    match module {
        ModuleType::Core => core_events(metric, hw_gen),
        ModuleType::Dma => memory_events(metric, hw_gen),
        ModuleType::Shim => interface_events(metric),
        ModuleType::MemTile => mem_tile_events(metric),
        ModuleType::Uc => uc_events(metric),
    }
}

fn core_events(metric: &str, hw_gen: u8) -> Option<EventList> {
    use CoreEvent::*;
    let c = Event::Core;
    let list: EventList = match metric {
        "heat_map" => smallvec![c(Active), c(GroupStall), c(InstrVector), c(GroupProgramFlow)],
        "stalls" => smallvec![c(MemoryStall), c(StreamStall), c(LockStall), c(CascadeStall)],
        "execution" => smallvec![c(InstrVector), c(InstrLoad), c(InstrStore), c(GroupProgramFlow)],
        "stream_put_get" => smallvec![
            c(InstrCascadeGet),
            c(InstrCascadePut),
            c(InstrStreamGet),
            c(InstrStreamPut)
        ],
        "write_throughputs" => smallvec![
            c(Active),
            c(InstrStreamPut),
            c(InstrCascadePut),
            c(GroupStall)
        ],
        "read_throughputs" => smallvec![
            c(Active),
            c(InstrStreamGet),
            c(InstrCascadeGet),
            c(GroupStall)
        ],
        "s2mm_throughputs" | "mm2s_throughputs" => smallvec![c(PortRunning(0)), c(PortStalled(0))],
        "aie_trace" => smallvec![
            c(PortRunning(0)),
            c(PortStalled(0)),
            c(PortRunning(1)),
            c(PortStalled(1))
        ],
        "events" => smallvec![c(InstrEvent(0)), c(InstrEvent(1)), c(UserEvent(0)), c(UserEvent(1))],
        "floating_point" if hw_gen == 1 => {
            smallvec![c(FpOverflow), c(FpUnderflow), c(FpInvalid), c(FpDivByZero)]
        }
        "floating_point" => smallvec![c(FpHuge), c(IntFp0), c(FpInvalid), c(FpInf)],
        _ => return None,
    };
    Some(list)
}

fn memory_events(metric: &str, hw_gen: u8) -> Option<EventList> {
    use MemoryEvent::*;
    let m = Event::Memory;
    let aie1 = hw_gen == 1;
    let list: EventList = match metric {
        "conflicts" => smallvec![m(GroupMemoryConflict), m(GroupErrors)],
        "dma_locks" => smallvec![m(GroupDmaActivity), m(GroupLock)],
        "dma_stalls_s2mm" if aie1 => {
            smallvec![m(S2mmStalledLockAcquire(0)), m(S2mmStalledLockAcquire(1))]
        }
        "dma_stalls_s2mm" => smallvec![m(S2mmStalledLock(0)), m(S2mmStalledLock(1))],
        "dma_stalls_mm2s" if aie1 => {
            smallvec![m(Mm2sStalledLockAcquire(0)), m(Mm2sStalledLockAcquire(1))]
        }
        "dma_stalls_mm2s" => smallvec![m(Mm2sStalledLock(0)), m(Mm2sStalledLock(1))],
        "s2mm_throughputs" | "write_throughputs" if aie1 => {
            smallvec![m(S2mmFinishedBd(0)), m(S2mmFinishedBd(1))]
        }
        "s2mm_throughputs" | "write_throughputs" => {
            smallvec![m(S2mmStalledLock(0)), m(S2mmMemoryBackpressure(0))]
        }
        "mm2s_throughputs" | "read_throughputs" if aie1 => {
            smallvec![m(Mm2sFinishedBd(0)), m(Mm2sFinishedBd(1))]
        }
        "mm2s_throughputs" | "read_throughputs" => {
            smallvec![m(Mm2sStreamBackpressure(0)), m(Mm2sMemoryStarvation(0))]
        }
        _ => return None,
    };
    Some(list)
}

fn interface_events(metric: &str) -> Option<EventList> {
    use PlEvent::*;
    let p = Event::Pl;
    let list: EventList = match metric {
        "packets" => smallvec![p(PortTlast(0)), p(PortTlast(1))],
        "input_throughputs" | "mm2s_throughputs" | "output_throughputs" | "s2mm_throughputs" => {
            smallvec![p(GroupDmaActivity), p(PortRunning(0))]
        }
        "input_stalls" | "mm2s_stalls" => {
            smallvec![p(Mm2sStreamBackpressure(0)), p(Mm2sMemoryStarvation(0))]
        }
        "output_stalls" | "s2mm_stalls" => {
            smallvec![p(S2mmMemoryBackpressure(0)), p(S2mmStalledLock(0))]
        }
        METRIC_LATENCY => smallvec![p(PortRunning(0)), p(PortRunning(0))],
        METRIC_BYTE_COUNT => smallvec![p(PortRunning(0)), p(PerfCnt(0))],
        _ => return None,
    };
    Some(list)
}

fn mem_tile_events(metric: &str) -> Option<EventList> {
    use MemTileEvent::*;
    let t = Event::MemTile;
    let list: EventList = match metric {
        "input_channels" | "s2mm_channels" => smallvec![
            t(PortRunning(0)),
            t(PortStalled(0)),
            t(PortTlast(0)),
            t(S2mmSelFinishedBd(0))
        ],
        "input_channels_details" | "s2mm_channels_details" => smallvec![
            t(PortRunning(0)),
            t(S2mmSelMemoryBackpressure(0)),
            t(S2mmSelStalledLock(0)),
            t(S2mmSelStreamStarvation(0))
        ],
        "output_channels" | "mm2s_channels" => smallvec![
            t(PortRunning(0)),
            t(PortStalled(0)),
            t(PortTlast(0)),
            t(Mm2sSelFinishedBd(0))
        ],
        "output_channels_details" | "mm2s_channels_details" => smallvec![
            t(PortRunning(0)),
            t(Mm2sSelStreamBackpressure(0)),
            t(Mm2sSelMemoryStarvation(0)),
            t(Mm2sSelStalledLock(0))
        ],
        "memory_stats" => smallvec![
            t(GroupMemoryConflict),
            t(GroupErrors),
            t(GroupLock),
            t(GroupWatchpoint)
        ],
        "mem_trace" => smallvec![
            t(PortRunning(0)),
            t(PortStalled(0)),
            t(PortIdle(0)),
            t(PortTlast(0))
        ],
        "input_throughputs" | "s2mm_throughputs" => smallvec![
            t(PortRunning(0)),
            t(S2mmSelStreamStarvation(0)),
            t(S2mmSelMemoryBackpressure(0)),
            t(S2mmSelStalledLock(0))
        ],
        "output_throughputs" | "mm2s_throughputs" => smallvec![
            t(PortRunning(0)),
            t(Mm2sSelStreamBackpressure(0)),
            t(Mm2sSelMemoryStarvation(0)),
            t(Mm2sSelStalledLock(0))
        ],
        "conflict_stats1" => conflict_banks(0),
        "conflict_stats2" => conflict_banks(4),
        "conflict_stats3" => conflict_banks(8),
        "conflict_stats4" => conflict_banks(12),
        _ => return None,
    };
    Some(list)
}

fn conflict_banks(first: u8) -> EventList {
    (first..first + 4)
        .map(|bank| Event::MemTile(MemTileEvent::ConflictDmBank(bank)))
        .collect()
}

fn uc_events(metric: &str) -> Option<EventList> {
    use UcEvent::*;
    let u = Event::Uc;
    let list: EventList = match metric {
        "uc_dma" => smallvec![
            u(DmaDmToHostFinished),
            u(DmaHostToDmFinished),
            u(DmaDmToHostStalled),
            u(DmaHostToDmStalled)
        ],
        "uc_axis" => smallvec![
            u(AxisMasterRunning),
            u(AxisMasterStalled),
            u(AxisSlaveRunning),
            u(AxisSlaveStalled)
        ],
        "uc_core" => smallvec![u(CoreActive), u(CoreSleep), u(CoreInterrupt), u(CoreDebugHalted)],
        "uc_program_flow" => smallvec![u(CoreJump), u(CoreCall), u(CoreReturn), u(CoreBranchTaken)],
        _ => return None,
    };
    Some(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::metric_sets;

    #[test]
    fn test_every_vocabulary_entry_has_events() {
        for module in ModuleType::ALL {
            for hw_gen in [1u8, 2, 5] {
                for metric in metric_sets(module) {
                    assert!(
                        event_list(module, metric, hw_gen).is_some(),
                        "{} has no events for {} on gen {}",
                        metric,
                        module,
                        hw_gen
                    );
                }
            }
        }
    }

    #[test]
    fn test_heat_map_uses_four_counters() {
        let events = event_list(ModuleType::Core, "heat_map", 2).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], Event::Core(CoreEvent::Active));
    }

    #[test]
    fn test_generation_specific_sets() {
        let fp1 = event_list(ModuleType::Core, "floating_point", 1).unwrap();
        let fp2 = event_list(ModuleType::Core, "floating_point", 2).unwrap();
        assert_eq!(fp1[0], Event::Core(CoreEvent::FpOverflow));
        assert_eq!(fp2[0], Event::Core(CoreEvent::FpHuge));

        let s2mm1 = event_list(ModuleType::Dma, "s2mm_throughputs", 1).unwrap();
        assert!(s2mm1.iter().all(|e| e.is_finished_bd()));
        let s2mm2 = event_list(ModuleType::Dma, "s2mm_throughputs", 2).unwrap();
        assert!(!s2mm2.iter().any(|e| e.is_finished_bd()));
    }

    #[test]
    fn test_aliases_share_events() {
        assert_eq!(
            event_list(ModuleType::Dma, "write_throughputs", 2),
            event_list(ModuleType::Dma, "s2mm_throughputs", 2)
        );
        assert_eq!(
            event_list(ModuleType::MemTile, "mm2s_channels", 2),
            event_list(ModuleType::MemTile, "output_channels", 2)
        );
        assert_eq!(
            event_list(ModuleType::Shim, "s2mm_stalls", 2),
            event_list(ModuleType::Shim, "output_stalls", 2)
        );
    }

    #[test]
    fn test_conflict_banks() {
        let events = event_list(ModuleType::MemTile, "conflict_stats4", 2).unwrap();
        assert_eq!(events.last(), Some(&Event::MemTile(MemTileEvent::ConflictDmBank(15))));
    }

    #[test]
    fn test_unknown_set() {
        assert!(event_list(ModuleType::Core, "conflicts", 2).is_none());
        assert!(event_list(ModuleType::Uc, "heat_map", 5).is_none());
    }
}
