//! Logical hardware events counted by performance counters.
//!
//! Events are grouped by the module that generates them. Port-indexed and
//! channel-indexed events carry their index as data instead of having one
//! variant per index, so port and channel rewrites are plain pattern matches.
//!
//! Each event has a logical code inside its module's event space. The code is
//! what a resource manager translates to a physical id; reporting adds the
//! module's counter base on top (see [`super::counter_base`]).

use std::fmt;

/// Core module events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreEvent {
    Active,
    Disabled,
    GroupStall,
    GroupProgramFlow,
    MemoryStall,
    StreamStall,
    LockStall,
    CascadeStall,
    InstrVector,
    InstrLoad,
    InstrStore,
    InstrStreamGet,
    InstrStreamPut,
    InstrCascadeGet,
    InstrCascadePut,
    FpOverflow,
    FpUnderflow,
    FpInvalid,
    FpDivByZero,
    FpHuge,
    FpInf,
    IntFp0,
    /// Stream switch port monitor `n` running.
    PortRunning(u8),
    /// Stream switch port monitor `n` stalled.
    PortStalled(u8),
    PortIdle(u8),
    PortTlast(u8),
    InstrEvent(u8),
    UserEvent(u8),
    PerfCnt(u8),
}

/// Memory module events (memory next to an AIE core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryEvent {
    GroupMemoryConflict,
    GroupErrors,
    GroupLock,
    GroupDmaActivity,
    /// Channel-indexed DMA events.
    S2mmFinishedBd(u8),
    Mm2sFinishedBd(u8),
    S2mmStalledLockAcquire(u8),
    Mm2sStalledLockAcquire(u8),
    S2mmStalledLock(u8),
    Mm2sStalledLock(u8),
    S2mmMemoryBackpressure(u8),
    Mm2sStreamBackpressure(u8),
    Mm2sMemoryStarvation(u8),
    S2mmStreamStarvation(u8),
}

/// Interface tile (PL/shim) events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlEvent {
    GroupDmaActivity,
    PortRunning(u8),
    PortStalled(u8),
    PortIdle(u8),
    PortTlast(u8),
    S2mmStalledLock(u8),
    Mm2sStalledLock(u8),
    S2mmStreamStarvation(u8),
    S2mmMemoryBackpressure(u8),
    Mm2sStreamBackpressure(u8),
    Mm2sMemoryStarvation(u8),
    PerfCnt(u8),
    UserEvent(u8),
    Broadcast(u8),
}

/// Memory tile events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemTileEvent {
    GroupMemoryConflict,
    GroupErrors,
    GroupLock,
    GroupWatchpoint,
    PortRunning(u8),
    PortStalled(u8),
    PortIdle(u8),
    PortTlast(u8),
    /// Events on the DMA channel selected by selector `n`.
    S2mmSelFinishedBd(u8),
    Mm2sSelFinishedBd(u8),
    S2mmSelStalledLock(u8),
    Mm2sSelStalledLock(u8),
    S2mmSelStreamStarvation(u8),
    S2mmSelMemoryBackpressure(u8),
    Mm2sSelStreamBackpressure(u8),
    Mm2sSelMemoryStarvation(u8),
    ConflictDmBank(u8),
    UserEvent(u8),
}

/// Microcontroller events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UcEvent {
    CoreActive,
    CoreSleep,
    CoreInterrupt,
    CoreDebugHalted,
    CoreJump,
    CoreCall,
    CoreReturn,
    CoreBranchTaken,
    DmaDmToHostFinished,
    DmaHostToDmFinished,
    DmaDmToHostStalled,
    DmaHostToDmStalled,
    AxisMasterRunning,
    AxisMasterStalled,
    AxisSlaveRunning,
    AxisSlaveStalled,
}

/// A logical event of any module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// No event (counter disabled / no reset).
    None,
    Core(CoreEvent),
    Memory(MemoryEvent),
    Pl(PlEvent),
    MemTile(MemTileEvent),
    Uc(UcEvent),
}

/// Kind of a stream switch port monitor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortEventKind {
    Running,
    Stalled,
    Idle,
    Tlast,
}

impl Event {
    /// Stream switch port monitor number, if this is a port event.
    pub fn port_number(self) -> Option<u8> {
        self.port_event().map(|(_, n)| n)
    }

    /// Kind and port number of a stream switch port event.
    pub fn port_event(self) -> Option<(PortEventKind, u8)> {
        use PortEventKind::*;
        match self {
            Event::Core(CoreEvent::PortRunning(n))
            | Event::Pl(PlEvent::PortRunning(n))
            | Event::MemTile(MemTileEvent::PortRunning(n)) => Some((Running, n)),
            Event::Core(CoreEvent::PortStalled(n))
            | Event::Pl(PlEvent::PortStalled(n))
            | Event::MemTile(MemTileEvent::PortStalled(n)) => Some((Stalled, n)),
            Event::Core(CoreEvent::PortIdle(n))
            | Event::Pl(PlEvent::PortIdle(n))
            | Event::MemTile(MemTileEvent::PortIdle(n)) => Some((Idle, n)),
            Event::Core(CoreEvent::PortTlast(n))
            | Event::Pl(PlEvent::PortTlast(n))
            | Event::MemTile(MemTileEvent::PortTlast(n)) => Some((Tlast, n)),
            _ => None,
        }
    }

    /// Same port event kind on another port, in the same module event space.
    pub fn with_port(self, port: u8) -> Self {
        use PortEventKind::*;
        match (self, self.port_event()) {
            (Event::Core(_), Some((kind, _))) => Event::Core(match kind {
                Running => CoreEvent::PortRunning(port),
                Stalled => CoreEvent::PortStalled(port),
                Idle => CoreEvent::PortIdle(port),
                Tlast => CoreEvent::PortTlast(port),
            }),
            (Event::Pl(_), Some((kind, _))) => Event::Pl(match kind {
                Running => PlEvent::PortRunning(port),
                Stalled => PlEvent::PortStalled(port),
                Idle => PlEvent::PortIdle(port),
                Tlast => PlEvent::PortTlast(port),
            }),
            (Event::MemTile(_), Some((kind, _))) => Event::MemTile(match kind {
                Running => MemTileEvent::PortRunning(port),
                Stalled => MemTileEvent::PortStalled(port),
                Idle => MemTileEvent::PortIdle(port),
                Tlast => MemTileEvent::PortTlast(port),
            }),
            _ => self,
        }
    }

    /// True for first-generation "finished buffer descriptor" events, whose
    /// counters report a transfer size payload.
    pub fn is_finished_bd(self) -> bool {
        matches!(
            self,
            Event::Memory(MemoryEvent::S2mmFinishedBd(_) | MemoryEvent::Mm2sFinishedBd(_))
        )
    }

    /// Move a channel-0 DMA event to channel 1 (other events unchanged).
    pub fn to_channel1(self) -> Self {
        use MemoryEvent as M;
        use PlEvent as P;
        match self {
            Event::Memory(M::S2mmFinishedBd(0)) => Event::Memory(M::S2mmFinishedBd(1)),
            Event::Memory(M::Mm2sFinishedBd(0)) => Event::Memory(M::Mm2sFinishedBd(1)),
            Event::Memory(M::S2mmStalledLockAcquire(0)) => {
                Event::Memory(M::S2mmStalledLockAcquire(1))
            }
            Event::Memory(M::Mm2sStalledLockAcquire(0)) => {
                Event::Memory(M::Mm2sStalledLockAcquire(1))
            }
            Event::Memory(M::S2mmStalledLock(0)) => Event::Memory(M::S2mmStalledLock(1)),
            Event::Memory(M::Mm2sStalledLock(0)) => Event::Memory(M::Mm2sStalledLock(1)),
            Event::Memory(M::S2mmMemoryBackpressure(0)) => {
                Event::Memory(M::S2mmMemoryBackpressure(1))
            }
            Event::Memory(M::Mm2sStreamBackpressure(0)) => {
                Event::Memory(M::Mm2sStreamBackpressure(1))
            }
            Event::Memory(M::Mm2sMemoryStarvation(0)) => {
                Event::Memory(M::Mm2sMemoryStarvation(1))
            }
            Event::Memory(M::S2mmStreamStarvation(0)) => {
                Event::Memory(M::S2mmStreamStarvation(1))
            }
            Event::Pl(P::S2mmStalledLock(0)) => Event::Pl(P::S2mmStalledLock(1)),
            Event::Pl(P::Mm2sStalledLock(0)) => Event::Pl(P::Mm2sStalledLock(1)),
            Event::Pl(P::S2mmStreamStarvation(0)) => Event::Pl(P::S2mmStreamStarvation(1)),
            Event::Pl(P::S2mmMemoryBackpressure(0)) => Event::Pl(P::S2mmMemoryBackpressure(1)),
            Event::Pl(P::Mm2sStreamBackpressure(0)) => Event::Pl(P::Mm2sStreamBackpressure(1)),
            Event::Pl(P::Mm2sMemoryStarvation(0)) => Event::Pl(P::Mm2sMemoryStarvation(1)),
            other => other,
        }
    }

    /// Logical code of the event inside its module event space.
    pub fn code(self) -> u16 {
        match self {
            Event::None => 0,
            Event::Core(e) => core_code(e),
            Event::Memory(e) => memory_code(e),
            Event::Pl(e) => pl_code(e),
            Event::MemTile(e) => mem_tile_code(e),
            Event::Uc(e) => e as u16 + 1,
        }
    }
}

fn core_code(e: CoreEvent) -> u16 {
    use CoreEvent::*;
    match e {
        PerfCnt(n) => 5 + n as u16,
        Active => 28,
        Disabled => 29,
        GroupStall => 32,
        MemoryStall => 23,
        StreamStall => 24,
        CascadeStall => 25,
        LockStall => 26,
        GroupProgramFlow => 67,
        InstrEvent(n) => 33 + n as u16,
        InstrVector => 37,
        InstrLoad => 38,
        InstrStore => 39,
        InstrStreamGet => 40,
        InstrStreamPut => 41,
        InstrCascadeGet => 42,
        InstrCascadePut => 43,
        FpHuge => 52,
        IntFp0 => 53,
        FpInf => 54,
        FpInvalid => 55,
        FpDivByZero => 56,
        FpOverflow => 57,
        FpUnderflow => 58,
        PortIdle(n) => 75 + 4 * n as u16,
        PortRunning(n) => 76 + 4 * n as u16,
        PortStalled(n) => 77 + 4 * n as u16,
        PortTlast(n) => 78 + 4 * n as u16,
        UserEvent(n) => 124 + n as u16,
    }
}

fn memory_code(e: MemoryEvent) -> u16 {
    use MemoryEvent::*;
    match e {
        GroupDmaActivity => 15,
        S2mmStalledLockAcquire(n) => 16 + 2 * n as u16,
        Mm2sStalledLockAcquire(n) => 20 + 2 * n as u16,
        S2mmFinishedBd(n) => 24 + n as u16,
        Mm2sFinishedBd(n) => 26 + n as u16,
        S2mmStalledLock(n) => 28 + n as u16,
        Mm2sStalledLock(n) => 30 + n as u16,
        S2mmStreamStarvation(n) => 32 + n as u16,
        Mm2sStreamBackpressure(n) => 34 + n as u16,
        S2mmMemoryBackpressure(n) => 36 + n as u16,
        Mm2sMemoryStarvation(n) => 38 + n as u16,
        GroupLock => 43,
        GroupMemoryConflict => 76,
        GroupErrors => 86,
    }
}

fn pl_code(e: PlEvent) -> u16 {
    use PlEvent::*;
    match e {
        PerfCnt(n) => 5 + n as u16,
        UserEvent(n) => 126 + n as u16,
        Broadcast(n) => 110 + n as u16,
        GroupDmaActivity => 20,
        S2mmStalledLock(n) => 28 + n as u16,
        Mm2sStalledLock(n) => 30 + n as u16,
        S2mmStreamStarvation(n) => 32 + n as u16,
        Mm2sStreamBackpressure(n) => 34 + n as u16,
        S2mmMemoryBackpressure(n) => 36 + n as u16,
        Mm2sMemoryStarvation(n) => 38 + n as u16,
        PortIdle(n) => 76 + 4 * n as u16,
        PortRunning(n) => 77 + 4 * n as u16,
        PortStalled(n) => 78 + 4 * n as u16,
        PortTlast(n) => 79 + 4 * n as u16,
    }
}

fn mem_tile_code(e: MemTileEvent) -> u16 {
    use MemTileEvent::*;
    match e {
        GroupWatchpoint => 16,
        S2mmSelFinishedBd(n) => 22 + n as u16,
        Mm2sSelFinishedBd(n) => 26 + n as u16,
        S2mmSelStalledLock(n) => 30 + n as u16,
        Mm2sSelStalledLock(n) => 32 + n as u16,
        S2mmSelStreamStarvation(n) => 34 + n as u16,
        S2mmSelMemoryBackpressure(n) => 36 + n as u16,
        Mm2sSelStreamBackpressure(n) => 38 + n as u16,
        Mm2sSelMemoryStarvation(n) => 40 + n as u16,
        GroupLock => 43,
        GroupErrors => 77,
        GroupMemoryConflict => 105,
        ConflictDmBank(n) => 106 + n as u16,
        UserEvent(n) => 130 + n as u16,
        PortIdle(n) => 145 + 4 * n as u16,
        PortRunning(n) => 146 + 4 * n as u16,
        PortStalled(n) => 147 + 4 * n as u16,
        PortTlast(n) => 148 + 4 * n as u16,
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::None => write!(f, "NONE"),
            Event::Core(e) => write!(f, "{:?}_CORE", e),
            Event::Memory(e) => write!(f, "{:?}_MEM", e),
            Event::Pl(e) => write!(f, "{:?}_PL", e),
            Event::MemTile(e) => write!(f, "{:?}_MEM_TILE", e),
            Event::Uc(e) => write!(f, "{:?}_UC", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_number() {
        assert_eq!(Event::Core(CoreEvent::PortRunning(3)).port_number(), Some(3));
        assert_eq!(Event::Pl(PlEvent::PortStalled(0)).port_number(), Some(0));
        assert_eq!(Event::Core(CoreEvent::Active).port_number(), None);
        assert_eq!(Event::Memory(MemoryEvent::GroupLock).port_number(), None);
    }

    #[test]
    fn test_with_port_keeps_kind_and_module() {
        let e = Event::MemTile(MemTileEvent::PortStalled(5)).with_port(1);
        assert_eq!(e, Event::MemTile(MemTileEvent::PortStalled(1)));

        let not_port = Event::Core(CoreEvent::InstrVector);
        assert_eq!(not_port.with_port(2), not_port);
    }

    #[test]
    fn test_channel1_swap() {
        assert_eq!(
            Event::Memory(MemoryEvent::S2mmFinishedBd(0)).to_channel1(),
            Event::Memory(MemoryEvent::S2mmFinishedBd(1))
        );
        assert_eq!(
            Event::Pl(PlEvent::Mm2sStreamBackpressure(0)).to_channel1(),
            Event::Pl(PlEvent::Mm2sStreamBackpressure(1))
        );
        // Already on channel 1, or not a DMA event
        assert_eq!(
            Event::Memory(MemoryEvent::S2mmFinishedBd(1)).to_channel1(),
            Event::Memory(MemoryEvent::S2mmFinishedBd(1))
        );
        assert_eq!(
            Event::Pl(PlEvent::PortRunning(0)).to_channel1(),
            Event::Pl(PlEvent::PortRunning(0))
        );
    }

    #[test]
    fn test_port_codes_are_distinct() {
        let codes: std::collections::HashSet<u16> = (0..8)
            .flat_map(|n| {
                [
                    Event::Core(CoreEvent::PortIdle(n)).code(),
                    Event::Core(CoreEvent::PortRunning(n)).code(),
                    Event::Core(CoreEvent::PortStalled(n)).code(),
                    Event::Core(CoreEvent::PortTlast(n)).code(),
                ]
            })
            .collect();
        assert_eq!(codes.len(), 32);
    }

    #[test]
    fn test_finished_bd() {
        assert!(Event::Memory(MemoryEvent::Mm2sFinishedBd(1)).is_finished_bd());
        assert!(!Event::MemTile(MemTileEvent::Mm2sSelFinishedBd(0)).is_finished_bd());
    }
}
