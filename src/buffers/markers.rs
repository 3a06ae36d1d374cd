use std::sync::atomic::{fence, AtomicI64, AtomicU64, Ordering};

use crate::{frame::FrameId, frame::MarkerKind, system::time::Nanoseconds};

/// Frame id of a slot or cell that has never been written.
const EMPTY: u64 = u64::MAX;

/// One timestamp guarded by its own sequence counter. An odd sequence means a
/// writer is in the middle of an update.
struct Cell {
    sequence: AtomicU64,
    frame: AtomicU64,
    time: AtomicI64,
}

impl Cell {
    fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            frame: AtomicU64::new(EMPTY),
            time: AtomicI64::new(0),
        }
    }

    fn write(&self, frame: u64, time: i64) -> bool {
        let current = self.sequence.load(Ordering::Relaxed);
        if current & 1 == 1 {
            return false;
        }

        // losing the race to a concurrent writer drops this write
        if self
            .sequence
            .compare_exchange(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        fence(Ordering::Release);
        self.frame.store(frame, Ordering::Relaxed);
        self.time.store(time, Ordering::Relaxed);
        self.sequence.store(current + 2, Ordering::Release);
        true
    }

    fn read(&self, frame: u64) -> Option<i64> {
        let before = self.sequence.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }

        let stored = self.frame.load(Ordering::Relaxed);
        let time = self.time.load(Ordering::Relaxed);
        fence(Ordering::Acquire);
        let after = self.sequence.load(Ordering::Relaxed);

        (before == after && stored == frame).then_some(time)
    }
}

struct Slot {
    frame: AtomicU64,
    cells: [Cell; MarkerKind::COUNT],
}

impl Slot {
    fn new() -> Self {
        Self {
            frame: AtomicU64::new(EMPTY),
            cells: std::array::from_fn(|_| Cell::new()),
        }
    }
}

/// Every marker timestamp recorded for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMarkers {
    pub frame: FrameId,
    pub times: [Option<Nanoseconds>; MarkerKind::COUNT],
}

impl FrameMarkers {
    #[must_use]
    pub fn get(&self, kind: MarkerKind) -> Option<Nanoseconds> {
        self.times[kind.index()]
    }
}

/// Marker timestamps for the most recent `N` frames, indexed by
/// `frame_id mod N`.
///
/// A slot belongs to the last frame that recorded into it. Lookups for any
/// other frame report "not found", and each timestamp also carries its own
/// frame id so the new owner never sees kinds left behind by the old one.
pub struct MarkerTable<const N: usize> {
    slots: Box<[Slot]>,
}

impl<const N: usize> MarkerTable<N> {
    const POWER_OF_TWO: () = assert!(N.is_power_of_two(), "table capacity must be a power of two");

    #[must_use]
    pub fn new() -> Self {
        let () = Self::POWER_OF_TWO;

        Self {
            slots: (0..N).map(|_| Slot::new()).collect(),
        }
    }

    /// Records `time` as the `kind` marker of `frame`, replacing any earlier
    /// value for the same frame and kind.
    ///
    /// Returns false if the write was dropped: the id is reserved, or another
    /// thread was writing the same cell at the same moment.
    pub fn record(&self, frame: FrameId, kind: MarkerKind, time: Nanoseconds) -> bool {
        if frame.0 == EMPTY {
            return false;
        }

        let slot = self.slot(frame);
        slot.frame.store(frame.0, Ordering::Release);
        slot.cells[kind.index()].write(frame.0, time.0)
    }

    /// The `kind` timestamp of `frame`, if it is still in the table.
    #[must_use]
    pub fn get(&self, frame: FrameId, kind: MarkerKind) -> Option<Nanoseconds> {
        if frame.0 == EMPTY {
            return None;
        }

        let slot = self.slot(frame);
        if slot.frame.load(Ordering::Acquire) != frame.0 {
            return None;
        }

        slot.cells[kind.index()].read(frame.0).map(Nanoseconds)
    }

    /// The frame that most recently wrote into `frame`'s slot.
    #[must_use]
    pub fn slot_frame(&self, frame: FrameId) -> Option<FrameId> {
        let stored = self.slot(frame).frame.load(Ordering::Relaxed);
        (stored != EMPTY).then_some(FrameId(stored))
    }

    /// All retrievable markers of `frame`, or `None` if it has none.
    #[must_use]
    pub fn snapshot(&self, frame: FrameId) -> Option<FrameMarkers> {
        let times = MarkerKind::ALL.map(|kind| self.get(frame, kind));
        times
            .iter()
            .any(Option::is_some)
            .then_some(FrameMarkers { frame, times })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, frame: FrameId) -> &Slot {
        &self.slots[(frame.0 as usize) & (N - 1)]
    }
}

impl<const N: usize> Default for MarkerTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn only_the_newest_frames_are_retrievable() {
        let table = MarkerTable::<8>::new();
        for id in 0..100u64 {
            #[allow(clippy::cast_possible_wrap)]
            let time = Nanoseconds(id as i64 * 10);
            assert!(table.record(FrameId(id), MarkerKind::SimulationStart, time));
        }

        for id in 0..92u64 {
            assert_eq!(table.get(FrameId(id), MarkerKind::SimulationStart), None);
        }

        for id in 92..100u64 {
            #[allow(clippy::cast_possible_wrap)]
            let time = Nanoseconds(id as i64 * 10);
            assert_eq!(table.get(FrameId(id), MarkerKind::SimulationStart), Some(time));
        }
    }

    #[test]
    fn kinds_are_independent() {
        let table = MarkerTable::<8>::new();
        table.record(FrameId(3), MarkerKind::SimulationStart, Nanoseconds(10));
        table.record(FrameId(3), MarkerKind::PresentStart, Nanoseconds(30));

        let markers = table.snapshot(FrameId(3)).unwrap();
        assert_eq!(markers.get(MarkerKind::SimulationStart), Some(Nanoseconds(10)));
        assert_eq!(markers.get(MarkerKind::PresentStart), Some(Nanoseconds(30)));
        assert_eq!(markers.get(MarkerKind::RenderSubmitEnd), None);
    }

    #[test]
    fn reused_slot_hides_stale_kinds() {
        let table = MarkerTable::<8>::new();
        table.record(FrameId(1), MarkerKind::RenderSubmitStart, Nanoseconds(5));
        table.record(FrameId(9), MarkerKind::SimulationStart, Nanoseconds(90));

        assert_eq!(table.slot_frame(FrameId(1)), Some(FrameId(9)));
        assert_eq!(table.get(FrameId(9), MarkerKind::RenderSubmitStart), None);
        assert_eq!(table.get(FrameId(1), MarkerKind::RenderSubmitStart), None);
        assert!(table.snapshot(FrameId(1)).is_none());
        assert_eq!(table.get(FrameId(9), MarkerKind::SimulationStart), Some(Nanoseconds(90)));
    }

    #[test]
    fn evicted_frames_lose_every_kind() {
        let table = MarkerTable::<8>::new();
        table.record(FrameId(3), MarkerKind::RenderSubmitStart, Nanoseconds(33));
        for id in 0..100u64 {
            #[allow(clippy::cast_possible_wrap)]
            table.record(FrameId(id), MarkerKind::SimulationStart, Nanoseconds(id as i64));
        }

        assert_eq!(table.get(FrameId(3), MarkerKind::RenderSubmitStart), None);
        assert_eq!(table.get(FrameId(3), MarkerKind::SimulationStart), None);
        assert!(table.snapshot(FrameId(3)).is_none());

        for id in 0..92u64 {
            assert!(table.snapshot(FrameId(id)).is_none());
        }

        for id in 92..100u64 {
            let markers = table.snapshot(FrameId(id)).unwrap();
            #[allow(clippy::cast_possible_wrap)]
            let expected = Nanoseconds(id as i64);
            assert_eq!(markers.get(MarkerKind::SimulationStart), Some(expected));
            assert_eq!(markers.get(MarkerKind::RenderSubmitStart), None);
        }
    }

    #[test]
    fn reserved_and_unknown_ids() {
        let table = MarkerTable::<8>::new();
        assert!(!table.record(FrameId(u64::MAX), MarkerKind::SimulationStart, Nanoseconds(1)));
        assert_eq!(table.get(FrameId(4), MarkerKind::SimulationStart), None);
        assert!(table.snapshot(FrameId(4)).is_none());
    }

    #[test]
    fn concurrent_writers_never_mix_frames() {
        let table = Arc::new(MarkerTable::<4>::new());

        let writers: Vec<_> = (0..2u64)
            .map(|lane| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for round in 0..5_000u64 {
                        let frame = round * 8 + lane * 4;
                        #[allow(clippy::cast_possible_wrap)]
                        table.record(FrameId(frame), MarkerKind::PresentStart, Nanoseconds(frame as i64));
                    }
                })
            })
            .collect();

        for round in 0..5_000u64 {
            for lane in 0..2u64 {
                let frame = round * 8 + lane * 4;
                if let Some(time) = table.get(FrameId(frame), MarkerKind::PresentStart) {
                    #[allow(clippy::cast_possible_wrap)]
                    let expected = frame as i64;
                    assert_eq!(time.0, expected);
                }
            }
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }
}
