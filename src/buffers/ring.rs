use std::sync::atomic::{fence, AtomicI64, AtomicU64, Ordering};

use crate::system::time::Nanoseconds;

/// One entry of a [`SampleRing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTimeSample {
    pub duration: Nanoseconds,
    /// Position of the sample in the ring's write order, starting at zero.
    pub sequence: u64,
}

struct Slot {
    value: AtomicI64,
    /// `sequence + 1` of the sample in `value`, or zero while empty or being
    /// rewritten.
    tag: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
            tag: AtomicU64::new(0),
        }
    }
}

/// A fixed-capacity circular buffer of durations.
///
/// Any number of threads may push concurrently; pushes never block. Readers
/// see the newest `N` samples, skipping any slot that a concurrent push is in
/// the middle of overwriting.
pub struct SampleRing<const N: usize> {
    head: AtomicU64,
    slots: Box<[Slot]>,
}

impl<const N: usize> SampleRing<N> {
    const POWER_OF_TWO: () = assert!(N.is_power_of_two(), "ring capacity must be a power of two");

    #[must_use]
    pub fn new() -> Self {
        let () = Self::POWER_OF_TWO;

        Self {
            head: AtomicU64::new(0),
            slots: (0..N).map(|_| Slot::new()).collect(),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Appends a sample and returns its sequence number.
    pub fn push(&self, duration: Nanoseconds) -> u64 {
        let sequence = self.head.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[Self::index(sequence)];

        slot.tag.store(0, Ordering::Relaxed);
        fence(Ordering::Release);
        slot.value.store(duration.0, Ordering::Relaxed);
        slot.tag.store(sequence + 1, Ordering::Release);

        sequence
    }

    /// Number of samples ever pushed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    /// Number of samples currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        let retained = self.total().min(N as u64) as usize;
        retained
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    #[must_use]
    pub fn latest(&self) -> Option<FrameTimeSample> {
        self.iter().next()
    }

    /// Retained samples, newest first.
    pub fn iter(&self) -> impl Iterator<Item = FrameTimeSample> + '_ {
        let head = self.total();
        let oldest = head.saturating_sub(N as u64);

        (oldest..head).rev().filter_map(move |sequence| self.read(sequence))
    }

    /// Mean of the newest `max` samples, or `None` if there are none.
    #[must_use]
    pub fn average(&self, max: usize) -> Option<Nanoseconds> {
        let (sum, count) = self
            .iter()
            .take(max)
            .fold((0i128, 0i128), |(sum, count), sample| {
                (sum + i128::from(sample.duration.0), count + 1)
            });

        if count == 0 {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)]
        let mean = (sum / count) as i64;
        Some(Nanoseconds(mean))
    }

    fn read(&self, sequence: u64) -> Option<FrameTimeSample> {
        let slot = &self.slots[Self::index(sequence)];

        let before = slot.tag.load(Ordering::Acquire);
        let value = slot.value.load(Ordering::Relaxed);
        fence(Ordering::Acquire);
        let after = slot.tag.load(Ordering::Relaxed);

        (before == sequence + 1 && after == before).then_some(FrameTimeSample {
            duration: Nanoseconds(value),
            sequence,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn index(sequence: u64) -> usize {
        (sequence as usize) & (N - 1)
    }
}

impl<const N: usize> Default for SampleRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn keeps_newest_samples() {
        let ring = SampleRing::<4>::new();
        for i in 1..=10 {
            ring.push(Nanoseconds(i));
        }

        assert_eq!(ring.total(), 10);
        assert_eq!(ring.len(), 4);

        let values: Vec<i64> = ring.iter().map(|s| s.duration.0).collect();
        assert_eq!(values, vec![10, 9, 8, 7]);
        assert_eq!(ring.latest().map(|s| s.sequence), Some(9));
    }

    #[test]
    fn average_of_newest() {
        let ring = SampleRing::<8>::new();
        assert_eq!(ring.average(8), None);

        for value in [100, 200, 300, 400] {
            ring.push(Nanoseconds(value));
        }

        assert_eq!(ring.average(2), Some(Nanoseconds(350)));
        assert_eq!(ring.average(100), Some(Nanoseconds(250)));
    }

    #[test]
    fn concurrent_pushes_are_all_counted() {
        let ring = Arc::new(SampleRing::<64>::new());

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let ring = ring.clone();
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        ring.push(Nanoseconds(t * 1000 + i));
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(ring.total(), 4000);
        assert_eq!(ring.iter().count(), 64);
    }
}
