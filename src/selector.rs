//! Per-frame choice of pacing strategy.
//!
//! The presentation layer and the marker layer both ask the selector which
//! [`PacingMode`] governs a frame. Whichever asks first decides; every later
//! call for the same frame id gets the cached answer. Each mode has one owning
//! call site, and only the owning site is told to apply pacing, exactly once
//! per frame.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::{
    config::Settings,
    frame::{FrameId, PacingMode, PacingStrategy},
};

/// Frame-boundary callbacks run around the call that applies pacing for a
/// frame.
pub trait PacingHooks: Send + Sync {
    fn pre_present(&self, frame: FrameId, mode: PacingMode);
    fn post_present(&self, frame: FrameId, mode: PacingMode);
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl PacingHooks for NoHooks {
    fn pre_present(&self, _frame: FrameId, _mode: PacingMode) {}
    fn post_present(&self, _frame: FrameId, _mode: PacingMode) {}
}

/// The interception layer asking for a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallSite {
    Presentation = 0,
    Marker = 1,
}

impl CallSite {
    pub const ALL: [Self; 2] = [Self::Presentation, Self::Marker];

    /// The site that applies pacing for frames decided as `mode`.
    #[must_use]
    pub fn owner_of(mode: PacingMode) -> Option<Self> {
        match mode {
            PacingMode::Disabled => None,
            PacingMode::VendorMarkerDriven => Some(Self::Marker),
            PacingMode::PresentSyncDriven | PacingMode::ExternalSyncDriven => {
                Some(Self::Presentation)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub mode: PacingMode,
    /// True for the one call per frame that should run the pacing hooks.
    pub activated: bool,
}

/// Everything a fresh decision depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectorInputs {
    pub enabled: bool,
    pub strategy: PacingStrategy,
    pub markers_active: bool,
}

impl SelectorInputs {
    #[must_use]
    pub fn from_settings(settings: &Settings, markers_active: bool) -> Self {
        Self {
            enabled: settings.pacing_enabled(),
            strategy: settings.strategy(),
            markers_active,
        }
    }

    fn mode(self) -> PacingMode {
        if !self.enabled {
            PacingMode::Disabled
        } else if self.strategy == PacingStrategy::VendorMarkers && self.markers_active {
            PacingMode::VendorMarkerDriven
        } else if self.strategy == PacingStrategy::PresentSync {
            PacingMode::PresentSyncDriven
        } else {
            PacingMode::ExternalSyncDriven
        }
    }

    /// Whether something other than the vendor's own marker pacing is
    /// configured to own frame delivery.
    fn alternate_active(self) -> bool {
        self.enabled && self.strategy != PacingStrategy::VendorMarkers
    }
}

// Cache entries pack the low bits of the frame id, an "applied" bit and the
// nonzero mode code into one word. Zero is an empty entry.
const MODE_MASK: u64 = 0b111;
const APPLIED: u64 = 1 << 3;
const TAG_SHIFT: u32 = 4;
const TAG_MASK: u64 = u64::MAX >> TAG_SHIFT;

fn tag(frame: FrameId) -> u64 {
    frame.0 & TAG_MASK
}

fn pack(frame: FrameId, mode: PacingMode, applied: bool) -> u64 {
    let applied = if applied { APPLIED } else { 0 };
    (tag(frame) << TAG_SHIFT) | applied | mode.code()
}

fn entry_tag(entry: u64) -> u64 {
    entry >> TAG_SHIFT
}

fn entry_mode(entry: u64) -> PacingMode {
    PacingMode::from_code(entry & MODE_MASK).unwrap_or_default()
}

pub struct PacingSelector<const N: usize> {
    cache: Box<[AtomicU64]>,
    alternate_active: AtomicBool,
    last_mode: [AtomicU8; 2],
}

impl<const N: usize> PacingSelector<N> {
    const POWER_OF_TWO: () = assert!(N.is_power_of_two(), "cache capacity must be a power of two");

    #[must_use]
    pub fn new() -> Self {
        let () = Self::POWER_OF_TWO;

        Self {
            cache: (0..N).map(|_| AtomicU64::new(0)).collect(),
            alternate_active: AtomicBool::new(false),
            last_mode: [AtomicU8::new(0), AtomicU8::new(0)],
        }
    }

    /// Decides (or looks up) the mode of `frame` and claims the right to pace
    /// it if `site` owns that mode and has not claimed it yet.
    pub fn choose(&self, frame: FrameId, site: CallSite, inputs: SelectorInputs) -> Decision {
        self.evaluate(frame, site, inputs, true)
    }

    /// Decides (or looks up) the mode of `frame` without claiming it.
    pub fn observe(&self, frame: FrameId, site: CallSite, inputs: SelectorInputs) -> PacingMode {
        self.evaluate(frame, site, inputs, false).mode
    }

    /// Whether the configuration hands pacing to something other than the
    /// vendor's marker-driven pacing. Refreshed on every selector call.
    #[must_use]
    pub fn alternate_active(&self) -> bool {
        self.alternate_active.load(Ordering::Relaxed)
    }

    /// The mode most recently reported to `site`, if it has asked at all.
    #[must_use]
    pub fn last_mode(&self, site: CallSite) -> Option<PacingMode> {
        PacingMode::from_code(u64::from(self.last_mode[site as usize].load(Ordering::Relaxed)))
    }

    fn evaluate(&self, frame: FrameId, site: CallSite, inputs: SelectorInputs, claim: bool) -> Decision {
        self.alternate_active
            .store(inputs.alternate_active(), Ordering::Relaxed);

        let decision = self.decide(frame, site, inputs, claim);

        #[allow(clippy::cast_possible_truncation)]
        self.last_mode[site as usize].store(decision.mode.code() as u8, Ordering::Relaxed);

        tracing::trace!(frame = frame.0, ?site, mode = ?decision.mode, activated = decision.activated);
        decision
    }

    fn decide(&self, frame: FrameId, site: CallSite, inputs: SelectorInputs, claim: bool) -> Decision {
        #[allow(clippy::cast_possible_truncation)]
        let entry = &self.cache[(frame.0 as usize) & (N - 1)];
        let claims = |mode| claim && CallSite::owner_of(mode) == Some(site);

        let mut current = entry.load(Ordering::Acquire);
        loop {
            if current != 0 && entry_tag(current) == tag(frame) {
                let mode = entry_mode(current);

                if !claims(mode) || current & APPLIED != 0 {
                    return Decision { mode, activated: false };
                }

                match entry.compare_exchange_weak(
                    current,
                    current | APPLIED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Decision { mode, activated: true },
                    Err(actual) => current = actual,
                }
            } else {
                let mode = inputs.mode();
                let activated = claims(mode);

                match entry.compare_exchange_weak(
                    current,
                    pack(frame, mode, activated),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Decision { mode, activated },
                    Err(actual) => current = actual,
                }
            }
        }
    }
}

impl<const N: usize> Default for PacingSelector<N> {
    fn default() -> Self {
        Self::new()
    }
}
