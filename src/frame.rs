/// Identifies one frame across the presentation and marker call streams.
///
/// Supplied by the application through the marker API, or synthesized once
/// per instrumented present when the application reports no markers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

/// A frame-boundary event reported through the vendor latency API. The raw
/// values are the vendor's wire encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MarkerKind {
    SimulationStart = 0,
    SimulationEnd = 1,
    RenderSubmitStart = 2,
    RenderSubmitEnd = 3,
    PresentStart = 4,
    PresentEnd = 5,
    InputSample = 6,
    TriggerFlash = 7,
    PcLatencyPing = 8,
    OutOfBandRenderSubmitStart = 9,
    OutOfBandRenderSubmitEnd = 10,
    OutOfBandPresentStart = 11,
    OutOfBandPresentEnd = 12,
}

impl MarkerKind {
    pub const COUNT: usize = 13;

    pub const ALL: [Self; Self::COUNT] = [
        Self::SimulationStart,
        Self::SimulationEnd,
        Self::RenderSubmitStart,
        Self::RenderSubmitEnd,
        Self::PresentStart,
        Self::PresentEnd,
        Self::InputSample,
        Self::TriggerFlash,
        Self::PcLatencyPing,
        Self::OutOfBandRenderSubmitStart,
        Self::OutOfBandRenderSubmitEnd,
        Self::OutOfBandPresentStart,
        Self::OutOfBandPresentEnd,
    ];

    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The six kinds that bracket a frame's simulation, render submission and
    /// present.
    #[must_use]
    pub fn is_simulation_boundary(self) -> bool {
        (self as u32) <= Self::PresentEnd as u32
    }
}

// :marker_kinds_fit_slot:
const _: () = assert!(MarkerKind::COUNT <= 16);

/// The pacing strategy chosen for a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacingMode {
    #[default]
    Disabled = 1,
    VendorMarkerDriven = 2,
    PresentSyncDriven = 3,
    ExternalSyncDriven = 4,
}

impl PacingMode {
    /// The nonzero code used by the decision cache.
    #[must_use]
    pub(crate) fn code(self) -> u64 {
        self as u64
    }

    #[must_use]
    pub(crate) fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Disabled),
            2 => Some(Self::VendorMarkerDriven),
            3 => Some(Self::PresentSyncDriven),
            4 => Some(Self::ExternalSyncDriven),
            _ => None,
        }
    }
}

/// The configured pacing strategy. The selector turns this into a
/// [`PacingMode`] per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacingStrategy {
    /// Pace at the vendor marker boundaries while markers are being received,
    /// otherwise fall back to external synchronization.
    #[default]
    VendorMarkers = 0,
    /// Pace at the presentation call.
    PresentSync = 1,
    /// Pace through the external synchronization collaborator.
    ExternalSync = 2,
}

impl PacingStrategy {
    #[must_use]
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::PresentSync,
            2 => Self::ExternalSync,
            _ => Self::VendorMarkers,
        }
    }
}

/// How intercepted marker calls are forwarded to the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MarkerPolicy {
    #[default]
    NativePassthrough = 0,
    SimulationStartOnly = 1,
}

impl MarkerPolicy {
    #[must_use]
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::SimulationStartOnly,
            _ => Self::NativePassthrough,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_kinds_round_trip_raw_values() {
        for kind in MarkerKind::ALL {
            assert_eq!(MarkerKind::from_raw(kind as u32), Some(kind));
        }
        assert_eq!(MarkerKind::from_raw(13), None);
    }

    #[test]
    fn simulation_boundaries() {
        assert!(MarkerKind::SimulationStart.is_simulation_boundary());
        assert!(MarkerKind::PresentEnd.is_simulation_boundary());
        assert!(!MarkerKind::InputSample.is_simulation_boundary());
        assert!(!MarkerKind::OutOfBandPresentEnd.is_simulation_boundary());
    }

    #[test]
    fn mode_codes_are_nonzero() {
        assert_eq!(PacingMode::from_code(0), None);
        assert_eq!(
            PacingMode::from_code(PacingMode::ExternalSyncDriven.code()),
            Some(PacingMode::ExternalSyncDriven)
        );
    }
}
