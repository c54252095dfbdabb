//! Clock metadata carried by a [`super::Uref`].
//!
//! Values are raw tick counts in their native clock domain (27MHz for PCR,
//! 90kHz for PTS/DTS); conversion to wall-clock `Duration` is a TS-specific
//! concern and lives in [`crate::ts::packet`].

/// Timing metadata optionally attached to a message unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockInfo {
    /// Program Clock Reference, 27MHz ticks, captured by `Decaps` from an
    /// adaptation field.
    pub pcr: Option<u64>,
    /// Presentation Time Stamp, 90kHz ticks, captured by `Pesd`.
    pub pts: Option<u64>,
    /// Decode Time Stamp, 90kHz ticks, captured by `Pesd`.
    pub dts: Option<u64>,
}
