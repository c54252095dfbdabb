//! Broadcast conformance classification.

use super::constants::{NIT_PID_ATSC, NIT_PID_DVB};

/// The broadcast profile governing table semantics and defaults. `Get`
/// never reports anything else — `auto` is a mode of `Set`, not a value of
/// `Conformance` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conformance {
    /// ISO/IEC 13818-1 baseline; the default absent other evidence.
    Iso,
    /// DVB, inferred from a NIT on the mandatory PID 0x0010.
    Dvb,
    /// ATSC, inferred from a NIT on PID 0x1FFB (ATSC itself calls this usage
    /// discouraged — see DESIGN.md).
    Atsc,
    /// ISDB. Never inferred automatically by this port (see DESIGN.md);
    /// reachable only via an explicit `Set`.
    Isdb,
}

/// The value accepted by `TS_DEMUX_SET_CONFORMANCE`: either a concrete
/// profile (which freezes inference) or `Auto` (which (re-)enables it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConformanceSetting {
    /// Switch to (or stay in) automatic inference and re-run the guess.
    Auto,
    /// Freeze the conformance at a concrete value.
    Fixed(Conformance),
}

impl ConformanceSetting {
    /// Parses the user-facing names accepted by the control command.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(ConformanceSetting::Auto),
            "iso" => Some(ConformanceSetting::Fixed(Conformance::Iso)),
            "dvb" => Some(ConformanceSetting::Fixed(Conformance::Dvb)),
            "atsc" => Some(ConformanceSetting::Fixed(Conformance::Atsc)),
            "isdb" => Some(ConformanceSetting::Fixed(Conformance::Isdb)),
            _ => None,
        }
    }
}

/// Re-derives conformance from the observed NIT PID:
/// no NIT yet ⇒ ISO; NIT on 0x0010 ⇒ DVB; NIT on 0x1FFB ⇒ ATSC (discouraged
/// but observed); otherwise remain ISO.
pub fn guess(nit_pid: Option<u16>) -> Conformance {
    match nit_pid {
        None => Conformance::Iso,
        Some(NIT_PID_DVB) => Conformance::Dvb,
        Some(NIT_PID_ATSC) => Conformance::Atsc,
        Some(_) => Conformance::Iso,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_iso_with_no_nit() {
        assert_eq!(guess(None), Conformance::Iso);
    }

    #[test]
    fn guesses_dvb_on_standard_nit_pid() {
        assert_eq!(guess(Some(0x0010)), Conformance::Dvb);
    }

    #[test]
    fn guesses_atsc_on_discouraged_nit_pid() {
        assert_eq!(guess(Some(0x1ffb)), Conformance::Atsc);
    }

    #[test]
    fn falls_back_to_iso_for_unknown_nit_pid() {
        assert_eq!(guess(Some(0x0123)), Conformance::Iso);
    }
}
