//! Header decapsulation: strips the 4-byte TS header and any
//! adaptation field, captures PCR into the outgoing [`Uref`]'s clock
//! metadata, and watches the continuity counter for discontinuities.

use crate::pipe::probe::Event;
use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::ts::constants::TS_HEADER_SIZE;
use crate::ts::packet::{AdaptationField, TsHeader};
use crate::uref::clock::ClockInfo;
use crate::uref::Uref;
use std::rc::Rc;

/// Strips framing from one PID's worth of TS packets and forwards bare
/// payload units, one per packet carrying payload.
pub struct DecapsPipe {
    output: Option<PipeHandle>,
    link: ProbeLink,
    last_cc: Option<u8>,
}

impl DecapsPipe {
    /// Creates a decapsulator with no continuity-counter history yet.
    pub fn new() -> Self {
        DecapsPipe {
            output: None,
            link: ProbeLink::new(),
            last_cc: None,
        }
    }

    fn check_continuity(&mut self, header: &TsHeader) {
        if let Some(prev) = self.last_cc {
            if header.contains_payload {
                let expected = (prev + 1) & 0x0f;
                if header.continuity_counter != expected {
                    log::warn!(
                        "continuity discontinuity on PID {}: expected {expected}, got {}",
                        header.pid,
                        header.continuity_counter
                    );
                    self.link.throw(Event::Discontinuity { pid: header.pid });
                }
            }
        }
        if header.contains_payload {
            self.last_cc = Some(header.continuity_counter);
        }
    }
}

impl Default for DecapsPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for DecapsPipe {
    fn input(&mut self, uref: Uref) {
        let Some(block) = uref.block() else { return };
        let header = match TsHeader::parse(&block) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("decaps: dropping malformed TS packet: {e}");
                return;
            }
        };
        self.check_continuity(&header);

        let mut offset = TS_HEADER_SIZE;
        let mut pcr = None;
        match AdaptationField::parse(&header, &block, offset) {
            Ok(Some(field)) => {
                pcr = field.pcr;
                offset += 1 + field.length;
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("decaps: malformed adaptation field on PID {}: {e}", header.pid);
                return;
            }
        }

        if !header.contains_payload || offset > block.len() {
            return;
        }

        let payload = block.slice(offset..);
        let out = Uref::new_block(payload);
        out.set_pid(header.pid);
        out.set_pusi(header.payload_unit_start);
        if let Some(pcr) = pcr {
            out.set_clock(ClockInfo {
                pcr: Some(pcr),
                pts: None,
                dts: None,
            });
        }
        crate::pipe::forward(&self.output, out);
    }

    fn set_output(&mut self, output: Option<PipeHandle>) {
        self.output = output;
    }

    fn set_probe(&mut self, probe: Option<Rc<dyn crate::pipe::probe::Probe>>) {
        self.link.set_probe(probe);
    }

    fn control(&mut self, _cmd: Control) -> ControlResult {
        ControlResult::Unhandled
    }

    fn id(&self) -> PipeId {
        self.link.id()
    }
}
