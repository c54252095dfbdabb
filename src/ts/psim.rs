//! PSI section assembly: reassembles TS payload units carrying
//! one PID's PSI stream into complete, CRC-validated sections.

use crate::pipe::probe::Event;
use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::ts::psi::{parse_section_header, validate_crc};
use crate::uref::Uref;
use bytes::BytesMut;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Gathering { want: usize },
}

/// Assembles PSI sections from a single PID's stream of decapsulated
/// payload units. Starts `Idle`; a unit with PUSI set carries a
/// `pointer_field` locating the first section's start.
pub struct PsimPipe {
    state: State,
    buffer: BytesMut,
    output: Option<PipeHandle>,
    link: ProbeLink,
}

impl PsimPipe {
    /// Creates an assembler with no section in progress.
    pub fn new() -> Self {
        PsimPipe {
            state: State::Idle,
            buffer: BytesMut::new(),
            output: None,
            link: ProbeLink::new(),
        }
    }

    fn reset(&mut self) {
        self.state = State::Idle;
        self.buffer.clear();
    }

    fn start_section(&mut self, data: &[u8]) {
        self.buffer.clear();
        self.buffer.extend_from_slice(data);
        self.try_determine_length();
    }

    fn try_determine_length(&mut self) {
        if self.buffer.len() >= 3 {
            let section_length = (((self.buffer[1] & 0x0f) as usize) << 8) | self.buffer[2] as usize;
            self.state = State::Gathering {
                want: 3 + section_length,
            };
        } else {
            self.state = State::Gathering { want: usize::MAX };
        }
    }

    fn drain_complete_sections(&mut self) {
        loop {
            let want = match self.state {
                State::Gathering { want } if want != usize::MAX => want,
                _ => return,
            };
            if self.buffer.len() < want {
                return;
            }
            let section = self.buffer.split_to(want).freeze();
            match parse_section_header(&section).and_then(|_| validate_crc(&section).map(|_| ())) {
                Ok(()) => {
                    crate::pipe::forward(&self.output, Uref::new_block(section));
                }
                Err(e) => {
                    log::warn!("psim: dropping invalid section: {e}");
                }
            }
            if self.buffer.is_empty() {
                self.state = State::Idle;
                return;
            }
            self.try_determine_length();
        }
    }
}

impl Default for PsimPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for PsimPipe {
    fn input(&mut self, uref: Uref) {
        let Some(block) = uref.block() else { return };
        let mut data = block;

        if uref.pusi() {
            if data.is_empty() {
                log::warn!("psim: PUSI set on empty payload unit");
                return;
            }
            let pointer = data[0] as usize;
            if data.len() < 1 + pointer {
                log::warn!("psim: pointer field exceeds payload length");
                self.reset();
                return;
            }
            let (stuffing, rest) = data.split_at(1 + pointer);
            let _ = stuffing;
            if self.state != State::Idle {
                // Whatever was left over before this new section starts
                // belongs to the previous, now-abandoned section; RAI-driven
                // resync discards it rather than guessing.
                log::debug!("psim: discarding partial section at new PUSI boundary");
            }
            data = rest.to_vec().into();
            self.start_section(&data);
            self.drain_complete_sections();
            return;
        }

        match self.state {
            State::Idle => {
                log::trace!("psim: dropping payload with no section in progress");
            }
            State::Gathering { want } => {
                self.buffer.extend_from_slice(&data);
                if want == usize::MAX {
                    self.try_determine_length();
                }
                self.drain_complete_sections();
            }
        }
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

/// Invoked by the orchestrator when a continuity discontinuity is observed
/// on a PID this assembler owns: mid-assembly state must not survive a gap.
impl PsimPipe {
    /// Drops any in-flight section state on a discontinuity
    /// handling.
    pub fn on_discontinuity(&mut self) {
        self.reset();
        self.link.throw(Event::Discontinuity { pid: 0 });
    }
}
