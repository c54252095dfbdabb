//! PID-based packet routing.

use crate::pipe::probe::Event;
use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::ts::constants::PID_NULL;
use crate::ts::packet::TsHeader;
use crate::uref::Uref;
use std::collections::HashMap;
use std::rc::Rc;

/// Routes aligned TS packets by PID to every subscriber registered for
/// that PID. Subscribers are concrete downstream pipe handles, registered
/// directly via [`SplitPipe::subscribe`] rather than through an
/// intermediate per-PID relay (see [`SplitOutput`] for that alternative).
pub struct SplitPipe {
    link: ProbeLink,
    subs: HashMap<u16, Vec<PipeHandle>>,
}

impl SplitPipe {
    /// Creates an empty split pipe.
    pub fn new() -> Self {
        SplitPipe {
            link: ProbeLink::new(),
            subs: HashMap::new(),
        }
    }

    /// Registers `output` as a subscriber for `pid`.
    pub fn subscribe(&mut self, pid: u16, output: PipeHandle) {
        self.subs.entry(pid).or_default().push(output);
    }

    /// Removes the subscriber identified by `id` from `pid`'s list, if
    /// present.
    pub fn unsubscribe(&mut self, pid: u16, id: PipeId) {
        if let Some(list) = self.subs.get_mut(&pid) {
            list.retain(|h| h.borrow().id() != id);
            if list.is_empty() {
                self.subs.remove(&pid);
            }
        }
    }
}

impl Default for SplitPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for SplitPipe {
    fn input(&mut self, uref: Uref) {
        let Some(block) = uref.block() else { return };
        let header = match TsHeader::parse(&block) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("split: dropping malformed TS packet: {e}");
                return;
            }
        };
        if header.pid == PID_NULL {
            return;
        }
        if let Some(subs) = self.subs.get(&header.pid) {
            for sub in subs {
                sub.borrow_mut().input(uref.clone());
            }
        } else {
            log::trace!("split: no subscriber for PID {}", header.pid);
        }
    }

    fn set_output(&mut self, _output: Option<PipeHandle>) {
        log::warn!("split has no single output; use subscribe()/unsubscribe() instead");
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

/// A per-PID relay allocated by [`SplitPipe::subscribe`]'s caller: it holds
/// the single downstream output for one PID, and announces its flow
/// definition via [`Event::NewFlowDef`] once `SetFlowDef` is called on it,
/// prompting a plumber probe to install the right child pipe.
pub struct SplitOutput {
    pid: u16,
    output: Option<PipeHandle>,
    link: ProbeLink,
}

impl SplitOutput {
    /// Creates an output bound to `pid`.
    pub fn new(pid: u16) -> Self {
        SplitOutput {
            pid,
            output: None,
            link: ProbeLink::new(),
        }
    }

    /// The PID this output was bound to.
    pub fn pid(&self) -> u16 {
        self.pid
    }
}

impl Pipe for SplitOutput {
    fn input(&mut self, uref: Uref) {
        crate::pipe::forward(&self.output, uref);
    }

    fn set_output(&mut self, output: Option<PipeHandle>) {
        self.output = output;
    }

    fn set_probe(&mut self, probe: Option<Rc<dyn crate::pipe::probe::Probe>>) {
        self.link.set_probe(probe);
    }

    fn control(&mut self, cmd: Control) -> ControlResult {
        match cmd {
            Control::SetFlowDef(uref) => {
                let Some(def) = uref.flow_def() else {
                    return ControlResult::Error(crate::error::DemuxError::InvalidFlowDef(
                        "missing flow definition".into(),
                    ));
                };
                if let Some(pid) = uref.pid() {
                    if pid > crate::ts::constants::PID_MAX {
                        return ControlResult::Error(crate::error::DemuxError::PidOutOfRange(pid));
                    }
                }
                self.link.throw(Event::NewFlowDef(def));
                ControlResult::Handled
            }
            _ => ControlResult::Unhandled,
        }
    }

    fn id(&self) -> PipeId {
        self.link.id()
    }
}
