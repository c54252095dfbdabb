//! # Base Pipe Abstraction
//!
//! A minimal, in-process version of the `upipe` base pipe contract
//! consumed by this crate: `input`, `set_output`,
//! `set_flow_def`/`control`, and an attached upward [`probe::Probe`].
//!
//! Ownership is a strict tree of `Rc<RefCell<dyn Pipe>>` strong references
//! from parent to child (an upstream pipe's `output` field, or the
//! orchestrator's own fields); back-edges from a child to the thing that
//! should hear its events are a `Probe` trait object the child was handed
//! at construction time, never a pointer back into the parent's storage
//! (see [`probe`]).

pub mod probe;

use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// An inner pipe, shared behind `Rc<RefCell<_>>` since the tree is
/// single-threaded and cooperative: no pipe is ever touched from
/// more than one logical thread of control at a time.
pub type PipeHandle = Rc<RefCell<dyn Pipe>>;

/// Opaque, process-lifetime-unique identifier for a pipe instance. Probes
/// receive this instead of a handle back into their owner, avoiding the
/// ownership cycle that embedding a raw back-pointer would create.
pub type PipeId = u64;

thread_local! {
    static NEXT_ID: Cell<PipeId> = Cell::new(1);
}

/// Allocates a fresh, process-lifetime-unique [`PipeId`].
pub fn next_id() -> PipeId {
    NEXT_ID.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

/// Control commands a pipe may be asked to execute.
#[derive(Debug, Clone)]
pub enum Control {
    /// Retrieve the uref manager a pipe is using, if it owns one.
    GetUrefMgr,
    /// Install a uref manager on a pipe.
    SetUrefMgr,
    /// Demux-specific: read the currently inferred/forced conformance.
    TsDemuxGetConformance,
    /// Demux-specific: force a conformance value, or re-enable inference.
    TsDemuxSetConformance(crate::ts::conformance::ConformanceSetting),
    /// Read the flow-definition a PID-bearing output subpipe produces.
    GetFlowDef,
    /// Configure the flow-definition a subpipe should bind to (PID plus
    /// optional PSI filter).
    SetFlowDef(crate::uref::Uref),
}

/// Result of dispatching a [`Control`] command.
#[derive(Debug)]
pub enum ControlResult {
    /// The command was recognized and executed.
    Handled,
    /// The command is not implemented by this pipe; the
    /// "unhandled" configuration-error path.
    Unhandled,
    /// The command was recognized but failed.
    Error(crate::error::DemuxError),
    /// The command was a query (`TsDemuxGetConformance`, `GetFlowDef`) and
    /// this is its textual answer.
    Value(String),
}

/// Common behaviour of every inner pipe in the demux tree.
pub trait Pipe {
    /// Accepts one input unit (either a flow-definition or a data unit).
    /// Processing is synchronous and runs to quiescence before returning,
    /// there are no suspension points in the core.
    fn input(&mut self, uref: crate::uref::Uref);

    /// Wires (or unwires, with `None`) this pipe's single output.
    fn set_output(&mut self, output: Option<PipeHandle>);

    /// Attaches (or detaches) the probe that intercepts this pipe's
    /// upward-bubbling events.
    fn set_probe(&mut self, probe: Option<Rc<dyn probe::Probe>>);

    /// Executes a control command.
    fn control(&mut self, cmd: Control) -> ControlResult;

    /// This pipe's process-lifetime-unique identifier, used as the `source`
    /// argument when it throws an event.
    fn id(&self) -> PipeId;
}

/// Helper mixed into pipe implementations: stores a probe and the pipe's own
/// id, and implements the "throw, let the probe decide" half of the
/// contract so each concrete pipe doesn't repeat this boilerplate.
pub struct ProbeLink {
    id: PipeId,
    probe: Option<Rc<dyn probe::Probe>>,
}

impl ProbeLink {
    /// Creates a link with a fresh id and no attached probe.
    pub fn new() -> Self {
        ProbeLink {
            id: next_id(),
            probe: None,
        }
    }

    /// This link's pipe id.
    pub fn id(&self) -> PipeId {
        self.id
    }

    /// Attaches or detaches the probe.
    pub fn set_probe(&mut self, probe: Option<Rc<dyn probe::Probe>>) {
        self.probe = probe;
    }

    /// Throws `event`, returning whether a probe caught it.
    pub fn throw(&self, event: probe::Event) -> probe::ProbeResult {
        match &self.probe {
            Some(p) => p.on_event(self.id, &event),
            None => {
                log::trace!("pipe {} threw {:?} with no probe attached", self.id, event);
                probe::ProbeResult::Uncaught
            }
        }
    }
}

impl Default for ProbeLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates a pipe behind the standard handle type.
pub fn handle<P: Pipe + 'static>(pipe: P) -> PipeHandle {
    Rc::new(RefCell::new(pipe))
}

/// Forwards `uref` to `output`, if wired. Convenience for pipes whose only
/// job after processing a unit is to hand it to their single output.
pub fn forward(output: &Option<PipeHandle>, uref: crate::uref::Uref) {
    if let Some(out) = output {
        out.borrow_mut().input(uref);
    }
}

/// Result alias used by construction helpers across the `ts` module.
pub type ConstructResult<T> = Result<T>;
