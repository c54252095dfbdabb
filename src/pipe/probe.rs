//! # Probes — the upward event bus
//!
//! A probe is a callback attached to a pipe that intercepts events bubbling
//! up from it. `Event` is a closed enum
//! with typed payloads (not a dynamic, variadic dispatch), and a probe
//! returns a three-valued result: caught, uncaught (bubble further), or
//! error.

use crate::error::DemuxError;
use crate::pipe::PipeId;
use crate::ts::psi::Descriptor;
use crate::uref::Uref;
use std::rc::Rc;

/// Events an inner pipe may throw to its attached probe.
#[derive(Debug, Clone)]
pub enum Event {
    /// The pipe finished initializing and is ready for input.
    Ready,
    /// The pipe is about to be destroyed.
    Dead,
    /// The pipe needs a [`crate::uref::manager::UrefManager`] before it can
    /// allocate anything.
    NeedUrefMgr,
    /// A new output needs to be installed downstream of this pipe, because
    /// it is about to start producing units of the format named here (the
    /// "plumbing" announcement the orchestrator reacts to).
    NewFlowDef(String),
    /// An allocation failed; the current construction step aborted.
    AllocError(String),
    /// A new demuxed flow was discovered (`Demux`'s split-output contract).
    SplitAddFlow {
        /// Caller-chosen identifier for the flow (program number, or
        /// `(pid << 16) | program` for elementary streams).
        id: u64,
        /// Flow-definition unit describing the new output.
        flow_def: Uref,
    },
    /// A previously announced flow has disappeared.
    SplitDelFlow {
        /// The identifier previously passed to [`Event::SplitAddFlow`].
        id: u64,
    },
    /// The PAT decoder found a program entry that was not present in the
    /// previous version (or this is the first version seen).
    PatAddProgram {
        /// Program number; `0` denotes the NIT PID entry.
        program: u16,
        /// PMT PID (or NIT PID, when `program == 0`).
        pid: u16,
    },
    /// The PAT decoder's previous version listed `program` but the new one
    /// does not.
    PatDelProgram {
        /// The program number that disappeared.
        program: u16,
    },
    /// The PMT decoder found an elementary stream entry new to this
    /// version.
    PmtAddEs {
        /// Elementary stream PID.
        pid: u16,
        /// MPEG-2 stream_type byte.
        stream_type: u8,
        /// Descriptors attached to the ES loop entry.
        descriptors: Vec<Descriptor>,
    },
    /// The PMT decoder's previous version listed this ES PID but the new
    /// one does not.
    PmtDelEs {
        /// The elementary stream PID that disappeared.
        pid: u16,
    },
    /// A continuity-counter gap or mid-assembly version change was
    /// detected; in-flight reassembly state for the affected PID was
    /// dropped.
    Discontinuity {
        /// PID on which the discontinuity was observed.
        pid: u16,
    },
}

/// Outcome of handing an [`Event`] to a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The event was handled; it should not bubble further.
    Caught,
    /// The event was not relevant to this probe; callers should offer it to
    /// the next probe in the chain, if any.
    Uncaught,
    /// The probe tried to handle the event but failed.
    Error(DemuxErrorKind),
}

/// A small, `Clone`-able error payload for [`ProbeResult::Error`] (probes
/// run during event dispatch, not as part of a `Result`-returning call
/// chain, so we carry just enough to log).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxErrorKind(pub String);

impl From<DemuxError> for DemuxErrorKind {
    fn from(e: DemuxError) -> Self {
        DemuxErrorKind(e.to_string())
    }
}

/// A handler attached to a pipe that intercepts its outgoing events.
pub trait Probe {
    /// Handles `event` thrown by the pipe identified by `source`.
    fn on_event(&self, source: PipeId, event: &Event) -> ProbeResult;
}

/// Composes several probes into a chain: each is tried in order until one
/// catches the event, mirroring "unhandled events propagate to the parent
/// probe".
#[derive(Default)]
pub struct ProbeChain {
    links: Vec<Rc<dyn Probe>>,
}

impl ProbeChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        ProbeChain { links: Vec::new() }
    }

    /// Appends a probe to the end of the chain.
    pub fn push(&mut self, probe: Rc<dyn Probe>) {
        self.links.push(probe);
    }
}

impl Probe for ProbeChain {
    fn on_event(&self, source: PipeId, event: &Event) -> ProbeResult {
        for link in &self.links {
            match link.on_event(source, event) {
                ProbeResult::Uncaught => continue,
                other => return other,
            }
        }
        ProbeResult::Uncaught
    }
}

/// Wraps a closure as a [`Probe`], for the common case of a one-off handler
/// that does not need its own named type.
pub struct FnProbe<F>(pub F)
where
    F: Fn(PipeId, &Event) -> ProbeResult;

impl<F> Probe for FnProbe<F>
where
    F: Fn(PipeId, &Event) -> ProbeResult,
{
    fn on_event(&self, source: PipeId, event: &Event) -> ProbeResult {
        (self.0)(source, event)
    }
}

/// A probe that logs every event at warn level and reports it uncaught;
/// useful as the outermost link of a chain so nothing is silently dropped.
pub struct LoggingProbe;

impl Probe for LoggingProbe {
    fn on_event(&self, source: PipeId, event: &Event) -> ProbeResult {
        log::warn!("unhandled event from pipe {}: {:?}", source, event);
        ProbeResult::Uncaught
    }
}
