//! # Message Units (`Uref`)
//!
//! A `Uref` is the reference-counted envelope that flows between pipes: an
//! optional byte-range payload (the "block"), a mutable attribute
//! dictionary, and optional clock metadata. Flow-definition units carry no
//! payload and declare the downstream format via the `"f.def"` string
//! attribute (e.g. `"block."`, `"block.mpegts."`).
//!
//! Urefs are cheap to clone (an `Rc` bump) and share their attribute
//! dictionary across clones: whichever pipe holds the last reference may
//! still mutate it, so the convention (enforced by discipline, not the type
//! system) is that a uref is mutated only while the mutator believes itself
//! to be the sole logical owner, typically just after allocation.

pub mod attr;
pub mod clock;
pub mod manager;

use attr::Attributes;
use clock::ClockInfo;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct UrefInner {
    block: Option<bytes::Bytes>,
    attrs: Attributes,
    clock: ClockInfo,
}

/// A reference-counted message unit.
#[derive(Clone)]
pub struct Uref(Rc<RefCell<UrefInner>>);

impl Uref {
    /// Allocates a uref with no payload (suitable for a flow-definition or
    /// control unit).
    pub fn new_control() -> Self {
        Uref(Rc::new(RefCell::new(UrefInner {
            block: None,
            attrs: Attributes::new(),
            clock: ClockInfo::default(),
        })))
    }

    /// Allocates a uref carrying `block` as its payload.
    pub fn new_block(block: bytes::Bytes) -> Self {
        Uref(Rc::new(RefCell::new(UrefInner {
            block: Some(block),
            attrs: Attributes::new(),
            clock: ClockInfo::default(),
        })))
    }

    /// Returns the payload block, if any.
    pub fn block(&self) -> Option<bytes::Bytes> {
        self.0.borrow().block.clone()
    }

    /// Replaces the payload block (used by pipes that strip headers from an
    /// incoming unit and forward the remainder, e.g. `Decaps`).
    pub fn set_block(&self, block: Option<bytes::Bytes>) {
        self.0.borrow_mut().block = block;
    }

    /// Number of reference holders. Exposed mainly for tests asserting the
    /// copy-on-write discipline described above.
    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Runs `f` against the attribute dictionary.
    pub fn with_attrs<R>(&self, f: impl FnOnce(&Attributes) -> R) -> R {
        f(&self.0.borrow().attrs)
    }

    /// Runs `f` against the mutable attribute dictionary.
    pub fn with_attrs_mut<R>(&self, f: impl FnOnce(&mut Attributes) -> R) -> R {
        f(&mut self.0.borrow_mut().attrs)
    }

    /// Returns the flow-definition string attribute, if set.
    pub fn flow_def(&self) -> Option<String> {
        self.with_attrs(|a| a.flow_def().map(str::to_owned))
    }

    /// Sets the flow-definition string attribute.
    pub fn set_flow_def(&self, def: impl Into<String>) {
        self.with_attrs_mut(|a| a.set_flow_def(def.into()));
    }

    /// Returns the PID attribute, if set.
    pub fn pid(&self) -> Option<u16> {
        self.with_attrs(|a| a.pid())
    }

    /// Sets the PID attribute.
    pub fn set_pid(&self, pid: u16) {
        self.with_attrs_mut(|a| a.set_pid(pid));
    }

    /// Returns whether the payload-unit-start marker is set.
    pub fn pusi(&self) -> bool {
        self.with_attrs(|a| a.pusi())
    }

    /// Sets the payload-unit-start marker.
    pub fn set_pusi(&self, pusi: bool) {
        self.with_attrs_mut(|a| a.set_pusi(pusi));
    }

    /// Returns the PSI filter attribute, if set.
    pub fn psi_filter(&self) -> Option<attr::PsiFilter> {
        self.with_attrs(|a| a.psi_filter().cloned())
    }

    /// Sets the PSI filter attribute.
    pub fn set_psi_filter(&self, filter: attr::PsiFilter) {
        self.with_attrs_mut(|a| a.set_psi_filter(filter));
    }

    /// Returns the program attribute, if set.
    pub fn program(&self) -> Option<String> {
        self.with_attrs(|a| a.program().map(str::to_owned))
    }

    /// Sets the program attribute.
    pub fn set_program(&self, program: impl Into<String>) {
        self.with_attrs_mut(|a| a.set_program(program.into()));
    }

    /// Returns whether the "end of flow" marker attribute is set.
    pub fn is_end(&self) -> bool {
        self.with_attrs(|a| a.is_end())
    }

    /// Sets the "end of flow" marker attribute.
    pub fn set_end(&self) {
        self.with_attrs_mut(|a| a.set_end());
    }

    /// Returns the clock metadata (PCR/PTS/DTS ticks) attached to this unit.
    pub fn clock(&self) -> ClockInfo {
        self.0.borrow().clock
    }

    /// Sets the clock metadata attached to this unit.
    pub fn set_clock(&self, clock: ClockInfo) {
        self.0.borrow_mut().clock = clock;
    }
}

impl fmt::Debug for Uref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Uref")
            .field("block_len", &inner.block.as_ref().map(bytes::Bytes::len))
            .field("attrs", &inner.attrs)
            .field("clock", &inner.clock)
            .finish()
    }
}
