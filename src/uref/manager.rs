//! The message-unit manager collaborator.
//!
//! Real deployments would pool allocations; this core only ever needs two
//! operations (`alloc_control`, `alloc`), so the default manager is a thin,
//! allocation-per-call implementation. Pipes
//! obtain a manager through the `NeedUrefMgr` event (see
//! [`crate::pipe::probe::Event::NeedUrefMgr`]) rather than reaching for a
//! process-global singleton, keeping the core instance-scoped.

use crate::uref::Uref;
use bytes::Bytes;

/// Allocates [`Uref`]s. Implementors may pool buffers; the default
/// implementation here does not.
pub trait UrefManager {
    /// Allocates an empty control/flow-definition unit.
    fn alloc_control(&self) -> Uref;

    /// Allocates a unit carrying `block` as its payload.
    fn alloc(&self, block: Bytes) -> Uref;
}

/// Straightforward manager that allocates a fresh `Uref` on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUrefManager;

impl UrefManager for DefaultUrefManager {
    fn alloc_control(&self) -> Uref {
        Uref::new_control()
    }

    fn alloc(&self, block: Bytes) -> Uref {
        Uref::new_block(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_control_has_no_block() {
        let mgr = DefaultUrefManager;
        assert!(mgr.alloc_control().block().is_none());
    }

    #[test]
    fn alloc_carries_block() {
        let mgr = DefaultUrefManager;
        let uref = mgr.alloc(Bytes::from_static(&[0x47]));
        assert_eq!(uref.block().unwrap().as_ref(), &[0x47]);
    }
}
