//! PSI filtering and fan-out: delivers each assembled section to
//! every subscriber whose [`PsiFilter`](crate::uref::attr::PsiFilter)
//! matches it.

use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::uref::attr::PsiFilter;
use crate::uref::Uref;
use std::rc::Rc;

struct Subscription {
    filter: PsiFilter,
    output: PipeHandle,
}

/// Fans assembled PSI sections out to subscribers registered by filter.
pub struct PsiSplitPipe {
    link: ProbeLink,
    subs: Vec<Subscription>,
}

impl PsiSplitPipe {
    /// Creates a split pipe with no subscribers.
    pub fn new() -> Self {
        PsiSplitPipe {
            link: ProbeLink::new(),
            subs: Vec::new(),
        }
    }

    /// Registers `output` to receive sections matching `filter`.
    pub fn subscribe(&mut self, filter: PsiFilter, output: PipeHandle) {
        self.subs.push(Subscription { filter, output });
    }

    /// Removes the subscriber identified by `id`, if present.
    pub fn unsubscribe(&mut self, id: PipeId) {
        self.subs.retain(|s| s.output.borrow().id() != id);
    }
}

impl Default for PsiSplitPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for PsiSplitPipe {
    fn input(&mut self, uref: Uref) {
        let Some(section) = uref.block() else { return };
        let mut delivered = false;
        for sub in &self.subs {
            if sub.filter.matches(&section) {
                sub.output.borrow_mut().input(uref.clone());
                delivered = true;
            }
        }
        if !delivered {
            log::trace!("psi_split: section matched no subscriber");
        }
    }

    fn set_output(&mut self, _output: Option<PipeHandle>) {
        log::warn!("psi_split has no single output; use subscribe()/unsubscribe() instead");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::handle;
    use std::cell::RefCell;

    struct Collector(Rc<RefCell<usize>>);
    impl Pipe for Collector {
        fn input(&mut self, _uref: Uref) {
            *self.0.borrow_mut() += 1;
        }
        fn set_output(&mut self, _output: Option<PipeHandle>) {}
        fn set_probe(&mut self, _probe: Option<Rc<dyn crate::pipe::probe::Probe>>) {}
        fn control(&mut self, _cmd: Control) -> ControlResult {
            ControlResult::Unhandled
        }
        fn id(&self) -> PipeId {
            0
        }
    }

    #[test]
    fn delivers_only_to_matching_subscribers() {
        let mut split = PsiSplitPipe::new();
        let mut pat_filter = PsiFilter::zeroed(1);
        pat_filter.set_byte(0, 0x00, 0xff);
        let count = Rc::new(RefCell::new(0));
        split.subscribe(pat_filter, handle(Collector(count.clone())));

        split.input(Uref::new_block(bytes::Bytes::from_static(&[0x00, 0xb0])));
        split.input(Uref::new_block(bytes::Bytes::from_static(&[0x02, 0xb0])));

        assert_eq!(*count.borrow(), 1);
    }
}
