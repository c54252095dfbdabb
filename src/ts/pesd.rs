//! PES reassembly: accumulates one elementary stream's
//! decapsulated payload units into complete PES packets, tagging each
//! outgoing unit with the PTS/DTS carried in its header.

use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::ts::packet::parse_pes_timestamps;
use crate::uref::clock::ClockInfo;
use crate::uref::Uref;
use bytes::BytesMut;
use std::rc::Rc;

/// Reassembles PES packets from one elementary stream's payload units.
/// Packet boundaries are delimited by the payload-unit-start marker, since
/// PES packet_length is commonly `0` (unbounded) for video streams.
pub struct PesdPipe {
    buffer: BytesMut,
    gathering: bool,
    output: Option<PipeHandle>,
    link: ProbeLink,
}

impl PesdPipe {
    /// Creates a reassembler with no packet in progress.
    pub fn new() -> Self {
        PesdPipe {
            buffer: BytesMut::new(),
            gathering: false,
            output: None,
            link: ProbeLink::new(),
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let payload = self.buffer.split().freeze();
        let (pts, dts) = parse_pes_timestamps(&payload);
        let out = Uref::new_block(payload);
        if pts.is_some() || dts.is_some() {
            out.set_clock(ClockInfo { pcr: None, pts, dts });
        }
        crate::pipe::forward(&self.output, out);
    }
}

impl Default for PesdPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl PesdPipe {
    /// Discards any in-flight PES packet on a decapsulation-reported
    /// continuity discontinuity: a partial packet spanning the gap cannot
    /// be trusted and is dropped rather than flushed.
    pub fn on_discontinuity(&mut self) {
        self.buffer.clear();
        self.gathering = false;
    }
}

impl Pipe for PesdPipe {
    fn input(&mut self, uref: Uref) {
        let Some(block) = uref.block() else { return };
        if uref.pusi() {
            self.flush();
            self.gathering = true;
        }
        if self.gathering {
            self.buffer.extend_from_slice(&block);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::handle;
    use std::cell::RefCell;

    struct Collector(Rc<RefCell<Vec<Uref>>>);
    impl Pipe for Collector {
        fn input(&mut self, uref: Uref) {
            self.0.borrow_mut().push(uref);
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

    fn pes_header_with_pts() -> Vec<u8> {
        vec![
            0x00, 0x00, 0x01, 0xe0, 0x00, 0x00, 0x80, 0x80, 0x05, 0x21, 0x00, 0x01, 0x00, 0x01,
        ]
    }

    #[test]
    fn flushes_previous_packet_on_new_pusi() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut pesd = PesdPipe::new();
        pesd.set_output(Some(handle(Collector(collected.clone()))));

        let first = Uref::new_block(bytes::Bytes::from(pes_header_with_pts()));
        first.set_pusi(true);
        pesd.input(first);

        let mid = Uref::new_block(bytes::Bytes::from_static(&[0xaa, 0xbb]));
        pesd.input(mid);

        let second = Uref::new_block(bytes::Bytes::from(pes_header_with_pts()));
        second.set_pusi(true);
        pesd.input(second);

        assert_eq!(collected.borrow().len(), 1);
        let out = &collected.borrow()[0];
        assert!(out.clock().pts.is_some());
    }

    #[test]
    fn ignores_payload_before_first_pusi() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut pesd = PesdPipe::new();
        pesd.set_output(Some(handle(Collector(collected.clone()))));

        let stray = Uref::new_block(bytes::Bytes::from_static(&[0x01, 0x02]));
        pesd.input(stray);

        assert!(collected.borrow().is_empty());
    }
}
