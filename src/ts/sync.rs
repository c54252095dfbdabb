//! Byte-alignment recovery: turns a raw or loosely framed block
//! stream into byte-aligned 188-byte TS packets.
//!
//! Three input modes are named (`sync`, `check`, `scan`) but only two
//! distinct behaviours are really needed: strict per-window validation with
//! resync-on-mismatch for input that is already believed aligned ("check"),
//! and full positional scanning for a periodic sync byte when alignment is
//! unknown ("scan"). `sync` and `scan` share the same scanning engine — both
//! start from a stream with no assumed alignment — while `check` gets the
//! stricter assume-aligned, resync-on-mismatch behaviour (see DESIGN.md).

use crate::config;
use crate::pipe::probe::Event;
use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::ts::constants::{TS_PACKET_SIZE, TS_SYNC_BYTE};
use crate::uref::Uref;
use bytes::{Buf, Bytes, BytesMut};
use std::rc::Rc;

/// Which alignment-recovery behaviour an instance implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `"block.mpegts."` — scan for alignment, same engine as `Scan`.
    Sync,
    /// `"block.mpegtsaligned."` — assume aligned, resync on mismatch.
    Check,
    /// `"block."` — scan for alignment from a fully unframed stream.
    Scan,
}

/// The byte-alignment pipe. One instance is constructed per accepted
/// flow-definition and becomes the demux's "current input-mode pipe".
pub struct SyncPipe {
    mode: Mode,
    buffer: BytesMut,
    locked: bool,
    output: Option<PipeHandle>,
    link: ProbeLink,
}

impl SyncPipe {
    /// Creates a new alignment pipe for `mode`.
    pub fn new(mode: Mode) -> Self {
        SyncPipe {
            mode,
            buffer: BytesMut::new(),
            locked: false,
            output: None,
            link: ProbeLink::new(),
        }
    }

    /// Finds the earliest offset in `buf` at which the sync byte repeats at
    /// 188-byte spacing, confirmed across as many spaced positions as are
    /// currently buffered (up to `config::sync_run_len()`). Returns `None`
    /// if not even one full packet has arrived yet.
    ///
    /// A single already-aligned packet locks immediately on the strength of
    /// that one packet; a longer run only raises confidence; it is never a
    /// precondition for locking at all, since requiring `sync_run_len` full
    /// packets up front would stall on normal single-packet input.
    fn find_lock(buf: &[u8]) -> Option<usize> {
        let run = config::sync_run_len().max(1);
        if buf.len() < TS_PACKET_SIZE {
            return None;
        }
        let max_start = buf.len() - TS_PACKET_SIZE;
        for start in 0..=max_start {
            if buf[start] != TS_SYNC_BYTE {
                continue;
            }
            let available = (buf.len() - start) / TS_PACKET_SIZE;
            let confirm = run.min(available);
            if (0..confirm).all(|i| buf[start + i * TS_PACKET_SIZE] == TS_SYNC_BYTE) {
                return Some(start);
            }
        }
        None
    }

    fn emit_packet(&mut self) {
        let packet = self.buffer.split_to(TS_PACKET_SIZE).freeze();
        crate::pipe::forward(&self.output, Uref::new_block(packet));
    }

    fn run_scan(&mut self) {
        loop {
            if !self.locked {
                match Self::find_lock(&self.buffer) {
                    Some(offset) => {
                        if offset > 0 {
                            self.buffer.advance(offset);
                        }
                        self.locked = true;
                        log::debug!("sync acquired at offset {offset}");
                    }
                    None => {
                        // Keep the buffer from growing without bound while
                        // we wait for a lock: nothing before the last
                        // possible candidate start can ever be the start of
                        // a winning run.
                        let run = config::sync_run_len().max(1);
                        let cap = run * TS_PACKET_SIZE;
                        if self.buffer.len() > cap {
                            let drop_n = self.buffer.len() - cap;
                            self.buffer.advance(drop_n);
                        }
                        return;
                    }
                }
            }
            if self.buffer.len() < TS_PACKET_SIZE {
                return;
            }
            if self.buffer[0] != TS_SYNC_BYTE {
                log::warn!("lost sync lock, re-scanning");
                self.locked = false;
                continue;
            }
            self.emit_packet();
        }
    }

    fn run_check(&mut self) {
        loop {
            if self.buffer.len() < TS_PACKET_SIZE {
                return;
            }
            if self.buffer[0] == TS_SYNC_BYTE {
                self.locked = true;
                self.emit_packet();
                continue;
            }
            self.link.throw(Event::Discontinuity { pid: 0xffff });
            log::warn!("check mode: sync byte mismatch, searching for realignment");
            self.locked = false;
            match Self::find_lock(&self.buffer) {
                Some(offset) => self.buffer.advance(offset),
                None => return,
            }
        }
    }
}

impl Pipe for SyncPipe {
    fn input(&mut self, uref: Uref) {
        if let Some(block) = uref.block() {
            self.buffer.extend_from_slice(&block);
        } else {
            return;
        }
        match self.mode {
            Mode::Sync | Mode::Scan => self.run_scan(),
            Mode::Check => self.run_check(),
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

/// Concatenates raw bytes into a [`Bytes`] test fixture; used by unit and
/// integration tests that assemble synthetic TS streams.
#[cfg(test)]
pub(crate) fn concat(chunks: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::new();
    for c in chunks {
        buf.extend_from_slice(c);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::handle;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Collector(Rc<RefCell<Vec<Bytes>>>);
    impl Pipe for Collector {
        fn input(&mut self, uref: Uref) {
            if let Some(b) = uref.block() {
                self.0.borrow_mut().push(b);
            }
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

    fn packet(pid_byte: u8) -> [u8; TS_PACKET_SIZE] {
        let mut p = [0xffu8; TS_PACKET_SIZE];
        p[0] = TS_SYNC_BYTE;
        p[1] = 0x00;
        p[2] = pid_byte;
        p[3] = 0x10;
        p
    }

    #[test]
    fn check_mode_passes_aligned_packets_through() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let sink = handle(Collector(collected.clone()));
        let mut sync = SyncPipe::new(Mode::Check);
        sync.set_output(Some(sink));

        let data = concat(&[&packet(1), &packet(2)]);
        sync.input(Uref::new_block(data));

        assert_eq!(collected.borrow().len(), 2);
    }

    #[test]
    fn scan_mode_locks_on_after_garbage_prefix() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let sink = handle(Collector(collected.clone()));
        let mut sync = SyncPipe::new(Mode::Scan);
        sync.set_output(Some(sink));

        let mut data = BytesMut::new();
        data.extend_from_slice(&[0x00, 0x01, 0x02]); // garbage prefix
        for p in [packet(1), packet(2), packet(3), packet(4), packet(5)] {
            data.extend_from_slice(&p);
        }
        sync.input(Uref::new_block(data.freeze()));

        assert_eq!(collected.borrow().len(), 5);
    }

    #[test]
    fn sync_mode_locks_on_a_single_aligned_packet() {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let sink = handle(Collector(collected.clone()));
        let mut sync = SyncPipe::new(Mode::Sync);
        sync.set_output(Some(sink));

        sync.input(Uref::new_block(bytes::Bytes::copy_from_slice(&packet(1))));

        assert_eq!(collected.borrow().len(), 1);
    }
}
