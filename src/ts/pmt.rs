//! PMT decoding: tracks one program's elementary stream list and
//! diffs each new version against the last.

use crate::pipe::probe::Event;
use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::ts::psi::{parse_descriptors, parse_section_header, Descriptor};
use crate::uref::Uref;
use std::collections::HashMap;
use std::rc::Rc;

/// One decoded elementary-stream loop entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtEntry {
    /// Elementary stream PID.
    pub pid: u16,
    /// MPEG-2 stream_type byte.
    pub stream_type: u8,
    /// Descriptors attached to this ES loop entry.
    pub descriptors: Vec<Descriptor>,
}

fn parse_es_entries(body: &[u8]) -> crate::error::Result<Vec<PmtEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 5 <= body.len() {
        let stream_type = body[pos];
        let pid = (((body[pos + 1] & 0x1f) as u16) << 8) | body[pos + 2] as u16;
        let es_info_length = (((body[pos + 3] & 0x0f) as usize) << 8) | body[pos + 4] as usize;
        pos += 5;
        if pos + es_info_length > body.len() {
            return Err(crate::error::DemuxError::SectionTooShort);
        }
        let descriptors = parse_descriptors(&body[pos..pos + es_info_length])?;
        entries.push(PmtEntry {
            pid,
            stream_type,
            descriptors,
        });
        pos += es_info_length;
    }
    Ok(entries)
}

/// Decodes one program's Program Map Table. PMTs are never split across
/// sections in practice and are treated as single-section here (see
/// DESIGN.md).
pub struct PmtPipe {
    link: ProbeLink,
    current: HashMap<u16, PmtEntry>,
    have_current: bool,
    current_version: Option<u8>,
    pcr_pid: Option<u16>,
}

impl PmtPipe {
    /// Creates a decoder with no table learned yet.
    pub fn new() -> Self {
        PmtPipe {
            link: ProbeLink::new(),
            current: HashMap::new(),
            have_current: false,
            current_version: None,
            pcr_pid: None,
        }
    }

    /// The PID carrying the program's PCR, if known.
    pub fn pcr_pid(&self) -> Option<u16> {
        self.pcr_pid
    }

    /// Currently known elementary streams, by PID.
    pub fn elementary_streams(&self) -> &HashMap<u16, PmtEntry> {
        &self.current
    }

    fn accept_section(&mut self, section: &[u8]) {
        let (header, offset) = match parse_section_header(section) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("pmt: dropping invalid section: {e}");
                return;
            }
        };
        if self.have_current && self.current_version == Some(header.version_number) {
            return;
        }
        if section.len() < offset + 4 {
            log::warn!("pmt: section too short for program-info header");
            return;
        }
        let pcr_pid = (((section[offset] & 0x1f) as u16) << 8) | section[offset + 1] as u16;
        let program_info_length =
            (((section[offset + 2] & 0x0f) as usize) << 8) | section[offset + 3] as usize;
        let es_start = offset + 4 + program_info_length;
        let body_end = header.total_len() - 4;
        if es_start > body_end || body_end > section.len() {
            log::warn!("pmt: program_info_length overruns section");
            return;
        }

        let entries = match parse_es_entries(&section[es_start..body_end]) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("pmt: dropping malformed ES loop: {e}");
                return;
            }
        };

        let mut fresh = HashMap::new();
        for entry in entries {
            fresh.insert(entry.pid, entry);
        }

        for (pid, entry) in &fresh {
            if self.current.get(pid) != Some(entry) {
                self.link.throw(Event::PmtAddEs {
                    pid: *pid,
                    stream_type: entry.stream_type,
                    descriptors: entry.descriptors.clone(),
                });
            }
        }
        for pid in self.current.keys() {
            if !fresh.contains_key(pid) {
                self.link.throw(Event::PmtDelEs { pid: *pid });
            }
        }

        self.current = fresh;
        self.have_current = true;
        self.current_version = Some(header.version_number);
        self.pcr_pid = Some(pcr_pid);
    }
}

impl Default for PmtPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for PmtPipe {
    fn input(&mut self, uref: Uref) {
        if let Some(section) = uref.block() {
            self.accept_section(&section);
        }
    }

    fn set_output(&mut self, _output: Option<PipeHandle>) {}

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
    use crate::ts::constants::PMT_TABLE_ID;
    use crate::utils::crc::Crc32Mpeg2;

    fn pmt_section(version: u8, pcr_pid: u16, es: &[(u8, u16)]) -> bytes::Bytes {
        let mut data = vec![
            PMT_TABLE_ID,
            0,
            0,
            0x00,
            0x01,
            0xc1 | (version << 1),
            0x00,
            0x00,
            0xe0 | ((pcr_pid >> 8) as u8 & 0x1f),
            pcr_pid as u8,
            0xf0,
            0x00,
        ];
        for &(stream_type, pid) in es {
            data.push(stream_type);
            data.push(0xe0 | ((pid >> 8) as u8 & 0x1f));
            data.push(pid as u8);
            data.push(0xf0);
            data.push(0x00);
        }
        let section_length = data.len() - 3 + 4;
        data[1] = 0xb0 | ((section_length >> 8) as u8 & 0x0f);
        data[2] = section_length as u8;
        let crc = Crc32Mpeg2::new().calculate(&data);
        data.push((crc >> 24) as u8);
        data.push((crc >> 16) as u8);
        data.push((crc >> 8) as u8);
        data.push(crc as u8);
        bytes::Bytes::from(data)
    }

    #[test]
    fn learns_elementary_streams() {
        let mut pmt = PmtPipe::new();
        pmt.input(Uref::new_block(pmt_section(0, 0x101, &[(0x02, 0x101)])));
        assert_eq!(pmt.pcr_pid(), Some(0x101));
        assert!(pmt.elementary_streams().contains_key(&0x101));
    }

    #[test]
    fn diffs_es_removal_on_version_bump() {
        let mut pmt = PmtPipe::new();
        pmt.input(Uref::new_block(pmt_section(
            0,
            0x101,
            &[(0x02, 0x101), (0x0f, 0x102)],
        )));
        pmt.input(Uref::new_block(pmt_section(1, 0x101, &[(0x02, 0x101)])));
        assert!(!pmt.elementary_streams().contains_key(&0x102));
    }
}
