//! PAT decoding: tracks the current program list, reassembling
//! multi-section tables and diffing each new version against the last.

use crate::pipe::probe::Event;
use crate::pipe::{Control, ControlResult, Pipe, PipeHandle, PipeId, ProbeLink};
use crate::ts::psi::parse_section_header;
use crate::uref::Uref;
use std::collections::HashMap;
use std::rc::Rc;

/// One decoded PAT entry: `program == 0` denotes the NIT PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number, or `0` for the NIT PID entry.
    pub program: u16,
    /// PMT PID for this program (or NIT PID, when `program == 0`).
    pub pid: u16,
}

fn parse_program_entries(body: &[u8]) -> Vec<PatEntry> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 4 <= body.len() {
        let program = ((body[pos] as u16) << 8) | body[pos + 1] as u16;
        let pid = (((body[pos + 2] & 0x1f) as u16) << 8) | body[pos + 3] as u16;
        entries.push(PatEntry { program, pid });
        pos += 4;
    }
    entries
}

struct InProgress {
    version: u8,
    last_section_number: u8,
    sections: HashMap<u8, Vec<PatEntry>>,
}

/// Decodes the Program Association Table.
pub struct PatPipe {
    link: ProbeLink,
    current: HashMap<u16, u16>,
    have_current: bool,
    in_progress: Option<InProgress>,
    current_version: Option<u8>,
}

impl PatPipe {
    /// Creates a decoder with no table learned yet.
    pub fn new() -> Self {
        PatPipe {
            link: ProbeLink::new(),
            current: HashMap::new(),
            have_current: false,
            in_progress: None,
            current_version: None,
        }
    }

    /// The PMT PID for `program`, if currently known.
    pub fn pid_for_program(&self, program: u16) -> Option<u16> {
        self.current.get(&program).copied()
    }

    /// The NIT PID (program `0`), if advertised by the current table.
    pub fn nit_pid(&self) -> Option<u16> {
        self.current.get(&0).copied()
    }

    fn apply_complete_table(&mut self, version: u8, entries: HashMap<u16, u16>) {
        if self.have_current && self.current_version == Some(version) {
            return;
        }
        for (&program, &pid) in &entries {
            if self.current.get(&program) != Some(&pid) {
                self.link.throw(Event::PatAddProgram { program, pid });
            }
        }
        for &program in self.current.keys() {
            if !entries.contains_key(&program) {
                self.link.throw(Event::PatDelProgram { program });
            }
        }
        self.current = entries;
        self.have_current = true;
        self.current_version = Some(version);
    }

    fn accept_section(&mut self, section: &[u8]) {
        let (header, offset) = match parse_section_header(section) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("pat: dropping invalid section: {e}");
                return;
            }
        };
        let body_end = header.total_len() - 4;
        let entries = parse_program_entries(&section[offset..body_end]);

        if header.last_section_number == 0 {
            let mut map = HashMap::new();
            for e in entries {
                map.insert(e.program, e.pid);
            }
            self.apply_complete_table(header.version_number, map);
            self.in_progress = None;
            return;
        }

        let fresh = match &self.in_progress {
            Some(p) => p.version != header.version_number,
            None => true,
        };
        if fresh {
            self.in_progress = Some(InProgress {
                version: header.version_number,
                last_section_number: header.last_section_number,
                sections: HashMap::new(),
            });
        }
        let in_progress = self.in_progress.as_mut().unwrap();
        in_progress.sections.insert(header.section_number, entries);

        if (0..=in_progress.last_section_number).all(|n| in_progress.sections.contains_key(&n)) {
            let version = in_progress.version;
            let mut map = HashMap::new();
            for n in 0..=in_progress.last_section_number {
                for e in &in_progress.sections[&n] {
                    map.insert(e.program, e.pid);
                }
            }
            self.apply_complete_table(version, map);
            self.in_progress = None;
        }
    }
}

impl Default for PatPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for PatPipe {
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
