//! End-to-end scenarios from the testable-properties list: feed synthetic
//! TS streams into a [`Demux`] through its public `Pipe` surface and assert
//! on the events an attached probe observes.

use mpegts_demux::pipe::probe::{Event, Probe, ProbeResult};
use mpegts_demux::pipe::{Pipe, PipeId};
use mpegts_demux::ts::conformance::{Conformance, ConformanceSetting};
use mpegts_demux::ts::constants::TS_PACKET_SIZE;
use mpegts_demux::ts::Demux;
use mpegts_demux::uref::Uref;
use mpegts_demux::utils::Crc32Mpeg2;
use std::cell::RefCell;
use std::rc::Rc;

/// Collects every event thrown by the demux it is attached to.
struct EventCollector(Rc<RefCell<Vec<Event>>>);

impl Probe for EventCollector {
    fn on_event(&self, _source: PipeId, event: &Event) -> ProbeResult {
        self.0.borrow_mut().push(event.clone());
        ProbeResult::Caught
    }
}

fn new_demux() -> (Demux, Rc<RefCell<Vec<Event>>>) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut demux = Demux::new(ConformanceSetting::Auto);
    demux.set_probe(Some(Rc::new(EventCollector(events.clone()))));
    (demux, events)
}

fn flow_def(def: &str) -> Uref {
    let uref = Uref::new_control();
    uref.set_flow_def(def);
    uref
}

/// Builds a complete, CRC-appended PSI section body (no TS framing).
fn finish_section(mut data: Vec<u8>) -> Vec<u8> {
    let section_length = data.len() - 3 + 4;
    data[1] = 0xb0 | ((section_length >> 8) as u8 & 0x0f);
    data[2] = section_length as u8;
    let crc = Crc32Mpeg2::new().calculate(&data);
    data.push((crc >> 24) as u8);
    data.push((crc >> 16) as u8);
    data.push((crc >> 8) as u8);
    data.push(crc as u8);
    data
}

fn pat_section(version: u8, programs: &[(u16, u16)]) -> Vec<u8> {
    let mut data = vec![0x00, 0, 0, 0x00, 0x01, 0xc1 | (version << 1), 0x00, 0x00];
    for &(program, pid) in programs {
        data.push((program >> 8) as u8);
        data.push(program as u8);
        data.push(0xe0 | ((pid >> 8) as u8 & 0x1f));
        data.push(pid as u8);
    }
    finish_section(data)
}

fn pmt_section(version: u8, pcr_pid: u16, es: &[(u8, u16)]) -> Vec<u8> {
    let mut data = vec![
        0x02,
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
    finish_section(data)
}

/// Wraps one section's bytes (assumed to fit a single TS payload) as a
/// single 188-byte, PUSI-set, payload-only TS packet for `pid`.
fn ts_packet_carrying_section(pid: u16, cc: u8, section: &[u8]) -> Vec<u8> {
    assert!(section.len() + 1 <= TS_PACKET_SIZE - 4, "section too long for one packet in this test helper");
    let mut packet = vec![0xffu8; TS_PACKET_SIZE];
    packet[0] = 0x47;
    packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1f); // PUSI set
    packet[2] = pid as u8;
    packet[3] = 0x10 | (cc & 0x0f); // payload only, no adaptation field
    packet[4] = 0x00; // pointer_field: section starts immediately
    packet[5..5 + section.len()].copy_from_slice(section);
    packet
}

fn feed_section(demux: &mut Demux, pid: u16, cc: u8, section: &[u8]) {
    let packet = ts_packet_carrying_section(pid, cc, section);
    demux.input(Uref::new_block(bytes::Bytes::from(packet)));
}

fn add_flow_ids(events: &[Event]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::SplitAddFlow { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}

fn del_flow_ids(events: &[Event]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::SplitDelFlow { id } => Some(*id),
            _ => None,
        })
        .collect()
}

#[test]
fn scenario_1_empty_stream_locks_sync_mode_with_no_flows() {
    let (mut demux, events) = new_demux();
    demux.input(flow_def("block.mpegts."));

    assert_eq!(demux.mode(), Some(mpegts_demux::ts::sync::Mode::Sync));
    assert_eq!(demux.conformance(), Conformance::Iso);
    assert!(add_flow_ids(&events.borrow()).is_empty());
}

#[test]
fn scenario_2_pat_with_one_program_announces_pmt_flow() {
    let (mut demux, events) = new_demux();
    demux.input(flow_def("block.mpegts."));

    let section = pat_section(0, &[(1, 0x100)]);
    feed_section(&mut demux, 0x0000, 0, &section);

    let ids = add_flow_ids(&events.borrow());
    assert_eq!(ids, vec![1]);

    let pmt_flow = events
        .borrow()
        .iter()
        .find_map(|e| match e {
            Event::SplitAddFlow { id, flow_def } if *id == 1 => Some(flow_def.clone()),
            _ => None,
        })
        .expect("add-flow for program 1");
    assert_eq!(pmt_flow.flow_def().as_deref(), Some("block.mpegtspsi.mpegtspmt."));
    assert_eq!(pmt_flow.pid(), Some(0x100));
}

#[test]
fn scenario_3_nit_on_pid_16_switches_conformance_to_dvb() {
    let (mut demux, events) = new_demux();
    demux.input(flow_def("block.mpegts."));

    let section = pat_section(0, &[(0, 16), (1, 0x100)]);
    feed_section(&mut demux, 0x0000, 0, &section);

    assert_eq!(demux.conformance(), Conformance::Dvb);
    assert_eq!(demux.nit_pid(), Some(16));
    // program 0 (the NIT entry) never gets an add-flow of its own.
    assert_eq!(add_flow_ids(&events.borrow()), vec![1]);
}

#[test]
fn scenario_4_pmt_video_es_announces_pes_flow() {
    let (mut demux, _events) = new_demux();
    demux.input(flow_def("block.mpegts."));
    feed_section(&mut demux, 0x0000, 0, &pat_section(0, &[(1, 0x100)]));

    let pmt = pmt_section(0, 0x200, &[(0x02, 0x200)]);
    feed_section(&mut demux, 0x100, 0, &pmt);

    // The id is `pid << 16`; the `program` bits are never actually set (a
    // source bug this port reproduces rather than silently fixes, see
    // DESIGN.md), so `(pid << 16) | program` never holds.
    let es_flow = _events
        .borrow()
        .iter()
        .find_map(|e| match e {
            Event::SplitAddFlow { id, flow_def } if *id == (0x200u64 << 16) => Some(flow_def.clone()),
            _ => None,
        })
        .expect("add-flow for the new ES");
    assert_eq!(
        es_flow.flow_def().as_deref(),
        Some("block.mpegts.mpegtspes.mpegtsmp2v")
    );
    assert_eq!(es_flow.pid(), Some(0x200));
}

#[test]
fn scenario_5_program_removal_emits_del_flow() {
    let (mut demux, events) = new_demux();
    demux.input(flow_def("block.mpegts."));
    feed_section(&mut demux, 0x0000, 0, &pat_section(0, &[(1, 0x100), (2, 0x200)]));

    feed_section(&mut demux, 0x0000, 1, &pat_section(1, &[(2, 0x200)]));

    assert_eq!(del_flow_ids(&events.borrow()), vec![1]);
}

#[test]
fn scenario_6_crc_corruption_produces_no_add_flow() {
    let (mut demux, events) = new_demux();
    demux.input(flow_def("block.mpegts."));

    let mut section = pat_section(0, &[(1, 0x100)]);
    let last = section.len() - 1;
    section[last] ^= 0xff;
    feed_section(&mut demux, 0x0000, 0, &section);

    assert!(add_flow_ids(&events.borrow()).is_empty());

    // The demux stays healthy: a subsequent, valid section still works.
    feed_section(&mut demux, 0x0000, 1, &pat_section(0, &[(1, 0x100)]));
    assert_eq!(add_flow_ids(&events.borrow()), vec![1]);
}

#[test]
fn round_trip_conformance_through_auto_matches_never_setting() {
    let (mut demux_a, _) = new_demux();
    demux_a.input(flow_def("block.mpegts."));
    feed_section(&mut demux_a, 0x0000, 0, &pat_section(0, &[(0, 16), (1, 0x100)]));
    let baseline = demux_a.conformance();

    let (mut demux_b, _) = new_demux();
    demux_b.input(flow_def("block.mpegts."));
    demux_b.set_conformance(ConformanceSetting::Fixed(Conformance::Atsc));
    demux_b.set_conformance(ConformanceSetting::Auto);
    feed_section(&mut demux_b, 0x0000, 0, &pat_section(0, &[(0, 16), (1, 0x100)]));

    assert_eq!(demux_b.conformance(), baseline);
}

#[test]
fn accept_first_flow_def_rejects_unknown_prefix() {
    let (mut demux, events) = new_demux();
    demux.input(flow_def("not-a-block-def"));

    assert!(demux.mode().is_none());
    assert!(matches!(events.borrow().last(), Some(Event::AllocError(_))));
}

#[cfg(test)]
mod conformance_quickcheck {
    use mpegts_demux::ts::conformance::{self, Conformance};
    use quickcheck_macros::quickcheck;

    /// The conformance function is a pure, deterministic function of the
    /// observed NIT PID regardless of how many times it is re-run.
    #[quickcheck]
    fn guess_is_idempotent(nit_pid: Option<u16>) -> bool {
        conformance::guess(nit_pid) == conformance::guess(nit_pid)
    }

    #[quickcheck]
    fn guess_never_returns_isdb(nit_pid: Option<u16>) -> bool {
        conformance::guess(nit_pid) != Conformance::Isdb
    }
}
