//! Protocol constants for MPEG Transport Stream / PSI.

/// Size of a Transport Stream packet in bytes.
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed TS packet header in bytes.
pub const TS_HEADER_SIZE: usize = 4;
/// The sync byte that must begin every TS packet.
pub const TS_SYNC_BYTE: u8 = 0x47;
/// Highest legal PID value (13 bits).
pub const PID_MAX: u16 = 0x1fff;
/// Null packet PID, discarded by `Split` by default.
pub const PID_NULL: u16 = 0x1fff;
/// PID always carrying the Program Association Table.
pub const PID_PAT: u16 = 0x0000;

/// `table_id` of a PAT section.
pub const PAT_TABLE_ID: u8 = 0x00;
/// `table_id` of a PMT section.
pub const PMT_TABLE_ID: u8 = 0x02;

/// NIT PID mandated by DVB.
pub const NIT_PID_DVB: u16 = 0x0010;
/// NIT PID used (discouraged) by some ATSC streams.
pub const NIT_PID_ATSC: u16 = 0x1ffb;

/// Bytes of PSI section header preceding the table body, for a
/// section_syntax_indicator == 1 section: table_id(1) + length(2) +
/// table_id_extension(2) + version/current(1) + section_number(1) +
/// last_section_number(1).
pub const PSI_HEADER_SIZE_SYNTAX1: usize = 8;
/// Size of the trailing CRC-32 field on a syntax-1 PSI section.
pub const PSI_CRC_SIZE: usize = 4;

/// Clock frequency of the Program Clock Reference, in Hz.
pub const PCR_HZ: u64 = 27_000_000;
/// Clock frequency of PTS/DTS, in Hz.
pub const PTS_HZ: u64 = 90_000;

/// Returns the ES flow-definition suffix for a given MPEG-2 `stream_type`,
/// or `None` for stream types this demux does not classify (they still get
/// demuxed as a generic PES flow by `Pesd`, just without the specific
/// codec suffix `add-flow`s key off of).
pub fn stream_type_flow_suffix(stream_type: u8) -> Option<&'static str> {
    match stream_type {
        0x02 => Some("mpegtsmp2v"),
        0x1b => Some("mpegtsh264"),
        0x24 => Some("mpegtsh265"),
        0x0f => Some("mpegtsaac"),
        0x81 => Some("ac3"),
        _ => None,
    }
}
