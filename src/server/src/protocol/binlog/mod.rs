pub mod events;
pub mod framer;

use crate::protocol::mysql::CodecError;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use winnow::binary::u8 as le_u8;
use winnow::binary::{le_u16, le_u32};
use winnow::prelude::*;

/// Every event starts with this fixed header.
pub const EVENT_HEADER_LEN: usize = 19;

/// Length of the checksum-algorithm byte trailing a FORMAT_DESCRIPTION body.
pub const CHECKSUM_ALG_DESC_LEN: usize = 1;

/// Length of the CRC32 trailer when checksums are active.
pub const CHECKSUM_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum EventType {
    Unknown = 0,
    StartV3 = 1,
    Query = 2,
    Stop = 3,
    Rotate = 4,
    IntVar = 5,
    Load = 6,
    Slave = 7,
    CreateFile = 8,
    AppendBlock = 9,
    ExecLoad = 10,
    DeleteFile = 11,
    NewLoad = 12,
    Rand = 13,
    UserVar = 14,
    FormatDescription = 15,
    Xid = 16,
    BeginLoadQuery = 17,
    ExecuteLoadQuery = 18,
    TableMap = 19,
    WriteRowsV0 = 20,
    UpdateRowsV0 = 21,
    DeleteRowsV0 = 22,
    WriteRowsV1 = 23,
    UpdateRowsV1 = 24,
    DeleteRowsV1 = 25,
    Incident = 26,
    Heartbeat = 27,
    Ignorable = 28,
    RowsQuery = 29,
    WriteRowsV2 = 30,
    UpdateRowsV2 = 31,
    DeleteRowsV2 = 32,
    Gtid = 33,
    AnonymousGtid = 34,
    PreviousGtids = 35,
}

impl EventType {
    pub fn from_code(code: u8) -> EventType {
        EventType::from_u8(code).unwrap_or(EventType::Unknown)
    }
}

bitflags::bitflags! {
    /// Flag word of `COM_BINLOG_DUMP`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BinlogDumpFlags: u16 {
        /// Report end-of-stream instead of blocking when the log runs dry.
        const NON_BLOCK = 0x01;
    }
}

/// Checksum algorithm announced by the FORMAT_DESCRIPTION event. Events
/// after it carry a CRC32 trailer only when the algorithm says so.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ChecksumAlgorithm {
    #[default]
    Off,
    Crc32,
}

impl ChecksumAlgorithm {
    pub fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            0 => Ok(ChecksumAlgorithm::Off),
            1 => Ok(ChecksumAlgorithm::Crc32),
            other => Err(CodecError::MalformedPacket(format!(
                "unsupported checksum algorithm {other}"
            ))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ChecksumAlgorithm::Off => 0,
            ChecksumAlgorithm::Crc32 => 1,
        }
    }

    pub fn trailer_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Off => 0,
            ChecksumAlgorithm::Crc32 => CHECKSUM_LEN,
        }
    }
}

/// The 19 byte common event header.
///
/// ```text
/// +----------------------------+
/// | timestamp         0 : 4    |
/// | event_type        4 : 1    |
/// | server_id         5 : 4    |
/// | event_length      9 : 4    |  header + body + checksum
/// | next_position    13 : 4    |
/// | flags            17 : 2    |
/// +----------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type: u8,
    pub server_id: u32,
    pub event_length: u32,
    pub next_pos: u32,
    pub flags: u16,
}

impl EventHeader {
    pub fn kind(&self) -> EventType {
        EventType::from_code(self.event_type)
    }

    pub fn parse(i: &[u8]) -> winnow::IResult<&[u8], EventHeader> {
        let (i, timestamp) = le_u32.parse_peek(i)?;
        let (i, event_type) = le_u8.parse_peek(i)?;
        let (i, server_id) = le_u32.parse_peek(i)?;
        let (i, event_length) = le_u32.parse_peek(i)?;
        let (i, next_pos) = le_u32.parse_peek(i)?;
        let (i, flags) = le_u16.parse_peek(i)?;
        Ok((
            i,
            EventHeader {
                timestamp,
                event_type,
                server_id,
                event_length,
                next_pos,
                flags,
            },
        ))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.event_type);
        out.extend_from_slice(&self.server_id.to_le_bytes());
        out.extend_from_slice(&self.event_length.to_le_bytes());
        out.extend_from_slice(&self.next_pos.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = EventHeader {
            timestamp: 1_700_000_000,
            event_type: EventType::Rotate as u8,
            server_id: 1,
            event_length: 44,
            next_pos: 4,
            flags: 0x20,
        };
        let mut out = Vec::new();
        header.encode(&mut out);
        assert_eq!(out.len(), EVENT_HEADER_LEN);
        let (rest, parsed) = EventHeader::parse(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, header);
        assert_eq!(parsed.kind(), EventType::Rotate);
    }

    #[test]
    fn checksum_codes() {
        assert_eq!(ChecksumAlgorithm::from_code(0).unwrap(), ChecksumAlgorithm::Off);
        assert_eq!(ChecksumAlgorithm::from_code(1).unwrap(), ChecksumAlgorithm::Crc32);
        assert!(ChecksumAlgorithm::from_code(7).is_err());
        assert_eq!(ChecksumAlgorithm::Crc32.trailer_len(), 4);
    }
}
