use crate::protocol::binlog::{
    ChecksumAlgorithm, EventHeader, EventType, CHECKSUM_ALG_DESC_LEN, EVENT_HEADER_LEN,
};
use crate::protocol::mysql::CodecError;

/// Number of event types the post-header-length table covers.
const POST_HEADER_TABLE_LEN: usize = EventType::PreviousGtids as usize;

/// Width of the NUL padded server-version field in a FORMAT_DESCRIPTION body.
const SERVER_VERSION_FIELD_LEN: usize = 50;

/// First event of every stream; announces the binlog format, the
/// post-header-length table and the checksum algorithm in force for all
/// subsequent events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptionEvent {
    pub binlog_version: u16,
    pub server_version: String,
    pub create_timestamp: u32,
    pub common_header_len: u8,
    pub post_header_lens: Vec<u8>,
    pub checksum_alg: ChecksumAlgorithm,
}

impl FormatDescriptionEvent {
    pub fn new(server_version: &str, checksum_alg: ChecksumAlgorithm) -> Self {
        // post-header lengths for the event types we may emit; zero for the
        // rest, which is what a server that never writes them reports
        let mut post_header_lens = vec![0u8; POST_HEADER_TABLE_LEN];
        post_header_lens[EventType::Rotate as usize - 1] = 8;
        post_header_lens[EventType::FormatDescription as usize - 1] =
            (2 + SERVER_VERSION_FIELD_LEN + 4 + 1 + POST_HEADER_TABLE_LEN) as u8;
        FormatDescriptionEvent {
            binlog_version: 4,
            server_version: server_version.to_string(),
            create_timestamp: 0,
            common_header_len: EVENT_HEADER_LEN as u8,
            post_header_lens,
            checksum_alg,
        }
    }

    pub fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.binlog_version.to_le_bytes());
        let mut version = [0u8; SERVER_VERSION_FIELD_LEN];
        let bytes = self.server_version.as_bytes();
        let n = bytes.len().min(SERVER_VERSION_FIELD_LEN);
        version[..n].copy_from_slice(&bytes[..n]);
        out.extend_from_slice(&version);
        out.extend_from_slice(&self.create_timestamp.to_le_bytes());
        out.push(self.common_header_len);
        out.extend_from_slice(&self.post_header_lens);
        out.push(self.checksum_alg.code());
    }

    pub fn parse_body(body: &[u8]) -> Result<Self, CodecError> {
        let fixed = 2 + SERVER_VERSION_FIELD_LEN + 4 + 1;
        if body.len() < fixed + CHECKSUM_ALG_DESC_LEN {
            return Err(CodecError::MalformedPacket(
                "format description body too short".into(),
            ));
        }
        let binlog_version = u16::from_le_bytes([body[0], body[1]]);
        let version_field = &body[2..2 + SERVER_VERSION_FIELD_LEN];
        let version_end = version_field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(SERVER_VERSION_FIELD_LEN);
        let server_version = String::from_utf8_lossy(&version_field[..version_end]).to_string();
        let ts_at = 2 + SERVER_VERSION_FIELD_LEN;
        let create_timestamp = u32::from_le_bytes([
            body[ts_at],
            body[ts_at + 1],
            body[ts_at + 2],
            body[ts_at + 3],
        ]);
        let common_header_len = body[fixed - 1];
        let alg_at = body.len() - CHECKSUM_ALG_DESC_LEN;
        let post_header_lens = body[fixed..alg_at].to_vec();
        let checksum_alg = ChecksumAlgorithm::from_code(body[alg_at])?;
        Ok(FormatDescriptionEvent {
            binlog_version,
            server_version,
            create_timestamp,
            common_header_len,
            post_header_lens,
            checksum_alg,
        })
    }
}

/// Announces the binlog file the following events belong to. Also sent as a
/// synthetic first event when replication starts mid-file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotateEvent {
    pub position: u64,
    pub next_file: String,
}

impl RotateEvent {
    pub fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.position.to_le_bytes());
        out.extend_from_slice(self.next_file.as_bytes());
    }

    pub fn parse_body(body: &[u8]) -> Result<Self, CodecError> {
        if body.len() < 8 {
            return Err(CodecError::MalformedPacket("rotate body too short".into()));
        }
        let position = u64::from_le_bytes(body[..8].try_into().unwrap());
        let next_file = String::from_utf8_lossy(&body[8..]).to_string();
        Ok(RotateEvent {
            position,
            next_file,
        })
    }
}

/// Sent when no real event is available within the negotiated period so the
/// replica knows the link is alive. Carries timestamp zero by convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEvent {
    pub log_ident: String,
}

impl HeartbeatEvent {
    pub fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.log_ident.as_bytes());
    }

    pub fn parse_body(body: &[u8]) -> Result<Self, CodecError> {
        Ok(HeartbeatEvent {
            log_ident: String::from_utf8_lossy(body).to_string(),
        })
    }
}

/// Event bodies are pairwise disjoint records; types this server never
/// interprets pass through as `Raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    FormatDescription(FormatDescriptionEvent),
    Rotate(RotateEvent),
    Heartbeat(HeartbeatEvent),
    Raw { event_type: u8, body: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogEvent {
    pub header: EventHeader,
    pub data: EventData,
}

impl BinlogEvent {
    pub fn new(timestamp: u32, server_id: u32, next_pos: u32, data: EventData) -> Self {
        let event_type = match &data {
            EventData::FormatDescription(_) => EventType::FormatDescription as u8,
            EventData::Rotate(_) => EventType::Rotate as u8,
            EventData::Heartbeat(_) => EventType::Heartbeat as u8,
            EventData::Raw { event_type, .. } => *event_type,
        };
        BinlogEvent {
            header: EventHeader {
                timestamp,
                event_type,
                server_id,
                event_length: 0, // fixed up on encode
                next_pos,
                flags: 0,
            },
            data,
        }
    }

    fn body_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match &self.data {
            EventData::FormatDescription(e) => e.encode_body(&mut body),
            EventData::Rotate(e) => e.encode_body(&mut body),
            EventData::Heartbeat(e) => e.encode_body(&mut body),
            EventData::Raw { body: raw, .. } => body.extend_from_slice(raw),
        }
        body
    }

    /// Serialize header, body and, when the algorithm asks for it, the CRC32
    /// trailer computed over everything before it.
    pub fn encode(&self, alg: ChecksumAlgorithm) -> Vec<u8> {
        let body = self.body_bytes();
        let event_length = (EVENT_HEADER_LEN + body.len() + alg.trailer_len()) as u32;
        let mut header = self.header.clone();
        header.event_length = event_length;

        let mut out = Vec::with_capacity(event_length as usize);
        header.encode(&mut out);
        out.extend_from_slice(&body);
        if alg == ChecksumAlgorithm::Crc32 {
            let crc = crc32fast::hash(&out);
            out.extend_from_slice(&crc.to_le_bytes());
        }
        out
    }

    /// Decode one event. The CRC32 trailer, when present, is verified and
    /// stripped. The FORMAT_DESCRIPTION event decides its own checksum
    /// presence from the algorithm byte inside its body.
    pub fn parse(bytes: &[u8], alg: ChecksumAlgorithm) -> Result<BinlogEvent, CodecError> {
        let (body_and_trailer, header) = EventHeader::parse(bytes)
            .map_err(|_| CodecError::MalformedPacket("truncated event header".into()))?;
        if (header.event_length as usize) != bytes.len() {
            return Err(CodecError::MalformedPacket(format!(
                "event length {} disagrees with frame of {} bytes",
                header.event_length,
                bytes.len()
            )));
        }

        let event_alg = if header.kind() == EventType::FormatDescription {
            // peek the trailing algorithm byte; the CRC follows it if active
            probe_fde_checksum(body_and_trailer)?
        } else {
            alg
        };

        let body_len = body_and_trailer
            .len()
            .checked_sub(event_alg.trailer_len())
            .ok_or_else(|| CodecError::MalformedPacket("event shorter than its trailer".into()))?;
        let (body, trailer) = body_and_trailer.split_at(body_len);
        if event_alg == ChecksumAlgorithm::Crc32 {
            let expected = u32::from_le_bytes(trailer.try_into().unwrap());
            let actual = crc32fast::hash(&bytes[..EVENT_HEADER_LEN + body_len]);
            if expected != actual {
                return Err(CodecError::MalformedPacket(format!(
                    "event checksum mismatch: {expected:#x} != {actual:#x}"
                )));
            }
        }

        let data = decode_body(header.kind(), header.event_type, body)?;
        Ok(BinlogEvent { header, data })
    }
}

/// Decide whether an incoming FORMAT_DESCRIPTION body carries a CRC by
/// reading the algorithm byte at its fixed offset from the end.
fn probe_fde_checksum(body_and_trailer: &[u8]) -> Result<ChecksumAlgorithm, CodecError> {
    // try "alg byte + CRC" first, fall back to a bare trailing alg byte
    if body_and_trailer.len() > CHECKSUM_ALG_DESC_LEN + 4 {
        let alg_at = body_and_trailer.len() - 4 - CHECKSUM_ALG_DESC_LEN;
        if let Ok(alg @ ChecksumAlgorithm::Crc32) =
            ChecksumAlgorithm::from_code(body_and_trailer[alg_at])
        {
            return Ok(alg);
        }
    }
    if body_and_trailer.is_empty() {
        return Err(CodecError::MalformedPacket(
            "empty format description body".into(),
        ));
    }
    ChecksumAlgorithm::from_code(body_and_trailer[body_and_trailer.len() - 1])
}

/// The per-type decoder registry: a plain switch over the event-type byte.
fn decode_body(kind: EventType, raw_type: u8, body: &[u8]) -> Result<EventData, CodecError> {
    Ok(match kind {
        EventType::FormatDescription => {
            // parse_body expects the algorithm byte as part of the body
            EventData::FormatDescription(FormatDescriptionEvent::parse_body(body)?)
        }
        EventType::Rotate => EventData::Rotate(RotateEvent::parse_body(body)?),
        EventType::Heartbeat => EventData::Heartbeat(HeartbeatEvent::parse_body(body)?),
        _ => EventData::Raw {
            event_type: raw_type,
            body: body.to_vec(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_round_trip() {
        let event = BinlogEvent::new(
            1_700_000_000,
            1,
            4,
            EventData::Rotate(RotateEvent {
                position: 4,
                next_file: "binlog.000002".into(),
            }),
        );
        for alg in [ChecksumAlgorithm::Off, ChecksumAlgorithm::Crc32] {
            let bytes = event.encode(alg);
            let parsed = BinlogEvent::parse(&bytes, alg).unwrap();
            assert_eq!(parsed.data, event.data);
            assert_eq!(parsed.header.event_length as usize, bytes.len());
        }
    }

    #[test]
    fn format_description_round_trip() {
        let fde = FormatDescriptionEvent::new("8.0.35-my-gate", ChecksumAlgorithm::Crc32);
        let event = BinlogEvent::new(0, 1, 0, EventData::FormatDescription(fde.clone()));
        let bytes = event.encode(ChecksumAlgorithm::Crc32);
        // the reader does not need to be told: the body says CRC32
        let parsed = BinlogEvent::parse(&bytes, ChecksumAlgorithm::Off).unwrap();
        match parsed.data {
            EventData::FormatDescription(got) => {
                assert_eq!(got.binlog_version, 4);
                assert_eq!(got.server_version, "8.0.35-my-gate");
                assert_eq!(got.checksum_alg, ChecksumAlgorithm::Crc32);
                assert_eq!(got.post_header_lens, fde.post_header_lens);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let event = BinlogEvent::new(
            0,
            1,
            0,
            EventData::Heartbeat(HeartbeatEvent {
                log_ident: "binlog.000001".into(),
            }),
        );
        let mut bytes = event.encode(ChecksumAlgorithm::Crc32);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(BinlogEvent::parse(&bytes, ChecksumAlgorithm::Crc32).is_err());
    }

    #[test]
    fn unknown_types_pass_through_raw() {
        let event = BinlogEvent::new(
            7,
            1,
            120,
            EventData::Raw {
                event_type: EventType::Xid as u8,
                body: vec![1, 2, 3, 4, 5, 6, 7, 8],
            },
        );
        let bytes = event.encode(ChecksumAlgorithm::Off);
        let parsed = BinlogEvent::parse(&bytes, ChecksumAlgorithm::Off).unwrap();
        assert_eq!(parsed.data, event.data);
    }

    #[test]
    fn length_mismatch_is_malformed() {
        let event = BinlogEvent::new(0, 1, 0, EventData::Raw { event_type: 16, body: vec![0; 8] });
        let mut bytes = event.encode(ChecksumAlgorithm::Off);
        bytes.pop();
        assert!(BinlogEvent::parse(&bytes, ChecksumAlgorithm::Off).is_err());
    }
}
