use crate::protocol::binlog::events::BinlogEvent;
use crate::protocol::binlog::ChecksumAlgorithm;
use crate::protocol::mysql::constants::MAX_EOF_PACKET_LEN;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::CodecError;

use std::io::{self, Write};
use tokio::io::AsyncWrite;

/// One frame of the binlog network stream as seen by a replica.
#[derive(Debug, Clone, PartialEq)]
pub enum BinlogFrame {
    Event(BinlogEvent),
    Eof,
    Err { error_code: u16, message: Vec<u8> },
}

/// Push one event to a registered replica: a normal packet whose payload is
/// the OK status byte followed by the serialized event.
pub async fn write_event_packet<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    event: &BinlogEvent,
    alg: ChecksumAlgorithm,
) -> io::Result<()> {
    w.write_all(&[0x00])?;
    w.write_all(&event.encode(alg))?;
    w.end_packet().await
}

/// Interpret one packet payload from a binlog stream. The payload normally
/// opens with a status byte, but MariaDB's raw dialect ships the event
/// directly; a leading `0x00` is skipped, anything else parses as-is.
pub fn parse_frame(payload: &[u8], alg: ChecksumAlgorithm) -> Result<BinlogFrame, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::MalformedPacket("empty binlog frame".into()));
    }
    match payload[0] {
        0x00 => BinlogEvent::parse(&payload[1..], alg).map(BinlogFrame::Event),
        0xfe if payload.len() < MAX_EOF_PACKET_LEN => Ok(BinlogFrame::Eof),
        0xff => {
            if payload.len() < 3 {
                return Err(CodecError::MalformedPacket("truncated binlog ERR".into()));
            }
            let error_code = u16::from_le_bytes([payload[1], payload[2]]);
            Ok(BinlogFrame::Err {
                error_code,
                message: payload[3..].to_vec(),
            })
        }
        _ => BinlogEvent::parse(payload, alg).map(BinlogFrame::Event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::binlog::events::{EventData, HeartbeatEvent, RotateEvent};
    use crate::protocol::mysql::packet::packet_reader::PacketReader;
    use std::io::Cursor;

    fn rotate() -> BinlogEvent {
        BinlogEvent::new(
            0,
            1,
            4,
            EventData::Rotate(RotateEvent {
                position: 4,
                next_file: "binlog.000001".into(),
            }),
        )
    }

    #[tokio::test]
    async fn framed_event_round_trip() {
        let mut w = PacketWriter::new(Vec::new());
        w.set_seq(1);
        write_event_packet(&mut w, &rotate(), ChecksumAlgorithm::Crc32)
            .await
            .unwrap();

        let mut reader = PacketReader::new(Cursor::new(w.inner_writer));
        let (seq, pkt) = reader.next_read().unwrap().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(pkt[0], 0x00);
        match parse_frame(&pkt, ChecksumAlgorithm::Crc32).unwrap() {
            BinlogFrame::Event(ev) => assert_eq!(ev.data, rotate().data),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn raw_dialect_without_status_byte() {
        let event = BinlogEvent::new(
            0,
            1,
            0,
            EventData::Heartbeat(HeartbeatEvent {
                log_ident: "binlog.000001".into(),
            }),
        );
        // timestamp zero makes the first byte 0x00, which the reader skips;
        // pick the framed dialect for that case and the raw one otherwise
        let bytes = event.encode(ChecksumAlgorithm::Off);
        assert_eq!(bytes[0], 0x00);
        let mut framed = vec![0x00];
        framed.extend_from_slice(&bytes);
        match parse_frame(&framed, ChecksumAlgorithm::Off).unwrap() {
            BinlogFrame::Event(ev) => assert_eq!(ev.data, event.data),
            other => panic!("unexpected {other:?}"),
        }

        // a nonzero timestamp exercises the raw path
        let raw_event = BinlogEvent::new(
            1_700_000_000,
            1,
            0,
            EventData::Heartbeat(HeartbeatEvent {
                log_ident: "binlog.000001".into(),
            }),
        );
        let raw = raw_event.encode(ChecksumAlgorithm::Off);
        assert_ne!(raw[0], 0x00);
        match parse_frame(&raw, ChecksumAlgorithm::Off).unwrap() {
            BinlogFrame::Event(ev) => assert_eq!(ev.data, raw_event.data),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn err_frame() {
        let mut payload = vec![0xff];
        payload.extend(&1236u16.to_le_bytes());
        payload.extend(b"Could not find first log");
        match parse_frame(&payload, ChecksumAlgorithm::Off).unwrap() {
            BinlogFrame::Err {
                error_code,
                message,
            } => {
                assert_eq!(error_code, 1236);
                assert_eq!(message, b"Could not find first log");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn eof_frame() {
        assert_eq!(
            parse_frame(&[0xfe, 0, 0, 2, 0], ChecksumAlgorithm::Off).unwrap(),
            BinlogFrame::Eof
        );
    }
}
