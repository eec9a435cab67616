pub mod packet_reader;
pub mod packet_writer;
pub mod writers;

use crate::protocol::mysql::constants;
use crate::protocol::mysql::constants::{HeaderInfo, MAX_EOF_PACKET_LEN};

use std::ops::Deref;
use winnow::binary::le_u24;
use winnow::binary::u8 as le_u8;
use winnow::error::{ErrMode, ErrorKind, InputError, ParserError};
use winnow::prelude::*;
use winnow::token::take;
use winnow::Partial;

pub type Stream<'a> = Partial<&'a [u8]>;

/// `Packet` represents the packet format of the MySql wire protocol.
/// The maximum size of a payload is 16M-1; larger payloads are split into
/// continuation packets until a chunk shorter than the maximum arrives.
/// [MySQL Packet](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_packets.html)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet(Vec<u8>);

impl Packet {
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Packet(vec)
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.0.extend(bytes);
    }

    /// See [MySQL EOF_Packet](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_eof_packet.html).
    /// A payload starting with `0xfe` is only an EOF packet while it stays
    /// under nine bytes; anything longer is a row.
    pub fn is_eof_packet(&self) -> bool {
        !self.0.is_empty()
            && self.0[0] == (HeaderInfo::EOFHeader as u8)
            && self.0.len() < MAX_EOF_PACKET_LEN
    }

    /// The OK packet that terminates a result set when CLIENT_DEPRECATE_EOF
    /// is in effect also carries the `0xfe` header.
    pub fn is_result_set_terminator(&self) -> bool {
        let pkt_len = self.0.len();
        !self.0.is_empty()
            && self.0[0] == (HeaderInfo::EOFHeader as u8)
            && (MAX_EOF_PACKET_LEN..0xFF_FFFF).contains(&pkt_len)
    }

    pub fn is_ok_packet(&self) -> bool {
        !self.0.is_empty() && self.0[0] == (HeaderInfo::OKHeader as u8)
    }

    pub fn is_err_packet(&self) -> bool {
        !self.0.is_empty() && self.0[0] == (HeaderInfo::ErrHeader as u8)
    }

    pub fn is_local_in_file_packet(&self) -> bool {
        !self.0.is_empty() && self.0[0] == (HeaderInfo::LocalInFileHeader as u8)
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Packet {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl Deref for Packet {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

#[inline]
pub fn one_packet(i: Stream<'_>) -> winnow::IResult<Stream<'_>, (u8, &[u8])> {
    let (i, length) = le_u24.parse_peek(i)?;
    let (i, seq) = le_u8.parse_peek(i)?;
    let (i, bytes) = take(length).parse_peek(i)?;
    Ok((i, (seq, bytes)))
}

/// Parse one logical packet, joining `0xffffff`-sized continuation chunks.
/// The returned sequence id is the id of the last chunk consumed.
pub fn packet(input: Stream<'_>) -> winnow::IResult<Stream<'_>, (u8, Packet)> {
    let (mut i, (mut seq, first)) = one_packet(input)?;
    let mut last_len = first.len();
    let mut pkt = Packet::from_vec(first.to_vec());
    while last_len == constants::MAX_PAYLOAD_LEN {
        let (rest, (next_seq, chunk)) = one_packet(i)?;
        if next_seq != seq.wrapping_add(1) {
            return Err(ErrMode::Cut(InputError::from_error_kind(
                &i,
                ErrorKind::Verify,
            )));
        }
        seq = next_seq;
        last_len = chunk.len();
        pkt.extend(chunk);
        i = rest;
    }
    Ok((i, (seq, pkt)))
}

#[cfg(test)]
mod tests {
    use crate::protocol::mysql::packet::*;

    fn parse(data: &[u8]) -> (usize, (u8, Packet)) {
        let (rest, p) = packet(Partial::new(data)).unwrap();
        (rest.len(), p)
    }

    #[test]
    fn test_one_ping() {
        let (rest, (seq, bytes)) = one_packet(Partial::new(&[0x01, 0, 0, 0, 0x10][..])).unwrap();
        assert_eq!(rest.len(), 0);
        assert_eq!(seq, 0);
        assert_eq!(bytes, &[0x10]);
    }

    #[test]
    fn test_ping() {
        let (rest, (seq, p)) = parse(&[0x01, 0, 0, 0, 0x10]);
        assert_eq!(rest, 0);
        assert_eq!(seq, 0);
        assert_eq!(&*p, &[0x10][..]);
    }

    #[test]
    fn test_incomplete_header() {
        let r = packet(Partial::new(&[0x01, 0, 0][..]));
        assert!(matches!(r, Err(ErrMode::Incomplete(_))));
    }

    #[test]
    fn test_incomplete_payload() {
        let r = packet(Partial::new(&[0x05, 0, 0, 0, 0x10][..]));
        assert!(matches!(r, Err(ErrMode::Incomplete(_))));
    }

    #[test]
    fn test_long_exact() {
        let mut data = vec![0xff, 0xff, 0xff, 0];
        data.extend(&[0u8; constants::MAX_PAYLOAD_LEN][..]);
        // an exactly full chunk must be followed by an empty terminator
        data.extend(&[0x00, 0x00, 0x00, 1]);

        let (rest, (seq, p)) = parse(&data);
        assert_eq!(rest, 0);
        assert_eq!(seq, 1);
        assert_eq!(p.len(), constants::MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_long_more() {
        let mut data = vec![0xff, 0xff, 0xff, 0];
        data.extend(&[0u8; constants::MAX_PAYLOAD_LEN][..]);
        data.extend(&[0x01, 0x00, 0x00, 1, 0x10]);

        let (rest, (seq, p)) = parse(&data);
        assert_eq!(rest, 0);
        assert_eq!(seq, 1);
        assert_eq!(p.len(), constants::MAX_PAYLOAD_LEN + 1);
        assert_eq!(
            &p[..constants::MAX_PAYLOAD_LEN],
            &[0u8; constants::MAX_PAYLOAD_LEN][..]
        );
        assert_eq!(&p[constants::MAX_PAYLOAD_LEN..], &[0x10]);
    }

    #[test]
    fn test_continuation_bad_seq() {
        let mut data = vec![0xff, 0xff, 0xff, 0];
        data.extend(&[0u8; constants::MAX_PAYLOAD_LEN][..]);
        data.extend(&[0x00, 0x00, 0x00, 7]);
        let r = packet(Partial::new(&data[..]));
        assert!(matches!(r, Err(ErrMode::Cut(_))));
    }

    #[test]
    fn test_eof_detection() {
        assert!(Packet::from_vec(vec![0xfe, 0, 0, 2, 0]).is_eof_packet());
        // nine-byte payload starting with 0xfe is a row, not EOF
        assert!(!Packet::from_vec(vec![0xfe, 1, 2, 3, 4, 5, 6, 7, 8]).is_eof_packet());
        assert!(!Packet::from_vec(vec![0x00]).is_eof_packet());
    }
}
