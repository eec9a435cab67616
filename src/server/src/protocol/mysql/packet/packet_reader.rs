use crate::protocol::mysql::packet::{packet, Packet};

use std::io;
use std::io::prelude::*;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use winnow::error::ErrMode;
use winnow::Partial;

const PACKET_BUFFER_SIZE: usize = 4096;
const PACKET_LARGE_BUFFER_SIZE: usize = 1048576;

/// [`PacketReader`] reads bytes from a stream and reassembles them into MySQL
/// [`Packet`]s, joining continuation chunks of oversized payloads.
pub struct PacketReader<R> {
    bytes: Vec<u8>,
    start: usize,
    pub r: R,
}

impl<R> PacketReader<R> {
    pub fn new(r: R) -> Self {
        PacketReader {
            bytes: Vec::new(),
            start: 0,
            r,
        }
    }

    /// Try to parse one packet out of the buffered bytes. `Ok(None)` means
    /// more bytes are needed; a parse failure is a protocol violation.
    fn take_buffered(&mut self) -> io::Result<Option<(u8, Packet)>> {
        if self.start == self.bytes.len() {
            return Ok(None);
        }
        let unparsed = &self.bytes[self.start..];
        match packet(Partial::new(unparsed)) {
            Ok((rest, p)) => {
                self.start += unparsed.len() - rest.len();
                Ok(Some(p))
            }
            Err(ErrMode::Incomplete(_)) => Ok(None),
            Err(e) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{e:?}"),
            )),
        }
    }

    fn compact(&mut self) {
        self.bytes.drain(0..self.start);
        self.start = 0;
    }

    fn unparsed_len(&self) -> usize {
        self.bytes.len() - self.start
    }

    fn eof_result(&self) -> io::Result<Option<(u8, Packet)>> {
        if self.unparsed_len() == 0 {
            Ok(None)
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} unhandled bytes", self.unparsed_len()),
            ))
        }
    }
}

impl<R: Read> PacketReader<R> {
    pub fn next_read(&mut self) -> io::Result<Option<(u8, Packet)>> {
        loop {
            if let Some(p) = self.take_buffered()? {
                return Ok(Some(p));
            }

            self.compact();
            let end = self.bytes.len();
            self.bytes.resize(std::cmp::max(PACKET_BUFFER_SIZE, end * 2), 0);
            let read = {
                let buf = &mut self.bytes[end..];
                self.r.read(buf)?
            };
            self.bytes.truncate(end + read);
            if read == 0 {
                return self.eof_result();
            }
        }
    }
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    /// Collect the client's reply to a LOCAL INFILE request: raw file
    /// content packets, terminated by one with an empty payload.
    pub async fn read_local_infile_data(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            let Some((_seq, pkt)) = self.next_async().await? else {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside a LOCAL INFILE transfer",
                ));
            };
            if pkt.is_empty() {
                return Ok(data);
            }
            data.extend_from_slice(&pkt);
        }
    }

    pub async fn next_async(&mut self) -> io::Result<Option<(u8, Packet)>> {
        let mut buffer_size = PACKET_BUFFER_SIZE;
        loop {
            if let Some(p) = self.take_buffered()? {
                return Ok(Some(p));
            }

            self.compact();
            let end = self.bytes.len();
            if self.bytes.capacity() - end < buffer_size {
                self.bytes.reserve(buffer_size);
            }
            self.bytes.resize(end + buffer_size, 0);
            let read = {
                let buf = &mut self.bytes[end..];
                self.r.read(buf).await?
            };
            self.bytes.truncate(end + read);
            // use a larger buffer size to reduce resize churn on big rows.
            buffer_size = PACKET_LARGE_BUFFER_SIZE;
            if read == 0 {
                return self.eof_result();
            }
        }
    }
}
