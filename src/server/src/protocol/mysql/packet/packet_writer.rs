use crate::protocol::mysql::constants;

use byteorder::{ByteOrder, LittleEndian};
use std::io;
use std::io::prelude::*;
use std::io::IoSlice;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Buffers one reply payload and frames it on [`end_packet`], splitting at
/// the 16M-1 payload boundary and assigning sequence ids.
///
/// [`end_packet`]: PacketWriter::end_packet
pub struct PacketWriter<W> {
    buf: Vec<u8>,
    seq: u8,
    pub inner_writer: W,
}

impl<W> PacketWriter<W> {
    pub fn new(write: W) -> Self {
        Self {
            buf: Vec::new(),
            seq: 0,
            inner_writer: write,
        }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn set_seq(&mut self, seq: u8) {
        self.seq = seq;
    }

    fn increase_seq(&mut self) {
        self.seq = self.seq.wrapping_add(1);
    }

    pub fn reset_seq(&mut self) {
        self.seq = 0;
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }
}

impl<W> Write for PacketWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len();
        self.buf.extend_from_slice(buf);
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut header = [0; constants::PACKET_HEADER_LEN];
        LittleEndian::write_u24(&mut header, chunk.len() as u32);
        header[3] = self.seq();
        self.increase_seq();
        // write out the header and payload.
        //
        // depending on the AsyncWrite provided, this may trigger a real
        // system call or not (e.g. when the AsyncWrite is a buffered stream)
        let written = self
            .inner_writer
            .write_vectored(&[IoSlice::new(&header), IoSlice::new(chunk)])
            .await?;

        // if the write buffer is not drained, fall back to write_all
        if written != constants::PACKET_HEADER_LEN + chunk.len() {
            let remaining: Vec<u8> = header
                .iter()
                .chain(chunk.iter())
                .skip(written)
                .cloned()
                .collect();
            self.inner_writer.write_all(&remaining).await?;
        }
        Ok(())
    }

    pub async fn end_packet(&mut self) -> io::Result<()> {
        if !self.is_empty() {
            let raw_packet = self.take_buffer();
            // split the raw buffer at the boundary of size MAX_PAYLOAD_LEN
            for chunk in raw_packet.chunks(constants::MAX_PAYLOAD_LEN) {
                self.write_chunk(chunk).await?;
            }
            // an exactly full final chunk requires an empty terminator so the
            // peer knows the payload ended
            if raw_packet.len() % constants::MAX_PAYLOAD_LEN == 0 {
                self.write_chunk(&[]).await?;
            }
            Ok(())
        } else {
            // packet with an empty payload, e.g. the LOCAL INFILE terminator
            self.write_chunk(&[]).await
        }
    }

    pub async fn flush_all(&mut self) -> io::Result<()> {
        self.inner_writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::PacketWriter;
    use std::io::Write;

    #[tokio::test]
    async fn frames_one_packet() {
        let mut w = PacketWriter::new(Vec::new());
        w.set_seq(1);
        w.write_all(&[0x00, 0x01, 0x02]).unwrap();
        w.end_packet().await.unwrap();
        assert_eq!(w.inner_writer, vec![0x03, 0x00, 0x00, 0x01, 0x00, 0x01, 0x02]);
        assert_eq!(w.seq(), 2);
    }

    #[tokio::test]
    async fn empty_payload_still_frames() {
        let mut w = PacketWriter::new(Vec::new());
        w.end_packet().await.unwrap();
        assert_eq!(w.inner_writer, vec![0x00, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn sequence_ids_increase_per_packet() {
        let mut w = PacketWriter::new(Vec::new());
        w.write_all(&[0xaa]).unwrap();
        w.end_packet().await.unwrap();
        w.write_all(&[0xbb]).unwrap();
        w.end_packet().await.unwrap();
        assert_eq!(
            w.inner_writer,
            vec![0x01, 0x00, 0x00, 0x00, 0xaa, 0x01, 0x00, 0x00, 0x01, 0xbb]
        );
    }
}
