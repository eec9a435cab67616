use crate::protocol::binlog::events::{
    BinlogEvent, EventData, FormatDescriptionEvent, HeartbeatEvent, RotateEvent,
};
use crate::protocol::binlog::framer::write_event_packet;
use crate::protocol::binlog::ChecksumAlgorithm;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::packet::writers;
use crate::server::SERVER_VERSION;

use async_trait::async_trait;
use mysql_common::constants::{CapabilityFlags, StatusFlags};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Supplies binlog events to streaming sessions. `None` from `next_event`
/// means the stream is exhausted and the session should wind down.
#[async_trait]
pub trait BinlogEventSource: Send + Sync {
    fn current_file(&self) -> String;
    fn checksum_algorithm(&self) -> ChecksumAlgorithm;
    async fn next_event(&self) -> io::Result<Option<BinlogEvent>>;
}

/// A fixed queue of events; test and demo supply.
pub struct StaticBinlogSource {
    file: String,
    alg: ChecksumAlgorithm,
    events: Mutex<VecDeque<BinlogEvent>>,
}

impl StaticBinlogSource {
    pub fn new(
        file: impl Into<String>,
        alg: ChecksumAlgorithm,
        events: Vec<BinlogEvent>,
    ) -> Self {
        StaticBinlogSource {
            file: file.into(),
            alg,
            events: Mutex::new(events.into()),
        }
    }
}

#[async_trait]
impl BinlogEventSource for StaticBinlogSource {
    fn current_file(&self) -> String {
        self.file.clone()
    }

    fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.alg
    }

    async fn next_event(&self) -> io::Result<Option<BinlogEvent>> {
        Ok(self.events.lock().await.pop_front())
    }
}

/// Push the binlog stream to a registered replica: FORMAT_DESCRIPTION,
/// then a ROTATE announcing the current file, then the requested stream
/// with heartbeats on idle. A non-blocking dump reports EOF when the log
/// runs dry; a blocking one keeps the link alive with heartbeats. Any
/// write failure ends the session.
pub async fn stream_binlog<W>(
    writer: &mut PacketWriter<W>,
    source: &dyn BinlogEventSource,
    capabilities: CapabilityFlags,
    server_id: u32,
    requested_pos: u32,
    non_block: bool,
    heartbeat: Duration,
) -> io::Result<()>
where
    W: AsyncWrite + Send + Unpin,
{
    let alg = source.checksum_algorithm();
    let file = source.current_file();
    let now = chrono::Utc::now().timestamp() as u32;
    info!("GateSrv starting binlog stream of {file} at {requested_pos}");

    let fde = BinlogEvent::new(
        now,
        server_id,
        0,
        EventData::FormatDescription(FormatDescriptionEvent::new(SERVER_VERSION, alg)),
    );
    write_event_packet(writer, &fde, alg).await?;

    let rotate = BinlogEvent::new(
        now,
        server_id,
        0,
        EventData::Rotate(RotateEvent {
            position: requested_pos as u64,
            next_file: file.clone(),
        }),
    );
    write_event_packet(writer, &rotate, alg).await?;
    writer.flush_all().await?;

    loop {
        match tokio::time::timeout(heartbeat, source.next_event()).await {
            Ok(Ok(Some(event))) => {
                write_event_packet(writer, &event, alg).await?;
                writer.flush_all().await?;
            }
            Ok(Ok(None)) => {
                if !non_block {
                    // blocking dump: stay connected, keep the replica warm
                    let hb = BinlogEvent::new(
                        0,
                        server_id,
                        0,
                        EventData::Heartbeat(HeartbeatEvent {
                            log_ident: file.clone(),
                        }),
                    );
                    write_event_packet(writer, &hb, alg).await?;
                    writer.flush_all().await?;
                    tokio::time::sleep(heartbeat).await;
                    continue;
                }
                debug!("GateSrv binlog producer exhausted");
                writers::write_eof_packet(writer, capabilities, StatusFlags::empty()).await?;
                writer.flush_all().await?;
                return Ok(());
            }
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => {
                // heartbeats carry timestamp zero and the current file name
                let hb = BinlogEvent::new(
                    0,
                    server_id,
                    0,
                    EventData::Heartbeat(HeartbeatEvent {
                        log_ident: file.clone(),
                    }),
                );
                write_event_packet(writer, &hb, alg).await?;
                writer.flush_all().await?;
            }
        }
    }
}
