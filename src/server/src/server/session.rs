use crate::acl::UserIdentity;
use crate::executor::{QueryContext, SessionStateChange};
use crate::protocol::mysql::basic::{from_packet, OkPacket};
use crate::protocol::mysql::constants::{DEFAULT_WAIT_TIMEOUT_SECS, SCRAMBLE_SIZE};
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::packet::packet_reader::PacketReader;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::packet::writers;
use crate::server::auth::authenticator::NativeAuthenticator;
use crate::server::auth::gen_user_salt;
use crate::server::default_capabilities;
use crate::server::gate_server::ServerContext;

use hashbrown::HashMap;
use mysql_common::constants::{CapabilityFlags, ColumnType, StatusFlags};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Connection lifecycle. Commands are only read in `CommandLoop`;
/// `Streaming` hands the write side to the replication producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initial,
    HandshakeSent,
    AuthInProgress,
    Authenticated,
    CommandLoop,
    Streaming,
    Terminated,
}

/// One prepared statement, alive between `STMT_PREPARE` and `STMT_CLOSE`
/// or session teardown.
pub struct PreparedStatement {
    pub id: u32,
    pub query: String,
    pub params: Vec<crate::protocol::mysql::basic::Column>,
    pub columns: Vec<crate::protocol::mysql::basic::Column>,
    /// Accumulated `SEND_LONG_DATA` chunks per parameter index.
    pub long_data: HashMap<u16, Vec<u8>>,
    /// Type vector of the last execute, reused when the bind flag is zero.
    pub bound_types: Vec<(ColumnType, u8)>,
}

pub struct Session<R, W> {
    pub(crate) reader: PacketReader<R>,
    pub(crate) writer: PacketWriter<W>,
    pub(crate) ctx: Arc<ServerContext>,
    pub(crate) state: SessionState,
    pub(crate) client_host: String,
    pub(crate) connection_id: u32,
    pub(crate) capabilities: CapabilityFlags,
    pub(crate) collation: u16,
    pub(crate) current_db: Option<String>,
    pub(crate) identity: Option<UserIdentity>,
    pub(crate) status: StatusFlags,
    pub(crate) salt: [u8; SCRAMBLE_SIZE],
    pub(crate) statements: HashMap<u32, PreparedStatement>,
    pub(crate) next_stmt_id: u32,
    pub(crate) wait_timeout: Duration,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(ctx: Arc<ServerContext>, reader: R, writer: W, client_host: String, connection_id: u32) -> Self {
        Session {
            reader: PacketReader::new(reader),
            writer: PacketWriter::new(writer),
            ctx,
            state: SessionState::Initial,
            client_host,
            connection_id,
            capabilities: default_capabilities(),
            collation: 0,
            current_db: None,
            identity: None,
            status: StatusFlags::SERVER_STATUS_AUTOCOMMIT,
            salt: gen_user_salt(),
            statements: HashMap::new(),
            next_stmt_id: 1,
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Collation negotiated in the handshake (or changed by
    /// `COM_CHANGE_USER`).
    pub fn collation(&self) -> u16 {
        self.collation
    }

    /// Run the connection to completion. I/O failures terminate silently,
    /// as the peer is gone; everything else already replied.
    pub async fn run(mut self) {
        if let Err(e) = self.run_inner().await {
            debug!(
                "GateSrv session {} from {} closed: {e}",
                self.connection_id, self.client_host
            );
        }
        self.state = SessionState::Terminated;
    }

    async fn run_inner(&mut self) -> io::Result<()> {
        let authenticator = NativeAuthenticator::new(Arc::clone(&self.ctx.acl));
        self.state = SessionState::HandshakeSent;
        let (seq, response) = authenticator
            .initial_handshake(self.connection_id, self.salt, &mut self.reader, &mut self.writer)
            .await?;
        self.state = SessionState::AuthInProgress;
        self.capabilities = default_capabilities() & response.client_flag;
        self.collation = response.collation;
        self.writer.set_seq(seq.wrapping_add(1));

        let username = response.username_str();
        match authenticator.verify(
            &username,
            &self.client_host,
            &self.salt,
            &response.auth_response,
            &response.auth_plugin,
        ) {
            Ok(identity) => {
                debug!("GateSrv session {} authenticated as {identity}", self.connection_id);
                self.identity = Some(identity);
                self.state = SessionState::Authenticated;
            }
            Err(e) => {
                warn!("GateSrv session {} auth failed: {e}", self.connection_id);
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_ACCESS_DENIED_ERROR,
                    e.to_string().as_bytes(),
                )
                .await?;
                self.writer.flush_all().await?;
                self.state = SessionState::Terminated;
                return Ok(());
            }
        }

        if let Some(db) = response.database_str() {
            if self.database_exists(&db) {
                self.current_db = Some(db);
            } else {
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_BAD_DB_ERROR,
                    format!("Unknown database '{db}'").as_bytes(),
                )
                .await?;
                self.writer.flush_all().await?;
                self.state = SessionState::Terminated;
                return Ok(());
            }
        }

        let ok = self.base_ok();
        writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await?;
        self.writer.flush_all().await?;
        self.state = SessionState::CommandLoop;
        self.command_loop().await
    }

    async fn command_loop(&mut self) -> io::Result<()> {
        while self.state == SessionState::CommandLoop {
            let next = tokio::time::timeout(self.wait_timeout, self.reader.next_async()).await;
            let pkt = match next {
                Ok(read) => read?,
                Err(_elapsed) => {
                    debug!(
                        "GateSrv session {} exceeded wait_timeout, closing",
                        self.connection_id
                    );
                    break;
                }
            };
            let Some((seq, packet)) = pkt else {
                // remote half closed between commands
                break;
            };
            self.writer.set_seq(seq.wrapping_add(1));

            let command = match from_packet(&packet) {
                Ok((_, command)) => command,
                Err(e) => {
                    warn!("GateSrv session {} malformed command: {e:?}", self.connection_id);
                    writers::write_err_packet(
                        &mut self.writer,
                        self.capabilities,
                        ErrorKind::ER_MALFORMED_PACKET,
                        b"Malformed communication packet",
                    )
                    .await?;
                    self.writer.flush_all().await?;
                    break;
                }
            };
            self.dispatch(command).await?;
            self.writer.flush_all().await?;
        }
        self.state = SessionState::Terminated;
        Ok(())
    }

    pub(crate) fn database_exists(&self, db: &str) -> bool {
        self.ctx.registry.contains(db) || self.ctx.provider.is_virtual_database(db)
    }

    pub(crate) fn query_context(&self) -> QueryContext {
        QueryContext {
            identity: self.identity.clone().unwrap_or_else(|| UserIdentity {
                user: String::new(),
                host: self.client_host.clone(),
            }),
            database: self.current_db.clone(),
            connection_id: self.connection_id,
        }
    }

    /// An OK packet carrying the session's current status flags.
    pub(crate) fn base_ok(&self) -> OkPacket {
        OkPacket {
            status_flags: self.status,
            ..OkPacket::default()
        }
    }

    /// Reset everything `COM_RESET_CONNECTION` and `COM_CHANGE_USER` drop:
    /// prepared statements, the selected database and the status flags.
    pub(crate) fn reset_session_state(&mut self) {
        self.statements.clear();
        self.current_db = None;
        self.status = StatusFlags::SERVER_STATUS_AUTOCOMMIT;
    }

    /// Apply executor-reported state changes and render the session-track
    /// block for the OK packet.
    pub(crate) fn apply_state_changes(
        &mut self,
        changes: &[SessionStateChange],
    ) -> io::Result<Vec<u8>> {
        use mysql_common::io::WriteMysqlExt;

        const SESSION_TRACK_SYSTEM_VARIABLES: u8 = 0x00;
        const SESSION_TRACK_SCHEMA: u8 = 0x01;

        let mut out = Vec::new();
        for change in changes {
            match change {
                SessionStateChange::Database(db) => {
                    self.current_db = Some(db.clone());
                    let mut data = Vec::new();
                    data.write_lenenc_str(db.as_bytes())?;
                    out.write_all(&[SESSION_TRACK_SCHEMA])?;
                    out.write_lenenc_int(data.len() as u64)?;
                    out.write_all(&data)?;
                }
                SessionStateChange::SystemVariable { name, value } => {
                    let mut data = Vec::new();
                    data.write_lenenc_str(name.as_bytes())?;
                    data.write_lenenc_str(value.as_bytes())?;
                    out.write_all(&[SESSION_TRACK_SYSTEM_VARIABLES])?;
                    out.write_lenenc_int(data.len() as u64)?;
                    out.write_all(&data)?;
                    if name == "wait_timeout" {
                        if let Ok(secs) = value.parse::<u64>() {
                            self.wait_timeout = Duration::from_secs(secs);
                        }
                    }
                }
                SessionStateChange::IsolationLevel(level) => {
                    let mut data = Vec::new();
                    data.write_lenenc_str(b"transaction_isolation")?;
                    data.write_lenenc_str(level.as_bytes())?;
                    out.write_all(&[SESSION_TRACK_SYSTEM_VARIABLES])?;
                    out.write_lenenc_int(data.len() as u64)?;
                    out.write_all(&data)?;
                }
            }
        }
        Ok(out)
    }
}
