use crate::protocol::mysql::constants::CommandCode as ComInfo;
use crate::protocol::mysql::constants::PROGRESS_REPORT_SENTINEL;

use hashbrown::HashMap;
use mysql_common::constants::{CapabilityFlags, StatusFlags};
use num_traits::FromPrimitive;
use winnow::binary::u8 as le_u8;
use winnow::binary::{le_u16, le_u24, le_u32};
use winnow::error::{ErrMode, ErrorKind, InputError, ParserError};
use winnow::combinator::rest;
use winnow::prelude::*;
use winnow::token::{literal, take, take_until};

/// Metadata for one resultset column or prepared-statement parameter,
/// carried by column-definition packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Schema the column's table lives in.
    pub schema: String,
    /// This column's associated table.
    ///
    /// Note: this is *technically* the table's alias.
    pub table: String,
    pub org_table: String,
    /// This column's name.
    ///
    /// Note: this is *technically* the column's alias.
    pub column: String,
    pub org_column: String,
    pub collation: u16,
    pub column_length: u32,
    pub column_type: mysql_common::constants::ColumnType,
    /// Of particular interest are `ColumnFlags::UNSIGNED_FLAG` and
    /// `ColumnFlags::NOT_NULL_FLAG`.
    pub column_flags: mysql_common::constants::ColumnFlags,
    pub decimals: u8,
}

impl Column {
    pub fn new(column: impl Into<String>, column_type: mysql_common::constants::ColumnType) -> Self {
        Column {
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            column: column.into(),
            org_column: String::new(),
            collation: crate::protocol::mysql::charset::DEFAULT_COLLATION_ID as u16,
            column_length: 1024,
            column_type,
            column_flags: mysql_common::constants::ColumnFlags::empty(),
            decimals: 0,
        }
    }
}

/// One client command, dispatched on the command byte. Response packets do
/// not appear here; the server knows what it wrote.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Query(&'a [u8]),
    ListFields {
        table: &'a [u8],
        wildcard: &'a [u8],
    },
    Init(&'a [u8]),
    Prepare(&'a [u8]),
    Execute {
        stmt: u32,
        cursor_flags: u8,
        iterations: u32,
        params: &'a [u8],
    },
    SendLongData {
        stmt: u32,
        param: u16,
        data: &'a [u8],
    },
    Close(u32),
    Reset(u32),
    SetOption(u16),
    ChangeUser(&'a [u8]),
    Statistics,
    ProcessKill(u32),
    ResetConnection,
    RegisterSlave(RegisterSlave),
    BinlogDump {
        pos: u32,
        flags: u16,
        server_id: u32,
        filename: &'a [u8],
    },
    Ping,
    Quit,
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterSlave {
    pub server_id: u32,
    pub hostname: Vec<u8>,
    pub user: Vec<u8>,
    pub password: Vec<u8>,
    pub port: u16,
    pub replication_rank: u32,
    pub master_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OkPacket {
    pub header: u8,
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: StatusFlags,
    pub warnings: u16,
    pub info: String,
    pub session_state_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: Option<[u8; 5]>,
    pub message: Vec<u8>,
}

/// MariaDB progress report; shares the `0xff` header with ERR and is told
/// apart by the `0xffff` error-code sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub stage: u8,
    pub max_stage: u8,
    pub progress: u32,
    pub info: Vec<u8>,
}

/// `HandshakeResponse` represents the client's reply to the initial
/// handshake packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HandshakeResponse {
    pub client_flag: CapabilityFlags,
    pub max_packet_len: u32,
    pub collation: u16,
    pub username: Option<Vec<u8>>,
    pub auth_response: Vec<u8>,
    pub auth_plugin: Vec<u8>,
    pub database: Option<Vec<u8>>,
    pub connect_attributes: Option<HashMap<String, String>>,
    pub zstd_level: Option<u8>,
}

impl HandshakeResponse {
    pub fn username_str(&self) -> String {
        match &self.username {
            Some(username) => String::from_utf8_lossy(username).to_string(),
            None => String::new(),
        }
    }

    pub fn database_str(&self) -> Option<String> {
        self.database
            .as_ref()
            .map(|db| String::from_utf8_lossy(db).to_string())
    }
}

fn malformed<'a>(i: &&'a [u8]) -> ErrMode<InputError<&'a [u8]>> {
    ErrMode::Cut(InputError::from_error_kind(i, ErrorKind::Verify))
}

/// Decode a length-encoded unsigned integer in a count context, where the
/// `0xfb` marker is forbidden. Any of the four encodings is accepted.
pub fn read_length_encoded_number(i: &[u8]) -> winnow::IResult<&[u8], u64> {
    let (i, b) = le_u8.parse_peek(i)?;
    let r_size: usize = match b {
        0xfb => return Err(malformed(&i)),
        0xfc => 2,
        0xfd => 3,
        0xfe => 8,
        _ => return Ok((i, b as u64)),
    };
    let mut bytes = [0u8; 8];
    let (i, b) = take(r_size).parse_peek(i)?;
    bytes[..r_size].copy_from_slice(b);
    Ok((i, u64::from_le_bytes(bytes)))
}

/// Decode a length-encoded integer in a row context, where `0xfb` encodes
/// SQL NULL.
pub fn read_length_encoded_number_or_null(i: &[u8]) -> winnow::IResult<&[u8], Option<u64>> {
    let (rest, b) = le_u8.parse_peek(i)?;
    if b == 0xfb {
        return Ok((rest, None));
    }
    let (i, n) = read_length_encoded_number(i)?;
    Ok((i, Some(n)))
}

pub fn read_length_encoded_string(i: &[u8]) -> winnow::IResult<&[u8], &[u8]> {
    let (input, len) = read_length_encoded_number(i)?;
    take(len).parse_peek(input)
}

/// A row field: a length-encoded string or the `0xfb` NULL marker.
pub fn read_row_field(i: &[u8]) -> winnow::IResult<&[u8], Option<&[u8]>> {
    let (rest, b) = le_u8.parse_peek(i)?;
    if b == 0xfb {
        return Ok((rest, None));
    }
    let (i, s) = read_length_encoded_string(i)?;
    Ok((i, Some(s)))
}

fn null_terminated(i: &[u8]) -> winnow::IResult<&[u8], &[u8]> {
    let (i, s) = take_until(0.., "\0").parse_peek(i)?;
    let (i, _) = literal(b"\0").parse_peek(i)?;
    Ok((i, s))
}

fn u8_length_prefixed(i: &[u8]) -> winnow::IResult<&[u8], &[u8]> {
    let (i, len) = le_u8.parse_peek(i)?;
    take(len).parse_peek(i)
}

pub fn ok_packet(i: &[u8], capabilities: CapabilityFlags) -> winnow::IResult<&[u8], OkPacket> {
    let (i, header) = le_u8.parse_peek(i)?;
    let (i, affected_rows) = read_length_encoded_number(i)?;
    let (i, last_insert_id) = read_length_encoded_number(i)?;
    let (mut i, status_flags, warnings) =
        if capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
            let (i, status) = le_u16.parse_peek(i)?;
            let (i, warnings) = le_u16.parse_peek(i)?;
            (i, StatusFlags::from_bits_truncate(status), warnings)
        } else if capabilities.contains(CapabilityFlags::CLIENT_TRANSACTIONS) {
            let (i, status) = le_u16.parse_peek(i)?;
            (i, StatusFlags::from_bits_truncate(status), 0)
        } else {
            (i, StatusFlags::empty(), 0)
        };

    let mut info = String::new();
    let mut session_state_info = Vec::new();
    if capabilities.contains(CapabilityFlags::CLIENT_SESSION_TRACK) {
        if !i.is_empty() {
            let (rest, info_bytes) = read_length_encoded_string(i)?;
            info = String::from_utf8_lossy(info_bytes).to_string();
            i = rest;
            if status_flags.contains(StatusFlags::SERVER_SESSION_STATE_CHANGED) {
                let (rest, state) = read_length_encoded_string(i)?;
                session_state_info = state.to_vec();
                i = rest;
            }
        }
    } else {
        let (rest, info_bytes) = rest.parse_peek(i)?;
        info = String::from_utf8_lossy(info_bytes).to_string();
        i = rest;
    }

    Ok((
        i,
        OkPacket {
            header,
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
            session_state_info,
        },
    ))
}

pub fn err_packet(i: &[u8], capabilities: CapabilityFlags) -> winnow::IResult<&[u8], ErrPacket> {
    let (i, _header) = literal([0xff]).parse_peek(i)?;
    let (i, error_code) = le_u16.parse_peek(i)?;
    let (i, sql_state) = if capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41)
        && error_code != PROGRESS_REPORT_SENTINEL
    {
        let (i, _) = literal(b"#").parse_peek(i)?;
        let (i, state) = take(5usize).parse_peek(i)?;
        let mut out = [0u8; 5];
        out.copy_from_slice(state);
        (i, Some(out))
    } else {
        (i, None)
    };
    let (i, message) = rest.parse_peek(i)?;
    Ok((
        i,
        ErrPacket {
            error_code,
            sql_state,
            message: message.to_vec(),
        },
    ))
}

pub fn progress_report(i: &[u8]) -> winnow::IResult<&[u8], ProgressReport> {
    let (i, _header) = literal([0xff]).parse_peek(i)?;
    let (i, _sentinel) = literal(PROGRESS_REPORT_SENTINEL.to_le_bytes()).parse_peek(i)?;
    let (i, stage) = le_u8.parse_peek(i)?;
    let (i, max_stage) = le_u8.parse_peek(i)?;
    let (i, progress) = le_u24.parse_peek(i)?;
    let (i, info) = null_terminated(i)?;
    Ok((
        i,
        ProgressReport {
            stage,
            max_stage,
            progress,
            info: info.to_vec(),
        },
    ))
}

pub fn client_handshake_response(i: &[u8]) -> winnow::IResult<&[u8], HandshakeResponse> {
    let (i, capability_flags) = le_u16.parse_peek(i)?;
    let mut capabilities = CapabilityFlags::from_bits_truncate(capability_flags as u32);
    if capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        // HandshakeResponse41
        let (i, cap2) = le_u16.parse_peek(i)?;
        let cap = (cap2 as u32) << 16 | capability_flags as u32;
        capabilities = CapabilityFlags::from_bits_truncate(cap);

        let (i, max_packet_len) = le_u32.parse_peek(i)?;
        let (i, collation) = le_u8.parse_peek(i)?;
        let (i, _) = take(23usize).parse_peek(i)?;

        let (i, username) = null_terminated(i)?;

        let (i, auth_response) =
            if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
                read_length_encoded_string(i)?
            } else if capabilities.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
                u8_length_prefixed(i)?
            } else {
                null_terminated(i)?
            };

        let (i, db) =
            if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB) && !i.is_empty() {
                let (i, db) = null_terminated(i)?;
                (i, Some(db))
            } else {
                (i, None)
            };

        let (i, auth_plugin) =
            if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) && !i.is_empty() {
                null_terminated(i)?
            } else {
                (i, &b""[..])
            };

        let (i, connect_attributes) =
            if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_ATTRS) && !i.is_empty() {
                let (i, data_len) = read_length_encoded_number(i)?;
                let (i, data) = take(data_len).parse_peek(i)?;
                let mut input = data;
                let mut connect_attributes = HashMap::new();
                while !input.is_empty() {
                    let (remaining, k) = read_length_encoded_string(input)?;
                    let (remaining, v) = read_length_encoded_string(remaining)?;
                    connect_attributes.insert(
                        String::from_utf8_lossy(k).to_string(),
                        String::from_utf8_lossy(v).to_string(),
                    );
                    input = remaining;
                }
                (i, Some(connect_attributes))
            } else {
                (i, None)
            };

        let (i, zstd_level) = if capabilities
            .contains(CapabilityFlags::CLIENT_ZSTD_COMPRESSION_ALGORITHM)
            && !i.is_empty()
        {
            let (i, level) = le_u8.parse_peek(i)?;
            (i, Some(level))
        } else {
            (i, None)
        };

        Ok((
            i,
            HandshakeResponse {
                client_flag: capabilities,
                max_packet_len,
                collation: u16::from(collation),
                username: Some(username.to_owned()),
                auth_response: auth_response.to_vec(),
                auth_plugin: auth_plugin.to_vec(),
                database: db.map(|c| c.to_vec()),
                connect_attributes,
                zstd_level,
            },
        ))
    } else {
        // HandshakeResponse320
        let (i, max_packet_len_v1) = le_u16.parse_peek(i)?;
        let (i, max_packet_len_v2) = le_u8.parse_peek(i)?;
        let max_packet_len = (max_packet_len_v2 as u32) << 16 | max_packet_len_v1 as u32;
        let (i, username) = null_terminated(i)?;

        let (i, auth_response, db) =
            if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB) {
                let (i, auth_response) = null_terminated(i)?;
                let (i, db) = null_terminated(i)?;
                (i, auth_response, Some(db))
            } else {
                (&b""[..], i, None)
            };

        Ok((
            i,
            HandshakeResponse {
                client_flag: capabilities,
                max_packet_len,
                collation: 0,
                username: Some(username.to_vec()),
                auth_response: auth_response.to_vec(),
                auth_plugin: vec![],
                database: db.map(|c| c.to_vec()),
                connect_attributes: None,
                zstd_level: None,
            },
        ))
    }
}

/// `COM_CHANGE_USER` payload, past the command byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeUserRequest {
    pub username: Vec<u8>,
    pub auth_response: Vec<u8>,
    pub database: Option<Vec<u8>>,
    pub collation: u16,
    pub auth_plugin: Vec<u8>,
}

pub fn change_user_request(
    i: &[u8],
    capabilities: CapabilityFlags,
) -> winnow::IResult<&[u8], ChangeUserRequest> {
    let (i, username) = null_terminated(i)?;
    let (i, auth_response) = if capabilities.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
        u8_length_prefixed(i)?
    } else {
        null_terminated(i)?
    };
    let (i, database) = null_terminated(i)?;
    let (i, collation) = if i.is_empty() {
        (i, 0)
    } else {
        le_u16.parse_peek(i)?
    };
    let (i, auth_plugin) =
        if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) && !i.is_empty() {
            null_terminated(i)?
        } else {
            (i, &b""[..])
        };
    Ok((
        i,
        ChangeUserRequest {
            username: username.to_vec(),
            auth_response: auth_response.to_vec(),
            database: if database.is_empty() {
                None
            } else {
                Some(database.to_vec())
            },
            collation,
            auth_plugin: auth_plugin.to_vec(),
        },
    ))
}

fn execute(i: &[u8]) -> winnow::IResult<&[u8], Command<'_>> {
    let (i, stmt) = le_u32.parse_peek(i)?;
    let (i, cursor_flags) = le_u8.parse_peek(i)?;
    let (i, iterations) = le_u32.parse_peek(i)?;
    let (i, params) = rest.parse_peek(i)?;
    Ok((
        i,
        Command::Execute {
            stmt,
            cursor_flags,
            iterations,
            params,
        },
    ))
}

fn send_long_data(i: &[u8]) -> winnow::IResult<&[u8], Command<'_>> {
    let (i, stmt) = le_u32.parse_peek(i)?;
    let (i, param) = le_u16.parse_peek(i)?;
    let (i, data) = rest.parse_peek(i)?;
    Ok((i, Command::SendLongData { stmt, param, data }))
}

fn register_slave(i: &[u8]) -> winnow::IResult<&[u8], Command<'_>> {
    let (i, server_id) = le_u32.parse_peek(i)?;
    let (i, hostname) = u8_length_prefixed(i)?;
    let (i, user) = u8_length_prefixed(i)?;
    let (i, password) = u8_length_prefixed(i)?;
    let (i, port) = le_u16.parse_peek(i)?;
    let (i, replication_rank) = le_u32.parse_peek(i)?;
    let (i, master_id) = le_u32.parse_peek(i)?;
    Ok((
        i,
        Command::RegisterSlave(RegisterSlave {
            server_id,
            hostname: hostname.to_vec(),
            user: user.to_vec(),
            password: password.to_vec(),
            port,
            replication_rank,
            master_id,
        }),
    ))
}

fn binlog_dump(i: &[u8]) -> winnow::IResult<&[u8], Command<'_>> {
    let (i, pos) = le_u32.parse_peek(i)?;
    let (i, flags) = le_u16.parse_peek(i)?;
    let (i, server_id) = le_u32.parse_peek(i)?;
    let (i, filename) = rest.parse_peek(i)?;
    Ok((
        i,
        Command::BinlogDump {
            pos,
            flags,
            server_id,
            filename,
        },
    ))
}

fn list_fields(i: &[u8]) -> winnow::IResult<&[u8], Command<'_>> {
    let (i, table) = null_terminated(i)?;
    let (i, wildcard) = rest.parse_peek(i)?;
    Ok((i, Command::ListFields { table, wildcard }))
}

/// Decode a command packet. Framing happens first; dispatch is a plain
/// switch on the command byte. Unknown codes parse to `Command::Unknown`
/// so the session can answer with ERR 1047 instead of dropping the link.
pub fn from_packet(pkt: &[u8]) -> winnow::IResult<&[u8], Command<'_>> {
    let (i, code) = le_u8.parse_peek(pkt)?;
    let com = match ComInfo::from_u8(code) {
        Some(c) => c,
        None => return Ok((&b""[..], Command::Unknown(code))),
    };
    match com {
        ComInfo::ComQuery => rest.parse_peek(i).map(|(i, q)| (i, Command::Query(q))),
        ComInfo::ComFieldList => list_fields(i),
        ComInfo::ComInitDB => rest.parse_peek(i).map(|(i, db)| (i, Command::Init(db))),
        ComInfo::ComStmtPrepare => rest.parse_peek(i).map(|(i, q)| (i, Command::Prepare(q))),
        ComInfo::ComStmtExecute => execute(i),
        ComInfo::ComStmtSendLongData => send_long_data(i),
        ComInfo::ComStmtClose => le_u32.parse_peek(i).map(|(i, s)| (i, Command::Close(s))),
        ComInfo::ComStmtReset => le_u32.parse_peek(i).map(|(i, s)| (i, Command::Reset(s))),
        ComInfo::ComSetOption => le_u16
            .parse_peek(i)
            .map(|(i, o)| (i, Command::SetOption(o))),
        ComInfo::ComChangeUser => rest
            .parse_peek(i)
            .map(|(i, p)| (i, Command::ChangeUser(p))),
        ComInfo::ComStatistics => Ok((i, Command::Statistics)),
        ComInfo::ComProcessKill => le_u32
            .parse_peek(i)
            .map(|(i, id)| (i, Command::ProcessKill(id))),
        ComInfo::ComResetConnection => Ok((i, Command::ResetConnection)),
        ComInfo::ComRegisterSlave => register_slave(i),
        ComInfo::ComBinlogDump => binlog_dump(i),
        ComInfo::ComPing => Ok((i, Command::Ping)),
        ComInfo::ComQuit => Ok((i, Command::Quit)),
        _ => Ok((&b""[..], Command::Unknown(code))),
    }
}
