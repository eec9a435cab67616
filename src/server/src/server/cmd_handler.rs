use crate::datasource::{ColumnInfo, KeyKind, Value};
use crate::executor::{ExecOutcome, ExecutorError, QueryOutput, ResultSet};
use crate::protocol::binlog::BinlogDumpFlags;
use crate::protocol::mysql::basic::{change_user_request, Column, Command, OkPacket, RegisterSlave};
use crate::protocol::mysql::binary::{decode_execute_params, BinValue, MyDateTime, MyTime};
use crate::protocol::mysql::charset::{BINARY, DEFAULT_COLLATION_ID};
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::packet::writers;
use crate::protocol::mysql::CodecError;
use crate::server::replication::stream_binlog;
use crate::server::session::{PreparedStatement, Session, SessionState};
use crate::vtable::parse_declared_type;

use mysql_common::constants::{CapabilityFlags, ColumnFlags, ColumnType, StatusFlags};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

const BINLOG_HEARTBEAT: Duration = Duration::from_secs(30);

/// Map a declared SQL type base to its wire type.
pub fn column_type_for(base: &str) -> ColumnType {
    use ColumnType::*;
    match base {
        "tinyint" | "bool" | "boolean" => MYSQL_TYPE_TINY,
        "smallint" => MYSQL_TYPE_SHORT,
        "mediumint" => MYSQL_TYPE_INT24,
        "int" | "integer" => MYSQL_TYPE_LONG,
        "bigint" => MYSQL_TYPE_LONGLONG,
        "float" => MYSQL_TYPE_FLOAT,
        "double" | "real" => MYSQL_TYPE_DOUBLE,
        "decimal" | "numeric" => MYSQL_TYPE_NEWDECIMAL,
        "date" => MYSQL_TYPE_DATE,
        "datetime" => MYSQL_TYPE_DATETIME,
        "timestamp" => MYSQL_TYPE_TIMESTAMP,
        "time" => MYSQL_TYPE_TIME,
        "year" => MYSQL_TYPE_YEAR,
        "char" => MYSQL_TYPE_STRING,
        "varchar" => MYSQL_TYPE_VAR_STRING,
        "tinytext" | "text" | "mediumtext" | "longtext" => MYSQL_TYPE_BLOB,
        "tinyblob" | "blob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            MYSQL_TYPE_BLOB
        }
        "json" => MYSQL_TYPE_JSON,
        "enum" | "set" => MYSQL_TYPE_STRING,
        "bit" => MYSQL_TYPE_BIT,
        _ => MYSQL_TYPE_VAR_STRING,
    }
}

/// Build the wire column definition for one data-source column.
pub fn wire_column(schema: &str, table: &str, info: &ColumnInfo) -> Column {
    let (base, declared_len) = parse_declared_type(&info.column_type);
    let column_type = column_type_for(&base);
    let mut flags = ColumnFlags::empty();
    if !info.nullable {
        flags |= ColumnFlags::NOT_NULL_FLAG;
    }
    match info.key {
        KeyKind::Primary => flags |= ColumnFlags::PRI_KEY_FLAG,
        KeyKind::Unique => flags |= ColumnFlags::UNIQUE_KEY_FLAG,
        KeyKind::None => {}
    }
    let numeric = matches!(
        column_type,
        ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_FLOAT
            | ColumnType::MYSQL_TYPE_DOUBLE
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
    );
    Column {
        schema: schema.to_string(),
        table: table.to_string(),
        org_table: table.to_string(),
        column: info.name.clone(),
        org_column: info.name.clone(),
        collation: if numeric { BINARY as u16 } else { DEFAULT_COLLATION_ID as u16 },
        column_length: declared_len.map(|l| l as u32 * 4).unwrap_or(1024),
        column_type,
        column_flags: flags,
        decimals: 0,
    }
}

/// Convert an executor cell to its binary-protocol value for the declared
/// column type.
pub fn bin_value_for(value: &Value, column: &Column) -> Result<BinValue, CodecError> {
    use ColumnType::*;
    let out = match value {
        Value::Null => BinValue::Null,
        Value::Int(i) => match column.column_type {
            MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR | MYSQL_TYPE_INT24
            | MYSQL_TYPE_LONG | MYSQL_TYPE_LONGLONG => BinValue::Int(*i),
            MYSQL_TYPE_FLOAT => BinValue::Float(*i as f32),
            MYSQL_TYPE_DOUBLE => BinValue::Double(*i as f64),
            _ => BinValue::Bytes(i.to_string().into_bytes()),
        },
        Value::Float(f) => match column.column_type {
            MYSQL_TYPE_FLOAT => BinValue::Float(*f as f32),
            MYSQL_TYPE_DOUBLE => BinValue::Double(*f),
            _ => BinValue::Bytes(f.to_string().into_bytes()),
        },
        Value::Text(s) => match column.column_type {
            MYSQL_TYPE_DATE | MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP => {
                let parsed = MyDateTime::parse_str(s)
                    .ok_or(CodecError::ValueOutOfRange("datetime text"))?;
                BinValue::DateTime(parsed)
            }
            MYSQL_TYPE_TIME => {
                let parsed =
                    MyTime::parse_str(s).ok_or(CodecError::ValueOutOfRange("time text"))?;
                BinValue::Time(parsed)
            }
            MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR | MYSQL_TYPE_INT24
            | MYSQL_TYPE_LONG | MYSQL_TYPE_LONGLONG => BinValue::Int(
                s.parse()
                    .map_err(|_| CodecError::ValueOutOfRange("integer text"))?,
            ),
            MYSQL_TYPE_FLOAT => BinValue::Float(
                s.parse()
                    .map_err(|_| CodecError::ValueOutOfRange("float text"))?,
            ),
            MYSQL_TYPE_DOUBLE => BinValue::Double(
                s.parse()
                    .map_err(|_| CodecError::ValueOutOfRange("double text"))?,
            ),
            _ => BinValue::Bytes(s.clone().into_bytes()),
        },
    };
    Ok(out)
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    /// Route one command. Replies are written but not flushed; the command
    /// loop flushes after each dispatch.
    pub(crate) async fn dispatch(&mut self, command: Command<'_>) -> io::Result<()> {
        match command {
            Command::Quit => {
                self.state = SessionState::Terminated;
                Ok(())
            }
            Command::Ping => {
                let ok = self.base_ok();
                writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
            }
            Command::Init(db) => self.on_init_db(&String::from_utf8_lossy(db)).await,
            Command::Query(sql) => self.on_query(&String::from_utf8_lossy(sql)).await,
            Command::ListFields { table, .. } => {
                self.on_field_list(&String::from_utf8_lossy(table)).await
            }
            Command::Prepare(sql) => self.on_prepare(&String::from_utf8_lossy(sql)).await,
            Command::Execute {
                stmt,
                cursor_flags: _,
                iterations: _,
                params,
            } => self.on_execute(stmt, params).await,
            Command::SendLongData { stmt, param, data } => {
                // no reply, even for an unknown statement
                if let Some(entry) = self.statements.get_mut(&stmt) {
                    entry.long_data.entry(param).or_default().extend_from_slice(data);
                }
                Ok(())
            }
            Command::Close(stmt) => {
                self.statements.remove(&stmt);
                Ok(())
            }
            Command::Reset(stmt) => self.on_stmt_reset(stmt).await,
            Command::SetOption(option) => {
                // 0 enables multi-statements, 1 disables
                if option == 0 {
                    self.capabilities |= CapabilityFlags::CLIENT_MULTI_STATEMENTS;
                } else {
                    self.capabilities -= CapabilityFlags::CLIENT_MULTI_STATEMENTS;
                }
                writers::write_eof_packet(&mut self.writer, self.capabilities, self.status).await
            }
            Command::ChangeUser(payload) => self.on_change_user(payload).await,
            Command::ResetConnection => {
                self.reset_session_state();
                let ok = self.base_ok();
                writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
            }
            Command::Statistics => {
                let stats = format!(
                    "Uptime: 0  Threads: 1  Questions: 0  Open tables: 0  Version: {}",
                    crate::server::SERVER_VERSION
                );
                writers::write_statistics(&mut self.writer, &stats).await
            }
            Command::ProcessKill(connection_id) => match self.ctx.executor.kill(connection_id).await
            {
                Ok(()) => {
                    let ok = self.base_ok();
                    writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
                }
                Err(e) => self.write_executor_err(&e).await,
            },
            Command::RegisterSlave(register) => self.on_register_slave(register).await,
            Command::BinlogDump {
                pos,
                flags,
                server_id,
                filename,
            } => self.on_binlog_dump(pos, flags, server_id, filename).await,
            Command::Unknown(code) => {
                debug!("GateSrv unknown command {code:#04x}");
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_UNKNOWN_COM_ERROR,
                    format!("Unknown command {code:#04x}").as_bytes(),
                )
                .await
            }
        }
    }

    async fn on_init_db(&mut self, db: &str) -> io::Result<()> {
        let db = db.trim().trim_matches('`');
        if !self.database_exists(db) {
            return writers::write_err_packet(
                &mut self.writer,
                self.capabilities,
                ErrorKind::ER_BAD_DB_ERROR,
                format!("Unknown database '{db}'").as_bytes(),
            )
            .await;
        }
        let info = self.apply_state_changes(&[crate::executor::SessionStateChange::Database(
            db.to_string(),
        )])?;
        let mut ok = self.base_ok();
        ok.status_flags |= StatusFlags::SERVER_SESSION_STATE_CHANGED;
        ok.session_state_info = info;
        writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
    }

    async fn on_query(&mut self, sql: &str) -> io::Result<()> {
        let ctx = self.query_context();
        match self.ctx.executor.query(&ctx, sql).await {
            Ok(outcomes) => self.write_outcomes(outcomes, false).await,
            Err(e) => self.write_executor_err(&e).await,
        }
    }

    async fn on_field_list(&mut self, table: &str) -> io::Result<()> {
        let db = self.current_db.clone().unwrap_or_default();
        let columns: Option<Vec<Column>> = if self.ctx.provider.is_virtual_database(&db) {
            self.ctx.provider.get_table(&db, table).map(|vt| {
                vt.schema()
                    .iter()
                    .map(|c| wire_column(&db, table, c))
                    .collect()
            })
        } else if let Some(source) = self.ctx.registry.get(&db) {
            match source.get_table_info(table).await {
                Ok(info) => Some(
                    info.columns
                        .iter()
                        .map(|c| wire_column(&db, table, c))
                        .collect(),
                ),
                Err(e) => {
                    // surface the back-end's own code (1146, 2006, ...)
                    return writers::write_err_packet_raw(
                        &mut self.writer,
                        self.capabilities,
                        e.vendor_code(),
                        b"HY000",
                        e.to_string().as_bytes(),
                    )
                    .await;
                }
            }
        } else {
            None
        };

        match columns {
            Some(columns) => {
                // COM_FIELD_LIST always closes with EOF, DEPRECATE_EOF or not
                let caps = self.capabilities - CapabilityFlags::CLIENT_DEPRECATE_EOF;
                writers::write_column_definitions_41(columns.iter(), &mut self.writer, caps, true)
                    .await
            }
            None => {
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_NO_SUCH_TABLE,
                    format!("Table '{db}.{table}' doesn't exist").as_bytes(),
                )
                .await
            }
        }
    }

    async fn on_prepare(&mut self, sql: &str) -> io::Result<()> {
        let ctx = self.query_context();
        match self.ctx.executor.prepare(&ctx, sql).await {
            Ok(info) => {
                let id = self.next_stmt_id;
                self.next_stmt_id = self.next_stmt_id.wrapping_add(1);
                writers::write_prepare_ok(
                    id,
                    &info.params,
                    &info.columns,
                    &mut self.writer,
                    self.capabilities,
                )
                .await?;
                self.statements.insert(
                    id,
                    PreparedStatement {
                        id,
                        query: sql.to_string(),
                        params: info.params,
                        columns: info.columns,
                        long_data: hashbrown::HashMap::new(),
                        bound_types: Vec::new(),
                    },
                );
                Ok(())
            }
            Err(e) => self.write_executor_err(&e).await,
        }
    }

    async fn on_execute(&mut self, stmt_id: u32, params: &[u8]) -> io::Result<()> {
        let Some(stmt) = self.statements.get(&stmt_id) else {
            return writers::write_err_packet(
                &mut self.writer,
                self.capabilities,
                ErrorKind::ER_UNKNOWN_STMT_HANDLER,
                format!("Unknown prepared statement handler ({stmt_id})").as_bytes(),
            )
            .await;
        };
        let param_count = stmt.params.len();
        let decoded = match decode_execute_params(params, param_count, &stmt.bound_types) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("GateSrv execute decode failed: {e}");
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_MALFORMED_PACKET,
                    b"Malformed communication packet",
                )
                .await?;
                self.state = SessionState::Terminated;
                return Ok(());
            }
        };

        let query = stmt.query.clone();
        let mut values = decoded.values;
        if let Some(stmt) = self.statements.get_mut(&stmt_id) {
            stmt.bound_types = decoded.types;
            for (param, buf) in stmt.long_data.drain() {
                if let Some(slot) = values.get_mut(param as usize) {
                    *slot = BinValue::Bytes(buf);
                }
            }
        }

        let ctx = self.query_context();
        match self.ctx.executor.execute_prepared(&ctx, &query, &values).await {
            Ok(outcomes) => self.write_outcomes(outcomes, true).await,
            Err(e) => self.write_executor_err(&e).await,
        }
    }

    async fn on_stmt_reset(&mut self, stmt_id: u32) -> io::Result<()> {
        match self.statements.get_mut(&stmt_id) {
            Some(stmt) => {
                stmt.long_data.clear();
                let ok = self.base_ok();
                writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
            }
            None => {
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_UNKNOWN_STMT_HANDLER,
                    format!("Unknown prepared statement handler ({stmt_id})").as_bytes(),
                )
                .await
            }
        }
    }

    async fn on_change_user(&mut self, payload: &[u8]) -> io::Result<()> {
        let request = match change_user_request(payload, self.capabilities) {
            Ok((_, request)) => request,
            Err(_) => {
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_MALFORMED_PACKET,
                    b"Malformed communication packet",
                )
                .await?;
                self.state = SessionState::Terminated;
                return Ok(());
            }
        };
        let username = String::from_utf8_lossy(&request.username).to_string();
        match self.ctx.acl.authenticate(
            &username,
            &self.client_host,
            &self.salt,
            &request.auth_response,
        ) {
            Ok(identity) => {
                self.reset_session_state();
                self.identity = Some(identity);
                if request.collation != 0 {
                    self.collation = request.collation;
                }
                if let Some(db) = &request.database {
                    let db = String::from_utf8_lossy(db).to_string();
                    if self.database_exists(&db) {
                        self.current_db = Some(db);
                    }
                }
                let ok = self.base_ok();
                writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
            }
            Err(e) => {
                writers::write_err_packet(
                    &mut self.writer,
                    self.capabilities,
                    ErrorKind::ER_ACCESS_DENIED_ERROR,
                    e.to_string().as_bytes(),
                )
                .await?;
                self.state = SessionState::Terminated;
                Ok(())
            }
        }
    }

    async fn on_register_slave(&mut self, register: RegisterSlave) -> io::Result<()> {
        debug!(
            "GateSrv session {} registered replica server_id={}",
            self.connection_id, register.server_id
        );
        let ok = self.base_ok();
        writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
    }

    async fn on_binlog_dump(
        &mut self,
        pos: u32,
        flags: u16,
        server_id: u32,
        filename: &[u8],
    ) -> io::Result<()> {
        let Some(source) = self.ctx.binlog.as_deref() else {
            return writers::write_err_packet(
                &mut self.writer,
                self.capabilities,
                ErrorKind::ER_NOT_SUPPORTED_YET,
                b"this server is not configured as a replication source",
            )
            .await;
        };
        debug!(
            "GateSrv session {} entering binlog stream for {:?} (server_id {server_id})",
            self.connection_id,
            String::from_utf8_lossy(filename)
        );
        self.state = SessionState::Streaming;
        let non_block = BinlogDumpFlags::from_bits_truncate(flags)
            .contains(BinlogDumpFlags::NON_BLOCK);
        let result = stream_binlog(
            &mut self.writer,
            source,
            self.capabilities,
            server_id,
            pos,
            non_block,
            BINLOG_HEARTBEAT,
        )
        .await;
        self.state = SessionState::Terminated;
        result
    }

    async fn write_executor_err(&mut self, e: &ExecutorError) -> io::Result<()> {
        writers::write_err_packet_raw(
            &mut self.writer,
            self.capabilities,
            e.code,
            &e.sqlstate,
            e.message.as_bytes(),
        )
        .await
    }

    /// Emit a batch of outcomes; all but the last carry
    /// SERVER_MORE_RESULTS_EXISTS.
    async fn write_outcomes(&mut self, outcomes: Vec<ExecOutcome>, binary: bool) -> io::Result<()> {
        let last = outcomes.len().saturating_sub(1);
        for (i, outcome) in outcomes.into_iter().enumerate() {
            self.write_outcome(outcome, i < last, binary).await?;
        }
        Ok(())
    }

    async fn write_outcome(
        &mut self,
        outcome: ExecOutcome,
        more_results: bool,
        binary: bool,
    ) -> io::Result<()> {
        if let Some(in_transaction) = outcome.in_transaction {
            if in_transaction {
                self.status |= StatusFlags::SERVER_STATUS_IN_TRANS;
            } else {
                self.status -= StatusFlags::SERVER_STATUS_IN_TRANS;
            }
        }
        let session_state_info = self.apply_state_changes(&outcome.state_changes)?;

        let mut status = self.status;
        if more_results {
            status |= StatusFlags::SERVER_MORE_RESULTS_EXISTS;
        }
        if !session_state_info.is_empty() {
            status |= StatusFlags::SERVER_SESSION_STATE_CHANGED;
        }

        match outcome.output {
            QueryOutput::Ok {
                affected_rows,
                last_insert_id,
                info,
            } => {
                let ok = OkPacket {
                    header: 0x00,
                    affected_rows,
                    last_insert_id,
                    status_flags: status,
                    warnings: 0,
                    info,
                    session_state_info,
                };
                writers::write_ok_packet(&mut self.writer, self.capabilities, ok).await
            }
            QueryOutput::ResultSet(rs) => self.write_resultset(rs, status, binary).await,
        }
    }

    async fn write_resultset(
        &mut self,
        rs: ResultSet,
        status: StatusFlags,
        binary: bool,
    ) -> io::Result<()> {
        writers::write_column_definitions(rs.columns.iter(), &mut self.writer, self.capabilities)
            .await?;
        for row in &rs.rows {
            if binary {
                let mut values = Vec::with_capacity(row.len());
                for (value, column) in row.iter().zip(rs.columns.iter()) {
                    values.push(bin_value_for(value, column)?);
                }
                writers::write_binary_row(&mut self.writer, &rs.columns, &values).await?;
            } else {
                let fields: Vec<Option<Vec<u8>>> = row
                    .iter()
                    .map(|v| v.to_text().map(String::into_bytes))
                    .collect();
                writers::write_text_row(&mut self.writer, &fields).await?;
            }
        }
        writers::write_resultset_terminator(&mut self.writer, self.capabilities, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_types_map_to_wire_types() {
        assert_eq!(column_type_for("int"), ColumnType::MYSQL_TYPE_LONG);
        assert_eq!(column_type_for("varchar"), ColumnType::MYSQL_TYPE_VAR_STRING);
        assert_eq!(column_type_for("bigint"), ColumnType::MYSQL_TYPE_LONGLONG);
        assert_eq!(column_type_for("mystery"), ColumnType::MYSQL_TYPE_VAR_STRING);
    }

    #[test]
    fn wire_column_carries_key_flags() {
        let info = ColumnInfo::new("id", "INT(11)").primary_key();
        let col = wire_column("mydb", "users", &info);
        assert_eq!(col.column_type, ColumnType::MYSQL_TYPE_LONG);
        assert!(col.column_flags.contains(ColumnFlags::PRI_KEY_FLAG));
        assert!(col.column_flags.contains(ColumnFlags::NOT_NULL_FLAG));
        assert_eq!(col.schema, "mydb");
    }

    #[test]
    fn bin_values_follow_the_column_type() {
        let int_col = Column::new("n", ColumnType::MYSQL_TYPE_LONG);
        assert_eq!(
            bin_value_for(&Value::Int(5), &int_col).unwrap(),
            BinValue::Int(5)
        );
        let text_col = Column::new("s", ColumnType::MYSQL_TYPE_VAR_STRING);
        assert_eq!(
            bin_value_for(&Value::Int(5), &text_col).unwrap(),
            BinValue::Bytes(b"5".to_vec())
        );
        let dt_col = Column::new("d", ColumnType::MYSQL_TYPE_DATETIME);
        assert!(matches!(
            bin_value_for(&Value::Text("2024-05-06 07:08:09".into()), &dt_col).unwrap(),
            BinValue::DateTime(_)
        ));
        assert!(bin_value_for(&Value::Text("nonsense".into()), &dt_col).is_err());
        assert_eq!(
            bin_value_for(&Value::Null, &int_col).unwrap(),
            BinValue::Null
        );
    }
}
