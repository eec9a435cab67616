use crate::protocol::mysql::basic::{Column, OkPacket};
use crate::protocol::mysql::binary::{build_null_bitmap, encode_binary_value, BinValue};
use crate::protocol::mysql::constants::AuthPluginName::AuthNativePassword;
use crate::protocol::mysql::constants::{
    AUTH_PLUGIN_DATA_PART_1_LENGTH, PROGRESS_REPORT_SENTINEL, SCRAMBLE_SIZE,
};
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;

use byteorder::{LittleEndian, WriteBytesExt};
use mysql_common::constants::{CapabilityFlags, StatusFlags};
use mysql_common::io::WriteMysqlExt;
use std::io::{self, Write};
use tokio::io::AsyncWrite;

pub async fn write_err_packet<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    err: ErrorKind,
    msg: &[u8],
) -> io::Result<()> {
    w.write_u8(0xff)?;
    w.write_u16::<LittleEndian>(err as u16)?;
    if client_capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        w.write_u8(b'#')?;
        w.write_all(err.sqlstate())?;
    }
    w.write_all(msg)?;
    w.end_packet().await
}

/// ERR packet with an arbitrary vendor code and SQL-state, for errors that
/// originate outside the front-end (executor, data sources).
pub async fn write_err_packet_raw<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    code: u16,
    sqlstate: &[u8; 5],
    msg: &[u8],
) -> io::Result<()> {
    w.write_u8(0xff)?;
    w.write_u16::<LittleEndian>(code)?;
    if client_capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        w.write_u8(b'#')?;
        w.write_all(sqlstate)?;
    }
    w.write_all(msg)?;
    w.end_packet().await
}

pub async fn write_eof_packet<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    s: StatusFlags,
) -> io::Result<()> {
    w.write_u8(0xfe)?;
    if client_capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        w.write_all(&[0x00, 0x00])?; // no warnings
        w.write_u16::<LittleEndian>(s.bits())?;
    }
    w.end_packet().await
}

pub async fn write_ok_packet<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    ok_packet: OkPacket,
) -> io::Result<()> {
    w.write_u8(ok_packet.header)?;
    w.write_lenenc_int(ok_packet.affected_rows)?;
    w.write_lenenc_int(ok_packet.last_insert_id)?;
    if client_capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        w.write_u16::<LittleEndian>(ok_packet.status_flags.bits())?;
        w.write_u16::<LittleEndian>(ok_packet.warnings)?;
    } else if client_capabilities.contains(CapabilityFlags::CLIENT_TRANSACTIONS) {
        w.write_u16::<LittleEndian>(ok_packet.status_flags.bits())?;
    }

    if client_capabilities.contains(CapabilityFlags::CLIENT_SESSION_TRACK) {
        w.write_lenenc_str(ok_packet.info.as_bytes())?;
        if ok_packet
            .status_flags
            .contains(StatusFlags::SERVER_SESSION_STATE_CHANGED)
        {
            w.write_lenenc_str(&ok_packet.session_state_info)?;
        }
    } else {
        w.write_all(ok_packet.info.as_bytes())?;
    }
    w.end_packet().await
}

/// Terminate a resultset: an OK packet with the `0xfe` header when the
/// client negotiated CLIENT_DEPRECATE_EOF, a plain EOF otherwise.
pub async fn write_resultset_terminator<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    status_flags: StatusFlags,
) -> io::Result<()> {
    if client_capabilities.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF) {
        let ok = OkPacket {
            header: 0xfe,
            status_flags,
            ..OkPacket::default()
        };
        write_ok_packet(w, client_capabilities, ok).await
    } else {
        write_eof_packet(w, client_capabilities, status_flags).await
    }
}

/// Write the v10 initial handshake. The 20 byte scramble goes out in two
/// sections (8 + 12), each NUL terminated.
pub async fn write_initial_handshake<W: AsyncWrite + Unpin>(
    writer: &mut PacketWriter<W>,
    conn_id: u32,
    scramble: [u8; SCRAMBLE_SIZE],
    server_version: &[u8],
    server_capabilities: CapabilityFlags,
    status_flags: StatusFlags,
    collation: u8,
) -> io::Result<()> {
    writer.write_all(&[10])?; // protocol 10

    writer.write_all(server_version)?;
    writer.write_all(&[0x00])?;
    writer.write_u32::<LittleEndian>(conn_id)?;

    let server_capabilities_vec = server_capabilities.bits().to_le_bytes();

    writer.write_all(&scramble[0..AUTH_PLUGIN_DATA_PART_1_LENGTH])?; // auth-plugin-data-part-1
    writer.write_all(&[0x00])?;

    writer.write_all(&server_capabilities_vec[..2])?; // lower capability half
    writer.write_all(&collation.to_le_bytes())?;
    writer.write_all(&status_flags.bits().to_le_bytes())?;
    writer.write_all(&server_capabilities_vec[2..4])?; // upper capability half

    writer.write_all(&((scramble.len() + 1) as u8).to_le_bytes())?; // auth-plugin-data length

    writer.write_all(&[0x00; 6][..])?; // reserved
    writer.write_all(&[0x00; 4][..])?; // MariaDB extended capabilities (none)

    // auth-plugin-data-part-2: max(12, len - 9) bytes plus terminator
    writer.write_all(&scramble[AUTH_PLUGIN_DATA_PART_1_LENGTH..])?;
    writer.write_all(&[0x00])?;

    writer.write_all(AuthNativePassword.as_ref().as_bytes())?;
    writer.write_all(&[0x00])?;
    writer.end_packet().await?;
    writer.flush_all().await
}

/// Write the column-count packet followed by the column definitions of a
/// text or binary resultset.
pub async fn write_column_definitions<'a, I, W>(
    i: I,
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
) -> io::Result<()>
where
    I: IntoIterator<Item = &'a Column>,
    <I as IntoIterator>::IntoIter: ExactSizeIterator,
    W: AsyncWrite + Send + Unpin,
{
    let i = i.into_iter();
    w.write_lenenc_int(i.len() as u64)?;
    w.end_packet().await?;
    write_column_definitions_41(i, w, client_capabilities, false).await
}

// works when Protocol::ColumnDefinition41 is set
// see: https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_text_resultset_column_definition.html
pub async fn write_column_definitions_41<'a, I, W>(
    i: I,
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
    is_com_field_list: bool,
) -> io::Result<()>
where
    I: IntoIterator<Item = &'a Column>,
    W: AsyncWrite + Send + Unpin,
{
    for c in i {
        w.write_lenenc_str(b"def")?;
        w.write_lenenc_str(c.schema.as_bytes())?;
        w.write_lenenc_str(c.table.as_bytes())?;
        w.write_lenenc_str(c.org_table.as_bytes())?;
        w.write_lenenc_str(c.column.as_bytes())?;
        w.write_lenenc_str(c.org_column.as_bytes())?;
        w.write_lenenc_int(0xC)?;
        w.write_u16::<LittleEndian>(c.collation)?;
        w.write_u32::<LittleEndian>(c.column_length)?;
        w.write_u8(c.column_type as u8)?;
        w.write_u16::<LittleEndian>(c.column_flags.bits())?;
        w.write_u8(c.decimals)?;
        w.write_all(&[0x00, 0x00])?; // unused
        if is_com_field_list {
            w.write_all(&[0xfb])?; // NULL default value
        }
        w.end_packet().await?;
    }

    if !client_capabilities.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF) {
        write_eof_packet(w, client_capabilities, StatusFlags::empty()).await
    } else {
        Ok(())
    }
}

/// One text-protocol row: each field a lenenc string, NULL as `0xfb`.
pub async fn write_text_row<W, V>(w: &mut PacketWriter<W>, fields: &[Option<V>]) -> io::Result<()>
where
    W: AsyncWrite + Send + Unpin,
    V: AsRef<[u8]>,
{
    for field in fields {
        match field {
            Some(v) => {
                w.write_lenenc_str(v.as_ref())?;
            }
            None => {
                w.write_all(&[0xfb])?;
            }
        }
    }
    w.end_packet().await
}

/// One binary-protocol row: `0x00` header, null bitmap at bit offset two,
/// then each non-null value in its column's wire encoding.
pub async fn write_binary_row<W>(
    w: &mut PacketWriter<W>,
    columns: &[Column],
    values: &[BinValue],
) -> io::Result<()>
where
    W: AsyncWrite + Send + Unpin,
{
    debug_assert_eq!(columns.len(), values.len());
    let nulls: Vec<bool> = values.iter().map(|v| *v == BinValue::Null).collect();
    w.write_u8(0x00)?;
    w.write_all(&build_null_bitmap(&nulls, 2))?;
    let mut encoded = Vec::new();
    for (c, v) in columns.iter().zip(values) {
        if *v == BinValue::Null {
            continue;
        }
        encode_binary_value(&mut encoded, c.column_type, v)?;
    }
    w.write_all(&encoded)?;
    w.end_packet().await
}

/// Complete reply to a successful `COM_STMT_PREPARE`.
pub async fn write_prepare_ok<'a, PI, CI, W>(
    id: u32,
    params: PI,
    columns: CI,
    w: &mut PacketWriter<W>,
    client_capabilities: CapabilityFlags,
) -> io::Result<()>
where
    PI: IntoIterator<Item = &'a Column>,
    CI: IntoIterator<Item = &'a Column>,
    <PI as IntoIterator>::IntoIter: ExactSizeIterator,
    <CI as IntoIterator>::IntoIter: ExactSizeIterator,
    W: AsyncWrite + Send + Unpin,
{
    let pi = params.into_iter();
    let ci = columns.into_iter();

    // first, write out COM_STMT_PREPARE_OK
    w.write_u8(0x00)?;
    w.write_u32::<LittleEndian>(id)?;
    w.write_u16::<LittleEndian>(ci.len() as u16)?;
    w.write_u16::<LittleEndian>(pi.len() as u16)?;
    w.write_u8(0x00)?; // reserved
    w.write_u16::<LittleEndian>(0)?; // number of warnings
    w.end_packet().await?;

    if pi.len() > 0 {
        write_column_definitions_41(pi, w, client_capabilities, false).await?;
    }
    if ci.len() > 0 {
        write_column_definitions_41(ci, w, client_capabilities, false).await?;
    }
    Ok(())
}

/// Ask the client to stream a local file; it answers with raw content
/// packets terminated by an empty one.
pub async fn write_local_infile_request<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    filename: &[u8],
) -> io::Result<()> {
    w.write_u8(0xfb)?;
    w.write_all(filename)?;
    w.end_packet().await
}

/// MariaDB progress report; the `0xffff` error code marks it as such.
pub async fn write_progress_report<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    stage: u8,
    max_stage: u8,
    progress: u32,
    info: &[u8],
) -> io::Result<()> {
    w.write_u8(0xff)?;
    w.write_u16::<LittleEndian>(PROGRESS_REPORT_SENTINEL)?;
    w.write_u8(stage)?;
    w.write_u8(max_stage)?;
    let progress_bytes = progress.to_le_bytes();
    w.write_all(&progress_bytes[..3])?;
    w.write_all(info)?;
    w.write_all(&[0x00])?;
    w.end_packet().await
}

/// Reply to `COM_STATISTICS`: a bare human-readable string.
pub async fn write_statistics<W: AsyncWrite + Unpin>(
    w: &mut PacketWriter<W>,
    stats: &str,
) -> io::Result<()> {
    w.write_all(stats.as_bytes())?;
    w.end_packet().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mysql::basic::{
        err_packet, ok_packet, progress_report, read_length_encoded_string, read_row_field,
    };
    use crate::protocol::mysql::charset::DEFAULT_COLLATION_ID;
    use crate::protocol::mysql::packet::packet_reader::PacketReader;
    use crate::protocol::mysql::packet::Packet;
    use mysql_common::constants::ColumnType;
    use std::io::Cursor;

    fn caps() -> CapabilityFlags {
        CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_SESSION_TRACK
    }

    fn drain(bytes: Vec<u8>) -> Vec<(u8, Packet)> {
        let mut reader = PacketReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        while let Some(p) = reader.next_read().unwrap() {
            out.push(p);
        }
        out
    }

    #[tokio::test]
    async fn ok_packet_round_trip() {
        let mut w = PacketWriter::new(Vec::new());
        let sent = OkPacket {
            header: 0,
            affected_rows: 3,
            last_insert_id: 7,
            status_flags: StatusFlags::SERVER_STATUS_AUTOCOMMIT,
            warnings: 0,
            info: String::new(),
            session_state_info: Vec::new(),
        };
        write_ok_packet(&mut w, caps(), sent.clone()).await.unwrap();
        let packets = drain(w.inner_writer);
        assert_eq!(packets.len(), 1);
        let (_, got) = ok_packet(&packets[0].1, caps()).unwrap();
        assert_eq!(got, sent);
    }

    #[tokio::test]
    async fn lenenc_counts_use_the_shortest_form() {
        // affected_rows of 251 needs the 0xfc two-byte form; 250 stays one byte
        for (rows, lead) in [(250u64, vec![0xfa]), (251, vec![0xfc, 0xfb, 0x00])] {
            let mut w = PacketWriter::new(Vec::new());
            let ok = OkPacket {
                affected_rows: rows,
                ..OkPacket::default()
            };
            write_ok_packet(&mut w, caps(), ok).await.unwrap();
            let packets = drain(w.inner_writer);
            let payload = &packets[0].1[..];
            assert_eq!(&payload[1..1 + lead.len()], &lead[..]);
            let (_, got) = ok_packet(payload, caps()).unwrap();
            assert_eq!(got.affected_rows, rows);
        }
    }

    #[tokio::test]
    async fn err_packet_round_trip() {
        let mut w = PacketWriter::new(Vec::new());
        write_err_packet(
            &mut w,
            caps(),
            ErrorKind::ER_ACCESS_DENIED_ERROR,
            b"Access denied for user 'u'",
        )
        .await
        .unwrap();
        let packets = drain(w.inner_writer);
        let (_, err) = err_packet(&packets[0].1, caps()).unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(&err.sql_state.unwrap(), b"28000");
        assert_eq!(err.message, b"Access denied for user 'u'");
    }

    #[tokio::test]
    async fn eof_packet_shape() {
        let mut w = PacketWriter::new(Vec::new());
        write_eof_packet(&mut w, caps(), StatusFlags::SERVER_STATUS_AUTOCOMMIT)
            .await
            .unwrap();
        let packets = drain(w.inner_writer);
        let pkt = &packets[0].1;
        assert!(pkt.is_eof_packet());
        assert_eq!(&pkt[..], &[0xfe, 0x00, 0x00, 0x02, 0x00]);
    }

    #[tokio::test]
    async fn handshake_layout() {
        let mut w = PacketWriter::new(Vec::new());
        let scramble = *b"abcdefghijklmnopqrst";
        write_initial_handshake(
            &mut w,
            8,
            scramble,
            b"8.0.35-my-gate",
            crate::server::default_capabilities(),
            StatusFlags::SERVER_STATUS_AUTOCOMMIT,
            DEFAULT_COLLATION_ID,
        )
        .await
        .unwrap();
        let packets = drain(w.inner_writer);
        let payload = &packets[0].1[..];
        assert_eq!(payload[0], 10);
        let version_end = payload.iter().position(|b| *b == 0).unwrap();
        assert_eq!(&payload[1..version_end], b"8.0.35-my-gate");
        let rest = &payload[version_end + 1..];
        assert_eq!(&rest[0..4], &8u32.to_le_bytes());
        // first scramble half + filler
        assert_eq!(&rest[4..12], b"abcdefgh");
        assert_eq!(rest[12], 0);
        // collation / status / auth data len
        assert_eq!(rest[15], DEFAULT_COLLATION_ID);
        assert_eq!(&rest[16..18], &[0x02, 0x00]);
        assert_eq!(rest[20], 21);
        // 6 reserved + 4 extended-capability bytes
        assert_eq!(&rest[21..31], &[0u8; 10]);
        // second scramble half, NUL, plugin name
        assert_eq!(&rest[31..43], b"ijklmnopqrst");
        assert_eq!(rest[43], 0);
        assert_eq!(&rest[44..], b"mysql_native_password\0");
    }

    #[tokio::test]
    async fn text_resultset_shape_select_1() {
        // without DEPRECATE_EOF the full shape is five packets with
        // sequence ids one through five
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41;
        let mut w = PacketWriter::new(Vec::new());
        w.set_seq(1);
        let col = Column::new("1", ColumnType::MYSQL_TYPE_LONG);
        write_column_definitions(std::iter::once(&col), &mut w, caps)
            .await
            .unwrap();
        write_text_row(&mut w, &[Some(b"1".to_vec())]).await.unwrap();
        write_resultset_terminator(&mut w, caps, StatusFlags::SERVER_STATUS_AUTOCOMMIT)
            .await
            .unwrap();

        let packets = drain(w.inner_writer);
        assert_eq!(packets.len(), 5);
        let seqs: Vec<u8> = packets.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

        assert_eq!(&packets[0].1[..], &[0x01]); // column count
        assert!(packets[2].1.is_eof_packet()); // intermediate EOF
        let (_, field) = read_row_field(&packets[3].1).unwrap();
        assert_eq!(field, Some(&b"1"[..]));
        assert!(packets[4].1.is_eof_packet());
    }

    #[tokio::test]
    async fn column_definition_fields_in_order() {
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_DEPRECATE_EOF;
        let mut w = PacketWriter::new(Vec::new());
        let col = Column {
            schema: "information_schema".into(),
            table: "tables".into(),
            org_table: "tables".into(),
            column: "table_name".into(),
            org_column: "table_name".into(),
            collation: DEFAULT_COLLATION_ID as u16,
            column_length: 256,
            column_type: ColumnType::MYSQL_TYPE_VAR_STRING,
            column_flags: mysql_common::constants::ColumnFlags::NOT_NULL_FLAG,
            decimals: 0,
        };
        write_column_definitions_41(std::iter::once(&col), &mut w, caps, false)
            .await
            .unwrap();
        let packets = drain(w.inner_writer);
        assert_eq!(packets.len(), 1); // DEPRECATE_EOF: no trailing EOF

        let p = &packets[0].1[..];
        let (p, catalog) = read_length_encoded_string(p).unwrap();
        assert_eq!(catalog, b"def");
        let (p, schema) = read_length_encoded_string(p).unwrap();
        assert_eq!(schema, b"information_schema");
        let (p, table) = read_length_encoded_string(p).unwrap();
        assert_eq!(table, b"tables");
        let (p, org_table) = read_length_encoded_string(p).unwrap();
        assert_eq!(org_table, b"tables");
        let (p, name) = read_length_encoded_string(p).unwrap();
        assert_eq!(name, b"table_name");
        let (p, org_name) = read_length_encoded_string(p).unwrap();
        assert_eq!(org_name, b"table_name");
        assert_eq!(p[0], 0x0c);
        assert_eq!(&p[1..3], &(DEFAULT_COLLATION_ID as u16).to_le_bytes());
        assert_eq!(&p[3..7], &256u32.to_le_bytes());
        assert_eq!(p[7], ColumnType::MYSQL_TYPE_VAR_STRING as u8);
    }

    #[tokio::test]
    async fn binary_row_bitmap_and_values() {
        let mut w = PacketWriter::new(Vec::new());
        let columns = vec![
            Column::new("a", ColumnType::MYSQL_TYPE_LONG),
            Column::new("b", ColumnType::MYSQL_TYPE_VAR_STRING),
            Column::new("c", ColumnType::MYSQL_TYPE_LONG),
        ];
        let values = vec![
            BinValue::Int(5),
            BinValue::Null,
            BinValue::Int(-1),
        ];
        write_binary_row(&mut w, &columns, &values).await.unwrap();
        let packets = drain(w.inner_writer);
        let p = &packets[0].1[..];
        assert_eq!(p[0], 0x00);
        // column 1 null: bit 3 of the first bitmap byte
        assert_eq!(p[1], 0b0000_1000);
        assert_eq!(&p[2..6], &5i32.to_le_bytes());
        assert_eq!(&p[6..10], &(-1i32).to_le_bytes());
    }

    #[tokio::test]
    async fn prepare_ok_layout() {
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41;
        let mut w = PacketWriter::new(Vec::new());
        w.set_seq(1);
        let params = vec![
            Column::new("?", ColumnType::MYSQL_TYPE_LONG),
            Column::new("?", ColumnType::MYSQL_TYPE_VAR_STRING),
        ];
        write_prepare_ok(3, &params, &[], &mut w, caps).await.unwrap();
        let packets = drain(w.inner_writer);
        // prepare-ok + two param definitions + EOF; no column list
        assert_eq!(packets.len(), 4);
        let head = &packets[0].1[..];
        assert_eq!(head[0], 0x00);
        assert_eq!(&head[1..5], &3u32.to_le_bytes());
        assert_eq!(&head[5..7], &0u16.to_le_bytes()); // columns
        assert_eq!(&head[7..9], &2u16.to_le_bytes()); // params
        assert_eq!(head[9], 0x00);
        assert!(packets[3].1.is_eof_packet());
    }

    #[tokio::test]
    async fn local_infile_request_shape() {
        let mut w = PacketWriter::new(Vec::new());
        write_local_infile_request(&mut w, b"/tmp/data.csv").await.unwrap();
        let packets = drain(w.inner_writer);
        let p = &packets[0].1[..];
        assert!(packets[0].1.is_local_in_file_packet());
        assert_eq!(&p[1..], b"/tmp/data.csv");
    }

    #[tokio::test]
    async fn progress_report_round_trip() {
        let mut w = PacketWriter::new(Vec::new());
        write_progress_report(&mut w, 2, 6, 120_000, b"altering table")
            .await
            .unwrap();
        let packets = drain(w.inner_writer);
        let (_, report) = progress_report(&packets[0].1).unwrap();
        assert_eq!(report.stage, 2);
        assert_eq!(report.max_stage, 6);
        assert_eq!(report.progress, 120_000);
        assert_eq!(report.info, b"altering table");
    }
}
