use crate::protocol::mysql::CodecError;

use mysql_common::constants::ColumnType;
use winnow::binary::{i8 as le_i8, u8 as le_u8};
use winnow::binary::{le_f32, le_f64, le_i16, le_i32, le_i64, le_u16, le_u32, le_u64};
use winnow::error::ParserError;
use winnow::prelude::*;
use winnow::token::take;

/// High bit of the type flag byte in a `COM_STMT_EXECUTE` type pair.
pub const PARAM_FLAG_UNSIGNED: u8 = 0x80;

/// A decoded binary-protocol value. Integer widths collapse to 64 bits on
/// decode; the declared column type picks the wire width on encode.
#[derive(Debug, Clone, PartialEq)]
pub enum BinValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    DateTime(MyDateTime),
    Time(MyTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MyDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micros: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MyTime {
    pub negative: bool,
    pub days: u32,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micros: u32,
}

impl MyDateTime {
    /// Wire length of the shortest encoding: 0, 4, 7 or 11.
    pub fn wire_len(&self) -> u8 {
        if self.micros != 0 {
            11
        } else if self.hour != 0 || self.minute != 0 || self.second != 0 {
            7
        } else if self.year != 0 || self.month != 0 || self.day != 0 {
            4
        } else {
            0
        }
    }

    /// Parse `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`.
    pub fn parse_str(s: &str) -> Option<Self> {
        let (date, time) = match s.split_once(' ') {
            Some((d, t)) => (d, Some(t)),
            None => (s, None),
        };
        let mut parts = date.splitn(3, '-');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        let mut out = MyDateTime {
            year,
            month,
            day,
            ..Default::default()
        };
        if let Some(time) = time {
            let (hms, micros) = match time.split_once('.') {
                Some((hms, frac)) => (hms, frac_to_micros(frac)?),
                None => (time, 0),
            };
            let mut parts = hms.splitn(3, ':');
            out.hour = parts.next()?.parse().ok()?;
            out.minute = parts.next()?.parse().ok()?;
            out.second = parts.next()?.parse().ok()?;
            out.micros = micros;
        }
        Some(out)
    }
}

impl MyTime {
    pub fn wire_len(&self) -> u8 {
        if self.micros != 0 {
            12
        } else if self.days != 0
            || self.hour != 0
            || self.minute != 0
            || self.second != 0
            || self.negative
        {
            8
        } else {
            0
        }
    }

    /// Parse `[-]HHH:MM:SS[.ffffff]`; hours beyond 23 spill into days.
    pub fn parse_str(s: &str) -> Option<Self> {
        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (hms, micros) = match s.split_once('.') {
            Some((hms, frac)) => (hms, frac_to_micros(frac)?),
            None => (s, 0),
        };
        let mut parts = hms.splitn(3, ':');
        let hours: u32 = parts.next()?.parse().ok()?;
        let minute = parts.next()?.parse().ok()?;
        let second = parts.next()?.parse().ok()?;
        Some(MyTime {
            negative,
            days: hours / 24,
            hour: (hours % 24) as u8,
            minute,
            second,
            micros,
        })
    }
}

fn frac_to_micros(frac: &str) -> Option<u32> {
    if frac.is_empty() || frac.len() > 6 {
        return None;
    }
    let n: u32 = frac.parse().ok()?;
    Some(n * 10u32.pow(6 - frac.len() as u32))
}

/// Map a wire type byte to a [`ColumnType`].
pub fn column_type_from_u8(b: u8) -> Option<ColumnType> {
    use ColumnType::*;
    Some(match b {
        0 => MYSQL_TYPE_DECIMAL,
        1 => MYSQL_TYPE_TINY,
        2 => MYSQL_TYPE_SHORT,
        3 => MYSQL_TYPE_LONG,
        4 => MYSQL_TYPE_FLOAT,
        5 => MYSQL_TYPE_DOUBLE,
        6 => MYSQL_TYPE_NULL,
        7 => MYSQL_TYPE_TIMESTAMP,
        8 => MYSQL_TYPE_LONGLONG,
        9 => MYSQL_TYPE_INT24,
        10 => MYSQL_TYPE_DATE,
        11 => MYSQL_TYPE_TIME,
        12 => MYSQL_TYPE_DATETIME,
        13 => MYSQL_TYPE_YEAR,
        15 => MYSQL_TYPE_VARCHAR,
        16 => MYSQL_TYPE_BIT,
        245 => MYSQL_TYPE_JSON,
        246 => MYSQL_TYPE_NEWDECIMAL,
        247 => MYSQL_TYPE_ENUM,
        248 => MYSQL_TYPE_SET,
        249 => MYSQL_TYPE_TINY_BLOB,
        250 => MYSQL_TYPE_MEDIUM_BLOB,
        251 => MYSQL_TYPE_LONG_BLOB,
        252 => MYSQL_TYPE_BLOB,
        253 => MYSQL_TYPE_VAR_STRING,
        254 => MYSQL_TYPE_STRING,
        255 => MYSQL_TYPE_GEOMETRY,
        _ => return None,
    })
}

/// Length in bytes of a null bitmap covering `columns` bits starting at
/// `bit_offset` (2 for resultset rows, 0 for execute parameters).
pub fn null_bitmap_len(columns: usize, bit_offset: usize) -> usize {
    (columns + 7 + bit_offset) / 8
}

pub fn build_null_bitmap(nulls: &[bool], bit_offset: usize) -> Vec<u8> {
    let mut bitmap = vec![0u8; null_bitmap_len(nulls.len(), bit_offset)];
    for (i, is_null) in nulls.iter().enumerate() {
        if *is_null {
            let bit = i + bit_offset;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
    }
    bitmap
}

pub fn bitmap_is_null(bitmap: &[u8], idx: usize, bit_offset: usize) -> bool {
    let bit = idx + bit_offset;
    bitmap
        .get(bit / 8)
        .map(|b| b & (1 << (bit % 8)) != 0)
        .unwrap_or(false)
}

fn decode_datetime(i: &[u8]) -> winnow::IResult<&[u8], MyDateTime> {
    let (i, len) = le_u8.parse_peek(i)?;
    let mut v = MyDateTime::default();
    match len {
        0 => Ok((i, v)),
        4 | 7 | 11 => {
            let (i, year) = le_u16.parse_peek(i)?;
            let (i, month) = le_u8.parse_peek(i)?;
            let (mut i, day) = le_u8.parse_peek(i)?;
            v.year = year;
            v.month = month;
            v.day = day;
            if len >= 7 {
                let (rest, hour) = le_u8.parse_peek(i)?;
                let (rest, minute) = le_u8.parse_peek(rest)?;
                let (rest, second) = le_u8.parse_peek(rest)?;
                v.hour = hour;
                v.minute = minute;
                v.second = second;
                i = rest;
            }
            if len == 11 {
                let (rest, micros) = le_u32.parse_peek(i)?;
                v.micros = micros;
                i = rest;
            }
            Ok((i, v))
        }
        _ => Err(winnow::error::ErrMode::Cut(
            winnow::error::InputError::from_error_kind(
                &i,
                winnow::error::ErrorKind::Verify,
            ),
        )),
    }
}

fn decode_time(i: &[u8]) -> winnow::IResult<&[u8], MyTime> {
    let (i, len) = le_u8.parse_peek(i)?;
    let mut v = MyTime::default();
    match len {
        0 => Ok((i, v)),
        8 | 12 => {
            let (i, sign) = le_u8.parse_peek(i)?;
            let (i, days) = le_u32.parse_peek(i)?;
            let (i, hour) = le_u8.parse_peek(i)?;
            let (i, minute) = le_u8.parse_peek(i)?;
            let (mut i, second) = le_u8.parse_peek(i)?;
            v.negative = sign == 1;
            v.days = days;
            v.hour = hour;
            v.minute = minute;
            v.second = second;
            if len == 12 {
                let (rest, micros) = le_u32.parse_peek(i)?;
                v.micros = micros;
                i = rest;
            }
            Ok((i, v))
        }
        _ => Err(winnow::error::ErrMode::Cut(
            winnow::error::InputError::from_error_kind(
                &i,
                winnow::error::ErrorKind::Verify,
            ),
        )),
    }
}

/// Decode one binary value of the given column type.
pub fn decode_binary_value(
    i: &[u8],
    col_type: ColumnType,
    unsigned: bool,
) -> winnow::IResult<&[u8], BinValue> {
    use ColumnType::*;
    match col_type {
        MYSQL_TYPE_NULL => Ok((i, BinValue::Null)),
        MYSQL_TYPE_TINY => {
            if unsigned {
                le_u8.parse_peek(i).map(|(i, v)| (i, BinValue::UInt(v as u64)))
            } else {
                le_i8.parse_peek(i).map(|(i, v)| (i, BinValue::Int(v as i64)))
            }
        }
        MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => {
            if unsigned {
                le_u16.parse_peek(i).map(|(i, v)| (i, BinValue::UInt(v as u64)))
            } else {
                le_i16.parse_peek(i).map(|(i, v)| (i, BinValue::Int(v as i64)))
            }
        }
        MYSQL_TYPE_LONG | MYSQL_TYPE_INT24 => {
            if unsigned {
                le_u32.parse_peek(i).map(|(i, v)| (i, BinValue::UInt(v as u64)))
            } else {
                le_i32.parse_peek(i).map(|(i, v)| (i, BinValue::Int(v as i64)))
            }
        }
        MYSQL_TYPE_LONGLONG => {
            if unsigned {
                le_u64.parse_peek(i).map(|(i, v)| (i, BinValue::UInt(v)))
            } else {
                le_i64.parse_peek(i).map(|(i, v)| (i, BinValue::Int(v)))
            }
        }
        MYSQL_TYPE_FLOAT => le_f32.parse_peek(i).map(|(i, v)| (i, BinValue::Float(v))),
        MYSQL_TYPE_DOUBLE => le_f64.parse_peek(i).map(|(i, v)| (i, BinValue::Double(v))),
        MYSQL_TYPE_DATE | MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP => {
            decode_datetime(i).map(|(i, v)| (i, BinValue::DateTime(v)))
        }
        MYSQL_TYPE_TIME => decode_time(i).map(|(i, v)| (i, BinValue::Time(v))),
        MYSQL_TYPE_VARCHAR | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING
        | MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL | MYSQL_TYPE_ENUM | MYSQL_TYPE_SET
        | MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB
        | MYSQL_TYPE_BLOB | MYSQL_TYPE_GEOMETRY | MYSQL_TYPE_BIT | MYSQL_TYPE_JSON => {
            let (i, len) = crate::protocol::mysql::basic::read_length_encoded_number(i)?;
            let (i, bytes) = take(len).parse_peek(i)?;
            Ok((i, BinValue::Bytes(bytes.to_vec())))
        }
        _ => Err(winnow::error::ErrMode::Cut(
            winnow::error::InputError::from_error_kind(
                &i,
                winnow::error::ErrorKind::Verify,
            ),
        )),
    }
}

/// Append the binary encoding of `value` for the declared `col_type`.
pub fn encode_binary_value(
    out: &mut Vec<u8>,
    col_type: ColumnType,
    value: &BinValue,
) -> Result<(), CodecError> {
    use ColumnType::*;

    fn int_bytes(out: &mut Vec<u8>, v: i64, width: usize, what: &'static str) -> Result<(), CodecError> {
        let le = v.to_le_bytes();
        // reject values that do not survive the truncation
        let sign_fill = if v < 0 { 0xff } else { 0x00 };
        if le[width..].iter().any(|b| *b != sign_fill) {
            return Err(CodecError::ValueOutOfRange(what));
        }
        out.extend_from_slice(&le[..width]);
        Ok(())
    }

    fn uint_bytes(out: &mut Vec<u8>, v: u64, width: usize, what: &'static str) -> Result<(), CodecError> {
        let le = v.to_le_bytes();
        if le[width..].iter().any(|b| *b != 0) {
            return Err(CodecError::ValueOutOfRange(what));
        }
        out.extend_from_slice(&le[..width]);
        Ok(())
    }

    fn write_lenenc(out: &mut Vec<u8>, bytes: &[u8]) {
        let len = bytes.len() as u64;
        match len {
            0..=0xfa => out.push(len as u8),
            0xfb..=0xffff => {
                out.push(0xfc);
                out.extend_from_slice(&(len as u16).to_le_bytes());
            }
            0x1_0000..=0xff_ffff => {
                out.push(0xfd);
                out.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
            }
            _ => {
                out.push(0xfe);
                out.extend_from_slice(&len.to_le_bytes());
            }
        }
        out.extend_from_slice(bytes);
    }

    match (col_type, value) {
        (_, BinValue::Null) => Err(CodecError::ValueOutOfRange("null in value position")),
        (MYSQL_TYPE_TINY, BinValue::Int(v)) => int_bytes(out, *v, 1, "TINY"),
        (MYSQL_TYPE_TINY, BinValue::UInt(v)) => uint_bytes(out, *v, 1, "TINY"),
        (MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR, BinValue::Int(v)) => int_bytes(out, *v, 2, "SHORT"),
        (MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR, BinValue::UInt(v)) => uint_bytes(out, *v, 2, "SHORT"),
        (MYSQL_TYPE_LONG | MYSQL_TYPE_INT24, BinValue::Int(v)) => int_bytes(out, *v, 4, "LONG"),
        (MYSQL_TYPE_LONG | MYSQL_TYPE_INT24, BinValue::UInt(v)) => uint_bytes(out, *v, 4, "LONG"),
        (MYSQL_TYPE_LONGLONG, BinValue::Int(v)) => {
            out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        (MYSQL_TYPE_LONGLONG, BinValue::UInt(v)) => {
            out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        (MYSQL_TYPE_FLOAT, BinValue::Float(v)) => {
            out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        (MYSQL_TYPE_DOUBLE, BinValue::Double(v)) => {
            out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        (MYSQL_TYPE_DOUBLE, BinValue::Float(v)) => {
            out.extend_from_slice(&(*v as f64).to_le_bytes());
            Ok(())
        }
        (MYSQL_TYPE_DATE | MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP, BinValue::DateTime(v)) => {
            let len = v.wire_len();
            out.push(len);
            if len >= 4 {
                out.extend_from_slice(&v.year.to_le_bytes());
                out.push(v.month);
                out.push(v.day);
            }
            if len >= 7 {
                out.push(v.hour);
                out.push(v.minute);
                out.push(v.second);
            }
            if len == 11 {
                out.extend_from_slice(&v.micros.to_le_bytes());
            }
            Ok(())
        }
        (MYSQL_TYPE_TIME, BinValue::Time(v)) => {
            let len = v.wire_len();
            out.push(len);
            if len >= 8 {
                out.push(v.negative as u8);
                out.extend_from_slice(&v.days.to_le_bytes());
                out.push(v.hour);
                out.push(v.minute);
                out.push(v.second);
            }
            if len == 12 {
                out.extend_from_slice(&v.micros.to_le_bytes());
            }
            Ok(())
        }
        (
            MYSQL_TYPE_VARCHAR | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING
            | MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL | MYSQL_TYPE_ENUM | MYSQL_TYPE_SET
            | MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB
            | MYSQL_TYPE_BLOB | MYSQL_TYPE_GEOMETRY | MYSQL_TYPE_BIT | MYSQL_TYPE_JSON,
            BinValue::Bytes(bytes),
        ) => {
            write_lenenc(out, bytes);
            Ok(())
        }
        _ => Err(CodecError::ValueOutOfRange("type/value mismatch")),
    }
}

/// The decoded parameter block of a `COM_STMT_EXECUTE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteParams {
    pub values: Vec<BinValue>,
    pub types: Vec<(ColumnType, u8)>,
}

/// Decode the parameter section of `COM_STMT_EXECUTE`. When the
/// new-params-bind flag is zero the client omits the type table and the
/// previous execute's types (`last_types`) apply.
pub fn decode_execute_params(
    params: &[u8],
    param_count: usize,
    last_types: &[(ColumnType, u8)],
) -> Result<ExecuteParams, CodecError> {
    if param_count == 0 {
        return Ok(ExecuteParams {
            values: Vec::new(),
            types: Vec::new(),
        });
    }

    let bitmap_len = null_bitmap_len(param_count, 0);
    if params.len() < bitmap_len + 1 {
        return Err(CodecError::MalformedPacket(
            "execute payload shorter than its null bitmap".into(),
        ));
    }
    let (bitmap, rest) = params.split_at(bitmap_len);
    let (new_bind, mut rest) = (rest[0], &rest[1..]);

    let types: Vec<(ColumnType, u8)> = if new_bind == 1 {
        let mut types = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            if rest.len() < 2 {
                return Err(CodecError::MalformedPacket(
                    "truncated parameter type table".into(),
                ));
            }
            let col_type = column_type_from_u8(rest[0]).ok_or_else(|| {
                CodecError::MalformedPacket(format!("unknown parameter type {:#x}", rest[0]))
            })?;
            types.push((col_type, rest[1]));
            rest = &rest[2..];
        }
        types
    } else {
        if last_types.len() != param_count {
            return Err(CodecError::MalformedPacket(
                "no bound types to reuse for this statement".into(),
            ));
        }
        last_types.to_vec()
    };

    let mut values = Vec::with_capacity(param_count);
    for (idx, (col_type, flags)) in types.iter().enumerate() {
        if bitmap_is_null(bitmap, idx, 0) {
            values.push(BinValue::Null);
            continue;
        }
        let unsigned = flags & PARAM_FLAG_UNSIGNED != 0;
        let (next, value) = decode_binary_value(rest, *col_type, unsigned)
            .map_err(|e| CodecError::MalformedPacket(format!("parameter {idx}: {e:?}")))?;
        values.push(value);
        rest = next;
    }

    Ok(ExecuteParams { values, types })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ColumnType::*;

    #[test]
    fn bitmap_lengths() {
        assert_eq!(null_bitmap_len(1, 2), 1);
        assert_eq!(null_bitmap_len(7, 2), 2);
        assert_eq!(null_bitmap_len(8, 0), 1);
        assert_eq!(null_bitmap_len(9, 0), 2);
    }

    #[test]
    fn row_bitmap_offset_two() {
        // columns 0 and 2 null out of 3
        let bitmap = build_null_bitmap(&[true, false, true], 2);
        assert_eq!(bitmap, vec![0b0001_0100]);
        assert!(bitmap_is_null(&bitmap, 0, 2));
        assert!(!bitmap_is_null(&bitmap, 1, 2));
        assert!(bitmap_is_null(&bitmap, 2, 2));
    }

    #[test]
    fn param_bitmap_offset_zero() {
        let bitmap = build_null_bitmap(&[false, true], 0);
        assert_eq!(bitmap, vec![0x02]);
        assert!(!bitmap_is_null(&bitmap, 0, 0));
        assert!(bitmap_is_null(&bitmap, 1, 0));
    }

    #[test]
    fn decode_execute_with_null_param() {
        // two params, bitmap 0x02 (param 1 null), new-bind = 1,
        // types LONG + VARCHAR, one 4-byte LE value
        let mut payload = vec![0x02, 0x01];
        payload.extend(&[MYSQL_TYPE_LONG as u8, 0x00]);
        payload.extend(&[MYSQL_TYPE_VARCHAR as u8, 0x00]);
        payload.extend(&1234i32.to_le_bytes());

        let decoded = decode_execute_params(&payload, 2, &[]).unwrap();
        assert_eq!(decoded.values, vec![BinValue::Int(1234), BinValue::Null]);
        assert_eq!(decoded.types.len(), 2);
    }

    #[test]
    fn decode_execute_reuses_previous_types() {
        let mut payload = vec![0x00, 0x00]; // no nulls, new-bind = 0
        payload.extend(&7i32.to_le_bytes());
        let last = vec![(MYSQL_TYPE_LONG, 0u8)];
        let decoded = decode_execute_params(&payload, 1, &last).unwrap();
        assert_eq!(decoded.values, vec![BinValue::Int(7)]);

        // without remembered types the same payload is malformed
        assert!(decode_execute_params(&payload, 1, &[]).is_err());
    }

    #[test]
    fn value_round_trips() {
        let cases: Vec<(ColumnType, BinValue)> = vec![
            (MYSQL_TYPE_TINY, BinValue::Int(-5)),
            (MYSQL_TYPE_SHORT, BinValue::Int(300)),
            (MYSQL_TYPE_LONG, BinValue::Int(-70_000)),
            (MYSQL_TYPE_LONGLONG, BinValue::Int(1 << 40)),
            (MYSQL_TYPE_FLOAT, BinValue::Float(1.5)),
            (MYSQL_TYPE_DOUBLE, BinValue::Double(-2.25)),
            (MYSQL_TYPE_VAR_STRING, BinValue::Bytes(b"hello".to_vec())),
            (
                MYSQL_TYPE_DATETIME,
                BinValue::DateTime(MyDateTime {
                    year: 2024,
                    month: 2,
                    day: 29,
                    hour: 13,
                    minute: 5,
                    second: 59,
                    micros: 0,
                }),
            ),
            (
                MYSQL_TYPE_TIME,
                BinValue::Time(MyTime {
                    negative: true,
                    days: 1,
                    hour: 2,
                    minute: 3,
                    second: 4,
                    micros: 500,
                }),
            ),
        ];
        for (col_type, value) in cases {
            let mut out = Vec::new();
            encode_binary_value(&mut out, col_type, &value).unwrap();
            let (rest, decoded) = decode_binary_value(&out, col_type, false).unwrap();
            assert!(rest.is_empty());
            assert_eq!(decoded, value, "{col_type:?}");
        }
    }

    #[test]
    fn datetime_shortest_form() {
        let zero = MyDateTime::default();
        let mut out = Vec::new();
        encode_binary_value(&mut out, MYSQL_TYPE_DATETIME, &BinValue::DateTime(zero)).unwrap();
        assert_eq!(out, vec![0x00]);

        let date_only = MyDateTime {
            year: 2023,
            month: 7,
            day: 1,
            ..Default::default()
        };
        let mut out = Vec::new();
        encode_binary_value(&mut out, MYSQL_TYPE_DATE, &BinValue::DateTime(date_only)).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], 4);
    }

    #[test]
    fn out_of_range_encode_fails() {
        let mut out = Vec::new();
        let err = encode_binary_value(&mut out, MYSQL_TYPE_TINY, &BinValue::Int(300));
        assert!(matches!(err, Err(CodecError::ValueOutOfRange(_))));
    }

    #[test]
    fn bad_temporal_length_byte_fails() {
        // DATETIME with a declared length of 5 is malformed
        let bytes = [0x05, 0, 0, 0, 0, 0];
        assert!(decode_binary_value(&bytes, MYSQL_TYPE_DATETIME, false).is_err());
    }

    #[test]
    fn parse_str_temporals() {
        let dt = MyDateTime::parse_str("2024-01-02 03:04:05.5").unwrap();
        assert_eq!((dt.year, dt.month, dt.day), (2024, 1, 2));
        assert_eq!((dt.hour, dt.minute, dt.second), (3, 4, 5));
        assert_eq!(dt.micros, 500_000);

        let t = MyTime::parse_str("-26:10:09").unwrap();
        assert!(t.negative);
        assert_eq!((t.days, t.hour, t.minute, t.second), (1, 2, 10, 9));
    }
}
