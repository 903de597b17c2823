use std::collections::HashSet;
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDate};

use crate::codec::decimal::Decimal;
use crate::codec::types::{DbfField, DbfFieldType, Encoding, FieldValue};
use crate::internal::error::{Error, Result};

pub const DBF_VERSION: u8 = 0x03;
pub const HEADER_TERMINATOR: u8 = 0x0D;
pub const END_OF_FILE: u8 = 0x1A;
pub const MAX_FIELD_NAME_LEN: usize = 10;
pub const MAX_FIELDS: usize = 255;
pub const MAX_FIELD_LENGTH: u8 = 254;
pub const MAX_DECIMAL_COUNT: u8 = 15;

/// Checks a column list against the dBASE limits before anything is written.
pub fn validate_fields(fields: &[DbfField], encoding: Encoding) -> Result<()> {
    if fields.len() > MAX_FIELDS {
        return Err(Error::SchemaError(format!(
            "Too many fields: {} (max {})",
            fields.len(),
            MAX_FIELDS
        )));
    }
    let mut seen = HashSet::new();
    for field in fields {
        let name = encoding.encode(&field.name);
        if name.is_empty() || name.len() > MAX_FIELD_NAME_LEN || name.contains(&0) {
            return Err(Error::SchemaError(format!(
                "Invalid field name '{}': must be 1-{} bytes without NUL",
                field.name, MAX_FIELD_NAME_LEN
            )));
        }
        if !seen.insert(name) {
            return Err(Error::SchemaError(format!("Duplicate field name '{}'", field.name)));
        }
        if field.length == 0 || field.length > MAX_FIELD_LENGTH {
            return Err(Error::SchemaError(format!(
                "Field '{}' has invalid length {}",
                field.name, field.length
            )));
        }
        if field.decimal_count > MAX_DECIMAL_COUNT
            || (field.decimal_count > 0 && field.decimal_count >= field.length)
        {
            return Err(Error::SchemaError(format!(
                "Field '{}' has invalid decimal count {} for length {}",
                field.name, field.decimal_count, field.length
            )));
        }
    }
    Ok(())
}

/// Bytes per record: the deletion flag plus every column.
pub fn record_length(fields: &[DbfField]) -> usize {
    1 + fields.iter().map(|f| f.length as usize).sum::<usize>()
}

/// Writes the .dbf header and field descriptor array.
pub fn write_header<W: Write>(
    writer: &mut W,
    fields: &[DbfField],
    num_records: u32,
    last_update: NaiveDate,
    encoding: Encoding,
) -> Result<()> {
    let header_length = 32 + 32 * fields.len() + 1;
    let record_length = record_length(fields);
    if record_length > u16::MAX as usize {
        return Err(Error::SchemaError(format!(
            "Record length {} exceeds the dBASE limit",
            record_length
        )));
    }

    writer.write_u8(DBF_VERSION)?;
    writer.write_u8((last_update.year() - 1900).clamp(0, 255) as u8)?;
    writer.write_u8(last_update.month() as u8)?;
    writer.write_u8(last_update.day() as u8)?;
    writer.write_u32::<LittleEndian>(num_records)?;
    writer.write_u16::<LittleEndian>(header_length as u16)?;
    writer.write_u16::<LittleEndian>(record_length as u16)?;
    writer.write_all(&[0u8; 20])?; // reserved, transaction/encryption flags, language driver

    for field in fields {
        let mut name = [0u8; 11];
        let encoded = encoding.encode(&field.name);
        let len = encoded.len().min(MAX_FIELD_NAME_LEN);
        name[..len].copy_from_slice(&encoded[..len]);
        writer.write_all(&name)?;
        writer.write_u8(field.field_type.code())?;
        writer.write_all(&[0u8; 4])?; // field data address
        writer.write_u8(field.length)?;
        writer.write_u8(field.decimal_count)?;
        writer.write_all(&[0u8; 14])?;
    }
    writer.write_u8(HEADER_TERMINATOR)?;
    Ok(())
}

/// Encodes one record: a live deletion flag followed by each column's text.
pub fn encode_record(fields: &[DbfField], values: &[FieldValue], encoding: Encoding) -> Result<BytesMut> {
    if fields.len() != values.len() {
        return Err(Error::CodecError(format!(
            "Record has {} values for {} fields",
            values.len(),
            fields.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(record_length(fields));
    buf.put_u8(b' ');
    for (field, value) in fields.iter().zip(values) {
        buf.put_slice(&encode_value(field, value, encoding)?);
    }
    Ok(buf)
}

fn mismatch(field: &DbfField, value: &FieldValue) -> Error {
    Error::CodecError(format!(
        "Cannot store {:?} in {:?} column '{}'",
        value, field.field_type, field.name
    ))
}

fn pad_right(mut bytes: Vec<u8>, width: usize) -> Vec<u8> {
    bytes.truncate(width);
    bytes.resize(width, b' ');
    bytes
}

/// Encodes a single value to exactly `field.length` bytes.
pub fn encode_value(field: &DbfField, value: &FieldValue, encoding: Encoding) -> Result<Vec<u8>> {
    let width = field.length as usize;
    let places = field.decimal_count as u32;

    match field.field_type {
        DbfFieldType::Numeric | DbfFieldType::Float => {
            let text = match value {
                FieldValue::Null => return Ok(vec![b' '; width]),
                FieldValue::Integer(i) if places == 0 => i.to_string(),
                FieldValue::Integer(i) => Decimal::from_i64(*i).to_fixed(places),
                FieldValue::Decimal(d) => d.to_fixed(places),
                FieldValue::Logical(b) => Decimal::from_i64(*b as i64).to_fixed(places),
                other => return Err(mismatch(field, other)),
            };
            if text.len() > width {
                return Err(Error::CodecError(format!(
                    "Value {} does not fit in {} bytes of column '{}'",
                    text, width, field.name
                )));
            }
            Ok(format!("{:>width$}", text, width = width).into_bytes())
        }
        DbfFieldType::Logical => {
            let flag = match value {
                FieldValue::Null => b'?',
                FieldValue::Logical(true) => b'T',
                FieldValue::Logical(false) => b'F',
                FieldValue::Integer(1) => b'T',
                FieldValue::Integer(0) => b'F',
                FieldValue::Decimal(d) if d.is_one() => b'T',
                FieldValue::Decimal(d) if d.is_zero() => b'F',
                other => return Err(mismatch(field, other)),
            };
            Ok(pad_right(vec![flag], width))
        }
        DbfFieldType::Date => match value {
            FieldValue::Null => Ok(vec![b' '; width]),
            FieldValue::Date(date) => Ok(pad_right(date.format("%Y%m%d").to_string().into_bytes(), width)),
            other => Err(mismatch(field, other)),
        },
        DbfFieldType::Character | DbfFieldType::Memo => {
            let text = value.render();
            Ok(pad_right(encoding.encode_truncated(&text, width), width))
        }
    }
}
