use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::NaiveDate;
use log::warn;

use crate::codec::decimal::Decimal;
use crate::codec::encode::dbf::{END_OF_FILE, HEADER_TERMINATOR};
use crate::codec::types::{DbfField, DbfFieldType, Encoding, FieldValue};
use crate::internal::error::{Error, Result};

/// Parsed .dbf header.
#[derive(Debug, Clone, PartialEq)]
pub struct DbfHeader {
    pub version: u8,
    pub last_update: Option<NaiveDate>,
    pub num_records: u32,
    pub header_length: u16,
    pub record_length: u16,
    pub fields: Vec<DbfField>,
}

/// One row as stored; deleted rows are still returned, flagged.
#[derive(Debug, Clone, PartialEq)]
pub struct DbfRow {
    pub deleted: bool,
    pub values: Vec<FieldValue>,
}

pub fn read_header<R: Read>(reader: &mut R, encoding: Encoding) -> Result<DbfHeader> {
    let version = reader.read_u8()?;
    let mut date = [0u8; 3];
    reader.read_exact(&mut date)?;
    let last_update =
        NaiveDate::from_ymd_opt(1900 + date[0] as i32, date[1] as u32, date[2] as u32);
    let num_records = reader.read_u32::<LittleEndian>()?;
    let header_length = reader.read_u16::<LittleEndian>()?;
    let record_length = reader.read_u16::<LittleEndian>()?;
    let mut reserved = [0u8; 20];
    reader.read_exact(&mut reserved)?;

    if (header_length as usize) < 33 {
        return Err(Error::CodecError(format!("Invalid dbf header length {}", header_length)));
    }
    let max_fields = (header_length as usize - 33) / 32;

    let mut fields = Vec::new();
    let mut consumed = 32usize;
    loop {
        let first = reader.read_u8()?;
        consumed += 1;
        if first == HEADER_TERMINATOR {
            break;
        }
        if fields.len() >= max_fields {
            return Err(Error::CodecError("Missing dbf header terminator".to_string()));
        }
        let mut descriptor = [0u8; 31];
        reader.read_exact(&mut descriptor)?;
        consumed += 31;

        let mut raw_name = vec![first];
        raw_name.extend_from_slice(&descriptor[..10]);
        let name_end = raw_name.iter().position(|b| *b == 0).unwrap_or(raw_name.len());
        let name = encoding.decode(&raw_name[..name_end]).trim().to_string();

        let code = descriptor[10];
        let field_type = DbfFieldType::from_code(code).ok_or_else(|| {
            Error::CodecError(format!("Unknown dbf field type '{}' for '{}'", code as char, name))
        })?;
        fields.push(DbfField {
            name,
            field_type,
            length: descriptor[15],
            decimal_count: descriptor[16],
        });
    }

    let expected: usize = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();
    if expected != record_length as usize {
        return Err(Error::CodecError(format!(
            "dbf record length {} does not match its fields ({})",
            record_length, expected
        )));
    }

    if (header_length as usize) > consumed {
        let skip = (header_length as usize - consumed) as u64;
        io::copy(&mut reader.by_ref().take(skip), &mut io::sink())?;
    }

    Ok(DbfHeader { version, last_update, num_records, header_length, record_length, fields })
}

/// Lazily reads rows after the header.
pub struct DbfReader<R: Read> {
    reader: R,
    header: DbfHeader,
    encoding: Encoding,
    remaining: u32,
}

impl<R: Read> DbfReader<R> {
    pub fn new(mut reader: R, encoding: Encoding) -> Result<Self> {
        let header = read_header(&mut reader, encoding)?;
        let remaining = header.num_records;
        Ok(DbfReader { reader, header, encoding, remaining })
    }

    pub fn header(&self) -> &DbfHeader {
        &self.header
    }

    pub fn fields(&self) -> &[DbfField] {
        &self.header.fields
    }

    /// Next row, or `None` once the declared count or the end marker is hit.
    pub fn next_row(&mut self) -> Result<Option<DbfRow>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let mut raw = vec![0u8; self.header.record_length as usize];
        let read = read_up_to(&mut self.reader, &mut raw)?;
        if read == 0 || (read == 1 && raw[0] == END_OF_FILE) {
            self.remaining = 0;
            return Ok(None);
        }
        if read < raw.len() {
            return Err(Error::CodecError(format!(
                "Truncated dbf record: expected {} bytes, got {}",
                raw.len(),
                read
            )));
        }
        self.remaining -= 1;

        let deleted = raw[0] == b'*';
        let mut offset = 1;
        let mut values = Vec::with_capacity(self.header.fields.len());
        for field in &self.header.fields {
            let end = offset + field.length as usize;
            values.push(parse_value(field, &raw[offset..end], self.encoding));
            offset = end;
        }
        Ok(Some(DbfRow { deleted, values }))
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Parses one column slice. Unparseable numbers and dates read as Null.
pub fn parse_value(field: &DbfField, raw: &[u8], encoding: Encoding) -> FieldValue {
    match field.field_type {
        DbfFieldType::Numeric | DbfFieldType::Float => {
            let text = String::from_utf8_lossy(raw);
            let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
            if text.is_empty() || text.starts_with('*') {
                return FieldValue::Null;
            }
            if field.field_type == DbfFieldType::Numeric && field.decimal_count == 0 {
                if let Ok(i) = text.parse::<i64>() {
                    return FieldValue::Integer(i);
                }
            }
            match text.parse::<Decimal>() {
                Ok(d) => FieldValue::Decimal(d),
                Err(_) => {
                    warn!("Unreadable number {:?} in field '{}'", text, field.name);
                    FieldValue::Null
                }
            }
        }
        DbfFieldType::Logical => match raw.first() {
            Some(b'T' | b't' | b'Y' | b'y') => FieldValue::Logical(true),
            Some(b'F' | b'f' | b'N' | b'n') => FieldValue::Logical(false),
            _ => FieldValue::Null,
        },
        DbfFieldType::Date => {
            let text = String::from_utf8_lossy(raw);
            NaiveDate::parse_from_str(text.trim(), "%Y%m%d")
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Null)
        }
        DbfFieldType::Character => FieldValue::Character(decode_text(raw, encoding)),
        DbfFieldType::Memo => FieldValue::Memo(decode_text(raw, encoding)),
    }
}

fn decode_text(raw: &[u8], encoding: Encoding) -> String {
    let end = raw
        .iter()
        .rposition(|b| *b != b' ' && *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    encoding.decode(&raw[..end])
}
