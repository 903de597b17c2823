// Decode module for shapefile sets

pub mod dbf;
pub mod geometry;
pub mod index;

use std::io::Read;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::Bytes;

use crate::codec::encode::{FILE_CODE, MAIN_HEADER_LEN};
use crate::codec::types::{BoundingBox, Shape, ShapeType};
use crate::internal::error::{Error, Result};

/// The 100-byte header at the start of .shp and .shx files.
#[derive(Debug, Clone, PartialEq)]
pub struct MainHeader {
    /// Total file length in bytes.
    pub file_length: u64,
    pub version: i32,
    pub shape_type: ShapeType,
    pub bbox: BoundingBox,
}

pub fn read_main_header<R: Read>(reader: &mut R) -> Result<MainHeader> {
    let file_code = reader.read_i32::<BigEndian>()?;
    if file_code != FILE_CODE {
        return Err(Error::CodecError(format!(
            "Not a shapefile: file code {} (expected {})",
            file_code, FILE_CODE
        )));
    }
    for _ in 0..5 {
        reader.read_i32::<BigEndian>()?;
    }
    let words = reader.read_i32::<BigEndian>()?;
    if words < 0 || (words as u64) * 2 < MAIN_HEADER_LEN {
        return Err(Error::CodecError(format!("Invalid file length: {} words", words)));
    }
    let version = reader.read_i32::<LittleEndian>()?;
    let code = reader.read_i32::<LittleEndian>()?;
    let shape_type = ShapeType::from_i32(code)
        .ok_or_else(|| Error::CodecError(format!("Unsupported shape type code: {}", code)))?;

    let mut ranges = [0f64; 8];
    for v in ranges.iter_mut() {
        *v = reader.read_f64::<LittleEndian>()?;
    }
    let bbox = BoundingBox::from_ranges(
        [ranges[0], ranges[1], ranges[2], ranges[3]],
        [ranges[4], ranges[5]],
        [ranges[6], ranges[7]],
    );

    Ok(MainHeader { file_length: words as u64 * 2, version, shape_type, bbox })
}

/// Reads .shp records in file order.
pub struct GeometryReader<R: Read> {
    reader: R,
    header: MainHeader,
    position: u64,
}

impl<R: Read> GeometryReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let header = read_main_header(&mut reader)?;
        Ok(GeometryReader { reader, header, position: MAIN_HEADER_LEN })
    }

    pub fn header(&self) -> &MainHeader {
        &self.header
    }

    /// Next shape, or `None` at the end declared in the header.
    pub fn next_shape(&mut self) -> Result<Option<Shape>> {
        if self.position + 8 > self.header.file_length {
            return Ok(None);
        }
        let _record_number = self.reader.read_i32::<BigEndian>()?;
        let words = self.reader.read_i32::<BigEndian>()?;
        if words < 2 {
            return Err(Error::CodecError(format!(
                "Invalid record content length {} at byte {}",
                words, self.position
            )));
        }
        let length = words as u64 * 2;
        if self.position + 8 + length > self.header.file_length {
            return Err(Error::CodecError(format!(
                "Record at byte {} runs past the end of the file",
                self.position
            )));
        }
        let mut content = vec![0u8; length as usize];
        self.reader.read_exact(&mut content)?;
        self.position += 8 + length;
        geometry::decode_shape(Bytes::from(content)).map(Some)
    }
}
