// Encode module for shapefile sets (.shp geometry, .shx index, .dbf attributes)

pub mod dbf;
pub mod geometry;

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use log::debug;

use crate::codec::paths::ShapefilePaths;
use crate::codec::types::{BoundingBox, DbfField, Encoding, FieldValue, Shape, ShapeType};
use crate::internal::error::{Error, Result};

pub const FILE_CODE: i32 = 9994;
pub const VERSION: i32 = 1000;
pub const MAIN_HEADER_LEN: u64 = 100;
const RECORD_HEADER_LEN: u64 = 8;

/// Writes the 100-byte header shared by .shp and .shx files.
/// `file_length` is in bytes and is stored in 16-bit words.
pub fn write_main_header<W: Write>(
    writer: &mut W,
    file_length: u64,
    shape_type: ShapeType,
    bbox: &BoundingBox,
) -> Result<()> {
    let words = i32::try_from(file_length / 2)
        .map_err(|_| Error::CodecError(format!("File length {} exceeds the format limit", file_length)))?;

    writer.write_i32::<BigEndian>(FILE_CODE)?;
    for _ in 0..5 {
        writer.write_i32::<BigEndian>(0)?;
    }
    writer.write_i32::<BigEndian>(words)?;
    writer.write_i32::<LittleEndian>(VERSION)?;
    writer.write_i32::<LittleEndian>(shape_type.to_i32())?;
    for v in bbox.xy() {
        writer.write_f64::<LittleEndian>(v)?;
    }
    let (z, m) = if bbox.is_empty() {
        ([0.0; 2], [0.0; 2])
    } else {
        (
            if shape_type.has_z() { [bbox.z_min, bbox.z_max] } else { [0.0; 2] },
            if shape_type.has_m() { [bbox.m_min, bbox.m_max] } else { [0.0; 2] },
        )
    };
    for v in z.iter().chain(m.iter()) {
        writer.write_f64::<LittleEndian>(*v)?;
    }
    Ok(())
}

/// Streams records into a new shapefile set.
///
/// Headers are written as placeholders on `create` and rewritten with the
/// final counts and extent by `finish`. A record is fully encoded before any
/// of its bytes hit disk, so an encoding error never leaves a half record.
pub struct ShapefileEncoder {
    paths: ShapefilePaths,
    shape_type: ShapeType,
    fields: Vec<DbfField>,
    encoding: Encoding,
    shp: BufWriter<File>,
    shx: BufWriter<File>,
    dbf: BufWriter<File>,
    shp_length: u64,
    num_records: u32,
    bbox: BoundingBox,
}

impl ShapefileEncoder {
    /// Creates (or truncates) the .shp, .shx and .dbf files of `paths`.
    pub fn create(
        paths: ShapefilePaths,
        shape_type: ShapeType,
        fields: Vec<DbfField>,
        encoding: Encoding,
    ) -> Result<Self> {
        dbf::validate_fields(&fields, encoding)?;

        let mut shp = BufWriter::new(File::create(paths.shp())?);
        let mut shx = BufWriter::new(File::create(paths.shx())?);
        let mut dbf_out = BufWriter::new(File::create(paths.dbf())?);

        let empty = BoundingBox::new();
        write_main_header(&mut shp, MAIN_HEADER_LEN, shape_type, &empty)?;
        write_main_header(&mut shx, MAIN_HEADER_LEN, shape_type, &empty)?;
        dbf::write_header(&mut dbf_out, &fields, 0, today(), encoding)?;

        debug!(
            "Created shapefile set {} ({}, {} fields)",
            paths.shp().display(),
            shape_type,
            fields.len()
        );

        Ok(ShapefileEncoder {
            paths,
            shape_type,
            fields,
            encoding,
            shp,
            shx,
            dbf: dbf_out,
            shp_length: MAIN_HEADER_LEN,
            num_records: 0,
            bbox: BoundingBox::new(),
        })
    }

    pub fn paths(&self) -> &ShapefilePaths {
        &self.paths
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape_type
    }

    pub fn num_records(&self) -> u32 {
        self.num_records
    }

    /// Appends one geometry and its attribute row.
    pub fn write_record(&mut self, shape: &Shape, values: &[FieldValue]) -> Result<()> {
        if shape.shape_type != ShapeType::Null && shape.shape_type != self.shape_type {
            return Err(Error::GeometryError(format!(
                "Cannot write a {} shape into a {} file",
                shape.shape_type, self.shape_type
            )));
        }
        let content = geometry::encode_shape(shape, self.shape_type)?;
        let row = dbf::encode_record(&self.fields, values, self.encoding)?;
        let record_number = self
            .num_records
            .checked_add(1)
            .ok_or_else(|| Error::CodecError("Too many records".to_string()))?;

        let offset_words = (self.shp_length / 2) as i32;
        let content_words = (content.len() / 2) as i32;

        self.shp.write_i32::<BigEndian>(record_number as i32)?;
        self.shp.write_i32::<BigEndian>(content_words)?;
        self.shp.write_all(&content)?;

        self.shx.write_i32::<BigEndian>(offset_words)?;
        self.shx.write_i32::<BigEndian>(content_words)?;

        self.dbf.write_all(&row)?;

        self.shp_length += RECORD_HEADER_LEN + content.len() as u64;
        self.num_records = record_number;
        if shape.shape_type != ShapeType::Null {
            self.bbox.merge(&shape.bbox());
        }
        Ok(())
    }

    /// Writes the end-of-file marker and the final headers, then flushes.
    pub fn finish(mut self) -> Result<u32> {
        self.dbf.write_u8(dbf::END_OF_FILE)?;

        let shx_length = MAIN_HEADER_LEN + RECORD_HEADER_LEN * self.num_records as u64;

        self.shp.seek(SeekFrom::Start(0))?;
        write_main_header(&mut self.shp, self.shp_length, self.shape_type, &self.bbox)?;
        self.shx.seek(SeekFrom::Start(0))?;
        write_main_header(&mut self.shx, shx_length, self.shape_type, &self.bbox)?;
        self.dbf.seek(SeekFrom::Start(0))?;
        dbf::write_header(&mut self.dbf, &self.fields, self.num_records, today(), self.encoding)?;

        self.shp.flush()?;
        self.shx.flush()?;
        self.dbf.flush()?;

        debug!(
            "Finished {}: {} records, {} bytes of geometry",
            self.paths.shp().display(),
            self.num_records,
            self.shp_length
        );
        Ok(self.num_records)
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::types::{DbfFieldType, Point};
    use std::fs;

    #[test]
    fn test_main_header_is_100_bytes() {
        let mut out = Vec::new();
        let bbox = BoundingBox::from_points(&[Point::with_z(1.0, 2.0, 3.0)]);
        write_main_header(&mut out, 236, ShapeType::PolyLineZ, &bbox).unwrap();
        assert_eq!(out.len(), MAIN_HEADER_LEN as usize);
        assert_eq!(&out[0..4], &9994i32.to_be_bytes());
        assert_eq!(&out[24..28], &118i32.to_be_bytes());
        assert_eq!(&out[28..32], &1000i32.to_le_bytes());
        assert_eq!(&out[32..36], &13i32.to_le_bytes());
        assert_eq!(&out[68..76], &3.0f64.to_le_bytes());
    }

    #[test]
    fn test_encoder_writes_consistent_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ShapefilePaths::from_path(dir.path().join("lines.shp"));
        let fields = vec![DbfField {
            name: "name".to_string(),
            field_type: DbfFieldType::Character,
            length: 8,
            decimal_count: 0,
        }];
        let mut encoder =
            ShapefileEncoder::create(paths.clone(), ShapeType::PolyLine, fields, Encoding::Utf8).unwrap();
        let shape = Shape::from_parts(
            ShapeType::PolyLine,
            &[vec![Point::new(0.0, 0.0), Point::new(3.0, 4.0)]],
        );
        encoder
            .write_record(&shape, &[FieldValue::Character("a".into())])
            .unwrap();
        encoder
            .write_record(&shape, &[FieldValue::Character("b".into())])
            .unwrap();
        assert_eq!(encoder.finish().unwrap(), 2);

        let shp = fs::read(paths.shp()).unwrap();
        let shx = fs::read(paths.shx()).unwrap();
        let dbf_bytes = fs::read(paths.dbf()).unwrap();
        let words = i32::from_be_bytes([shp[24], shp[25], shp[26], shp[27]]);
        assert_eq!(words as usize * 2, shp.len());
        assert_eq!(shx.len(), 100 + 2 * 8);
        assert_eq!(u32::from_le_bytes([dbf_bytes[4], dbf_bytes[5], dbf_bytes[6], dbf_bytes[7]]), 2);
        assert_eq!(*dbf_bytes.last().unwrap(), dbf::END_OF_FILE);
        // header + 2 rows of (1 + 8) + EOF
        assert_eq!(dbf_bytes.len(), 65 + 18 + 1);
    }

    #[test]
    fn test_encoder_rejects_foreign_shape_type() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ShapefilePaths::from_path(dir.path().join("pts"));
        let mut encoder =
            ShapefileEncoder::create(paths, ShapeType::Point, Vec::new(), Encoding::Utf8).unwrap();
        let line = Shape::from_parts(ShapeType::PolyLine, &[vec![Point::new(0.0, 0.0)]]);
        assert!(matches!(encoder.write_record(&line, &[]), Err(Error::GeometryError(_))));
        assert_eq!(encoder.num_records(), 0);
    }
}
