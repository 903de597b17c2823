// Shapefile reader
//
// Lazy, single-pass access to the geometry and attribute records of a
// shapefile set. Every cursor owns its own file handles.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::rc::Rc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::codec::decode::dbf::{read_header, DbfReader};
use crate::codec::decode::index::read_index;
use crate::codec::decode::{read_main_header, GeometryReader};
use crate::codec::paths::ShapefilePaths;
use crate::codec::types::{BoundingBox, DbfField, Encoding, FieldValue, Point, Shape, ShapeType};
use crate::internal::error::{Error, Result};
use crate::io::lifecycle::{Cursor, DeleterRegistration, DeletionOptions, ManagedIter};
use crate::schema::types::AttributeRecord;

/// Configuration for reading
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Text encoding of the .dbf file
    pub encoding: Encoding,
}

/// Configuration for paired shape and record iteration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeRecordsOptions {
    /// Give every part of a multi-part shape its own copy of the record
    /// instead of sharing one
    pub copy_records: bool,
}

/// Header-level facts about a shapefile set.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapefileMetadata {
    /// Attribute columns, without the deletion flag
    pub fields: Vec<DbfField>,
    pub bbox: BoundingBox,
    pub shape_type: ShapeType,
    pub num_entries: usize,
}

/// Metadata plus lazy record and shape sequences.
pub struct ShapefileContents {
    pub fields: Vec<DbfField>,
    pub records: RecordCursor,
    pub shapes: ShapeCursor,
    pub bbox: BoundingBox,
    pub shape_type: ShapeType,
    pub num_entries: usize,
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::IoError(format!("Cannot open {}: {}", path.display(), e)))
}

/// Reads the headers of the set `path` belongs to.
pub fn read_metadata(path: impl AsRef<Path>, options: &ReadOptions) -> Result<ShapefileMetadata> {
    let paths = ShapefilePaths::from_path(path.as_ref());
    let header = read_main_header(&mut open(&paths.shp())?)?;
    let dbf_header = read_header(&mut open(&paths.dbf())?, options.encoding)?;
    Ok(ShapefileMetadata {
        fields: dbf_header.fields,
        bbox: header.bbox,
        shape_type: header.shape_type,
        num_entries: dbf_header.num_records as usize,
    })
}

/// Opens the set `path` belongs to for reading records and shapes.
pub fn read_all(path: impl AsRef<Path>, options: &ReadOptions) -> Result<ShapefileContents> {
    let path = path.as_ref();
    let metadata = read_metadata(path, options)?;
    let records = RecordCursor::open(path, options)?;
    let shapes = ShapeCursor::open(path)?;
    debug!(
        "Opened {}: {} {} records, {} fields",
        path.display(),
        metadata.num_entries,
        metadata.shape_type,
        metadata.fields.len()
    );
    Ok(ShapefileContents {
        fields: metadata.fields,
        records,
        shapes,
        bbox: metadata.bbox,
        shape_type: metadata.shape_type,
        num_entries: metadata.num_entries,
    })
}

fn to_record(names: &[String], values: Vec<FieldValue>) -> AttributeRecord {
    names.iter().cloned().zip(values).collect()
}

/// Attribute records in file order. Rows flagged deleted are skipped.
pub struct RecordCursor {
    reader: Option<DbfReader<BufReader<File>>>,
    names: Vec<String>,
    len: usize,
}

impl RecordCursor {
    pub fn open(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Self> {
        let paths = ShapefilePaths::from_path(path.as_ref());
        let reader = DbfReader::new(open(&paths.dbf())?, options.encoding)?;
        let names = reader.fields().iter().map(|f| f.name.clone()).collect();
        let len = reader.header().num_records as usize;
        Ok(Self { reader: Some(reader), names, len })
    }

    pub fn field_names(&self) -> &[String] {
        &self.names
    }
}

impl Cursor for RecordCursor {
    type Item = AttributeRecord;

    fn next_item(&mut self) -> Result<Option<AttributeRecord>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        while let Some(row) = reader.next_row()? {
            if !row.deleted {
                return Ok(Some(to_record(&self.names, row.values)));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Iterator for RecordCursor {
    type Item = Result<AttributeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}

/// Shapes in file order.
pub struct ShapeCursor {
    reader: Option<GeometryReader<BufReader<File>>>,
    len: usize,
}

impl ShapeCursor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let paths = ShapefilePaths::from_path(path.as_ref());
        let reader = GeometryReader::new(open(&paths.shp())?)?;
        // the index gives the count without a pass over the geometry
        let len = match File::open(paths.shx()) {
            Ok(file) => match read_index(&mut BufReader::new(file)) {
                Ok((_, entries)) => entries.len(),
                Err(e) => {
                    warn!("Unreadable index {}: {}", paths.shx().display(), e);
                    0
                }
            },
            Err(_) => 0,
        };
        Ok(Self { reader: Some(reader), len })
    }
}

impl Cursor for ShapeCursor {
    type Item = Shape;

    fn next_item(&mut self) -> Result<Option<Shape>> {
        match self.reader.as_mut() {
            Some(reader) => reader.next_shape(),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Iterator for ShapeCursor {
    type Item = Result<Shape>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}

/// One step of paired shape and record iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeRecordItem {
    /// A shape with at most one part and its record
    Single(Vec<Point>, Rc<AttributeRecord>),
    /// The parts of a multi-part shape, each with the shape's record
    Multi(Vec<(Vec<Point>, Rc<AttributeRecord>)>),
}

/// Shapes paired with their records, multi-part shapes split into parts.
///
/// Parts of one shape share a single record unless `copy_records` is set;
/// mutating a shared record through one part is visible through the others.
pub struct ShapeRecordCursor {
    shapes: ShapeCursor,
    records: Option<DbfReader<BufReader<File>>>,
    names: Vec<String>,
    copy_records: bool,
    len: usize,
}

impl ShapeRecordCursor {
    pub fn open(path: impl AsRef<Path>, read: &ReadOptions, options: &ShapeRecordsOptions) -> Result<Self> {
        let path = path.as_ref();
        let records = RecordCursor::open(path, read)?;
        let shapes = ShapeCursor::open(path)?;
        Ok(Self {
            shapes,
            len: records.len,
            names: records.names,
            records: records.reader,
            copy_records: options.copy_records,
        })
    }

    fn pair(&self, shape: Shape, record: AttributeRecord) -> ShapeRecordItem {
        let record = Rc::new(record);
        if shape.is_single_part() {
            return ShapeRecordItem::Single(shape.points, record);
        }
        let parts = shape
            .part_ranges()
            .into_iter()
            .map(|range| {
                let rec = if self.copy_records {
                    Rc::new(record.as_ref().clone())
                } else {
                    Rc::clone(&record)
                };
                (shape.points[range].to_vec(), rec)
            })
            .collect();
        ShapeRecordItem::Multi(parts)
    }
}

impl Cursor for ShapeRecordCursor {
    type Item = ShapeRecordItem;

    fn next_item(&mut self) -> Result<Option<ShapeRecordItem>> {
        let records = match self.records.as_mut() {
            Some(records) => records,
            None => return Ok(None),
        };
        loop {
            let shape = self.shapes.next_item()?;
            let row = records.next_row()?;
            match (shape, row) {
                (Some(_), Some(row)) if row.deleted => continue,
                (Some(shape), Some(row)) => {
                    let record = to_record(&self.names, row.values);
                    return Ok(Some(self.pair(shape, record)));
                }
                (None, None) => return Ok(None),
                (shape, _) => {
                    warn!(
                        "Geometry and attribute counts differ, stopping at the end of the {}",
                        if shape.is_none() { "geometry" } else { "attributes" }
                    );
                    return Ok(None);
                }
            }
        }
    }

    fn close(&mut self) {
        self.shapes.close();
        self.records = None;
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Records of `path` that clean up after themselves.
pub fn managed_records(
    path: impl AsRef<Path>,
    read: &ReadOptions,
    deletion: &DeletionOptions,
    registration: &DeleterRegistration,
) -> Result<ManagedIter<RecordCursor>> {
    let path = path.as_ref();
    let cursor = RecordCursor::open(path, read)?;
    Ok(ManagedIter::new(cursor, path, deletion.clone(), registration.clone()))
}

/// Paired shapes and records of `path` that clean up after themselves.
pub fn managed_shape_records(
    path: impl AsRef<Path>,
    read: &ReadOptions,
    options: &ShapeRecordsOptions,
    deletion: &DeletionOptions,
    registration: &DeleterRegistration,
) -> Result<ManagedIter<ShapeRecordCursor>> {
    let path = path.as_ref();
    let cursor = ShapeRecordCursor::open(path, read, options)?;
    Ok(ManagedIter::new(cursor, path, deletion.clone(), registration.clone()))
}
