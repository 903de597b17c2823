use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::codec::decode::{read_main_header, MainHeader};
use crate::internal::error::{Error, Result};

/// Location of one record in the .shp file, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub content_length: u64,
}

/// Reads a whole .shx index.
pub fn read_index<R: Read>(reader: &mut R) -> Result<(MainHeader, Vec<IndexEntry>)> {
    let header = read_main_header(reader)?;
    let body = header.file_length.saturating_sub(100);
    if body % 8 != 0 {
        return Err(Error::CodecError(format!(
            "Index length {} is not a whole number of entries",
            header.file_length
        )));
    }
    let entries = (0..body / 8)
        .map(|_| {
            let offset = reader.read_i32::<BigEndian>()?;
            let length = reader.read_i32::<BigEndian>()?;
            if offset < 0 || length < 0 {
                return Err(Error::CodecError(format!(
                    "Negative index entry ({}, {})",
                    offset, length
                )));
            }
            Ok(IndexEntry { offset: offset as u64 * 2, content_length: length as u64 * 2 })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((header, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode::write_main_header;
    use crate::codec::types::{BoundingBox, ShapeType};
    use byteorder::WriteBytesExt;

    #[test]
    fn test_read_index_entries() {
        let mut data = Vec::new();
        write_main_header(&mut data, 116, ShapeType::Point, &BoundingBox::new()).unwrap();
        for (offset, length) in [(50, 10), (64, 10)] {
            data.write_i32::<BigEndian>(offset).unwrap();
            data.write_i32::<BigEndian>(length).unwrap();
        }
        let (header, entries) = read_index(&mut data.as_slice()).unwrap();
        assert_eq!(header.shape_type, ShapeType::Point);
        assert_eq!(
            entries,
            vec![
                IndexEntry { offset: 100, content_length: 20 },
                IndexEntry { offset: 128, content_length: 20 },
            ]
        );
    }

    #[test]
    fn test_read_index_truncated() {
        let mut data = Vec::new();
        write_main_header(&mut data, 116, ShapeType::Point, &BoundingBox::new()).unwrap();
        data.write_i32::<BigEndian>(50).unwrap();
        assert!(read_index(&mut data.as_slice()).is_err());
    }
}
