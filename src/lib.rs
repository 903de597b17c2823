// shpbridge library entry point
// Writes loosely typed geometry collections to shapefile sets and reads them back

pub mod codec;
pub mod internal;
pub mod io;
pub mod options;
pub mod schema;

pub use crate::codec::types::{BoundingBox, DbfField, Encoding, FieldValue, Point, Shape, ShapeType};
pub use crate::internal::error::{Error, Result};
pub use crate::options::ShpOptions;
