// Schema module for shapefile attribute tables
//
// Coercion of loosely typed host values and inference of one column
// descriptor per field across a whole write.

pub use self::coerce::{coerce, CoerceOptions, HostValue, TypeCoercer};
pub use self::inference::{fold, SchemaOptions, SchemaUnifier};
pub use self::types::{conform_to, AttributeRecord, FieldDescriptor, FieldKind, Schema};

pub mod coerce;
pub mod inference;
pub mod types;
