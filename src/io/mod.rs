// IO module for shapefile sets
//
// Writing host objects out, reading records back and cleaning up the files
// afterwards.

pub use self::filename::{FilenameOptions, FilenameResolver};
pub use self::lifecycle::{
    delete_file, delete_shp_files_if_req, Cursor, DeleterRegistration, DeletionOptions, ManagedIter,
    ShapeFilesDeleter,
};
pub use self::reader::{
    managed_records, managed_shape_records, read_all, read_metadata, ReadOptions, RecordCursor,
    ShapeCursor, ShapeRecordCursor, ShapeRecordItem, ShapeRecordsOptions, ShapefileContents,
    ShapefileMetadata,
};
pub use self::source::{Feature, FeatureSource, KeyMatcher, ShapeSource, DEFAULT_KEY_PATTERN};
pub use self::writer::{ShapefileWriter, WriteOptions, WriteOutcome};

pub mod filename;
pub mod lifecycle;
pub mod reader;
pub mod source;
pub mod writer;
