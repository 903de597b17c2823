use thiserror::Error;
use std::io;

/// Unified error type for the shpbridge library.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller's arguments were rejected before any I/O took place.
    #[error("Input Error: {0}")]
    InputError(String),

    /// A value matched none of the attribute types and memo fields are disabled.
    #[error("Coercion Error: {0}")]
    CoercionError(String),

    /// An object could not be converted to the requested shape type.
    #[error("Geometry Error: {0}")]
    GeometryError(String),

    /// The inferred attribute schema cannot be represented on disk.
    #[error("Schema Error: {0}")]
    SchemaError(String),

    /// Malformed or unsupported bytes in a .shp/.shx/.dbf file.
    #[error("Codec Error: {0}")]
    CodecError(String),

    /// Filesystem failure.
    #[error("IO Error: {0}")]
    IoError(String),
}

/// A specialized `Result` type for shpbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        // Short reads surface as UnexpectedEof; those are truncated files, not OS failures
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Error::CodecError(format!("Unexpected end of file: {}", err));
        }
        Error::IoError(err.to_string())
    }
}
