// Aggregate configuration
//
// Groups the per-component option structs so a single JSON document can
// configure a whole write/read cycle. Missing keys take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::internal::error::{Error, Result};
use crate::io::filename::FilenameOptions;
use crate::io::lifecycle::DeletionOptions;
use crate::io::reader::{ReadOptions, ShapeRecordsOptions};
use crate::io::writer::WriteOptions;
use crate::schema::coerce::CoerceOptions;
use crate::schema::inference::SchemaOptions;

/// Every option of the crate, grouped per component
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShpOptions {
    pub coerce: CoerceOptions,
    pub schema: SchemaOptions,
    pub filename: FilenameOptions,
    pub write: WriteOptions,
    pub read: ReadOptions,
    pub deletion: DeletionOptions,
    pub shape_records: ShapeRecordsOptions,
}

impl ShpOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InputError(format!("Invalid options: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::InputError(format!("Cannot read options {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Deletion options with `overwrite_shp` taken from the filename options,
    /// since overwriting in place rules out deleting after a read.
    pub fn deletion(&self) -> DeletionOptions {
        DeletionOptions { overwrite_shp: self.filename.overwrite_shp, ..self.deletion.clone() }
    }
}
