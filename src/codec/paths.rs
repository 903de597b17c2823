// Companion file naming for a shapefile set
//
// A shapefile is several files sharing a stem: .shp geometry, .shx index,
// .dbf attributes, plus an optional .shp.names.csv sidecar.

use std::path::{Path, PathBuf};

/// Extensions (after the stem) of every file that belongs to one shapefile.
pub const COMPANION_SUFFIXES: [&str; 4] = [".shp", ".dbf", ".shx", ".shp.names.csv"];

/// The file paths of one shapefile set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapefilePaths {
    stem: PathBuf,
}

impl ShapefilePaths {
    /// Derives the set from any of its members, or from a bare stem.
    /// Any extension on `path` is replaced.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = path.to_string_lossy();
        let lower = text.to_ascii_lowercase();
        // .shp.names.csv has two dots, strip it before the generic case
        if lower.ends_with(".shp.names.csv") {
            let stem = &text[..text.len() - ".shp.names.csv".len()];
            return ShapefilePaths { stem: PathBuf::from(stem) };
        }
        ShapefilePaths { stem: path.with_extension("") }
    }

    pub fn stem(&self) -> &Path {
        &self.stem
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.stem.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn shp(&self) -> PathBuf {
        self.with_suffix(".shp")
    }

    pub fn shx(&self) -> PathBuf {
        self.with_suffix(".shx")
    }

    pub fn dbf(&self) -> PathBuf {
        self.with_suffix(".dbf")
    }

    pub fn names_csv(&self) -> PathBuf {
        self.with_suffix(".shp.names.csv")
    }

    /// Every companion path, in deletion order.
    pub fn all(&self) -> Vec<PathBuf> {
        COMPANION_SUFFIXES.iter().map(|s| self.with_suffix(s)).collect()
    }
}
