// Output filename collision handling

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

/// Configuration for output filename resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilenameOptions {
    /// Write over an existing file instead of probing for a free name
    pub overwrite_shp: bool,

    /// Number of suffixed names tried before giving up
    pub max_new_files: u32,

    /// Skip the warning logged when overwriting
    pub suppress_warning: bool,

    /// Inserted between stem and extension; `{number}` is the attempt
    pub duplicate_suffix: String,
}

impl Default for FilenameOptions {
    fn default() -> Self {
        Self {
            overwrite_shp: true,
            max_new_files: 20,
            suppress_warning: true,
            duplicate_suffix: "_({number})".to_string(),
        }
    }
}

/// Picks the path a write should go to.
#[derive(Debug, Clone, Default)]
pub struct FilenameResolver {
    options: FilenameOptions,
}

impl FilenameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(options: FilenameOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FilenameOptions {
        &self.options
    }

    /// The `number`th alternative to `desired`, e.g. `out_(2).shp`.
    pub fn candidate(&self, desired: &Path, number: u32) -> PathBuf {
        let stem = desired.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let suffix = self.options.duplicate_suffix.replace("{number}", &number.to_string());
        let mut name = format!("{}{}", stem, suffix);
        if let Some(ext) = desired.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        desired.with_file_name(name)
    }

    /// Returns `desired` if no file is there. Otherwise returns `desired`
    /// again when overwriting, or the first free suffixed name. When every
    /// suffixed name is taken the last one is returned and will be
    /// overwritten.
    pub fn resolve(&self, desired: &Path) -> PathBuf {
        if !desired.is_file() {
            return desired.to_path_buf();
        }
        if self.options.overwrite_shp {
            if !self.options.suppress_warning {
                warn!("Overwriting file: {}", desired.display());
            }
            return desired.to_path_buf();
        }

        let mut last = desired.to_path_buf();
        for number in 1..=self.options.max_new_files {
            last = self.candidate(desired, number);
            if !last.is_file() {
                return last;
            }
        }
        warn!(
            "max_new_files == {} exceeded, overwriting file: {}",
            self.options.max_new_files,
            last.display()
        );
        last
    }
}

/// Resolves `desired` with `options`.
pub fn resolve(desired: &Path, options: &FilenameOptions) -> PathBuf {
    FilenameResolver::with_config(options.clone()).resolve(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn no_overwrite(max_new_files: u32) -> FilenameResolver {
        FilenameResolver::with_config(FilenameOptions {
            overwrite_shp: false,
            max_new_files,
            ..Default::default()
        })
    }

    #[test]
    fn test_free_path_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let desired = dir.path().join("out.shp");
        assert_eq!(no_overwrite(20).resolve(&desired), desired);
        assert_eq!(FilenameResolver::new().resolve(&desired), desired);
    }

    #[test]
    fn test_first_free_suffix_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let desired = dir.path().join("out.shp");
        fs::write(&desired, b"").unwrap();
        assert_eq!(no_overwrite(20).resolve(&desired), dir.path().join("out_(1).shp"));

        fs::write(dir.path().join("out_(1).shp"), b"").unwrap();
        assert_eq!(no_overwrite(20).resolve(&desired), dir.path().join("out_(2).shp"));
    }

    #[test]
    fn test_overwrite_returns_original() {
        let dir = tempfile::tempdir().unwrap();
        let desired = dir.path().join("out.shp");
        fs::write(&desired, b"").unwrap();
        fs::write(dir.path().join("out_(1).shp"), b"").unwrap();
        assert_eq!(FilenameResolver::new().resolve(&desired), desired);
    }

    #[test]
    fn test_exhausted_cap_returns_last_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let desired = dir.path().join("out.shp");
        fs::write(&desired, b"").unwrap();
        for n in 1..=3 {
            fs::write(dir.path().join(format!("out_({}).shp", n)), b"").unwrap();
        }
        assert_eq!(no_overwrite(3).resolve(&desired), dir.path().join("out_(3).shp"));
        assert_eq!(no_overwrite(0).resolve(&desired), desired);
    }

    #[test]
    fn test_custom_suffix_and_no_extension() {
        let resolver = FilenameResolver::with_config(FilenameOptions {
            duplicate_suffix: "-v{number}".to_string(),
            ..Default::default()
        });
        assert_eq!(resolver.candidate(Path::new("/data/roads"), 4), PathBuf::from("/data/roads-v4"));
        assert_eq!(resolver.candidate(Path::new("a.b.shp"), 1), PathBuf::from("a.b-v1.shp"));
    }
}
