//! Library/Storage Gateway
//!
//! Owns the dedicated output directory: creates it lazily, lists the final
//! rendered artifacts, derives intermediate/final paths for a track name and
//! deletes files idempotently. A re-render of the same track name replaces the
//! earlier artifact; there is no versioning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::EngineConfig;
use crate::error::{Result, SongxError};

/// URI scheme handing a directory to the Files app
pub const REVEAL_SCHEME: &str = "shareddocuments://";

/// The offline renderer always writes float WAV
pub const INTERMEDIATE_EXTENSION: &str = "wav";

/// A rendered artifact in the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub path: PathBuf,
    /// File stem without the output prefix
    pub track_name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Gateway to `<documents>/<output folder>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl Library {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.output_dir(),
            config.output_prefix.clone(),
            config.output_extension.clone(),
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Create the output directory if it is missing
    ///
    /// Calling this again once the directory exists is a no-op.
    pub fn ensure_output_directory(&self) -> Result<()> {
        if self.dir.is_dir() {
            debug!("Output directory already exists: {:?}", self.dir);
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(|source| SongxError::DirectoryCreate {
            path: self.dir.clone(),
            source,
        })?;
        info!("Created output directory {:?}", self.dir);
        Ok(())
    }

    /// `<dir>/<track>.wav`: what the offline renderer writes
    pub fn intermediate_path(&self, track_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", track_name, INTERMEDIATE_EXTENSION))
    }

    /// `<dir>/<prefix><track>.<ext>`: the published artifact
    pub fn final_output_path(&self, track_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", self.prefix, track_name, self.extension))
    }

    fn is_final_artifact(&self, path: &Path) -> bool {
        let name_ok = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(&self.prefix))
            .unwrap_or(false);
        let ext_ok = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false);
        name_ok && ext_ok
    }

    fn entry_for(&self, path: &Path) -> Option<LibraryEntry> {
        let metadata = std::fs::metadata(path).ok()?;
        let stem = path.file_stem()?.to_string_lossy();
        let track_name = stem.strip_prefix(self.prefix.as_str()).unwrap_or(&*stem).to_string();
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Some(LibraryEntry {
            path: path.to_path_buf(),
            track_name,
            size_bytes: metadata.len(),
            modified,
        })
    }

    /// Final artifacts in the output directory, sorted by track name
    ///
    /// A missing directory lists as empty.
    pub fn list_outputs(&self) -> Vec<LibraryEntry> {
        if !self.dir.is_dir() {
            warn!("Output directory {:?} does not exist", self.dir);
            return Vec::new();
        }

        let unique: BTreeMap<PathBuf, LibraryEntry> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.is_final_artifact(entry.path()))
            .filter_map(|entry| self.entry_for(entry.path()))
            .map(|entry| (entry.path.clone(), entry))
            .collect();

        let mut entries: Vec<LibraryEntry> = unique.into_values().collect();
        entries.sort_by(|a, b| a.track_name.cmp(&b.track_name).then(a.path.cmp(&b.path)));
        debug!("Listed {} outputs in {:?}", entries.len(), self.dir);
        entries
    }

    pub fn list_output_paths(&self) -> Vec<PathBuf> {
        self.list_outputs().into_iter().map(|e| e.path).collect()
    }

    /// Entry of the final artifact rendered from `track_name`, if present
    pub fn find_output(&self, track_name: &str) -> Option<LibraryEntry> {
        let path = self.final_output_path(track_name);
        if path.is_file() {
            self.entry_for(&path)
        } else {
            None
        }
    }

    /// See [`delete_if_exists`]
    pub fn delete_if_exists(&self, path: &Path) -> bool {
        delete_if_exists(path)
    }

    /// Delete the final artifact rendered from `track_name`
    pub fn delete_output(&self, track_name: &str) -> bool {
        delete_if_exists(&self.final_output_path(track_name))
    }

    /// Files-app hand-off URI for the directory containing `path`
    ///
    /// Directories are revealed themselves.
    pub fn reveal_uri(&self, path: &Path) -> String {
        let dir = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or(&self.dir)
        };
        format!("{}{}", REVEAL_SCHEME, dir.display())
    }
}

/// Delete `path` if it exists; returns whether something was removed
///
/// Absence and removal failures are logged, never raised.
pub fn delete_if_exists(path: &Path) -> bool {
    if !path.exists() {
        debug!("Nothing to delete at {:?}", path);
        return false;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Deleted {:?}", path);
            true
        }
        Err(e) => {
            warn!("Could not delete {:?}: {}", path, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn library(temp: &TempDir) -> Library {
        Library::from_config(&EngineConfig::with_documents_dir(temp.path()))
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"data").unwrap();
    }

    #[test]
    fn test_ensure_output_directory_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let lib = library(&temp);
        lib.ensure_output_directory().unwrap();
        lib.ensure_output_directory().unwrap();

        let dirs: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(dirs.len(), 1);
        assert!(lib.output_dir().ends_with("Edited Songs"));
    }

    #[test]
    fn test_paths_for_track() {
        let lib = Library::new("/docs/Edited Songs", "SongX_", "flac");
        assert_eq!(
            lib.intermediate_path("Tune"),
            PathBuf::from("/docs/Edited Songs/Tune.wav")
        );
        assert_eq!(
            lib.final_output_path("Tune"),
            PathBuf::from("/docs/Edited Songs/SongX_Tune.flac")
        );
    }

    #[test]
    fn test_list_filters_prefix_and_extension() {
        let temp = TempDir::new().unwrap();
        let lib = library(&temp);
        lib.ensure_output_directory().unwrap();

        touch(&lib.final_output_path("Beta"));
        touch(&lib.final_output_path("Alpha"));
        touch(&lib.output_dir().join("SongX_Upper.FLAC"));
        touch(&lib.intermediate_path("Pending"));
        touch(&lib.output_dir().join("SongX_Older.wav"));
        touch(&lib.output_dir().join("SongX_notes.txt"));
        std::fs::create_dir(lib.output_dir().join("SongX_dir.flac")).unwrap();

        let names: Vec<String> = lib.list_outputs().into_iter().map(|e| e.track_name).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Upper"]);
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(library(&temp).list_outputs().is_empty());
    }

    #[test]
    fn test_delete_if_exists_is_noop_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.wav");
        assert!(!delete_if_exists(&path));

        touch(&path);
        assert!(delete_if_exists(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_reveal_uri_points_at_directory() {
        let temp = TempDir::new().unwrap();
        let lib = library(&temp);
        lib.ensure_output_directory().unwrap();
        let uri = lib.reveal_uri(&lib.final_output_path("Song"));
        assert_eq!(
            uri,
            format!("shareddocuments://{}", lib.output_dir().display())
        );
    }
}
