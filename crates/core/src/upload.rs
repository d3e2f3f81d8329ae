//! Upload candidate collection.
//!
//! Inputs are files or directories. Directories are walked recursively and
//! every visited directory becomes its own [`UploadDirectory`] holding only its
//! direct files, so a nested archive tree is presented as a flat list of
//! folders. Each file is checked against [`UploadRules`] as it is collected;
//! the check can be overridden per file before submitting. Overlapping inputs
//! (a directory plus a file inside it) collect each path once.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("upload path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("failed to read metadata of {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Client-side acceptance rules applied before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadRules {
    pub min_size_bytes: u64,
    pub extension: String,
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            min_size_bytes: 50 * 1024,
            extension: "zip".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    WrongExtension { expected: String },
    TooSmall { size: u64, min: u64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::WrongExtension { expected } => write!(f, "not a .{expected} archive"),
            Rejection::TooSmall { size, min } => write!(
                f,
                "too small ({} < {})",
                format_size(*size),
                format_size(*min)
            ),
        }
    }
}

impl UploadRules {
    pub fn check(&self, name: &str, size: u64) -> Result<(), Rejection> {
        let suffix = format!(".{}", self.extension.trim_start_matches('.').to_lowercase());
        if !name.to_lowercase().ends_with(&suffix) {
            return Err(Rejection::WrongExtension {
                expected: self.extension.trim_start_matches('.').to_string(),
            });
        }

        if size < self.min_size_bytes {
            return Err(Rejection::TooSmall {
                size,
                min: self.min_size_bytes,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub accepted: bool,
    pub rejection: Option<Rejection>,
}

impl UploadFile {
    pub fn checked(path: PathBuf, size: u64, rules: &UploadRules) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let rejection = rules.check(&name, size).err();

        Self {
            path,
            name,
            size,
            accepted: rejection.is_none(),
            rejection,
        }
    }

    pub fn size_label(&self) -> String {
        format_size(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDirectory {
    pub name: String,
    pub path: PathBuf,
    pub files: Vec<UploadFile>,
}

impl UploadDirectory {
    pub fn accepted_count(&self) -> usize {
        self.files.iter().filter(|f| f.accepted).count()
    }

    pub fn rejected(&self) -> impl Iterator<Item = &UploadFile> {
        self.files.iter().filter(|f| !f.accepted)
    }
}

/// The set of files picked for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSelection {
    pub files: Vec<UploadFile>,
    pub directories: Vec<UploadDirectory>,
}

impl UploadSelection {
    pub fn collect<P: AsRef<Path>>(inputs: &[P], rules: &UploadRules) -> Result<Self, CollectError> {
        let mut selection = UploadSelection::default();
        let mut seen = HashSet::new();

        for input in inputs {
            let input = input.as_ref();
            let metadata = std::fs::metadata(input).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    CollectError::PathNotFound(input.to_path_buf())
                } else {
                    CollectError::Metadata {
                        path: input.to_path_buf(),
                        source,
                    }
                }
            })?;

            if metadata.is_dir() {
                selection.walk_directory(input, rules, &mut seen);
            } else if seen.insert(identity(input)) {
                selection
                    .files
                    .push(UploadFile::checked(input.to_path_buf(), metadata.len(), rules));
            } else {
                debug!(path = %input.display(), "upload path already selected");
            }
        }

        debug!(
            directories = selection.directory_count(),
            accepted = selection.accepted_count(),
            total = selection.total_count(),
            "collected upload candidates"
        );

        Ok(selection)
    }

    fn walk_directory(&mut self, root: &Path, rules: &UploadRules, seen: &mut HashSet<PathBuf>) {
        let mut discovered: Vec<UploadDirectory> = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(root = %root.display(), error = %error, "skipping unreadable upload entry");
                    continue;
                }
            };

            if !seen.insert(identity(entry.path())) {
                debug!(path = %entry.path().display(), "upload path already selected");
                continue;
            }

            if entry.file_type().is_dir() {
                discovered.push(UploadDirectory {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path().to_path_buf(),
                    files: Vec::new(),
                });
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(error) => {
                    warn!(path = %entry.path().display(), error = %error, "skipping upload file without metadata");
                    continue;
                }
            };

            let file = UploadFile::checked(entry.path().to_path_buf(), size, rules);
            let parent = entry.path().parent();
            match discovered
                .iter_mut()
                .rev()
                .find(|dir| Some(dir.path.as_path()) == parent)
            {
                Some(dir) => dir.files.push(file),
                None => self.files.push(file),
            }
        }

        self.directories.extend(discovered);
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn total_count(&self) -> usize {
        self.files.len() + self.directories.iter().map(|d| d.files.len()).sum::<usize>()
    }

    pub fn accepted_count(&self) -> usize {
        self.files.iter().filter(|f| f.accepted).count()
            + self
                .directories
                .iter()
                .map(UploadDirectory::accepted_count)
                .sum::<usize>()
    }

    /// Top-level files first, then directory files in discovery order.
    pub fn accepted_files(&self) -> Vec<&UploadFile> {
        self.files
            .iter()
            .chain(self.directories.iter().flat_map(|d| d.files.iter()))
            .filter(|f| f.accepted)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    /// Override the rule check for one file. Returns false if it is unknown.
    pub fn set_accepted(&mut self, path: &Path, accepted: bool) -> bool {
        match self.file_mut(path) {
            Some(file) => {
                file.accepted = accepted;
                true
            }
            None => false,
        }
    }

    pub fn remove_file(&mut self, path: &Path) -> bool {
        let before = self.total_count();
        self.files.retain(|f| f.path != path);
        for dir in &mut self.directories {
            dir.files.retain(|f| f.path != path);
        }
        self.total_count() != before
    }

    /// Drop a directory together with its files.
    pub fn remove_directory(&mut self, path: &Path) -> bool {
        let before = self.directories.len();
        self.directories.retain(|d| d.path != path);
        self.directories.len() != before
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.directories.clear();
    }

    fn file_mut(&mut self, path: &Path) -> Option<&mut UploadFile> {
        if let Some(file) = self.files.iter_mut().find(|f| f.path == path) {
            return Some(file);
        }
        self.directories
            .iter_mut()
            .flat_map(|d| d.files.iter_mut())
            .find(|f| f.path == path)
    }
}

/// `1536` → `"1.50 KB"`.
/// Key used to spot the same file reached through different input paths.
fn identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", SIZE_UNITS[unit])
}
