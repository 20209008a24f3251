//! Two-level file tree over the plugin search paths
//!
//! One node per search directory, one child per regular file in it. No
//! recursion into subdirectories; scanning is best-effort and a directory
//! that cannot be read contributes no files.

use std::path::{Path, PathBuf};

/// A regular file found in a search directory
#[derive(Debug, Clone)]
pub struct FileNode {
    path: PathBuf,
    extension: Option<String>,
}

impl FileNode {
    /// Absolute path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased text after the last `.` of the file name, if any
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

/// One search directory and the files directly inside it
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    path: PathBuf,
    files: Vec<FileNode>,
}

impl DirectoryNode {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn files(&self) -> &[FileNode] {
        &self.files
    }
}

/// The scanned tree: directories in search-path order
#[derive(Debug, Clone, Default)]
pub struct FileTree {
    directories: Vec<DirectoryNode>,
}

impl FileTree {
    /// Scan `paths` into a tree.
    ///
    /// Unreadable directories are skipped with a logged diagnostic and
    /// contribute zero files; this never fails.
    pub fn build(paths: &[PathBuf]) -> Self {
        let directories = paths.iter().map(|path| scan_directory(path)).collect();
        Self { directories }
    }

    pub fn directories(&self) -> &[DirectoryNode] {
        &self.directories
    }

    /// All files across all directories, in directory then entry order
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.directories.iter().flat_map(|d| d.files.iter())
    }
}

fn scan_directory(path: &Path) -> DirectoryNode {
    let mut files = Vec::new();

    match std::fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let entry_path = entry.path();
                // is_file follows symlinks; plugin modules are often links
                if !entry_path.is_file() {
                    continue;
                }
                let extension = entry_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase());
                files.push(FileNode {
                    path: entry_path,
                    extension,
                });
            }
            files.sort_by(|a, b| a.path.cmp(&b.path));
        }
        Err(e) => {
            tracing::debug!(dir = %path.display(), error = %e, "Skipping unreadable search directory");
        }
    }

    DirectoryNode {
        path: path.to_path_buf(),
        files,
    }
}
