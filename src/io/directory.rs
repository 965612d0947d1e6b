use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{modified_millis, Entry, FileSink, FileSource};
use crate::common::error::{Error, Result};

/// Reads a directory tree in sorted order
#[derive(Debug)]
pub struct DirectoryFileSource {
    directory: PathBuf,
}

impl DirectoryFileSource {
    pub fn new(directory: &Path) -> Self {
        Self { directory: directory.to_path_buf() }
    }

    fn walk(&self) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
        WalkDir::new(&self.directory).min_depth(1).sort_by_file_name().into_iter()
    }
}

impl FileSource for DirectoryFileSource {
    fn path(&self) -> &Path {
        &self.directory
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for entry in self.walk() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let relative = entry.path().strip_prefix(&self.directory).map_err(|_| {
                Error::config_error(format!("{} is outside {}", entry.path().display(), self.directory.display()))
            })?;
            let path = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(Entry::new(path, entry.file_type().is_dir()));
        }
        Ok(entries)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.directory.join(path))?)
    }

    fn last_modified(&self) -> Result<Option<i64>> {
        let mut newest = None;
        for entry in self.walk() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_file() {
                newest = newest.max(modified_millis(&entry.metadata().map_err(|e| Error::Io(e.into()))?));
            }
        }
        Ok(newest)
    }
}

/// Writes entries below a directory, creating parents as needed
#[derive(Debug)]
pub struct DirectoryFileSink {
    directory: PathBuf,
}

impl DirectoryFileSink {
    pub fn new(directory: &Path) -> Self {
        Self { directory: directory.to_path_buf() }
    }
}

impl FileSink for DirectoryFileSink {
    fn create_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let file = self.directory.join(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(file, data)?;
        Ok(())
    }

    fn create_directory(&mut self, path: &str) -> Result<()> {
        fs::create_dir_all(self.directory.join(path))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}
