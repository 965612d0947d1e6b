use std::path::{Path, PathBuf};

use super::{Entry, FileSource};
use crate::common::error::{Error, Result};

/// Source for a location that does not exist yet
#[derive(Debug)]
pub struct EmptyFileSource {
    path: PathBuf,
}

impl EmptyFileSource {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}

impl FileSource for EmptyFileSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        Ok(Vec::new())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Err(Error::config_error(format!("{} has no entry {}", self.path.display(), path)))
    }

    fn last_modified(&self) -> Result<Option<i64>> {
        Ok(None)
    }
}
