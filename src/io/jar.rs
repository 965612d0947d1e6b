use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::{modified_millis, Entry, FileSink, FileSource};
use crate::common::error::{Error, Result};

/// Reads the entries of a jar archive in archive order
pub struct JarFileSource {
    path: PathBuf,
    archive: RefCell<ZipArchive<File>>,
}

impl JarFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let archive = ZipArchive::new(File::open(path)?)?;
        Ok(Self { path: path.to_path_buf(), archive: RefCell::new(archive) })
    }
}

impl FileSource for JarFileSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        let mut archive = self.archive.borrow_mut();
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            let name = file.name().trim_end_matches('/').to_string();
            entries.push(Entry::new(name, file.is_dir()));
        }
        Ok(entries)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.borrow_mut();
        let mut file = archive.by_name(path)?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn last_modified(&self) -> Result<Option<i64>> {
        Ok(modified_millis(&fs::metadata(&self.path)?))
    }
}

/// Writes a jar whose entries all carry the minimum zip timestamp, so equal
/// content always produces an equal archive.
pub struct JarFileSink {
    path: PathBuf,
    writer: Option<ZipWriter<BufWriter<File>>>,
}

impl JarFileSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = ZipWriter::new(BufWriter::new(File::create(path)?));
        Ok(Self { path: path.to_path_buf(), writer: Some(writer) })
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
    }

    fn writer(&mut self) -> Result<&mut ZipWriter<BufWriter<File>>> {
        let path = &self.path;
        self.writer
            .as_mut()
            .ok_or_else(|| Error::config_error(format!("{} is already finished", path.display())))
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.finish()?.flush()?;
        }
        Ok(())
    }
}

impl FileSink for JarFileSink {
    fn create_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let writer = self.writer()?;
        writer.start_file(path, Self::options())?;
        writer.write_all(data)?;
        Ok(())
    }

    fn create_directory(&mut self, path: &str) -> Result<()> {
        let directory = if path.ends_with('/') { path.to_string() } else { format!("{}/", path) };
        self.writer()?.add_directory(directory, Self::options())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.finish()
    }

    fn close(&mut self) {
        if let Err(error) = self.finish() {
            log::debug!("Failed to close {}: {}", self.path.display(), error);
        }
    }
}
