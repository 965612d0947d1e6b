//! File sources and sinks for class directories and jar archives
//!
//! Inputs, outputs and classpath entries are either directory trees or jar
//! archives; the pipeline only sees the [`FileSource`] and [`FileSink`]
//! traits.

mod directory;
mod empty;
mod jar;

use std::path::Path;
use std::rc::Rc;

pub use directory::{DirectoryFileSink, DirectoryFileSource};
pub use empty::EmptyFileSource;
pub use jar::{JarFileSink, JarFileSource};

use crate::common::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Class,
    File,
    Directory,
}

/// One entry of a source, addressed by its `/`-separated relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub kind: EntryType,
}

impl Entry {
    pub fn new(path: impl Into<String>, is_directory: bool) -> Self {
        let path = path.into();
        let kind = if is_directory {
            EntryType::Directory
        } else if has_class_extension(&path) {
            EntryType::Class
        } else {
            EntryType::File
        };
        Self { path, kind }
    }

    /// Internal name of the class stored in a class entry
    pub fn class_name(&self) -> Option<&str> {
        if self.kind != EntryType::Class {
            return None;
        }
        Some(&self.path[..self.path.len() - ".class".len()])
    }
}

fn has_class_extension(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() > ".class".len() && bytes[bytes.len() - ".class".len()..].eq_ignore_ascii_case(b".class")
}

pub trait FileSource {
    /// Location this source reads from
    fn path(&self) -> &Path;

    fn entries(&self) -> Result<Vec<Entry>>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Newest modification time of the source content, in milliseconds since the epoch
    fn last_modified(&self) -> Result<Option<i64>>;
}

pub trait FileSink {
    fn create_file(&mut self, path: &str, data: &[u8]) -> Result<()>;

    fn create_directory(&mut self, path: &str) -> Result<()>;

    /// Writes out everything buffered; archives are finalized here
    fn flush(&mut self) -> Result<()>;

    /// Releases the sink. Failures are logged and otherwise ignored.
    fn close(&mut self);
}

enum FileType {
    Directory,
    Jar,
}

fn file_type(path: &Path) -> Result<FileType> {
    if !path.exists() || path.is_dir() {
        return Ok(FileType::Directory);
    }
    match path.extension().and_then(|extension| extension.to_str()) {
        Some(extension) if extension.eq_ignore_ascii_case("jar") => Ok(FileType::Jar),
        _ => Err(Error::config_error(format!("Unknown file type for file {}", path.display()))),
    }
}

/// Opens a directory or jar for reading; a missing path reads as empty
pub fn create_source(path: &Path) -> Result<Rc<dyn FileSource>> {
    if !path.exists() {
        return Ok(Rc::new(EmptyFileSource::new(path)));
    }
    let source: Rc<dyn FileSource> = match file_type(path)? {
        FileType::Directory => Rc::new(DirectoryFileSource::new(path)),
        FileType::Jar => Rc::new(JarFileSource::open(path)?),
    };
    Ok(source)
}

/// Opens the output for `input`; the output has the same kind as the input
pub fn create_sink(input: &Path, output: &Path) -> Result<Box<dyn FileSink>> {
    let sink: Box<dyn FileSink> = match file_type(input)? {
        FileType::Directory => Box::new(DirectoryFileSink::new(output)),
        FileType::Jar => Box::new(JarFileSink::create(output)?),
    };
    Ok(sink)
}

/// Milliseconds since the epoch of a file's modification time
fn modified_millis(metadata: &std::fs::Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_millis()).ok()
}
