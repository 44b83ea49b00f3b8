//! File stores the server serves resources from
//!
//! Paths are resource names as decoded from the request line, e.g.
//! `/index.html`. Both stores strip the leading slash and treat the rest
//! as a name relative to their root.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// How a resource is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate
    Write,
}

/// An open resource
pub trait StoreFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// Persistent storage addressed by resource path
pub trait FileStore {
    fn open(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn StoreFile>>;

    fn delete(&self, path: &str) -> io::Result<()>;

    /// Size of the resource in bytes
    fn stat(&self, path: &str) -> io::Result<u64>;
}

fn relative_name(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Serves files below a root directory
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a resource name to a path below the root, refusing `..`.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(relative_name(path));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{path} is outside the store"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl StoreFile for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl FileStore for DirStore {
    fn open(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn StoreFile>> {
        let path = self.resolve(path)?;
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Write => File::create(path)?,
        };
        Ok(Box::new(file))
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path)?)
    }

    fn stat(&self, path: &str) -> io::Result<u64> {
        let metadata = std::fs::metadata(self.resolve(path)?)?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a file"));
        }
        Ok(metadata.len())
    }
}

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// In-memory store; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Files,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(relative_name(path).to_string(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(relative_name(path))
            .cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }
}

enum MemoryFile {
    Reader { data: Vec<u8>, position: usize },
    Writer { files: Files, name: String },
}

impl StoreFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MemoryFile::Reader { data, position } => {
                let n = buf.len().min(data.len() - *position);
                buf[..n].copy_from_slice(&data[*position..*position + n]);
                *position += n;
                Ok(n)
            }
            MemoryFile::Writer { .. } => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "opened for writing",
            )),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            MemoryFile::Writer { files, name } => {
                files
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(name.clone())
                    .or_default()
                    .extend_from_slice(buf);
                Ok(())
            }
            MemoryFile::Reader { .. } => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "opened for reading",
            )),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileStore for MemoryStore {
    fn open(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn StoreFile>> {
        let name = relative_name(path).to_string();
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match mode {
            OpenMode::Read => MemoryFile::Reader {
                data: files
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?,
                position: 0,
            },
            OpenMode::Write => {
                files.insert(name.clone(), Vec::new());
                MemoryFile::Writer {
                    files: Arc::clone(&self.files),
                    name,
                }
            }
        };
        Ok(Box::new(file))
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(relative_name(path))
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn stat(&self, path: &str) -> io::Result<u64> {
        self.get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}
