//! Output sinks for run artifacts.
//!
//! Replay results, interaction tables, dumps and manifests are written to
//! sinks addressed by a relative path (`run-1/counter.tsv`). Production
//! code writes files under the configured output directory; tests capture
//! the bytes in memory.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// A writable artifact.
pub type Sink = Box<dyn Write + Send>;

/// Opens sinks by relative path.
pub trait SinkProvider: Send + Sync {
    /// Create (or truncate) the artifact at `path`.
    fn open(&self, path: &Path) -> io::Result<Sink>;
}

/// Writes artifacts as files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySinks {
    root: PathBuf,
}

impl DirectorySinks {
    /// Root artifacts at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SinkProvider for DirectorySinks {
    fn open(&self, path: &Path) -> io::Result<Sink> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(BufWriter::new(File::create(full)?)))
    }
}

type Files = Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>;

/// Captures artifacts in memory. Content becomes visible on flush.
#[derive(Debug, Clone, Default)]
pub struct MemorySinks {
    files: Files,
}

impl MemorySinks {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flushed content of `path`, if it was written.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every path written so far, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files.keys().cloned().collect()
    }
}

struct MemorySink {
    path: PathBuf,
    buffer: Vec<u8>,
    files: Files,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files.insert(self.path.clone(), self.buffer.clone());
        Ok(())
    }
}

impl SinkProvider for MemorySinks {
    fn open(&self, path: &Path) -> io::Result<Sink> {
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn directory_sinks_create_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = DirectorySinks::new(dir.path());
        let mut sink = sinks.open(Path::new("run-1/q.tsv")).unwrap();
        sink.write_all(b"# slot\n").unwrap();
        sink.flush().unwrap();
        drop(sink);
        let written = fs::read_to_string(dir.path().join("run-1/q.tsv")).unwrap();
        assert_eq!(written, "# slot\n");
    }

    #[test]
    fn memory_sinks_publish_on_flush() {
        let sinks = MemorySinks::new();
        let mut sink = sinks.open(Path::new("a.tsv")).unwrap();
        sink.write_all(b"x").unwrap();
        assert!(sinks.contents("a.tsv").is_none());
        sink.flush().unwrap();
        assert_eq!(sinks.contents("a.tsv").as_deref(), Some("x"));
        assert_eq!(sinks.paths(), vec![PathBuf::from("a.tsv")]);
    }
}
