// Folder selection: collects the files under a chosen folder together with
// the relative path the server needs to rebuild the folder structure, and
// wraps them in readers that report upload progress.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use walkdir::WalkDir;

/// Callback receiving `(bytes_sent, bytes_total)` while a body is uploaded.
/// It runs on the HTTP client's worker thread, hence `Send + Sync`.
pub type UploadObserver = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("folder not found: {0}")]
    NotAFolder(PathBuf),
    #[error("cannot read {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// One selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Path relative to the parent of the selected folder, `/` separated,
    /// e.g. `invoices/2024/a.pdf`.
    pub relative_path: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Ordered set of files picked for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelection {
    files: Vec<SelectedFile>,
}

impl FileSelection {
    /// Walk `root` recursively and select every regular file, hidden files
    /// included. Entries are sorted by name so the upload order is stable.
    pub fn from_folder(root: &Path) -> Result<Self, SelectionError> {
        if !root.is_dir() {
            return Err(SelectionError::NotAFolder(root.to_path_buf()));
        }
        // `.` and friends have no file name of their own.
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let folder_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|source| SelectionError::Walk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|source| SelectionError::Walk {
                    path: entry.path().to_path_buf(),
                    source,
                })?
                .len();
            let inner = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            files.push(SelectedFile {
                relative_path: relative_path(&folder_name, inner),
                path: entry.path().to_path_buf(),
                size,
            });
        }
        Ok(Self { files })
    }

    pub fn from_files(files: Vec<SelectedFile>) -> Self {
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

fn relative_path(folder_name: &str, inner: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !folder_name.is_empty() {
        parts.push(folder_name.to_string());
    }
    parts.extend(
        inner
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

/// Rounded upload percentage, `None` when the total is unknown.
pub fn upload_percent(sent: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let sent = sent.min(total);
    Some(((sent * 100 + total / 2) / total) as u8)
}

/// Reader that adds every byte it yields to a counter shared by all files
/// of one upload and reports the running total to an observer.
pub struct CountingReader<R> {
    inner: R,
    sent: Arc<AtomicU64>,
    total: u64,
    observer: UploadObserver,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R, sent: Arc<AtomicU64>, total: u64, observer: UploadObserver) -> Self {
        Self {
            inner,
            sent,
            total,
            observer,
        }
    }
}

impl CountingReader<LazyFile> {
    /// Reader for one selected file. The file is only opened once the body
    /// is actually streamed.
    pub fn for_file(
        file: &SelectedFile,
        sent: Arc<AtomicU64>,
        total: u64,
        observer: UploadObserver,
    ) -> Self {
        Self::new(LazyFile::new(&file.path), sent, total, observer)
    }
}

/// File opened on first read and closed again at end of file, so a large
/// multipart body holds at most one descriptor at a time.
#[derive(Debug)]
pub struct LazyFile {
    path: PathBuf,
    file: Option<File>,
    finished: bool,
}

impl LazyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            finished: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl Read for LazyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        let n = file.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.file = None;
            self.finished = true;
        }
        Ok(n)
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            let now = self.sent.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
            (self.observer)(now, self.total);
        }
        Ok(n)
    }
}
