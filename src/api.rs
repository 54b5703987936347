// API client module: a small blocking HTTP client for the document
// processing service. The controller only sees the `TaskApi` trait, so the
// polling logic can be exercised without a server.

use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::StatusCode;
use std::borrow::Cow;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::progress::{Accepted, ProgressInfo, TaskId};
use crate::selection::{CountingReader, FileSelection, UploadObserver};
use crate::workflow::{self, Workflow};

/// Poll and download requests give up after this long. Uploads are not
/// bounded since folders can be large.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything sent with one submission.
pub struct Submission<'a> {
    pub workflow: Workflow,
    pub selection: &'a FileSelection,
    /// Invoice share of the page height for merged pages. Merge only; the
    /// server falls back to 0.75.
    pub inv_ratio: Option<f32>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("server answered {code} {status_text}")]
    Status { code: u16, status_text: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unexpected submission response: {0}")]
    Malformed(String),
}

impl SubmitError {
    /// Status line shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Status { status_text, .. } => workflow::submit_failed_message(status_text),
            SubmitError::Transport(_) => workflow::NETWORK_ERROR_MESSAGE.to_string(),
            other => workflow::submit_failed_message(&other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("progress endpoint answered {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Transport(String),
    #[error("cannot decode progress: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("server answered {code}: {message}")]
    Status { code: u16, message: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The three endpoints a workflow run talks to.
pub trait TaskApi {
    /// Upload the selection. Only HTTP 202 with a task id counts as accepted.
    fn submit(
        &self,
        submission: &Submission<'_>,
        observer: UploadObserver,
    ) -> Result<TaskId, SubmitError>;

    fn progress(&self, task_id: &TaskId) -> Result<ProgressInfo, PollError>;

    /// Fetch the finished result, returning where it was saved.
    fn download(&self, workflow: Workflow, task_id: &TaskId) -> Result<PathBuf, DownloadError>;
}

impl<T: TaskApi + ?Sized> TaskApi for &T {
    fn submit(
        &self,
        submission: &Submission<'_>,
        observer: UploadObserver,
    ) -> Result<TaskId, SubmitError> {
        (**self).submit(submission, observer)
    }

    fn progress(&self, task_id: &TaskId) -> Result<ProgressInfo, PollError> {
        (**self).progress(task_id)
    }

    fn download(&self, workflow: Workflow, task_id: &TaskId) -> Result<PathBuf, DownloadError> {
        (**self).download(workflow, task_id)
    }
}

/// Blocking client bound to one service base URL and one download folder.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    download_dir: PathBuf,
}

impl ApiClient {
    pub fn new(base_url: &str, download_dir: impl Into<PathBuf>) -> Result<Self> {
        // The blocking client defaults to a 30s total timeout, too short
        // for uploads; shorter requests set their own.
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            download_dir: download_dir.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn download_url(&self, task_id: &TaskId) -> String {
        format!("{}/api/download/{}", self.base_url, task_id)
    }

    fn build_form(
        &self,
        submission: &Submission<'_>,
        observer: UploadObserver,
    ) -> Result<multipart::Form, SubmitError> {
        let total = submission.selection.total_bytes();
        let sent = Arc::new(AtomicU64::new(0));
        let mut form = multipart::Form::new();
        for file in submission.selection.files() {
            // Only metadata here: descriptors are opened one at a time while
            // the body streams.
            fs::metadata(&file.path).map_err(|source| SubmitError::Read {
                path: file.path.clone(),
                source,
            })?;
            let reader = CountingReader::for_file(file, sent.clone(), total, observer.clone());
            let part = multipart::Part::reader_with_length(reader, file.size)
                .file_name(file.relative_path.clone());
            form = form.part("files", part);
        }
        if let (Workflow::Merge, Some(ratio)) = (submission.workflow, submission.inv_ratio) {
            form = form.text("inv_ratio", ratio.to_string());
        }
        Ok(form)
    }
}

impl TaskApi for ApiClient {
    fn submit(
        &self,
        submission: &Submission<'_>,
        observer: UploadObserver,
    ) -> Result<TaskId, SubmitError> {
        let url = format!("{}{}", self.base_url, submission.workflow.submit_path());
        let form = self.build_form(submission, observer)?;
        info!(
            workflow = %submission.workflow,
            files = submission.selection.len(),
            bytes = submission.selection.total_bytes(),
            "uploading selection"
        );

        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        let status = res.status();
        if status != StatusCode::ACCEPTED {
            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            let body = res.text().unwrap_or_default();
            debug!(code = status.as_u16(), %body, "submission rejected");
            return Err(SubmitError::Status {
                code: status.as_u16(),
                status_text,
            });
        }
        let accepted: Accepted = res
            .json()
            .map_err(|e| SubmitError::Malformed(e.to_string()))?;
        if accepted.task_id.is_empty() {
            return Err(SubmitError::Malformed("empty task_id".into()));
        }
        Ok(TaskId::new(accepted.task_id))
    }

    fn progress(&self, task_id: &TaskId) -> Result<ProgressInfo, PollError> {
        let url = format!("{}/api/progress/{}", self.base_url, task_id);
        let res = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .map_err(|e| PollError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            return Err(PollError::Status(res.status().as_u16()));
        }
        let body: serde_json::Value = res.json().map_err(|e| PollError::Decode(e.to_string()))?;
        ProgressInfo::from_value(body).map_err(|e| PollError::Decode(e.to_string()))
    }

    fn download(&self, workflow: Workflow, task_id: &TaskId) -> Result<PathBuf, DownloadError> {
        let url = self.download_url(task_id);
        let mut res = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<serde_json::Value>()
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
            return Err(DownloadError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let name = res
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_file_name)
            .unwrap_or_else(|| format!("{}.{}", task_id, workflow.download_extension()));

        fs::create_dir_all(&self.download_dir).map_err(|source| DownloadError::Io {
            path: self.download_dir.clone(),
            source,
        })?;
        let path = unique_path(&self.download_dir, &name);
        let mut file = File::create(&path).map_err(|source| DownloadError::Io {
            path: path.clone(),
            source,
        })?;
        res.copy_to(&mut file)
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        info!(task_id = %task_id, path = %path.display(), "result saved");
        Ok(path)
    }
}

/// File name announced in a `Content-Disposition` header. Any directory
/// part is dropped.
pub fn attachment_file_name(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for param in header.split(';').map(str::trim) {
        if let Some(value) = param.strip_prefix("filename*=") {
            let value = value.trim_matches('"');
            let encoded = value
                .split_once("''")
                .map(|(_, rest)| rest)
                .unwrap_or(value);
            extended = urlencoding::decode(encoded).ok().map(Cow::into_owned);
        } else if let Some(value) = param.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_string());
        }
    }
    let name = extended.or(plain)?;
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// `dir/name`, or `dir/stem (n).ext` when that file already exists.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path.extension().map(|e| e.to_string_lossy().into_owned());
    (1..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
