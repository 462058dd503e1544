//! Image re-hosting through a multipart upload endpoint.
//!
//! # Flow
//!
//! ```text
//! SourceRef ──▶ hosted? ──yes──▶ unchanged
//!                 │ no
//!                 ▼
//!          fetch / read bytes ─▶ pick extension ─▶ stage <uuid>.<ext>
//!                                                      │
//!                  locator ◀── parse envelope ◀── POST multipart
//! ```
//!
//! The staged file is removed on every exit path. Network errors and non-2xx
//! statuses are retried within the attempt budget; everything else fails fast.

use crate::{
    classify::{UrlClassifier, extension_of, is_remote},
    config::{ConfigError, UploadConfig},
    debug,
    utils::{
        http::{Fetch, FetchError},
        path::{resolve_local, strip_title},
        retry::{RetryPolicy, with_retry},
    },
};
use reqwest::{
    StatusCode,
    blocking::{Client, multipart::Form},
};
use serde::Deserialize;
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Source References
// ============================================================================

/// Where image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Remote(String),
    Local(PathBuf),
}

impl SourceRef {
    /// Interpret a reference found in an article stored in `doc_dir`.
    pub fn resolve(reference: &str, doc_dir: &Path) -> Self {
        let reference = strip_title(reference);
        if is_remote(reference) {
            Self::Remote(reference.to_owned())
        } else {
            Self::Local(resolve_local(reference, doc_dir))
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload request failed")]
    Network(#[source] reqwest::Error),

    #[error("upload endpoint answered {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed upload response: {0}")]
    Malformed(String),

    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("upload succeeded without returning a locator")]
    EmptyResult,

    #[error("cannot access `{0}`")]
    Io(PathBuf, #[source] io::Error),
}

impl UploadError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Status(_) => true,
            Self::Fetch(err) => err.is_transient(),
            Self::Malformed(_) | Self::Rejected(_) | Self::EmptyResult | Self::Io(..) => false,
        }
    }
}

// ============================================================================
// Upload Seam
// ============================================================================

/// Turns a source reference into a hosted locator.
pub trait Upload: Send + Sync {
    fn upload(&self, source: &SourceRef) -> Result<String, UploadError>;
}

// ============================================================================
// Response Envelope
// ============================================================================

/// The two response shapes hosting endpoints are known to send.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    /// `{success, message, result: [url]}`
    List {
        success: bool,
        #[serde(default)]
        message: String,
        #[serde(default)]
        result: Vec<String>,
    },
    /// `{body: {obj: {filePath}}, respHead: {respCode, respMsg}}`
    Gateway {
        #[serde(default)]
        body: Option<GatewayBody>,
        #[serde(rename = "respHead")]
        head: GatewayHead,
    },
}

#[derive(Debug, Deserialize)]
struct GatewayBody {
    #[serde(default)]
    obj: Option<GatewayObj>,
}

#[derive(Debug, Deserialize)]
struct GatewayObj {
    #[serde(rename = "filePath", default)]
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct GatewayHead {
    #[serde(rename = "respCode")]
    code: String,
    #[serde(rename = "respMsg", default)]
    message: String,
}

/// Success code of the gateway envelope.
const GATEWAY_OK: &str = "000";

/// Extract the locator from a response body.
fn parse_envelope(body: &str) -> Result<String, UploadError> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|err| {
        let preview: String = body.chars().take(120).collect();
        UploadError::Malformed(format!("{err}: {preview}"))
    })?;

    let locator = match envelope {
        Envelope::List {
            success: false,
            message,
            ..
        } => return Err(UploadError::Rejected(message)),
        Envelope::List { result, .. } => result.into_iter().next(),
        Envelope::Gateway { head, .. } if head.code != GATEWAY_OK => {
            return Err(UploadError::Rejected(format!("{}: {}", head.code, head.message)));
        }
        Envelope::Gateway { body, .. } => body.and_then(|b| b.obj).map(|o| o.file_path),
    };

    locator
        .map(|l| l.trim().to_owned())
        .filter(|l| !l.is_empty())
        .ok_or(UploadError::EmptyResult)
}

// ============================================================================
// Staging
// ============================================================================

/// A temp file that removes itself when dropped.
struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    fn create(dir: &Path, ext: &str, bytes: &[u8]) -> Result<Self, UploadError> {
        let name = format!("{}.{ext}", Uuid::new_v4().simple());
        let path = dir.join(name);
        fs::write(&path, bytes).map_err(|err| UploadError::Io(path.clone(), err))?;
        Ok(Self { path })
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            debug!("upload"; "cannot remove {}: {err}", self.path.display());
        }
    }
}

// ============================================================================
// HTTP Uploader
// ============================================================================

/// Fallback extension when nothing identifies the bytes.
const UNKNOWN_EXT: &str = "bin";

/// [`Upload`] over a multipart POST endpoint.
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    field: String,
    staging_dir: PathBuf,
    policy: RetryPolicy,
    classifier: Arc<UrlClassifier>,
    fetcher: Arc<dyn Fetch>,
}

impl HttpUploader {
    pub fn new(
        config: &UploadConfig,
        policy: RetryPolicy,
        classifier: Arc<UrlClassifier>,
        fetcher: Arc<dyn Fetch>,
    ) -> anyhow::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or(ConfigError::Missing("[upload.endpoint]"))?;
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            endpoint,
            field: config.field.clone(),
            staging_dir: config.staging_dir(),
            policy,
            classifier,
            fetcher,
        })
    }

    fn load(&self, source: &SourceRef) -> Result<Vec<u8>, UploadError> {
        match source {
            SourceRef::Remote(url) => Ok(self.fetcher.fetch(url)?),
            SourceRef::Local(path) => fs::read(path).map_err(|err| UploadError::Io(path.clone(), err)),
        }
    }

    /// Query hint, then path extension, then magic number, then `bin`.
    fn pick_extension(&self, source: &SourceRef, bytes: &[u8]) -> String {
        let declared = match source {
            SourceRef::Remote(url) => self
                .classifier
                .declared_format(url)
                .or_else(|| extension_of(url)),
            SourceRef::Local(path) => extension_of(&path.to_string_lossy()),
        };
        declared
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .or_else(|| self.classifier.probe_bytes(bytes).map(str::to_owned))
            .unwrap_or_else(|| UNKNOWN_EXT.to_owned())
    }

    fn post(&self, staged: &StagedFile) -> Result<String, UploadError> {
        let form = Form::new()
            .file(self.field.clone(), &staged.path)
            .map_err(|err| UploadError::Io(staged.path.clone(), err))?;

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(UploadError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status));
        }
        let body = response.text().map_err(UploadError::Network)?;
        parse_envelope(&body)
    }

    fn attempt(&self, source: &SourceRef) -> Result<String, UploadError> {
        let bytes = self.load(source)?;
        let ext = self.pick_extension(source, &bytes);
        let staged = StagedFile::create(&self.staging_dir, &ext, &bytes)?;
        debug!("upload"; "staged {} bytes of {source} as {}", bytes.len(), staged.path.display());
        self.post(&staged)
    }
}

impl Upload for HttpUploader {
    fn upload(&self, source: &SourceRef) -> Result<String, UploadError> {
        if let SourceRef::Remote(url) = source
            && self.classifier.is_hosted(url)
        {
            return Ok(url.clone());
        }

        with_retry(self.policy, UploadError::is_transient, |attempt| {
            if attempt > 1 {
                debug!("upload"; "retrying {source} (attempt {attempt})");
            }
            self.attempt(source)
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
