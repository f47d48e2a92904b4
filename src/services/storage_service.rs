//! StorageService — translates uploaded byte streams into durable on-disk
//! content addressed by an opaque reference string. Metadata lives elsewhere
//! (see `image_service`); this layer only knows about bytes under
//! `root/{generated-name}`.

use crate::config::AppConfig;
use bytes::Bytes;
use chrono::{Local, Utc};
use futures::{Stream, StreamExt, pin_mut};
use rand::Rng;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stored content `{0}` not found")]
    ContentMissing(String),
    #[error("invalid storage reference")]
    InvalidReference,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The durable location of stored content: the original filename the caller
/// presented, and the opaque reference the backend generated for it.
#[derive(Clone, Debug)]
pub struct StorageReference {
    pub filename: String,
    pub reference: String,
}

/// Filesystem storage backend.
///
/// Generated names combine a formatted timestamp, a bounded random integer,
/// and the original file extension, so concurrent uploads within the same
/// timestamp bucket never need cross-request coordination.
#[derive(Clone, Debug)]
pub struct StorageService {
    root: PathBuf,
    timestamp_format: String,
    timestamp_timezone: String,
    filename_template: String,
    random_bound: u32,
    fallback_filename: String,
}

const MAX_REFERENCE_LEN: usize = 1024;

impl StorageService {
    /// Create a new StorageService from the configured naming scheme, rooted
    /// at `cfg.upload_root()`.
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            root: cfg.upload_root(),
            timestamp_format: cfg.timestamp_format.clone(),
            timestamp_timezone: cfg.timestamp_timezone.clone(),
            filename_template: cfg.filename_template.clone(),
            random_bound: cfg.random_bound,
            fallback_filename: cfg.fallback_filename.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Basic reference validation to avoid trivial path traversal vectors.
    ///
    /// Rejects references that are empty, absolute, or contain `..`,
    /// backslashes, or control bytes. References are produced by this
    /// backend, so anything outside that shape is malformed by definition.
    fn ensure_reference_safe(&self, reference: &str) -> StorageResult<()> {
        if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
            return Err(StorageError::InvalidReference);
        }
        if reference.starts_with('/') || reference.contains("..") {
            return Err(StorageError::InvalidReference);
        }
        if reference
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidReference);
        }
        Ok(())
    }

    /// Resolve an opaque reference to its on-disk path.
    fn content_path(&self, reference: &str) -> StorageResult<PathBuf> {
        self.ensure_reference_safe(reference)?;
        Ok(self.root.join(reference))
    }

    /// Generate a practically-unique filename for an upload.
    ///
    /// Applies the configured template over a formatted timestamp (UTC or
    /// local per configuration), a random integer below the configured
    /// bound, and the extension of the original filename.
    fn generate_filename(&self, original: &str) -> String {
        let timestamp = if self.timestamp_timezone.eq_ignore_ascii_case("local") {
            Local::now().format(&self.timestamp_format).to_string()
        } else {
            Utc::now().format(&self.timestamp_format).to_string()
        };
        let random = rand::thread_rng().gen_range(0..self.random_bound);
        let extension = Path::new(original)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        self.filename_template
            .replace("{timestamp}", &timestamp)
            .replace("{random}", &random.to_string())
            .replace("{extension}", &extension)
    }

    /// Persist an uploaded byte stream under a generated name.
    ///
    /// Creates the root directory on first use, writes bytes incrementally
    /// to a temporary file, fsyncs, and renames into the final location.
    /// Temp files are cleaned up on error.
    pub async fn store<S>(&self, stream: S, original_filename: &str) -> StorageResult<StorageReference>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        fs::create_dir_all(&self.root).await?;

        let filename = if original_filename.trim().is_empty() {
            self.fallback_filename.clone()
        } else {
            original_filename.to_string()
        };
        let reference = self.generate_filename(&filename);
        let final_path = self.root.join(&reference);
        let tmp_path = self.root.join(format!(".tmp-{}", Uuid::new_v4()));

        let mut file = File::create(&tmp_path).await?;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        debug!("stored upload `{}` as `{}`", filename, reference);
        Ok(StorageReference {
            filename,
            reference,
        })
    }

    /// Open stored content for reading.
    ///
    /// Fails if the reference is malformed or the content no longer exists
    /// (including a retrieve racing a delete).
    pub async fn retrieve(&self, reference: &str) -> StorageResult<File> {
        let path = self.content_path(reference)?;
        File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ContentMissing(reference.to_string())
            } else {
                StorageError::Io(err)
            }
        })
    }

    /// Remove stored content. Content that is already gone counts as
    /// success; any other I/O failure is surfaced, not swallowed.
    pub async fn delete(&self, reference: &str) -> StorageResult<()> {
        let path = self.content_path(reference)?;
        match fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("content `{}` already missing", reference);
                Ok(())
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}
