//! Destinations for finished output.
//!
//! A [`Sink`] persists either a single blob or a whole archive stream.
//! [`DirectorySink`] writes into a directory through a `.part` file that is
//! renamed into place only once the data is complete, so an interrupted or
//! aborted archive never leaves a valid-looking file behind.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info};

use crate::archive::{ArchiveError, ArchiveStream};
use crate::fetch::naming::numbered;

/// Suffix of in-progress files.
pub const PART_SUFFIX: &str = ".part";

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// The destination refused or failed to store output.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to finalize {}: {source}", path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive stream failed or was aborted before completing.
    #[error("archive stream failed: {0}")]
    Stream(#[from] ArchiveError),
}

/// A file the sink stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    /// Final location.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes_written: u64,
}

/// Boxed future returned by [`Sink`] methods.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = SinkResult<SavedFile>> + Send + 'a>>;

/// Persists bundle output.
pub trait Sink: Send + Sync {
    /// Store a single fetched source under `name`.
    fn save_blob<'a>(&'a self, name: &'a str, bytes: Bytes) -> SinkFuture<'a>;

    /// Drain `stream` into a file named `name`.
    ///
    /// Any stream error discards the partial output.
    fn save_stream<'a>(&'a self, name: &'a str, stream: ArchiveStream) -> SinkFuture<'a>;
}

/// [`Sink`] writing files into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create a sink writing into `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First path for `name` in the directory that is not taken, numbering
    /// repeats the same way entry names are.
    async fn free_path(&self, name: &str) -> SinkResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Create {
                path: self.dir.clone(),
                source,
            })?;

        let mut candidate = self.dir.join(name);
        let mut n = 0;
        while taken(&candidate).await {
            n += 1;
            candidate = self.dir.join(numbered(name, n));
        }
        Ok(candidate)
    }

    async fn write_blob(&self, name: &str, bytes: Bytes) -> SinkResult<SavedFile> {
        let path = self.free_path(name).await?;
        let part = part_path(&path);

        let result = async {
            let mut file =
                tokio::fs::File::create(&part)
                    .await
                    .map_err(|source| SinkError::Create {
                        path: part.clone(),
                        source,
                    })?;
            file.write_all(&bytes)
                .await
                .map_err(|source| SinkError::Write {
                    path: part.clone(),
                    source,
                })?;
            file.flush().await.map_err(|source| SinkError::Write {
                path: part.clone(),
                source,
            })?;
            Ok::<(), SinkError>(())
        }
        .await;

        self.finish(result, &part, &path, bytes.len() as u64).await
    }

    async fn write_stream(&self, name: &str, mut stream: ArchiveStream) -> SinkResult<SavedFile> {
        let path = self.free_path(name).await?;
        let part = part_path(&path);

        let result = async {
            let file = tokio::fs::File::create(&part)
                .await
                .map_err(|source| SinkError::Create {
                    path: part.clone(),
                    source,
                })?;
            let mut writer = BufWriter::new(file);
            let mut written = 0u64;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|source| SinkError::Write {
                        path: part.clone(),
                        source,
                    })?;
                written += chunk.len() as u64;
            }

            writer.flush().await.map_err(|source| SinkError::Write {
                path: part.clone(),
                source,
            })?;
            Ok::<u64, SinkError>(written)
        }
        .await;

        // Producers waiting on capacity must see the consumer gone.
        drop(stream);

        match result {
            Ok(written) => self.finish(Ok(()), &part, &path, written).await,
            Err(e) => self.finish(Err(e), &part, &path, 0).await,
        }
    }

    /// Rename the part file into place, or remove it on failure.
    async fn finish(
        &self,
        result: SinkResult<()>,
        part: &Path,
        path: &Path,
        bytes_written: u64,
    ) -> SinkResult<SavedFile> {
        if let Err(e) = result {
            error!(path = %part.display(), error = %e, "discarding partial output");
            if let Err(remove_err) = tokio::fs::remove_file(part).await {
                debug!(path = %part.display(), error = %remove_err, "part file not removed");
            }
            return Err(e);
        }

        tokio::fs::rename(part, path)
            .await
            .map_err(|source| SinkError::Finalize {
                path: path.to_path_buf(),
                source,
            })?;

        info!(path = %path.display(), bytes = bytes_written, "saved");
        Ok(SavedFile {
            path: path.to_path_buf(),
            bytes_written,
        })
    }
}

impl Sink for DirectorySink {
    fn save_blob<'a>(&'a self, name: &'a str, bytes: Bytes) -> SinkFuture<'a> {
        Box::pin(self.write_blob(name, bytes))
    }

    fn save_stream<'a>(&'a self, name: &'a str, stream: ArchiveStream) -> SinkFuture<'a> {
        Box::pin(self.write_stream(name, stream))
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut part = path.as_os_str().to_owned();
    part.push(PART_SUFFIX);
    PathBuf::from(part)
}

/// Whether `path` or its part file exists.
async fn taken(path: &Path) -> bool {
    let exists = |p: PathBuf| async move { tokio::fs::try_exists(p).await.unwrap_or(false) };
    exists(path.to_path_buf()).await || exists(part_path(path)).await
}
