//! Ownership of the single active log file

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const NAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// The log file currently receiving writes
#[derive(Debug)]
pub struct ActiveFile {
    file: File,
    path: PathBuf,
    opened_at: DateTime<Utc>,
    bytes_written: u64,
}

impl ActiveFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Bytes appended through this handle since it was opened
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Owns the active file handle; at most one file is open at any time
#[derive(Debug)]
pub struct FileHandleManager {
    directory: PathBuf,
    prefix: String,
    active: Option<ActiveFile>,
}

impl FileHandleManager {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            active: None,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn active(&self) -> Option<&ActiveFile> {
        self.active.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// File name for a file opened at `opened_at`, with an optional collision suffix
    pub fn file_name(&self, opened_at: DateTime<Utc>, attempt: u32) -> String {
        let timestamp = opened_at.format(NAME_TIMESTAMP_FORMAT);
        if attempt == 0 {
            format!("{}{}.log", self.prefix, timestamp)
        } else {
            format!("{}{}_{}.log", self.prefix, timestamp, attempt)
        }
    }

    fn directory_error(&self, message: impl Into<String>) -> Error {
        Error::Directory {
            path: self.directory.clone(),
            message: message.into(),
        }
    }

    /// Make sure the log directory exists. Writability is established by the
    /// open itself, which sees ownership and ACLs as well as mode bits.
    async fn ensure_directory(&self) -> Result<()> {
        match tokio::fs::metadata(&self.directory).await {
            Ok(metadata) => {
                if !metadata.is_dir() {
                    return Err(self.directory_error("exists and is not a directory"));
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.directory)
                    .await
                    .map_err(|e| self.directory_error(format!("failed to create: {}", e)))?;

                tracing::debug!(
                    quill.event = "log_dir_created",
                    log_dir = %self.directory.display(),
                    "Log directory created"
                );
                Ok(())
            }
            Err(e) => Err(self.directory_error(e.to_string())),
        }
    }

    /// Open a fresh, uniquely named file. Any file still open is closed first.
    ///
    /// Existing files are never truncated: a name that is already taken gets a
    /// `_<n>` suffix.
    pub async fn open_new(&mut self, now: DateTime<Utc>) -> Result<&ActiveFile> {
        self.close().await?;
        self.ensure_directory().await?;

        let mut attempt = 0;
        let (file, path) = loop {
            let path = self.directory.join(self.file_name(now, attempt));
            match OpenOptions::new()
                .append(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (file, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    return Err(self.directory_error(format!("directory is not writable: {}", e)));
                }
                Err(source) => return Err(Error::FileOpen { path, source }),
            }
        };

        tracing::debug!(
            quill.event = "log_file_opened",
            file_path = %path.display(),
            "Log file opened"
        );

        let active: &ActiveFile = self.active.insert(ActiveFile {
            file,
            path,
            opened_at: now,
            bytes_written: 0,
        });
        Ok(active)
    }

    /// Append bytes to the active file
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let active = self.active.as_mut().ok_or_else(|| Error::Write {
            message: "no log file is open".to_string(),
        })?;

        let outcome = async {
            active.file.write_all(bytes).await?;
            active.file.flush().await
        }
        .await;

        outcome.map_err(|e| Error::Write {
            message: format!("{}: {}", active.path.display(), e),
        })?;

        active.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Push buffered data to disk without closing
    pub async fn sync(&mut self) -> Result<()> {
        if let Some(active) = self.active.as_mut() {
            active.file.flush().await?;
            active.file.sync_all().await?;
        }
        Ok(())
    }

    /// Sync and close the active file. Closing when nothing is open is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };

        let synced = async {
            active.file.flush().await?;
            active.file.sync_all().await
        }
        .await;

        tracing::debug!(
            quill.event = "log_file_closed",
            file_path = %active.path.display(),
            bytes_written = active.bytes_written,
            "Log file closed"
        );

        drop(active);
        synced.map_err(Error::from)
    }

    /// Drop the active handle without flushing, after a failed write left it
    /// in an unknown state. The next write has to open a new file.
    pub fn discard(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::warn!(
                quill.event = "log_file_discarded",
                file_path = %active.path.display(),
                bytes_written = active.bytes_written,
                "Log file handle discarded after a write failure"
            );
        }
    }

    /// Use an existing file as the active one
    #[cfg(test)]
    pub(crate) async fn attach(&mut self, path: &Path, opened_at: DateTime<Utc>) -> Result<()> {
        let file = OpenOptions::new().append(true).open(path).await?;
        self.active = Some(ActiveFile {
            file,
            path: path.to_path_buf(),
            opened_at,
            bytes_written: 0,
        });
        Ok(())
    }

    /// Close the current file and open a new one. The old handle is released
    /// before the new file exists, so two files are never open together.
    pub async fn rotate(&mut self, now: DateTime<Utc>) -> Result<&ActiveFile> {
        let old_path = self.active.as_ref().map(|a| a.path.clone());
        self.close().await?;
        let active = self.open_new(now).await?;

        if let Some(old_path) = old_path {
            tracing::info!(
                quill.event = "log_rotated",
                old_file = %old_path.display(),
                new_file = %active.path.display(),
                "Log file rotated"
            );
        }

        Ok(active)
    }
}
