use crate::config::PanelConfig;
use crate::services::path_resolver::{PathError, PathResolver, ResolvedPath};
use crate::utils::validation::{
    TEMP_PREFIX, TEMP_SUFFIX, ValidationError, is_temp_name, validate_entry_name,
    validate_extension, validate_file_size,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use utoipa::ToSchema;

/// Read buffer for streaming uploads.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Present for files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileEntry {
    fn from_metadata(name: String, metadata: &Metadata) -> Self {
        let (entry_type, size_bytes) = if metadata.is_dir() {
            (EntryType::Directory, None)
        } else {
            (EntryType::File, Some(metadata.len()))
        };
        Self {
            name,
            entry_type,
            size_bytes,
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

#[derive(Error, Debug)]
pub enum FileOpError {
    #[error("not found")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("already exists")]
    AlreadyExists,

    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("file type not allowed: .{0}")]
    UnsupportedType(String),

    #[error(transparent)]
    Path(PathError),

    #[error("I/O failure: {0}")]
    IoFailure(#[source] io::Error),
}

impl From<io::Error> for FileOpError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FileOpError::NotFound,
            io::ErrorKind::NotADirectory => FileOpError::NotADirectory,
            io::ErrorKind::IsADirectory => FileOpError::IsADirectory,
            io::ErrorKind::AlreadyExists => FileOpError::AlreadyExists,
            _ => FileOpError::IoFailure(e),
        }
    }
}

impl From<PathError> for FileOpError {
    fn from(e: PathError) -> Self {
        match e {
            PathError::Io(io) => io.into(),
            other => FileOpError::Path(other),
        }
    }
}

impl From<ValidationError> for FileOpError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::TooLarge { max, .. } => FileOpError::PayloadTooLarge { limit: max },
            ValidationError::BlockedExtension(ext) => FileOpError::UnsupportedType(ext),
            ValidationError::ReservedName(_) => {
                FileOpError::Path(PathError::InvalidInput("reserved name"))
            }
            ValidationError::NameTooLong => FileOpError::Path(PathError::InvalidInput("name too long")),
        }
    }
}

/// Runs filesystem work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, FileOpError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FileOpError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FileOpError::IoFailure(io::Error::other(e)))?
}

/// Metadata of a directory entry, following symlinks only while they stay
/// inside the root. `None` hides the entry.
fn visible_metadata(resolver: &PathResolver, entry: &std::fs::DirEntry) -> io::Result<Option<Metadata>> {
    let file_type = match entry.file_type() {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if file_type.is_symlink() {
        return match std::fs::canonicalize(entry.path()) {
            Ok(target) if resolver.contains(&target) => match std::fs::metadata(&target) {
                Ok(m) => Ok(Some(m)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            },
            Ok(target) => {
                tracing::debug!(
                    "Hiding symlink {} pointing outside the root ({})",
                    entry.path().display(),
                    target.display()
                );
                Ok(None)
            }
            Err(_) => Ok(None),
        };
    }

    match entry.metadata() {
        Ok(m) => Ok(Some(m)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn target_name(target: &ResolvedPath) -> Result<String, FileOpError> {
    if target.is_root() {
        return Err(FileOpError::IsADirectory);
    }
    let name = target
        .relative()
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(FileOpError::Path(PathError::InvalidInput("name is not valid UTF-8")))?;
    validate_entry_name(name)?;
    Ok(name.to_string())
}

/// Directory listing, streamed uploads and deletion inside the root boundary.
///
/// Every operation takes the raw client path and resolves it itself. Same-path
/// races between uploads and deletes are last-writer-wins: the rename that
/// finishes an upload is atomic, but nothing serializes competing writers.
#[derive(Debug, Clone)]
pub struct FileManager {
    resolver: PathResolver,
    max_upload_size: u64,
    blocked_extensions: Arc<[String]>,
}

impl FileManager {
    pub fn new(resolver: PathResolver, max_upload_size: u64, blocked_extensions: Vec<String>) -> Self {
        Self {
            resolver,
            max_upload_size,
            blocked_extensions: blocked_extensions.into(),
        }
    }

    pub fn from_config(config: &PanelConfig) -> io::Result<Self> {
        let resolver = PathResolver::new(&config.root_dir)?;
        Ok(Self::new(
            resolver,
            config.max_upload_size as u64,
            config.blocked_extensions.clone(),
        ))
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    async fn resolve(&self, raw: &str) -> Result<ResolvedPath, FileOpError> {
        let resolver = self.resolver.clone();
        let raw = raw.to_owned();
        blocking(move || Ok(resolver.resolve(&raw)?)).await
    }

    /// Lists a directory, sorted by name in byte order.
    ///
    /// In-flight uploads, dangling symlinks and symlinks leaving the root are
    /// omitted.
    pub async fn list(&self, raw: &str) -> Result<Vec<FileEntry>, FileOpError> {
        let target = self.resolve(raw).await?;
        if !target.exists() {
            return Err(FileOpError::NotFound);
        }

        let resolver = self.resolver.clone();
        blocking(move || {
            let metadata = std::fs::metadata(target.absolute())?;
            if !metadata.is_dir() {
                return Err(FileOpError::NotADirectory);
            }

            let mut entries = Vec::new();
            for dir_entry in std::fs::read_dir(target.absolute())? {
                let dir_entry = dir_entry?;
                let Ok(name) = dir_entry.file_name().into_string() else {
                    tracing::debug!("Skipping non UTF-8 entry in {}", target.absolute().display());
                    continue;
                };
                if is_temp_name(&name) {
                    continue;
                }
                if let Some(metadata) = visible_metadata(&resolver, &dir_entry)? {
                    entries.push(FileEntry::from_metadata(name, &metadata));
                }
            }

            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
        .await
    }

    /// Streams `reader` to `raw`, replacing any existing file.
    ///
    /// Content goes to a temp file in the target directory and is renamed into
    /// place only once fully written. The byte limit is enforced on what is
    /// actually read; `declared_size` only allows an early rejection. Dropping
    /// the returned future removes the temp file.
    pub async fn upload<R>(
        &self,
        raw: &str,
        mut reader: R,
        declared_size: Option<u64>,
    ) -> Result<FileEntry, FileOpError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if let Some(declared) = declared_size {
            validate_file_size(declared, self.max_upload_size)?;
        }

        let target = self.resolve(raw).await?;
        let name = target_name(&target)?;
        validate_extension(&name, &self.blocked_extensions)?;

        let destination = target.absolute().to_path_buf();
        let (file, temp_path) = blocking(move || {
            if destination.is_dir() {
                return Err(FileOpError::IsADirectory);
            }
            let parent = destination.parent().ok_or(FileOpError::NotFound)?;
            if !std::fs::metadata(parent)?.is_dir() {
                return Err(FileOpError::NotADirectory);
            }

            let mut builder = tempfile::Builder::new();
            builder.prefix(TEMP_PREFIX).suffix(TEMP_SUFFIX);
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                builder.permissions(std::fs::Permissions::from_mode(0o644));
            }
            let temp = builder.tempfile_in(parent)?;
            Ok(temp.into_parts())
        })
        .await?;

        let mut file = tokio::fs::File::from_std(file);
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        let mut received: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await.map_err(FileOpError::IoFailure)?;
            if n == 0 {
                break;
            }
            received += n as u64;
            if received > self.max_upload_size {
                tracing::warn!(
                    "Upload to {:?} exceeded {} bytes, discarding",
                    raw,
                    self.max_upload_size
                );
                return Err(FileOpError::PayloadTooLarge {
                    limit: self.max_upload_size,
                });
            }
            file.write_all(&buffer[..n])
                .await
                .map_err(FileOpError::IoFailure)?;
        }
        file.flush().await.map_err(FileOpError::IoFailure)?;
        file.sync_all().await.map_err(FileOpError::IoFailure)?;
        drop(file);

        // The tree may have changed while the body was streaming
        let confirmed = self.resolve(raw).await?;
        if confirmed.absolute() != target.absolute() {
            tracing::warn!("Upload target {:?} moved during transfer", raw);
            return Err(FileOpError::IoFailure(io::Error::other(
                "upload target changed during transfer",
            )));
        }

        let destination = confirmed.absolute().to_path_buf();
        let entry = blocking(move || {
            if destination.is_dir() {
                return Err(FileOpError::IsADirectory);
            }
            temp_path.persist(&destination).map_err(|e| e.error)?;
            let metadata = std::fs::metadata(&destination)?;
            Ok(FileEntry::from_metadata(name, &metadata))
        })
        .await?;

        tracing::info!("📁 Stored {:?} ({} bytes)", raw, received);
        Ok(entry)
    }

    /// Removes a single file. Directories are refused.
    pub async fn delete(&self, raw: &str) -> Result<(), FileOpError> {
        let target = self.resolve(raw).await?;
        target_name(&target)?;
        if !target.exists() {
            return Err(FileOpError::NotFound);
        }

        blocking(move || {
            if std::fs::metadata(target.absolute())?.is_dir() {
                return Err(FileOpError::IsADirectory);
            }
            std::fs::remove_file(target.absolute())?;
            Ok(())
        })
        .await?;

        tracing::info!("🗑️  Deleted {:?}", raw);
        Ok(())
    }

    /// Creates one directory level. The parent must already exist.
    pub async fn create_directory(&self, raw: &str) -> Result<FileEntry, FileOpError> {
        let target = self.resolve(raw).await?;
        if target.is_root() || target.exists() {
            return Err(FileOpError::AlreadyExists);
        }
        let name = target_name(&target)?;

        blocking(move || {
            std::fs::create_dir(target.absolute())?;
            let metadata = std::fs::metadata(target.absolute())?;
            Ok(FileEntry::from_metadata(name, &metadata))
        })
        .await
    }

    /// Opens a file for reading.
    pub async fn open(&self, raw: &str) -> Result<(FileEntry, tokio::fs::File), FileOpError> {
        let target = self.resolve(raw).await?;
        let name = target_name(&target)?;
        if !target.exists() {
            return Err(FileOpError::NotFound);
        }

        let (entry, file) = blocking(move || {
            let file = std::fs::File::open(target.absolute())?;
            let metadata = file.metadata()?;
            if metadata.is_dir() {
                return Err(FileOpError::IsADirectory);
            }
            Ok((FileEntry::from_metadata(name, &metadata), file))
        })
        .await?;

        Ok((entry, tokio::fs::File::from_std(file)))
    }
}
