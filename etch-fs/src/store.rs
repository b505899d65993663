use std::{
    fs::File,
    io::{self, Read, Write},
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use etch_backend::{
    BackendError, BackendResult, ContentStore, DeleteStatus, ResourceStream,
};
use etch_core::{CachedDocument, Freshness, ResourceId};
use futures::{StreamExt, stream};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::{FsStoreError, lock::LockTable};

/// Prefix of in-progress write files; never reported by enumeration.
const TEMP_PREFIX: &str = ".etch-";
const ENUMERATE_BUFFER: usize = 64;

/// Filesystem content store.
///
/// Each resource is one file at `<root>/<host>/<path segments…>`, and the file's
/// modification time is the document's freshness. Writes go to a temporary file in
/// the target directory that is renamed into place, so a reader never sees a partial
/// document.
///
/// ```no_run
/// use etch_fs::FsStore;
///
/// let store = FsStore::builder()
///     .root("/var/cache/etch")
///     .build()?;
/// # Ok::<(), etch_fs::FsStoreError>(())
/// ```
///
/// Cloning is cheap; clones share the same root and lock table.
#[derive(Clone)]
pub struct FsStore {
    root: Arc<PathBuf>,
    locks: LockTable,
}

impl FsStore {
    /// Starts building a new store.
    pub fn builder() -> FsStoreBuilder {
        FsStoreBuilder::default()
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the file backing `id`.
    pub fn path_for(&self, id: &ResourceId) -> BackendResult<PathBuf> {
        let host = id.host();
        if host.is_empty() || host.contains(['/', '\\']) || host == "." || host == ".." {
            return Err(BackendError::InvalidKey(format!("unusable host in {id}")));
        }
        let mut path = self.root.join(host);
        let mut segments = 0;
        for segment in id.segments() {
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return Err(BackendError::InvalidKey(format!("no path segments in {id}")));
        }
        Ok(path)
    }
}

/// Builder for [`FsStore`].
#[derive(Debug)]
pub struct FsStoreBuilder {
    root: Option<PathBuf>,
    create_root: bool,
}

impl Default for FsStoreBuilder {
    fn default() -> Self {
        Self {
            root: None,
            create_root: true,
        }
    }
}

impl FsStoreBuilder {
    /// Directory the cached documents live under. Required.
    pub fn root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Whether `build` creates a missing root directory.
    ///
    /// Default: `true`
    pub fn create_root(mut self, create: bool) -> Self {
        self.create_root = create;
        self
    }

    /// Creates the store.
    ///
    /// Fails if no root was given or it is not a usable directory.
    pub fn build(self) -> Result<FsStore, FsStoreError> {
        let root = self
            .root
            .ok_or_else(|| FsStoreError::InvalidConfig("store root is not set".to_owned()))?;

        if self.create_root {
            std::fs::create_dir_all(&root)?;
        }
        if !root.is_dir() {
            return Err(FsStoreError::InvalidConfig(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        Ok(FsStore {
            root: Arc::new(root),
            locks: LockTable::default(),
        })
    }
}

fn join_error(error: tokio::task::JoinError) -> BackendError {
    BackendError::InternalError(Box::new(error))
}

fn modified(path: &Path) -> io::Result<Option<Freshness>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

fn read_document(path: &Path, id: &ResourceId) -> BackendResult<CachedDocument> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(BackendError::NotFound(id.clone()));
        }
        Err(error) => return Err(error.into()),
    };
    // Metadata and content come from the same open file.
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(BackendError::NotFound(id.clone()));
    }
    let freshness = DateTime::<Utc>::from(meta.modified()?);
    let mut content = Vec::with_capacity(meta.len() as usize);
    file.read_to_end(&mut content)?;
    Ok(CachedDocument::new(Bytes::from(content), freshness))
}

fn write_document(path: &Path, content: &[u8], freshness: Freshness) -> BackendResult<bool> {
    if let Some(stored) = modified(path)?
        && freshness <= stored
    {
        return Ok(false);
    }

    let dir = path
        .parent()
        .ok_or_else(|| BackendError::InvalidKey(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_data()?;
    temp.as_file().set_modified(SystemTime::from(freshness))?;
    temp.persist(path).map_err(|error| BackendError::Io(error.error))?;
    Ok(true)
}

/// Removes directories left empty by a delete, up to (excluding) the root.
fn prune_empty_dirs(root: &Path, path: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if std::fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

fn resource_for(root: &Path, path: &Path) -> BackendResult<ResourceId> {
    let relative = path
        .strip_prefix(root)
        .map_err(|error| BackendError::InternalError(Box::new(error)))?;
    let mut parts = relative.components().map(|component| match component {
        Component::Normal(part) => part.to_str().ok_or_else(|| {
            BackendError::InvalidKey(format!("non UTF-8 name under {}", root.display()))
        }),
        _ => Err(BackendError::InvalidKey(format!(
            "unexpected component in {}",
            relative.display()
        ))),
    });
    let host = parts
        .next()
        .transpose()?
        .ok_or_else(|| BackendError::InvalidKey(relative.display().to_string()))?;
    let segments = parts.collect::<BackendResult<Vec<_>>>()?;
    Ok(ResourceId::from_segments(host, segments))
}

fn walk(root: &Path, tx: &mpsc::Sender<BackendResult<ResourceId>>) {
    let entries = WalkDir::new(root)
        .min_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(TEMP_PREFIX))
        });
    for entry in entries {
        let item = match entry {
            Ok(entry) if !entry.file_type().is_file() => continue,
            Ok(entry) => resource_for(root, entry.path()),
            Err(error) => Err(match error.into_io_error() {
                Some(io) => BackendError::Io(io),
                None => BackendError::InvalidKey("filesystem loop under store root".to_owned()),
            }),
        };
        if tx.blocking_send(item).is_err() {
            // Consumer dropped the stream.
            return;
        }
    }
}

#[async_trait]
impl ContentStore for FsStore {
    async fn exists(&self, id: &ResourceId) -> BackendResult<bool> {
        let path = self.path_for(id)?;
        let guard = self.locks.read(id).await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            Ok(std::fs::metadata(&path).is_ok_and(|meta| meta.is_file()))
        })
        .await
        .map_err(join_error)?
    }

    async fn read(&self, id: &ResourceId) -> BackendResult<CachedDocument> {
        let path = self.path_for(id)?;
        let guard = self.locks.read(id).await;
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            read_document(&path, &id)
        })
        .await
        .map_err(join_error)?
    }

    async fn write_if_fresher(
        &self,
        id: &ResourceId,
        content: Bytes,
        freshness: Freshness,
    ) -> BackendResult<bool> {
        let path = self.path_for(id)?;
        let guard = self.locks.write(id).await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            write_document(&path, &content, freshness)
        })
        .await
        .map_err(join_error)?
    }

    async fn delete(&self, id: &ResourceId) -> BackendResult<DeleteStatus> {
        let path = self.path_for(id)?;
        let root = self.root.clone();
        let guard = self.locks.write(id).await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    prune_empty_dirs(&root, &path);
                    Ok(DeleteStatus::Deleted)
                }
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(DeleteStatus::Missing),
                Err(error) => Err(error.into()),
            }
        })
        .await
        .map_err(join_error)?
    }

    fn enumerate(&self) -> ResourceStream {
        let root = self.root.clone();
        stream::once(async move {
            let (tx, rx) = mpsc::channel(ENUMERATE_BUFFER);
            tokio::task::spawn_blocking(move || walk(&root, &tx));
            stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
        })
        .flatten()
        .boxed()
    }

    fn name(&self) -> &str {
        "fs"
    }
}
