// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! On-disk storage of uploaded dumps
//!
//! Tracebacks live at `{root}/{id}.dump`, dataframes at
//! `{root}/dataframes/{id}.dump`. Each upload is streamed into its own hidden
//! `.part` file next to the target and renamed once complete, so readers never
//! see half-written dumps and concurrent uploads of one id never interleave.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use futures::{Stream, StreamExt};
use tbx_common::pretty_size;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};

const DUMP_EXTENSION: &str = "dump";
const DATAFRAME_DIR: &str = "dataframes";

/// Kind of a stored dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    /// Traceback blob
    Traceback,
    /// Dataframe bytes
    Dataframe,
}

impl fmt::Display for DumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Traceback => write!(f, "TB"),
            Self::Dataframe => write!(f, "DF"),
        }
    }
}

/// Errors of the dump store
#[derive(Debug, Error)]
pub enum StorageError {
    /// The id could escape the storage directory or is empty
    #[error("invalid id `{0}`")]
    InvalidId(String),
    /// No dump with the id exists
    #[error("no {kind} with id {id}")]
    NotFound {
        /// Kind of the requested dump
        kind: DumpKind,
        /// Requested id
        id: String,
    },
    /// The upload stream failed
    #[error("upload interrupted: {0}")]
    Stream(String),
    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Listing entry of a stored dump
#[derive(Debug, Clone)]
pub struct DumpInfo {
    /// Dump id
    pub name: String,
    /// Last modification time
    pub modified: DateTime<Local>,
    /// Size in bytes
    pub size: u64,
}

impl DumpInfo {
    /// Size formatted for humans
    pub fn pretty_size(&self) -> String {
        pretty_size(self.size)
    }
}

/// Check that `id` names a file directly inside the storage directory
pub fn validate_id(id: &str) -> Result<(), StorageError> {
    let invalid = id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0'])
        || id.contains("..");
    if invalid {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Directory of uploaded dumps
#[derive(Debug, Clone)]
pub struct DumpStore {
    root: PathBuf,
}

impl DumpStore {
    /// Open the store at `root`, creating its directories when missing
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(root.join(DATAFRAME_DIR)).await?;
        let root = fs::canonicalize(&root).await?;
        info!("Storage directory: {}", root.display());
        Ok(Self { root })
    }

    /// Storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, kind: DumpKind) -> PathBuf {
        match kind {
            DumpKind::Traceback => self.root.clone(),
            DumpKind::Dataframe => self.root.join(DATAFRAME_DIR),
        }
    }

    /// Path of the dump `id`
    pub fn path(&self, kind: DumpKind, id: &str) -> Result<PathBuf, StorageError> {
        validate_id(id)?;
        Ok(self.dir(kind).join(format!("{id}.{DUMP_EXTENSION}")))
    }

    /// Stream `body` into the dump `id`, replacing any previous dump
    ///
    /// # Returns
    /// The number of bytes written
    pub async fn save<S, B, E>(&self, kind: DumpKind, id: &str, body: S) -> Result<u64, StorageError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let path = self.path(kind, id)?;
        let mut body = std::pin::pin!(body);
        let (file, partial) = tempfile::Builder::new()
            .prefix(&format!(".{id}."))
            .suffix(".part")
            .tempfile_in(self.dir(kind))?
            .into_parts();

        let mut file = fs::File::from_std(file);
        let mut written = 0u64;
        let result = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| StorageError::Stream(e.to_string()))?;
                file.write_all(chunk.as_ref()).await?;
                written += chunk.as_ref().len() as u64;
            }
            file.flush().await?;
            Ok::<_, StorageError>(())
        }
        .await;
        drop(file);

        // dropping `partial` on the error path removes the staged file
        result?;
        partial.persist(&path).map_err(std::io::Error::from)?;

        info!("Stored {kind} {id} ({})", pretty_size(written));
        Ok(written)
    }

    /// Read the dump `id`
    pub async fn load(&self, kind: DumpKind, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path(kind, id)?;
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Loaded {} ({})", path.display(), pretty_size(bytes.len() as u64));
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound { kind, id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All dumps of `kind`, most recently modified first
    pub async fn list(&self, kind: DumpKind) -> Result<Vec<DumpInfo>, StorageError> {
        let mut dumps = Vec::new();
        let mut entries = fs::read_dir(self.dir(kind)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DUMP_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            dumps.push(DumpInfo {
                name: name.to_string(),
                modified: metadata.modified()?.into(),
                size: metadata.len(),
            });
        }
        dumps.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(dumps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::{io, time::Duration};

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], io::Error>> + Unpin {
        stream::iter(parts.iter().map(|part| Ok(part.as_bytes())).collect::<Vec<_>>())
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("nightly-run").is_ok());
        assert!(validate_id("v1.2").is_ok());
        for bad in ["", "..", "../etc", "a/b", "a\\b", ".hidden"] {
            assert!(matches!(validate_id(bad), Err(StorageError::InvalidId(_))), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = DumpStore::open(dir.path()).await.unwrap();

        let written = store.save(DumpKind::Traceback, "crash", chunks(&["ab", "cd"])).await.unwrap();
        assert_eq!(written, 4);
        assert_eq!(store.load(DumpKind::Traceback, "crash").await.unwrap(), b"abcd");
        assert!(store.root().join("crash.dump").is_file());
    }

    #[tokio::test]
    async fn test_dataframes_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = DumpStore::open(dir.path()).await.unwrap();

        store.save(DumpKind::Dataframe, "sales", chunks(&["df"])).await.unwrap();
        assert!(store.root().join("dataframes/sales.dump").is_file());
        assert!(matches!(
            store.load(DumpKind::Traceback, "sales").await,
            Err(StorageError::NotFound { kind: DumpKind::Traceback, .. })
        ));
        assert!(store.list(DumpKind::Traceback).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_dump() {
        let dir = tempfile::tempdir().unwrap();
        let store = DumpStore::open(dir.path()).await.unwrap();

        let err = store.load(DumpKind::Traceback, "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "no TB with id nope");
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = DumpStore::open(dir.path()).await.unwrap();

        let body = stream::iter(vec![
            Ok(b"partial".as_slice()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let err = store.save(DumpKind::Traceback, "crash", body).await.unwrap_err();
        assert!(matches!(err, StorageError::Stream(_)));
        assert!(!store.root().join("crash.dump").exists());
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 1, "only dataframes/ remains");
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = DumpStore::open(dir.path()).await.unwrap();

        store.save(DumpKind::Traceback, "old", chunks(&["1"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.save(DumpKind::Traceback, "new", chunks(&["123"])).await.unwrap();
        std::fs::write(store.root().join("notes.txt"), "ignored").unwrap();

        let listed = store.list(DumpKind::Traceback).await.unwrap();
        let names: Vec<_> = listed.iter().map(|dump| dump.name.as_str()).collect();
        assert_eq!(names, ["new", "old"]);
        assert_eq!(listed[0].size, 3);
        assert_eq!(listed[0].pretty_size(), "3 bytes");
    }

    fn slow_chunks(
        byte: u8,
        count: usize,
    ) -> impl Stream<Item = Result<Vec<u8>, io::Error>> {
        stream::iter(0..count).then(move |_| async move {
            tokio::task::yield_now().await;
            Ok::<_, io::Error>(vec![byte; 1000])
        })
    }

    #[tokio::test]
    async fn test_concurrent_saves_of_one_id_do_not_mix() {
        let dir = tempfile::tempdir().unwrap();
        let store = DumpStore::open(dir.path()).await.unwrap();

        let (a, b) = tokio::join!(
            store.save(DumpKind::Traceback, "crash", slow_chunks(b'A', 50)),
            store.save(DumpKind::Traceback, "crash", slow_chunks(b'B', 10)),
        );
        assert_eq!(a.unwrap(), 50_000);
        assert_eq!(b.unwrap(), 10_000);

        let stored = store.load(DumpKind::Traceback, "crash").await.unwrap();
        let uniform = stored.iter().all(|&byte| byte == stored[0]);
        assert!(uniform && (stored.len() == 50_000 || stored.len() == 10_000));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
