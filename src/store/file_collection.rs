//! A collection kept as one pretty-printed `<id>.json` file per document.

use crate::store::collection::{check_document_id, DocumentCollection, RawDocument};
use crate::store::error::StoreError;
use crate::utils::{default_data_dir, ensure_dir_exists};
use async_trait::async_trait;
use log::debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::{fs, task};

const EXTENSION: &str = "json";

pub struct FileCollection {
    name: String,
    dir: PathBuf,
}

impl FileCollection {
    /// Opens (creating if needed) `<root>/<name>/`.
    pub async fn open(root: &Path, name: &str) -> Result<Self, StoreError> {
        let dir = root.join(name);
        ensure_dir_exists(&dir)
            .await
            .map_err(|e| StoreError::Io(dir.clone(), e))?;
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    /// Opens `name` under the user data directory.
    pub async fn open_default(name: &str) -> Result<Self, StoreError> {
        let root = default_data_dir().map_err(|e| StoreError::Io(PathBuf::from("~"), e))?;
        Self::open(&root, name).await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }
}

/// Writes `bytes` next to `target` and renames it into place.
pub(crate) async fn write_atomically(target: PathBuf, bytes: Vec<u8>) -> Result<(), StoreError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir_exists(&dir)
        .await
        .map_err(|e| StoreError::Io(dir.clone(), e))?;

    task::spawn_blocking(move || {
        let mut temp_file =
            NamedTempFile::new_in(&dir).map_err(|e| StoreError::Io(dir.clone(), e))?;
        let temp_path = temp_file.path().to_path_buf();
        temp_file
            .write_all(&bytes)
            .map_err(|e| StoreError::Io(temp_path.clone(), e))?;
        temp_file
            .flush()
            .map_err(|e| StoreError::Io(temp_path, e))?;
        temp_file
            .persist(&target)
            .map_err(|e| StoreError::Persist(target.clone(), e))?;
        Ok(())
    })
    .await?
}

#[async_trait]
impl DocumentCollection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<Option<RawDocument>, StoreError> {
        check_document_id(id)?;
        let path = self.path_for(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Decode {
                id: id.to_string(),
                source: e,
            })
    }

    async fn set(&self, id: &str, document: &RawDocument) -> Result<(), StoreError> {
        check_document_id(id)?;
        let bytes = serde_json::to_vec_pretty(document).map_err(|e| StoreError::Encode {
            id: id.to_string(),
            source: e,
        })?;
        let path = self.path_for(id);
        debug!("Writing {} bytes to {}", bytes.len(), path.display());
        write_atomically(path, bytes).await
    }

    async fn list(&self) -> Result<Vec<(String, RawDocument)>, StoreError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::Io(self.dir.clone(), e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(self.dir.clone(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) {
                if check_document_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            // A file removed between listing and reading is skipped.
            if let Some(document) = self.get(&id).await? {
                documents.push((id, document));
            }
        }
        Ok(documents)
    }
}
