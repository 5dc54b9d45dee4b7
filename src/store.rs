// 🗄️ Dataset store - mtime-checked cache in front of data.json
//
// Every request asks the store for the dataset. The file is re-read only
// when its modification time changes; a reload builds a fresh dataset and
// swaps it in whole, so readers never see a half-built one.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::dataset::CanonicalDataset;
use crate::error::StoreError;

struct Cached {
    modified: SystemTime,
    dataset: Arc<CanonicalDataset>,
}

pub struct DatasetStore {
    path: PathBuf,
    cache: RwLock<Option<Cached>>,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DatasetStore {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current dataset. Served from cache while the file's mtime is unchanged.
    pub fn load(&self) -> Result<Arc<CanonicalDataset>, StoreError> {
        let modified = self.modified()?;

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref().filter(|c| c.modified == modified) {
                return Ok(Arc::clone(&cached.dataset));
            }
        }

        let dataset = Arc::new(self.read()?);
        info!(
            path = %self.path.display(),
            universities = dataset.universities.len(),
            "dataset loaded"
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(Cached {
            modified,
            dataset: Arc::clone(&dataset),
        });
        Ok(dataset)
    }

    fn modified(&self) -> Result<SystemTime, StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        match fs::metadata(&self.path) {
            Ok(meta) => meta.modified().map_err(io_err),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "data file missing");
                Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => Err(io_err(e)),
        }
    }

    fn read(&self) -> Result<CanonicalDataset, StoreError> {
        let text = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        CanonicalDataset::from_json(&text).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
