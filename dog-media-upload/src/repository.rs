use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::{FileLoader, Loader, MediaFile, UploadAdapter, UploadId};

/// Registry of live loaders, keyed by upload id
pub struct FileRepository {
    adapter: Option<Arc<dyn UploadAdapter>>,
    loaders: RwLock<HashMap<UploadId, Arc<dyn Loader>>>,
}

impl FileRepository {
    pub fn new(adapter: Option<Arc<dyn UploadAdapter>>) -> Self {
        Self {
            adapter,
            loaders: RwLock::new(HashMap::new()),
        }
    }

    /// Create and register a loader for `file`.
    ///
    /// Returns `None` when no upload adapter is configured.
    pub fn create_loader(&self, file: MediaFile) -> Option<Arc<dyn Loader>> {
        let Some(adapter) = self.adapter.as_ref() else {
            error!(file = %file.name, "no upload adapter configured, cannot upload");
            return None;
        };

        let loader: Arc<dyn Loader> = Arc::new(FileLoader::new(file, Arc::clone(adapter)));
        self.register(Arc::clone(&loader));
        Some(loader)
    }

    /// Register an externally built loader
    pub fn register(&self, loader: Arc<dyn Loader>) {
        debug!(upload_id = %loader.id(), "loader registered");
        self.loaders.write().insert(loader.id().clone(), loader);
    }

    pub fn get(&self, upload_id: &UploadId) -> Option<Arc<dyn Loader>> {
        self.loaders.read().get(upload_id).cloned()
    }

    pub fn contains(&self, upload_id: &UploadId) -> bool {
        self.loaders.read().contains_key(upload_id)
    }

    /// Release a loader, aborting it first if it is still running
    pub fn destroy_loader(&self, upload_id: &UploadId) {
        let removed = self.loaders.write().remove(upload_id);
        if let Some(loader) = removed {
            if !loader.status().is_terminal() {
                loader.abort();
            }
            debug!(upload_id = %upload_id, "loader destroyed");
        }
    }

    pub fn len(&self) -> usize {
        self.loaders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.read().is_empty()
    }
}
