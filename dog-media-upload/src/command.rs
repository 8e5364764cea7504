use std::sync::Arc;

use tracing::debug;

use crate::engine::{Batch, NodeSpec, Position};
use crate::{Editor, ElementId, FileRepository, MediaAttributes, MediaFile, UploadResult};

/// Inserts one media element per file, each tied to a fresh loader
pub struct MediaUploadCommand {
    editor: Arc<Editor>,
    repository: Arc<FileRepository>,
}

impl MediaUploadCommand {
    pub fn new(editor: Arc<Editor>, repository: Arc<FileRepository>) -> Self {
        Self { editor, repository }
    }

    /// Media can go at the current selection
    pub fn is_enabled(&self) -> bool {
        self.editor.document().can_insert_media()
    }

    /// Insert the files as a single undoable step and select the last one.
    ///
    /// Files the repository cannot create a loader for are skipped.
    /// Returns the inserted elements.
    pub fn execute<I>(&self, files: I) -> UploadResult<Vec<ElementId>>
    where
        I: IntoIterator<Item = MediaFile>,
    {
        let document = self.editor.document();
        let start = document.insertion_position();

        let mut batch = Batch::new();
        let mut inserted = Vec::new();
        let mut upload_ids = Vec::new();
        for file in files {
            let Some(loader) = self.repository.create_loader(file) else {
                continue;
            };
            upload_ids.push(loader.id().clone());
            let node = NodeSpec::media(MediaAttributes::new().with_upload_id(loader.id().clone()));
            inserted.push(node.id);
            let position = Position::new(start.root, start.offset + inserted.len() - 1);
            batch = batch.insert(node, position);
        }

        if batch.is_empty() {
            return Ok(inserted);
        }

        if let Err(e) = self.editor.enqueue_change(batch) {
            for upload_id in &upload_ids {
                self.repository.destroy_loader(upload_id);
            }
            return Err(e);
        }
        if let Some(last) = inserted.last() {
            if document.element(*last).map(|e| e.is_attached()).unwrap_or(false) {
                document.select(*last);
            }
        }
        debug!(count = inserted.len(), "media inserted for upload");
        Ok(inserted)
    }
}
