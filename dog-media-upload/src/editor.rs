use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::engine::{AttributeChange, Batch, Change, DocumentEngine, EditingView};
use crate::hub::{ChangeEvent, ChangeHub, ChangeListener, ChangePattern, ListenerId};
use crate::{Attribute, AttributeKey, RootName, UploadResult};

/// The editing surface: one document, its view, and the change feed.
///
/// Changes are applied by a single writer at a time. A change enqueued while
/// listeners of another change are running is applied right after that change
/// finishes, in enqueue order.
pub struct Editor {
    document: Arc<dyn DocumentEngine>,
    view: Arc<dyn EditingView>,
    hub: RwLock<ChangeHub>,
    pending: Mutex<VecDeque<(u64, Batch)>>,
    sequence: AtomicU64,
    dispatching: AtomicBool,
}

impl Editor {
    pub fn new(document: Arc<dyn DocumentEngine>, view: Arc<dyn EditingView>) -> Arc<Self> {
        Arc::new(Self {
            document,
            view,
            hub: RwLock::new(ChangeHub::new()),
            pending: Mutex::new(VecDeque::new()),
            sequence: AtomicU64::new(0),
            dispatching: AtomicBool::new(false),
        })
    }

    pub fn document(&self) -> &Arc<dyn DocumentEngine> {
        &self.document
    }

    pub fn view(&self) -> &Arc<dyn EditingView> {
        &self.view
    }

    pub fn on(&self, pattern: ChangePattern, listener: ChangeListener) -> ListenerId {
        self.hub.write().on(pattern, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.hub.write().off(id)
    }

    /// Apply a batch and notify listeners.
    ///
    /// When called from inside a listener the batch is queued and `Ok` is
    /// returned immediately; failures of queued batches are logged.
    pub fn enqueue_change(self: &Arc<Self>, batch: Batch) -> UploadResult<()> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().push_back((seq, batch));

        if self.dispatching.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut own = Ok(());
        loop {
            while let Some((next_seq, next)) = self.pop_pending() {
                let result = self.commit(next);
                if next_seq == seq {
                    own = result;
                } else if let Err(e) = result {
                    error!(error = %e, "queued change failed");
                }
            }
            self.dispatching.store(false, Ordering::Release);

            // Batches pushed after the drain but before the release are ours to apply.
            if self.pending.lock().is_empty() || self.dispatching.swap(true, Ordering::AcqRel) {
                break;
            }
        }
        own
    }

    fn pop_pending(&self) -> Option<(u64, Batch)> {
        self.pending.lock().pop_front()
    }

    fn commit(self: &Arc<Self>, batch: Batch) -> UploadResult<()> {
        let changes = self.document.apply(&batch)?;
        if changes.is_empty() {
            return Ok(());
        }
        debug!(kind = ?batch.kind, changes = changes.len(), "batch committed");

        self.view.render_changes(self.document.as_ref(), &changes);

        for change in self.attribute_events(&changes) {
            self.emit(&ChangeEvent::Attribute(&change));
        }
        self.emit(&ChangeEvent::Document(&changes));
        Ok(())
    }

    /// Attribute changes of a batch, plus the upload status carried by
    /// freshly inserted elements so their rendering starts right away.
    fn attribute_events(&self, changes: &[Change]) -> Vec<AttributeChange> {
        let mut events = Vec::new();
        for change in changes {
            match change {
                Change::Attribute(change) => events.push(change.clone()),
                Change::Insert {
                    root: RootName::Main,
                    node,
                    is_text: false,
                } => {
                    for media in self.document.media_in_subtree(*node) {
                        if let Some(status) = media.upload_status() {
                            events.push(AttributeChange {
                                element: media.id,
                                key: AttributeKey::UploadStatus,
                                old: None,
                                new: Some(Attribute::UploadStatus(status)),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        events
    }

    fn emit(self: &Arc<Self>, event: &ChangeEvent<'_>) {
        let listeners = self.hub.read().snapshot(event);
        for listener in listeners {
            listener(self, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NodeSpec, Position};
    use crate::hub::listener;
    use crate::memory::{MemoryDocument, MemoryView};
    use crate::{MediaAttributes, UploadStatus};

    fn editor() -> (Arc<Editor>, Arc<MemoryDocument>) {
        let document = Arc::new(MemoryDocument::new());
        let editor = Editor::new(document.clone(), Arc::new(MemoryView::new()));
        (editor, document)
    }

    #[test]
    fn test_nested_changes_run_after_current_batch() {
        let (editor, document) = editor();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        editor.on(
            ChangePattern::Document,
            listener(move |editor, event| {
                let ChangeEvent::Document(changes) = event else { return };
                for change in changes.iter() {
                    if let Change::Insert { node, root: RootName::Main, .. } = change {
                        log.lock().push("insert");
                        editor
                            .enqueue_change(
                                Batch::transparent()
                                    .set_attribute(*node, Attribute::UploadStatus(UploadStatus::Reading)),
                            )
                            .unwrap();
                        // Still the outer batch's view of the world
                        assert_eq!(editor.document().element(*node).unwrap().upload_status(), None);
                    }
                    if let Change::Attribute(_) = change {
                        log.lock().push("attribute");
                    }
                }
            }),
        );

        let media = NodeSpec::media(MediaAttributes::new());
        let id = media.id;
        editor
            .enqueue_change(Batch::new().insert(media, Position::new(RootName::Main, 0)))
            .unwrap();

        assert_eq!(*seen.lock(), vec!["insert", "attribute"]);
        assert_eq!(document.element(id).unwrap().upload_status(), Some(UploadStatus::Reading));
    }

    #[test]
    fn test_inserted_status_is_announced() {
        let (editor, _document) = editor();
        let statuses = Arc::new(Mutex::new(Vec::new()));

        let log = statuses.clone();
        editor.on(
            ChangePattern::Attribute(AttributeKey::UploadStatus),
            listener(move |_, event| {
                if let ChangeEvent::Attribute(change) = event {
                    log.lock().push(change.new_upload_status());
                }
            }),
        );

        let media = NodeSpec::media(MediaAttributes::new().with_upload_status(UploadStatus::Uploading));
        editor
            .enqueue_change(Batch::new().insert(NodeSpec::paragraph(vec![media]), Position::new(RootName::Main, 0)))
            .unwrap();

        assert_eq!(*statuses.lock(), vec![Some(UploadStatus::Uploading)]);
    }

    #[test]
    fn test_failed_batch_reports_error() {
        let (editor, _document) = editor();
        let result = editor.enqueue_change(Batch::new().remove(crate::ElementId::next()));
        assert!(result.is_err());
    }
}
