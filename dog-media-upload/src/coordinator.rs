use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::engine::Change;
use crate::{Editor, FileRepository, LoaderStatus, RootName, UploadError, UploadLifecycle, UploadResult};

/// Watches document changes and starts or aborts uploads for media
/// elements entering or leaving the document.
pub struct UploadCoordinator {
    repository: Arc<FileRepository>,
    lifecycle: UploadLifecycle,
    tasks: Mutex<Vec<JoinHandle<UploadResult<()>>>>,
    /// First failure reaped before anyone called `settle`
    unreported: Mutex<Option<UploadError>>,
}

impl UploadCoordinator {
    pub fn new(repository: Arc<FileRepository>, lifecycle: UploadLifecycle) -> Self {
        Self {
            repository,
            lifecycle,
            tasks: Mutex::new(Vec::new()),
            unreported: Mutex::new(None),
        }
    }

    /// React to one committed batch
    pub fn handle_changes(&self, editor: &Arc<Editor>, changes: &[Change]) {
        self.reap();

        for change in changes {
            let Change::Insert {
                root,
                node,
                is_text: false,
            } = change
            else {
                continue;
            };

            for media in editor.document().media_in_subtree(*node) {
                let Some(upload_id) = media.upload_id() else {
                    continue;
                };
                let Some(loader) = self.repository.get(upload_id) else {
                    debug!(upload_id = %upload_id, "no loader for element, skipping");
                    continue;
                };

                if *root == RootName::Graveyard {
                    debug!(upload_id = %upload_id, "element removed, aborting upload");
                    loader.abort();
                } else if loader.status() == LoaderStatus::Idle {
                    match self.lifecycle.start(editor, loader, media.id) {
                        Ok(handle) => self.tasks.lock().push(handle),
                        Err(e) => error!(upload_id = %upload_id, error = %e, "could not start upload"),
                    }
                }
            }
        }
    }

    /// Lifecycles still running
    pub fn in_flight(&self) -> usize {
        self.reap();
        self.tasks.lock().len()
    }

    /// Wait for every running lifecycle, including ones started meanwhile.
    ///
    /// Each failure is logged; the first one not yet returned is returned,
    /// including failures of lifecycles that finished before this call.
    pub async fn settle(&self) -> UploadResult<()> {
        let mut first = self.unreported.lock().take();
        loop {
            let handles: Vec<_> = self.tasks.lock().drain(..).collect();
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = Self::joined(handle.await) {
                    error!(error = %e, "upload lifecycle failed");
                    first.get_or_insert(e);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Drop the handles of finished lifecycles, logging their failures
    fn reap(&self) {
        let finished: Vec<_> = {
            let mut tasks = self.tasks.lock();
            let (finished, running): (Vec<_>, Vec<_>) = tasks.drain(..).partition(|h| h.is_finished());
            *tasks = running;
            finished
        };

        for mut handle in finished {
            // A finished handle can still report pending when the task budget is spent
            let Some(joined) = (&mut handle).now_or_never() else {
                self.tasks.lock().push(handle);
                continue;
            };
            if let Err(e) = Self::joined(joined) {
                error!(error = %e, "upload lifecycle failed");
                self.unreported.lock().get_or_insert(e);
            }
        }
    }

    fn joined(joined: Result<UploadResult<()>, tokio::task::JoinError>) -> UploadResult<()> {
        joined.unwrap_or_else(|e| Err(UploadError::task_failed(e.to_string())))
    }
}
