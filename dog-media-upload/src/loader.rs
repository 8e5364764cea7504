use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{LoaderError, LoaderResult, LoaderStatus, MediaFile, UploadId, UploadResponse};

/// One file's transfer, as consumed by the upload core.
///
/// `read` and `upload` behave like promises: calling them moves the loader
/// out of its current phase immediately, before the returned future is
/// polled. That makes `Idle` a one-way gate observers can rely on.
pub trait Loader: Send + Sync {
    fn id(&self) -> &UploadId;

    fn status(&self) -> LoaderStatus;

    /// Local preview of the file, available once `read` succeeded
    fn data(&self) -> Option<String>;

    fn read(&self) -> BoxFuture<'static, LoaderResult<String>>;

    fn upload(&self) -> BoxFuture<'static, LoaderResult<UploadResponse>>;

    /// Cooperative cancellation: flips the phase to `Aborted` unless terminal
    fn abort(&self);

    /// Upload progress in percent (0-100)
    fn progress(&self) -> watch::Receiver<f64>;
}

/// Handle given to transports to publish upload progress
#[derive(Clone)]
pub struct ProgressReporter {
    percent: Arc<watch::Sender<f64>>,
}

impl ProgressReporter {
    /// Report bytes sent so far out of `total`
    pub fn update(&self, uploaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        self.set_percent(uploaded as f64 / total as f64 * 100.0);
    }

    pub fn set_percent(&self, percent: f64) {
        self.percent.send_replace(percent.clamp(0.0, 100.0));
    }
}

/// Network side of an upload. Implemented by the host application.
#[async_trait]
pub trait UploadAdapter: Send + Sync {
    /// Send the file and return the server's URL map
    async fn upload(
        &self,
        upload_id: &UploadId,
        file: MediaFile,
        progress: ProgressReporter,
    ) -> LoaderResult<UploadResponse>;

    /// Called when an in-flight upload is aborted
    fn abort(&self, _upload_id: &UploadId) {}
}

/// Default loader: base64 preview on read, adapter-driven upload
pub struct FileLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    id: UploadId,
    file: MediaFile,
    adapter: Arc<dyn UploadAdapter>,
    status: watch::Sender<LoaderStatus>,
    data: RwLock<Option<String>>,
    progress: Arc<watch::Sender<f64>>,
}

impl FileLoader {
    pub fn new(file: MediaFile, adapter: Arc<dyn UploadAdapter>) -> Self {
        Self::with_id(UploadId::new(), file, adapter)
    }

    pub fn with_id(id: UploadId, file: MediaFile, adapter: Arc<dyn UploadAdapter>) -> Self {
        let (status, _) = watch::channel(LoaderStatus::Idle);
        let (progress, _) = watch::channel(0.0);

        Self {
            inner: Arc::new(LoaderInner {
                id,
                file,
                adapter,
                status,
                data: RwLock::new(None),
                progress: Arc::new(progress),
            }),
        }
    }

    pub fn file(&self) -> &MediaFile {
        &self.inner.file
    }
}

impl LoaderInner {
    fn status(&self) -> LoaderStatus {
        *self.status.borrow()
    }

    /// Atomically move from `expected` to `next`
    fn transition(&self, expected: LoaderStatus, next: LoaderStatus) -> LoaderResult<()> {
        let mut actual = expected;
        let changed = self.status.send_if_modified(|current| {
            if *current == expected {
                *current = next;
                true
            } else {
                actual = *current;
                false
            }
        });

        if changed {
            Ok(())
        } else {
            Err(LoaderError::InvalidState { expected, actual })
        }
    }

    /// Record a failure unless the loader was aborted meanwhile
    fn fail(&self, error: LoaderError) -> LoaderError {
        if self.status() == LoaderStatus::Aborted {
            return LoaderError::Aborted;
        }
        let next = if error == LoaderError::Aborted {
            LoaderStatus::Aborted
        } else {
            LoaderStatus::Error
        };
        self.status.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = next;
                true
            }
        });
        error
    }

    fn encode_preview(&self) -> LoaderResult<String> {
        if self.file.data.is_empty() {
            return Err(LoaderError::read(format!("{} is empty", self.file.name)));
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.file.data);
        Ok(format!("data:{};base64,{}", self.file.mime_type, encoded))
    }
}

/// Resolves once the loader is aborted
async fn aborted(mut status: watch::Receiver<LoaderStatus>) {
    if status
        .wait_for(|s| *s == LoaderStatus::Aborted)
        .await
        .is_err()
    {
        future::pending::<()>().await;
    }
}

impl Loader for FileLoader {
    fn id(&self) -> &UploadId {
        &self.inner.id
    }

    fn status(&self) -> LoaderStatus {
        self.inner.status()
    }

    fn data(&self) -> Option<String> {
        self.inner.data.read().clone()
    }

    fn read(&self) -> BoxFuture<'static, LoaderResult<String>> {
        if let Err(e) = self.inner.transition(LoaderStatus::Idle, LoaderStatus::Reading) {
            return future::ready(Err(e)).boxed();
        }

        let inner = Arc::clone(&self.inner);
        async move {
            // Yield once so an abort issued right after `read()` wins.
            tokio::task::yield_now().await;
            if inner.status() == LoaderStatus::Aborted {
                return Err(LoaderError::Aborted);
            }

            match inner.encode_preview() {
                Ok(data) => {
                    *inner.data.write() = Some(data.clone());
                    debug!(upload_id = %inner.id, bytes = inner.file.size(), "file read");
                    Ok(data)
                }
                Err(e) => Err(inner.fail(e)),
            }
        }
        .boxed()
    }

    fn upload(&self) -> BoxFuture<'static, LoaderResult<UploadResponse>> {
        if let Err(e) = self
            .inner
            .transition(LoaderStatus::Reading, LoaderStatus::Uploading)
        {
            return future::ready(Err(e)).boxed();
        }

        let inner = Arc::clone(&self.inner);
        async move {
            let reporter = ProgressReporter {
                percent: Arc::clone(&inner.progress),
            };
            let status = inner.status.subscribe();

            let result = tokio::select! {
                biased;
                _ = aborted(status) => Err(LoaderError::Aborted),
                result = inner.adapter.upload(&inner.id, inner.file.clone(), reporter) => result,
            };

            match result {
                Ok(response) => match inner.transition(LoaderStatus::Uploading, LoaderStatus::Complete) {
                    Ok(()) => Ok(response),
                    Err(_) => Err(LoaderError::Aborted),
                },
                Err(e) => {
                    let e = inner.fail(e);
                    if e != LoaderError::Aborted {
                        warn!(upload_id = %inner.id, error = %e, "transport reported failure");
                    }
                    Err(e)
                }
            }
        }
        .boxed()
    }

    fn abort(&self) {
        let mut previous = LoaderStatus::Idle;
        let changed = self.inner.status.send_if_modified(|current| {
            previous = *current;
            if current.is_terminal() {
                false
            } else {
                *current = LoaderStatus::Aborted;
                true
            }
        });

        if changed {
            debug!(upload_id = %self.inner.id, from = %previous, "loader aborted");
            if previous == LoaderStatus::Uploading {
                self.inner.adapter.abort(&self.inner.id);
            }
        }
    }

    fn progress(&self) -> watch::Receiver<f64> {
        self.inner.progress.subscribe()
    }
}
