use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{Batch, Notification, Notifier};
use crate::srcset::compute_srcset;
use crate::{
    Attribute, AttributeKey, Editor, ElementId, FileRepository, Loader, LoaderError, LoaderResult,
    LoaderStatus, UploadError, UploadResponse, UploadResult, UploadStatus,
};

/// Drives one loader from `Idle` to a terminal phase while mirroring its
/// progress onto the document element.
#[derive(Clone)]
pub struct UploadLifecycle {
    repository: Arc<FileRepository>,
    notifier: Arc<dyn Notifier>,
}

impl UploadLifecycle {
    pub fn new(repository: Arc<FileRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            notifier,
        }
    }

    /// Begin the lifecycle and spawn the rest of it.
    ///
    /// The `Reading` status is written and the loader's read started before
    /// this returns, so the loader has left `Idle` by then.
    pub fn start(
        &self,
        editor: &Arc<Editor>,
        loader: Arc<dyn Loader>,
        element: ElementId,
    ) -> UploadResult<JoinHandle<UploadResult<()>>> {
        let runtime = Handle::try_current()
            .map_err(|e| UploadError::task_failed(format!("no runtime to upload on: {}", e)))?;

        let read = self.begin(editor, loader.as_ref(), element);
        let lifecycle = self.clone();
        let editor = Arc::clone(editor);
        Ok(runtime.spawn(async move { lifecycle.run(&editor, loader, element, read).await }))
    }

    /// Run the whole lifecycle on the current task
    pub async fn read_and_upload(
        &self,
        editor: &Arc<Editor>,
        loader: Arc<dyn Loader>,
        element: ElementId,
    ) -> UploadResult<()> {
        let read = self.begin(editor, loader.as_ref(), element);
        self.run(editor, loader, element, read).await
    }

    fn begin(
        &self,
        editor: &Arc<Editor>,
        loader: &dyn Loader,
        element: ElementId,
    ) -> BoxFuture<'static, LoaderResult<String>> {
        debug!(upload_id = %loader.id(), element = %element, "upload starting");
        self.write(
            editor,
            Batch::transparent().set_attribute(element, Attribute::UploadStatus(UploadStatus::Reading)),
        );
        loader.read()
    }

    #[instrument(skip_all, fields(upload_id = %loader.id(), element = %element))]
    async fn run(
        &self,
        editor: &Arc<Editor>,
        loader: Arc<dyn Loader>,
        element: ElementId,
        read: BoxFuture<'static, LoaderResult<String>>,
    ) -> UploadResult<()> {
        match self.transfer(editor, loader.as_ref(), element, read).await {
            Ok(response) => self.finish(editor, loader.as_ref(), element, response),
            Err(e) => self.fail(editor, loader.as_ref(), element, e),
        }
    }

    async fn transfer(
        &self,
        editor: &Arc<Editor>,
        loader: &dyn Loader,
        element: ElementId,
        read: BoxFuture<'static, LoaderResult<String>>,
    ) -> LoaderResult<UploadResponse> {
        read.await?;

        let upload = loader.upload();
        self.write(
            editor,
            Batch::transparent().set_attribute(element, Attribute::UploadStatus(UploadStatus::Uploading)),
        );
        upload.await
    }

    /// Write the uploaded sources onto the element.
    ///
    /// A response without a `default` URL leaves nothing to show, so the
    /// element is removed like any failed upload and the error propagated.
    fn finish(
        &self,
        editor: &Arc<Editor>,
        loader: &dyn Loader,
        element: ElementId,
        response: UploadResponse,
    ) -> UploadResult<()> {
        let Some(url) = response.default_url() else {
            error!("upload response has no default URL");
            self.clean(editor, loader, element);
            self.write(editor, Batch::transparent().remove(element));
            return Err(UploadError::MissingDefaultUrl {
                upload_id: loader.id().clone(),
            });
        };

        let mut batch = Batch::transparent()
            .set_attribute(element, Attribute::UploadStatus(UploadStatus::Complete))
            .set_attribute(element, Attribute::Src(url.to_string()));
        if let Some(srcset) = compute_srcset(&response) {
            batch = batch.set_attribute(element, Attribute::SrcSet(srcset));
        }
        self.write(editor, batch);
        self.clean(editor, loader, element);

        info!(src = %url, "upload complete");
        Ok(())
    }

    fn fail(
        &self,
        editor: &Arc<Editor>,
        loader: &dyn Loader,
        element: ElementId,
        error: LoaderError,
    ) -> UploadResult<()> {
        match loader.status() {
            LoaderStatus::Error => {
                self.notifier.show_warning(
                    Notification::new("Upload failed", error.to_string()).with_namespace("upload"),
                );
                self.clean(editor, loader, element);
                self.write(editor, Batch::transparent().remove(element));
                info!(error = %error, "upload failed, element removed");
                Ok(())
            }
            LoaderStatus::Aborted => {
                self.clean(editor, loader, element);
                self.write(editor, Batch::transparent().remove(element));
                info!("upload aborted, element removed");
                Ok(())
            }
            status => {
                error!(status = %status, error = %error, "unexpected upload failure");
                self.clean(editor, loader, element);
                Err(UploadError::unexpected(loader.id().clone(), error))
            }
        }
    }

    /// Strip the transient attributes and release the loader
    fn clean(&self, editor: &Arc<Editor>, loader: &dyn Loader, element: ElementId) {
        self.write(
            editor,
            Batch::transparent()
                .remove_attribute(element, AttributeKey::UploadId)
                .remove_attribute(element, AttributeKey::UploadStatus),
        );
        self.repository.destroy_loader(loader.id());
    }

    fn write(&self, editor: &Arc<Editor>, batch: Batch) {
        if let Err(e) = editor.enqueue_change(batch) {
            warn!(error = %e, "upload bookkeeping change failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DocumentEngine, NodeSpec, Position};
    use crate::memory::{MemoryDocument, MemoryNotifier, MemoryView};
    use crate::{FileLoader, MediaAttributes, MediaFile, ProgressReporter, RootName, UploadAdapter, UploadId};
    use async_trait::async_trait;

    struct ScriptedAdapter(LoaderResult<UploadResponse>);

    #[async_trait]
    impl UploadAdapter for ScriptedAdapter {
        async fn upload(
            &self,
            _upload_id: &UploadId,
            _file: MediaFile,
            _progress: ProgressReporter,
        ) -> LoaderResult<UploadResponse> {
            self.0.clone()
        }
    }

    fn setup(
        response: LoaderResult<UploadResponse>,
    ) -> (Arc<Editor>, Arc<MemoryDocument>, UploadLifecycle, Arc<dyn Loader>, ElementId, Arc<MemoryNotifier>) {
        let document = Arc::new(MemoryDocument::new());
        let editor = Editor::new(document.clone(), Arc::new(MemoryView::new()));
        let repository = Arc::new(FileRepository::new(None));
        let notifier = Arc::new(MemoryNotifier::new());

        let loader: Arc<dyn Loader> = Arc::new(FileLoader::new(
            MediaFile::new("clip.mp4", "video/mp4", vec![7u8; 16]),
            Arc::new(ScriptedAdapter(response)),
        ));
        repository.register(loader.clone());

        let media = NodeSpec::media(MediaAttributes::new().with_upload_id(loader.id().clone()));
        let element = media.id;
        editor
            .enqueue_change(Batch::new().insert(media, Position::new(RootName::Main, 0)))
            .unwrap();

        let lifecycle = UploadLifecycle::new(repository, notifier.clone());
        (editor, document, lifecycle, loader, element, notifier)
    }

    #[tokio::test]
    async fn test_inline_run_sets_source_and_releases_loader() {
        let (editor, document, lifecycle, loader, element, _) =
            setup(Ok(UploadResponse::new().with_url("default", "https://cdn/clip.mp4")));

        lifecycle.read_and_upload(&editor, loader.clone(), element).await.unwrap();

        let media = document.element(element).unwrap();
        assert_eq!(media.attributes.src.as_deref(), Some("https://cdn/clip.mp4"));
        assert!(media.attributes.srcset.is_none());
        assert!(media.upload_id().is_none());
        assert!(!lifecycle.repository.contains(loader.id()));
        assert_eq!(document.undo_steps(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_warns_once() {
        let (editor, document, lifecycle, loader, element, notifier) =
            setup(Err(LoaderError::transport("quota exceeded")));

        lifecycle.read_and_upload(&editor, loader, element).await.unwrap();

        let warnings = notifier.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "quota exceeded");
        assert_eq!(document.root_of(element), Some(RootName::Graveyard));
    }

    #[tokio::test]
    async fn test_missing_default_url_removes_element() {
        let (editor, document, lifecycle, loader, element, notifier) =
            setup(Ok(UploadResponse::new().with_url("480", "https://cdn/clip-480.mp4")));

        let result = lifecycle.read_and_upload(&editor, loader.clone(), element).await;

        assert!(matches!(result, Err(UploadError::MissingDefaultUrl { .. })));
        assert_eq!(document.root_of(element), Some(RootName::Graveyard));
        assert!(!lifecycle.repository.contains(loader.id()));
        assert!(notifier.warnings().is_empty());
        assert_eq!(document.undo_steps(), 1);
    }

    #[test]
    fn test_start_requires_runtime() {
        let (editor, _, lifecycle, loader, element, _) =
            setup(Ok(UploadResponse::new().with_url("default", "x")));

        let result = lifecycle.start(&editor, loader.clone(), element);

        assert!(matches!(result, Err(UploadError::TaskFailed { .. })));
        assert_eq!(loader.status(), LoaderStatus::Idle);
    }
}
