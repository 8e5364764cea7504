use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};

use dog_media_upload::engine::{NodeSpec, Position};
use dog_media_upload::hub::{listener, ChangeEvent, ChangePattern};
use dog_media_upload::memory::{MemoryDocument, MemoryNotifier, MemoryView};
use dog_media_upload::{
    AttributeKey, Batch, DocumentEngine, EditingView, Editor, ElementId, Loader, LoaderError, LoaderResult, LoaderStatus,
    MediaAttributes, MediaFile, MediaUpload, OverlayTag, ProgressReporter, RootName, UploadAdapter,
    UploadConfig, UploadError, UploadId, UploadResponse, UploadStatus, APPEAR_CLASS, PLACEHOLDER,
};

/// Transport double: reports 40% once started, then waits for a release permit
struct ScriptedAdapter {
    response: LoaderResult<UploadResponse>,
    started: Semaphore,
    release: Semaphore,
    aborts: AtomicUsize,
}

impl ScriptedAdapter {
    fn gated(response: LoaderResult<UploadResponse>) -> Arc<Self> {
        Arc::new(Self {
            response,
            started: Semaphore::new(0),
            release: Semaphore::new(0),
            aborts: AtomicUsize::new(0),
        })
    }

    fn immediate(response: LoaderResult<UploadResponse>) -> Arc<Self> {
        let adapter = Self::gated(response);
        adapter.release.add_permits(64);
        adapter
    }

    async fn wait_started(&self) {
        self.started.acquire().await.unwrap().forget();
    }

    fn release(&self) {
        self.release.add_permits(1);
    }
}

#[async_trait]
impl UploadAdapter for ScriptedAdapter {
    async fn upload(
        &self,
        _upload_id: &UploadId,
        _file: MediaFile,
        progress: ProgressReporter,
    ) -> LoaderResult<UploadResponse> {
        progress.set_percent(40.0);
        self.started.add_permits(1);
        self.release.acquire().await.unwrap().forget();
        progress.set_percent(100.0);
        self.response.clone()
    }

    fn abort(&self, _upload_id: &UploadId) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader whose read fails while it still claims to be reading
struct StuckLoader {
    id: UploadId,
    status: watch::Sender<LoaderStatus>,
    progress: watch::Sender<f64>,
}

impl StuckLoader {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: UploadId::from(id),
            status: watch::channel(LoaderStatus::Idle).0,
            progress: watch::channel(0.0).0,
        })
    }
}

impl Loader for StuckLoader {
    fn id(&self) -> &UploadId {
        &self.id
    }

    fn status(&self) -> LoaderStatus {
        *self.status.borrow()
    }

    fn data(&self) -> Option<String> {
        None
    }

    fn read(&self) -> BoxFuture<'static, LoaderResult<String>> {
        self.status.send_replace(LoaderStatus::Reading);
        future::ready(Err(LoaderError::read("disk gone"))).boxed()
    }

    fn upload(&self) -> BoxFuture<'static, LoaderResult<UploadResponse>> {
        future::ready(Err(LoaderError::transport("not reached"))).boxed()
    }

    fn abort(&self) {
        self.status.send_replace(LoaderStatus::Aborted);
    }

    fn progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }
}

struct Harness {
    editor: Arc<Editor>,
    document: Arc<MemoryDocument>,
    view: Arc<MemoryView>,
    notifier: Arc<MemoryNotifier>,
    upload: MediaUpload,
    statuses: Arc<Mutex<Vec<(ElementId, Option<UploadStatus>)>>>,
}

impl Harness {
    fn statuses_of(&self, id: ElementId) -> Vec<Option<UploadStatus>> {
        self.statuses
            .lock()
            .iter()
            .filter(|(element, _)| *element == id)
            .map(|(_, status)| *status)
            .collect()
    }
}

fn harness(adapter: Option<Arc<ScriptedAdapter>>, config: UploadConfig) -> Harness {
    let document = Arc::new(MemoryDocument::new());
    let view = Arc::new(MemoryView::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let editor = Editor::new(document.clone(), view.clone());

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let log = statuses.clone();
    editor.on(
        ChangePattern::Attribute(AttributeKey::UploadStatus),
        listener(move |_, event| {
            if let ChangeEvent::Attribute(change) = event {
                log.lock().push((change.element, change.new_upload_status()));
            }
        }),
    );

    let adapter = adapter.map(|a| a as Arc<dyn UploadAdapter>);
    let upload = MediaUpload::install(&editor, config, adapter, notifier.clone());

    Harness {
        editor,
        document,
        view,
        notifier,
        upload,
        statuses,
    }
}

fn video(name: &str) -> MediaFile {
    MediaFile::new(name, "video/mp4", b"not really a video".to_vec())
}

fn response() -> UploadResponse {
    UploadResponse::new()
        .with_url("default", "https://cdn/clip.mp4")
        .with_url("1920", "https://cdn/clip-1920.mp4")
        .with_url("800", "https://cdn/clip-800.mp4")
}

async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// S1. Happy path with responsive sources
#[tokio::test]
async fn test_upload_completes_with_srcset() {
    let adapter = ScriptedAdapter::gated(Ok(response()));
    let h = harness(Some(adapter.clone()), UploadConfig::default());

    // Act: pick one file
    let ids = h.upload.execute(vec![video("clip.mp4")]).unwrap();
    let id = ids[0];

    // Assert: reading state is rendered synchronously
    let element = h.document.element(id).unwrap();
    assert_eq!(element.upload_status(), Some(UploadStatus::Reading));
    let rendered = h.view.rendered(id).unwrap();
    assert!(rendered.classes.contains(APPEAR_CLASS));
    assert_eq!(rendered.source.as_deref(), Some(PLACEHOLDER.as_str()));
    assert_eq!(h.upload.coordinator().in_flight(), 1);

    // Act: let the transport start
    adapter.wait_started().await;

    // Assert: uploading with a single progress bar and the local preview
    assert_eq!(h.document.element(id).unwrap().upload_status(), Some(UploadStatus::Uploading));
    let rendered = h.view.rendered(id).unwrap();
    assert_eq!(rendered.overlay_tags(), vec![OverlayTag::ProgressBar]);
    assert!(rendered.source.unwrap().starts_with("data:video/mp4;base64,"));

    // Act: finish the transfer
    adapter.release();
    tokio_test::assert_ok!(h.upload.settle().await);

    // Assert: final attributes, transient state gone
    let element = h.document.element(id).unwrap();
    assert_eq!(element.attributes.src.as_deref(), Some("https://cdn/clip.mp4"));
    let srcset = element.attributes.srcset.clone().unwrap();
    assert_eq!(srcset.data, "https://cdn/clip-800.mp4 800w, https://cdn/clip-1920.mp4 1920w");
    assert_eq!(srcset.width, 1920);
    assert!(element.upload_id().is_none());
    assert!(element.upload_status().is_none());
    assert!(h.upload.repository().is_empty());

    let rendered = h.view.rendered(id).unwrap();
    assert_eq!(rendered.source.as_deref(), Some("https://cdn/clip.mp4"));
    assert!(!rendered.classes.contains(APPEAR_CLASS));
    assert!(!rendered.classes.contains(OverlayTag::Placeholder.class()));
    assert_eq!(rendered.overlay_tags(), vec![OverlayTag::CompleteIcon]);

    // Statuses only move forward
    assert_eq!(
        h.statuses_of(id),
        vec![
            Some(UploadStatus::Reading),
            Some(UploadStatus::Uploading),
            Some(UploadStatus::Complete),
            None
        ]
    );
    assert!(h.notifier.warnings().is_empty());
}

/// S2. Bookkeeping stays out of the undo history
#[tokio::test]
async fn test_only_insertion_is_undoable() {
    let adapter = ScriptedAdapter::immediate(Ok(response()));
    let h = harness(Some(adapter), UploadConfig::default());

    // Act
    h.upload
        .execute(vec![video("a.mp4"), video("b.mp4")])
        .unwrap();
    h.upload.settle().await.unwrap();

    // Assert: both files in one user step
    assert_eq!(h.document.undo_steps(), 1);
    assert_eq!(h.document.history()[0].operations.len(), 2);
    assert_eq!(h.document.root_children(RootName::Main).len(), 2);
}

/// S3. Deleting the element mid-upload aborts it silently
#[tokio::test]
async fn test_removed_element_aborts_upload() {
    let adapter = ScriptedAdapter::gated(Ok(response()));
    let h = harness(Some(adapter.clone()), UploadConfig::default());
    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];
    let upload_id = h.document.element(id).unwrap().upload_id().cloned().unwrap();
    let loader = h.upload.repository().get(&upload_id).unwrap();
    adapter.wait_started().await;

    // Act: the user deletes the element
    h.editor.enqueue_change(Batch::new().remove(id)).unwrap();
    h.upload.settle().await.unwrap();

    // Assert
    assert_eq!(loader.status(), LoaderStatus::Aborted);
    assert_eq!(adapter.aborts.load(Ordering::SeqCst), 1);
    assert!(h.document.element(id).is_none());
    assert!(!h.view.is_rendered(id));
    assert!(h.upload.repository().is_empty());
    assert!(h.notifier.warnings().is_empty());
}

/// S4. Transport failure warns the user and drops the element
#[tokio::test]
async fn test_transport_error_notifies_and_removes() {
    let adapter = ScriptedAdapter::immediate(Err(LoaderError::transport("network down")));
    let h = harness(Some(adapter), UploadConfig::default());

    // Act
    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];
    h.upload.settle().await.unwrap();

    // Assert
    let warnings = h.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].title, "Upload failed");
    assert_eq!(warnings[0].message, "network down");
    assert_eq!(warnings[0].namespace, "upload");

    assert!(!h.document.contains(id));
    assert!(!h.view.is_rendered(id));
    assert!(h.upload.repository().is_empty());
}

/// S5. Element from a remote change whose loader lives elsewhere
#[tokio::test]
async fn test_remote_element_keeps_placeholder() {
    let adapter = ScriptedAdapter::immediate(Ok(response()));
    let h = harness(Some(adapter), UploadConfig::default());

    // Act: a collaborator's element arrives mid-upload
    let media = NodeSpec::media(
        MediaAttributes::new()
            .with_upload_id(UploadId::from("L9"))
            .with_upload_status(UploadStatus::Uploading),
    );
    let id = media.id;
    h.editor
        .enqueue_change(Batch::transparent().insert(media, Position::new(RootName::Main, 0)))
        .unwrap();

    // Assert: placeholder shown, nothing started
    let rendered = h.view.rendered(id).unwrap();
    assert!(rendered.classes.contains(APPEAR_CLASS));
    assert!(rendered.classes.contains(OverlayTag::Placeholder.class()));
    assert_eq!(rendered.overlay_tags(), vec![OverlayTag::Placeholder]);
    assert_eq!(rendered.source.as_deref(), Some(PLACEHOLDER.as_str()));
    assert_eq!(h.upload.coordinator().in_flight(), 0);
    assert_eq!(
        h.document.element(id).unwrap().upload_status(),
        Some(UploadStatus::Uploading)
    );
}

/// S6. Failures outside `Error`/`Aborted` reach the caller
#[tokio::test]
async fn test_unexpected_failure_is_propagated() {
    let h = harness(None, UploadConfig::default());
    let loader = StuckLoader::new("stuck");
    h.upload.repository().register(loader.clone());

    // Act
    let media = NodeSpec::media(MediaAttributes::new().with_upload_id(UploadId::from("stuck")));
    let id = media.id;
    h.editor
        .enqueue_change(Batch::new().insert(media, Position::new(RootName::Main, 0)))
        .unwrap();
    let result = h.upload.settle().await;

    // Assert: propagated, element kept, transient state cleaned
    let err = tokio_test::assert_err!(result);
    assert!(matches!(
        err,
        UploadError::UnexpectedFailure { ref upload_id, .. } if upload_id.as_str() == "stuck"
    ));
    let element = h.document.element(id).unwrap();
    assert!(element.is_attached());
    assert!(element.upload_id().is_none());
    assert!(element.upload_status().is_none());
    assert!(h.upload.repository().is_empty());
    assert!(h.notifier.warnings().is_empty());
}

/// S7. A response without `default` is a broken transport
#[tokio::test]
async fn test_missing_default_url_fails() {
    let adapter = ScriptedAdapter::immediate(Ok(UploadResponse::new().with_url("800", "https://cdn/800.mp4")));
    let h = harness(Some(adapter), UploadConfig::default());

    // Act
    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];
    let result = h.upload.settle().await;

    // Assert: propagated and the empty element is gone
    assert!(matches!(result, Err(UploadError::MissingDefaultUrl { .. })));
    assert!(!h.document.contains(id));
    assert!(!h.view.is_rendered(id));
    assert!(h.upload.repository().is_empty());
    assert!(h.notifier.warnings().is_empty());
}

/// S14. A failure that finished unobserved still reaches `settle`
#[tokio::test]
async fn test_unexpected_failure_survives_reaping() {
    let h = harness(None, UploadConfig::default());
    h.upload.repository().register(StuckLoader::new("stuck"));

    // Act: the lifecycle fails and its handle is reaped before settling
    h.editor
        .enqueue_change(Batch::new().insert(
            NodeSpec::media(MediaAttributes::new().with_upload_id(UploadId::from("stuck"))),
            Position::new(RootName::Main, 0),
        ))
        .unwrap();
    let coordinator = h.upload.coordinator().clone();
    eventually(move || coordinator.in_flight() == 0).await;

    // Assert: reported once
    let err = tokio_test::assert_err!(h.upload.settle().await);
    assert!(matches!(err, UploadError::UnexpectedFailure { .. }));
    tokio_test::assert_ok!(h.upload.settle().await);
}

/// S8. Progress events drive the bar width
#[tokio::test]
async fn test_progress_bar_follows_loader() {
    let adapter = ScriptedAdapter::gated(Ok(response()));
    let h = harness(Some(adapter.clone()), UploadConfig::default());
    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];

    // Act
    adapter.wait_started().await;

    // Assert
    let view = h.view.clone();
    eventually(move || {
        view.rendered(id)
            .and_then(|r| r.overlay(OverlayTag::ProgressBar).and_then(|o| o.width))
            == Some(40.0)
    })
    .await;

    adapter.release();
    h.upload.settle().await.unwrap();
    assert!(h.view.rendered(id).unwrap().overlay(OverlayTag::ProgressBar).is_none());
}

/// S9. The complete indicator disappears on its own
#[tokio::test(start_paused = true)]
async fn test_complete_indicator_expires() {
    let adapter = ScriptedAdapter::immediate(Ok(response()));
    let h = harness(Some(adapter), UploadConfig::default());

    // Act
    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];
    h.upload.settle().await.unwrap();

    // Assert
    tokio::time::sleep(Duration::from_millis(2999)).await;
    assert!(h.view.rendered(id).unwrap().overlay(OverlayTag::CompleteIcon).is_some());
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(h.view.rendered(id).unwrap().overlays.is_empty());
}

/// S10. Disabled indicator leaves no overlay behind
#[tokio::test]
async fn test_complete_indicator_disabled() {
    let adapter = ScriptedAdapter::immediate(Ok(response()));
    let h = harness(Some(adapter), UploadConfig::default().without_complete_indicator());

    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];
    h.upload.settle().await.unwrap();

    assert!(h.view.rendered(id).unwrap().overlays.is_empty());
}

/// S11. A loader past `Idle` is never started twice
#[tokio::test]
async fn test_duplicate_upload_id_is_not_restarted() {
    let adapter = ScriptedAdapter::gated(Ok(response()));
    let h = harness(Some(adapter.clone()), UploadConfig::default());
    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];
    let upload_id = h.document.element(id).unwrap().upload_id().cloned().unwrap();
    adapter.wait_started().await;

    // Act: a copy of the pending element is pasted elsewhere
    let copy = NodeSpec::media(MediaAttributes::new().with_upload_id(upload_id));
    let copy_id = copy.id;
    h.editor
        .enqueue_change(Batch::new().insert(copy, Position::new(RootName::Main, 0)))
        .unwrap();

    // Assert: still one lifecycle, the copy is left alone
    assert_eq!(h.upload.coordinator().in_flight(), 1);

    adapter.release();
    h.upload.settle().await.unwrap();

    assert!(h.statuses_of(copy_id).is_empty());
    assert!(h.document.element(copy_id).unwrap().upload_status().is_none());
    assert_eq!(
        h.document.element(id).unwrap().attributes.src.as_deref(),
        Some("https://cdn/clip.mp4")
    );
}

/// S12. Deleting the element while the file is still being read
#[tokio::test]
async fn test_removed_during_read_is_released() {
    let adapter = ScriptedAdapter::gated(Ok(response()));
    let h = harness(Some(adapter.clone()), UploadConfig::default());
    let id = h.upload.execute(vec![video("clip.mp4")]).unwrap()[0];
    let upload_id = h.document.element(id).unwrap().upload_id().cloned().unwrap();
    let loader = h.upload.repository().get(&upload_id).unwrap();
    assert_eq!(loader.status(), LoaderStatus::Reading);

    // Act: removed before the read future gets polled
    h.editor.enqueue_change(Batch::new().remove(id)).unwrap();
    h.upload.settle().await.unwrap();

    // Assert: silent removal, transport never reached
    assert_eq!(loader.status(), LoaderStatus::Aborted);
    assert_eq!(adapter.aborts.load(Ordering::SeqCst), 0);
    assert!(!h.document.contains(id));
    assert!(h.upload.repository().is_empty());
    assert!(h.notifier.warnings().is_empty());
}

/// S13. Finished lifecycles are dropped without settling
#[tokio::test]
async fn test_finished_uploads_leave_nothing_in_flight() {
    let adapter = ScriptedAdapter::immediate(Ok(response()));
    let h = harness(Some(adapter), UploadConfig::default());

    // Act: twenty separate picks, never settled
    for i in 0..20 {
        h.upload.execute(vec![video(&format!("clip-{}.mp4", i))]).unwrap();
    }

    // Assert
    let repository = h.upload.repository().clone();
    eventually(move || repository.is_empty()).await;
    let coordinator = h.upload.coordinator().clone();
    eventually(move || coordinator.in_flight() == 0).await;
    assert_eq!(h.document.root_children(RootName::Main).len(), 20);
}

/// U1. The picker only forwards allowed video types
#[tokio::test]
async fn test_ui_filters_file_types() {
    let adapter = ScriptedAdapter::immediate(Ok(response()));
    let h = harness(Some(adapter), UploadConfig::default());
    let ui = h.upload.ui();

    // Assert: button model
    assert_eq!(ui.button().label, "Upload and insert video");
    assert_eq!(ui.button().accepted_type, "video/mp4,video/m4v");
    assert!(!ui.button().allow_multiple_files);
    assert!(ui.is_enabled());

    // Act: nothing acceptable
    let none = ui
        .files_selected(vec![
            MediaFile::new("a.webm", "video/webm", vec![1u8]),
            MediaFile::new("a.png", "image/png", vec![1u8]),
        ])
        .unwrap();
    assert!(none.is_empty());
    assert!(h.document.root_children(RootName::Main).is_empty());

    // Act: one acceptable file among others
    let some = ui
        .files_dropped(vec![
            MediaFile::new("a.webm", "video/webm", vec![1u8]),
            MediaFile::new("b.m4v", "video/m4v", vec![1u8]),
        ])
        .unwrap();
    assert_eq!(some.len(), 1);
    h.upload.settle().await.unwrap();

    // Selection now sits on the new media
    assert!(!ui.is_enabled());
}

/// U2. Without a transport nothing is inserted
#[tokio::test]
async fn test_missing_adapter_inserts_nothing() {
    let h = harness(None, UploadConfig::default());

    let ids = h.upload.execute(vec![video("clip.mp4")]).unwrap();

    assert!(ids.is_empty());
    assert!(h.document.root_children(RootName::Main).is_empty());
    assert_eq!(h.document.undo_steps(), 0);
}

/// U3. Uninstalling stops reacting to new elements
#[tokio::test]
async fn test_uninstall_detaches_listeners() {
    let adapter = ScriptedAdapter::immediate(Ok(response()));
    let h = harness(Some(adapter), UploadConfig::default());
    let repository = h.upload.repository().clone();
    let loader = repository.create_loader(video("late.mp4")).unwrap();

    // Act
    h.upload.uninstall();
    h.editor
        .enqueue_change(Batch::new().insert(
            NodeSpec::media(MediaAttributes::new().with_upload_id(loader.id().clone())),
            Position::new(RootName::Main, 0),
        ))
        .unwrap();

    // Assert
    assert_eq!(loader.status(), LoaderStatus::Idle);
}
