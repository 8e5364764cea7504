use std::sync::Arc;

use tracing::info;

use crate::engine::Notifier;
use crate::hub::{listener, ChangeEvent, ChangePattern, ListenerId};
use crate::{
    AttributeKey, Editor, ElementId, FileRepository, MediaFile, MediaUploadCommand, MediaUploadUi, ProgressRenderer,
    UploadAdapter, UploadConfig, UploadCoordinator, UploadLifecycle, UploadResult,
};

/// Wires the upload feature into an editor
pub struct MediaUpload {
    editor: Arc<Editor>,
    repository: Arc<FileRepository>,
    coordinator: Arc<UploadCoordinator>,
    renderer: Arc<ProgressRenderer>,
    command: Arc<MediaUploadCommand>,
    ui: MediaUploadUi,
    listeners: Vec<ListenerId>,
}

impl MediaUpload {
    pub const PLUGIN_NAME: &'static str = "MediaUpload";

    /// Install with a repository built around `adapter`.
    ///
    /// Without an adapter the feature is installed but no upload can start.
    pub fn install(
        editor: &Arc<Editor>,
        config: UploadConfig,
        adapter: Option<Arc<dyn UploadAdapter>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_repository(editor, config, Arc::new(FileRepository::new(adapter)), notifier)
    }

    pub fn with_repository(
        editor: &Arc<Editor>,
        config: UploadConfig,
        repository: Arc<FileRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let lifecycle = UploadLifecycle::new(Arc::clone(&repository), notifier);
        let coordinator = Arc::new(UploadCoordinator::new(Arc::clone(&repository), lifecycle));
        let renderer = Arc::new(ProgressRenderer::new(
            Arc::clone(editor.view()),
            Arc::clone(&repository),
            config.clone(),
        ));

        let on_document = {
            let coordinator = Arc::clone(&coordinator);
            editor.on(
                ChangePattern::Document,
                listener(move |editor, event| {
                    if let ChangeEvent::Document(changes) = event {
                        coordinator.handle_changes(editor, changes);
                    }
                }),
            )
        };
        let on_status = {
            let renderer = Arc::clone(&renderer);
            editor.on(
                ChangePattern::Attribute(AttributeKey::UploadStatus),
                listener(move |editor, event| {
                    if let ChangeEvent::Attribute(change) = event {
                        if let Some(element) = editor.document().element(change.element) {
                            renderer.upload_status_changed(&element, change);
                        }
                    }
                }),
            )
        };

        let command = Arc::new(MediaUploadCommand::new(Arc::clone(editor), Arc::clone(&repository)));
        let ui = MediaUploadUi::new(Arc::clone(&command), config.clone());

        info!(plugin = Self::PLUGIN_NAME, types = %config.accepted_types(), "media upload installed");

        Self {
            editor: Arc::clone(editor),
            repository,
            coordinator,
            renderer,
            command,
            ui,
            listeners: vec![on_document, on_status],
        }
    }

    pub fn repository(&self) -> &Arc<FileRepository> {
        &self.repository
    }

    pub fn coordinator(&self) -> &Arc<UploadCoordinator> {
        &self.coordinator
    }

    pub fn renderer(&self) -> &Arc<ProgressRenderer> {
        &self.renderer
    }

    pub fn command(&self) -> &Arc<MediaUploadCommand> {
        &self.command
    }

    pub fn ui(&self) -> &MediaUploadUi {
        &self.ui
    }

    /// Shorthand for the command's `execute`
    pub fn execute<I>(&self, files: I) -> UploadResult<Vec<ElementId>>
    where
        I: IntoIterator<Item = MediaFile>,
    {
        self.command.execute(files)
    }

    /// Wait for all running uploads
    pub async fn settle(&self) -> UploadResult<()> {
        self.coordinator.settle().await
    }

    /// Detach from the editor. Running uploads keep going.
    pub fn uninstall(mut self) {
        for id in self.listeners.drain(..) {
            self.editor.off(id);
        }
        info!(plugin = Self::PLUGIN_NAME, "media upload uninstalled");
    }
}
