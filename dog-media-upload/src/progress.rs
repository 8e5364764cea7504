//! View-side feedback for pending uploads.
//!
//! Reacts to `uploadStatus` changes and decorates the rendered element:
//! placeholder while reading, a progress bar bound to the loader while
//! uploading, and a short-lived complete indicator once done.

use std::sync::Arc;

use base64::Engine;
use once_cell::sync::Lazy;
use tokio::runtime::Handle;
use tracing::debug;

use crate::engine::{AttributeChange, EditingView, OverlayTag};
use crate::{ElementId, FileRepository, Loader, MediaElement, UploadConfig, UploadStatus};

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 700 250"><rect rx="4"/></svg>"##;

/// Graphic shown instead of the media while its file is being read
pub static PLACEHOLDER: Lazy<String> = Lazy::new(|| {
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(PLACEHOLDER_SVG)
    )
});

/// Class driving the fade-in of a freshly inserted element
pub const APPEAR_CLASS: &str = "media-appear";

pub struct ProgressRenderer {
    view: Arc<dyn EditingView>,
    repository: Arc<FileRepository>,
    config: UploadConfig,
}

impl ProgressRenderer {
    pub fn new(view: Arc<dyn EditingView>, repository: Arc<FileRepository>, config: UploadConfig) -> Self {
        Self {
            view,
            repository,
            config,
        }
    }

    /// Entry point for `uploadStatus` attribute changes.
    ///
    /// A status on an element without `uploadId` is treated as no status.
    pub fn upload_status_changed(&self, element: &MediaElement, change: &AttributeChange) {
        let status = element.upload_id().and(change.new_upload_status());
        self.apply_status(element, status);
    }

    pub fn apply_status(&self, element: &MediaElement, status: Option<UploadStatus>) {
        let id = element.id;
        if !self.view.is_rendered(id) {
            return;
        }
        debug!(element = %id, status = ?status, "rendering upload status");

        let loader = element.upload_id().and_then(|upload_id| self.repository.get(upload_id));

        match (status, loader) {
            (Some(UploadStatus::Reading), _) | (Some(UploadStatus::Uploading), None) => {
                self.start_appear_effect(id);
                self.show_placeholder(id);
                return;
            }
            (Some(UploadStatus::Uploading), Some(loader)) => {
                self.start_appear_effect(id);
                self.hide_placeholder(id);
                self.show_progress_bar(id, loader.as_ref());
                if let Some(data) = loader.data() {
                    self.view.set_source(id, &data);
                }
                return;
            }
            (Some(UploadStatus::Complete), Some(_)) if self.config.complete_indicator => {
                self.show_complete_icon(id);
            }
            _ => {}
        }

        self.hide_progress_bar(id);
        self.hide_placeholder(id);
        self.view.remove_class(id, APPEAR_CLASS);
    }

    fn start_appear_effect(&self, id: ElementId) {
        if !self.view.has_class(id, APPEAR_CLASS) {
            self.view.add_class(id, APPEAR_CLASS);
        }
    }

    fn show_placeholder(&self, id: ElementId) {
        let class = OverlayTag::Placeholder.class();
        if !self.view.has_class(id, class) {
            self.view.add_class(id, class);
        }
        if self.view.source(id).as_deref() != Some(PLACEHOLDER.as_str()) {
            self.view.set_source(id, &PLACEHOLDER);
        }
        if self.view.find_overlay(id, OverlayTag::Placeholder).is_none() {
            self.view.insert_overlay(id, OverlayTag::Placeholder);
        }
    }

    fn hide_placeholder(&self, id: ElementId) {
        let class = OverlayTag::Placeholder.class();
        if self.view.has_class(id, class) {
            self.view.remove_class(id, class);
        }
        self.remove_overlay(id, OverlayTag::Placeholder);
    }

    fn show_progress_bar(&self, id: ElementId, loader: &dyn Loader) {
        if self.view.find_overlay(id, OverlayTag::ProgressBar).is_some() {
            return;
        }
        let Some(overlay) = self.view.insert_overlay(id, OverlayTag::ProgressBar) else {
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            debug!(element = %id, "no runtime, progress bar stays static");
            return;
        };

        let view = Arc::clone(&self.view);
        let mut progress = loader.progress();
        runtime.spawn(async move {
            while progress.changed().await.is_ok() {
                let percent = *progress.borrow_and_update();
                if !view.set_overlay_width(id, overlay, percent) {
                    break;
                }
            }
        });
    }

    fn hide_progress_bar(&self, id: ElementId) {
        self.remove_overlay(id, OverlayTag::ProgressBar);
    }

    fn show_complete_icon(&self, id: ElementId) {
        if self.view.find_overlay(id, OverlayTag::CompleteIcon).is_some() {
            return;
        }
        let Some(overlay) = self.view.insert_overlay(id, OverlayTag::CompleteIcon) else {
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            self.view.remove_overlay(id, overlay);
            return;
        };

        let view = Arc::clone(&self.view);
        let delay = self.config.complete_indicator_delay();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            view.remove_overlay(id, overlay);
        });
    }

    fn remove_overlay(&self, id: ElementId, tag: OverlayTag) {
        if let Some(overlay) = self.view.find_overlay(id, tag) {
            self.view.remove_overlay(id, overlay);
        }
    }
}
