//! # dog-media-upload: upload lifecycle for media elements in a document editor
//!
//! `dog-media-upload` takes care of everything between "the user picked a
//! video" and "the document points at the uploaded URL". It watches the
//! document for inserted media elements carrying an `uploadId`, drives the
//! matching loader through read and upload, mirrors each phase onto the
//! element, and renders placeholder, progress bar and completion feedback.
//!
//! ## Key Features
//!
//! - **Change-driven**: uploads start when a pending element enters the document
//!   and abort when it is removed, whatever removed it
//! - **Undo-safe**: all bookkeeping goes through transparent batches that never
//!   reach the undo history
//! - **Transport agnostic**: plug any network layer in through [`UploadAdapter`]
//! - **Engine agnostic**: the document, view and notification area are traits;
//!   [`memory`] ships in-memory implementations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dog_media_upload::prelude::*;
//! use dog_media_upload::memory::{MemoryDocument, MemoryView};
//!
//! let editor = Editor::new(Arc::new(MemoryDocument::new()), Arc::new(MemoryView::new()));
//! let upload = MediaUpload::install(
//!     &editor,
//!     UploadConfig::from_env("MYAPP__"),
//!     Some(Arc::new(MyHttpAdapter::new())),
//!     Arc::new(TracingNotifier),
//! );
//!
//! upload.ui().files_selected(vec![MediaFile::new("clip.mp4", "video/mp4", bytes)])?;
//! upload.settle().await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │   MediaUploadUi    │  ← file picker, type filter
//! ├────────────────────┤
//! │ MediaUploadCommand │  ← one undoable insertion per pick
//! ├────────────────────┤
//! │       Editor       │  ← batches, change feed
//! ├─────────┬──────────┤
//! │ Upload  │ Progress │  ← document listener / uploadStatus listener
//! │ Coord.  │ Renderer │
//! ├─────────┴──────────┤
//! │  FileRepository    │  ← loaders keyed by upload id
//! ├────────────────────┤
//! │   UploadAdapter    │  ← your transport
//! └────────────────────┘
//! ```

mod command;
mod config;
mod coordinator;
mod editor;
pub mod engine;
mod error;
pub mod hub;
mod lifecycle;
mod loader;
pub mod memory;
mod plugin;
mod progress;
mod repository;
mod srcset;
mod types;
mod ui;

pub use command::MediaUploadCommand;
pub use config::UploadConfig;
pub use coordinator::UploadCoordinator;
pub use editor::Editor;
pub use engine::{
    AttributeChange, Batch, BatchKind, Change, DocumentEngine, EditingView, Notification, Notifier,
    OverlayTag, TracingNotifier,
};
pub use error::{LoaderError, LoaderResult, UploadError, UploadResult};
pub use lifecycle::UploadLifecycle;
pub use loader::{FileLoader, Loader, ProgressReporter, UploadAdapter};
pub use plugin::MediaUpload;
pub use progress::{ProgressRenderer, APPEAR_CLASS, PLACEHOLDER};
pub use repository::FileRepository;
pub use srcset::compute_srcset;
pub use types::{
    Attribute, AttributeKey, ElementId, LoaderStatus, MediaAttributes, MediaElement, MediaFile,
    RootName, SrcSet, UploadId, UploadResponse, UploadStatus,
};
pub use ui::{FileDialogButton, MediaUploadUi};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Editor, LoaderError, LoaderResult, MediaFile, MediaUpload, ProgressReporter, TracingNotifier,
        UploadAdapter, UploadConfig, UploadError, UploadId, UploadResponse, UploadResult,
    };
}
