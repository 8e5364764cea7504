use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::{ElementId, MediaFile, MediaUploadCommand, UploadConfig, UploadResult};

/// State of the toolbar's file picker button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDialogButton {
    pub label: String,
    /// `accept` value of the file input
    pub accepted_type: String,
    pub allow_multiple_files: bool,
    pub tooltip: bool,
}

/// Toolbar entry point: a file picker feeding the upload command
pub struct MediaUploadUi {
    command: Arc<MediaUploadCommand>,
    config: UploadConfig,
    button: FileDialogButton,
}

impl MediaUploadUi {
    pub const LABEL: &'static str = "Upload and insert video";

    pub fn new(command: Arc<MediaUploadCommand>, config: UploadConfig) -> Self {
        let button = FileDialogButton {
            label: Self::LABEL.to_string(),
            accepted_type: config.accepted_types(),
            allow_multiple_files: false,
            tooltip: true,
        };
        Self {
            command,
            config,
            button,
        }
    }

    pub fn button(&self) -> &FileDialogButton {
        &self.button
    }

    /// Mirrors the command's state
    pub fn is_enabled(&self) -> bool {
        self.command.is_enabled()
    }

    /// Files picked in the dialog
    pub fn files_selected<I>(&self, files: I) -> UploadResult<Vec<ElementId>>
    where
        I: IntoIterator<Item = MediaFile>,
    {
        let accepted: Vec<MediaFile> = files
            .into_iter()
            .filter(|file| {
                let ok = self.config.accepts(file);
                if !ok {
                    debug!(file = %file.name, mime = %file.mime_type, "file type not accepted");
                }
                ok
            })
            .collect();

        if accepted.is_empty() {
            return Ok(Vec::new());
        }
        self.command.execute(accepted)
    }

    /// Files dropped or pasted into the editor
    pub fn files_dropped<I>(&self, files: I) -> UploadResult<Vec<ElementId>>
    where
        I: IntoIterator<Item = MediaFile>,
    {
        self.files_selected(files)
    }
}
