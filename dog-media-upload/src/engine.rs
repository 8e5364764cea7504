//! Boundary of the editing surface the upload core runs against.
//!
//! The document engine, the editing view and the notification area are
//! external collaborators. The core only needs the narrow surface below;
//! `crate::memory` provides in-memory implementations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    Attribute, AttributeKey, ElementId, MediaAttributes, MediaElement, RootName, UploadResult,
    UploadStatus,
};

/// Whether a batch belongs to the user's undo history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchKind {
    /// A user edit, recorded as one undo step
    Default,
    /// Internal bookkeeping, never undoable on its own
    Transparent,
}

/// Location in a root's top-level children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub root: RootName,
    pub offset: usize,
}

impl Position {
    pub fn new(root: RootName, offset: usize) -> Self {
        Self { root, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Media,
    Paragraph,
    Text(String),
}

/// A node to be inserted, together with its subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub id: ElementId,
    pub kind: NodeKind,
    pub attributes: MediaAttributes,
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn media(attributes: MediaAttributes) -> Self {
        Self {
            id: ElementId::next(),
            kind: NodeKind::Media,
            attributes,
            children: Vec::new(),
        }
    }

    pub fn paragraph(children: Vec<NodeSpec>) -> Self {
        Self {
            id: ElementId::next(),
            kind: NodeKind::Paragraph,
            attributes: MediaAttributes::default(),
            children,
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            id: ElementId::next(),
            kind: NodeKind::Text(text.into()),
            attributes: MediaAttributes::default(),
            children: Vec::new(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert { node: NodeSpec, position: Position },
    /// Moves the node to the graveyard; removing a graveyard node deletes it
    Remove { element: ElementId },
    SetAttribute { element: ElementId, attribute: Attribute },
    RemoveAttribute { element: ElementId, key: AttributeKey },
}

/// Operations applied atomically by the document engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub kind: BatchKind,
    pub operations: Vec<Operation>,
}

impl Batch {
    /// A user edit
    pub fn new() -> Self {
        Self {
            kind: BatchKind::Default,
            operations: Vec::new(),
        }
    }

    /// Bookkeeping kept out of the undo history
    pub fn transparent() -> Self {
        Self {
            kind: BatchKind::Transparent,
            operations: Vec::new(),
        }
    }

    pub fn insert(mut self, node: NodeSpec, position: Position) -> Self {
        self.operations.push(Operation::Insert { node, position });
        self
    }

    pub fn remove(mut self, element: ElementId) -> Self {
        self.operations.push(Operation::Remove { element });
        self
    }

    pub fn set_attribute(mut self, element: ElementId, attribute: Attribute) -> Self {
        self.operations
            .push(Operation::SetAttribute { element, attribute });
        self
    }

    pub fn remove_attribute(mut self, element: ElementId, key: AttributeKey) -> Self {
        self.operations
            .push(Operation::RemoveAttribute { element, key });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// One attribute transition on an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub element: ElementId,
    pub key: AttributeKey,
    pub old: Option<Attribute>,
    pub new: Option<Attribute>,
}

impl AttributeChange {
    pub fn new_upload_status(&self) -> Option<UploadStatus> {
        self.new.as_ref().and_then(Attribute::as_upload_status)
    }
}

/// Entry of the document's change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Insert {
        root: RootName,
        node: ElementId,
        is_text: bool,
    },
    Remove {
        root: RootName,
        node: ElementId,
        is_text: bool,
    },
    Attribute(AttributeChange),
}

/// Transactional document model
pub trait DocumentEngine: Send + Sync {
    /// Apply every operation of the batch or none of them.
    ///
    /// Returns the change feed entries of the batch, graveyard included.
    fn apply(&self, batch: &Batch) -> UploadResult<Vec<Change>>;

    /// Media element by id, wherever it lives
    fn element(&self, id: ElementId) -> Option<MediaElement>;

    /// Media elements of the subtree rooted at `node`, `node` included
    fn media_in_subtree(&self, node: ElementId) -> Vec<MediaElement>;

    /// Where new block content goes for the current selection
    fn insertion_position(&self) -> Position;

    /// Put the selection on an element
    fn select(&self, element: ElementId);

    /// Media may be inserted at the selection
    fn can_insert_media(&self) -> bool;
}

static OVERLAY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayId(u64);

impl OverlayId {
    pub fn next() -> Self {
        Self(OVERLAY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

/// Marker identifying the transient view nodes the renderer owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayTag {
    Placeholder,
    ProgressBar,
    CompleteIcon,
}

/// Where an overlay goes inside the rendered element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPlacement {
    /// Directly after the media node
    AfterMedia,
    /// Last child
    End,
}

impl OverlayTag {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Placeholder => "media-upload-placeholder-loader",
            Self::ProgressBar => "media-progress-bar",
            Self::CompleteIcon => "media-upload-complete-icon",
        }
    }

    pub fn placement(&self) -> OverlayPlacement {
        match self {
            Self::Placeholder => OverlayPlacement::AfterMedia,
            Self::ProgressBar | Self::CompleteIcon => OverlayPlacement::End,
        }
    }
}

/// Rendered counterpart of the document
pub trait EditingView: Send + Sync {
    /// Bring rendered elements in line with a batch of model changes
    fn render_changes(&self, document: &dyn DocumentEngine, changes: &[Change]);

    fn is_rendered(&self, element: ElementId) -> bool;

    fn has_class(&self, element: ElementId, class: &str) -> bool;

    fn add_class(&self, element: ElementId, class: &str);

    fn remove_class(&self, element: ElementId, class: &str);

    /// Source displayed by the media node
    fn source(&self, element: ElementId) -> Option<String>;

    fn set_source(&self, element: ElementId, src: &str);

    fn find_overlay(&self, element: ElementId, tag: OverlayTag) -> Option<OverlayId>;

    /// `None` when the element is not rendered
    fn insert_overlay(&self, element: ElementId, tag: OverlayTag) -> Option<OverlayId>;

    fn remove_overlay(&self, element: ElementId, overlay: OverlayId) -> bool;

    /// `false` once the overlay is gone
    fn set_overlay_width(&self, element: ElementId, overlay: OverlayId, percent: f64) -> bool;
}

/// User-visible message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub namespace: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new<T: Into<String>, M: Into<String>>(title: T, message: M) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            namespace: String::new(),
            at: Utc::now(),
        }
    }

    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Notification area of the host
pub trait Notifier: Send + Sync {
    fn show_warning(&self, notification: Notification);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show_warning(&self, notification: Notification) {
        warn!(
            title = %notification.title,
            namespace = %notification.namespace,
            "{}",
            notification.message
        );
    }
}
