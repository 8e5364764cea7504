use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::engine::{
    Change, DocumentEngine, EditingView, OverlayId, OverlayPlacement, OverlayTag,
};
use crate::{Attribute, ElementId, RootName};

/// Transient node rendered next to a media element
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOverlay {
    pub id: OverlayId,
    pub tag: OverlayTag,
    /// Inline width in percent, set by progress updates
    pub width: Option<f64>,
}

/// Rendered form of one media element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedMedia {
    pub classes: BTreeSet<String>,
    pub source: Option<String>,
    /// Children after the media node, in order
    pub overlays: Vec<RenderedOverlay>,
}

impl RenderedMedia {
    pub fn overlay_tags(&self) -> Vec<OverlayTag> {
        self.overlays.iter().map(|o| o.tag).collect()
    }

    pub fn overlay(&self, tag: OverlayTag) -> Option<&RenderedOverlay> {
        self.overlays.iter().find(|o| o.tag == tag)
    }
}

/// In-memory editing view
#[derive(Default)]
pub struct MemoryView {
    elements: RwLock<HashMap<ElementId, RenderedMedia>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a rendered element
    pub fn rendered(&self, element: ElementId) -> Option<RenderedMedia> {
        self.elements.read().get(&element).cloned()
    }

    fn with_element<R>(&self, element: ElementId, f: impl FnOnce(&mut RenderedMedia) -> R) -> Option<R> {
        self.elements.write().get_mut(&element).map(f)
    }
}

impl EditingView for MemoryView {
    fn render_changes(&self, document: &dyn DocumentEngine, changes: &[Change]) {
        for change in changes {
            match change {
                Change::Insert {
                    root: RootName::Main,
                    node,
                    is_text: false,
                } => {
                    let mut elements = self.elements.write();
                    for media in document.media_in_subtree(*node) {
                        let mut rendered = RenderedMedia::default();
                        rendered.classes.insert("media".to_string());
                        rendered.source = media.attributes.src.clone();
                        elements.insert(media.id, rendered);
                    }
                }
                Change::Remove {
                    root: RootName::Main,
                    node,
                    is_text: false,
                } => {
                    let mut elements = self.elements.write();
                    elements.remove(node);
                    for media in document.media_in_subtree(*node) {
                        elements.remove(&media.id);
                    }
                }
                Change::Attribute(change) => {
                    if let Some(Attribute::Src(src)) = &change.new {
                        self.set_source(change.element, src);
                    }
                }
                _ => {}
            }
        }
    }

    fn is_rendered(&self, element: ElementId) -> bool {
        self.elements.read().contains_key(&element)
    }

    fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.elements
            .read()
            .get(&element)
            .map(|e| e.classes.contains(class))
            .unwrap_or(false)
    }

    fn add_class(&self, element: ElementId, class: &str) {
        self.with_element(element, |e| e.classes.insert(class.to_string()));
    }

    fn remove_class(&self, element: ElementId, class: &str) {
        self.with_element(element, |e| e.classes.remove(class));
    }

    fn source(&self, element: ElementId) -> Option<String> {
        self.elements.read().get(&element).and_then(|e| e.source.clone())
    }

    fn set_source(&self, element: ElementId, src: &str) {
        self.with_element(element, |e| e.source = Some(src.to_string()));
    }

    fn find_overlay(&self, element: ElementId, tag: OverlayTag) -> Option<OverlayId> {
        self.elements
            .read()
            .get(&element)
            .and_then(|e| e.overlay(tag).map(|o| o.id))
    }

    fn insert_overlay(&self, element: ElementId, tag: OverlayTag) -> Option<OverlayId> {
        self.with_element(element, |e| {
            let overlay = RenderedOverlay {
                id: OverlayId::next(),
                tag,
                width: None,
            };
            let id = overlay.id;
            match tag.placement() {
                OverlayPlacement::AfterMedia => e.overlays.insert(0, overlay),
                OverlayPlacement::End => e.overlays.push(overlay),
            }
            id
        })
    }

    fn remove_overlay(&self, element: ElementId, overlay: OverlayId) -> bool {
        self.with_element(element, |e| {
            let before = e.overlays.len();
            e.overlays.retain(|o| o.id != overlay);
            before != e.overlays.len()
        })
        .unwrap_or(false)
    }

    fn set_overlay_width(&self, element: ElementId, overlay: OverlayId, percent: f64) -> bool {
        self.with_element(element, |e| {
            match e.overlays.iter_mut().find(|o| o.id == overlay) {
                Some(o) => {
                    o.width = Some(percent);
                    true
                }
                None => false,
            }
        })
        .unwrap_or(false)
    }
}
