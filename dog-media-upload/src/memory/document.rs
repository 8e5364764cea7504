use std::collections::HashMap;

use parking_lot::RwLock;

use crate::engine::{Batch, BatchKind, Change, DocumentEngine, NodeKind, NodeSpec, Operation, Position};
use crate::{
    AttributeChange, ElementId, MediaAttributes, MediaElement, RootName, UploadError, UploadResult,
};

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    attributes: MediaAttributes,
    root: RootName,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

#[derive(Debug, Clone, Default)]
struct DocState {
    nodes: HashMap<ElementId, Node>,
    main: Vec<ElementId>,
    graveyard: Vec<ElementId>,
    caret: usize,
    selected: Option<ElementId>,
}

/// In-memory document engine with a main root and a graveyard
#[derive(Default)]
pub struct MemoryDocument {
    state: RwLock<DocState>,
    history: RwLock<Vec<Batch>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a collapsed selection before the `offset`-th top-level node
    pub fn set_caret(&self, offset: usize) {
        let mut state = self.state.write();
        state.caret = offset;
        state.selected = None;
    }

    pub fn root_of(&self, id: ElementId) -> Option<RootName> {
        self.state.read().nodes.get(&id).map(|n| n.root)
    }

    /// Element exists and is attached to the main root
    pub fn contains(&self, id: ElementId) -> bool {
        self.root_of(id) == Some(RootName::Main)
    }

    pub fn root_children(&self, root: RootName) -> Vec<ElementId> {
        let state = self.state.read();
        match root {
            RootName::Main => state.main.clone(),
            RootName::Graveyard => state.graveyard.clone(),
        }
    }

    /// Number of user-visible undo steps recorded so far
    pub fn undo_steps(&self) -> usize {
        self.history.read().len()
    }

    pub fn history(&self) -> Vec<Batch> {
        self.history.read().clone()
    }
}

impl DocState {
    fn siblings_mut(&mut self, root: RootName, parent: Option<ElementId>) -> Option<&mut Vec<ElementId>> {
        match parent {
            Some(parent) => self.nodes.get_mut(&parent).map(|n| &mut n.children),
            None => Some(match root {
                RootName::Main => &mut self.main,
                RootName::Graveyard => &mut self.graveyard,
            }),
        }
    }

    fn insert_subtree(&mut self, spec: NodeSpec, root: RootName, parent: Option<ElementId>) -> UploadResult<()> {
        if self.nodes.contains_key(&spec.id) {
            return Err(UploadError::invalid(format!("node {} already exists", spec.id)));
        }

        let children: Vec<ElementId> = spec.children.iter().map(|c| c.id).collect();
        self.nodes.insert(
            spec.id,
            Node {
                kind: spec.kind,
                attributes: spec.attributes,
                root,
                parent,
                children,
            },
        );
        for child in spec.children {
            self.insert_subtree(child, root, Some(spec.id))?;
        }
        Ok(())
    }

    fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                out.push(next);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn detach(&mut self, id: ElementId) -> UploadResult<Node> {
        let node = self
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| UploadError::element_not_found(id))?;
        if let Some(siblings) = self.siblings_mut(node.root, node.parent) {
            siblings.retain(|c| *c != id);
        }
        Ok(node)
    }

    fn apply_operation(&mut self, operation: &Operation, changes: &mut Vec<Change>) -> UploadResult<()> {
        match operation {
            Operation::Insert { node, position } => {
                let id = node.id;
                let is_text = node.is_text();
                self.insert_subtree(node.clone(), position.root, None)?;
                let siblings = match position.root {
                    RootName::Main => &mut self.main,
                    RootName::Graveyard => &mut self.graveyard,
                };
                let offset = position.offset.min(siblings.len());
                siblings.insert(offset, id);
                changes.push(Change::Insert {
                    root: position.root,
                    node: id,
                    is_text,
                });
            }
            Operation::Remove { element } => {
                let node = self.detach(*element)?;
                let is_text = matches!(node.kind, NodeKind::Text(_));
                changes.push(Change::Remove {
                    root: node.root,
                    node: *element,
                    is_text,
                });

                if node.root == RootName::Graveyard {
                    for id in self.subtree(*element) {
                        self.nodes.remove(&id);
                    }
                } else {
                    for id in self.subtree(*element) {
                        if let Some(n) = self.nodes.get_mut(&id) {
                            n.root = RootName::Graveyard;
                        }
                    }
                    if let Some(n) = self.nodes.get_mut(element) {
                        n.parent = None;
                    }
                    self.graveyard.push(*element);
                    changes.push(Change::Insert {
                        root: RootName::Graveyard,
                        node: *element,
                        is_text,
                    });
                }
                if self.selected == Some(*element) {
                    self.selected = None;
                }
            }
            Operation::SetAttribute { element, attribute } => {
                let node = self.media_mut(*element)?;
                let old = node.attributes.set(attribute.clone());
                if old.as_ref() != Some(attribute) {
                    changes.push(Change::Attribute(AttributeChange {
                        element: *element,
                        key: attribute.key(),
                        old,
                        new: Some(attribute.clone()),
                    }));
                }
            }
            Operation::RemoveAttribute { element, key } => {
                let node = self.media_mut(*element)?;
                if let Some(old) = node.attributes.remove(*key) {
                    changes.push(Change::Attribute(AttributeChange {
                        element: *element,
                        key: *key,
                        old: Some(old),
                        new: None,
                    }));
                }
            }
        }
        Ok(())
    }

    fn media_mut(&mut self, id: ElementId) -> UploadResult<&mut Node> {
        match self.nodes.get_mut(&id) {
            Some(node) if node.kind == NodeKind::Media => Ok(node),
            Some(_) => Err(UploadError::invalid(format!("{} is not a media element", id))),
            None => Err(UploadError::element_not_found(id)),
        }
    }

    fn media(&self, id: ElementId) -> Option<MediaElement> {
        self.nodes
            .get(&id)
            .filter(|n| n.kind == NodeKind::Media)
            .map(|n| MediaElement {
                id,
                root: n.root,
                attributes: n.attributes.clone(),
            })
    }
}

impl DocumentEngine for MemoryDocument {
    fn apply(&self, batch: &Batch) -> UploadResult<Vec<Change>> {
        let mut state = self.state.write();
        let mut draft = state.clone();
        let mut changes = Vec::new();

        for operation in &batch.operations {
            draft.apply_operation(operation, &mut changes)?;
        }

        *state = draft;
        drop(state);

        if batch.kind == BatchKind::Default && !batch.is_empty() {
            self.history.write().push(batch.clone());
        }
        Ok(changes)
    }

    fn element(&self, id: ElementId) -> Option<MediaElement> {
        self.state.read().media(id)
    }

    fn media_in_subtree(&self, node: ElementId) -> Vec<MediaElement> {
        let state = self.state.read();
        state
            .subtree(node)
            .into_iter()
            .filter_map(|id| state.media(id))
            .collect()
    }

    fn insertion_position(&self) -> Position {
        let state = self.state.read();
        if let Some(selected) = state.selected {
            if let Some(index) = state.main.iter().position(|id| *id == selected) {
                return Position::new(RootName::Main, index + 1);
            }
        }
        Position::new(RootName::Main, state.caret.min(state.main.len()))
    }

    fn select(&self, element: ElementId) {
        self.state.write().selected = Some(element);
    }

    fn can_insert_media(&self) -> bool {
        let state = self.state.read();
        match state.selected.and_then(|id| state.nodes.get(&id)) {
            Some(node) => node.kind != NodeKind::Media,
            None => true,
        }
    }
}
