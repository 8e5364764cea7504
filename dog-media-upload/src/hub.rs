use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::{AttributeChange, Change};
use crate::{AttributeKey, Editor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// What a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangePattern {
    /// Every committed batch, with its whole change list
    Document,
    /// Each change of one attribute
    Attribute(AttributeKey),
}

/// Data delivered to listeners
#[derive(Debug)]
pub enum ChangeEvent<'a> {
    Document(&'a [Change]),
    Attribute(&'a AttributeChange),
}

impl ChangePattern {
    pub fn matches(&self, event: &ChangeEvent<'_>) -> bool {
        match (self, event) {
            (Self::Document, ChangeEvent::Document(_)) => true,
            (Self::Attribute(key), ChangeEvent::Attribute(change)) => *key == change.key,
            _ => false,
        }
    }
}

/// Listener signature
pub type ChangeListener = Arc<dyn Fn(&Arc<Editor>, &ChangeEvent<'_>) + Send + Sync>;

/// Wrap a closure as a [`ChangeListener`]
pub fn listener<F>(f: F) -> ChangeListener
where
    F: Fn(&Arc<Editor>, &ChangeEvent<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
struct ListenerEntry {
    id: ListenerId,
    pattern: ChangePattern,
    listener: ChangeListener,
}

/// Typed subscription registry for document changes.
///
/// Emission is split so no lock is held while listeners run:
/// snapshot the matching listeners, then call them.
#[derive(Default)]
pub struct ChangeHub {
    listeners: Vec<ListenerEntry>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, pattern: ChangePattern, listener: ChangeListener) -> ListenerId {
        let id = next_listener_id();
        self.listeners.push(ListenerEntry {
            id,
            pattern,
            listener,
        });
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|e| e.id != id);
        before != self.listeners.len()
    }

    /// Listeners matching `event`, in registration order
    pub fn snapshot(&self, event: &ChangeEvent<'_>) -> Vec<ChangeListener> {
        self.listeners
            .iter()
            .filter(|e| e.pattern.matches(event))
            .map(|e| e.listener.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
