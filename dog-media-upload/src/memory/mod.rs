//! In-memory implementations of the editing surface boundary, for tests
//! and embedding.

mod document;
mod notifier;
mod view;

pub use document::MemoryDocument;
pub use notifier::MemoryNotifier;
pub use view::{MemoryView, RenderedMedia, RenderedOverlay};
