use parking_lot::Mutex;

use crate::engine::{Notification, Notifier};

/// Notifier that keeps every warning it receives
#[derive(Default)]
pub struct MemoryNotifier {
    warnings: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<Notification> {
        self.warnings.lock().clone()
    }

    pub fn clear(&self) {
        self.warnings.lock().clear();
    }
}

impl Notifier for MemoryNotifier {
    fn show_warning(&self, notification: Notification) {
        self.warnings.lock().push(notification);
    }
}
