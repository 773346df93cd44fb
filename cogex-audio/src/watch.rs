use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Subscription to device-set changes.
///
/// Dropping the watch detaches it: the paired [`DeviceNotifier`] reports
/// itself as detached and backends stop signalling it.
#[derive(Debug)]
pub struct DeviceWatch {
    changed: Arc<AtomicBool>,
}

/// Backend-side half of a [`DeviceWatch`].
#[derive(Debug, Clone)]
pub struct DeviceNotifier {
    changed: Weak<AtomicBool>,
}

impl DeviceWatch {
    pub fn new() -> (DeviceWatch, DeviceNotifier) {
        let changed = Arc::new(AtomicBool::new(false));
        let notifier = DeviceNotifier {
            changed: Arc::downgrade(&changed),
        };
        (DeviceWatch { changed }, notifier)
    }

    /// Returns true once per batch of change notifications.
    pub fn take_change(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    pub fn detach(self) {}
}

impl DeviceNotifier {
    /// Flags a change. Returns false when the watch has been dropped.
    pub fn notify(&self) -> bool {
        match self.changed.upgrade() {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.changed.strong_count() > 0
    }
}
