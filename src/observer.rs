// src/observer.rs
//! Observer and staleness-callback registries

use crate::gps::data::NavigationFix;
use std::sync::Arc;

/// Receives the fused state after every merged fragment.
///
/// Called on the thread that delivered the fragment, with no manager lock
/// held, so it may call back into the manager.
pub trait FixObserver: Send + Sync {
    fn update(&self, fix: &NavigationFix);
}

impl<F> FixObserver for F
where
    F: Fn(&NavigationFix) + Send + Sync,
{
    fn update(&self, fix: &NavigationFix) {
        self(fix)
    }
}

/// Invoked once per watchdog firing.
pub type StaleCallback = Arc<dyn Fn() + Send + Sync>;

/// Ordered set of shared entries keyed by allocation identity.
///
/// Iteration follows registration order.
pub struct Registry<T: ?Sized> {
    entries: Vec<Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Returns false if this exact entry is already registered
    pub fn register(&mut self, entry: Arc<T>) -> bool {
        if self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Returns false if the entry was not registered
    pub fn remove(&mut self, entry: &Arc<T>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|existing| !same_entry(existing, entry));
        self.entries.len() != before
    }

    pub fn contains(&self, entry: &Arc<T>) -> bool {
        self.entries.iter().any(|existing| same_entry(existing, entry))
    }

    /// Clone the current entries so they can be called without holding a lock
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Compare data pointers only; vtable pointers are not unique per type
fn same_entry<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
