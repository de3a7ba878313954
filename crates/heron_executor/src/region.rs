use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A scoped allocation region.
///
/// A query's working state belongs to exactly one region, entered under
/// the caller's current region and released en masse when the query ends.
/// Allocation accounting hangs off the region so memory attribution
/// survives into diagnostics.
///
/// Invariant: no allocation may be recorded against a released region.
#[derive(Debug)]
pub struct MemoryRegion {
    name: String,
    parent: Option<Arc<MemoryRegion>>,
    bytes: AtomicUsize,
    released: AtomicBool,
}

impl MemoryRegion {
    /// A top-level region with no parent; the caller's ambient context.
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: None,
            bytes: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        })
    }

    /// Enter a child scope. The child's lifetime is bounded by the
    /// parent's: releasing the parent does not free children that are
    /// still referenced, but accounting treats them as dead.
    pub fn enter(self: &Arc<Self>, name: impl Into<String>) -> Arc<MemoryRegion> {
        debug_assert!(!self.is_released(), "entering a child of a released region");
        Arc::new(MemoryRegion {
            name: name.into(),
            parent: Some(Arc::clone(self)),
            bytes: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<MemoryRegion>> {
        self.parent.as_ref()
    }

    /// Record an allocation against this region.
    pub fn alloc(&self, bytes: usize) {
        debug_assert!(!self.is_released(), "allocation in a released region");
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Exit the scope: everything accounted here is invalidated at once.
    /// Safe to call more than once.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            let freed = self.bytes.swap(0, Ordering::Relaxed);
            tracing::trace!(region = %self.name, freed, "region released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_scope_tracks_independently() {
        let root = MemoryRegion::root("executor");
        let query = root.enter("per-query");
        query.alloc(256);
        root.alloc(16);

        assert_eq!(query.allocated_bytes(), 256);
        assert_eq!(root.allocated_bytes(), 16);
        assert_eq!(query.parent().unwrap().name(), "executor");
    }

    #[test]
    fn test_release_is_bulk_and_idempotent() {
        let root = MemoryRegion::root("executor");
        let query = root.enter("per-query");
        query.alloc(1024);
        query.alloc(512);

        query.release();
        assert!(query.is_released());
        assert_eq!(query.allocated_bytes(), 0);

        query.release(); // second release is a no-op
        assert_eq!(query.allocated_bytes(), 0);
        assert!(!root.is_released());
    }
}
