//! Tracks the containers created during a stresstest run.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A container name was recorded twice within the same batch.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("container `{0}` is already part of the batch")]
pub struct DuplicateIdentifier(pub String);

/// A container created, or attempted to be created, during the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Unique name of the container within the batch.
    pub name: String,
    /// The image the container was created from.
    pub image: String,
}

impl ContainerRecord {
    /// Creates a new record.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Records {
    order: Vec<ContainerRecord>,
    names: HashSet<String>,
}

/// The authoritative list of containers in the current batch.
///
/// Records are kept in insertion order. All access is serialized through an internal lock, so the
/// tracker can be shared between concurrent operations. Membership checks use a name index and do
/// not scan the batch.
#[derive(Debug, Default)]
pub struct BatchTracker {
    records: Mutex<Records>,
}

impl BatchTracker {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        // Records are never left in an inconsistent state, so a poisoned lock is still usable.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record to the batch.
    pub fn record(&self, record: ContainerRecord) -> Result<(), DuplicateIdentifier> {
        let mut records = self.lock();
        if !records.names.insert(record.name.clone()) {
            return Err(DuplicateIdentifier(record.name));
        }

        records.order.push(record);
        Ok(())
    }

    /// Returns a snapshot of all container names, in insertion order.
    pub fn all(&self) -> Vec<String> {
        self.lock().order.iter().map(|r| r.name.clone()).collect()
    }

    /// Returns a snapshot of all records, in insertion order.
    pub fn records(&self) -> Vec<ContainerRecord> {
        self.lock().order.clone()
    }

    /// Removes the container with the given name.
    ///
    /// Removing a name that is not part of the batch is a no-op. Returns whether a record was
    /// removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut records = self.lock();
        if !records.names.remove(name) {
            return false;
        }

        records.order.retain(|r| r.name != name);
        true
    }

    /// The number of containers in the batch.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Returns `true` if the batch holds no containers.
    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn batch_of(names: &[&str]) -> BatchTracker {
        let batch = BatchTracker::new();
        for name in names {
            batch
                .record(ContainerRecord::new(*name, "nginx:alpine"))
                .unwrap();
        }
        batch
    }

    #[test]
    fn keeps_insertion_order() {
        let batch = batch_of(&["c", "a", "b"]);
        assert_eq!(batch.all(), ["c", "a", "b"]);
    }

    #[test]
    fn rejects_duplicates() {
        let batch = batch_of(&["a", "b"]);
        let err = batch
            .record(ContainerRecord::new("a", "redis:7"))
            .unwrap_err();

        assert_eq!(err, DuplicateIdentifier("a".into()));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records()[0].image, "nginx:alpine");
    }

    #[test]
    fn remove_absent_is_noop() {
        let batch = batch_of(&["a", "b"]);

        assert!(!batch.remove("z"));
        assert_eq!(batch.len(), 2);

        assert!(batch.remove("a"));
        assert!(!batch.remove("a"));
        assert_eq!(batch.all(), ["b"]);
    }

    #[test]
    fn removed_name_can_be_recorded_again() {
        let batch = batch_of(&["a", "b"]);
        assert!(batch.remove("a"));

        batch
            .record(ContainerRecord::new("a", "redis:7"))
            .unwrap();
        assert_eq!(batch.all(), ["b", "a"]);
        assert!(batch.record(ContainerRecord::new("b", "redis:7")).is_err());
    }

    #[test]
    fn large_batch_rejects_duplicates() {
        let count = 50_000;
        let batch = BatchTracker::new();
        for i in 0..count {
            batch
                .record(ContainerRecord::new(format!("nginx-alpine-{i}"), "nginx:alpine"))
                .unwrap();
        }

        let err = batch
            .record(ContainerRecord::new("nginx-alpine-49999", "nginx:alpine"))
            .unwrap_err();
        assert_eq!(err, DuplicateIdentifier("nginx-alpine-49999".into()));
        assert!(!batch.remove("redis-0"));
        assert_eq!(batch.len(), count);
    }

    #[test]
    fn remove_preserves_order() {
        let batch = batch_of(&["a", "b", "c", "d", "e"]);
        batch.remove("b");
        batch.remove("d");
        batch
            .record(ContainerRecord::new("f", "nginx:alpine"))
            .unwrap();

        assert_eq!(batch.all(), ["a", "c", "e", "f"]);
    }

    #[test]
    fn concurrent_access() {
        let batch = Arc::new(BatchTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let batch = Arc::clone(&batch);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let name = format!("c-{t}-{i}");
                        batch
                            .record(ContainerRecord::new(name.as_str(), "nginx:alpine"))
                            .unwrap();
                        if i % 2 == 0 {
                            assert!(batch.remove(&name));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(batch.len(), 8 * 50);
        assert!(!batch.is_empty());
    }
}
