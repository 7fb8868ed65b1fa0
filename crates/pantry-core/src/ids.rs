//! Identifier generation.
//!
//! Production ids are ULIDs: 26 Crockford base32 characters, lexically
//! sortable by creation time. Tests use [`SequentialIds`] for stable output.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use ulid::{Generator, Ulid};

/// Source of fresh opaque ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Monotonic ULID generator. Ids minted within the same millisecond still
/// sort in generation order.
pub struct UlidGenerator {
    inner: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> String {
        let mut generator = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // The monotonic generator only fails when the random component of
        // one millisecond is exhausted.
        generator
            .generate()
            .unwrap_or_else(|_| Ulid::new())
            .to_string()
    }
}

/// Deterministic ids: `{prefix}000001`, `{prefix}000002`, ...
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{n:06}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulids_are_unique_and_sorted() {
        let ids = UlidGenerator::new();
        let generated: Vec<String> = (0..1000).map(|_| ids.next_id()).collect();

        assert!(generated.iter().all(|id| id.len() == 26));
        let mut sorted = generated.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, generated);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new("task-");
        assert_eq!(ids.next_id(), "task-000001");
        assert_eq!(ids.next_id(), "task-000002");
    }
}
