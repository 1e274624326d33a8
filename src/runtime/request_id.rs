//! Request id generation.
//!
//! Ids take the form `"{module_id}-{n}"`. `n` starts at the current Unix time
//! in microseconds, so ids stay distinct across runtime restarts, and then
//! increases by one per id, so rapid calls never collide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces unique request ids for one module.
#[derive(Debug)]
pub struct RequestIdGenerator {
    module_id: String,
    next: AtomicU64,
}

impl RequestIdGenerator {
    /// Create a generator seeded from the clock.
    pub fn new(module_id: &str) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX / 2))
            .unwrap_or(0);
        Self::with_seed(module_id, seed)
    }

    /// Create a generator starting at `seed`.
    pub fn with_seed(module_id: &str, seed: u64) -> Self {
        Self {
            module_id: module_id.to_string(),
            next: AtomicU64::new(seed),
        }
    }

    /// Next id.
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.module_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_format() {
        let ids = RequestIdGenerator::with_seed("calc", 41);
        assert_eq!(ids.next_id(), "calc-41");
        assert_eq!(ids.next_id(), "calc-42");
    }

    #[test]
    fn test_rapid_ids_are_unique() {
        let ids = RequestIdGenerator::new("m");
        let set: HashSet<String> = (0..10_000).map(|_| ids.next_id()).collect();
        assert_eq!(set.len(), 10_000);
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = Arc::new(RequestIdGenerator::new("m"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..1000).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut set = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(set.insert(id));
            }
        }
        assert_eq!(set.len(), 8000);
    }
}
