use std::collections::HashSet;
use std::sync::Mutex;

/// Set of identity keys already seen within one batch.
#[derive(Debug, Default)]
pub struct DedupCache {
    seen: Mutex<HashSet<String>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key`. Returns `true` the first time a key is marked.
    pub fn mark_seen(&self, key: &str) -> bool {
        self.lock().insert(key.to_string())
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mark_wins() {
        let cache = DedupCache::new();
        assert!(!cache.is_duplicate("2025-11-03|Technologist"));
        assert!(cache.mark_seen("2025-11-03|Technologist"));
        assert!(!cache.mark_seen("2025-11-03|Technologist"));
        assert!(cache.is_duplicate("2025-11-03|Technologist"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_forgets_keys() {
        let cache = DedupCache::new();
        cache.mark_seen("a");
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.mark_seen("a"));
    }
}
