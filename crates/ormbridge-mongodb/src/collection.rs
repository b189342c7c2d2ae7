//! Collection handle cache
//!
//! Handles are created lazily on first use and kept for the lifetime of the
//! adapter. Two tasks racing on the first access of a name may both build a
//! handle; only one is kept and both are equivalent.

use dashmap::DashMap;
use tracing::debug;

/// Memoized collection handles keyed by physical collection name
#[derive(Debug)]
pub struct CollectionResolver<C> {
    handles: DashMap<String, C>,
}

impl<C: Clone> CollectionResolver<C> {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    /// Returns the cached handle for `name`, building it with `open` on first use
    pub fn resolve(&self, name: &str, open: impl FnOnce(&str) -> C) -> C {
        if let Some(handle) = self.handles.get(name) {
            return handle.value().clone();
        }

        debug!(collection = name, "Opening collection handle");
        let handle = open(name);
        self.handles
            .entry(name.to_string())
            .or_insert(handle)
            .value()
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    /// Names of every collection touched so far
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<C: Clone> Default for CollectionResolver<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handle_built_once() {
        let resolver: CollectionResolver<String> = CollectionResolver::new();
        let opened = AtomicUsize::new(0);

        for _ in 0..3 {
            let handle = resolver.resolve("users", |name| {
                opened.fetch_add(1, Ordering::SeqCst);
                format!("handle:{}", name)
            });
            assert_eq!(handle, "handle:users");
        }

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_cached_names() {
        let resolver: CollectionResolver<u32> = CollectionResolver::default();
        assert!(resolver.is_empty());
        resolver.resolve("b", |_| 1);
        resolver.resolve("a", |_| 2);
        assert_eq!(resolver.cached_names(), vec!["a".to_string(), "b".to_string()]);
        assert!(resolver.contains("a"));
        assert!(!resolver.contains("c"));
    }

    #[test]
    fn test_concurrent_first_access_keeps_one_handle() {
        let resolver: std::sync::Arc<CollectionResolver<usize>> = std::sync::Arc::new(CollectionResolver::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let resolver = resolver.clone();
                std::thread::spawn(move || resolver.resolve("shared", |_| i))
            })
            .collect();
        let seen: Vec<usize> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        let kept = resolver.resolve("shared", |_| usize::MAX);
        assert!(seen.iter().all(|h| *h == kept));
    }
}
