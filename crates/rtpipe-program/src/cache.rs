//! Pipeline state object cache.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use rtpipe_core::{LayoutId, Result, SceneId};

/// Cache key: scene identity (if a scene is bound) and layout identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateObjectKey {
    pub scene: Option<SceneId>,
    pub layout: LayoutId,
}

/// Keyed store of built state objects.
///
/// Entries are created on the first request for a key and live until
/// [`retain_scene`](Self::retain_scene) or [`clear`](Self::clear) drops
/// them. There is no eviction policy.
pub struct StateObjectCache<S> {
    entries: Mutex<HashMap<StateObjectKey, Arc<S>>>,
}

impl<S> Default for StateObjectCache<S> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> StateObjectCache<S> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `key`, building it with `build` on a miss.
    ///
    /// The lock is held while `build` runs, so concurrent requests for the
    /// same key wait for the first build instead of starting their own. A
    /// failed build stores nothing.
    pub fn get_or_build<F>(&self, key: StateObjectKey, build: F) -> Result<Arc<S>>
    where
        F: FnOnce() -> Result<S>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            tracing::trace!(
                scene = ?key.scene.map(SceneId::raw),
                layout = key.layout.raw(),
                "State object cache hit"
            );
            return Ok(Arc::clone(existing));
        }

        tracing::debug!(
            scene = ?key.scene.map(SceneId::raw),
            layout = key.layout.raw(),
            "Building state object"
        );
        let built = Arc::new(build()?);
        entries.insert(key, Arc::clone(&built));
        Ok(built)
    }

    /// Cached entry for `key`, without building.
    #[must_use]
    pub fn get(&self, key: &StateObjectKey) -> Option<Arc<S>> {
        self.entries.lock().get(key).cloned()
    }

    /// Whether `key` has an entry.
    #[must_use]
    pub fn contains(&self, key: &StateObjectKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Drop every entry not built for `scene`. Returns the number removed.
    pub fn retain_scene(&self, scene: Option<SceneId>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| key.scene == scene);
        before - entries.len()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtpipe_core::RtError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(scene: Option<SceneId>, layout: LayoutId) -> StateObjectKey {
        StateObjectKey { scene, layout }
    }

    #[test]
    fn hit_returns_same_object() {
        let cache = StateObjectCache::new();
        let k = key(Some(SceneId::new()), LayoutId::new());
        let builds = AtomicUsize::new(0);
        let build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        };

        let a = cache.get_or_build(k, build).unwrap();
        let b = cache.get_or_build(k, build).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_build_leaves_no_entry() {
        let cache: StateObjectCache<u32> = StateObjectCache::new();
        let k = key(None, LayoutId::new());
        let result = cache.get_or_build(k, || Err(RtError::BackendBuildFailed("boom".into())));
        assert!(result.is_err());
        assert!(cache.is_empty());

        let value = cache.get_or_build(k, || Ok(7)).unwrap();
        assert_eq!(*value, 7);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn retain_scene_drops_other_scenes() {
        let cache = StateObjectCache::new();
        let layout = LayoutId::new();
        let old_scene = SceneId::new();
        let new_scene = SceneId::new();
        cache.get_or_build(key(Some(old_scene), layout), || Ok(1)).unwrap();
        cache.get_or_build(key(None, layout), || Ok(2)).unwrap();
        cache.get_or_build(key(Some(new_scene), layout), || Ok(3)).unwrap();

        assert_eq!(cache.retain_scene(Some(new_scene)), 2);
        assert!(cache.contains(&key(Some(new_scene), layout)));
        assert!(cache.get(&key(Some(old_scene), layout)).is_none());
    }

    #[test]
    fn concurrent_requests_build_once() {
        let cache = Arc::new(StateObjectCache::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let k = key(Some(SceneId::new()), LayoutId::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                std::thread::spawn(move || {
                    cache
                        .get_or_build(k, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            Ok(String::from("rtso"))
                        })
                        .unwrap()
                })
            })
            .collect();

        let objects: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(objects.iter().all(|o| Arc::ptr_eq(o, &objects[0])));
    }
}
