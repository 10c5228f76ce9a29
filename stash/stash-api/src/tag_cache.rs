use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local tag name→id cache. Write-through, never evicted: once a
/// name resolves, every later lookup in this process observes the same id.
/// The lock is only ever held around the map itself, never across I/O.
#[derive(Default)]
pub struct TagCache {
    map: Mutex<HashMap<String, String>>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.map.lock().unwrap().get(name).cloned()
    }

    /// Inserts unless the name is already cached; returns the id that is
    /// authoritative afterwards, which may differ from the argument when a
    /// racing caller won.
    pub fn insert_if_absent(&self, name: &str, id: String) -> String {
        let mut map = self.map.lock().unwrap();
        map.entry(name.to_string()).or_insert(id).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = TagCache::new();
        assert_eq!(cache.get("scanned"), None);
        cache.insert_if_absent("scanned", "12".into());
        assert_eq!(cache.get("scanned").as_deref(), Some("12"));
    }

    #[test]
    fn first_insert_wins() {
        let cache = TagCache::new();
        assert_eq!(cache.insert_if_absent("scanned", "12".into()), "12");
        // a latecomer observes the id already stored
        assert_eq!(cache.insert_if_absent("scanned", "99".into()), "12");
        assert_eq!(cache.get("scanned").as_deref(), Some("12"));
    }

    #[test]
    fn names_are_independent() {
        let cache = TagCache::new();
        cache.insert_if_absent("scanned", "12".into());
        cache.insert_if_absent("matched", "13".into());
        assert_eq!(cache.get("scanned").as_deref(), Some("12"));
        assert_eq!(cache.get("matched").as_deref(), Some("13"));
    }
}
