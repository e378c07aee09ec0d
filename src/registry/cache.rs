//! Object cache - descriptions indexed by row id and by name
//!
//! Each entry keeps its name next to the value, so eviction through either
//! key is O(1) without scanning.

use std::collections::HashMap;
use std::hash::Hash;
use crate::name::ObjectId;

#[derive(Debug)]
pub struct ObjectCache<N, T> {
    by_id: HashMap<ObjectId, (N, T)>,
    by_name: HashMap<N, ObjectId>,
}

impl<N: Copy + Eq + Hash, T> ObjectCache<N, T> {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Insert or replace; a name moving to a new id drops the stale entry
    pub fn add(&mut self, id: ObjectId, name: N, value: T) {
        if let Some(old_id) = self.by_name.insert(name, id) {
            if old_id != id {
                self.by_id.remove(&old_id);
            }
        }
        if let Some((old_name, _)) = self.by_id.insert(id, (name, value)) {
            if old_name != name {
                self.by_name.remove(&old_name);
            }
        }
    }

    pub fn get_by_id(&self, id: ObjectId) -> Option<&T> {
        self.by_id.get(&id).map(|(_, value)| value)
    }

    pub fn get_by_name(&self, name: &N) -> Option<(ObjectId, &T)> {
        let id = *self.by_name.get(name)?;
        self.by_id.get(&id).map(|(_, value)| (id, value))
    }

    pub fn contains_id(&self, id: ObjectId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn remove_id(&mut self, id: ObjectId) -> Option<T> {
        let (name, value) = self.by_id.remove(&id)?;
        self.by_name.remove(&name);
        Some(value)
    }

    pub fn remove_name(&mut self, name: &N) -> Option<T> {
        let id = self.by_name.remove(name)?;
        self.by_id.remove(&id).map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl<N: Copy + Eq + Hash, T> Default for ObjectCache<N, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup_both_ways() {
        let mut cache = ObjectCache::new();
        cache.add(1, 'a', "alpha");
        cache.add(2, 'b', "beta");

        assert_eq!(cache.get_by_id(1), Some(&"alpha"));
        assert_eq!(cache.get_by_name(&'b'), Some((2, &"beta")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_remove_by_either_key() {
        let mut cache = ObjectCache::new();
        cache.add(1, 'a', "alpha");
        cache.add(2, 'b', "beta");

        assert_eq!(cache.remove_id(1), Some("alpha"));
        assert_eq!(cache.get_by_name(&'a'), None);

        assert_eq!(cache.remove_name(&'b'), Some("beta"));
        assert!(!cache.contains_id(2));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_keeps_indexes_consistent() {
        let mut cache = ObjectCache::new();
        cache.add(1, 'a', "v1");
        cache.add(1, 'a', "v2");
        assert_eq!(cache.get_by_name(&'a'), Some((1, &"v2")));

        // Same name, new row id
        cache.add(7, 'a', "v3");
        assert_eq!(cache.get_by_id(1), None);
        assert_eq!(cache.get_by_name(&'a'), Some((7, &"v3")));

        // Same row id, new name
        cache.add(7, 'z', "v4");
        assert_eq!(cache.get_by_name(&'a'), None);
        assert_eq!(cache.get_by_name(&'z'), Some((7, &"v4")));
        assert_eq!(cache.len(), 1);
    }
}
