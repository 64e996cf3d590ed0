// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Slot cache mapping scene objects to backend-resident resources.
//!
//! The slot index is the id handed to the viewport, so ids stay stable for
//! the life of the cached object. A destroy notification registered on the
//! source object queues the slot for eviction; the evicted resource lands in
//! a retired list that the backend drains into its deferred-deletion queue.
//!
//! ```text
//! lookup(key, version)
//!   ├─ Hit(id)    key and version match    → reuse
//!   ├─ Stale(id)  key matches, old version → refresh in place
//!   └─ Miss                                → insert into first free slot
//! ```

use crate::object::{CallbackToken, Destroyable, ObjectId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// The logical identity of a cached resource: an object plus a sub-index
/// (the group index for meshes, 0 for textures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The source object.
    pub object: ObjectId,
    /// Sub-resource index within the object.
    pub sub: usize,
}

impl CacheKey {
    /// Creates a key.
    pub const fn new(object: ObjectId, sub: usize) -> Self {
        Self { object, sub }
    }
}

/// Result of [`ResourceCache::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Up to date.
    Hit(u32),
    /// Present but built from an older version.
    Stale(u32),
    /// Not cached.
    Miss,
}

#[derive(Debug)]
struct Slot<R> {
    key: Option<CacheKey>,
    version: u32,
    resource: Option<R>,
}

type EvictionQueue = Rc<RefCell<Vec<(u32, ObjectId)>>>;

/// A growable array of cache slots.
#[derive(Debug)]
pub struct ResourceCache<R> {
    slots: Vec<Slot<R>>,
    retired: Vec<R>,
    evictions: EvictionQueue,
    label: &'static str,
}

impl<R> ResourceCache<R> {
    /// Creates an empty cache. `label` is used in log messages.
    pub fn new(label: &'static str) -> Self {
        Self {
            slots: Vec::new(),
            retired: Vec::new(),
            evictions: Rc::new(RefCell::new(Vec::new())),
            label,
        }
    }

    /// Finds the slot for `key` and compares its version.
    pub fn lookup(&mut self, key: CacheKey, version: u32) -> Lookup {
        self.collect_evictions();
        match self.slots.iter().position(|s| s.key == Some(key)) {
            Some(index) if self.slots[index].version == version => Lookup::Hit(index as u32),
            Some(index) => Lookup::Stale(index as u32),
            None => Lookup::Miss,
        }
    }

    /// Stores a resource in the first free slot, growing the array when full.
    pub fn insert(&mut self, key: CacheKey, version: u32, resource: R) -> u32 {
        let slot = Slot {
            key: Some(key),
            version,
            resource: Some(resource),
        };
        if let Some(index) = self.slots.iter().position(|s| s.key.is_none()) {
            self.slots[index] = slot;
            index as u32
        } else {
            self.slots.push(slot);
            log::debug!("{} cache grew to {} slots", self.label, self.slots.len());
            (self.slots.len() - 1) as u32
        }
    }

    /// Swaps the resource of an occupied slot, returning the previous one.
    pub fn replace(&mut self, id: u32, version: u32, resource: R) -> Option<R> {
        let slot = self.slots.get_mut(id as usize)?;
        slot.version = version;
        slot.resource.replace(resource)
    }

    /// Records that a slot was refreshed in place.
    pub fn set_version(&mut self, id: u32, version: u32) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            slot.version = version;
        }
    }

    /// Returns the resource in a slot.
    pub fn get(&self, id: u32) -> Option<&R> {
        self.slots.get(id as usize)?.resource.as_ref()
    }

    /// Returns the resource in a slot, mutably.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut R> {
        self.slots.get_mut(id as usize)?.resource.as_mut()
    }

    /// Iterates over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &R)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.resource.as_ref().map(|r| (i as u32, r)))
    }

    /// Number of slots, free or occupied.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.key.is_some()).count()
    }

    /// Registers a destroy notification on `object` that evicts slot `id`.
    pub fn watch<O: Destroyable + ?Sized>(&self, object: &O, id: u32) -> CallbackToken {
        let queue: Weak<RefCell<Vec<(u32, ObjectId)>>> = Rc::downgrade(&self.evictions);
        object.add_destroy_callback(Box::new(move |object_id| {
            if let Some(queue) = queue.upgrade() {
                queue.borrow_mut().push((id, object_id));
            }
        }))
    }

    /// Applies queued evictions, moving their resources to the retired list.
    pub fn collect_evictions(&mut self) {
        let pending = std::mem::take(&mut *self.evictions.borrow_mut());
        for (id, object) in pending {
            let Some(slot) = self.slots.get_mut(id as usize) else {
                continue;
            };
            if slot.key.map(|k| k.object) != Some(object) {
                continue;
            }
            slot.key = None;
            if let Some(resource) = slot.resource.take() {
                log::debug!("{} cache: retiring slot {id}", self.label);
                self.retired.push(resource);
            }
        }
    }

    /// Takes every retired resource. The caller owns their release.
    pub fn take_retired(&mut self) -> Vec<R> {
        self.collect_evictions();
        std::mem::take(&mut self.retired)
    }

    /// Empties the cache, returning every resource it still held.
    pub fn drain(&mut self) -> Vec<R> {
        let mut out = self.take_retired();
        out.extend(self.slots.drain(..).filter_map(|s| s.resource));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectCore};

    struct Source {
        core: ObjectCore,
    }

    impl Object for Source {
        fn core(&self) -> &ObjectCore {
            &self.core
        }
    }

    fn source() -> Source {
        Source {
            core: ObjectCore::new(),
        }
    }

    #[test]
    fn test_hit_stale_miss() {
        let mut cache = ResourceCache::new("test");
        let s = source();
        let key = CacheKey::new(s.id(), 0);
        assert_eq!(cache.lookup(key, 0), Lookup::Miss);
        let id = cache.insert(key, 0, "v0");
        assert_eq!(cache.lookup(key, 0), Lookup::Hit(id));
        assert_eq!(cache.lookup(key, 1), Lookup::Stale(id));
        assert_eq!(cache.replace(id, 1, "v1"), Some("v0"));
        assert_eq!(cache.lookup(key, 1), Lookup::Hit(id));
        assert_eq!(cache.get(id), Some(&"v1"));
    }

    #[test]
    fn test_destroy_retires_exactly_once() {
        let mut cache = ResourceCache::new("test");
        let s = source();
        let id = cache.insert(CacheKey::new(s.id(), 0), 0, 7u32);
        cache.watch(&s, id);
        assert!(cache.take_retired().is_empty());
        drop(s);
        assert_eq!(cache.take_retired(), vec![7]);
        assert!(cache.take_retired().is_empty());
        assert_eq!(cache.occupied(), 0);
    }

    #[test]
    fn test_free_slots_are_reused_and_ids_stable() {
        let mut cache = ResourceCache::new("test");
        let keep = source();
        let gone = source();
        let a = cache.insert(CacheKey::new(gone.id(), 0), 0, 1u32);
        let b = cache.insert(CacheKey::new(keep.id(), 0), 0, 2u32);
        cache.watch(&gone, a);
        drop(gone);
        cache.collect_evictions();
        let fresh = source();
        let c = cache.insert(CacheKey::new(fresh.id(), 0), 0, 3u32);
        assert_eq!(c, a);
        assert_eq!(cache.lookup(CacheKey::new(keep.id(), 0), 0), Lookup::Hit(b));
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn test_callback_after_cache_drop_is_noop() {
        let s = source();
        {
            let mut cache = ResourceCache::new("test");
            let id = cache.insert(CacheKey::new(s.id(), 0), 0, 1u32);
            cache.watch(&s, id);
        }
        drop(s);
    }
}
