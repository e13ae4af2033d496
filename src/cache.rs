//! Identity cache: one live wrapper per native address.
//!
//! Weak-value semantics: inserting never extends a wrapper's lifetime,
//! and entries for collected wrappers are purged on the next lookup.
//! The lookup-then-insert protocol tolerates re-entrant construction (a
//! native call calling back into the runtime): whoever inserts second
//! detects the live entry and adopts it instead of its own wrapper.

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::callable::CallableData;
use crate::structure::StructureData;
use crate::value::{CallableRef, StructRef};

/// Weak reference to either wrapper flavor.
#[derive(Clone)]
pub enum CachedWrapper {
    Struct(Weak<StructureData>),
    Callable(Weak<CallableData>),
}

impl CachedWrapper {
    fn alive(&self) -> bool {
        match self {
            Self::Struct(w) => w.strong_count() > 0,
            Self::Callable(w) => w.strong_count() > 0,
        }
    }
}

/// Weak-value map from native address to wrapper.
#[derive(Default)]
pub struct IdentityCache {
    entries: DashMap<usize, CachedWrapper>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Retrieve the live structure wrapper for an address, if any.
    /// A stale entry (wrapper already collected) is removed.
    pub fn lookup_struct(&self, addr: usize) -> Option<StructRef> {
        let found = self.entries.get(&addr).map(|e| match e.value() {
            CachedWrapper::Struct(w) => w.upgrade(),
            CachedWrapper::Callable(_) => None,
        });
        match found {
            Some(Some(existing)) => Some(existing),
            Some(None) => {
                self.evict_dead(addr);
                None
            }
            None => None,
        }
    }

    /// Retrieve the live callable wrapper for an entry address, if any.
    pub fn lookup_callable(&self, addr: usize) -> Option<CallableRef> {
        let found = self.entries.get(&addr).map(|e| match e.value() {
            CachedWrapper::Callable(w) => w.upgrade(),
            CachedWrapper::Struct(_) => None,
        });
        match found {
            Some(Some(existing)) => Some(existing),
            Some(None) => {
                self.evict_dead(addr);
                None
            }
            None => None,
        }
    }

    /// Insert a structure wrapper, returning the canonical one.
    ///
    /// If a live wrapper already occupies the address (re-entrant
    /// construction), it wins and the argument is discarded.
    pub fn insert_struct(&self, addr: usize, wrapper: &StructRef) -> StructRef {
        match self.entries.entry(addr) {
            Entry::Occupied(mut slot) => {
                if let CachedWrapper::Struct(w) = slot.get() {
                    if let Some(existing) = w.upgrade() {
                        trace!(addr, "identity cache kept existing wrapper");
                        return existing;
                    }
                }
                slot.insert(CachedWrapper::Struct(Arc::downgrade(wrapper)));
                Arc::clone(wrapper)
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedWrapper::Struct(Arc::downgrade(wrapper)));
                Arc::clone(wrapper)
            }
        }
    }

    /// Insert a callable wrapper, returning the canonical one.
    pub fn insert_callable(&self, addr: usize, wrapper: &CallableRef) -> CallableRef {
        match self.entries.entry(addr) {
            Entry::Occupied(mut slot) => {
                if let CachedWrapper::Callable(w) = slot.get() {
                    if let Some(existing) = w.upgrade() {
                        trace!(addr, "identity cache kept existing callable");
                        return existing;
                    }
                }
                slot.insert(CachedWrapper::Callable(Arc::downgrade(wrapper)));
                Arc::clone(wrapper)
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedWrapper::Callable(Arc::downgrade(wrapper)));
                Arc::clone(wrapper)
            }
        }
    }

    /// Make `wrapper` the canonical entry for an address unconditionally.
    /// Used by cast, where the re-typed wrapper supersedes the old one.
    pub fn replace_struct(&self, addr: usize, wrapper: &StructRef) {
        self.entries
            .insert(addr, CachedWrapper::Struct(Arc::downgrade(wrapper)));
    }

    /// Number of entries whose wrapper is still alive.
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.value().alive()).count()
    }

    fn evict_dead(&self, addr: usize) {
        let removed = self.entries.remove_if(&addr, |_, v| !v.alive());
        if removed.is_some() {
            trace!(addr, "identity cache evicted collected wrapper");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::types::TypeTag;
    use crate::registry::{FieldInfo, Kind, RecordInfo, TypeDescriptor, TypeInfo};
    use crate::structure::{Ownership, StructureData};

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(
            "Demo",
            "Blob",
            Kind::Record(RecordInfo::new(
                4,
                vec![FieldInfo::new("v", TypeInfo::scalar(TypeTag::Int32), 0)],
            )),
        )
    }

    #[test]
    fn test_lookup_after_insert() {
        let cache = IdentityCache::new();
        let wrapper = StructureData::adopt(descriptor(), 0x1000 as *mut u8, Ownership::Borrowed);
        let canonical = cache.insert_struct(0x1000, &wrapper);
        assert!(Arc::ptr_eq(&canonical, &wrapper));

        let hit = cache.lookup_struct(0x1000).unwrap();
        assert!(Arc::ptr_eq(&hit, &wrapper));
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn test_collected_wrapper_misses() {
        let cache = IdentityCache::new();
        let wrapper = StructureData::adopt(descriptor(), 0x2000 as *mut u8, Ownership::Borrowed);
        cache.insert_struct(0x2000, &wrapper);
        drop(wrapper);

        assert!(cache.lookup_struct(0x2000).is_none());
        assert_eq!(cache.live_count(), 0);
    }

    #[test]
    fn test_duplicate_insert_keeps_first_live_wrapper() {
        let cache = IdentityCache::new();
        let first = StructureData::adopt(descriptor(), 0x3000 as *mut u8, Ownership::Borrowed);
        let second = StructureData::adopt(descriptor(), 0x3000 as *mut u8, Ownership::Borrowed);

        cache.insert_struct(0x3000, &first);
        let canonical = cache.insert_struct(0x3000, &second);
        assert!(Arc::ptr_eq(&canonical, &first));
        assert_eq!(cache.live_count(), 1);
    }
}
