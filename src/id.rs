use std::{
    hash::Hash,
    marker::PhantomData,
    ops::Deref,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;

pub type BufferId = Id<wgpu::Buffer>;
pub type TextureViewId = Id<wgpu::TextureView>;
pub type BindGroupId = Id<wgpu::BindGroup>;

/// Handle to an object owned by an [`IdMap`].
///
/// Handles are reference counted; the map keeps one untracked reference per
/// entry, and [`IdMap::clean`] drops entries nobody else refers to.
pub struct Id<T>(u64, Arc<()>, PhantomData<fn() -> T>);

impl<T> Id<T> {
    #[inline]
    pub fn index(&self) -> u64 {
        self.0
    }

    #[inline]
    fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.1) == 1
    }
}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0, self.1.clone(), PhantomData)
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

pub struct IdMap<T> {
    map: DashMap<Id<T>, T>,
    next_id: AtomicU64,
}

impl<T> Default for IdMap<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IdMap<T> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Reserves an id without storing anything under it.
    pub fn next_id(&self) -> Id<T> {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);

        Id(id, Arc::new(()), PhantomData)
    }

    pub fn register(&self, value: T) -> Id<T> {
        let id = self.next_id();

        self.map.insert(id.clone(), value);

        id
    }

    /// Drops every entry whose handles have all been dropped.
    pub fn clean(&self) {
        self.map.retain(|id, _| !id.is_orphaned())
    }
}

impl<T> Deref for IdMap<T> {
    type Target = DashMap<Id<T>, T>;

    fn deref(&self) -> &Self::Target {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_drops_unreferenced_entries() {
        let map = IdMap::<&'static str>::new();

        let kept = map.register("kept");
        let dropped = map.register("dropped");
        let dropped_index = dropped.index();
        drop(dropped);

        map.clean();

        assert_eq!(map.len(), 1);
        assert_eq!(*map.get(&kept).unwrap(), "kept");
        assert!(map.iter().all(|entry| entry.key().index() != dropped_index));
    }

    #[test]
    fn ids_compare_by_index() {
        let map = IdMap::<u32>::new();

        let a = map.next_id();
        let b = map.next_id();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
