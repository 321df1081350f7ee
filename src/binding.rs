use crate::{HeapCategory, ResourceLayout};

/// Heaps assigned to the root parameters of a [`ResourceLayout`] for one draw
/// or dispatch.
///
/// `H` is whatever the caller binds per table, with the wgpu backend that is
/// a [`BindGroupId`](crate::BindGroupId).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceTable<H> {
    categories: Vec<HeapCategory>,
    heaps: Vec<Option<H>>,
}

impl<H> ResourceTable<H> {
    pub fn new(layout: &ResourceLayout) -> Self {
        let categories = layout
            .heaps()
            .iter()
            .map(|heap| heap.category())
            .collect::<Vec<_>>();

        Self {
            heaps: categories.iter().map(|_| None).collect(),
            categories,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heaps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heaps.is_empty()
    }

    #[inline]
    pub fn category(&self, root_index: u32) -> HeapCategory {
        assert!((root_index as usize) < self.categories.len(), "root index out of range");
        self.categories[root_index as usize]
    }

    pub fn set(&mut self, root_index: u32, heap: Option<H>) -> &mut Self {
        assert!((root_index as usize) < self.heaps.len(), "root index out of range");

        self.heaps[root_index as usize] = heap;
        self
    }

    #[inline]
    pub fn get(&self, root_index: u32) -> Option<&H> {
        self.heaps.get(root_index as usize).and_then(Option::as_ref)
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.heaps.iter().all(Option::is_some)
    }

    /// Assigned heaps with their root index.
    pub fn bound(&self) -> impl Iterator<Item = (u32, &H)> {
        self.heaps
            .iter()
            .enumerate()
            .filter_map(|(index, heap)| heap.as_ref().map(|heap| (index as u32, heap)))
    }
}
