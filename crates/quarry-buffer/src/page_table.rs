//! Page ID to frame ID mapping.

use crate::frame::FrameId;
use parking_lot::RwLock;
use quarry_common::page::PageId;
use std::collections::HashMap;

/// Maps resident page IDs to the frames holding them.
pub struct PageTable {
    entries: RwLock<HashMap<PageId, FrameId>>,
}

impl PageTable {
    /// Creates a page table sized for the given frame count.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Looks up the frame holding a page.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.entries.read().get(&page_id).copied()
    }

    /// Returns true if the page is resident.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.entries.read().contains_key(&page_id)
    }

    /// Records that a page now lives in the given frame.
    #[inline]
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        self.entries.write().insert(page_id, frame_id);
    }

    /// Removes a page mapping, returning the frame it occupied.
    #[inline]
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        self.entries.write().remove(&page_id)
    }

    /// Returns the number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no pages are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Visits every (page, frame) mapping.
    pub fn for_each(&self, mut f: impl FnMut(PageId, FrameId)) {
        for (&page_id, &frame_id) in self.entries.read().iter() {
            f(page_id, frame_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_table_insert_get() {
        let table = PageTable::new(8);
        let page_id = PageId::new(0, 1);

        assert!(table.get(page_id).is_none());
        table.insert(page_id, FrameId(3));
        assert_eq!(table.get(page_id), Some(FrameId(3)));
        assert!(table.contains(page_id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_page_table_remove() {
        let table = PageTable::new(8);
        let page_id = PageId::new(0, 1);

        table.insert(page_id, FrameId(3));
        assert_eq!(table.remove(page_id), Some(FrameId(3)));
        assert!(table.remove(page_id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_page_table_for_each() {
        let table = PageTable::new(8);
        table.insert(PageId::new(0, 1), FrameId(0));
        table.insert(PageId::new(0, 2), FrameId(1));

        let mut count = 0;
        table.for_each(|_, _| count += 1);
        assert_eq!(count, 2);
    }
}
