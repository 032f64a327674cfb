use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use derive_with::With;
use log::debug;
use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;

pub type PageId = u32;
pub type AtomicPageId = AtomicU32;

pub const INVALID_PAGE_ID: PageId = 0;
pub const PAGE_SIZE: usize = 4096;

/// One pool frame: a page-sized buffer plus residency metadata.
#[derive(Debug, With)]
pub struct Page {
    pub page_id: PageId,
    data: [u8; PAGE_SIZE],
    // reference count of outstanding pins
    pub pin_count: AtomicU32,
    // whether the buffer differs from the disk copy
    pub is_dirty: bool,
}

impl Page {
    pub fn empty() -> Self {
        Self::new(INVALID_PAGE_ID)
    }

    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            data: [0; PAGE_SIZE],
            pin_count: AtomicU32::new(0),
            is_dirty: false,
        }
    }

    pub fn destroy(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.data = [0; PAGE_SIZE];
        self.pin_count.store(0, Ordering::SeqCst);
        self.is_dirty = false;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    /// Whole-page overwrite by a client; marks the frame dirty.
    pub fn set_data(&mut self, data: [u8; PAGE_SIZE]) {
        self.data = data;
        self.is_dirty = true;
    }

    /// Install the on-disk image, leaving the dirty bit alone.
    pub(crate) fn load(&mut self, data: [u8; PAGE_SIZE]) {
        self.data = data;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn replace(&mut self, other: Page) {
        self.page_id = other.page_id;
        self.data = other.data;
        self.pin_count = other.pin_count;
        self.is_dirty = other.is_dirty;
    }
}

/// Pinned handle to a resident page.
///
/// Holding a `PageRef` keeps the frame from being rebound. The pin is
/// released when the handle drops; dropping a handle whose page was already
/// unpinned by hand is a silent no-op.
#[derive(Debug)]
pub struct PageRef {
    manager: Arc<BufferPoolManager>,
    page: Arc<RwLock<Page>>,
    page_id: PageId,
}

impl PageRef {
    pub(crate) fn new(
        manager: Arc<BufferPoolManager>,
        page: Arc<RwLock<Page>>,
        page_id: PageId,
    ) -> Self {
        Self {
            manager,
            page,
            page_id,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.page.read().pin_count()
    }

    pub fn is_dirty(&self) -> bool {
        self.page.read().is_dirty
    }

    /// Mark the frame dirty now; the eventual unpin never clears the bit.
    pub fn mark_dirty(&self) {
        self.page.write().is_dirty = true;
    }
}

impl Deref for PageRef {
    type Target = Arc<RwLock<Page>>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        if !self.manager.unpin_page(self.page_id, false) {
            debug!(
                "page {} was already unpinned when its handle dropped",
                self.page_id
            );
        }
    }
}
