use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::buffer::page::{AtomicPageId, Page, PageId, PageRef, INVALID_PAGE_ID};
use crate::config::BufferPoolConfig;
use crate::error::{VellumError, VellumResult};
use crate::storage::disk_manager::DiskManager;
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::Replacer;
use crate::utils::hash::ExtendibleHashTable;

pub type FrameId = usize;

/// Caches disk pages in a fixed array of frames.
///
/// The page table maps resident page ids to frames; the replacer ranks
/// unpinned frames for eviction; the free list holds frames bound to no page
/// at all. A coarse latch serializes operations, and the page-table and
/// replacer latches nest strictly inside it, never the other way around.
#[derive(Debug)]
pub struct BufferPoolManager {
    latch: Mutex<()>,
    pool: Vec<Arc<RwLock<Page>>>,
    free_list: Mutex<VecDeque<FrameId>>,
    page_table: Mutex<ExtendibleHashTable<PageId, FrameId>>,
    replacer: Mutex<LRUKReplacer>,
    next_page_id: AtomicPageId,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(num_pages: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new_with_config(
            BufferPoolConfig {
                buffer_pool_size: num_pages,
                ..Default::default()
            },
            disk_manager,
        )
    }

    pub fn new_with_config(config: BufferPoolConfig, disk_manager: Arc<DiskManager>) -> Self {
        let mut free_list = VecDeque::with_capacity(config.buffer_pool_size);
        let mut pool = Vec::with_capacity(config.buffer_pool_size);
        for frame_id in 0..config.buffer_pool_size {
            free_list.push_back(frame_id);
            pool.push(Arc::new(RwLock::new(Page::empty())));
        }

        Self {
            latch: Mutex::new(()),
            pool,
            free_list: Mutex::new(free_list),
            page_table: Mutex::new(ExtendibleHashTable::new(config.bucket_size)),
            replacer: Mutex::new(LRUKReplacer::with_k(
                config.buffer_pool_size,
                config.lru_k_k,
            )),
            // Ids continue past whatever the file already holds, so an id is
            // never handed out twice even across reopen.
            next_page_id: AtomicPageId::new(disk_manager.num_pages() + 1),
            disk_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn disk_manager(&self) -> Arc<DiskManager> {
        self.disk_manager.clone()
    }

    /// Allocate a frame, zero it behind a fresh page id, and hand back the
    /// pinned page.
    pub fn new_page(self: &Arc<Self>) -> VellumResult<PageRef> {
        let _guard = self.latch.lock();
        if self.free_list.lock().is_empty() && self.replacer.lock().size() == 0 {
            return Err(VellumError::BufferPoolFull);
        }

        let frame_id = self.allocate_frame()?;
        let page_id = self.allocate_page();
        let installed = self.page_table.lock().insert(page_id, frame_id);
        if let Err(e) = installed {
            self.free_list.lock().push_back(frame_id);
            return Err(e);
        }
        self.pool[frame_id]
            .write()
            .replace(Page::new(page_id).with_pin_count(AtomicU32::new(1)));

        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id)?;
        replacer.set_evictable(frame_id, false)?;
        drop(replacer);

        Ok(PageRef::new(
            Arc::clone(self),
            self.pool[frame_id].clone(),
            page_id,
        ))
    }

    /// Pin the page, reading it from disk if it is not resident.
    pub fn fetch_page(self: &Arc<Self>, page_id: PageId) -> VellumResult<PageRef> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "fetch_page: invalid page id".to_string(),
            ));
        }
        let _guard = self.latch.lock();

        // Bind the lookup result so the page-table guard is released before
        // the replacer latch is taken.
        let resident = self.page_table.lock().find(&page_id);
        if let Some(frame_id) = resident {
            self.pool[frame_id]
                .read()
                .pin_count
                .fetch_add(1, Ordering::SeqCst);
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false)?;
            drop(replacer);
            return Ok(PageRef::new(
                Arc::clone(self),
                self.pool[frame_id].clone(),
                page_id,
            ));
        }

        let frame_id = self.allocate_frame()?;
        let installed = self.page_table.lock().insert(page_id, frame_id);
        if let Err(e) = installed {
            self.free_list.lock().push_back(frame_id);
            return Err(e);
        }
        // Pin before the read so the frame is never up for grabs while its
        // contents are in flight.
        self.pool[frame_id]
            .write()
            .replace(Page::new(page_id).with_pin_count(AtomicU32::new(1)));
        match self.disk_manager.read_page(page_id) {
            Ok(data) => self.pool[frame_id].write().load(data),
            Err(e) => {
                self.page_table.lock().remove(&page_id);
                self.pool[frame_id].write().destroy();
                self.free_list.lock().push_back(frame_id);
                return Err(e);
            }
        }

        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id)?;
        replacer.set_evictable(frame_id, false)?;
        drop(replacer);

        Ok(PageRef::new(
            Arc::clone(self),
            self.pool[frame_id].clone(),
            page_id,
        ))
    }

    /// Drop one pin. Returns false for a page that is not resident or is
    /// already unpinned. `is_dirty` only ever sets the dirty bit.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _guard = self.latch.lock();
        let Some(frame_id) = self.page_table.lock().find(&page_id) else {
            return false;
        };

        let mut page = self.pool[frame_id].write();
        if page.pin_count() == 0 {
            return false;
        }
        page.pin_count.fetch_sub(1, Ordering::SeqCst);
        if is_dirty {
            page.is_dirty = true;
        }
        let now_unpinned = page.pin_count() == 0;
        drop(page);

        if now_unpinned {
            if let Err(e) = self.replacer.lock().set_evictable(frame_id, true) {
                debug!("failed to mark frame {} evictable: {}", frame_id, e);
            }
        }
        true
    }

    /// Write the page back if dirty. Returns false when the page is not
    /// resident; pins and evictability are untouched either way.
    pub fn flush_page(&self, page_id: PageId) -> VellumResult<bool> {
        let _guard = self.latch.lock();
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let Some(frame_id) = self.page_table.lock().find(&page_id) else {
            return Ok(false);
        };

        let snapshot = {
            let page = self.pool[frame_id].read();
            page.is_dirty.then(|| Bytes::copy_from_slice(page.data()))
        };
        if let Some(bytes) = snapshot {
            self.disk_manager.write_page(page_id, &bytes)?;
            self.pool[frame_id].write().is_dirty = false;
        }
        Ok(true)
    }

    /// Write back every resident dirty frame, without pinning or evicting
    /// anything.
    pub fn flush_all_pages(&self) -> VellumResult<()> {
        let _guard = self.latch.lock();
        for frame in self.pool.iter() {
            let snapshot = {
                let page = frame.read();
                (page.page_id != INVALID_PAGE_ID && page.is_dirty)
                    .then(|| (page.page_id, Bytes::copy_from_slice(page.data())))
            };
            if let Some((page_id, bytes)) = snapshot {
                self.disk_manager.write_page(page_id, &bytes)?;
                frame.write().is_dirty = false;
            }
        }
        Ok(())
    }

    /// Evict the page from the cache and retire its id. Deleting a page
    /// that is not resident succeeds as a no-op; deleting a pinned page
    /// fails. The content is discarded, dirty or not.
    pub fn delete_page(&self, page_id: PageId) -> VellumResult<bool> {
        let _guard = self.latch.lock();
        let Some(frame_id) = self.page_table.lock().find(&page_id) else {
            return Ok(true);
        };
        if self.pool[frame_id].read().pin_count() > 0 {
            return Ok(false);
        }

        self.page_table.lock().remove(&page_id);
        self.replacer.lock().remove(frame_id)?;
        self.pool[frame_id].write().destroy();
        self.free_list.lock().push_back(frame_id);
        Ok(true)
    }

    fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Latch held by the caller. Prefers the free list, then evicts. A dirty
    /// victim is written back before its mapping is removed and before the
    /// frame is handed out; if the write fails the victim stays resident and
    /// its replacer tracking is re-armed.
    fn allocate_frame(&self) -> VellumResult<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok(frame_id);
        }
        let Some(frame_id) = self.replacer.lock().evict() else {
            return Err(VellumError::BufferPoolFull);
        };

        let (victim_id, snapshot) = {
            let page = self.pool[frame_id].read();
            (
                page.page_id,
                page.is_dirty.then(|| Bytes::copy_from_slice(page.data())),
            )
        };
        if let Some(bytes) = snapshot {
            debug!(
                "writing back dirty page {} before reusing frame {}",
                victim_id, frame_id
            );
            if let Err(e) = self.disk_manager.write_page(victim_id, &bytes) {
                let mut replacer = self.replacer.lock();
                let _ = replacer.record_access(frame_id);
                let _ = replacer.set_evictable(frame_id, true);
                return Err(e);
            }
            self.pool[frame_id].write().is_dirty = false;
        }
        self.page_table.lock().remove(&victim_id);
        // The frame is unbound from here until the caller rebinds it; reset
        // it so an aborted caller can free-list it as-is.
        self.pool[frame_id].write().destroy();
        Ok(frame_id)
    }
}
