use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::buffer::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{VellumError, VellumResult};

/// Synchronous page-granular access to the database file.
///
/// Page `p` lives at byte offset `(p - 1) * PAGE_SIZE`; the reserved id 0 has
/// no offset. A read addressed at or past the end of the file yields a zeroed
/// page, so a page that was allocated but never written back reads as empty.
#[derive(Debug)]
pub struct DiskManager {
    // One transfer at a time; the handle seeks before every read and write.
    db_file: Mutex<File>,
    // Highest page id with bytes on disk.
    num_pages: AtomicU32,
}

impl DiskManager {
    pub fn try_new(db_path: impl AsRef<Path>) -> VellumResult<Self> {
        let db_path = db_path.as_ref();
        let db_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(db_path)?;

        let db_file_len = db_file.metadata()?.len();
        if db_file_len % PAGE_SIZE as u64 != 0 {
            return Err(VellumError::Storage(format!(
                "db file size {} is not a multiple of page size {}",
                db_file_len, PAGE_SIZE
            )));
        }
        let num_pages = (db_file_len / PAGE_SIZE as u64) as PageId;
        debug!("opened db file {:?} holding {} pages", db_path, num_pages);

        Ok(Self {
            db_file: Mutex::new(db_file),
            num_pages: AtomicU32::new(num_pages),
        })
    }

    pub fn read_page(&self, page_id: PageId) -> VellumResult<[u8; PAGE_SIZE]> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "read_page: invalid page id".to_string(),
            ));
        }
        let mut page = [0u8; PAGE_SIZE];
        let mut guard = self.db_file.lock();
        let offset = (page_id - 1) as u64 * PAGE_SIZE as u64;
        if offset >= guard.metadata()?.len() {
            debug!("read_page: page {} is beyond EOF, zero-filled", page_id);
            return Ok(page);
        }
        guard.seek(SeekFrom::Start(offset))?;
        guard.read_exact(&mut page)?;
        Ok(page)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> VellumResult<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "write_page: invalid page id".to_string(),
            ));
        }
        if data.len() != PAGE_SIZE {
            return Err(VellumError::Internal(format!(
                "page size is not {}",
                PAGE_SIZE
            )));
        }
        let mut guard = self.db_file.lock();
        guard.seek(SeekFrom::Start((page_id - 1) as u64 * PAGE_SIZE as u64))?;
        guard.write_all(data)?;
        guard.flush()?;
        self.num_pages.fetch_max(page_id, Ordering::SeqCst);
        Ok(())
    }

    /// Highest page id with bytes on disk.
    pub fn num_pages(&self) -> PageId {
        self.num_pages.load(Ordering::SeqCst)
    }

    pub fn db_file_len(&self) -> VellumResult<u64> {
        let guard = self.db_file.lock();
        Ok(guard.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_page() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = DiskManager::try_new(temp_dir.path().join("test.db")).unwrap();

        let mut page1 = vec![1u8, 2, 3];
        page1.extend(vec![0; PAGE_SIZE - 3]);
        disk_manager.write_page(1, &page1).unwrap();
        assert_eq!(disk_manager.read_page(1).unwrap(), page1.as_slice());

        let mut page2 = vec![0u8; PAGE_SIZE - 3];
        page2.extend(vec![4, 5, 6]);
        disk_manager.write_page(2, &page2).unwrap();
        assert_eq!(disk_manager.read_page(2).unwrap(), page2.as_slice());

        assert_eq!(disk_manager.num_pages(), 2);
        assert_eq!(disk_manager.db_file_len().unwrap(), 2 * PAGE_SIZE as u64);
    }

    #[test]
    fn read_past_eof_zero_fills() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = DiskManager::try_new(temp_dir.path().join("test.db")).unwrap();

        let page = disk_manager.read_page(42).unwrap();
        assert!(page.iter().all(|byte| *byte == 0));
        assert_eq!(disk_manager.num_pages(), 0);
    }

    #[test]
    fn invalid_page_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = DiskManager::try_new(temp_dir.path().join("test.db")).unwrap();

        assert!(disk_manager.read_page(INVALID_PAGE_ID).is_err());
        assert!(disk_manager
            .write_page(INVALID_PAGE_ID, &[0u8; PAGE_SIZE])
            .is_err());
        assert!(disk_manager.write_page(1, &[0u8; 16]).is_err());
    }

    #[test]
    fn reopen_recovers_page_count() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        {
            let disk_manager = DiskManager::try_new(&db_path).unwrap();
            disk_manager.write_page(3, &[7u8; PAGE_SIZE]).unwrap();
        }
        let reopened = DiskManager::try_new(&db_path).unwrap();
        assert_eq!(reopened.num_pages(), 3);
        assert_eq!(reopened.read_page(3).unwrap(), [7u8; PAGE_SIZE]);
        // the sparse gap below reads as zeroes
        assert!(reopened.read_page(2).unwrap().iter().all(|byte| *byte == 0));
    }
}
