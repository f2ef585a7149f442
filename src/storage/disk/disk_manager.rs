use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from the
/// database file. The file is a flat array of page-sized records indexed
/// by page id and grows on demand.
pub struct DiskManager {
    /// Database file handle; the cursor is owned by whoever holds the lock
    file: Mutex<File>,
    /// Path to the database file
    db_path: PathBuf,
    /// Number of pages the file currently has room for
    capacity: AtomicU64,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
    /// Number of pages handed back via delete_page
    num_deletes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let capacity = file.metadata()?.len() / PAGE_SIZE as u64;

        Ok(Self {
            file: Mutex::new(file),
            db_path,
            capacity: AtomicU64::new(capacity),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            num_deletes: AtomicU32::new(0),
        })
    }

    /// Reads the page into `data`. Reading past the current file size
    /// yields zeroed bytes, matching a page that was allocated but never
    /// written back.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut file = self.file.lock();
        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let file_len = file.metadata()?.len();

        if offset >= file_len {
            data.fill(0);
        } else {
            file.seek(SeekFrom::Start(offset))?;
            let mut read = 0;
            while read < PAGE_SIZE {
                let n = file.read(&mut data[read..])?;
                if n == 0 {
                    data[read..].fill(0);
                    break;
                }
                read += n;
            }
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes the page to disk and flushes it.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut file = self.file.lock();
        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Makes sure the file can hold at least `pages` pages. The capacity
    /// doubles until the request fits, so repeated allocations stay cheap.
    pub fn increase_disk_space(&self, pages: u64) -> Result<()> {
        let current = self.capacity.load(Ordering::Acquire);
        if pages <= current {
            return Ok(());
        }

        let mut new_capacity = current.max(1);
        while new_capacity < pages {
            new_capacity *= 2;
        }

        let file = self.file.lock();
        // Re-check under the lock; another thread may have grown the file.
        if self.capacity.load(Ordering::Acquire) >= pages {
            return Ok(());
        }
        file.set_len(new_capacity * PAGE_SIZE as u64)?;
        self.capacity.store(new_capacity, Ordering::Release);

        log::debug!(
            "grew database file {:?} to {} pages",
            self.db_path,
            new_capacity
        );
        Ok(())
    }

    /// Deallocates a page. Without a free-space map this only counts the
    /// request; the page id is never reused.
    pub fn delete_page(&self, _page_id: PageId) -> Result<()> {
        self.num_deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }
}
