pub mod clock;
pub mod replacer;

use crate::config::BufferPoolConfig;
use crate::storage::error::StorageError;
use crate::storage::{PageId, PageManager, PAGE_SIZE};
use anyhow::{Context, Result};
use clock::ClockReplacer;
use log::debug;
use parking_lot::{Mutex, RwLock};
use replacer::{FrameId, Replacer};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub struct Frame {
    data: Box<[u8; PAGE_SIZE]>,
    page_id: Option<PageId>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
            page_id: None,
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    fn reset(&mut self) {
        self.page_id = None;
        self.pin_count.store(0, Ordering::SeqCst);
        self.is_dirty.store(false, Ordering::SeqCst);
        self.data.fill(0);
    }
}

/// Bookkeeping that must change atomically with pin-count transitions.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// Fixed-size page cache over a [`PageManager`].
///
/// Frame ids `0..pool_size` are issued by the pool itself. A frame is taken
/// from the free list while one remains, and otherwise from the replacer.
/// A page stays pinned while any guard on it is alive. Dropping the last
/// guard makes its frame evictable again.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    // Lock order: state, then frames, then page_manager
    state: Mutex<PoolState>,
    frames: RwLock<Vec<Frame>>,
    replacer: Box<dyn Replacer>,
    page_manager: Mutex<PageManager>,
    pool_size: usize,
}

impl BufferPoolManager {
    pub fn new(page_manager: PageManager, replacer: Box<dyn Replacer>, pool_size: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                state: Mutex::new(PoolState {
                    page_table: HashMap::with_capacity(pool_size),
                    free_list: (0..pool_size as FrameId).collect(),
                }),
                frames: RwLock::new((0..pool_size).map(|_| Frame::new()).collect()),
                replacer,
                page_manager: Mutex::new(page_manager),
                pool_size,
            }),
        }
    }

    /// Build a pool whose eviction is driven by a [`ClockReplacer`].
    pub fn with_config(page_manager: PageManager, config: &BufferPoolConfig) -> Self {
        let replacer = Box::new(ClockReplacer::new(config.pool_size));
        Self::new(page_manager, replacer, config.pool_size)
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<PageReadGuard> {
        let frame_id = self.pin_page(page_id, false)?;
        let frames = self.inner.frames.read();
        let data = frames[frame_id as usize].data.as_ref() as *const [u8; PAGE_SIZE];

        Ok(PageReadGuard {
            inner: self.inner.clone(),
            frame_id,
            page_id,
            data,
        })
    }

    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard> {
        let frame_id = self.pin_page(page_id, true)?;
        let mut frames = self.inner.frames.write();
        let data = frames[frame_id as usize].data.as_mut() as *mut [u8; PAGE_SIZE];
        drop(frames);

        Ok(PageWriteGuard {
            inner: self.inner.clone(),
            frame_id,
            page_id,
            data,
        })
    }

    pub fn new_page(&self) -> Result<(PageId, PageWriteGuard)> {
        let mut state = self.inner.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = match self.inner.page_manager.lock().allocate_page() {
            Ok(page_id) => page_id,
            Err(err) => {
                state.free_list.push_back(frame_id);
                return Err(err).context("Failed to allocate page");
            }
        };

        let mut frames = self.inner.frames.write();
        let frame = &mut frames[frame_id as usize];
        frame.reset();
        frame.page_id = Some(page_id);
        frame.pin_count.store(1, Ordering::SeqCst);
        frame.is_dirty.store(true, Ordering::SeqCst);
        let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];
        drop(frames);

        state.page_table.insert(page_id, frame_id);
        self.inner.replacer.pin(frame_id);
        debug!("new page {} in frame {}", page_id, frame_id);

        Ok((
            page_id,
            PageWriteGuard {
                inner: self.inner.clone(),
                frame_id,
                page_id,
                data,
            },
        ))
    }

    /// Write a resident page back to disk. Returns false if the page is not
    /// in the pool.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.inner.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };

        let frames = self.inner.frames.read();
        let frame = &frames[frame_id as usize];
        self.inner
            .page_manager
            .lock()
            .write_page(page_id, &frame.data[..])
            .with_context(|| format!("Failed to flush page {}", page_id))?;
        frame.is_dirty.store(false, Ordering::SeqCst);

        Ok(true)
    }

    pub fn flush_all(&self) -> Result<()> {
        let state = self.inner.state.lock();
        let frames = self.inner.frames.read();
        let mut page_manager = self.inner.page_manager.lock();

        for (&page_id, &frame_id) in &state.page_table {
            let frame = &frames[frame_id as usize];
            if frame.is_dirty.load(Ordering::SeqCst) {
                page_manager
                    .write_page(page_id, &frame.data[..])
                    .with_context(|| format!("Failed to flush page {}", page_id))?;
                frame.is_dirty.store(false, Ordering::SeqCst);
            }
        }
        page_manager.sync().context("Failed to sync page file")?;

        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Current pin count of a resident page, or None if it is not in the pool.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        let frames = self.inner.frames.read();
        Some(frames[frame_id as usize].pin_count.load(Ordering::SeqCst))
    }

    /// Number of frames the replacer could hand out right now.
    pub fn evictable_frames(&self) -> usize {
        self.inner.replacer.size()
    }

    fn pin_page(&self, page_id: PageId, dirty: bool) -> Result<FrameId> {
        let mut state = self.inner.state.lock();

        // Check if page is already in buffer pool
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frames = self.inner.frames.read();
            let frame = &frames[frame_id as usize];
            if frame.pin_count.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.replacer.pin(frame_id);
            }
            if dirty {
                frame.is_dirty.store(true, Ordering::SeqCst);
            }
            return Ok(frame_id);
        }

        // Page not in buffer pool, need to load from disk
        let frame_id = self.acquire_frame(&mut state)?;
        {
            let mut frames = self.inner.frames.write();
            let frame = &mut frames[frame_id as usize];

            let loaded = self
                .inner
                .page_manager
                .lock()
                .read_page(page_id, &mut frame.data[..]);
            if let Err(err) = loaded {
                state.free_list.push_back(frame_id);
                return Err(err).with_context(|| format!("Failed to load page {}", page_id));
            }

            frame.page_id = Some(page_id);
            frame.pin_count.store(1, Ordering::SeqCst);
            frame.is_dirty.store(dirty, Ordering::SeqCst);
        }

        state.page_table.insert(page_id, frame_id);
        self.inner.replacer.pin(frame_id);
        debug!("loaded page {} into frame {}", page_id, frame_id);

        Ok(frame_id)
    }

    /// Take a free frame, evicting the replacer's victim if none is left.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .inner
            .replacer
            .victim()
            .ok_or(StorageError::BufferPoolFull)?;

        let mut frames = self.inner.frames.write();
        let frame = &mut frames[frame_id as usize];
        if let Some(old_page_id) = frame.page_id {
            if frame.is_dirty.load(Ordering::SeqCst) {
                debug!("writing back page {} from frame {}", old_page_id, frame_id);
                let written = self
                    .inner
                    .page_manager
                    .lock()
                    .write_page(old_page_id, &frame.data[..]);
                if let Err(err) = written {
                    // Leave the page resident and evictable
                    self.inner.replacer.unpin(frame_id);
                    return Err(err)
                        .with_context(|| format!("Failed to write back page {}", old_page_id));
                }
            }
            state.page_table.remove(&old_page_id);
            debug!("evicted page {} from frame {}", old_page_id, frame_id);
        }
        frame.reset();

        Ok(frame_id)
    }
}

impl BufferPoolInner {
    fn unpin_frame(&self, frame_id: FrameId, is_dirty: bool) {
        let _state = self.state.lock();
        let frames = self.frames.read();
        let frame = &frames[frame_id as usize];

        if is_dirty {
            frame.is_dirty.store(true, Ordering::SeqCst);
        }
        if frame.pin_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.replacer.unpin(frame_id);
        }
    }
}

pub struct PageReadGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    page_id: PageId,
    data: *const [u8; PAGE_SIZE],
}

impl PageReadGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageReadGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.data }
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        self.inner.unpin_frame(self.frame_id, false);
    }
}

pub struct PageWriteGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    page_id: PageId,
    data: *mut [u8; PAGE_SIZE],
}

impl PageWriteGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageWriteGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.data }
    }
}

impl DerefMut for PageWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.data }
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.inner.unpin_frame(self.frame_id, true);
    }
}

// The pinned frame's data box never moves or gets reused while a guard is alive
unsafe impl Send for PageReadGuard {}
unsafe impl Sync for PageReadGuard {}
unsafe impl Send for PageWriteGuard {}
unsafe impl Sync for PageWriteGuard {}
