use std::fmt::Debug;

pub type FrameId = u32;

/// Eviction policy consulted by the buffer pool.
///
/// Implementations guard their own state, so every method takes `&self` and
/// may be called from any thread without outside locking. None of them
/// blocks beyond a short critical section.
pub trait Replacer: Send + Sync + Debug {
    /// Select and remove a frame to evict. Returns None if no frame can be evicted.
    fn victim(&self) -> Option<FrameId>;

    /// Mark a frame as pinned (not evictable). No-op if it is not tracked.
    fn pin(&self, frame_id: FrameId);

    /// Mark a frame as unpinned (evictable) and record an access to it.
    fn unpin(&self, frame_id: FrameId);

    /// Get the number of evictable frames.
    fn size(&self) -> usize;
}
