//! Clock (second-chance) replacement policy.
//!
//! Evictable frames sit in a circular ring swept by a single hand. Every
//! unpin sets the frame's reference bit. When the hand reaches a frame whose
//! bit is set, it clears the bit and moves on. The first frame it reaches with
//! a clear bit is the victim. A frame that was touched since the hand last
//! passed therefore survives exactly one more sweep.
//!
//! The ring is an arena of `capacity` slots linked by index. Slots are
//! allocated once at construction and recycled, so steady-state operation
//! never allocates. A newly admitted frame is linked directly behind the hand,
//! which makes hand order equal admission order.

use super::replacer::{FrameId, Replacer};
use log::{debug, trace, warn};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Tracked frame, `None` while the slot is vacant.
    frame_id: Option<FrameId>,
    reference: bool,
    prev: usize,
    next: usize,
}

impl Slot {
    const VACANT: Slot = Slot {
        frame_id: None,
        reference: false,
        prev: 0,
        next: 0,
    };
}

#[derive(Debug)]
struct Clock {
    slots: Box<[Slot]>,
    /// Slot under the hand. Only meaningful while `len > 0`.
    hand: usize,
    /// Number of member slots linked into the ring.
    len: usize,
}

impl Clock {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::VACANT; capacity].into_boxed_slice(),
            hand: 0,
            len: 0,
        }
    }

    fn find(&self, frame_id: FrameId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.frame_id == Some(frame_id))
    }

    fn vacant(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.frame_id.is_none())
    }

    /// Link `idx` in as the last slot the hand will reach.
    fn link_behind_hand(&mut self, idx: usize, frame_id: FrameId) {
        if self.len == 0 {
            self.slots[idx] = Slot {
                frame_id: Some(frame_id),
                reference: true,
                prev: idx,
                next: idx,
            };
            self.hand = idx;
        } else {
            let hand = self.hand;
            let tail = self.slots[hand].prev;
            self.slots[idx] = Slot {
                frame_id: Some(frame_id),
                reference: true,
                prev: tail,
                next: hand,
            };
            self.slots[tail].next = idx;
            self.slots[hand].prev = idx;
        }
        self.len += 1;
    }

    /// Detach a member slot. A hand resting on it moves to the next member.
    fn unlink(&mut self, idx: usize) -> Option<FrameId> {
        let Slot {
            frame_id,
            prev,
            next,
            ..
        } = self.slots[idx];
        if self.len > 1 {
            self.slots[prev].next = next;
            self.slots[next].prev = prev;
            if self.hand == idx {
                self.hand = next;
            }
        }
        self.slots[idx] = Slot::VACANT;
        self.len -= 1;
        frame_id
    }

    fn sweep(&mut self) -> Option<FrameId> {
        if self.len == 0 {
            return None;
        }

        // Terminates within len + 1 steps: bits are only set by unpin, which
        // cannot run while we hold the lock.
        loop {
            let idx = self.hand;
            let slot = &mut self.slots[idx];
            if slot.reference {
                slot.reference = false;
                trace!(
                    "clock hand gives frame {:?} a second chance at slot {}",
                    slot.frame_id,
                    idx
                );
                self.hand = slot.next;
            } else {
                return self.unlink(idx);
            }
        }
    }
}

/// Clock replacer tracking at most `capacity` evictable frames at a time.
///
/// Frame ids are opaque. An `unpin` that would admit a new id while
/// `capacity` ids are already tracked is ignored.
#[derive(Debug)]
pub struct ClockReplacer {
    clock: Mutex<Clock>,
    capacity: usize,
}

impl ClockReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            clock: Mutex::new(Clock::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `frame_id` is currently a candidate for eviction.
    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.clock.lock().find(frame_id).is_some()
    }

    #[cfg(test)]
    fn hand(&self) -> usize {
        self.clock.lock().hand
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let victim = self.clock.lock().sweep();
        if let Some(frame_id) = victim {
            debug!("clock replacer selected frame {} as victim", frame_id);
        }
        victim
    }

    fn pin(&self, frame_id: FrameId) {
        let mut clock = self.clock.lock();
        if let Some(idx) = clock.find(frame_id) {
            clock.unlink(idx);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut clock = self.clock.lock();
        if let Some(idx) = clock.find(frame_id) {
            clock.slots[idx].reference = true;
            return;
        }
        match clock.vacant() {
            Some(idx) => clock.link_behind_hand(idx, frame_id),
            None => warn!(
                "clock replacer is full ({} frames); ignoring unpin of frame {}",
                self.capacity, frame_id
            ),
        }
    }

    fn size(&self) -> usize {
        self.clock.lock().len
    }
}
