//! Executor slot bookkeeping.
//!
//! A pipe's executors run fully in parallel and may finish out of order.
//! Two indices keep delivery deterministic anyway:
//!
//! - the *rotation target*: the one slot the next generation may be handed
//!   to. Dispatch is strict round-robin, so launch order equals slot order.
//! - the *output turn*: the one slot allowed to deliver its output right
//!   now. It rotates in the same order, so downstream pipes observe outputs
//!   in launch order even when computation completed out of order.
//!
//! The bookkeeping here lives under the pipe's state lock; the executors
//! themselves are stored separately so user code never runs under it.

use crate::error::Severity;
use crate::exec::Executor;
use crate::fence::FenceIndex;
use parking_lot::Mutex;

/// Per-slot bookkeeping, guarded by the pipe state lock.
#[derive(Debug)]
pub(crate) struct SlotBook {
    pub(crate) busy: bool,
    pub(crate) fence: FenceIndex,
    pub(crate) last_severity: Severity,
}

impl SlotBook {
    fn new() -> Self {
        Self {
            busy: false,
            fence: FenceIndex::NONE,
            last_severity: Severity::Ok,
        }
    }
}

/// Bookkeeping for a pipe's pool of executor slots.
#[derive(Debug)]
pub(crate) struct SlotPool {
    books: Vec<SlotBook>,
    rotation: usize,
    output_turn: usize,
}

impl SlotPool {
    /// An empty pool; a pipe has no slots until launch.
    pub(crate) fn empty() -> Self {
        Self {
            books: Vec::new(),
            rotation: 0,
            output_turn: 0,
        }
    }

    pub(crate) fn init(&mut self, count: usize) {
        self.books = (0..count).map(|_| SlotBook::new()).collect();
        self.rotation = 0;
        self.output_turn = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the rotation target can accept a dispatch.
    pub(crate) fn rotation_idle(&self) -> bool {
        !self.books.is_empty() && !self.books[self.rotation].busy
    }

    /// Hands the rotation target to a generation and advances the rotation.
    ///
    /// Callers must have checked `rotation_idle`; the slot becomes busy the
    /// instant the input is handed off.
    pub(crate) fn acquire_rotation(&mut self, fence: FenceIndex) -> usize {
        let slot = self.rotation;
        debug_assert!(!self.books[slot].busy, "dispatch to busy slot");
        self.books[slot].busy = true;
        self.books[slot].fence = fence;
        self.rotation = (self.rotation + 1) % self.books.len();
        slot
    }

    /// Whether `slot` currently holds the output turn.
    pub(crate) fn is_output_turn(&self, slot: usize) -> bool {
        self.output_turn == slot
    }

    /// Passes the output turn to the next slot and releases `slot`.
    ///
    /// Busy clears only now: after execution *and* all deliveries, so the
    /// rotation target cannot be re-dispatched mid-delivery. During shutdown
    /// a chain may finish without having held the turn; the slot is still
    /// released but the turn is left where it is.
    pub(crate) fn finish(&mut self, slot: usize, severity: Severity) {
        if self.output_turn == slot {
            self.output_turn = (slot + 1) % self.books.len();
        }
        self.books[slot].busy = false;
        self.books[slot].fence = FenceIndex::NONE;
        self.books[slot].last_severity = severity;
    }

    pub(crate) fn any_busy(&self) -> bool {
        self.books.iter().any(|b| b.busy)
    }
}

/// Storage for one user executor, locked only by its own running chain.
pub(crate) struct ExecSlot<E: Executor> {
    pub(crate) executor: Mutex<E>,
}

impl<E: Executor> ExecSlot<E> {
    pub(crate) fn new(executor: E) -> Self {
        Self {
            executor: Mutex::new(executor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_not_idle() {
        let pool = SlotPool::empty();
        assert!(!pool.rotation_idle());
        assert!(!pool.any_busy());
    }

    #[test]
    fn test_rotation_is_strict_round_robin() {
        let mut pool = SlotPool::empty();
        pool.init(3);

        assert_eq!(pool.acquire_rotation(FenceIndex::FIRST), 0);
        assert_eq!(pool.acquire_rotation(FenceIndex::FIRST.next()), 1);
        assert_eq!(pool.acquire_rotation(FenceIndex::FIRST.next().next()), 2);
        assert!(!pool.rotation_idle()); // back at slot 0, still busy
    }

    #[test]
    fn test_output_turn_rotates_in_launch_order() {
        let mut pool = SlotPool::empty();
        pool.init(2);
        pool.acquire_rotation(FenceIndex::FIRST);
        pool.acquire_rotation(FenceIndex::FIRST.next());

        assert!(pool.is_output_turn(0));
        assert!(!pool.is_output_turn(1));

        pool.finish(0, Severity::Ok);
        assert!(pool.is_output_turn(1));
        assert!(pool.rotation_idle()); // slot 0 free again

        pool.finish(1, Severity::Warning);
        assert!(pool.is_output_turn(0));
        assert!(!pool.any_busy());
    }

    #[test]
    fn test_single_slot_pool() {
        let mut pool = SlotPool::empty();
        pool.init(1);

        let slot = pool.acquire_rotation(FenceIndex::FIRST);
        assert_eq!(slot, 0);
        assert!(!pool.rotation_idle());
        assert!(pool.is_output_turn(0));

        pool.finish(0, Severity::Ok);
        assert!(pool.rotation_idle());
        assert!(pool.is_output_turn(0));
    }
}
