//! Input slot: the fence admission state machine.
//!
//! One slot per pipe assembles a complete input from all upstream links
//! before dispatch. Exactly one fence is active at a time; a link may
//! submit at most once per active fence; the slot advances either when all
//! links are valid (dispatch) or when the generation is invalidated
//! (abort). Advancing immediately, before the dispatched generation has
//! finished executing, is what lets consecutive generations overlap.
//!
//! This module is the pure state machine; locking and the async dispatch
//! around it live in the pipe core.

use crate::fence::{FenceIndex, FenceObject};
use std::sync::Arc;

/// Per-link submission state for the active fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LinkState {
    Vacant,
    Valid,
}

/// Three-way admission verdict for an offered fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The generation has already passed; the caller must silently drop.
    Stale,
    /// The generation is not yet active, or no executor slot is free; the
    /// caller must retry later.
    NotYetReady,
    /// The offer can be submitted now.
    Ready,
}

pub(crate) struct InputSlot<I> {
    active_fence: FenceIndex,
    fence_object: Option<Arc<FenceObject>>,
    cached_input: I,
    ready: Vec<LinkState>,
}

impl<I: Default> InputSlot<I> {
    pub(crate) fn new() -> Self {
        Self {
            active_fence: FenceIndex::NONE,
            fence_object: None,
            cached_input: I::default(),
            ready: Vec::new(),
        }
    }

    /// Adds one input link (pre-launch only).
    pub(crate) fn grow_links(&mut self) -> usize {
        self.ready.push(LinkState::Vacant);
        self.ready.len() - 1
    }

    pub(crate) fn link_count(&self) -> usize {
        self.ready.len()
    }

    /// Seeds the first active fence at launch.
    pub(crate) fn seed(&mut self, fence: FenceIndex) {
        self.active_fence = fence;
    }

    pub(crate) fn active_fence(&self) -> FenceIndex {
        self.active_fence
    }

    /// Classifies an offered fence. `slot_idle` is whether the executor
    /// pool's rotation target can accept a dispatch right now.
    pub(crate) fn admission(&self, fence: FenceIndex, slot_idle: bool) -> Admission {
        if fence < self.active_fence {
            Admission::Stale
        } else if fence > self.active_fence || !slot_idle {
            Admission::NotYetReady
        } else {
            Admission::Ready
        }
    }

    /// Classifies an offered abort, which does not need an idle executor.
    pub(crate) fn abort_admission(&self, fence: FenceIndex) -> Admission {
        if fence < self.active_fence {
            Admission::Stale
        } else if fence > self.active_fence {
            Admission::NotYetReady
        } else {
            Admission::Ready
        }
    }

    /// Attaches the generation's fence object. First submitter wins; the
    /// protocol requires later submitters to carry the identical object.
    pub(crate) fn attach_fence_object(&mut self, fence_object: &Arc<FenceObject>) {
        if self.fence_object.is_none() {
            self.fence_object = Some(Arc::clone(fence_object));
        }
    }

    /// Marks one link valid. Errors if the link already submitted for the
    /// active fence.
    pub(crate) fn mark_valid(&mut self, link: usize) -> Result<(), ()> {
        if self.ready[link] == LinkState::Valid {
            return Err(());
        }
        self.ready[link] = LinkState::Valid;
        Ok(())
    }

    pub(crate) fn all_valid(&self) -> bool {
        self.ready.iter().all(|s| *s == LinkState::Valid)
    }

    /// Mutable access to the partially assembled input, for link mutators.
    pub(crate) fn cached_input_mut(&mut self) -> &mut I {
        &mut self.cached_input
    }

    /// Hands out the assembled generation and advances the slot so the next
    /// generation can begin accepting input immediately.
    ///
    /// `fallback` is the fence object of the submission that completed the
    /// set, used if no earlier submission attached one.
    pub(crate) fn take_for_dispatch(
        &mut self,
        fallback: &Arc<FenceObject>,
    ) -> (FenceIndex, I, Arc<FenceObject>) {
        let fence = self.active_fence;
        let input = std::mem::take(&mut self.cached_input);
        let object = self
            .fence_object
            .take()
            .unwrap_or_else(|| Arc::clone(fallback));
        self.advance();
        (fence, input, object)
    }

    /// Invalidates the active generation: partial data is discarded and the
    /// slot advances. Returns the aborted fence.
    pub(crate) fn invalidate(&mut self) -> FenceIndex {
        let fence = self.active_fence;
        self.cached_input = I::default();
        self.fence_object = None;
        self.advance();
        fence
    }

    fn advance(&mut self) {
        self.active_fence = self.active_fence.next();
        self.ready.fill(LinkState::Vacant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionStore;

    fn fence_object() -> Arc<FenceObject> {
        Arc::new(FenceObject::new(Arc::new(OptionStore::new())))
    }

    fn slot_with_links(n: usize) -> InputSlot<Vec<i32>> {
        let mut slot = InputSlot::new();
        for _ in 0..n {
            slot.grow_links();
        }
        slot.seed(FenceIndex::FIRST);
        slot
    }

    #[test]
    fn test_admission_three_way() {
        let slot = slot_with_links(1);
        let active = slot.active_fence();

        assert_eq!(slot.admission(active, true), Admission::Ready);
        assert_eq!(slot.admission(active, false), Admission::NotYetReady);
        assert_eq!(slot.admission(active.next(), true), Admission::NotYetReady);
    }

    #[test]
    fn test_stale_admission_is_idempotent() {
        let mut slot = slot_with_links(1);
        let first = slot.active_fence();
        slot.invalidate();

        for _ in 0..3 {
            assert_eq!(slot.admission(first, true), Admission::Stale);
            assert_eq!(slot.abort_admission(first), Admission::Stale);
        }
        assert_eq!(slot.active_fence(), first.next());
    }

    #[test]
    fn test_duplicate_mark_rejected() {
        let mut slot = slot_with_links(2);
        slot.mark_valid(0).unwrap();
        assert!(slot.mark_valid(0).is_err());
        assert!(slot.mark_valid(1).is_ok());
    }

    #[test]
    fn test_dispatch_advances_and_clears() {
        let mut slot = slot_with_links(2);
        let obj = fence_object();
        let first = slot.active_fence();

        slot.attach_fence_object(&obj);
        slot.cached_input_mut().push(1);
        slot.mark_valid(0).unwrap();
        slot.cached_input_mut().push(2);
        slot.mark_valid(1).unwrap();
        assert!(slot.all_valid());

        let (fence, input, _object) = slot.take_for_dispatch(&obj);
        assert_eq!(fence, first);
        assert_eq!(input, vec![1, 2]);
        assert_eq!(slot.active_fence(), first.next());
        assert!(!slot.all_valid());
    }

    #[test]
    fn test_invalidate_discards_partial_data() {
        let mut slot = slot_with_links(2);
        let obj = fence_object();

        slot.attach_fence_object(&obj);
        slot.cached_input_mut().push(7);
        slot.mark_valid(0).unwrap();

        let aborted = slot.invalidate();
        assert_eq!(aborted, FenceIndex::FIRST);

        // The next generation starts from the empty input; fence 0's
        // partial data is gone.
        slot.attach_fence_object(&obj);
        slot.mark_valid(0).unwrap();
        slot.mark_valid(1).unwrap();
        let (fence, input, _object) = slot.take_for_dispatch(&obj);
        assert_eq!(fence, FenceIndex::FIRST.next());
        assert!(input.is_empty());
    }

    #[test]
    fn test_first_fence_object_wins() {
        let mut slot = slot_with_links(2);
        let first = fence_object();
        let second = fence_object();

        slot.attach_fence_object(&first);
        slot.attach_fence_object(&second);
        let (_, _, object) = slot.take_for_dispatch(&second);
        assert!(Arc::ptr_eq(&object, &first));
    }

    #[test]
    fn test_zero_link_slot_all_valid() {
        let slot = slot_with_links(0);
        assert!(slot.all_valid());
    }
}
