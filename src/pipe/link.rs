//! Links between pipes.
//!
//! An output link pairs a pure adapter function, which transforms the
//! upstream output into a mutation of the downstream input, with a
//! type-erased port to the downstream pipe. Erasure happens at the link
//! boundary: the upstream chain only sees `LinkPort<O>`, so pipes with
//! different executor types compose freely while both ends stay typed.

use super::core::PipeCore;
use crate::error::ProtocolError;
use crate::exec::Executor;
use crate::fence::{FenceIndex, FenceObject};
use crate::pipeline::PipeId;
use std::sync::Arc;

/// Outcome of offering a submission to a downstream pipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The submission was accepted.
    Accepted,
    /// The downstream generation has already passed; the offer was dropped.
    Stale,
    /// The downstream pipe cannot take the offer yet; retry later.
    Busy,
}

/// Adapter folding an upstream output into a downstream input.
pub type LinkAdapter<O, I> = Arc<dyn Fn(&FenceObject, &O, &mut I) + Send + Sync>;

/// Type-erased submission port of a downstream pipe, from the perspective
/// of an upstream pipe producing `O`.
pub(crate) trait LinkPort<O>: Send + Sync {
    fn pipe_id(&self) -> PipeId;

    /// Whether the destination pipe is optional (may skip generations).
    fn optional(&self) -> bool;

    /// Offers output data for `fence` through this link.
    fn deliver(
        &self,
        fence: FenceIndex,
        fence_object: &Arc<FenceObject>,
        output: &O,
    ) -> Result<SubmitOutcome, ProtocolError>;

    /// Offers an abort for `fence` through this link.
    fn deliver_abort(&self, fence: FenceIndex) -> Result<SubmitOutcome, ProtocolError>;
}

/// Concrete port binding an adapter to a typed downstream pipe.
pub(crate) struct AdaptedPort<O, D: Executor> {
    pub(crate) target: Arc<PipeCore<D>>,
    pub(crate) link_index: usize,
    pub(crate) adapter: LinkAdapter<O, D::Input>,
}

impl<O: Send + Sync + 'static, D: Executor> LinkPort<O> for AdaptedPort<O, D> {
    fn pipe_id(&self) -> PipeId {
        self.target.id()
    }

    fn optional(&self) -> bool {
        self.target.is_optional()
    }

    fn deliver(
        &self,
        fence: FenceIndex,
        fence_object: &Arc<FenceObject>,
        output: &O,
    ) -> Result<SubmitOutcome, ProtocolError> {
        self.target
            .submit_linked(fence, self.link_index, fence_object, |input| {
                (self.adapter)(fence_object.as_ref(), output, input)
            })
    }

    fn deliver_abort(&self, fence: FenceIndex) -> Result<SubmitOutcome, ProtocolError> {
        self.target.submit_abort(fence)
    }
}

/// One downstream connection of a pipe.
pub(crate) struct OutputLink<O> {
    pub(crate) port: Arc<dyn LinkPort<O>>,
}

/// One upstream connection of a pipe, parallel to the input slot's ready
/// vector.
#[derive(Clone, Copy, Debug)]
pub(crate) struct InputLink {
    pub(crate) source: PipeId,
}
