//! Weak pipe handles for external observers.
//!
//! A [`PipeProxy`] lets external callers (dashboards, option editors)
//! observe and mutate a pipe without holding ownership. The reference is
//! weak and revalidated on every use; once the pipeline is gone, every
//! operation reports [`ProtocolError::StalePipeline`].

use super::core::{PipeCore, PipeStats};
use super::link::SubmitOutcome;
use crate::error::ProtocolError;
use crate::exec::Executor;
use crate::fence::FenceIndex;
use crate::options::OptionValue;
use crate::pipeline::PipeId;
use std::sync::{Arc, Weak};

/// Weak, revalidated handle to one pipe.
pub struct PipeProxy<E: Executor> {
    id: PipeId,
    name: Arc<str>,
    core: Weak<PipeCore<E>>,
}

impl<E: Executor> PipeProxy<E> {
    pub(crate) fn new(core: &Arc<PipeCore<E>>) -> Self {
        Self {
            id: core.id(),
            name: Arc::clone(core.name()),
            core: Arc::downgrade(core),
        }
    }

    fn upgrade(&self) -> Result<Arc<PipeCore<E>>, ProtocolError> {
        self.core.upgrade().ok_or(ProtocolError::StalePipeline)
    }

    /// The pipe's id. Available even after the pipeline is gone.
    pub fn id(&self) -> PipeId {
        self.id
    }

    /// The pipe's name. Available even after the pipeline is gone.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the pipe still exists.
    pub fn is_alive(&self) -> bool {
        self.core.strong_count() > 0
    }

    pub fn is_launched(&self) -> Result<bool, ProtocolError> {
        Ok(self.upgrade()?.is_launched())
    }

    pub fn executor_count(&self) -> Result<usize, ProtocolError> {
        Ok(self.upgrade()?.executor_count())
    }

    /// Latest execution snapshot.
    pub fn stats(&self) -> Result<PipeStats, ProtocolError> {
        Ok(self.upgrade()?.stats())
    }

    /// Reads one of the pipe's options.
    pub fn get_option(&self, key: &str) -> Result<Option<OptionValue>, ProtocolError> {
        Ok(self.upgrade()?.options().get(key))
    }

    /// Writes one of the pipe's options.
    pub fn set_option(
        &self,
        key: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), ProtocolError> {
        self.upgrade()?.options().set(key, value)
    }

    /// Resets the pipe's options to their executor-registered defaults.
    pub fn reset_options(&self) -> Result<(), ProtocolError> {
        self.upgrade()?.options().reset_to_defaults();
        Ok(())
    }

    /// Invalidates a generation at this pipe, as an upstream failure would.
    ///
    /// The abortion propagates to every transitively downstream pipe.
    pub fn submit_abort(&self, fence: FenceIndex) -> Result<SubmitOutcome, ProtocolError> {
        self.upgrade()?.submit_abort(fence)
    }
}

impl<E: Executor> Clone for PipeProxy<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            core: Weak::clone(&self.core),
        }
    }
}

impl<E: Executor> std::fmt::Debug for PipeProxy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeProxy")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}
