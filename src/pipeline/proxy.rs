//! Weak pipeline handle for external observers.

use super::PipelineCore;
use crate::error::ProtocolError;
use crate::options::OptionValue;
use std::sync::{Arc, Weak};

/// Weak, revalidated handle to a pipeline.
///
/// Used by external callers (dashboards, drivers) that must not keep the
/// pipeline alive. Every operation re-upgrades the reference; once the
/// pipeline is destroyed, operations report `StalePipeline`.
pub struct PipelineProxy {
    core: Weak<PipelineCore>,
}

impl PipelineProxy {
    pub(crate) fn new(core: &Arc<PipelineCore>) -> Self {
        Self {
            core: Arc::downgrade(core),
        }
    }

    fn upgrade(&self) -> Result<Arc<PipelineCore>, ProtocolError> {
        self.core.upgrade().ok_or(ProtocolError::StalePipeline)
    }

    /// Returns true if the pipeline still exists.
    pub fn is_alive(&self) -> bool {
        self.core.strong_count() > 0
    }

    pub fn pipe_count(&self) -> Result<usize, ProtocolError> {
        Ok(self.upgrade()?.pipe_snapshot().len())
    }

    /// Names of all pipes, in insertion order.
    pub fn pipe_names(&self) -> Result<Vec<Arc<str>>, ProtocolError> {
        Ok(self
            .upgrade()?
            .pipe_snapshot()
            .iter()
            .map(|p| p.name())
            .collect())
    }

    /// Reads a global option.
    pub fn get_option(&self, key: &str) -> Result<Option<OptionValue>, ProtocolError> {
        Ok(self.upgrade()?.options().get(key))
    }

    /// Writes a global option.
    pub fn set_option(
        &self,
        key: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), ProtocolError> {
        self.upgrade()?.options().set(key, value)
    }

    /// Waits until no pipe has in-flight asynchronous work.
    pub async fn sync(&self) -> Result<(), ProtocolError> {
        let core = self.upgrade()?;
        core.wait_quiescent().await;
        Ok(())
    }
}

impl Clone for PipelineProxy {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}

impl std::fmt::Debug for PipelineProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineProxy")
            .field("alive", &self.is_alive())
            .finish()
    }
}
