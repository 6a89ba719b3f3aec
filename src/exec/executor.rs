//! The user executor contract.
//!
//! A pipe runs a pool of interchangeable executors of one type. Each
//! invocation receives the generation's [`ExecContext`], a reference to the
//! fully assembled input, and a mutable output to fill, and returns a
//! [`Severity`].
//!
//! # Example
//!
//! ```ignore
//! use fenceflow::exec::{ExecContext, Executor};
//! use fenceflow::Severity;
//!
//! struct Doubler;
//!
//! impl Executor for Doubler {
//!     type Input = i64;
//!     type Output = i64;
//!
//!     fn invoke(&mut self, _ctx: &mut ExecContext, input: &i64, output: &mut i64) -> Severity {
//!         *output = input * 2;
//!         Severity::Ok
//!     }
//! }
//! ```

use super::context::ExecContext;
use crate::error::Severity;
use crate::options::OptionStore;

/// A unit of computation run by a pipe.
///
/// Implementations are owned one-per-slot; `invoke` is called with exclusive
/// access, so executors may carry mutable scratch state. They must not
/// assume anything about which generation lands on which slot.
pub trait Executor: Send + 'static {
    /// The assembled input type, built up by link adapters (or supplied
    /// directly at the front pipe). `Default` provides the empty value each
    /// generation starts from.
    type Input: Default + Send + 'static;

    /// The produced output type, fanned out to downstream links.
    type Output: Default + Send + Sync + 'static;

    /// Processes one generation.
    ///
    /// `output` starts as `Default::default()`; the executor fills it in and
    /// reports how the invocation went. Output is delivered downstream
    /// regardless of severity; handlers decide what a failure means.
    fn invoke(
        &mut self,
        ctx: &mut ExecContext,
        input: &Self::Input,
        output: &mut Self::Output,
    ) -> Severity;

    /// One-time hook called at launch, before any invocation.
    ///
    /// A non-success severity fails the launch.
    fn initialize(&mut self, _options: &OptionStore) -> Severity {
        Severity::Ok
    }

    /// Registers this executor type's default options.
    ///
    /// Called once when a pipe for this executor type is created; the same
    /// registrations are re-applied by `OptionStore::reset_to_defaults`.
    fn register_default_options(_options: &OptionStore) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl Executor for Doubler {
        type Input = i64;
        type Output = i64;

        fn invoke(&mut self, _ctx: &mut ExecContext, input: &i64, output: &mut i64) -> Severity {
            *output = input * 2;
            Severity::Ok
        }
    }

    #[test]
    fn test_executor_invoke() {
        use crate::fence::FenceIndex;
        use std::sync::Arc;

        let fence_object = Arc::new(crate::fence::FenceObject::new(Arc::new(OptionStore::new())));
        let options = Arc::new(OptionStore::new());
        let mut ctx = ExecContext::new(FenceIndex::FIRST, fence_object, options);

        let mut output = 0i64;
        let severity = Doubler.invoke(&mut ctx, &21, &mut output);
        assert_eq!(severity, Severity::Ok);
        assert_eq!(output, 42);
    }

    #[test]
    fn test_default_initialize_succeeds() {
        let options = OptionStore::new();
        assert_eq!(Doubler.initialize(&options), Severity::Ok);
    }
}
