//! Error and result-severity types for the engine.
//!
//! Two distinct notions live here and must not be conflated:
//!
//! - [`ProtocolError`]: programmer errors in graph construction or driver
//!   code (duplicate submission, cyclic link, stale proxy). These are
//!   surfaced synchronously at the offending call and are never tolerated
//!   silently, since tolerating them would corrupt the fence protocol.
//! - [`Severity`]: the *value* a user executor returns from an invocation.
//!   The runtime threads it through to handlers and telemetry but never
//!   interprets it beyond success/failure framing; a `Fatal` result does not
//!   stop the pipeline.

use thiserror::Error;

/// Protocol violations in pipeline construction or driving.
///
/// Transient unavailability and stale generations are *not* errors; they
/// are reported as [`SubmitOutcome`](crate::pipe::SubmitOutcome) values and
/// handled by retry or silent drop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// An input link submitted twice for the same active fence.
    #[error("input link {link} already submitted for fence {fence} on pipe '{pipe}'")]
    DuplicateSubmission {
        pipe: String,
        fence: u64,
        link: usize,
    },

    /// Topology mutation attempted on a pipe that is already launched.
    #[error("pipe '{pipe}' is already launched")]
    AlreadyLaunched { pipe: String },

    /// Runtime operation attempted on a pipe that was never launched.
    #[error("pipe '{pipe}' is not launched")]
    NotLaunched { pipe: String },

    /// `launch` called with an empty executor pool.
    #[error("pipe '{pipe}' must be launched with at least one executor")]
    NoExecutors { pipe: String },

    /// A pipe cannot be linked to itself.
    #[error("cannot link pipe '{pipe}' to itself")]
    SelfLink { pipe: String },

    /// The two pipes are already linked.
    #[error("pipes '{from}' and '{to}' are already linked")]
    DuplicateLink { from: String, to: String },

    /// Adding the edge would make the link graph cyclic.
    #[error("linking '{from}' to '{to}' would create a cycle")]
    CyclicLink { from: String, to: String },

    /// The fan-in join does not agree on a governing optional branch point.
    #[error(
        "cannot link '{from}' to '{to}': upstream paths disagree on the \
         nearest optional ancestor governing the join"
    )]
    OptionalAncestorMismatch { from: String, to: String },

    /// A pipe from a different pipeline was passed to this pipeline.
    #[error("pipe '{pipe}' does not belong to this pipeline")]
    ForeignPipe { pipe: String },

    /// Direct (front) input offered to a pipe that has input links.
    #[error("pipe '{pipe}' has input links and cannot accept direct input")]
    DirectInputWithLinks { pipe: String },

    /// The front pipe's executor type differs from the requested one.
    #[error("front pipe '{pipe}' has a different executor type")]
    FrontTypeMismatch { pipe: String },

    /// The pipeline has no pipes yet, so there is no front.
    #[error("pipeline has no front pipe")]
    NoFrontPipe,

    /// An executor's `initialize` hook reported failure at launch.
    #[error("executor slot {slot} of pipe '{pipe}' failed to initialize ({severity})")]
    InitializeFailed {
        pipe: String,
        slot: usize,
        severity: Severity,
    },

    /// An option write was rejected (unknown key or verifier refusal).
    #[error("option '{key}' rejected: {reason}")]
    OptionRejected { key: String, reason: String },

    /// The referenced pipeline (or pipe) has been destroyed.
    #[error("pipeline reference is stale")]
    StalePipeline,

    /// The pipeline has been shut down and accepts no further work.
    #[error("pipeline is shut down")]
    PipelineShutDown,
}

/// Severity of a single executor invocation, ordered by how bad it is.
///
/// Returned by user executors; the runtime records it, threads it to output
/// handlers, and otherwise leaves interpretation to user code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The invocation succeeded.
    #[default]
    Ok,

    /// Succeeded with a condition worth surfacing.
    Warning,

    /// The invocation failed; output may be incomplete.
    Error,

    /// The invocation failed in a way user code should treat as terminal.
    Fatal,
}

impl Severity {
    /// Returns true for results framed as success (`Ok`, `Warning`).
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Warning)
    }

    /// Returns the worse of two severities.
    pub fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_severity_is_success() {
        assert!(Severity::Ok.is_success());
        assert!(Severity::Warning.is_success());
        assert!(!Severity::Error.is_success());
        assert!(!Severity::Fatal.is_success());
    }

    #[test]
    fn test_severity_max() {
        assert_eq!(Severity::Ok.max(Severity::Error), Severity::Error);
        assert_eq!(Severity::Fatal.max(Severity::Warning), Severity::Fatal);
    }

    #[test]
    fn test_severity_default() {
        assert_eq!(Severity::default(), Severity::Ok);
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::DuplicateSubmission {
            pipe: "decode".to_string(),
            fence: 5,
            link: 1,
        };
        assert_eq!(
            format!("{}", err),
            "input link 1 already submitted for fence 5 on pipe 'decode'"
        );

        let err = ProtocolError::SelfLink {
            pipe: "decode".to_string(),
        };
        assert_eq!(format!("{}", err), "cannot link pipe 'decode' to itself");
    }
}
