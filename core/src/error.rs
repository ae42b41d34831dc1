use crate::component::ComponentId;
use crate::decoration::DecorationId;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures surfaced by the component core.
///
/// Everything here is fatal for the current request: there is no retry in the
/// core. Expected control transfers (call, answer) travel as [`crate::Flow`],
/// never as errors.
#[derive(Error, Debug)]
pub enum CoreError {
    /// An answer unwound to the boundary without a matching answer capture.
    /// The tree no longer matches the call that produced the answer (e.g. a
    /// stale decoration restored by backtracking).
    #[error("answer from component {component} has no pending call to resume")]
    AnswerWithoutCall { component: ComponentId },

    /// The resume target of a call could not be invoked on the calling
    /// component. Detected at invocation time, not at call time.
    #[error("resume target `{target}` is not callable on the calling component: {reason}")]
    ResumeTarget { target: String, reason: String },

    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),

    #[error("decoration {decoration} is not on the chain of component {component}")]
    UnknownDecoration {
        component: ComponentId,
        decoration: DecorationId,
    },

    /// A traversal reached a component that is still being visited higher up
    /// the same walk. Delegation cycles surface here.
    #[error("component {0} re-entered while it is still being visited")]
    ReentrantVisit(ComponentId),

    /// A callback target registered for one component type fired on another.
    #[error("callback bound for `{expected}` fired on a different component type")]
    TargetMismatch { expected: &'static str },

    #[error("cannot restore field `{field}`: {reason}")]
    Restore { field: String, reason: String },

    #[error("malformed callback token `{0}`")]
    MalformedToken(String),

    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
