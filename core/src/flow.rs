use crate::callbacks::Value;
use crate::component::ComponentId;
use crate::transfer::CallRequest;
use std::fmt;

/// The explicit result of walking a component (sub)tree.
///
/// `Flow` is "Control Flow as Data". No per-request execution context survives
/// past the request boundary, so the non-local transfers of the call/answer
/// protocol cannot ride on a real call stack; instead every traversal step
/// returns a `Flow` and each caller checks it before continuing.
pub enum Flow {
    /// Keep walking.
    Continue,

    /// A callback target requested a control transfer. Built by
    /// [`Scope::call`](crate::dispatch::Scope::call); the dispatcher applies
    /// its effects and converts it to [`Flow::Called`] before propagating.
    Call(CallRequest),

    /// A call took effect. Unwinds the whole walk; the request is finalized
    /// with no further processing.
    Called {
        caller: ComponentId,
        callee: ComponentId,
    },

    /// A component answered. Unwinds until the matching answer capture on the
    /// answering component's chain consumes it; reaching the boundary
    /// unconsumed is the protocol error of
    /// [`CoreError::AnswerWithoutCall`](crate::CoreError::AnswerWithoutCall).
    Answer {
        from: ComponentId,
        args: Vec<Value>,
    },
}

impl Flow {
    pub fn is_continue(&self) -> bool {
        matches!(self, Flow::Continue)
    }

    pub fn is_called(&self) -> bool {
        matches!(self, Flow::Called { .. })
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Continue => write!(f, "Continue"),
            Flow::Call(request) => f.debug_tuple("Call").field(request).finish(),
            Flow::Called { caller, callee } => f
                .debug_struct("Called")
                .field("caller", caller)
                .field("callee", callee)
                .finish(),
            Flow::Answer { from, args } => f
                .debug_struct("Answer")
                .field("from", from)
                .field("args", args)
                .finish(),
        }
    }
}
