use crate::callbacks::Value;
use crate::dispatch::Scope;
use crate::error::{CoreError, CoreResult};
use crate::flow::Flow;
use crate::render::RenderCtx;
use crate::state::{BacktrackScope, Saved};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use uuid::Uuid;

/// Identity of a mounted component. Components have no intrinsic identity of
/// their own; the id assigned at mount time is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(Uuid);

impl ComponentId {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The contract for a stateful component.
///
/// A component renders itself, may bind value and action callbacks while
/// rendering, and may opt individual mutable fields into the backtracking
/// log. Tree structure (children, decoration chain) lives in the
/// [`Tree`](crate::Tree), not here.
pub trait Component: Any + Send {
    /// Produce this component's markup. Callback bindings are registered
    /// through the context; the tokens they return are interpolated into the
    /// output so the next request can route submissions back here.
    fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()>;

    /// Contribute snapshot entries for the fields that should participate in
    /// backtracking. Opt-in: components whose state never changes after
    /// construction need not implement this.
    fn backtrack_state(&self, scope: &mut BacktrackScope<'_>) {
        let _ = scope;
    }

    /// Restore one field previously contributed by [`backtrack_state`].
    ///
    /// [`backtrack_state`]: Component::backtrack_state
    fn restore_state(&mut self, field: &str, value: &dyn Saved) -> CoreResult<()> {
        let _ = value;
        Err(CoreError::Restore {
            field: field.to_string(),
            reason: "component registers no restorable fields".to_string(),
        })
    }

    /// Named resume methods, resolved when an answer arrives for a call that
    /// named this method as its resume target. The default knows none.
    fn resume(
        &mut self,
        method: &str,
        scope: &mut Scope<'_>,
        args: Vec<Value>,
    ) -> CoreResult<Flow> {
        let _ = (scope, args);
        Err(CoreError::ResumeTarget {
            target: method.to_string(),
            reason: "the component exposes no resume methods".to_string(),
        })
    }
}

impl dyn Component {
    pub fn downcast_ref<C: Component>(&self) -> Option<&C> {
        (self as &dyn Any).downcast_ref::<C>()
    }

    pub fn downcast_mut<C: Component>(&mut self) -> Option<&mut C> {
        (self as &mut dyn Any).downcast_mut::<C>()
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// A component with no markup, no callbacks and no state.
    pub(crate) struct Inert;

    impl Component for Inert {
        fn render(&self, _ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
            Ok(())
        }
    }
}
