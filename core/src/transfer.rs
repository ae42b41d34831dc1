use crate::callbacks::Value;
use crate::component::{Component, ComponentId};
use crate::decoration::{Decoration, DecorationId, Link};
use crate::dispatch::{self, CallbackWalk, Scope};
use crate::error::{CoreError, CoreResult};
use crate::flow::Flow;
use crate::render::{self, RenderWalk};
use crate::state::{self, BacktrackWalk};
use crate::tree::Tree;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How a callback target names the component it is calling.
pub(crate) enum Callee {
    Mounted(ComponentId),
    Fresh(Box<dyn FnOnce(&mut Tree) -> CoreResult<ComponentId> + Send>),
}

/// A control transfer requested by a callback target but not yet applied.
/// Carried inside [`Flow::Call`] until the dispatcher applies its effects.
pub struct CallRequest {
    caller: ComponentId,
    callee: Callee,
    resume: Option<ResumeTarget>,
    extra: Vec<Value>,
}

impl CallRequest {
    pub(crate) fn new(
        caller: ComponentId,
        callee: Callee,
        resume: Option<ResumeTarget>,
        extra: Vec<Value>,
    ) -> Self {
        Self {
            caller,
            callee,
            resume,
            extra,
        }
    }
}

impl fmt::Debug for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callee = match &self.callee {
            Callee::Mounted(id) => format!("{id}"),
            Callee::Fresh(_) => "<fresh>".to_string(),
        };
        f.debug_struct("CallRequest")
            .field("caller", &self.caller)
            .field("callee", &callee)
            .finish()
    }
}

/// What runs when the answer for a call arrives: either a named method
/// resolved through [`Component::resume`] on the calling component, or an
/// arbitrary one-shot handler.
pub enum ResumeTarget {
    Method(&'static str),
    Handler(ResumeFn),
}

pub type ResumeFn =
    Box<dyn FnOnce(&mut dyn Component, &mut Scope<'_>, Vec<Value>) -> CoreResult<Flow> + Send>;

impl ResumeTarget {
    pub fn method(name: &'static str) -> Self {
        ResumeTarget::Method(name)
    }

    /// A typed one-shot handler on the calling component.
    pub fn handler<C, F>(handler: F) -> Self
    where
        C: Component,
        F: FnOnce(&mut C, &mut Scope<'_>, Vec<Value>) -> CoreResult<Flow> + Send + 'static,
    {
        let expected = std::any::type_name::<C>();
        ResumeTarget::Handler(Box::new(move |component, scope, args| {
            let component = component
                .downcast_mut::<C>()
                .ok_or(CoreError::TargetMismatch { expected })?;
            handler(component, scope, args)
        }))
    }
}

/// Everything needed to resume the caller once the callee answers, captured
/// at call time. Exactly one record is live per outstanding call; it is
/// consumed at most once.
struct OnAnswer {
    caller: ComponentId,
    callee: ComponentId,
    delegate: DecorationId,
    capture: DecorationId,
    resume: Option<ResumeTarget>,
    extra: Vec<Value>,
}

/// Redirects the caller's processing, rendering and state capture to the
/// called component for as long as the call is outstanding.
struct Delegate {
    id: DecorationId,
    target: ComponentId,
}

impl Decoration for Delegate {
    fn id(&self) -> DecorationId {
        self.id
    }

    fn process_callbacks(
        &self,
        mut link: Link<'_, '_>,
        walk: &mut CallbackWalk<'_>,
    ) -> CoreResult<Flow> {
        dispatch::process_node(link.tree(), self.target, walk)
    }

    fn render(&self, mut link: Link<'_, '_>, walk: &mut RenderWalk<'_>) -> CoreResult<()> {
        render::render_node(link.tree(), self.target, walk)
    }

    fn backtrack_state(
        &self,
        mut link: Link<'_, '_>,
        walk: &mut BacktrackWalk<'_>,
    ) -> CoreResult<()> {
        state::capture_node(link.tree(), self.target, walk)
    }
}

/// Sits on the called component's chain and consumes the answer unwinding
/// through it: restores both pre-call chains, then invokes the resume target
/// with the extra args prepended to the answer payload.
struct AnswerCapture {
    id: DecorationId,
    owner: ComponentId,
    record: Mutex<Option<OnAnswer>>,
}

impl Decoration for AnswerCapture {
    fn id(&self) -> DecorationId {
        self.id
    }

    fn process_callbacks(
        &self,
        mut link: Link<'_, '_>,
        walk: &mut CallbackWalk<'_>,
    ) -> CoreResult<Flow> {
        let flow = link.forward_callbacks(walk)?;
        match flow {
            Flow::Answer { from, args } if from == self.owner => self.settle(link.tree(), args),
            flow => Ok(flow),
        }
    }
}

impl AnswerCapture {
    fn settle(&self, tree: &mut Tree, results: Vec<Value>) -> CoreResult<Flow> {
        let Some(record) = self.record.lock().take() else {
            // The record was already consumed and this capture resurrected by
            // backtracking. Let the answer keep unwinding; the boundary
            // rejects it loudly.
            return Ok(Flow::Answer {
                from: self.owner,
                args: results,
            });
        };

        // Restore both chains before resuming, so the resume target sees the
        // tree exactly as it was before the call.
        tree.detach(record.caller, record.delegate)?;
        tree.detach(record.callee, record.capture)?;
        debug!(caller = %record.caller, callee = %record.callee, "answer consumed, chains restored");

        let Some(target) = record.resume else {
            // No resume target: the answer is discarded after cleanup.
            return Ok(Flow::Continue);
        };
        let mut args = record.extra;
        args.extend(results);
        let flow = invoke_resume(tree, record.caller, target, args)?;
        apply(tree, flow)
    }
}

/// Apply the effects of a requested call; pass every other flow through.
pub(crate) fn apply(tree: &mut Tree, flow: Flow) -> CoreResult<Flow> {
    match flow {
        Flow::Call(request) => begin_call(tree, request),
        flow => Ok(flow),
    }
}

/// Make a requested call effective: mount the callee if needed, delegate the
/// caller to it, and arm the answer capture. The returned [`Flow::Called`]
/// unwinds the walk; this is the only way a call "returns".
fn begin_call(tree: &mut Tree, request: CallRequest) -> CoreResult<Flow> {
    let CallRequest {
        caller,
        callee,
        resume,
        extra,
    } = request;
    let callee = match callee {
        Callee::Mounted(id) => {
            if !tree.contains(id) {
                return Err(CoreError::UnknownComponent(id));
            }
            id
        }
        Callee::Fresh(build) => build(tree)?,
    };

    let delegate_id = DecorationId::fresh();
    let capture_id = DecorationId::fresh();
    let record = OnAnswer {
        caller,
        callee,
        delegate: delegate_id,
        capture: capture_id,
        resume,
        extra,
    };
    tree.attach(
        caller,
        Arc::new(Delegate {
            id: delegate_id,
            target: callee,
        }),
    )?;
    tree.attach(
        callee,
        Arc::new(AnswerCapture {
            id: capture_id,
            owner: callee,
            record: Mutex::new(Some(record)),
        }),
    )?;
    debug!(%caller, %callee, "control transferred");
    Ok(Flow::Called { caller, callee })
}

fn invoke_resume(
    tree: &mut Tree,
    caller: ComponentId,
    target: ResumeTarget,
    args: Vec<Value>,
) -> CoreResult<Flow> {
    let mut node = tree.take(caller)?;
    let result = {
        let mut scope = Scope::new(tree, caller, &mut node.children);
        match target {
            ResumeTarget::Method(name) => node.behavior.resume(name, &mut scope, args),
            ResumeTarget::Handler(handler) => handler(node.behavior.as_mut(), &mut scope, args),
        }
    };
    tree.put_back(caller, node);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{CallbackRegistry, Request};
    use crate::component::tests_support::Inert;
    use crate::dispatch::process_callbacks;
    use crate::render::RenderCtx;
    use serde_json::json;

    /// Records what its calls were resumed with.
    struct Caller {
        resumed: Vec<Vec<Value>>,
    }

    impl Caller {
        fn new() -> Self {
            Self { resumed: Vec::new() }
        }
    }

    impl Component for Caller {
        fn render(&self, _ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
            Ok(())
        }

        fn resume(
            &mut self,
            method: &str,
            _scope: &mut Scope<'_>,
            args: Vec<Value>,
        ) -> CoreResult<Flow> {
            match method {
                "on_done" => {
                    self.resumed.push(args);
                    Ok(Flow::Continue)
                }
                other => Err(CoreError::ResumeTarget {
                    target: other.to_string(),
                    reason: "unknown resume method".to_string(),
                }),
            }
        }
    }

    fn run_action(
        tree: &mut Tree,
        root: ComponentId,
        owner: ComponentId,
        target: crate::callbacks::ActionFn,
    ) -> CoreResult<Flow> {
        let mut registry = CallbackRegistry::new();
        let token = registry.register_action(owner, target);
        let request = Request::new().with_trigger(token);
        let mut callbacks = registry.match_request(&request);
        process_callbacks(tree, root, &mut callbacks)
    }

    // The callee of a two-node call test: the one component that is not the
    // caller.
    fn callee_of(tree: &Tree, caller: ComponentId) -> ComponentId {
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.chain(caller).unwrap().len(), 1);
        *tree
            .all_ids_for_tests()
            .iter()
            .find(|id| **id != caller)
            .unwrap()
    }

    #[test]
    fn test_call_then_answer_resumes_with_extra_and_result_args() {
        let mut tree = Tree::new();
        let root = tree.mount(Caller::new());

        // Request 1: the caller's action calls a fresh callee.
        let flow = run_action(
            &mut tree,
            root,
            root,
            Box::new(|_, scope| {
                Ok(scope.call(
                    Inert,
                    ResumeTarget::method("on_done"),
                    vec![json!(42)],
                ))
            }),
        )
        .unwrap();
        assert!(flow.is_called());
        assert_eq!(tree.chain(root).unwrap().len(), 1);

        let callee = callee_of(&tree, root);
        assert_eq!(tree.chain(callee).unwrap().len(), 1);

        // Request 2: the callee answers; processing routes through the
        // caller's delegate to reach it.
        let flow = run_action(
            &mut tree,
            root,
            callee,
            Box::new(|_, scope| Ok(scope.answer(vec![json!(7)]))),
        )
        .unwrap();
        assert!(flow.is_continue());

        let caller = tree.get::<Caller>(root).unwrap();
        assert_eq!(caller.resumed, vec![vec![json!(42), json!(7)]]);

        // Both chains are exactly as they were before the call.
        assert!(tree.chain(root).unwrap().is_trivial());
        assert!(tree.chain(callee).unwrap().is_trivial());
    }

    #[test]
    fn test_answer_without_pending_call_fails_loudly() {
        let mut tree = Tree::new();
        let root = tree.mount(Caller::new());

        let err = run_action(
            &mut tree,
            root,
            root,
            Box::new(|_, scope| Ok(scope.answer(vec![json!("orphan")]))),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::AnswerWithoutCall { .. }));
    }

    #[test]
    fn test_unknown_resume_method_fails_at_invocation() {
        let mut tree = Tree::new();
        let root = tree.mount(Caller::new());

        run_action(
            &mut tree,
            root,
            root,
            Box::new(|_, scope| {
                Ok(scope.call(Inert, ResumeTarget::method("no_such_method"), vec![]))
            }),
        )
        .unwrap();
        let callee = callee_of(&tree, root);

        let err = run_action(
            &mut tree,
            root,
            callee,
            Box::new(|_, scope| Ok(scope.answer(vec![]))),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ResumeTarget { .. }));
    }

    #[test]
    fn test_resume_handler_receives_payload_once() {
        let mut tree = Tree::new();
        let root = tree.mount(Caller::new());

        run_action(
            &mut tree,
            root,
            root,
            Box::new(|_, scope| {
                Ok(scope.call(
                    Inert,
                    ResumeTarget::handler(|me: &mut Caller, _scope, args| {
                        me.resumed.push(args);
                        Ok(Flow::Continue)
                    }),
                    vec![json!("extra")],
                ))
            }),
        )
        .unwrap();
        let callee = callee_of(&mut tree, root);

        run_action(
            &mut tree,
            root,
            callee,
            Box::new(|_, scope| Ok(scope.answer(vec![json!("result")]))),
        )
        .unwrap();

        let caller = tree.get::<Caller>(root).unwrap();
        assert_eq!(caller.resumed, vec![vec![json!("extra"), json!("result")]]);
    }

    #[test]
    fn test_stacked_calls_unwind_in_order() {
        let mut tree = Tree::new();
        let root = tree.mount(Caller::new());

        // root calls B.
        run_action(
            &mut tree,
            root,
            root,
            Box::new(|_, scope| {
                Ok(scope.call(Caller::new(), ResumeTarget::method("on_done"), vec![json!("a")]))
            }),
        )
        .unwrap();
        let b = *tree
            .all_ids_for_tests()
            .iter()
            .find(|id| **id != root)
            .unwrap();

        // B calls C; B's chain now stacks the delegate ahead of its capture.
        run_action(
            &mut tree,
            root,
            b,
            Box::new(|_, scope| {
                Ok(scope.call(Caller::new(), ResumeTarget::method("on_done"), vec![json!("b")]))
            }),
        )
        .unwrap();
        assert_eq!(tree.chain(b).unwrap().len(), 2);
        let c = *tree
            .all_ids_for_tests()
            .iter()
            .find(|id| **id != root && **id != b)
            .unwrap();

        // C answers: B resumes, C's capture gone, B's own capture intact.
        run_action(
            &mut tree,
            root,
            c,
            Box::new(|_, scope| Ok(scope.answer(vec![json!(1)]))),
        )
        .unwrap();
        assert_eq!(
            tree.get::<Caller>(b).unwrap().resumed,
            vec![vec![json!("b"), json!(1)]]
        );
        assert_eq!(tree.chain(b).unwrap().len(), 1);
        assert!(tree.chain(c).unwrap().is_trivial());

        // B answers: root resumes, every chain back to trivial.
        run_action(
            &mut tree,
            root,
            b,
            Box::new(|_, scope| Ok(scope.answer(vec![json!(2)]))),
        )
        .unwrap();
        assert_eq!(
            tree.get::<Caller>(root).unwrap().resumed,
            vec![vec![json!("a"), json!(2)]]
        );
        assert!(tree.chain(root).unwrap().is_trivial());
        assert!(tree.chain(b).unwrap().is_trivial());
    }

    #[test]
    fn test_call_aborts_remaining_traversal() {
        let mut tree = Tree::new();
        let root = tree.mount(Inert);
        let first = tree.add_child(root, Caller::new()).unwrap();
        let second = tree.add_child(root, Inert).unwrap();

        let mut registry = CallbackRegistry::new();
        let call_action = registry.register_action(
            first,
            Box::new(|_, scope: &mut Scope<'_>| Ok(scope.call(Inert, None, vec![]))),
        );
        let fired = Arc::new(Mutex::new(false));
        let fired_probe = fired.clone();
        let second_value = registry.register_value(
            second,
            Box::new(move |_, _, _| {
                *fired_probe.lock() = true;
                Ok(Flow::Continue)
            }),
        );

        let request = Request::new()
            .with_trigger(call_action)
            .with_submit(second_value, json!(null));
        let mut callbacks = registry.match_request(&request);
        let flow = process_callbacks(&mut tree, root, &mut callbacks).unwrap();

        assert!(flow.is_called());
        // The sibling after the caller was never reached.
        assert!(!*fired.lock());
    }
}
