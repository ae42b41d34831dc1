use crate::callbacks::{Callbacks, Value};
use crate::component::{Component, ComponentId};
use crate::decoration::{Decoration, Link};
use crate::error::{CoreError, CoreResult};
use crate::flow::Flow;
use crate::transfer::{self, CallRequest, Callee, ResumeTarget};
use crate::tree::{Node, Tree};
use ahash::AHashSet;
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

/// Per-request state of one callback walk.
pub struct CallbackWalk<'a> {
    pub(crate) callbacks: &'a mut Callbacks,
    pub(crate) action_fired: bool,
    pub(crate) visiting: AHashSet<ComponentId>,
}

/// The handle a callback target (or resume method) runs with: its own id and
/// child list, plus the tree for mounting. Control transfers are built here
/// as [`Flow`] values and returned; the dispatcher applies their effects.
pub struct Scope<'a> {
    tree: &'a mut Tree,
    owner: ComponentId,
    children: &'a mut Vec<ComponentId>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        tree: &'a mut Tree,
        owner: ComponentId,
        children: &'a mut Vec<ComponentId>,
    ) -> Self {
        Self {
            tree,
            owner,
            children,
        }
    }

    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    pub fn children(&self) -> &[ComponentId] {
        self.children
    }

    /// Mount a component and append it to this component's children.
    /// Components that do this after construction should also opt their
    /// child list into backtracking via
    /// [`BacktrackScope::save_children`](crate::BacktrackScope::save_children).
    pub fn mount_child(&mut self, child: impl Component) -> ComponentId {
        let id = self.tree.mount(child);
        self.children.push(id);
        id
    }

    /// Drop a child from this component's child list. The component stays
    /// mounted: a rewound generation may still reach it.
    pub fn unmount_child(&mut self, child: ComponentId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| *c != child);
        self.children.len() != before
    }

    /// Transfer control to a freshly created component. The returned flow
    /// must be handed back to the dispatcher; the current request is then
    /// finalized with no further processing.
    pub fn call(
        &self,
        callee: impl Component,
        resume: impl Into<Option<ResumeTarget>>,
        extra: Vec<Value>,
    ) -> Flow {
        let behavior: Box<dyn Component> = Box::new(callee);
        self.call_with(move |tree| Ok(tree.mount_boxed(behavior)), resume, extra)
    }

    /// Transfer control to an already mounted component.
    pub fn call_mounted(
        &self,
        callee: ComponentId,
        resume: impl Into<Option<ResumeTarget>>,
        extra: Vec<Value>,
    ) -> Flow {
        Flow::Call(CallRequest::new(
            self.owner,
            Callee::Mounted(callee),
            resume.into(),
            extra,
        ))
    }

    /// Transfer control to a component built against the tree, for callees
    /// that need to mount a subtree of their own.
    pub fn call_with(
        &self,
        build: impl FnOnce(&mut Tree) -> CoreResult<ComponentId> + Send + 'static,
        resume: impl Into<Option<ResumeTarget>>,
        extra: Vec<Value>,
    ) -> Flow {
        Flow::Call(CallRequest::new(
            self.owner,
            Callee::Fresh(Box::new(build)),
            resume.into(),
            extra,
        ))
    }

    /// Answer the call this component was the target of. The flow unwinds to
    /// the answer capture installed at call time; it never returns control
    /// here.
    pub fn answer(&self, args: Vec<Value>) -> Flow {
        Flow::Answer {
            from: self.owner,
            args,
        }
    }
}

/// Walk the tree from `root`'s current decoration chain, firing the matched
/// callbacks in the fixed order: own value callbacks, children (through
/// their chains), own action callbacks.
///
/// At most one action callback fires per walk, tree-wide. A call aborts the
/// remainder of the walk with [`Flow::Called`]; an answer that nobody
/// consumed is a protocol error.
pub fn process_callbacks(
    tree: &mut Tree,
    root: ComponentId,
    callbacks: &mut Callbacks,
) -> CoreResult<Flow> {
    let span = debug_span!("process_callbacks", component = %root);
    let _guard = span.enter();
    let mut walk = CallbackWalk {
        callbacks,
        action_fired: false,
        visiting: AHashSet::default(),
    };
    match process_node(tree, root, &mut walk)? {
        Flow::Answer { from, .. } => Err(CoreError::AnswerWithoutCall { component: from }),
        flow => Ok(flow),
    }
}

/// Visit one component through its current decoration chain.
pub(crate) fn process_node(
    tree: &mut Tree,
    id: ComponentId,
    walk: &mut CallbackWalk<'_>,
) -> CoreResult<Flow> {
    if !walk.visiting.insert(id) {
        return Err(CoreError::ReentrantVisit(id));
    }
    let chain = tree.chain(id)?.clone();
    let result = step(tree, id, chain.as_slice(), 0, walk);
    walk.visiting.remove(&id);
    transfer::apply(tree, result?)
}

pub(crate) fn step(
    tree: &mut Tree,
    owner: ComponentId,
    chain: &[Arc<dyn Decoration>],
    at: usize,
    walk: &mut CallbackWalk<'_>,
) -> CoreResult<Flow> {
    match chain.get(at) {
        Some(decoration) => {
            decoration.process_callbacks(Link::new(tree, owner, chain, at + 1), walk)
        }
        // End of the chain: the component itself is the tail.
        None => process_component(tree, owner, walk),
    }
}

fn process_component(
    tree: &mut Tree,
    id: ComponentId,
    walk: &mut CallbackWalk<'_>,
) -> CoreResult<Flow> {
    let mut node = tree.take(id)?;
    let result = run_component(tree, id, &mut node, walk);
    tree.put_back(id, node);
    result
}

fn run_component(
    tree: &mut Tree,
    id: ComponentId,
    node: &mut Node,
    walk: &mut CallbackWalk<'_>,
) -> CoreResult<Flow> {
    // 1. Value callbacks this component bound at render time.
    for (value, mut target) in walk.callbacks.take_values_for(id) {
        trace!(component = %id, "value callback");
        let flow = {
            let mut scope = Scope::new(tree, id, &mut node.children);
            target(node.behavior.as_mut(), &mut scope, &value)?
        };
        if !flow.is_continue() {
            return Ok(flow);
        }
    }

    // 2. Every direct child, through the child's current chain.
    for child in node.children.clone() {
        let flow = process_node(tree, child, walk)?;
        if !flow.is_continue() {
            return Ok(flow);
        }
    }

    // 3. Own action callbacks, only while no action has fired anywhere.
    if !walk.action_fired
        && let Some(mut target) = walk.callbacks.take_action_for(id)
    {
        walk.action_fired = true;
        debug!(component = %id, "action callback");
        let mut scope = Scope::new(tree, id, &mut node.children);
        return target(node.behavior.as_mut(), &mut scope);
    }

    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{CallbackRegistry, Request};
    use crate::component::tests_support::Inert;
    use parking_lot::Mutex;
    use serde_json::json;

    fn spy(
        log: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    ) -> crate::callbacks::ActionFn {
        let log = log.clone();
        Box::new(move |_, _| {
            log.lock().push(label);
            Ok(Flow::Continue)
        })
    }

    fn value_spy(
        log: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    ) -> crate::callbacks::ValueFn {
        let log = log.clone();
        Box::new(move |_, _, _| {
            log.lock().push(label);
            Ok(Flow::Continue)
        })
    }

    #[test]
    fn test_values_before_children_before_own_actions() {
        let mut tree = Tree::new();
        let root = tree.mount(Inert);
        let first = tree.add_child(root, Inert).unwrap();
        let second = tree.add_child(root, Inert).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let root_value = registry.register_value(root, value_spy(&log, "root value"));
        let first_value = registry.register_value(first, value_spy(&log, "first value"));
        let second_value = registry.register_value(second, value_spy(&log, "second value"));
        let root_action = registry.register_action(root, spy(&log, "root action"));

        let request = Request::new()
            .with_submit(second_value, json!(2))
            .with_submit(root_value, json!(0))
            .with_submit(first_value, json!(1))
            .with_trigger(root_action);
        let mut callbacks = registry.match_request(&request);

        let flow = process_callbacks(&mut tree, root, &mut callbacks).unwrap();
        assert!(flow.is_continue());
        assert_eq!(
            *log.lock(),
            vec!["root value", "first value", "second value", "root action"]
        );
    }

    #[test]
    fn test_at_most_one_action_tree_wide() {
        let mut tree = Tree::new();
        let root = tree.mount(Inert);
        let child = tree.add_child(root, Inert).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let root_action = registry.register_action(root, spy(&log, "root action"));
        let child_action = registry.register_action(child, spy(&log, "child action"));

        let request = Request::new()
            .with_trigger(root_action)
            .with_trigger(child_action);
        let mut callbacks = registry.match_request(&request);

        process_callbacks(&mut tree, root, &mut callbacks).unwrap();
        // Children are processed before the parent's own actions, so the
        // child's action wins and the root's never fires.
        assert_eq!(*log.lock(), vec!["child action"]);
    }

    #[test]
    fn test_callback_error_aborts_walk() {
        let mut tree = Tree::new();
        let root = tree.mount(Inert);
        let child = tree.add_child(root, Inert).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let boom = registry.register_value(
            root,
            Box::new(|_, _, _| Err(anyhow::anyhow!("target failed").into())),
        );
        let child_value = registry.register_value(child, value_spy(&log, "child value"));

        let request = Request::new()
            .with_submit(boom, json!(null))
            .with_submit(child_value, json!(null));
        let mut callbacks = registry.match_request(&request);

        let err = process_callbacks(&mut tree, root, &mut callbacks).unwrap_err();
        assert!(matches!(err, CoreError::Other(_)));
        assert!(log.lock().is_empty());
        // The visited node was checked back in despite the error.
        assert!(tree.contains(root));
    }
}
