use crate::callbacks::{CallbackRegistry, Token, Value};
use crate::component::{Component, ComponentId};
use crate::decoration::{Decoration, Link};
use crate::dispatch::Scope;
use crate::error::{CoreError, CoreResult};
use crate::flow::Flow;
use crate::tree::Tree;
use ahash::AHashSet;
use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use tracing::debug_span;

/// Per-request state of one render walk: the registry collecting this
/// render's bindings and the output buffer.
pub struct RenderWalk<'w> {
    pub(crate) registry: &'w mut CallbackRegistry,
    pub(crate) out: String,
    pub(crate) visiting: AHashSet<ComponentId>,
}

/// What a component renders with: an output sink, callback registration
/// returning the tokens to interpolate into the markup, and child rendering
/// that follows each child's current decoration chain.
///
/// Markup generation itself is not this crate's business; components write
/// whatever text their rendering back-end expects.
pub struct RenderCtx<'a, 'w> {
    tree: &'a mut Tree,
    walk: &'a mut RenderWalk<'w>,
    owner: ComponentId,
    children: &'a [ComponentId],
}

impl RenderCtx<'_, '_> {
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    /// The rendering component's current child ids, in declared order.
    pub fn children(&self) -> &[ComponentId] {
        self.children
    }

    pub fn write(&mut self, markup: &str) {
        self.walk.out.push_str(markup);
    }

    /// Bind a value callback for this render; the returned token routes a
    /// submitted value back to the target on the next request.
    pub fn value<C, F>(&mut self, mut target: F) -> Token
    where
        C: Component,
        F: FnMut(&mut C, &mut Scope<'_>, &Value) -> CoreResult<Flow> + Send + 'static,
    {
        let expected = type_name::<C>();
        self.walk.registry.register_value(
            self.owner,
            Box::new(move |component, scope, value| {
                let component = component
                    .downcast_mut::<C>()
                    .ok_or(CoreError::TargetMismatch { expected })?;
                target(component, scope, value)
            }),
        )
    }

    /// Bind an action callback for this render.
    pub fn action<C, F>(&mut self, mut target: F) -> Token
    where
        C: Component,
        F: FnMut(&mut C, &mut Scope<'_>) -> CoreResult<Flow> + Send + 'static,
    {
        let expected = type_name::<C>();
        self.walk.registry.register_action(
            self.owner,
            Box::new(move |component, scope| {
                let component = component
                    .downcast_mut::<C>()
                    .ok_or(CoreError::TargetMismatch { expected })?;
                target(component, scope)
            }),
        )
    }

    /// Render a child where the parent's markup wants it, going through the
    /// child's current decoration chain.
    pub fn render_child(&mut self, child: ComponentId) -> CoreResult<()> {
        render_node(self.tree, child, self.walk)
    }
}

impl fmt::Write for RenderCtx<'_, '_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.walk.out.push_str(s);
        Ok(())
    }
}

/// Render the tree from `root`'s current decoration chain, registering this
/// render's callback bindings into `registry` and returning the body.
pub fn render(
    tree: &mut Tree,
    root: ComponentId,
    registry: &mut CallbackRegistry,
) -> CoreResult<String> {
    let span = debug_span!("render", component = %root);
    let _guard = span.enter();
    let mut walk = RenderWalk {
        registry,
        out: String::new(),
        visiting: AHashSet::default(),
    };
    render_node(tree, root, &mut walk)?;
    Ok(walk.out)
}

pub(crate) fn render_node(
    tree: &mut Tree,
    id: ComponentId,
    walk: &mut RenderWalk<'_>,
) -> CoreResult<()> {
    if !walk.visiting.insert(id) {
        return Err(CoreError::ReentrantVisit(id));
    }
    let chain = tree.chain(id)?.clone();
    let result = step(tree, id, chain.as_slice(), 0, walk);
    walk.visiting.remove(&id);
    result
}

pub(crate) fn step(
    tree: &mut Tree,
    owner: ComponentId,
    chain: &[Arc<dyn Decoration>],
    at: usize,
    walk: &mut RenderWalk<'_>,
) -> CoreResult<()> {
    match chain.get(at) {
        Some(decoration) => decoration.render(Link::new(tree, owner, chain, at + 1), walk),
        None => render_component(tree, owner, walk),
    }
}

fn render_component(
    tree: &mut Tree,
    id: ComponentId,
    walk: &mut RenderWalk<'_>,
) -> CoreResult<()> {
    let node = tree.take(id)?;
    let result = {
        let mut ctx = RenderCtx {
            tree,
            walk,
            owner: id,
            children: &node.children,
        };
        node.behavior.render(&mut ctx)
    };
    tree.put_back(id, node);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    struct Parent;

    impl Component for Parent {
        fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
            let submit = ctx.action(|_me: &mut Parent, _scope: &mut Scope<'_>| Ok(Flow::Continue));
            write!(ctx, "<form action=\"?{submit}\">")?;
            for child in ctx.children().to_vec() {
                ctx.render_child(child)?;
            }
            ctx.write("</form>");
            Ok(())
        }
    }

    struct Field {
        label: &'static str,
    }

    impl Component for Field {
        fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
            let token =
                ctx.value(|_me: &mut Field, _scope: &mut Scope<'_>, _value: &Value| {
                    Ok(Flow::Continue)
                });
            write!(ctx, "<input name=\"{token}\" title=\"{}\"/>", self.label)?;
            Ok(())
        }
    }

    #[test]
    fn test_render_walks_children_and_hands_out_unique_tokens() {
        let mut tree = Tree::new();
        let root = tree.mount(Parent);
        tree.add_child(root, Field { label: "a" }).unwrap();
        tree.add_child(root, Field { label: "b" }).unwrap();

        let mut registry = CallbackRegistry::new();
        let body = render(&mut tree, root, &mut registry).unwrap();

        assert_eq!(
            body,
            "<form action=\"?cb0\">\
             <input name=\"cb1\" title=\"a\"/>\
             <input name=\"cb2\" title=\"b\"/>\
             </form>"
        );
        assert_eq!(registry.len(), 3);
    }
}
