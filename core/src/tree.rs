use crate::component::{Component, ComponentId};
use crate::decoration::{Chain, Decoration, DecorationId};
use crate::error::{CoreError, CoreResult};
use crate::state::{self, Entry};
use ahash::AHashMap;
use std::any::type_name;
use std::sync::Arc;

pub(crate) struct Node {
    pub(crate) chain: Chain,
    pub(crate) behavior: Box<dyn Component>,
    pub(crate) children: Vec<ComponentId>,
}

/// The arena owning every component of one session.
///
/// A node holds its decoration chain, its boxed behavior and its ordered
/// child ids; traversals always go through a child's current chain, never to
/// the child directly. The tree is exclusively owned by one session and is
/// only ever walked by one request at a time.
#[derive(Default)]
pub struct Tree {
    nodes: AHashMap<ComponentId, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a component into the arena, undecorated and childless.
    pub fn mount(&mut self, component: impl Component) -> ComponentId {
        self.mount_boxed(Box::new(component))
    }

    pub fn mount_boxed(&mut self, behavior: Box<dyn Component>) -> ComponentId {
        let id = ComponentId::fresh();
        self.nodes.insert(
            id,
            Node {
                chain: Chain::default(),
                behavior,
                children: Vec::new(),
            },
        );
        id
    }

    /// Mount `child` and append it to `parent`'s ordered child list.
    pub fn add_child(
        &mut self,
        parent: ComponentId,
        child: impl Component,
    ) -> CoreResult<ComponentId> {
        let id = self.mount(child);
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: ComponentId) -> CoreResult<&[ComponentId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn chain(&self, id: ComponentId) -> CoreResult<&Chain> {
        Ok(&self.node(id)?.chain)
    }

    /// Typed access to a mounted component's behavior.
    pub fn get<C: Component>(&self, id: ComponentId) -> CoreResult<&C> {
        self.node(id)?
            .behavior
            .downcast_ref::<C>()
            .ok_or(CoreError::TargetMismatch {
                expected: type_name::<C>(),
            })
    }

    pub fn get_mut<C: Component>(&mut self, id: ComponentId) -> CoreResult<&mut C> {
        self.node_mut(id)?
            .behavior
            .downcast_mut::<C>()
            .ok_or(CoreError::TargetMismatch {
                expected: type_name::<C>(),
            })
    }

    /// Prepend a decoration to `id`'s chain; it becomes the new head.
    pub fn attach(
        &mut self,
        id: ComponentId,
        decoration: Arc<dyn Decoration>,
    ) -> CoreResult<DecorationId> {
        let decoration_id = decoration.id();
        self.node_mut(id)?.chain.attach(decoration);
        Ok(decoration_id)
    }

    /// Splice a decoration out of `id`'s chain, wherever it sits.
    pub fn detach(
        &mut self,
        id: ComponentId,
        decoration: DecorationId,
    ) -> CoreResult<Arc<dyn Decoration>> {
        self.node_mut(id)?
            .chain
            .detach(decoration)
            .ok_or(CoreError::UnknownDecoration {
                component: id,
                decoration,
            })
    }

    /// Apply one snapshot entry. The tree-owned fields (decoration chain,
    /// child list) are restored here; everything else is handed to the
    /// owning component.
    pub(crate) fn restore(&mut self, entry: &Entry) -> CoreResult<()> {
        let node = self.node_mut(entry.owner())?;
        match entry.field() {
            state::DECORATIONS => {
                let chain =
                    entry
                        .value()
                        .downcast_ref::<Chain>()
                        .ok_or_else(|| CoreError::Restore {
                            field: state::DECORATIONS.to_string(),
                            reason: "entry does not hold a decoration chain".to_string(),
                        })?;
                node.chain = chain.clone();
            }
            state::CHILDREN => {
                let children = entry
                    .value()
                    .downcast_ref::<Vec<ComponentId>>()
                    .ok_or_else(|| CoreError::Restore {
                        field: state::CHILDREN.to_string(),
                        reason: "entry does not hold a child list".to_string(),
                    })?;
                node.children = children.clone();
            }
            field => node.behavior.restore_state(field, entry.value())?,
        }
        Ok(())
    }

    /// Check a node out of the arena for the duration of one visit. The
    /// traversals use this so a component's behavior can be borrowed mutably
    /// while the rest of the tree stays reachable.
    pub(crate) fn take(&mut self, id: ComponentId) -> CoreResult<Node> {
        self.nodes.remove(&id).ok_or(CoreError::UnknownComponent(id))
    }

    pub(crate) fn put_back(&mut self, id: ComponentId, node: Node) {
        self.nodes.insert(id, node);
    }

    #[cfg(test)]
    pub(crate) fn all_ids_for_tests(&self) -> Vec<ComponentId> {
        self.nodes.keys().copied().collect()
    }

    fn node(&self, id: ComponentId) -> CoreResult<&Node> {
        self.nodes.get(&id).ok_or(CoreError::UnknownComponent(id))
    }

    fn node_mut(&mut self, id: ComponentId) -> CoreResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(CoreError::UnknownComponent(id))
    }
}
