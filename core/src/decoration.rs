use crate::component::ComponentId;
use crate::dispatch::{self, CallbackWalk};
use crate::error::CoreResult;
use crate::flow::Flow;
use crate::render::{self, RenderWalk};
use crate::state::{self, BacktrackWalk};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecorationId(Uuid);

impl DecorationId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DecorationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A wrapper around a component (or another decoration).
///
/// Every chain node exposes the same three operations as a component and, by
/// default, forwards each to its wrapped node unmodified through the [`Link`]
/// cursor. A concrete decoration overrides exactly the operations relevant to
/// its purpose; everything else keeps forwarding.
pub trait Decoration: Send + Sync {
    fn id(&self) -> DecorationId;

    fn process_callbacks(
        &self,
        mut link: Link<'_, '_>,
        walk: &mut CallbackWalk<'_>,
    ) -> CoreResult<Flow> {
        link.forward_callbacks(walk)
    }

    fn render(&self, mut link: Link<'_, '_>, walk: &mut RenderWalk<'_>) -> CoreResult<()> {
        link.forward_render(walk)
    }

    fn backtrack_state(
        &self,
        mut link: Link<'_, '_>,
        walk: &mut BacktrackWalk<'_>,
    ) -> CoreResult<()> {
        link.forward_backtrack(walk)
    }
}

/// The decoration chain of one component, head first.
///
/// The component itself is the implicit tail: an empty chain means the
/// component is its own trivial decoration. The wraps relation is strictly
/// one-directional; insertion always prepends, so the chain stays acyclic.
#[derive(Clone, Default)]
pub struct Chain {
    nodes: Vec<Arc<dyn Decoration>>,
}

impl Chain {
    /// True when the component is its own decoration.
    pub fn is_trivial(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Head-first decoration ids, for assertions and diagnostics.
    pub fn ids(&self) -> Vec<DecorationId> {
        self.nodes.iter().map(|d| d.id()).collect()
    }

    pub(crate) fn as_slice(&self) -> &[Arc<dyn Decoration>] {
        &self.nodes
    }

    /// Prepend: the decoration becomes the new head, wrapping the old one.
    pub(crate) fn attach(&mut self, decoration: Arc<dyn Decoration>) {
        self.nodes.insert(0, decoration);
    }

    /// Splice a specific decoration out of the chain, preserving the relative
    /// order of the others. Works regardless of decorations attached after it.
    pub(crate) fn detach(&mut self, id: DecorationId) -> Option<Arc<dyn Decoration>> {
        let at = self.nodes.iter().position(|d| d.id() == id)?;
        Some(self.nodes.remove(at))
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// Traversal cursor handed to a decoration: the rest of the chain plus the
/// tree, so the decoration can forward to its wrapped node or redirect
/// elsewhere.
pub struct Link<'t, 'c> {
    tree: &'t mut Tree,
    owner: ComponentId,
    chain: &'c [Arc<dyn Decoration>],
    next: usize,
}

impl<'t, 'c> Link<'t, 'c> {
    pub(crate) fn new(
        tree: &'t mut Tree,
        owner: ComponentId,
        chain: &'c [Arc<dyn Decoration>],
        next: usize,
    ) -> Self {
        Self {
            tree,
            owner,
            chain,
            next,
        }
    }

    /// The component this chain belongs to.
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    pub fn tree(&mut self) -> &mut Tree {
        self.tree
    }

    pub fn forward_callbacks(&mut self, walk: &mut CallbackWalk<'_>) -> CoreResult<Flow> {
        dispatch::step(self.tree, self.owner, self.chain, self.next, walk)
    }

    pub fn forward_render(&mut self, walk: &mut RenderWalk<'_>) -> CoreResult<()> {
        render::step(self.tree, self.owner, self.chain, self.next, walk)
    }

    pub fn forward_backtrack(&mut self, walk: &mut BacktrackWalk<'_>) -> CoreResult<()> {
        state::step(self.tree, self.owner, self.chain, self.next, walk)
    }
}
