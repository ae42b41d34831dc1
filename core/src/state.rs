use crate::component::ComponentId;
use crate::decoration::{Decoration, Link};
use crate::error::{CoreError, CoreResult};
use crate::tree::Tree;
use ahash::AHashSet;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span};

/// Field identifier of the decoration chain entry the capture walk records
/// for every visited node.
pub const DECORATIONS: &str = "arbor.decorations";

/// Field identifier of the child list entry recorded by
/// [`BacktrackScope::save_children`].
pub const CHILDREN: &str = "arbor.children";

/// A value captured for later restoration: type-erased, cloneable, owned by
/// the log. Blanket-implemented for every `Any + Send + Clone` type.
pub trait Saved: Any + Send {
    fn clone_saved(&self) -> Box<dyn Saved>;
}

impl<T: Any + Send + Clone> Saved for T {
    fn clone_saved(&self) -> Box<dyn Saved> {
        Box::new(self.clone())
    }
}

impl dyn Saved {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }
}

/// Downcast helper for [`Component::restore_state`] implementations.
///
/// [`Component::restore_state`]: crate::Component::restore_state
pub fn restore_as<T: Any + Clone>(field: &str, value: &dyn Saved) -> CoreResult<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| CoreError::Restore {
            field: field.to_string(),
            reason: format!("entry does not hold a {}", type_name::<T>()),
        })
}

/// One (owner, field identifier, value at capture time) triple. Entries are
/// never mutated after being recorded, only replayed or discarded.
pub struct Entry {
    owner: ComponentId,
    field: &'static str,
    value: Box<dyn Saved>,
}

impl Entry {
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn value(&self) -> &dyn Saved {
        self.value.as_ref()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .finish()
    }
}

/// The append-only snapshot log of one capture pass, ordered by traversal
/// order. Replaying the entries in reverse restores every recorded field to
/// its captured value.
#[derive(Default)]
pub struct StateLog {
    entries: Vec<Entry>,
}

impl StateLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save<T: Any + Send + Clone>(
        &mut self,
        owner: ComponentId,
        field: &'static str,
        value: T,
    ) {
        self.entries.push(Entry {
            owner,
            field,
            value: Box::new(value),
        });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every entry in reverse capture order. When several logs are
    /// replayed newest-to-oldest, the oldest application wins for every
    /// field, reproducing the state at that capture point.
    pub fn replay(&self, tree: &mut Tree) -> CoreResult<()> {
        for entry in self.entries.iter().rev() {
            tree.restore(entry)?;
        }
        Ok(())
    }
}

/// Handed to a component during the capture pass so it can contribute its
/// opt-in fields.
pub struct BacktrackScope<'a> {
    owner: ComponentId,
    children: &'a [ComponentId],
    log: &'a mut StateLog,
}

impl BacktrackScope<'_> {
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    pub fn save<T: Any + Send + Clone>(&mut self, field: &'static str, value: T) {
        self.log.save(self.owner, field, value);
    }

    /// Opt the dynamic child list into backtracking. Components that never
    /// mutate their children after construction need not.
    pub fn save_children(&mut self) {
        self.log.save(self.owner, CHILDREN, self.children.to_vec());
    }
}

pub struct BacktrackWalk<'a> {
    pub(crate) log: &'a mut StateLog,
    pub(crate) visiting: AHashSet<ComponentId>,
}

/// Walk the tree from `root`'s current decoration chain and append one
/// snapshot entry per registered field, mirroring the callback traversal so
/// decorations attached during the request also get to record state.
pub fn backtrack_state(tree: &mut Tree, root: ComponentId, log: &mut StateLog) -> CoreResult<()> {
    let span = debug_span!("backtrack_state", component = %root);
    let _guard = span.enter();
    let before = log.len();
    {
        let mut walk = BacktrackWalk {
            log: &mut *log,
            visiting: AHashSet::default(),
        };
        capture_node(tree, root, &mut walk)?;
    }
    debug!(entries = log.len() - before, "state captured");
    Ok(())
}

/// Capture into a fresh log.
pub fn capture(tree: &mut Tree, root: ComponentId) -> CoreResult<StateLog> {
    let mut log = StateLog::new();
    backtrack_state(tree, root, &mut log)?;
    Ok(log)
}

pub(crate) fn capture_node(
    tree: &mut Tree,
    id: ComponentId,
    walk: &mut BacktrackWalk<'_>,
) -> CoreResult<()> {
    if !walk.visiting.insert(id) {
        return Err(CoreError::ReentrantVisit(id));
    }
    let chain = tree.chain(id)?.clone();
    // The chain itself is always recorded: undoing a call must restore the
    // pre-call chain even when that chain was trivial.
    walk.log.save(id, DECORATIONS, chain.clone());
    let result = step(tree, id, chain.as_slice(), 0, walk);
    walk.visiting.remove(&id);
    result
}

pub(crate) fn step(
    tree: &mut Tree,
    owner: ComponentId,
    chain: &[Arc<dyn Decoration>],
    at: usize,
    walk: &mut BacktrackWalk<'_>,
) -> CoreResult<()> {
    match chain.get(at) {
        Some(decoration) => {
            decoration.backtrack_state(Link::new(tree, owner, chain, at + 1), walk)
        }
        None => capture_component(tree, owner, walk),
    }
}

fn capture_component(
    tree: &mut Tree,
    id: ComponentId,
    walk: &mut BacktrackWalk<'_>,
) -> CoreResult<()> {
    let node = tree.take(id)?;
    {
        let mut scope = BacktrackScope {
            owner: id,
            children: &node.children,
            log: &mut *walk.log,
        };
        node.behavior.backtrack_state(&mut scope);
    }
    let result = (|| {
        for child in node.children.clone() {
            capture_node(tree, child, walk)?;
        }
        Ok(())
    })();
    tree.put_back(id, node);
    result
}
