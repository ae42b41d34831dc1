use crate::config::SessionConfig;
use crate::history::{GenerationId, History};
use arbor_core::{
    CallbackRegistry, Component, ComponentId, CoreError, CoreResult, Flow, Request, StateLog,
    Tree, backtrack_state, process_callbacks, render,
};
use std::mem;
use thiserror::Error;
use tracing::{debug, info_span};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unknown generation {0}")]
    UnknownGeneration(GenerationId),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// One request as the session sees it: an optional backtracking target plus
/// the submitted form payload.
#[derive(Default)]
pub struct SessionRequest {
    pub rewind_to: Option<GenerationId>,
    pub form: Request,
}

impl SessionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rewind(mut self, generation: GenerationId) -> Self {
        self.rewind_to = Some(generation);
        self
    }
}

impl From<Request> for SessionRequest {
    fn from(form: Request) -> Self {
        Self {
            rewind_to: None,
            form,
        }
    }
}

/// The response of one processed request: the rendered body and the
/// generation id to embed so a later request can backtrack here.
#[derive(Debug)]
pub struct Response {
    pub body: String,
    pub generation: GenerationId,
}

/// One user's component tree and its snapshot history.
///
/// A session processes one request start-to-finish before the next; nothing
/// in it is shared between sessions. It is `Send` so the embedding server
/// can migrate it between worker threads between requests.
pub struct Session {
    id: Uuid,
    tree: Tree,
    root: ComponentId,
    registry: CallbackRegistry,
    history: History,
}

impl Session {
    pub fn new(config: &SessionConfig, root: impl Component) -> Self {
        let mut tree = Tree::new();
        let root = tree.mount(root);
        Self {
            id: Uuid::new_v4(),
            tree,
            root,
            registry: CallbackRegistry::new(),
            history: History::new(config.history_limit),
        }
    }

    /// Build the root and its subtree against the tree, for roots with
    /// children.
    pub fn build(
        config: &SessionConfig,
        build: impl FnOnce(&mut Tree) -> CoreResult<ComponentId>,
    ) -> Result<Self, SessionError> {
        let mut tree = Tree::new();
        let root = build(&mut tree)?;
        Ok(Self {
            id: Uuid::new_v4(),
            tree,
            root,
            registry: CallbackRegistry::new(),
            history: History::new(config.history_limit),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> ComponentId {
        self.root
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn latest_generation(&self) -> Option<GenerationId> {
        self.history.latest()
    }

    /// Process one request: rewind if asked, fire the matched callbacks,
    /// capture a snapshot generation, render the next page.
    pub fn handle(&mut self, request: SessionRequest) -> Result<Response, SessionError> {
        let span = info_span!("request", session = %self.id);
        let _guard = span.enter();

        if let Some(target) = request.rewind_to {
            self.history.rewind(&mut self.tree, target)?;
            // Re-rendering the restored tree rebuilds the bindings the
            // rewound page handed out; token allocation is a deterministic
            // per-render counter, so the old page's tokens match again.
            let mut registry = CallbackRegistry::new();
            render(&mut self.tree, self.root, &mut registry)?;
            self.registry = registry;
        }

        let registry = mem::take(&mut self.registry);
        let mut callbacks = registry.match_request(&request.form);
        debug!(
            values = callbacks.value_count(),
            actions = callbacks.action_count(),
            "callbacks matched"
        );

        let flow = process_callbacks(&mut self.tree, self.root, &mut callbacks)?;
        if let Flow::Called { caller, callee } = &flow {
            debug!(%caller, %callee, "request finalized by call");
        }

        // Snapshot before rendering: the generation captures the state the
        // page below was rendered from.
        let mut log = StateLog::new();
        backtrack_state(&mut self.tree, self.root, &mut log)?;
        let generation = self.history.record(log);

        let mut registry = CallbackRegistry::new();
        let body = render(&mut self.tree, self.root, &mut registry)?;
        self.registry = registry;

        Ok(Response { body, generation })
    }
}
