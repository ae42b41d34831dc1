use crate::component::{Component, ComponentId};
use crate::dispatch::Scope;
use crate::error::{CoreError, CoreResult};
use crate::flow::Flow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Submitted values and answer payloads are dynamic JSON values.
pub type Value = serde_json::Value;

/// A value callback delivers a submitted value to its owning component.
pub type ValueFn =
    Box<dyn FnMut(&mut dyn Component, &mut Scope<'_>, &Value) -> CoreResult<Flow> + Send>;

/// An action callback represents a state-changing user action; at most one
/// fires per request, tree-wide.
pub type ActionFn = Box<dyn FnMut(&mut dyn Component, &mut Scope<'_>) -> CoreResult<Flow> + Send>;

/// Identifier assigned to one callback binding at render time, unique within
/// one rendered request. Allocation is a plain per-render counter, so a
/// deterministic render hands out the same tokens again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb{}", self.0)
    }
}

impl FromStr for Token {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("cb")
            .and_then(|n| n.parse::<u64>().ok())
            .map(Token)
            .ok_or_else(|| CoreError::MalformedToken(s.to_string()))
    }
}

/// Bindings handed out during one render, waiting for the next request.
#[derive(Default)]
pub struct CallbackRegistry {
    next: u64,
    values: Vec<(ComponentId, Token, ValueFn)>,
    actions: Vec<(ComponentId, Token, ActionFn)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_token(&mut self) -> Token {
        let token = Token(self.next);
        self.next += 1;
        token
    }

    pub fn register_value(&mut self, owner: ComponentId, target: ValueFn) -> Token {
        let token = self.fresh_token();
        self.values.push((owner, token, target));
        token
    }

    pub fn register_action(&mut self, owner: ComponentId, target: ActionFn) -> Token {
        let token = self.fresh_token();
        self.actions.push((owner, token, target));
        token
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.actions.is_empty()
    }

    /// Filter the registered bindings down to the ones the request actually
    /// submitted, in stable registration order. Consumes the registry: a
    /// binding can only ever fire for the render that produced it.
    pub fn match_request(self, request: &Request) -> Callbacks {
        let values = self
            .values
            .into_iter()
            .filter_map(|(owner, token, target)| {
                request.submitted(token).map(|value| ValueBinding {
                    owner,
                    value: value.clone(),
                    target: Some(target),
                })
            })
            .collect();
        let actions = self
            .actions
            .into_iter()
            .filter(|(_, token, _)| request.triggered(*token))
            .map(|(owner, _, target)| ActionBinding {
                owner,
                target: Some(target),
            })
            .collect();
        Callbacks { values, actions }
    }
}

/// The submitted payload of one request: (token, value) pairs for form
/// fields plus the set of triggered action tokens. How these were carried on
/// the wire is the embedding server's business.
#[derive(Default)]
pub struct Request {
    submitted: Vec<(Token, Value)>,
    triggers: Vec<Token>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, token: Token, value: Value) {
        self.submitted.push((token, value));
    }

    pub fn trigger(&mut self, token: Token) {
        self.triggers.push(token);
    }

    pub fn with_submit(mut self, token: Token, value: Value) -> Self {
        self.submit(token, value);
        self
    }

    pub fn with_trigger(mut self, token: Token) -> Self {
        self.trigger(token);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty() && self.triggers.is_empty()
    }

    fn submitted(&self, token: Token) -> Option<&Value> {
        self.submitted
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, value)| value)
    }

    fn triggered(&self, token: Token) -> bool {
        self.triggers.contains(&token)
    }
}

struct ValueBinding {
    owner: ComponentId,
    value: Value,
    target: Option<ValueFn>,
}

struct ActionBinding {
    owner: ComponentId,
    target: Option<ActionFn>,
}

/// The callbacks source consumed by the dispatch walk: only bindings whose
/// identifier was actually submitted, in stable order, each taken at most
/// once (single-shot even if a delegation loop revisits a component).
pub struct Callbacks {
    values: Vec<ValueBinding>,
    actions: Vec<ActionBinding>,
}

impl Callbacks {
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub(crate) fn take_values_for(&mut self, owner: ComponentId) -> Vec<(Value, ValueFn)> {
        self.values
            .iter_mut()
            .filter(|binding| binding.owner == owner)
            .filter_map(|binding| binding.target.take().map(|t| (binding.value.clone(), t)))
            .collect()
    }

    pub(crate) fn take_action_for(&mut self, owner: ComponentId) -> Option<ActionFn> {
        self.actions
            .iter_mut()
            .filter(|binding| binding.owner == owner)
            .find_map(|binding| binding.target.take())
    }
}
