pub mod callbacks;
pub mod component;
pub mod decoration;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod render;
pub mod state;
pub mod telemetry;
pub mod transfer;
pub mod tree;

pub use callbacks::{ActionFn, CallbackRegistry, Callbacks, Request, Token, Value, ValueFn};
pub use component::{Component, ComponentId};
pub use decoration::{Chain, Decoration, DecorationId, Link};
pub use dispatch::{CallbackWalk, Scope, process_callbacks};
pub use error::{CoreError, CoreResult};
pub use flow::Flow;
pub use render::{RenderCtx, RenderWalk, render};
pub use state::{
    BacktrackScope, BacktrackWalk, Entry, Saved, StateLog, backtrack_state, capture, restore_as,
};
pub use transfer::{CallRequest, ResumeFn, ResumeTarget};
pub use tree::Tree;
