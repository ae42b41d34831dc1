// Re-export core modules
pub use arbor_core::callbacks;
pub use arbor_core::component;
pub use arbor_core::decoration;
pub use arbor_core::dispatch;
pub use arbor_core::error;
pub use arbor_core::flow;
pub use arbor_core::render;
pub use arbor_core::state;
pub use arbor_core::telemetry;
pub use arbor_core::transfer;
pub use arbor_core::tree;

// Re-export the session layer and the component library
pub use arbor_session::{config, history, session};
pub use arbor_std::components;

pub mod prelude {
    pub use crate::callbacks::{Request, Token, Value};
    pub use crate::component::{Component, ComponentId};
    pub use crate::components::{Confirm, Prompt};
    pub use crate::config::SessionConfig;
    pub use crate::dispatch::Scope;
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::flow::Flow;
    pub use crate::render::RenderCtx;
    pub use crate::session::{Response, Session, SessionError, SessionRequest};
    pub use crate::state::{BacktrackScope, Saved, restore_as};
    pub use crate::transfer::ResumeTarget;
    pub use crate::tree::Tree;

    // Re-export common third-party types users will need
    pub use serde_json::json;
}
