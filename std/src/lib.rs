pub mod components;

pub use components::{Confirm, Prompt};
