//! Operation scripts
//!
//! Each operation becomes one shell script rendered from a Tera template
//! against a [`ScriptContext`]. Rendering is pure; nothing runs here.

pub mod context;
pub mod engine;
pub mod fragments;

pub use context::ScriptContext;
pub use engine::{ScriptEngine, ScriptName};
