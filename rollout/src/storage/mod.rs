//! Local and remote storage layouts

pub mod layout;

pub use layout::{LocalLayout, RemoteLayout};
