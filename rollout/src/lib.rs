//! Rollout Library
//!
//! Builds an application, ships it to a fleet of servers over ssh, and
//! manages the releases on each server: activation, retention, rollback,
//! and one-off migration programs.

pub mod app;
pub mod build;
pub mod config;
pub mod errors;
pub mod filesys;
pub mod fleet;
pub mod logs;
pub mod migrate;
pub mod package;
pub mod release;
pub mod script;
pub mod session;
pub mod storage;
pub mod utils;
