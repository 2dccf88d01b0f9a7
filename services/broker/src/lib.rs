//! yarnbroker service library.
//!
//! This crate primarily ships a `broker` binary, but we expose the library
//! surface so the orchestrator can be driven directly from integration tests.

pub mod api;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod operations;
pub mod state;
