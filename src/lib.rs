//! Core engine for a browser-based coding workspace: a copy-on-write file
//! tree kept in lockstep with a durable snapshot store and an ephemeral
//! sandbox mirror, plus the open-buffer set, inline AI suggestions, and a
//! line-buffered terminal against the sandbox's process surface.

pub mod buffers;
pub mod config;
pub mod error;
pub mod sandbox;
pub mod store;
pub mod suggest;
pub mod term;
pub mod tree;
pub mod workspace;

pub use config::Config;
pub use error::{BootError, WorkspaceError};
