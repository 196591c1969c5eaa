//! Render protocol: the rendering-surface interface served to an external
//! renderer process as newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Methods: `initialize`, `ping`, `view`, `poll`, `expand`, `collapse`,
//! `reveal`, `search`, `setFilter` and `export`, plus `sync` and `save` when
//! the server is attached to a [`crate::project::Project`]. Node and query
//! methods accept an optional `revision`; a mismatch is answered with a
//! stale-revision error rather than applied.

pub mod commands;
pub mod server;
pub mod types;

pub use server::Server;
