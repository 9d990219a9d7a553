//! MCP tool implementations.
//!
//! This module contains all tools exposed by the boothmark server.

pub mod catalog;
pub mod commands;
pub mod session;
pub mod sort;

pub use catalog::{ViewParams, catalog_impl, favorites_impl};
pub use commands::{ItemParams, command_impl};
pub use session::sign_out_impl;
pub use sort::toggle_sort_impl;
