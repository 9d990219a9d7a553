//! Remote store client for boothmark.
//!
//! This crate provides the PostgREST-backed implementation of the core
//! `Remote` and `SignOut` capabilities used by the server.

pub mod postgrest;

pub use postgrest::{PostgrestClient, PostgrestConfig, PostgrestError};
