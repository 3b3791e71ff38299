//! Static file server for the cached Arc state snapshots.

pub mod server;

pub use server::{resolve_path, router};
