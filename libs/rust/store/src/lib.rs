//! Normalized in-memory shadow of DAOstack subgraph state.
//!
//! The chain and the subgraph are always authoritative. The [`Store`] only
//! folds what it observes through [`Action`]s so that it can be served as a
//! JSON snapshot and re-hydrated on the next cache pass.

pub mod actions;
pub mod errors;
pub mod models;
pub mod reducer;
pub mod snapshot;

pub use actions::Action;
pub use errors::StoreError;
pub use models::*;
pub use reducer::Store;
