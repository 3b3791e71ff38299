//! Background replay of DAOstack events into the cached Arc state.

pub mod coordinator;
pub mod errors;
pub mod worker;

pub use coordinator::{Coordinator, LeaseToken, RedisCoordinator};
pub use errors::WorkerError;
pub use worker::{CacheWorker, Dispatched, PassOutcome, PassReport, RangeOverride, WorkerConfig};
