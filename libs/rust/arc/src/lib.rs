//! Chain client adapter for DAOstack: one [`ArcClient`] per network, owned by an
//! [`ArcContext`] that the application root constructs and tears down.

pub mod client;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod operations;
pub mod source;
pub mod storage;
pub mod subgraph;
pub mod subscription;
pub mod wallet;

pub use client::{ArcClient, ArcContext};
pub use config::{ArcSettings, Network};
pub use errors::ArcError;
pub use events::{BlockRange, ChainEvent, EventKind};
pub use operations::{IntentResult, ProposalRequest, TransactionSender};
pub use source::EventSource;
pub use storage::LocalStorage;
pub use subscription::{RetryPolicy, Subscription, SubscriptionState};
pub use wallet::{EnabledWallet, WalletSelection};
