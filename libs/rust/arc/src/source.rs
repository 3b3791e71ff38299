use crate::{
    errors::ArcError,
    events::{BlockRange, ChainEvent, EventKind},
};
use alchemy_store::{Action, Dao, Proposal};
use alloy::primitives::U256;
use async_trait::async_trait;

/// Read side of the chain adapter, everything a cache pass needs.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn latest_block(&self) -> Result<u64, ArcError>;

    async fn block_timestamp(&self, block: u64) -> Result<u64, ArcError>;

    /// Full subgraph state as loader actions: daos, members, votes, stakes,
    /// proposals, then redemptions.
    async fn load_full_state(&self) -> Result<Vec<Action>, ArcError>;

    /// Title, scheme, periods and reward of a proposal as the subgraph knows it.
    async fn proposal_details(&self, proposal_id: &str) -> Result<Option<Proposal>, ArcError>;

    async fn events(&self, kind: EventKind, range: BlockRange) -> Result<Vec<ChainEvent>, ArcError>;

    async fn reputation_events(&self, dao: &Dao, range: BlockRange)
    -> Result<Vec<ChainEvent>, ArcError>;

    /// ETH and GEN balances of the DAO avatar at `block`.
    async fn dao_balances(&self, dao: &Dao, block: u64) -> Result<(U256, U256), ArcError>;
}
