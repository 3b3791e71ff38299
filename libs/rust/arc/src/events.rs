use crate::{
    contracts::{ContributionReward, GenesisProtocol, Reputation},
    errors::ArcError,
};
use alchemy_store::{
    Action, ExecutionState, Proposal, RedemptionKind, Stake, Vote, VoteOutcome,
};
use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use std::collections::HashMap;

/// Lowercase `0x` form used for every key in the store.
pub fn hex_id(id: &B256) -> String {
    format!("{id:#x}")
}

pub fn hex_address(address: &Address) -> String {
    format!("{address:#x}")
}

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Blocks strictly after `last` up to and including `latest`.
    pub fn after(last: u64, latest: u64) -> Self {
        Self {
            from: last.saturating_add(1),
            to: latest,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }
}

/// Voting machine and scheme event kinds, in the order a cache pass replays them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewProposal,
    Stake,
    Vote,
    Execution,
    Redemption(RedemptionKind),
}

impl EventKind {
    /// Execution must be folded before any redemption of the same proposal.
    pub const REPLAY_ORDER: [EventKind; 9] = [
        EventKind::NewProposal,
        EventKind::Stake,
        EventKind::Vote,
        EventKind::Execution,
        EventKind::Redemption(RedemptionKind::StakerTokens),
        EventKind::Redemption(RedemptionKind::VoterReputation),
        EventKind::Redemption(RedemptionKind::DaoBounty),
        EventKind::Redemption(RedemptionKind::BeneficiaryReputation),
        EventKind::Redemption(RedemptionKind::BeneficiaryEth),
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::NewProposal => "NewProposal",
            EventKind::Stake => "Stake",
            EventKind::Vote => "VoteProposal",
            EventKind::Execution => "ExecuteProposal",
            EventKind::Redemption(RedemptionKind::StakerTokens) => "Redeem",
            EventKind::Redemption(RedemptionKind::VoterReputation) => "RedeemReputation",
            EventKind::Redemption(RedemptionKind::DaoBounty) => "RedeemDaoBounty",
            EventKind::Redemption(RedemptionKind::BeneficiaryReputation) => {
                "ContributionReward.RedeemReputation"
            }
            EventKind::Redemption(RedemptionKind::BeneficiaryEth) => "RedeemEther",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMeta {
    pub block: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalCreated {
    pub meta: EventMeta,
    pub proposal_id: B256,
    pub dao: Address,
    pub proposer: Address,
}

impl ProposalCreated {
    /// What the event alone says about the proposal.
    pub fn into_proposal(self) -> Proposal {
        Proposal {
            proposer: hex_address(&self.proposer),
            created_at: self.meta.timestamp,
            ..Proposal::shadow(&hex_id(&self.proposal_id), &hex_address(&self.dao))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeEvent {
    pub meta: EventMeta,
    pub proposal_id: B256,
    pub dao: Address,
    pub staker: Address,
    pub outcome: Option<VoteOutcome>,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEvent {
    pub meta: EventMeta,
    pub proposal_id: B256,
    pub dao: Address,
    pub voter: Address,
    pub outcome: Option<VoteOutcome>,
    pub reputation: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    pub meta: EventMeta,
    pub proposal_id: B256,
    pub dao: Address,
    pub decision: Option<VoteOutcome>,
    pub execution_state: ExecutionState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionEvent {
    pub meta: EventMeta,
    pub kind: RedemptionKind,
    pub proposal_id: B256,
    pub beneficiary: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationChange {
    pub meta: EventMeta,
    pub dao: Address,
    pub holder: Address,
    pub amount: U256,
}

/// Chain events decoded at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    ProposalCreated(ProposalCreated),
    Stake(StakeEvent),
    Vote(VoteEvent),
    Execution(ExecutionEvent),
    Redemption(RedemptionEvent),
    ReputationMinted(ReputationChange),
    ReputationBurned(ReputationChange),
}

impl ChainEvent {
    pub fn meta(&self) -> EventMeta {
        match self {
            ChainEvent::ProposalCreated(event) => event.meta,
            ChainEvent::Stake(event) => event.meta,
            ChainEvent::Vote(event) => event.meta,
            ChainEvent::Execution(event) => event.meta,
            ChainEvent::Redemption(event) => event.meta,
            ChainEvent::ReputationMinted(event) | ChainEvent::ReputationBurned(event) => {
                event.meta
            }
        }
    }

    /// Reducer action for this event. Abstaining votes and stakes carry no
    /// outcome and produce nothing.
    pub fn into_action(self) -> Option<Action> {
        match self {
            ChainEvent::ProposalCreated(event) => Some(Action::ProposalCreated(event.into_proposal())),
            ChainEvent::Stake(event) => event.outcome.map(|outcome| {
                Action::StakeAdded(Stake {
                    proposal_id: hex_id(&event.proposal_id),
                    staker: hex_address(&event.staker),
                    outcome,
                    amount: event.amount,
                    block: event.meta.block,
                })
            }),
            ChainEvent::Vote(event) => event.outcome.map(|outcome| {
                Action::VoteCast(Vote {
                    proposal_id: hex_id(&event.proposal_id),
                    voter: hex_address(&event.voter),
                    outcome,
                    reputation: event.reputation,
                    block: event.meta.block,
                })
            }),
            ChainEvent::Execution(event) => Some(Action::ProposalExecuted {
                proposal_id: hex_id(&event.proposal_id),
                decision: event.decision,
                execution_state: event.execution_state,
                executed_at: event.meta.timestamp,
            }),
            ChainEvent::Redemption(event) => Some(Action::RedemptionCleared {
                proposal_id: hex_id(&event.proposal_id),
                account: hex_address(&event.beneficiary),
                kind: event.kind,
                amount: event.amount,
                redeemed_at: event.meta.timestamp,
            }),
            ChainEvent::ReputationMinted(event) => Some(Action::ReputationMinted {
                dao: hex_address(&event.dao),
                address: hex_address(&event.holder),
                amount: event.amount,
            }),
            ChainEvent::ReputationBurned(event) => Some(Action::ReputationBurned {
                dao: hex_address(&event.dao),
                address: hex_address(&event.holder),
                amount: event.amount,
            }),
        }
    }
}

fn meta(log: &Log, timestamp: u64) -> EventMeta {
    EventMeta {
        block: log.block_number.unwrap_or_default(),
        timestamp: log.block_timestamp.unwrap_or(timestamp),
    }
}

fn decode<E: SolEvent>(log: &Log, event: &'static str) -> Result<E, ArcError> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|err| ArcError::Decode {
            event,
            reason: err.to_string(),
        })
}

fn outcome(choice: U256) -> Option<VoteOutcome> {
    u64::try_from(choice).ok().and_then(VoteOutcome::from_choice)
}

/// Topic0 of the event that carries `kind`.
pub fn signature(kind: EventKind) -> B256 {
    match kind {
        EventKind::NewProposal => GenesisProtocol::NewProposal::SIGNATURE_HASH,
        EventKind::Stake => GenesisProtocol::Stake::SIGNATURE_HASH,
        EventKind::Vote => GenesisProtocol::VoteProposal::SIGNATURE_HASH,
        EventKind::Execution => GenesisProtocol::ExecuteProposal::SIGNATURE_HASH,
        EventKind::Redemption(RedemptionKind::StakerTokens) => {
            GenesisProtocol::Redeem::SIGNATURE_HASH
        }
        EventKind::Redemption(RedemptionKind::VoterReputation) => {
            GenesisProtocol::RedeemReputation::SIGNATURE_HASH
        }
        EventKind::Redemption(RedemptionKind::DaoBounty) => {
            GenesisProtocol::RedeemDaoBounty::SIGNATURE_HASH
        }
        EventKind::Redemption(RedemptionKind::BeneficiaryReputation) => {
            ContributionReward::RedeemReputation::SIGNATURE_HASH
        }
        EventKind::Redemption(RedemptionKind::BeneficiaryEth) => {
            ContributionReward::RedeemEther::SIGNATURE_HASH
        }
    }
}

/// Decodes one voting machine or scheme log. `execution_states` carries the
/// `GPExecuteProposal` states seen in the same block range.
pub fn decode_log(
    kind: EventKind,
    log: &Log,
    timestamp: u64,
    execution_states: &HashMap<B256, ExecutionState>,
) -> Result<ChainEvent, ArcError> {
    let meta = meta(log, timestamp);
    let event = match kind {
        EventKind::NewProposal => {
            let event: GenesisProtocol::NewProposal = decode(log, kind.name())?;
            ChainEvent::ProposalCreated(ProposalCreated {
                meta,
                proposal_id: event._proposalId,
                dao: event._organization,
                proposer: event._proposer,
            })
        }
        EventKind::Stake => {
            let event: GenesisProtocol::Stake = decode(log, kind.name())?;
            ChainEvent::Stake(StakeEvent {
                meta,
                proposal_id: event._proposalId,
                dao: event._organization,
                staker: event._staker,
                outcome: outcome(event._vote),
                amount: event._amount,
            })
        }
        EventKind::Vote => {
            let event: GenesisProtocol::VoteProposal = decode(log, kind.name())?;
            ChainEvent::Vote(VoteEvent {
                meta,
                proposal_id: event._proposalId,
                dao: event._organization,
                voter: event._voter,
                outcome: outcome(event._vote),
                reputation: event._reputation,
            })
        }
        EventKind::Execution => {
            let event: GenesisProtocol::ExecuteProposal = decode(log, kind.name())?;
            ChainEvent::Execution(ExecutionEvent {
                meta,
                proposal_id: event._proposalId,
                dao: event._organization,
                decision: outcome(event._decision),
                execution_state: execution_states
                    .get(&event._proposalId)
                    .copied()
                    .unwrap_or_default(),
            })
        }
        EventKind::Redemption(redemption) => {
            let (proposal_id, beneficiary, amount) = match redemption {
                RedemptionKind::StakerTokens => {
                    let event: GenesisProtocol::Redeem = decode(log, kind.name())?;
                    (event._proposalId, event._beneficiary, event._amount)
                }
                RedemptionKind::VoterReputation => {
                    let event: GenesisProtocol::RedeemReputation = decode(log, kind.name())?;
                    (event._proposalId, event._beneficiary, event._amount)
                }
                RedemptionKind::DaoBounty => {
                    let event: GenesisProtocol::RedeemDaoBounty = decode(log, kind.name())?;
                    (event._proposalId, event._beneficiary, event._amount)
                }
                RedemptionKind::BeneficiaryReputation => {
                    let event: ContributionReward::RedeemReputation = decode(log, kind.name())?;
                    (
                        event._proposalId,
                        event._beneficiary,
                        event._amount.unsigned_abs(),
                    )
                }
                RedemptionKind::BeneficiaryEth => {
                    let event: ContributionReward::RedeemEther = decode(log, kind.name())?;
                    (event._proposalId, event._beneficiary, event._amount)
                }
            };
            ChainEvent::Redemption(RedemptionEvent {
                meta,
                kind: redemption,
                proposal_id,
                beneficiary,
                amount,
            })
        }
    };
    Ok(event)
}

/// Decodes the `GPExecuteProposal` logs of a range into a lookup by proposal.
pub fn decode_execution_states(logs: &[Log]) -> Result<HashMap<B256, ExecutionState>, ArcError> {
    logs.iter()
        .map(|log| {
            let event: GenesisProtocol::GPExecuteProposal = decode(log, "GPExecuteProposal")?;
            Ok((
                event._proposalId,
                ExecutionState::from_u8(event._executionState),
            ))
        })
        .collect()
}

/// Decodes a `Mint` or `Burn` log of the reputation contract of `dao`.
pub fn decode_reputation_log(dao: Address, log: &Log, timestamp: u64) -> Result<ChainEvent, ArcError> {
    let meta = meta(log, timestamp);
    match log.topic0() {
        Some(topic) if *topic == Reputation::Mint::SIGNATURE_HASH => {
            let event: Reputation::Mint = decode(log, "Mint")?;
            Ok(ChainEvent::ReputationMinted(ReputationChange {
                meta,
                dao,
                holder: event._to,
                amount: event._amount,
            }))
        }
        Some(topic) if *topic == Reputation::Burn::SIGNATURE_HASH => {
            let event: Reputation::Burn = decode(log, "Burn")?;
            Ok(ChainEvent::ReputationBurned(ReputationChange {
                meta,
                dao,
                holder: event._from,
                amount: event._amount,
            }))
        }
        other => Err(ArcError::Decode {
            event: "Reputation",
            reason: format!("unexpected topic {other:?}"),
        }),
    }
}
