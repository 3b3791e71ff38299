use crate::models::{
    Dao, ExecutionState, Member, Operation, Proposal, ProposalStage, Redemption, RedemptionKind,
    Stake, Vote, VoteOutcome,
};
use alloy::primitives::U256;

/// Everything that can change the [`crate::Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DaoLoaded(Dao),
    ProposalLoaded(Proposal),
    MemberLoaded(Member),
    RedemptionLoaded(Redemption),
    ProposalCreated(Proposal),
    StakeAdded(Stake),
    VoteCast(Vote),
    ProposalExecuted {
        proposal_id: String,
        decision: Option<VoteOutcome>,
        execution_state: ExecutionState,
        executed_at: u64,
    },
    RedemptionCleared {
        proposal_id: String,
        account: String,
        kind: RedemptionKind,
        amount: U256,
        redeemed_at: u64,
    },
    ReputationMinted {
        dao: String,
        address: String,
        amount: U256,
    },
    ReputationBurned {
        dao: String,
        address: String,
        amount: U256,
    },
    DaoBalancesUpdated {
        dao: String,
        eth_balance: U256,
        gen_balance: U256,
    },
    ProposalStageChanged {
        proposal_id: String,
        stage: ProposalStage,
        /// Set when the pre-boosted period ran out, so the boosted period
        /// can be timed from it.
        boosted_at: Option<u64>,
    },
    Operation(Operation),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::DaoLoaded(_) => "dao_loaded",
            Action::ProposalLoaded(_) => "proposal_loaded",
            Action::MemberLoaded(_) => "member_loaded",
            Action::RedemptionLoaded(_) => "redemption_loaded",
            Action::ProposalCreated(_) => "proposal_created",
            Action::StakeAdded(_) => "stake_added",
            Action::VoteCast(_) => "vote_cast",
            Action::ProposalExecuted { .. } => "proposal_executed",
            Action::RedemptionCleared { .. } => "redemption_cleared",
            Action::ReputationMinted { .. } => "reputation_minted",
            Action::ReputationBurned { .. } => "reputation_burned",
            Action::DaoBalancesUpdated { .. } => "dao_balances_updated",
            Action::ProposalStageChanged { .. } => "proposal_stage_changed",
            Action::Operation(_) => "operation",
        }
    }

    /// The proposal this action touches, if any.
    pub fn proposal_id(&self) -> Option<&str> {
        match self {
            Action::ProposalLoaded(proposal) | Action::ProposalCreated(proposal) => {
                Some(&proposal.id)
            }
            Action::RedemptionLoaded(redemption) => Some(&redemption.proposal_id),
            Action::StakeAdded(stake) => Some(&stake.proposal_id),
            Action::VoteCast(vote) => Some(&vote.proposal_id),
            Action::ProposalExecuted { proposal_id, .. }
            | Action::RedemptionCleared { proposal_id, .. }
            | Action::ProposalStageChanged { proposal_id, .. } => Some(proposal_id),
            _ => None,
        }
    }
}
