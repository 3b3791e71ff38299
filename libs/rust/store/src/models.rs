use alloy::primitives::{I256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key used for every per-account, per-proposal record (votes, stakes, redemptions).
pub fn composite_key(proposal_id: &str, address: &str) -> String {
    format!("{proposal_id}-{address}")
}

/// Key used for DAO members.
pub fn member_key(dao: &str, address: &str) -> String {
    format!("{dao}-{address}")
}

/// Stage of a proposal in the GenesisProtocol voting machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ProposalStage {
    #[default]
    Queued,
    PreBoosted,
    Boosted,
    QuietEndingPeriod,
    Executed,
    ExpiredInQueue,
    /// Voting period is over but nobody has called `execute` yet.
    Closed,
}

impl ProposalStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProposalStage::Executed | ProposalStage::ExpiredInQueue | ProposalStage::Closed
        )
    }

    /// Maps the on-chain `ProposalState` enum of the voting machine.
    pub fn from_voting_machine_state(state: u8) -> Option<Self> {
        match state {
            1 => Some(ProposalStage::ExpiredInQueue),
            2 => Some(ProposalStage::Executed),
            3 => Some(ProposalStage::Queued),
            4 => Some(ProposalStage::PreBoosted),
            5 => Some(ProposalStage::Boosted),
            6 => Some(ProposalStage::QuietEndingPeriod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteOutcome {
    Yes,
    No,
}

impl VoteOutcome {
    /// GenesisProtocol encodes YES as 1 and NO as 2. Anything else is abstain/none.
    pub fn from_choice(choice: u64) -> Option<Self> {
        match choice {
            1 => Some(VoteOutcome::Yes),
            2 => Some(VoteOutcome::No),
            _ => None,
        }
    }

    pub fn as_choice(self) -> u64 {
        match self {
            VoteOutcome::Yes => 1,
            VoteOutcome::No => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionState {
    #[default]
    None,
    QueueBarCrossed,
    QueueTimeOut,
    PreBoostedBarCrossed,
    BoostedTimeOut,
    BoostedBarCrossed,
}

impl ExecutionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ExecutionState::QueueBarCrossed,
            2 => ExecutionState::QueueTimeOut,
            3 => ExecutionState::PreBoostedBarCrossed,
            4 => ExecutionState::BoostedTimeOut,
            5 => ExecutionState::BoostedBarCrossed,
            _ => ExecutionState::None,
        }
    }
}

/// The five reward kinds a finished proposal can pay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RedemptionKind {
    StakerTokens,
    VoterReputation,
    DaoBounty,
    BeneficiaryReputation,
    BeneficiaryEth,
}

impl RedemptionKind {
    pub const ALL: [RedemptionKind; 5] = [
        RedemptionKind::StakerTokens,
        RedemptionKind::VoterReputation,
        RedemptionKind::DaoBounty,
        RedemptionKind::BeneficiaryReputation,
        RedemptionKind::BeneficiaryEth,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dao {
    pub address: String,
    pub name: String,
    pub native_token: String,
    pub native_reputation: String,
    pub reputation_total_supply: U256,
    pub token_total_supply: U256,
    pub eth_balance: U256,
    pub gen_balance: U256,
    pub proposals: Vec<String>,
}

impl Dao {
    pub fn shadow(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Default::default()
        }
    }
}

/// Contribution reward requested by a proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContributionReward {
    pub beneficiary: String,
    pub eth: U256,
    pub native_token: U256,
    pub reputation_change: I256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proposal {
    pub id: String,
    pub dao: String,
    pub proposer: String,
    pub scheme: String,
    pub title: String,
    pub description_hash: String,
    pub stage: ProposalStage,
    pub winning_outcome: Option<VoteOutcome>,
    pub execution_state: ExecutionState,
    pub votes_for: U256,
    pub votes_against: U256,
    pub stakes_for: U256,
    pub stakes_against: U256,
    pub votes: Vec<String>,
    pub stakes: Vec<String>,
    pub redemptions: Vec<String>,
    pub created_at: u64,
    pub pre_boosted_at: Option<u64>,
    pub boosted_at: Option<u64>,
    pub quiet_ending_at: Option<u64>,
    pub executed_at: Option<u64>,
    pub queued_vote_period_limit: u64,
    pub pre_boosted_vote_period_limit: u64,
    pub boosted_vote_period_limit: u64,
    pub reward: Option<ContributionReward>,
}

impl Proposal {
    pub fn shadow(id: &str, dao: &str) -> Self {
        Self {
            id: id.to_string(),
            dao: dao.to_string(),
            ..Default::default()
        }
    }

    /// Stage the proposal should be displayed in at `now` (unix seconds).
    ///
    /// Only time-driven transitions are projected; vote- and stake-driven ones
    /// arrive as events.
    pub fn projected_stage(&self, now: u64) -> ProposalStage {
        match self.stage {
            ProposalStage::Queued
                if self.queued_vote_period_limit > 0
                    && now >= self.created_at.saturating_add(self.queued_vote_period_limit) =>
            {
                ProposalStage::ExpiredInQueue
            }
            ProposalStage::PreBoosted => match self.pre_boosted_at {
                Some(at) if now >= at.saturating_add(self.pre_boosted_vote_period_limit) => {
                    self.boosted_projection(now, at.saturating_add(self.pre_boosted_vote_period_limit))
                }
                _ => ProposalStage::PreBoosted,
            },
            ProposalStage::Boosted | ProposalStage::QuietEndingPeriod => {
                match self.boosted_at {
                    Some(at) => self.boosted_projection(now, at),
                    None => self.stage,
                }
            }
            stage => stage,
        }
    }

    /// When the proposal left the pre-boosted period, if it already has.
    pub fn projected_boosted_at(&self, now: u64) -> Option<u64> {
        if self.stage != ProposalStage::PreBoosted {
            return None;
        }
        let boosted_at = self
            .pre_boosted_at?
            .saturating_add(self.pre_boosted_vote_period_limit);
        (now >= boosted_at).then_some(boosted_at)
    }

    fn boosted_projection(&self, now: u64, boosted_at: u64) -> ProposalStage {
        if self.boosted_vote_period_limit > 0
            && now >= boosted_at.saturating_add(self.boosted_vote_period_limit)
        {
            ProposalStage::Closed
        } else if self.stage == ProposalStage::QuietEndingPeriod {
            ProposalStage::QuietEndingPeriod
        } else {
            ProposalStage::Boosted
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: String,
    pub voter: String,
    pub outcome: VoteOutcome,
    pub reputation: U256,
    pub block: u64,
}

impl Vote {
    pub fn key(&self) -> String {
        composite_key(&self.proposal_id, &self.voter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub proposal_id: String,
    pub staker: String,
    pub outcome: VoteOutcome,
    pub amount: U256,
    pub block: u64,
}

impl Stake {
    pub fn key(&self) -> String {
        composite_key(&self.proposal_id, &self.staker)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Redemption {
    pub proposal_id: String,
    pub account: String,
    pub amounts: BTreeMap<RedemptionKind, U256>,
    pub redeemed_at: BTreeMap<RedemptionKind, u64>,
}

impl Redemption {
    pub fn new(proposal_id: &str, account: &str) -> Self {
        Self {
            proposal_id: proposal_id.to_string(),
            account: account.to_string(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> String {
        composite_key(&self.proposal_id, &self.account)
    }

    pub fn is_pending(&self, kind: RedemptionKind) -> bool {
        let owed = self.amounts.get(&kind).is_some_and(|amount| !amount.is_zero());
        owed && !self.redeemed_at.contains_key(&kind)
    }

    pub fn has_pending(&self) -> bool {
        RedemptionKind::ALL.iter().any(|kind| self.is_pending(*kind))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub dao: String,
    pub address: String,
    pub reputation: U256,
}

impl Member {
    pub fn key(&self) -> String {
        member_key(&self.dao, &self.address)
    }
}

/// UI status of a dispatched user intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsyncActionSequence {
    Pending,
    Success,
    Failure,
}

impl AsyncActionSequence {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AsyncActionSequence::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentKind {
    Vote,
    Stake,
    CreateProposal,
    Execute,
    Redeem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub intent: IntentKind,
    pub sequence: AsyncActionSequence,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(created_at: u64) -> Proposal {
        Proposal {
            created_at,
            queued_vote_period_limit: 100,
            pre_boosted_vote_period_limit: 10,
            boosted_vote_period_limit: 50,
            ..Proposal::shadow("p", "dao")
        }
    }

    #[test]
    fn queued_proposal_expires_after_queue_period() {
        let proposal = queued(1_000);
        assert_eq!(proposal.projected_stage(1_099), ProposalStage::Queued);
        assert_eq!(proposal.projected_stage(1_100), ProposalStage::ExpiredInQueue);
    }

    #[test]
    fn pre_boosted_proposal_becomes_boosted_then_closed() {
        let proposal = Proposal {
            stage: ProposalStage::PreBoosted,
            pre_boosted_at: Some(2_000),
            ..queued(1_000)
        };
        assert_eq!(proposal.projected_stage(2_005), ProposalStage::PreBoosted);
        assert_eq!(proposal.projected_stage(2_010), ProposalStage::Boosted);
        assert_eq!(proposal.projected_stage(2_060), ProposalStage::Closed);
    }

    #[test]
    fn terminal_stages_never_move() {
        let proposal = Proposal {
            stage: ProposalStage::Executed,
            ..queued(0)
        };
        assert_eq!(proposal.projected_stage(u64::MAX), ProposalStage::Executed);
    }

    #[test]
    fn quiet_ending_keeps_its_stage_until_boosted_period_ends() {
        let proposal = Proposal {
            stage: ProposalStage::QuietEndingPeriod,
            boosted_at: Some(500),
            ..queued(0)
        };
        assert_eq!(proposal.projected_stage(540), ProposalStage::QuietEndingPeriod);
        assert_eq!(proposal.projected_stage(550), ProposalStage::Closed);
    }

    #[test]
    fn redemption_pending_until_redeemed() {
        let mut redemption = Redemption::new("p", "0xabc");
        assert!(!redemption.has_pending());

        redemption
            .amounts
            .insert(RedemptionKind::StakerTokens, U256::from(5));
        assert!(redemption.is_pending(RedemptionKind::StakerTokens));

        redemption.redeemed_at.insert(RedemptionKind::StakerTokens, 42);
        assert!(!redemption.has_pending());
    }

    #[test]
    fn vote_choice_encoding() {
        assert_eq!(VoteOutcome::from_choice(1), Some(VoteOutcome::Yes));
        assert_eq!(VoteOutcome::from_choice(2), Some(VoteOutcome::No));
        assert_eq!(VoteOutcome::from_choice(0), None);
        assert_eq!(VoteOutcome::No.as_choice(), 2);
    }
}
