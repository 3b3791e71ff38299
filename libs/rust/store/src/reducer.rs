use crate::{
    actions::Action,
    models::{
        Dao, Member, Operation, Proposal, ProposalStage, Redemption, Stake, Vote, VoteOutcome,
        composite_key, member_key,
    },
};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    pub daos: BTreeMap<String, Dao>,
    pub proposals: BTreeMap<String, Proposal>,
    pub votes: BTreeMap<String, Vote>,
    pub stakes: BTreeMap<String, Stake>,
    pub redemptions: BTreeMap<String, Redemption>,
    pub members: BTreeMap<String, Member>,
    pub operations: BTreeMap<String, Operation>,
    /// Last block folded into this store.
    pub last_block: u64,
}

fn push_unique(list: &mut Vec<String>, key: &str) {
    if !list.iter().any(|existing| existing == key) {
        list.push(key.to_string());
    }
}

fn merge_unique(list: &mut Vec<String>, other: &[String]) {
    for key in other {
        push_unique(list, key);
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one action into the store.
    ///
    /// Everything except the reputation deltas is keyed and safe to apply
    /// twice. Mints and burns add to a running total, so the caller must fold
    /// each block's reputation events at most once.
    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::DaoLoaded(dao) => self.load_dao(dao),
            Action::ProposalLoaded(proposal) => self.load_proposal(proposal),
            Action::MemberLoaded(member) => {
                self.dao_entry(&member.dao);
                self.members.insert(member.key(), member);
            }
            Action::RedemptionLoaded(redemption) => self.load_redemption(redemption),
            Action::ProposalCreated(proposal) => self.create_proposal(proposal),
            Action::StakeAdded(stake) => self.add_stake(stake),
            Action::VoteCast(vote) => self.cast_vote(vote),
            Action::ProposalExecuted {
                proposal_id,
                decision,
                execution_state,
                executed_at,
            } => {
                let proposal = self.proposal_entry(&proposal_id);
                proposal.stage = ProposalStage::Executed;
                proposal.winning_outcome = decision;
                proposal.execution_state = execution_state;
                proposal.executed_at = Some(executed_at);
            }
            Action::RedemptionCleared {
                proposal_id,
                account,
                kind,
                amount,
                redeemed_at,
            } => {
                let key = composite_key(&proposal_id, &account);
                let proposal = self.proposal_entry(&proposal_id);
                if proposal.executed_at.is_none() {
                    warn!(proposal_id = %proposal_id, account = %account, ?kind, "Redemption folded before proposal execution");
                }
                push_unique(&mut proposal.redemptions, &key);

                let redemption = self
                    .redemptions
                    .entry(key)
                    .or_insert_with(|| Redemption::new(&proposal_id, &account));
                redemption.amounts.insert(kind, amount);
                redemption.redeemed_at.insert(kind, redeemed_at);
            }
            Action::ReputationMinted {
                dao,
                address,
                amount,
            } => {
                let dao_entry = self.dao_entry(&dao);
                dao_entry.reputation_total_supply =
                    dao_entry.reputation_total_supply.saturating_add(amount);
                let member = self.member_entry(&dao, &address);
                member.reputation = member.reputation.saturating_add(amount);
            }
            Action::ReputationBurned {
                dao,
                address,
                amount,
            } => {
                let dao_entry = self.dao_entry(&dao);
                dao_entry.reputation_total_supply =
                    dao_entry.reputation_total_supply.saturating_sub(amount);
                let member = self.member_entry(&dao, &address);
                member.reputation = member.reputation.saturating_sub(amount);
            }
            Action::DaoBalancesUpdated {
                dao,
                eth_balance,
                gen_balance,
            } => {
                let dao_entry = self.dao_entry(&dao);
                dao_entry.eth_balance = eth_balance;
                dao_entry.gen_balance = gen_balance;
            }
            Action::ProposalStageChanged {
                proposal_id,
                stage,
                boosted_at,
            } => {
                let proposal = self.proposal_entry(&proposal_id);
                if proposal.stage.is_terminal() {
                    debug!(proposal_id = %proposal_id, current = ?proposal.stage, requested = ?stage, "Ignoring stage change of finished proposal");
                } else {
                    proposal.stage = stage;
                    if proposal.boosted_at.is_none() {
                        proposal.boosted_at = boosted_at;
                    }
                }
            }
            Action::Operation(operation) => self.track_operation(operation),
        }
    }

    fn dao_entry(&mut self, address: &str) -> &mut Dao {
        self.daos
            .entry(address.to_string())
            .or_insert_with(|| Dao::shadow(address))
    }

    fn member_entry(&mut self, dao: &str, address: &str) -> &mut Member {
        self.members
            .entry(member_key(dao, address))
            .or_insert_with(|| Member {
                dao: dao.to_string(),
                address: address.to_string(),
                reputation: U256::ZERO,
            })
    }

    /// Returns the proposal, creating a shadow copy on first observation.
    fn proposal_entry(&mut self, proposal_id: &str) -> &mut Proposal {
        self.proposals
            .entry(proposal_id.to_string())
            .or_insert_with(|| Proposal::shadow(proposal_id, ""))
    }

    fn link_proposal(&mut self, dao: &str, proposal_id: &str) {
        if dao.is_empty() {
            return;
        }
        let dao_entry = self.dao_entry(dao);
        push_unique(&mut dao_entry.proposals, proposal_id);
    }

    fn load_dao(&mut self, mut dao: Dao) {
        if let Some(existing) = self.daos.remove(&dao.address) {
            merge_unique(&mut dao.proposals, &existing.proposals);
        }
        self.daos.insert(dao.address.clone(), dao);
    }

    /// Replaces the proposal with the indexed copy, keeping the composite keys
    /// already linked to it.
    fn load_proposal(&mut self, mut proposal: Proposal) {
        if let Some(existing) = self.proposals.remove(&proposal.id) {
            merge_unique(&mut proposal.votes, &existing.votes);
            merge_unique(&mut proposal.stakes, &existing.stakes);
            merge_unique(&mut proposal.redemptions, &existing.redemptions);
        }
        let (dao, id) = (proposal.dao.clone(), proposal.id.clone());
        self.proposals.insert(id.clone(), proposal);
        self.link_proposal(&dao, &id);
    }

    fn create_proposal(&mut self, created: Proposal) {
        let (dao, id) = (created.dao.clone(), created.id.clone());
        match self.proposals.get_mut(&id) {
            Some(existing) => {
                existing.dao = created.dao;
                existing.proposer = created.proposer;
                existing.scheme = created.scheme;
                if !created.title.is_empty() {
                    existing.title = created.title;
                }
                if !created.description_hash.is_empty() {
                    existing.description_hash = created.description_hash;
                }
                existing.created_at = created.created_at;
                existing.queued_vote_period_limit = created.queued_vote_period_limit;
                existing.pre_boosted_vote_period_limit = created.pre_boosted_vote_period_limit;
                existing.boosted_vote_period_limit = created.boosted_vote_period_limit;
                if created.reward.is_some() {
                    existing.reward = created.reward;
                }
            }
            None => {
                // Tallies only come from folded votes and stakes.
                self.proposals.insert(
                    id.clone(),
                    Proposal {
                        votes_for: U256::ZERO,
                        votes_against: U256::ZERO,
                        stakes_for: U256::ZERO,
                        stakes_against: U256::ZERO,
                        votes: Vec::new(),
                        stakes: Vec::new(),
                        redemptions: Vec::new(),
                        ..created
                    },
                );
            }
        }
        self.link_proposal(&dao, &id);
    }

    /// Merges the indexed amounts into the record, keeping kinds already
    /// known under the same key.
    fn load_redemption(&mut self, redemption: Redemption) {
        let key = redemption.key();
        let proposal = self.proposal_entry(&redemption.proposal_id);
        push_unique(&mut proposal.redemptions, &key);

        let Redemption {
            proposal_id,
            account,
            amounts,
            redeemed_at,
        } = redemption;
        let existing = self
            .redemptions
            .entry(key)
            .or_insert_with(|| Redemption::new(&proposal_id, &account));
        existing.amounts.extend(amounts);
        existing.redeemed_at.extend(redeemed_at);
    }

    fn add_stake(&mut self, stake: Stake) {
        let key = stake.key();
        let previous = self.stakes.insert(key.clone(), stake.clone());
        let proposal = self.proposal_entry(&stake.proposal_id);

        if let Some(previous) = previous {
            let tally = match previous.outcome {
                VoteOutcome::Yes => &mut proposal.stakes_for,
                VoteOutcome::No => &mut proposal.stakes_against,
            };
            *tally = tally.saturating_sub(previous.amount);
        }
        let tally = match stake.outcome {
            VoteOutcome::Yes => &mut proposal.stakes_for,
            VoteOutcome::No => &mut proposal.stakes_against,
        };
        *tally = tally.saturating_add(stake.amount);

        push_unique(&mut proposal.stakes, &key);
    }

    fn cast_vote(&mut self, vote: Vote) {
        let key = vote.key();
        let previous = self.votes.insert(key.clone(), vote.clone());
        let proposal = self.proposal_entry(&vote.proposal_id);

        if let Some(previous) = previous {
            let tally = match previous.outcome {
                VoteOutcome::Yes => &mut proposal.votes_for,
                VoteOutcome::No => &mut proposal.votes_against,
            };
            *tally = tally.saturating_sub(previous.reputation);
        }
        let tally = match vote.outcome {
            VoteOutcome::Yes => &mut proposal.votes_for,
            VoteOutcome::No => &mut proposal.votes_against,
        };
        *tally = tally.saturating_add(vote.reputation);

        push_unique(&mut proposal.votes, &key);
    }

    fn track_operation(&mut self, operation: Operation) {
        if let Some(existing) = self.operations.get(&operation.id) {
            if existing.sequence.is_terminal() {
                warn!(
                    operation_id = %operation.id,
                    current = ?existing.sequence,
                    requested = ?operation.sequence,
                    "Ignoring transition out of a finished operation"
                );
                return;
            }
        }
        self.operations.insert(operation.id.clone(), operation);
    }

    /// Stage changes for proposals whose time-driven stage differs from the
    /// stored one.
    pub fn expired_proposals(&self, now: u64) -> Vec<Action> {
        self.proposals
            .values()
            .filter_map(|proposal| {
                let projected = proposal.projected_stage(now);
                (projected != proposal.stage).then(|| Action::ProposalStageChanged {
                    proposal_id: proposal.id.clone(),
                    stage: projected,
                    boosted_at: proposal.projected_boosted_at(now),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AsyncActionSequence, IntentKind, RedemptionKind};
    use proptest::prelude::*;

    const GEN: u128 = 1_000_000_000_000_000_000;

    fn stake(proposal: &str, staker: &str, outcome: VoteOutcome, amount: u128) -> Stake {
        Stake {
            proposal_id: proposal.to_string(),
            staker: staker.to_string(),
            outcome,
            amount: U256::from(amount),
            block: 10,
        }
    }

    fn vote(proposal: &str, voter: &str, outcome: VoteOutcome, reputation: u128) -> Vote {
        Vote {
            proposal_id: proposal.to_string(),
            voter: voter.to_string(),
            outcome,
            reputation: U256::from(reputation),
            block: 11,
        }
    }

    #[test]
    fn stake_replay_is_idempotent() {
        let mut store = Store::new();
        let event = stake("P1", "0xABC", VoteOutcome::Yes, 500 * GEN);

        store.dispatch(Action::StakeAdded(event.clone()));
        store.dispatch(Action::StakeAdded(event.clone()));

        assert_eq!(store.stakes["P1-0xABC"], event);
        let keys = &store.proposals["P1"].stakes;
        assert_eq!(keys.iter().filter(|key| *key == "P1-0xABC").count(), 1);
        assert_eq!(store.proposals["P1"].stakes_for, U256::from(500 * GEN));
    }

    #[test]
    fn changed_stake_moves_tally() {
        let mut store = Store::new();
        store.dispatch(Action::StakeAdded(stake("P1", "0xabc", VoteOutcome::Yes, 10)));
        store.dispatch(Action::StakeAdded(stake("P1", "0xabc", VoteOutcome::No, 7)));

        let proposal = &store.proposals["P1"];
        assert_eq!(proposal.stakes_for, U256::ZERO);
        assert_eq!(proposal.stakes_against, U256::from(7));
    }

    #[test]
    fn votes_tally_per_outcome() {
        let mut store = Store::new();
        store.dispatch(Action::VoteCast(vote("P1", "0x1", VoteOutcome::Yes, 30)));
        store.dispatch(Action::VoteCast(vote("P1", "0x2", VoteOutcome::No, 12)));
        store.dispatch(Action::VoteCast(vote("P1", "0x1", VoteOutcome::Yes, 30)));

        let proposal = &store.proposals["P1"];
        assert_eq!(proposal.votes_for, U256::from(30));
        assert_eq!(proposal.votes_against, U256::from(12));
        assert_eq!(proposal.votes.len(), 2);
    }

    #[test]
    fn loaded_proposal_keeps_linked_keys() {
        let mut store = Store::new();
        store.dispatch(Action::VoteCast(vote("P1", "0x1", VoteOutcome::Yes, 30)));
        store.dispatch(Action::ProposalLoaded(Proposal {
            votes_for: U256::from(30),
            ..Proposal::shadow("P1", "0xdao")
        }));

        let proposal = &store.proposals["P1"];
        assert_eq!(proposal.votes, vec!["P1-0x1".to_string()]);
        assert_eq!(proposal.votes_for, U256::from(30));
        assert_eq!(store.daos["0xdao"].proposals, vec!["P1".to_string()]);
    }

    #[test]
    fn created_proposal_links_dao_once() {
        let mut store = Store::new();
        let created = Proposal {
            proposer: "0xfeed".to_string(),
            created_at: 100,
            ..Proposal::shadow("P2", "0xdao")
        };
        store.dispatch(Action::ProposalCreated(created.clone()));
        store.dispatch(Action::ProposalCreated(created));

        assert_eq!(store.daos["0xdao"].proposals, vec!["P2".to_string()]);
        assert_eq!(store.proposals["P2"].proposer, "0xfeed");
    }

    #[test]
    fn execution_then_redemption() {
        let mut store = Store::new();
        store.dispatch(Action::ProposalExecuted {
            proposal_id: "P1".to_string(),
            decision: Some(VoteOutcome::Yes),
            execution_state: crate::models::ExecutionState::BoostedBarCrossed,
            executed_at: 50,
        });
        store.dispatch(Action::RedemptionCleared {
            proposal_id: "P1".to_string(),
            account: "0xabc".to_string(),
            kind: RedemptionKind::StakerTokens,
            amount: U256::from(9),
            redeemed_at: 60,
        });

        let proposal = &store.proposals["P1"];
        assert_eq!(proposal.stage, ProposalStage::Executed);
        assert_eq!(proposal.redemptions, vec!["P1-0xabc".to_string()]);
        let redemption = &store.redemptions["P1-0xabc"];
        assert!(!redemption.is_pending(RedemptionKind::StakerTokens));
        assert_eq!(redemption.redeemed_at[&RedemptionKind::StakerTokens], 60);
    }

    #[test]
    fn reputation_mint_and_burn_track_supply() {
        let mut store = Store::new();
        store.dispatch(Action::ReputationMinted {
            dao: "0xdao".to_string(),
            address: "0x1".to_string(),
            amount: U256::from(100),
        });
        store.dispatch(Action::ReputationBurned {
            dao: "0xdao".to_string(),
            address: "0x1".to_string(),
            amount: U256::from(40),
        });

        assert_eq!(store.members["0xdao-0x1"].reputation, U256::from(60));
        assert_eq!(store.daos["0xdao"].reputation_total_supply, U256::from(60));
    }

    #[test]
    fn stage_change_ignored_once_terminal() {
        let mut store = Store::new();
        store.dispatch(Action::ProposalStageChanged {
            proposal_id: "P1".to_string(),
            stage: ProposalStage::ExpiredInQueue,
            boosted_at: None,
        });
        store.dispatch(Action::ProposalStageChanged {
            proposal_id: "P1".to_string(),
            stage: ProposalStage::Boosted,
            boosted_at: Some(5),
        });
        assert_eq!(store.proposals["P1"].stage, ProposalStage::ExpiredInQueue);
    }

    #[test]
    fn finished_operation_cannot_restart() {
        let mut store = Store::new();
        let op = |sequence| {
            Action::Operation(Operation {
                id: "vote-P1".to_string(),
                intent: IntentKind::Vote,
                sequence,
                message: None,
            })
        };
        store.dispatch(op(AsyncActionSequence::Pending));
        store.dispatch(op(AsyncActionSequence::Success));
        store.dispatch(op(AsyncActionSequence::Pending));
        store.dispatch(op(AsyncActionSequence::Failure));

        assert_eq!(
            store.operations["vote-P1"].sequence,
            AsyncActionSequence::Success
        );
    }

    #[test]
    fn expired_proposals_are_listed() {
        let mut store = Store::new();
        store.dispatch(Action::ProposalLoaded(Proposal {
            created_at: 0,
            queued_vote_period_limit: 10,
            ..Proposal::shadow("P1", "0xdao")
        }));
        store.dispatch(Action::ProposalLoaded(Proposal {
            created_at: 0,
            queued_vote_period_limit: 1_000,
            ..Proposal::shadow("P2", "0xdao")
        }));

        assert_eq!(
            store.expired_proposals(20),
            vec![Action::ProposalStageChanged {
                proposal_id: "P1".to_string(),
                stage: ProposalStage::ExpiredInQueue,
                boosted_at: None,
            }]
        );
    }

    #[test]
    fn boosted_proposal_closes_on_a_later_refresh() {
        let mut store = Store::new();
        store.dispatch(Action::ProposalLoaded(Proposal {
            stage: ProposalStage::PreBoosted,
            pre_boosted_at: Some(100),
            pre_boosted_vote_period_limit: 50,
            boosted_vote_period_limit: 200,
            ..Proposal::shadow("P1", "0xdao")
        }));

        for action in store.expired_proposals(160) {
            store.dispatch(action);
        }
        let proposal = &store.proposals["P1"];
        assert_eq!(proposal.stage, ProposalStage::Boosted);
        assert_eq!(proposal.boosted_at, Some(150));

        assert!(store.expired_proposals(349).is_empty());
        for action in store.expired_proposals(350) {
            store.dispatch(action);
        }
        assert_eq!(store.proposals["P1"].stage, ProposalStage::Closed);
    }

    #[test]
    fn indexed_boost_time_is_kept() {
        let mut store = Store::new();
        store.dispatch(Action::ProposalLoaded(Proposal {
            stage: ProposalStage::Boosted,
            boosted_at: Some(120),
            ..Proposal::shadow("P1", "0xdao")
        }));
        store.dispatch(Action::ProposalStageChanged {
            proposal_id: "P1".to_string(),
            stage: ProposalStage::QuietEndingPeriod,
            boosted_at: Some(150),
        });
        assert_eq!(store.proposals["P1"].boosted_at, Some(120));
    }

    #[test]
    fn created_proposal_starts_without_tallies() {
        let mut store = Store::new();
        store.dispatch(Action::ProposalCreated(Proposal {
            stakes_for: U256::from(500),
            votes_against: U256::from(3),
            ..Proposal::shadow("P1", "0xdao")
        }));
        store.dispatch(Action::StakeAdded(stake("P1", "0xabc", VoteOutcome::Yes, 500)));

        let proposal = &store.proposals["P1"];
        assert_eq!(proposal.stakes_for, U256::from(500));
        assert_eq!(proposal.votes_against, U256::ZERO);
    }

    #[test]
    fn loaded_redemptions_merge_per_kind() {
        let mut store = Store::new();
        let mut rewards = Redemption::new("P1", "0xabc");
        rewards
            .amounts
            .insert(RedemptionKind::VoterReputation, U256::from(7));
        let mut beneficiary = Redemption::new("P1", "0xabc");
        beneficiary
            .amounts
            .insert(RedemptionKind::BeneficiaryEth, U256::from(5));
        beneficiary
            .redeemed_at
            .insert(RedemptionKind::BeneficiaryEth, 90);

        store.dispatch(Action::RedemptionLoaded(rewards));
        store.dispatch(Action::RedemptionLoaded(beneficiary));

        let redemption = &store.redemptions["P1-0xabc"];
        assert_eq!(redemption.amounts.len(), 2);
        assert!(redemption.is_pending(RedemptionKind::VoterReputation));
        assert!(!redemption.is_pending(RedemptionKind::BeneficiaryEth));
        assert_eq!(store.proposals["P1"].redemptions, vec!["P1-0xabc".to_string()]);
    }

    #[test]
    fn repeat_stake_replaces_the_earlier_amount() {
        let mut store = Store::new();
        store.dispatch(Action::StakeAdded(stake("P1", "0xabc", VoteOutcome::Yes, 100)));
        store.dispatch(Action::StakeAdded(Stake {
            block: 12,
            ..stake("P1", "0xabc", VoteOutcome::Yes, 40)
        }));

        assert_eq!(store.proposals["P1"].stakes_for, U256::from(40));
        assert_eq!(store.stakes["P1-0xabc"].amount, U256::from(40));
    }

    fn arb_event() -> impl Strategy<Value = Action> {
        let proposal = prop_oneof![Just("P1"), Just("P2")];
        let account = prop_oneof![Just("0xa"), Just("0xb"), Just("0xc")];
        let outcome = prop_oneof![Just(VoteOutcome::Yes), Just(VoteOutcome::No)];
        (any::<bool>(), proposal, account, outcome, 0u64..1_000_000).prop_map(
            |(is_stake, proposal, account, outcome, amount)| {
                if is_stake {
                    Action::StakeAdded(stake(proposal, account, outcome, amount as u128))
                } else {
                    Action::VoteCast(vote(proposal, account, outcome, amount as u128))
                }
            },
        )
    }

    proptest! {
        #[test]
        fn replaying_a_batch_changes_nothing(events in prop::collection::vec(arb_event(), 1..40)) {
            let mut once = Store::new();
            for event in events.clone() {
                once.dispatch(event);
            }

            let mut twice = once.clone();
            for event in events {
                twice.dispatch(event);
            }

            prop_assert_eq!(once, twice);
        }
    }
}
