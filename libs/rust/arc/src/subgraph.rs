use crate::{
    errors::ArcError,
    subscription::{RetryPolicy, with_retry},
};
use alchemy_store::{
    Action, ContributionReward, Dao, ExecutionState, Member, Proposal, ProposalStage, Redemption,
    RedemptionKind, Stake, Vote, VoteOutcome,
};
use alloy::primitives::{I256, U256};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::str::FromStr;
use tracing::{debug, info, instrument};

pub const PAGE_SIZE: usize = 1000;

const PROPOSAL_FIELDS: &str = r#"
    id
    dao { id }
    proposer
    stage
    title
    descriptionHash
    winningOutcome
    executionState
    votesFor
    votesAgainst
    stakesFor
    stakesAgainst
    createdAt
    preBoostedAt
    boostedAt
    quietEndingPeriodBeganAt
    executedAt
    scheme { name }
    genesisProtocolParams {
        queuedVotePeriodLimit
        preBoostedVotePeriodLimit
        boostedVotePeriodLimit
    }
    contributionReward {
        beneficiary
        ethReward
        nativeTokenReward
        reputationReward
        alreadyRedeemedEthPeriods
        alreadyRedeemedReputationPeriods
    }
"#;

#[derive(Deserialize, Debug)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize, Debug)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub name: String,
    pub address: String,
    pub version: String,
}

#[derive(Deserialize, Debug)]
struct IdRef {
    id: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TokenRecord {
    id: String,
    total_supply: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DaoRecord {
    id: String,
    name: String,
    native_token: TokenRecord,
    native_reputation: TokenRecord,
}

#[derive(Deserialize, Debug)]
struct ReputationHolderRecord {
    address: String,
    dao: IdRef,
    balance: String,
}

#[derive(Deserialize, Debug)]
struct VoteRecord {
    proposal: IdRef,
    voter: String,
    outcome: String,
    reputation: String,
}

#[derive(Deserialize, Debug)]
struct StakeRecord {
    proposal: IdRef,
    staker: String,
    outcome: String,
    amount: String,
}

#[derive(Deserialize, Debug)]
struct SchemeRecord {
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenesisProtocolParamsRecord {
    queued_vote_period_limit: String,
    pre_boosted_vote_period_limit: String,
    boosted_vote_period_limit: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ContributionRewardRecord {
    beneficiary: String,
    eth_reward: String,
    native_token_reward: String,
    reputation_reward: String,
    already_redeemed_eth_periods: String,
    already_redeemed_reputation_periods: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ProposalRecord {
    id: String,
    dao: IdRef,
    proposer: String,
    stage: String,
    title: Option<String>,
    description_hash: Option<String>,
    winning_outcome: Option<String>,
    execution_state: Option<String>,
    votes_for: String,
    votes_against: String,
    stakes_for: String,
    stakes_against: String,
    created_at: String,
    pre_boosted_at: Option<String>,
    boosted_at: Option<String>,
    quiet_ending_period_began_at: Option<String>,
    executed_at: Option<String>,
    scheme: Option<SchemeRecord>,
    genesis_protocol_params: Option<GenesisProtocolParamsRecord>,
    contribution_reward: Option<ContributionRewardRecord>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RewardRecord {
    beneficiary: String,
    proposal: IdRef,
    reputation_for_voter: Option<String>,
    tokens_for_staker: Option<String>,
    dao_bounty_for_staker: Option<String>,
    reputation_for_voter_redeemed_at: Option<String>,
    tokens_for_staker_redeemed_at: Option<String>,
    dao_bounty_for_staker_redeemed_at: Option<String>,
}

fn field(mut data: Value, name: &str) -> Value {
    data.get_mut(name).map(Value::take).unwrap_or(Value::Null)
}

fn parse_u256(field: &'static str, value: &str) -> Result<U256, ArcError> {
    U256::from_str(value).map_err(|_| ArcError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn parse_i256(field: &'static str, value: &str) -> Result<I256, ArcError> {
    I256::from_dec_str(value).map_err(|_| ArcError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ArcError> {
    value.parse().map_err(|_| ArcError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

/// Subgraph timestamps are `null` or `"0"` until the transition happened.
fn parse_timestamp(field: &'static str, value: Option<&str>) -> Result<Option<u64>, ArcError> {
    match value {
        None => Ok(None),
        Some(value) => Ok(Some(parse_u64(field, value)?).filter(|at| *at > 0)),
    }
}

fn parse_outcome(value: &str) -> Option<VoteOutcome> {
    match value {
        "Pass" => Some(VoteOutcome::Yes),
        "Fail" => Some(VoteOutcome::No),
        _ => None,
    }
}

fn parse_stage(value: &str) -> Result<ProposalStage, ArcError> {
    match value {
        "Queued" => Ok(ProposalStage::Queued),
        "PreBoosted" => Ok(ProposalStage::PreBoosted),
        "Boosted" => Ok(ProposalStage::Boosted),
        "QuietEndingPeriod" => Ok(ProposalStage::QuietEndingPeriod),
        "Executed" => Ok(ProposalStage::Executed),
        "ExpiredInQueue" => Ok(ProposalStage::ExpiredInQueue),
        "Closed" => Ok(ProposalStage::Closed),
        other => Err(ArcError::InvalidValue {
            field: "stage",
            value: other.to_string(),
        }),
    }
}

fn parse_execution_state(value: Option<&str>) -> ExecutionState {
    match value {
        Some("QueueBarCrossed") => ExecutionState::QueueBarCrossed,
        Some("QueueTimeOut") => ExecutionState::QueueTimeOut,
        Some("PreBoostedBarCrossed") => ExecutionState::PreBoostedBarCrossed,
        Some("BoostedTimeOut") => ExecutionState::BoostedTimeOut,
        Some("BoostedBarCrossed") => ExecutionState::BoostedBarCrossed,
        _ => ExecutionState::None,
    }
}

impl DaoRecord {
    fn into_dao(self) -> Result<Dao, ArcError> {
        Ok(Dao {
            address: self.id.to_lowercase(),
            name: self.name,
            reputation_total_supply: parse_u256(
                "reputation totalSupply",
                &self.native_reputation.total_supply,
            )?,
            token_total_supply: parse_u256("token totalSupply", &self.native_token.total_supply)?,
            native_token: self.native_token.id.to_lowercase(),
            native_reputation: self.native_reputation.id.to_lowercase(),
            ..Default::default()
        })
    }
}

impl ProposalRecord {
    fn into_proposal(self) -> Result<Proposal, ArcError> {
        let (queued, pre_boosted, boosted) = match &self.genesis_protocol_params {
            Some(params) => (
                parse_u64("queuedVotePeriodLimit", &params.queued_vote_period_limit)?,
                parse_u64("preBoostedVotePeriodLimit", &params.pre_boosted_vote_period_limit)?,
                parse_u64("boostedVotePeriodLimit", &params.boosted_vote_period_limit)?,
            ),
            None => (0, 0, 0),
        };
        let reward = match &self.contribution_reward {
            Some(reward) => Some(ContributionReward {
                beneficiary: reward.beneficiary.to_lowercase(),
                eth: parse_u256("ethReward", &reward.eth_reward)?,
                native_token: parse_u256("nativeTokenReward", &reward.native_token_reward)?,
                reputation_change: parse_i256("reputationReward", &reward.reputation_reward)?,
            }),
            None => None,
        };

        Ok(Proposal {
            id: self.id.to_lowercase(),
            dao: self.dao.id.to_lowercase(),
            proposer: self.proposer.to_lowercase(),
            scheme: self
                .scheme
                .and_then(|scheme| scheme.name)
                .unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            description_hash: self.description_hash.unwrap_or_default(),
            stage: parse_stage(&self.stage)?,
            winning_outcome: self.winning_outcome.as_deref().and_then(parse_outcome),
            execution_state: parse_execution_state(self.execution_state.as_deref()),
            votes_for: parse_u256("votesFor", &self.votes_for)?,
            votes_against: parse_u256("votesAgainst", &self.votes_against)?,
            stakes_for: parse_u256("stakesFor", &self.stakes_for)?,
            stakes_against: parse_u256("stakesAgainst", &self.stakes_against)?,
            created_at: parse_u64("createdAt", &self.created_at)?,
            pre_boosted_at: parse_timestamp("preBoostedAt", self.pre_boosted_at.as_deref())?,
            boosted_at: parse_timestamp("boostedAt", self.boosted_at.as_deref())?,
            quiet_ending_at: parse_timestamp(
                "quietEndingPeriodBeganAt",
                self.quiet_ending_period_began_at.as_deref(),
            )?,
            executed_at: parse_timestamp("executedAt", self.executed_at.as_deref())?,
            queued_vote_period_limit: queued,
            pre_boosted_vote_period_limit: pre_boosted,
            boosted_vote_period_limit: boosted,
            reward,
            ..Default::default()
        })
    }

    /// Beneficiary rewards of a passed contribution proposal.
    fn beneficiary_redemption(&self) -> Result<Option<Redemption>, ArcError> {
        let Some(reward) = &self.contribution_reward else {
            return Ok(None);
        };
        if self.winning_outcome.as_deref().and_then(parse_outcome) != Some(VoteOutcome::Yes) {
            return Ok(None);
        }
        let executed_at = parse_timestamp("executedAt", self.executed_at.as_deref())?;
        let mut redemption = Redemption::new(&self.id.to_lowercase(), &reward.beneficiary.to_lowercase());

        let reputation = parse_i256("reputationReward", &reward.reputation_reward)?;
        if reputation > I256::ZERO {
            redemption
                .amounts
                .insert(RedemptionKind::BeneficiaryReputation, reputation.unsigned_abs());
            if parse_u64(
                "alreadyRedeemedReputationPeriods",
                &reward.already_redeemed_reputation_periods,
            )? > 0
            {
                redemption.redeemed_at.insert(
                    RedemptionKind::BeneficiaryReputation,
                    executed_at.unwrap_or_default(),
                );
            }
        }

        let eth = parse_u256("ethReward", &reward.eth_reward)?;
        if !eth.is_zero() {
            redemption.amounts.insert(RedemptionKind::BeneficiaryEth, eth);
            if parse_u64("alreadyRedeemedEthPeriods", &reward.already_redeemed_eth_periods)? > 0 {
                redemption
                    .redeemed_at
                    .insert(RedemptionKind::BeneficiaryEth, executed_at.unwrap_or_default());
            }
        }

        Ok((!redemption.amounts.is_empty()).then_some(redemption))
    }
}

impl RewardRecord {
    fn into_redemption(self) -> Result<Redemption, ArcError> {
        let mut redemption =
            Redemption::new(&self.proposal.id.to_lowercase(), &self.beneficiary.to_lowercase());
        let kinds = [
            (
                RedemptionKind::VoterReputation,
                self.reputation_for_voter,
                self.reputation_for_voter_redeemed_at,
            ),
            (
                RedemptionKind::StakerTokens,
                self.tokens_for_staker,
                self.tokens_for_staker_redeemed_at,
            ),
            (
                RedemptionKind::DaoBounty,
                self.dao_bounty_for_staker,
                self.dao_bounty_for_staker_redeemed_at,
            ),
        ];
        for (kind, amount, redeemed_at) in kinds {
            let Some(amount) = amount else { continue };
            let amount = parse_u256("gpReward amount", &amount)?;
            if amount.is_zero() {
                continue;
            }
            redemption.amounts.insert(kind, amount);
            if let Some(at) = parse_timestamp("gpReward redeemedAt", redeemed_at.as_deref())? {
                redemption.redeemed_at.insert(kind, at);
            }
        }
        Ok(redemption)
    }
}

/// GraphQL client of the DAOstack subgraph.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl SubgraphClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::new_with_endpoint(endpoint, RetryPolicy::default())
    }

    pub fn new_with_endpoint(endpoint: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            retry,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Runs one query, retrying transient failures.
    pub async fn query(&self, query: &str, variables: Value) -> Result<Value, ArcError> {
        with_retry(self.retry, || self.post(query, &variables)).await
    }

    async fn post(&self, query: &str, variables: &Value) -> Result<Value, ArcError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArcError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: GraphQlResponse = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|err| err.message).collect();
            return Err(ArcError::GraphQl(messages.join("; ")));
        }
        body.data
            .ok_or_else(|| ArcError::GraphQl("response carried no data".to_string()))
    }

    /// Fetches every entity of a collection, [`PAGE_SIZE`] at a time.
    #[instrument(skip(self, fields))]
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        entity: &str,
        fields: &str,
    ) -> Result<Vec<T>, ArcError> {
        let query = format!(
            "query Page($first: Int!, $skip: Int!) {{ {entity}(first: $first, skip: $skip) {{ {fields} }} }}"
        );
        let mut items = Vec::new();
        let mut skip = 0;
        loop {
            let data = self
                .query(&query, json!({ "first": PAGE_SIZE, "skip": skip }))
                .await?;
            let page: Vec<T> = serde_json::from_value(field(data, entity))?;
            let len = page.len();
            items.extend(page);
            debug!(entity, skip, len, "Fetched subgraph page");
            if len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }
        Ok(items)
    }

    pub async fn contract_infos(&self) -> Result<Vec<ContractInfo>, ArcError> {
        self.fetch_all("contractInfos", "name address version").await
    }

    pub async fn dao_ids(&self) -> Result<Vec<String>, ArcError> {
        let ids: Vec<IdRef> = self.fetch_all("daos", "id").await?;
        Ok(ids.into_iter().map(|dao| dao.id.to_lowercase()).collect())
    }

    pub async fn proposal(&self, proposal_id: &str) -> Result<Option<Proposal>, ArcError> {
        let query = format!("query Proposal($id: ID!) {{ proposal(id: $id) {{ {PROPOSAL_FIELDS} }} }}");
        let data = self.query(&query, json!({ "id": proposal_id })).await?;
        let record: Option<ProposalRecord> = serde_json::from_value(field(data, "proposal"))?;
        record.map(ProposalRecord::into_proposal).transpose()
    }

    /// Reads the whole indexed state as loader actions.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn load_full_state(&self) -> Result<Vec<Action>, ArcError> {
        let daos: Vec<DaoRecord> = self
            .fetch_all(
                "daos",
                "id name nativeToken { id totalSupply } nativeReputation { id totalSupply }",
            )
            .await?;
        let holders: Vec<ReputationHolderRecord> = self
            .fetch_all("reputationHolders", "address dao { id } balance")
            .await?;
        let votes: Vec<VoteRecord> = self
            .fetch_all("proposalVotes", "proposal { id } voter outcome reputation")
            .await?;
        let stakes: Vec<StakeRecord> = self
            .fetch_all("proposalStakes", "proposal { id } staker outcome amount")
            .await?;
        let proposals: Vec<ProposalRecord> = self.fetch_all("proposals", PROPOSAL_FIELDS).await?;
        let rewards: Vec<RewardRecord> = self
            .fetch_all(
                "gprewards",
                "beneficiary proposal { id } reputationForVoter tokensForStaker daoBountyForStaker reputationForVoterRedeemedAt tokensForStakerRedeemedAt daoBountyForStakerRedeemedAt",
            )
            .await?;

        let mut actions = Vec::new();
        for dao in daos {
            actions.push(Action::DaoLoaded(dao.into_dao()?));
        }
        for holder in holders {
            actions.push(Action::MemberLoaded(Member {
                dao: holder.dao.id.to_lowercase(),
                address: holder.address.to_lowercase(),
                reputation: parse_u256("balance", &holder.balance)?,
            }));
        }
        for vote in votes {
            let Some(outcome) = parse_outcome(&vote.outcome) else {
                continue;
            };
            actions.push(Action::VoteCast(Vote {
                proposal_id: vote.proposal.id.to_lowercase(),
                voter: vote.voter.to_lowercase(),
                outcome,
                reputation: parse_u256("reputation", &vote.reputation)?,
                block: 0,
            }));
        }
        for stake in stakes {
            let Some(outcome) = parse_outcome(&stake.outcome) else {
                continue;
            };
            actions.push(Action::StakeAdded(Stake {
                proposal_id: stake.proposal.id.to_lowercase(),
                staker: stake.staker.to_lowercase(),
                outcome,
                amount: parse_u256("amount", &stake.amount)?,
                block: 0,
            }));
        }
        let mut beneficiary_redemptions = Vec::new();
        for proposal in proposals {
            if let Some(redemption) = proposal.beneficiary_redemption()? {
                beneficiary_redemptions.push(redemption);
            }
            actions.push(Action::ProposalLoaded(proposal.into_proposal()?));
        }
        for reward in rewards {
            actions.push(Action::RedemptionLoaded(reward.into_redemption()?));
        }
        actions.extend(beneficiary_redemptions.into_iter().map(Action::RedemptionLoaded));

        info!(actions = actions.len(), "Loaded full subgraph state");
        Ok(actions)
    }
}
