use crate::{
    config::{ArcSettings, Network},
    contracts::{
        CONTRIBUTION_REWARD, ContributionReward, Erc20, GEN_TOKEN, GENESIS_PROTOCOL,
        GenesisProtocol, REDEEMER, Redeemer, Reputation,
    },
    errors::{ArcError, classify_rpc_error},
    events::{
        BlockRange, ChainEvent, EventKind, decode_execution_states, decode_log,
        decode_reputation_log, signature,
    },
    operations::{ProposalRequest, TransactionSender},
    source::EventSource,
    subgraph::SubgraphClient,
    wallet::{EnabledWallet, connect_provider},
};
use alchemy_store::{Action, Dao, Proposal, RedemptionKind, VoteOutcome};
use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    network::Ethereum,
    primitives::{Address, B256, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider},
    rpc::types::{Filter, Log, TransactionReceipt},
    sol_types::SolEvent,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, hash_map::Entry},
    str::FromStr,
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

fn parse_address(field: &'static str, value: &str) -> Result<Address, ArcError> {
    Address::from_str(value).map_err(|_| ArcError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn send_error(err: alloy::contract::Error) -> ArcError {
    match classify_rpc_error(&err.to_string()) {
        ArcError::WalletCancelled(message) => ArcError::WalletCancelled(message),
        _ => ArcError::Contract(err),
    }
}

async fn confirm(pending: PendingTransactionBuilder<Ethereum>) -> Result<TransactionReceipt, ArcError> {
    let tx_hash = *pending.tx_hash();
    debug!(%tx_hash, "Waiting for transaction receipt");
    let receipt = pending.get_receipt().await?;
    if !receipt.status() {
        return Err(ArcError::Rpc(format!("transaction {tx_hash} reverted")));
    }
    Ok(receipt)
}

/// Handle on one network: provider, subgraph and the deployed contract set.
pub struct ArcClient {
    settings: ArcSettings,
    provider: DynProvider,
    subgraph: SubgraphClient,
    contracts: HashMap<String, Vec<Address>>,
    dao_ids: Vec<String>,
    account: Option<Address>,
}

impl std::fmt::Debug for ArcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcClient")
            .field("network", &self.settings.network)
            .field("contracts", &self.contracts)
            .field("daos", &self.dao_ids.len())
            .field("account", &self.account)
            .finish()
    }
}

impl ArcClient {
    /// Connects the provider and re-reads contract metadata and the DAO list.
    #[instrument(skip_all, fields(network = %settings.network))]
    pub async fn connect(
        settings: ArcSettings,
        wallet: Option<EnabledWallet>,
    ) -> Result<Self, ArcError> {
        let (provider, account) = match wallet {
            Some(wallet) => (wallet.provider, Some(wallet.address)),
            None => (connect_provider(&settings.web3_provider, None).await?, None),
        };
        let subgraph = SubgraphClient::new(settings.graphql_http_provider.clone());

        let mut contracts: HashMap<String, Vec<Address>> = HashMap::new();
        for info in subgraph.contract_infos().await? {
            let address = parse_address("contract address", &info.address)?;
            contracts.entry(info.name).or_default().push(address);
        }
        let dao_ids = subgraph.dao_ids().await?;

        info!(
            contracts = contracts.len(),
            daos = dao_ids.len(),
            "Arc client connected"
        );

        Ok(Self {
            settings,
            provider,
            subgraph,
            contracts,
            dao_ids,
            account,
        })
    }

    pub fn network(&self) -> Network {
        self.settings.network
    }

    pub fn settings(&self) -> &ArcSettings {
        &self.settings
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    pub fn subgraph(&self) -> &SubgraphClient {
        &self.subgraph
    }

    pub fn dao_ids(&self) -> &[String] {
        &self.dao_ids
    }

    /// Every deployed address of a contract, newest first as listed by the subgraph.
    pub fn contracts(&self, name: &str) -> &[Address] {
        self.contracts.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contract(&self, name: &str) -> Result<Address, ArcError> {
        self.contracts(name)
            .first()
            .copied()
            .ok_or_else(|| ArcError::ContractNotFound(name.to_string()))
    }

    pub fn account(&self) -> Result<Address, ArcError> {
        self.account.ok_or(ArcError::WalletNotEnabled)
    }

    fn emitters(&self, kind: EventKind) -> &[Address] {
        match kind {
            EventKind::Redemption(
                RedemptionKind::BeneficiaryReputation | RedemptionKind::BeneficiaryEth,
            ) => self.contracts(CONTRIBUTION_REWARD),
            _ => self.contracts(GENESIS_PROTOCOL),
        }
    }

    /// Fills in timestamps the node did not put on the logs.
    async fn timestamps(&self, logs: &[Log]) -> Result<HashMap<u64, u64>, ArcError> {
        let mut timestamps = HashMap::new();
        for log in logs {
            if log.block_timestamp.is_some() {
                continue;
            }
            let block = log.block_number.unwrap_or_default();
            if let Entry::Vacant(entry) = timestamps.entry(block) {
                entry.insert(self.block_timestamp(block).await?);
            }
        }
        Ok(timestamps)
    }
}

#[async_trait]
impl EventSource for ArcClient {
    async fn latest_block(&self) -> Result<u64, ArcError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64, ArcError> {
        let found = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block))
            .await?
            .ok_or_else(|| ArcError::Rpc(format!("block {block} not found")))?;
        Ok(found.header.timestamp)
    }

    async fn load_full_state(&self) -> Result<Vec<Action>, ArcError> {
        self.subgraph.load_full_state().await
    }

    async fn proposal_details(&self, proposal_id: &str) -> Result<Option<Proposal>, ArcError> {
        self.subgraph.proposal(proposal_id).await
    }

    #[instrument(skip(self), fields(network = %self.settings.network))]
    async fn events(&self, kind: EventKind, range: BlockRange) -> Result<Vec<ChainEvent>, ArcError> {
        let emitters = self.emitters(kind);
        if emitters.is_empty() || range.is_empty() {
            if emitters.is_empty() {
                warn!(event = kind.name(), "No deployed contract emits this event");
            }
            return Ok(Vec::new());
        }

        let filter = Filter::new()
            .address(emitters.to_vec())
            .from_block(range.from)
            .to_block(range.to);
        let logs = self
            .provider
            .get_logs(&filter.clone().event_signature(signature(kind)))
            .await?;

        let execution_states = if kind == EventKind::Execution && !logs.is_empty() {
            let state_logs = self
                .provider
                .get_logs(&filter.event_signature(GenesisProtocol::GPExecuteProposal::SIGNATURE_HASH))
                .await?;
            decode_execution_states(&state_logs)?
        } else {
            HashMap::new()
        };

        let timestamps = self.timestamps(&logs).await?;
        let events = logs
            .iter()
            .map(|log| {
                let block = log.block_number.unwrap_or_default();
                let timestamp = timestamps.get(&block).copied().unwrap_or_default();
                decode_log(kind, log, timestamp, &execution_states)
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(event = kind.name(), count = events.len(), "Fetched events");
        Ok(events)
    }

    async fn reputation_events(
        &self,
        dao: &Dao,
        range: BlockRange,
    ) -> Result<Vec<ChainEvent>, ArcError> {
        if range.is_empty() || dao.native_reputation.is_empty() {
            return Ok(Vec::new());
        }
        let avatar = parse_address("dao address", &dao.address)?;
        let reputation = parse_address("native reputation", &dao.native_reputation)?;

        let filter = Filter::new()
            .address(reputation)
            .event_signature(vec![
                Reputation::Mint::SIGNATURE_HASH,
                Reputation::Burn::SIGNATURE_HASH,
            ])
            .from_block(range.from)
            .to_block(range.to);
        let logs = self.provider.get_logs(&filter).await?;
        let timestamps = self.timestamps(&logs).await?;

        logs.iter()
            .map(|log| {
                let block = log.block_number.unwrap_or_default();
                let timestamp = timestamps.get(&block).copied().unwrap_or_default();
                decode_reputation_log(avatar, log, timestamp)
            })
            .collect()
    }

    async fn dao_balances(&self, dao: &Dao, block: u64) -> Result<(U256, U256), ArcError> {
        let avatar = parse_address("dao address", &dao.address)?;
        let at = BlockId::number(block);

        let eth = async {
            Ok::<_, ArcError>(self.provider.get_balance(avatar).block_id(at).await?)
        };
        let gen_balance = async {
            match self.contract(GEN_TOKEN) {
                Ok(token) => Ok::<_, ArcError>(Erc20::new(token, &self.provider)
                    .balanceOf(avatar)
                    .block(at)
                    .call()
                    .await?),
                Err(_) => Ok(U256::ZERO),
            }
        };
        futures::try_join!(eth, gen_balance)
    }
}

#[async_trait]
impl TransactionSender for ArcClient {
    async fn vote(&self, proposal_id: B256, outcome: VoteOutcome) -> Result<B256, ArcError> {
        let voter = self.account()?;
        let voting_machine = GenesisProtocol::new(self.contract(GENESIS_PROTOCOL)?, &self.provider);
        let pending = voting_machine
            .vote(proposal_id, U256::from(outcome.as_choice()), U256::ZERO, voter)
            .send()
            .await
            .map_err(send_error)?;
        Ok(confirm(pending).await?.transaction_hash)
    }

    async fn stake(
        &self,
        proposal_id: B256,
        outcome: VoteOutcome,
        amount: U256,
    ) -> Result<B256, ArcError> {
        let staker = self.account()?;
        let voting_machine_address = self.contract(GENESIS_PROTOCOL)?;
        let gen_token = Erc20::new(self.contract(GEN_TOKEN)?, &self.provider);

        let allowance = gen_token
            .allowance(staker, voting_machine_address)
            .call()
            .await?;
        if allowance < amount {
            info!(%staker, %amount, "Approving GEN for staking");
            let pending = gen_token
                .approve(voting_machine_address, amount)
                .send()
                .await
                .map_err(send_error)?;
            confirm(pending).await?;
        }

        let voting_machine = GenesisProtocol::new(voting_machine_address, &self.provider);
        let pending = voting_machine
            .stake(proposal_id, U256::from(outcome.as_choice()), amount)
            .send()
            .await
            .map_err(send_error)?;
        Ok(confirm(pending).await?.transaction_hash)
    }

    async fn execute(&self, proposal_id: B256) -> Result<B256, ArcError> {
        self.account()?;
        let voting_machine = GenesisProtocol::new(self.contract(GENESIS_PROTOCOL)?, &self.provider);
        let pending = voting_machine
            .execute(proposal_id)
            .send()
            .await
            .map_err(send_error)?;
        Ok(confirm(pending).await?.transaction_hash)
    }

    async fn redeem(
        &self,
        proposal_id: B256,
        dao: Address,
        beneficiary: Address,
    ) -> Result<B256, ArcError> {
        self.account()?;
        let redeemer = Redeemer::new(self.contract(REDEEMER)?, &self.provider);
        let pending = redeemer
            .redeem(proposal_id, dao, beneficiary)
            .send()
            .await
            .map_err(send_error)?;
        Ok(confirm(pending).await?.transaction_hash)
    }

    async fn create_proposal(&self, request: &ProposalRequest) -> Result<B256, ArcError> {
        self.account()?;
        let scheme = ContributionReward::new(self.contract(CONTRIBUTION_REWARD)?, &self.provider);
        let pending = scheme
            .proposeContributionReward(
                request.dao,
                request.description_hash.clone(),
                request.reputation_change,
                request.rewards(),
                request.external_token,
                request.beneficiary,
            )
            .send()
            .await
            .map_err(send_error)?;
        let receipt = confirm(pending).await?;

        receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| {
                log.log_decode::<ContributionReward::NewContributionProposal>()
                    .ok()
                    .map(|decoded| decoded.inner.data._proposalId)
            })
            .ok_or_else(|| ArcError::Decode {
                event: "NewContributionProposal",
                reason: format!("no proposal log in {}", receipt.transaction_hash),
            })
    }
}

/// Owns one [`ArcClient`] per network. Constructed by the application root
/// and passed down explicitly.
#[derive(Default)]
pub struct ArcContext {
    clients: RwLock<HashMap<Network, Arc<ArcClient>>>,
}

impl ArcContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)builds the client of `settings.network`. Failures are logged and
    /// reported as `false`; the previous handle stays in place.
    pub async fn initialize_arc(&self, settings: ArcSettings, wallet: Option<EnabledWallet>) -> bool {
        let network = settings.network;
        match ArcClient::connect(settings, wallet).await {
            Ok(client) => {
                self.clients.write().await.insert(network, Arc::new(client));
                true
            }
            Err(err) => {
                error!(%network, error = %err, "Failed to initialize arc");
                false
            }
        }
    }

    pub async fn arc(&self, network: Network) -> Result<Arc<ArcClient>, ArcError> {
        self.clients
            .read()
            .await
            .get(&network)
            .cloned()
            .ok_or_else(|| ArcError::NotInitialized(network.to_string()))
    }

    pub async fn shutdown(&self) {
        let mut clients = self.clients.write().await;
        info!(clients = clients.len(), "Dropping arc clients");
        clients.clear();
    }
}
