use crate::{
    coordinator::{Coordinator, LeaseToken},
    errors::WorkerError,
};
use alchemy_arc::{BlockRange, ChainEvent, EventKind, EventSource, Network};
use alchemy_store::{
    Action, Dao, Proposal, Store, StoreError,
    snapshot::{read_snapshot, snapshot_path, write_snapshot},
};
use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub network: Network,
    pub cache_dir: PathBuf,
    pub lock_ttl: Duration,
}

/// Explicit `[startBlock] [endBlock]` from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOverride {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub action: &'static str,
    pub proposal_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub from: u64,
    pub to: u64,
    pub full_scan: bool,
    pub dispatched: Vec<Dispatched>,
}

impl PassReport {
    fn dispatch(&mut self, store: &mut Store, action: Action) {
        self.dispatched.push(Dispatched {
            action: action.name(),
            proposal_id: action.proposal_id().map(str::to_string),
        });
        store.dispatch(action);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another worker holds the lease.
    Skipped,
    Completed(PassReport),
}

pub struct CacheWorker {
    source: Arc<dyn EventSource>,
    coordinator: Arc<dyn Coordinator>,
    config: WorkerConfig,
    held: Mutex<Option<LeaseToken>>,
}

impl CacheWorker {
    pub fn new(
        source: Arc<dyn EventSource>,
        coordinator: Arc<dyn Coordinator>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            coordinator,
            config,
            held: Mutex::new(None),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        snapshot_path(&self.config.cache_dir, self.config.network.as_str())
    }

    /// Runs one cache pass under the network's lease. The lease is released
    /// on every path out of the pass.
    #[instrument(skip_all, fields(network = %self.config.network))]
    pub async fn update_cache(&self, overrides: RangeOverride) -> Result<PassOutcome, WorkerError> {
        let Some(token) = self.coordinator.try_lock(self.config.lock_ttl).await? else {
            info!("Cache update already running elsewhere, skipping");
            return Ok(PassOutcome::Skipped);
        };
        *self.held.lock().await = Some(token.clone());

        let (lost_sender, mut lost) = watch::channel(false);
        let renewal = self.spawn_renewal(token.clone(), lost_sender);

        let result = tokio::select! {
            result = self.run_pass(overrides) => result,
            true = async { lost.wait_for(|lost| *lost).await.is_ok() } => Err(WorkerError::LeaseLost),
        };

        renewal.abort();
        self.release_held_lease().await;

        match &result {
            Ok(report) => info!(
                from_block = report.from,
                to_block = report.to,
                full_scan = report.full_scan,
                actions = report.dispatched.len(),
                "Cache pass completed"
            ),
            Err(err) => error!(error = %err, "Cache pass failed"),
        }
        result.map(PassOutcome::Completed)
    }

    /// Releases the lease of a pass that is still running, if any.
    pub async fn release_held_lease(&self) {
        let Some(token) = self.held.lock().await.take() else {
            return;
        };
        if let Err(err) = self.coordinator.unlock(&token).await {
            warn!(error = %err, lease = %token, "Failed to release cache lease");
        }
    }

    fn spawn_renewal(&self, token: LeaseToken, lost: watch::Sender<bool>) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        let ttl = self.config.lock_ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ttl / 3);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match coordinator.renew_lock(&token, ttl).await {
                    Ok(true) => debug!("Cache lease renewed"),
                    Ok(false) => {
                        error!(lease = %token, "Cache lease lost");
                        lost.send_replace(true);
                        break;
                    }
                    Err(err) => {
                        error!(error = %err, lease = %token, "Failed to renew cache lease");
                        lost.send_replace(true);
                        break;
                    }
                }
            }
        })
    }

    async fn run_pass(&self, overrides: RangeOverride) -> Result<PassReport, WorkerError> {
        let cursor = match overrides.start {
            Some(start) => start,
            None => self.coordinator.last_cached_block().await?,
        };
        let latest = match overrides.end {
            Some(end) => end,
            None => self.source.latest_block().await?,
        };
        let path = self.snapshot_path();

        let mut report = PassReport {
            from: cursor,
            to: latest,
            full_scan: cursor == 0,
            dispatched: Vec::new(),
        };

        let mut store = if cursor == 0 {
            self.full_scan(&mut report).await?
        } else {
            match read_snapshot(&path).await {
                Ok(mut store) => {
                    if overrides.start.is_none() && store.last_block > cursor {
                        report.from = store.last_block;
                    }
                    let range = BlockRange::after(report.from, latest);
                    // Mint/burn deltas already in the snapshot must not be folded again.
                    let reputation_range =
                        BlockRange::after(report.from.max(store.last_block), latest);
                    info!(from_block = range.from, to_block = range.to, "Replaying events");
                    self.replay(&mut store, range, &mut report).await?;
                    self.replay_reputation(&mut store, reputation_range, &mut report)
                        .await?;
                    store
                }
                Err(StoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    warn!(path = %path.display(), "Snapshot missing, falling back to a full scan");
                    report.from = 0;
                    report.full_scan = true;
                    self.full_scan(&mut report).await?
                }
                Err(err) => return Err(err.into()),
            }
        };

        self.refresh(&mut store, latest, &mut report).await?;
        store.last_block = latest;

        write_snapshot(&path, &store).await?;
        self.coordinator.set_last_cached_block(latest).await?;
        Ok(report)
    }

    async fn full_scan(&self, report: &mut PassReport) -> Result<Store, WorkerError> {
        info!(to_block = report.to, "Running full scan");
        let mut store = Store::new();
        for action in self.source.load_full_state().await? {
            report.dispatch(&mut store, action);
        }
        Ok(store)
    }

    /// Folds `(from, to]` in causal order: executions land before any
    /// redemption of the same proposal.
    async fn replay(
        &self,
        store: &mut Store,
        range: BlockRange,
        report: &mut PassReport,
    ) -> Result<(), WorkerError> {
        if range.is_empty() {
            debug!("Nothing to replay");
            return Ok(());
        }

        for kind in EventKind::REPLAY_ORDER {
            let events = self.source.events(kind, range).await?;
            debug!(event = kind.name(), count = events.len(), "Replaying event kind");
            for event in events {
                let action = match event {
                    ChainEvent::ProposalCreated(created) => {
                        Some(self.created_proposal(created.into_proposal()).await?)
                    }
                    other => other.into_action(),
                };
                if let Some(action) = action {
                    report.dispatch(store, action);
                }
            }
        }
        Ok(())
    }

    async fn replay_reputation(
        &self,
        store: &mut Store,
        range: BlockRange,
        report: &mut PassReport,
    ) -> Result<(), WorkerError> {
        if range.is_empty() {
            debug!("Reputation already folded up to the snapshot");
            return Ok(());
        }

        let daos: Vec<Dao> = store.daos.values().cloned().collect();
        for dao in &daos {
            for event in self.source.reputation_events(dao, range).await? {
                if let Some(action) = event.into_action() {
                    report.dispatch(store, action);
                }
            }
        }
        Ok(())
    }

    /// New proposals take their metadata from what the subgraph already
    /// indexed. Tallies are left to the replayed votes and stakes.
    async fn created_proposal(&self, created: Proposal) -> Result<Action, WorkerError> {
        let action = match self.source.proposal_details(&created.id).await? {
            Some(details) => Action::ProposalCreated(Proposal {
                scheme: details.scheme,
                title: details.title,
                description_hash: details.description_hash,
                stage: details.stage,
                pre_boosted_at: details.pre_boosted_at,
                boosted_at: details.boosted_at,
                quiet_ending_at: details.quiet_ending_at,
                queued_vote_period_limit: details.queued_vote_period_limit,
                pre_boosted_vote_period_limit: details.pre_boosted_vote_period_limit,
                boosted_vote_period_limit: details.boosted_vote_period_limit,
                reward: details.reward.or(created.reward),
                ..created
            }),
            None => Action::ProposalCreated(created),
        };
        Ok(action)
    }

    /// DAO balances at `latest`, then time-driven stage changes.
    async fn refresh(
        &self,
        store: &mut Store,
        latest: u64,
        report: &mut PassReport,
    ) -> Result<(), WorkerError> {
        let daos: Vec<Dao> = store.daos.values().cloned().collect();
        for dao in &daos {
            let (eth_balance, gen_balance) = self.source.dao_balances(dao, latest).await?;
            report.dispatch(
                store,
                Action::DaoBalancesUpdated {
                    dao: dao.address.clone(),
                    eth_balance,
                    gen_balance,
                },
            );
        }

        let now = self.source.block_timestamp(latest).await?;
        for action in store.expired_proposals(now) {
            report.dispatch(store, action);
        }
        Ok(())
    }
}
