use crate::{Cli, Command, ProposeArgs, WalletArgs};
use alchemy_arc::{
    ArcClient, ArcContext, ArcSettings, IntentResult, LocalStorage, ProposalRequest, RetryPolicy,
    Subscription, SubscriptionState, TransactionSender,
    events::{hex_address, hex_id},
    operations::{
        create_proposal, execute_proposal, redeem_proposal, stake_proposal, vote_on_proposal,
    },
    wallet::{enable_wallet_provider, forget_wallet},
};
use alchemy_store::{Proposal, Store};
use alloy::primitives::{Address, B256};
use anyhow::{Context, Result, bail};
use std::{process::ExitCode, sync::Arc, time::Duration};
use tracing::info;
use utils::errors::{ARC_NOT_INITIALIZED, PROPOSAL_NOT_FOUND_ERROR, WALLET_NOT_ENABLED};

pub async fn run(cli: Cli, storage: LocalStorage) -> Result<ExitCode> {
    let settings = ArcSettings::from_lookup(cli.network, |key| match (key, &cli.eth_provider) {
        ("ARC_WEB3PROVIDER", Some(provider)) => Some(provider.clone()),
        _ => std::env::var(key).ok(),
    })?;
    let context = ArcContext::new();

    let code = match cli.command {
        Command::Connect => {
            let selection = cli.wallet.selection().context(WALLET_NOT_ENABLED)?;
            let wallet =
                enable_wallet_provider(&selection, &settings, &storage, cli.wallet.timeout())
                    .await?;
            println!(
                "connected {} on {} (chain {})",
                hex_address(&wallet.address),
                settings.network,
                wallet.chain_id
            );
            ExitCode::SUCCESS
        }
        Command::Disconnect => {
            forget_wallet(&storage).await?;
            println!("disconnected");
            ExitCode::SUCCESS
        }
        Command::Daos => {
            let client = read_only(&context, settings).await?;
            for dao in client.dao_ids() {
                println!("{dao}");
            }
            ExitCode::SUCCESS
        }
        Command::WatchProposal {
            proposal_id,
            interval_secs,
        } => {
            let client = read_only(&context, settings).await?;
            watch_proposal(client, proposal_id, Duration::from_secs(interval_secs.max(1))).await?;
            ExitCode::SUCCESS
        }
        command => {
            let client = with_wallet(&context, settings, &cli.wallet, &storage).await?;
            send(&*client, command, client.account()?).await
        }
    };

    context.shutdown().await;
    Ok(code)
}

async fn read_only(context: &ArcContext, settings: ArcSettings) -> Result<Arc<ArcClient>> {
    let network = settings.network;
    if !context.initialize_arc(settings, None).await {
        bail!(ARC_NOT_INITIALIZED);
    }
    Ok(context.arc(network).await?)
}

async fn with_wallet(
    context: &ArcContext,
    settings: ArcSettings,
    wallet: &WalletArgs,
    storage: &LocalStorage,
) -> Result<Arc<ArcClient>> {
    let selection = wallet.selection().context(WALLET_NOT_ENABLED)?;
    let enabled = enable_wallet_provider(&selection, &settings, storage, wallet.timeout()).await?;
    let network = settings.network;
    if !context.initialize_arc(settings, Some(enabled)).await {
        bail!(ARC_NOT_INITIALIZED);
    }
    Ok(context.arc(network).await?)
}

fn proposal_request(args: ProposeArgs) -> ProposalRequest {
    ProposalRequest {
        dao: args.dao,
        description_hash: args.description_hash,
        beneficiary: args.beneficiary,
        reputation_change: args.reputation_change,
        native_token_reward: args.native_token_reward,
        eth_reward: args.eth_reward,
        external_token_reward: args.external_token_reward,
        external_token: args.external_token,
        period_length: args.period_length,
        number_of_periods: args.number_of_periods,
    }
}

/// Runs one user intent and prints its terminal state.
async fn send(
    sender: &dyn TransactionSender,
    command: Command,
    account: Address,
) -> ExitCode {
    let mut store = Store::new();
    let (result, label) = match command {
        Command::Vote {
            proposal_id,
            choice,
        } => (
            vote_on_proposal(sender, &mut store, &proposal_id, choice.into()).await,
            "transaction",
        ),
        Command::Stake {
            proposal_id,
            choice,
            amount,
        } => (
            stake_proposal(sender, &mut store, &proposal_id, choice.into(), amount).await,
            "transaction",
        ),
        Command::Execute { proposal_id } => (
            execute_proposal(sender, &mut store, &proposal_id).await,
            "transaction",
        ),
        Command::Redeem {
            proposal_id,
            dao,
            beneficiary,
        } => {
            let beneficiary = beneficiary.unwrap_or_else(|| hex_address(&account));
            (
                redeem_proposal(sender, &mut store, &proposal_id, &dao, &beneficiary).await,
                "transaction",
            )
        }
        Command::Propose(args) => (
            create_proposal(sender, &mut store, &proposal_request(args)).await,
            "proposal",
        ),
        Command::Connect | Command::Disconnect | Command::Daos | Command::WatchProposal { .. } => {
            return ExitCode::SUCCESS;
        }
    };
    report(&result, label)
}

fn report(result: &IntentResult<B256>, label: &str) -> ExitCode {
    println!("{} {:?}", result.operation_id, result.sequence);
    if let Some(value) = &result.value {
        println!("{label} {}", hex_id(value));
    }
    if let Some(message) = &result.message {
        eprintln!("{message}");
    }
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn describe(proposal: &Proposal) -> String {
    format!(
        "{} {:?} for={} against={} staked_for={} staked_against={}",
        proposal.id,
        proposal.stage,
        proposal.votes_for,
        proposal.votes_against,
        proposal.stakes_for,
        proposal.stakes_against
    )
}

async fn watch_proposal(client: Arc<ArcClient>, proposal_id: String, interval: Duration) -> Result<()> {
    let mut subscription = Subscription::spawn(interval, RetryPolicy::default(), move || {
        let client = client.clone();
        let proposal_id = proposal_id.clone();
        async move { client.subgraph().proposal(&proposal_id).await }
    });
    info!(interval_secs = interval.as_secs(), "Watching proposal");

    loop {
        tokio::select! {
            state = subscription.changed() => match state {
                Some(SubscriptionState::Ready(Some(proposal))) => println!("{}", describe(&proposal)),
                Some(SubscriptionState::Ready(None)) => println!("{PROPOSAL_NOT_FOUND_ERROR}"),
                Some(SubscriptionState::Failed(message)) => eprintln!("{message}"),
                Some(SubscriptionState::Loading) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    subscription.unsubscribe();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_store::{AsyncActionSequence, VoteOutcome};
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        redeemed: Mutex<Vec<(Address, Address)>>,
    }

    #[async_trait]
    impl TransactionSender for RecordingSender {
        async fn vote(&self, _: B256, _: VoteOutcome) -> Result<B256, alchemy_arc::ArcError> {
            Ok(B256::repeat_byte(1))
        }

        async fn stake(
            &self,
            _: B256,
            _: VoteOutcome,
            _: U256,
        ) -> Result<B256, alchemy_arc::ArcError> {
            Err(alchemy_arc::ArcError::Rpc("execution reverted".to_string()))
        }

        async fn execute(&self, _: B256) -> Result<B256, alchemy_arc::ArcError> {
            Ok(B256::repeat_byte(2))
        }

        async fn redeem(
            &self,
            _: B256,
            dao: Address,
            beneficiary: Address,
        ) -> Result<B256, alchemy_arc::ArcError> {
            self.redeemed.lock().unwrap().push((dao, beneficiary));
            Ok(B256::repeat_byte(3))
        }

        async fn create_proposal(
            &self,
            _: &ProposalRequest,
        ) -> Result<B256, alchemy_arc::ArcError> {
            Ok(B256::repeat_byte(4))
        }
    }

    const PROPOSAL: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[tokio::test]
    async fn redeem_defaults_to_the_connected_account() {
        let sender = RecordingSender::default();
        let account = Address::repeat_byte(0x44);
        let dao = Address::repeat_byte(0x22);

        let code = send(
            &sender,
            Command::Redeem {
                proposal_id: PROPOSAL.to_string(),
                dao: hex_address(&dao),
                beneficiary: None,
            },
            account,
        )
        .await;

        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(*sender.redeemed.lock().unwrap(), [(dao, account)]);
    }

    #[tokio::test]
    async fn failed_intent_exits_non_zero() {
        let code = send(
            &RecordingSender::default(),
            Command::Stake {
                proposal_id: PROPOSAL.to_string(),
                choice: crate::Choice::Yes,
                amount: U256::from(500),
            },
            Address::ZERO,
        )
        .await;

        assert_eq!(code, ExitCode::FAILURE);
    }

    #[test]
    fn report_reflects_the_terminal_sequence() {
        let success = IntentResult {
            operation_id: "vote-1".to_string(),
            sequence: AsyncActionSequence::Success,
            value: Some(B256::repeat_byte(1)),
            message: None,
        };
        let failure = IntentResult::<B256> {
            operation_id: "vote-2".to_string(),
            sequence: AsyncActionSequence::Failure,
            value: None,
            message: Some("User denied transaction signature".to_string()),
        };
        assert_eq!(report(&success, "transaction"), ExitCode::SUCCESS);
        assert_eq!(report(&failure, "transaction"), ExitCode::FAILURE);
    }

    #[test]
    fn proposal_summary_names_stage_and_tallies() {
        let proposal = Proposal {
            votes_for: U256::from(3),
            ..Proposal::shadow("0x11", "0x22")
        };
        let summary = describe(&proposal);
        assert!(summary.starts_with("0x11 Queued"));
        assert!(summary.contains("for=3"));
    }
}
