//! User intents. Every creator records a `Pending` operation, sends the
//! transaction through a [`TransactionSender`] and records exactly one
//! terminal `Success` or `Failure`. Failed intents are never retried.

use crate::errors::ArcError;
use alchemy_store::{Action, AsyncActionSequence, IntentKind, Operation, Store, VoteOutcome};
use alloy::primitives::{Address, B256, I256, U256};
use async_trait::async_trait;
use std::{
    future::Future,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{info, warn};

static NEXT_OPERATION: AtomicU64 = AtomicU64::new(1);

/// A contribution reward proposal as submitted to the scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRequest {
    pub dao: Address,
    pub description_hash: String,
    pub beneficiary: Address,
    pub reputation_change: I256,
    pub native_token_reward: U256,
    pub eth_reward: U256,
    pub external_token_reward: U256,
    pub external_token: Address,
    pub period_length: U256,
    pub number_of_periods: U256,
}

impl ProposalRequest {
    /// Reward vector in the order the scheme expects.
    pub fn rewards(&self) -> [U256; 5] {
        [
            self.native_token_reward,
            self.eth_reward,
            self.external_token_reward,
            self.period_length,
            self.number_of_periods,
        ]
    }
}

/// Write side of the chain adapter.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    async fn vote(&self, proposal_id: B256, outcome: VoteOutcome) -> Result<B256, ArcError>;

    /// Approves GEN for the voting machine first when the allowance is short.
    async fn stake(
        &self,
        proposal_id: B256,
        outcome: VoteOutcome,
        amount: U256,
    ) -> Result<B256, ArcError>;

    async fn execute(&self, proposal_id: B256) -> Result<B256, ArcError>;

    async fn redeem(
        &self,
        proposal_id: B256,
        dao: Address,
        beneficiary: Address,
    ) -> Result<B256, ArcError>;

    /// Returns the id of the new proposal.
    async fn create_proposal(&self, request: &ProposalRequest) -> Result<B256, ArcError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentResult<T> {
    pub operation_id: String,
    pub sequence: AsyncActionSequence,
    pub value: Option<T>,
    pub message: Option<String>,
}

impl<T> IntentResult<T> {
    pub fn is_success(&self) -> bool {
        self.sequence == AsyncActionSequence::Success
    }
}

fn next_operation_id(intent: IntentKind) -> String {
    let sequence = NEXT_OPERATION.fetch_add(1, Ordering::Relaxed);
    format!("{intent:?}-{sequence}").to_lowercase()
}

fn parse_proposal_id(value: &str) -> Result<B256, ArcError> {
    B256::from_str(value).map_err(|_| ArcError::InvalidValue {
        field: "proposal id",
        value: value.to_string(),
    })
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ArcError> {
    Address::from_str(value).map_err(|_| ArcError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

async fn run_intent<T, F>(store: &mut Store, intent: IntentKind, send: F) -> IntentResult<T>
where
    F: Future<Output = Result<T, ArcError>>,
{
    let operation_id = next_operation_id(intent);
    store.dispatch(Action::Operation(Operation {
        id: operation_id.clone(),
        intent,
        sequence: AsyncActionSequence::Pending,
        message: None,
    }));

    let (sequence, value, message) = match send.await {
        Ok(value) => {
            info!(operation_id = %operation_id, ?intent, "Operation succeeded");
            (AsyncActionSequence::Success, Some(value), None)
        }
        Err(err) => {
            warn!(operation_id = %operation_id, ?intent, error = %err, "Operation failed");
            (AsyncActionSequence::Failure, None, Some(err.to_string()))
        }
    };

    store.dispatch(Action::Operation(Operation {
        id: operation_id.clone(),
        intent,
        sequence,
        message: message.clone(),
    }));

    IntentResult {
        operation_id,
        sequence,
        value,
        message,
    }
}

pub async fn vote_on_proposal(
    sender: &dyn TransactionSender,
    store: &mut Store,
    proposal_id: &str,
    outcome: VoteOutcome,
) -> IntentResult<B256> {
    run_intent(store, IntentKind::Vote, async {
        let proposal_id = parse_proposal_id(proposal_id)?;
        sender.vote(proposal_id, outcome).await
    })
    .await
}

pub async fn stake_proposal(
    sender: &dyn TransactionSender,
    store: &mut Store,
    proposal_id: &str,
    outcome: VoteOutcome,
    amount: U256,
) -> IntentResult<B256> {
    run_intent(store, IntentKind::Stake, async {
        let proposal_id = parse_proposal_id(proposal_id)?;
        if amount.is_zero() {
            return Err(ArcError::InvalidValue {
                field: "stake amount",
                value: amount.to_string(),
            });
        }
        sender.stake(proposal_id, outcome, amount).await
    })
    .await
}

pub async fn execute_proposal(
    sender: &dyn TransactionSender,
    store: &mut Store,
    proposal_id: &str,
) -> IntentResult<B256> {
    run_intent(store, IntentKind::Execute, async {
        let proposal_id = parse_proposal_id(proposal_id)?;
        sender.execute(proposal_id).await
    })
    .await
}

pub async fn redeem_proposal(
    sender: &dyn TransactionSender,
    store: &mut Store,
    proposal_id: &str,
    dao: &str,
    beneficiary: &str,
) -> IntentResult<B256> {
    run_intent(store, IntentKind::Redeem, async {
        let proposal_id = parse_proposal_id(proposal_id)?;
        let dao = parse_address("dao", dao)?;
        let beneficiary = parse_address("beneficiary", beneficiary)?;
        sender.redeem(proposal_id, dao, beneficiary).await
    })
    .await
}

pub async fn create_proposal(
    sender: &dyn TransactionSender,
    store: &mut Store,
    request: &ProposalRequest,
) -> IntentResult<B256> {
    run_intent(store, IntentKind::CreateProposal, async {
        sender.create_proposal(request).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify_rpc_error;
    use std::sync::Mutex;

    const PROPOSAL: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[derive(Default)]
    struct FakeSender {
        calls: Mutex<Vec<&'static str>>,
        failure: Option<&'static str>,
    }

    impl FakeSender {
        fn failing(message: &'static str) -> Self {
            Self {
                failure: Some(message),
                ..Default::default()
            }
        }

        fn record(&self, call: &'static str) -> Result<B256, ArcError> {
            self.calls.lock().unwrap().push(call);
            match self.failure {
                Some(message) => Err(classify_rpc_error(message)),
                None => Ok(B256::repeat_byte(0xaa)),
            }
        }
    }

    #[async_trait]
    impl TransactionSender for FakeSender {
        async fn vote(&self, _: B256, _: VoteOutcome) -> Result<B256, ArcError> {
            self.record("vote")
        }

        async fn stake(&self, _: B256, _: VoteOutcome, _: U256) -> Result<B256, ArcError> {
            self.record("stake")
        }

        async fn execute(&self, _: B256) -> Result<B256, ArcError> {
            self.record("execute")
        }

        async fn redeem(&self, _: B256, _: Address, _: Address) -> Result<B256, ArcError> {
            self.record("redeem")
        }

        async fn create_proposal(&self, _: &ProposalRequest) -> Result<B256, ArcError> {
            self.record("create_proposal")
        }
    }

    fn terminal_operations(store: &Store) -> usize {
        store
            .operations
            .values()
            .filter(|operation| operation.sequence.is_terminal())
            .count()
    }

    #[tokio::test]
    async fn successful_vote_ends_in_success() {
        let sender = FakeSender::default();
        let mut store = Store::new();

        let result = vote_on_proposal(&sender, &mut store, PROPOSAL, VoteOutcome::Yes).await;

        assert!(result.is_success());
        assert_eq!(result.value, Some(B256::repeat_byte(0xaa)));
        let operation = &store.operations[&result.operation_id];
        assert_eq!(operation.sequence, AsyncActionSequence::Success);
        assert_eq!(operation.intent, IntentKind::Vote);
        assert_eq!(*sender.calls.lock().unwrap(), ["vote"]);
    }

    #[tokio::test]
    async fn rejected_transaction_keeps_the_message() {
        let sender = FakeSender::failing("User denied transaction signature");
        let mut store = Store::new();

        let result = execute_proposal(&sender, &mut store, PROPOSAL).await;

        assert_eq!(result.sequence, AsyncActionSequence::Failure);
        assert_eq!(result.value, None);
        let operation = &store.operations[&result.operation_id];
        assert_eq!(operation.sequence, AsyncActionSequence::Failure);
        assert!(
            operation
                .message
                .as_deref()
                .is_some_and(|message| message.contains("User denied"))
        );
        assert_eq!(sender.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_input_fails_without_sending() {
        let sender = FakeSender::default();
        let mut store = Store::new();

        let vote = vote_on_proposal(&sender, &mut store, "P1", VoteOutcome::No).await;
        let stake =
            stake_proposal(&sender, &mut store, PROPOSAL, VoteOutcome::Yes, U256::ZERO).await;
        let redeem = redeem_proposal(&sender, &mut store, PROPOSAL, "0xnope", "0xnope").await;

        for result in [&vote, &stake, &redeem] {
            assert_eq!(result.sequence, AsyncActionSequence::Failure);
        }
        assert!(sender.calls.lock().unwrap().is_empty());
        assert_eq!(terminal_operations(&store), 3);
    }

    #[tokio::test]
    async fn every_intent_ends_in_exactly_one_terminal_state() {
        let sender = FakeSender::default();
        let mut store = Store::new();
        let dao = "0x2222222222222222222222222222222222222222";
        let request = ProposalRequest {
            dao: Address::repeat_byte(0x22),
            description_hash: "QmHash".to_string(),
            beneficiary: Address::repeat_byte(0x33),
            reputation_change: I256::ZERO,
            native_token_reward: U256::ZERO,
            eth_reward: U256::from(10),
            external_token_reward: U256::ZERO,
            external_token: Address::ZERO,
            period_length: U256::ZERO,
            number_of_periods: U256::from(1),
        };

        let results = [
            vote_on_proposal(&sender, &mut store, PROPOSAL, VoteOutcome::Yes).await,
            stake_proposal(&sender, &mut store, PROPOSAL, VoteOutcome::No, U256::from(5)).await,
            execute_proposal(&sender, &mut store, PROPOSAL).await,
            redeem_proposal(&sender, &mut store, PROPOSAL, dao, dao).await,
            create_proposal(&sender, &mut store, &request).await,
        ];

        assert!(results.iter().all(IntentResult::is_success));
        assert_eq!(store.operations.len(), results.len());
        assert_eq!(terminal_operations(&store), results.len());
        assert_eq!(
            *sender.calls.lock().unwrap(),
            ["vote", "stake", "execute", "redeem", "create_proposal"]
        );
    }

    #[test]
    fn rewards_follow_scheme_order() {
        let request = ProposalRequest {
            dao: Address::ZERO,
            description_hash: String::new(),
            beneficiary: Address::ZERO,
            reputation_change: I256::ZERO,
            native_token_reward: U256::from(1),
            eth_reward: U256::from(2),
            external_token_reward: U256::from(3),
            external_token: Address::ZERO,
            period_length: U256::from(4),
            number_of_periods: U256::from(5),
        };
        assert_eq!(request.rewards(), [1, 2, 3, 4, 5].map(U256::from));
    }
}
