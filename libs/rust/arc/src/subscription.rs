use crate::errors::ArcError;
use std::{future::Future, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tokio_retry::{RetryIf, strategy::FixedInterval};
use tracing::{debug, warn};

/// Fixed-interval retry of transient query errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error or
/// the policy runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: F) -> Result<T, ArcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ArcError>>,
{
    let strategy = FixedInterval::new(policy.delay).take(policy.attempts.saturating_sub(1));
    RetryIf::spawn(strategy, operation, |err: &ArcError| {
        let transient = err.is_transient();
        if transient {
            warn!(error = %err, "Transient query error, retrying");
        }
        transient
    })
    .await
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

/// A query re-evaluated on an interval. Receivers see the latest value; the
/// polling task stops when the subscription is dropped.
pub struct Subscription<T> {
    receiver: watch::Receiver<SubscriptionState<T>>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn spawn<F, Fut>(interval: Duration, retry: RetryPolicy, query: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ArcError>> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(SubscriptionState::Loading);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let state = match with_retry(retry, &query).await {
                    Ok(value) => SubscriptionState::Ready(value),
                    Err(err) => SubscriptionState::Failed(err.to_string()),
                };
                let changed = sender.send_if_modified(|current| {
                    if *current == state {
                        false
                    } else {
                        *current = state;
                        true
                    }
                });
                if changed {
                    debug!("Subscription value changed");
                }
                if sender.is_closed() {
                    break;
                }
            }
        });

        Self { receiver, task }
    }

    pub fn current(&self) -> SubscriptionState<T> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next change of value.
    pub async fn changed(&mut self) -> Option<SubscriptionState<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn unavailable() -> ArcError {
        ArcError::HttpStatus {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(RetryPolicy::new(10, Duration::from_millis(1)), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(unavailable())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn gives_up_after_ten_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(RetryPolicy::new(10, Duration::from_millis(1)), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ArcError::GraphQl("Cannot query field".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ArcError::GraphQl(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscription_publishes_values() {
        let counter = Arc::new(AtomicUsize::new(0));
        let polled = counter.clone();
        let mut subscription = Subscription::spawn(
            Duration::from_millis(5),
            RetryPolicy::new(1, Duration::from_millis(1)),
            move || {
                let value = polled.fetch_add(1, Ordering::SeqCst);
                async move { Ok(value) }
            },
        );

        let SubscriptionState::Ready(first) = subscription.changed().await.unwrap() else {
            panic!("expected a value");
        };
        let SubscriptionState::Ready(second) = subscription.changed().await.unwrap() else {
            panic!("expected a value");
        };
        assert!(second > first);
        assert!(matches!(subscription.current(), SubscriptionState::Ready(latest) if latest >= second));

        subscription.unsubscribe();
        let after_drop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(counter.load(Ordering::SeqCst) <= after_drop + 1);
    }
}
