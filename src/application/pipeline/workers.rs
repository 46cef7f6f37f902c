use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::backoff::SharedBackoff;
use crate::domain::order::Order;
use crate::domain::ports::{AccrualReply, OracleRef};

/// One worker of the accrual pool.
///
/// Workers share the inbound receiver and the backoff deadline. Before each
/// request the deadline is re-checked; a throttled reply pushes it forward
/// for the whole pool. Orders whose status did not change are dropped,
/// failed attempts are dropped too and picked up again by a later poll
/// cycle.
pub(super) async fn run_worker(
    worker: usize,
    oracle: OracleRef,
    jobs: Arc<Mutex<mpsc::Receiver<Order>>>,
    results: mpsc::Sender<Order>,
    backoff: Arc<SharedBackoff>,
    cancel: CancellationToken,
) {
    loop {
        if !wait_out_backoff(worker, &backoff, &cancel).await {
            return;
        }

        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = async { jobs.lock().await.recv().await } => received,
        };
        let Some(mut order) = received else {
            return;
        };

        // The deadline may have moved while this worker was parked in recv.
        if !wait_out_backoff(worker, &backoff, &cancel).await {
            return;
        }

        let reply = match oracle.check(&order.number).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(worker, order = %order.number, %err, "accrual request failed");
                continue;
            }
        };

        match reply {
            AccrualReply::Throttled { retry_after } => {
                warn!(
                    worker,
                    seconds = retry_after.as_secs(),
                    "accrual service rate limit exceeded, backing off"
                );
                backoff.extend(retry_after);
            }
            AccrualReply::Status { status, accrual } => {
                let next = status.as_order_status();
                if next == order.status {
                    continue;
                }
                order.status = next;
                order.accrual = accrual;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = results.send(order) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Sleeps until the shared deadline has passed, re-checking in case another
/// worker extends it. Returns `false` on cancellation.
async fn wait_out_backoff(
    worker: usize,
    backoff: &SharedBackoff,
    cancel: &CancellationToken,
) -> bool {
    while let Some(wait) = backoff.remaining() {
        debug!(worker, ?wait, "waiting out accrual backoff");
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep(wait) => warn!(worker, "resuming work after backoff"),
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::balance::Amount;
    use crate::domain::order::{AccrualStatus, OrderStatus};
    use crate::domain::ports::AccrualOracle;
    use crate::error::AccrualError;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct FixedOracle(AccrualReply);

    #[async_trait]
    impl AccrualOracle for FixedOracle {
        async fn check(&self, _order_number: &str) -> Result<AccrualReply, AccrualError> {
            Ok(self.0.clone())
        }
    }

    fn order(number: &str, status: OrderStatus) -> Order {
        Order {
            id: 1,
            number: number.to_string(),
            user_id: 1,
            status,
            accrual: None,
            uploaded_at: Utc::now(),
        }
    }

    async fn drive(oracle: FixedOracle, input: Order) -> Option<Order> {
        let (jobs_tx, jobs_rx) = mpsc::channel(4);
        let (results_tx, mut results_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        jobs_tx.send(input).await.unwrap();

        let handle = tokio::spawn(run_worker(
            0,
            Arc::new(oracle),
            Arc::new(Mutex::new(jobs_rx)),
            results_tx,
            Arc::new(SharedBackoff::new()),
            cancel.clone(),
        ));

        let forwarded =
            tokio::time::timeout(Duration::from_millis(200), results_rx.recv()).await;
        cancel.cancel();
        handle.await.unwrap();
        forwarded.ok().flatten()
    }

    #[tokio::test]
    async fn test_changed_status_is_merged_and_forwarded() {
        let accrual = Amount::new(dec!(500)).unwrap();
        let forwarded = drive(
            FixedOracle(AccrualReply::Status {
                status: AccrualStatus::Processed,
                accrual: Some(accrual),
            }),
            order("12345678903", OrderStatus::New),
        )
        .await
        .expect("order should be forwarded");

        assert_eq!(forwarded.status, OrderStatus::Processed);
        assert_eq!(forwarded.accrual, Some(accrual));
    }

    #[tokio::test]
    async fn test_identical_status_is_a_noop() {
        // REGISTERED maps onto PROCESSING, so nothing changed here.
        let forwarded = drive(
            FixedOracle(AccrualReply::Status {
                status: AccrualStatus::Registered,
                accrual: None,
            }),
            order("12345678903", OrderStatus::Processing),
        )
        .await;

        assert!(forwarded.is_none());
    }

    #[tokio::test]
    async fn test_throttle_extends_shared_backoff_and_drops_order() {
        let (jobs_tx, jobs_rx) = mpsc::channel(4);
        let (results_tx, mut results_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let backoff = Arc::new(SharedBackoff::new());

        jobs_tx
            .send(order("12345678903", OrderStatus::New))
            .await
            .unwrap();

        let handle = tokio::spawn(run_worker(
            0,
            Arc::new(FixedOracle(AccrualReply::Throttled {
                retry_after: Duration::from_secs(30),
            })),
            Arc::new(Mutex::new(jobs_rx)),
            results_tx,
            backoff.clone(),
            cancel.clone(),
        ));

        let forwarded =
            tokio::time::timeout(Duration::from_millis(100), results_rx.recv()).await;
        assert!(forwarded.is_err(), "throttled order must not be forwarded");
        assert!(backoff.remaining().is_some(), "deadline must be extended");

        cancel.cancel();
        handle.await.unwrap();
    }
}
