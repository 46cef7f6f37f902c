use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::order::Order;
use crate::domain::ports::LedgerRef;

/// Polls the ledger for pending orders and feeds them into the pipeline.
///
/// The queue's finite capacity is the backpressure mechanism: when the
/// worker pool falls behind, the send blocks and polling throttles itself.
/// A failed poll is logged and retried on the next tick.
pub(super) async fn run_extractor(
    ledger: LedgerRef,
    queue: mpsc::Sender<Order>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(poll_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("order extractor stopped");
                return;
            }
            _ = ticker.tick() => {
                let orders = match ledger.pending_orders().await {
                    Ok(orders) => orders,
                    Err(err) => {
                        error!(%err, "failed to fetch pending orders");
                        continue;
                    }
                };

                if !orders.is_empty() {
                    debug!(count = orders.len(), "queueing pending orders");
                }

                for order in orders {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("order extractor stopped");
                            return;
                        }
                        sent = queue.send(order) => {
                            if sent.is_err() {
                                // Receiver side is gone, nothing left to feed.
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
