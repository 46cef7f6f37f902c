use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::order::Order;
use crate::domain::ports::LedgerRef;

/// Single consumer draining the processed-order queue into the ledger.
///
/// The status write and the balance credit are one ledger transaction, so a
/// failure here leaves the order fully unsettled and it comes back on a
/// later poll cycle.
pub(super) async fn run_updater(
    ledger: LedgerRef,
    mut results: mpsc::Receiver<Order>,
    cancel: CancellationToken,
) {
    loop {
        let order = tokio::select! {
            _ = cancel.cancelled() => {
                info!("order updater stopped");
                return;
            }
            received = results.recv() => match received {
                Some(order) => order,
                None => return,
            },
        };

        match ledger
            .settle_accrual(order.id, order.status, order.accrual)
            .await
        {
            Ok(()) => info!(
                order = %order.number,
                status = ?order.status,
                "order settled"
            ),
            Err(err) => error!(
                order = %order.number,
                %err,
                "failed to settle order, will be retried by a later cycle"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::balance::Amount;
    use crate::domain::order::OrderStatus;
    use crate::domain::ports::Ledger;
    use crate::infrastructure::in_memory::InMemoryLedger;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_failure_does_not_stop_the_loop() {
        let ledger = InMemoryLedger::new();
        let user = ledger.create_user("alice", "hash").await.unwrap();
        ledger.create_order("12345678903", user).await.unwrap();
        let real = ledger.pending_orders().await.unwrap().remove(0);

        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let ledger = Arc::new(ledger);
        let handle = tokio::spawn(run_updater(ledger.clone(), rx, cancel.clone()));

        // An order the ledger has never seen fails to settle.
        let ghost = Order {
            id: 999,
            number: "9278923470".to_string(),
            user_id: user,
            status: OrderStatus::Processed,
            accrual: Some(Amount::new(dec!(10)).unwrap()),
            uploaded_at: Utc::now(),
        };
        tx.send(ghost).await.unwrap();

        let mut settled = real.clone();
        settled.status = OrderStatus::Processed;
        settled.accrual = Some(Amount::new(dec!(500)).unwrap());
        tx.send(settled).await.unwrap();

        // The second message still lands despite the first one failing.
        for _ in 0..50 {
            if ledger.balance(user).await.unwrap().current.0 == dec!(500) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ledger.balance(user).await.unwrap().current.0, dec!(500));

        cancel.cancel();
        handle.await.unwrap();
    }
}
