use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use loyalty_engine::domain::balance::Amount;
use loyalty_engine::domain::order::AccrualStatus;
use loyalty_engine::domain::ports::{AccrualOracle, AccrualReply};
use loyalty_engine::error::AccrualError;

/// Scripted accrual oracle for pipeline tests.
///
/// Each order number gets a queue of replies; the last one repeats once the
/// queue drains. Every call is recorded with its start instant so tests can
/// assert on call timing. Unscripted numbers answer like an unknown order.
pub struct StubOracle {
    scripts: Mutex<HashMap<String, Vec<AccrualReply>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl StubOracle {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, number: &str, replies: Vec<AccrualReply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(number.to_string(), replies);
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AccrualOracle for StubOracle {
    async fn check(&self, order_number: &str) -> Result<AccrualReply, AccrualError> {
        self.calls
            .lock()
            .unwrap()
            .push((order_number.to_string(), Instant::now()));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(order_number) {
            Some(replies) if replies.len() > 1 => Ok(replies.remove(0)),
            Some(replies) => Ok(replies[0].clone()),
            None => Err(AccrualError::UnexpectedStatus(204)),
        }
    }
}

pub fn processed(value: Decimal) -> AccrualReply {
    AccrualReply::Status {
        status: AccrualStatus::Processed,
        accrual: Some(Amount::new(value).unwrap()),
    }
}

pub fn registered() -> AccrualReply {
    AccrualReply::Status {
        status: AccrualStatus::Registered,
        accrual: None,
    }
}

pub fn throttled(retry_after: Duration) -> AccrualReply {
    AccrualReply::Throttled { retry_after }
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}
