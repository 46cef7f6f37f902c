use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::balance::Amount;
use crate::domain::order::AccrualStatus;
use crate::domain::ports::{AccrualOracle, AccrualReply};
use crate::error::AccrualError;

/// Upper bound on a single accrual request. Without it a stalled response
/// would pin a worker indefinitely and starve the pool.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the accrual service.
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// Creates a client with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AccrualError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AccrualError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

/// Wire shape of a 200 reply: `{"order", "status", "accrual"?}`, with
/// `accrual` present only for processed orders.
#[derive(Debug, Deserialize)]
struct AccrualResponse {
    #[allow(dead_code)]
    order: String,
    status: AccrualStatus,
    accrual: Option<Amount>,
}

fn retry_after(headers: &header::HeaderMap) -> Result<Duration, AccrualError> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .ok_or(AccrualError::MalformedRetryAfter)
}

#[async_trait]
impl AccrualOracle for HttpAccrualClient {
    async fn check(&self, order_number: &str) -> Result<AccrualReply, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, order_number);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body: AccrualResponse = response.json().await?;
                Ok(AccrualReply::Status {
                    status: body.status,
                    accrual: body.accrual,
                })
            }
            StatusCode::TOO_MANY_REQUESTS => Ok(AccrualReply::Throttled {
                retry_after: retry_after(response.headers())?,
            }),
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_response_with_accrual_deserialization() {
        let json = r#"{"order": "12345678903", "status": "PROCESSED", "accrual": 500}"#;
        let response: AccrualResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.status, AccrualStatus::Processed);
        assert_eq!(response.accrual, Some(Amount::new(dec!(500)).unwrap()));
    }

    #[test]
    fn test_response_without_accrual_deserialization() {
        let json = r#"{"order": "12345678903", "status": "REGISTERED"}"#;
        let response: AccrualResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.status, AccrualStatus::Registered);
        assert_eq!(response.accrual, None);
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(retry_after(&headers).unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_missing_or_garbage() {
        let headers = header::HeaderMap::new();
        assert!(matches!(
            retry_after(&headers),
            Err(AccrualError::MalformedRetryAfter)
        ));

        let mut headers = header::HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "soon".parse().unwrap());
        assert!(matches!(
            retry_after(&headers),
            Err(AccrualError::MalformedRetryAfter)
        ));
    }
}
