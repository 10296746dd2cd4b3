//! Bounded-timeout HTTP delivery with idempotency header, response
//! classification, and exponential-backoff retry. Grounded on the
//! `reqwest::Client` conventions of `kernel/tavily_client.rs` and
//! `kernel/firecrawl_client.rs`, and the manual retry-loop idiom of
//! `kernel/ai_matching.rs::generate_embedding_with_retry`.

use std::time::Duration;

use reqwest::StatusCode;

use crate::scheduling::error::SchedulingError;

const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ADDITIONAL_ATTEMPTS: u32 = 3;
const BACKOFF_SCHEDULE_SECS: [u64; 3] = [1, 2, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Success,
    Permanent(u16),
    Transient,
}

fn classify(status: StatusCode) -> Classification {
    if status.is_success() {
        Classification::Success
    } else if status.as_u16() == 429 || status.is_server_error() {
        Classification::Transient
    } else {
        Classification::Permanent(status.as_u16())
    }
}

pub struct WebhookClient {
    http: reqwest::Client,
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .build()
            .expect("reqwest client builds with a fixed, valid config");
        Self { http }
    }

    /// Issues the POST, retrying transient failures with the 1s/2s/4s
    /// backoff schedule. Returns `PermanentDeliveryError` immediately on
    /// 4xx (other than 429), and `InfrastructureError` once the retry
    /// budget for a transient condition is exhausted.
    pub async fn deliver(
        &self,
        url: &str,
        payload: &serde_json::Value,
        idempotency_key: &str,
    ) -> Result<(), SchedulingError> {
        let mut attempt = 0u32;
        loop {
            let result = self
                .http
                .post(url)
                .header("Content-Type", "application/json")
                .header("X-Idempotency-Key", idempotency_key)
                .json(payload)
                .send()
                .await;

            match result {
                Ok(response) => match classify(response.status()) {
                    Classification::Success => return Ok(()),
                    Classification::Permanent(status_code) => {
                        return Err(SchedulingError::PermanentDeliveryError { status_code })
                    }
                    Classification::Transient => {
                        if attempt >= MAX_ADDITIONAL_ATTEMPTS {
                            return Err(SchedulingError::InfrastructureError(format!(
                                "webhook delivery exhausted retries: status {}",
                                response.status()
                            )));
                        }
                        tracing::warn!(
                            attempt,
                            status = %response.status(),
                            "transient webhook failure, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(BACKOFF_SCHEDULE_SECS[attempt as usize]))
                            .await;
                        attempt += 1;
                    }
                },
                Err(err) => {
                    if attempt >= MAX_ADDITIONAL_ATTEMPTS {
                        return Err(SchedulingError::InfrastructureError(format!(
                            "webhook transport error after retries: {err}"
                        )));
                    }
                    tracing::warn!(attempt, error = %err, "transport error, retrying webhook delivery");
                    tokio::time::sleep(Duration::from_secs(BACKOFF_SCHEDULE_SECS[attempt as usize])).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_success() {
        assert_eq!(classify(StatusCode::OK), Classification::Success);
        assert_eq!(classify(StatusCode::NO_CONTENT), Classification::Success);
    }

    #[test]
    fn classifies_permanent_4xx_except_429() {
        assert_eq!(
            classify(StatusCode::BAD_REQUEST),
            Classification::Permanent(400)
        );
        assert_eq!(classify(StatusCode::NOT_FOUND), Classification::Permanent(404));
    }

    #[test]
    fn classifies_429_and_5xx_as_transient() {
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), Classification::Transient);
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR),
            Classification::Transient
        );
        assert_eq!(classify(StatusCode::BAD_GATEWAY), Classification::Transient);
    }
}
