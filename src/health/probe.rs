use crate::health::types::{HealthError, ProbeOutcome};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};

/// A single outbound health check against one endpoint.
///
/// Implementations must not panic and must return within roughly `timeout`;
/// the monitor additionally enforces the budget from the outside.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &str, credential: &str, timeout: Duration) -> ProbeOutcome;
}

/// `GET` with a bearer credential; only the status code and latency matter.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, HealthError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("llm-switchboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, endpoint: &str, credential: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let result = self
            .client
            .get(endpoint)
            .bearer_auth(credential)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .send()
            .await;
        let latency = started.elapsed();

        match result {
            Ok(response) => ProbeOutcome::Response {
                status_code: response.status().as_u16(),
                latency,
            },
            Err(e) => ProbeOutcome::Failed {
                error: describe_request_error(&e),
                latency,
            },
        }
    }
}

fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Network error: connection failed: {}", error)
    } else {
        format!("Network error: {}", error)
    }
}
