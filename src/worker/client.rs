//! HTTP implementation of the worker client.

use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;

use crate::config::PoolConfig;
use crate::pool::state::WorkerAddr;
use crate::types::{RunRequest, RunResponse, Version};
use crate::worker::wire::SignedMessage;
use crate::worker::WorkerClient;

/// Talks to workers over HTTP. Run requests are signed with the pool's
/// secret key; run responses are verified against the worker's public key.
pub struct HttpWorkerClient {
    http: reqwest::Client,
    secret_key: SigningKey,
    version_timeout: Duration,
    run_timeout: Duration,
}

impl HttpWorkerClient {
    pub fn new(secret_key: SigningKey, config: &PoolConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            version_timeout: config.version_timeout,
            run_timeout: config.run_timeout,
        }
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn versions(&self, addr: &WorkerAddr) -> Option<Vec<Version>> {
        let url = format!("http://{}/versions", addr.host);
        let response = match self
            .http
            .get(&url)
            .timeout(self.version_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(host = %addr.host, error = %e, "Version request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(
                host = %addr.host,
                status = %response.status(),
                "Version request rejected"
            );
            return None;
        }
        response.json::<Vec<Version>>().await.ok()
    }

    async fn run_job(&self, addr: &WorkerAddr, request: &RunRequest) -> Option<RunResponse> {
        let envelope = SignedMessage::sign(&self.secret_key, request.clone()).ok()?;
        let url = format!("http://{}/job", addr.host);
        let response = match self
            .http
            .post(&url)
            .timeout(self.run_timeout)
            .json(&envelope)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(host = %addr.host, error = %e, "Run request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(
                host = %addr.host,
                status = %response.status(),
                "Run request rejected"
            );
            return None;
        }

        let signed: SignedMessage<RunResponse> = response.json().await.ok()?;
        let verified = signed.verify_into(&addr.pubkey);
        if verified.is_none() {
            tracing::warn!(host = %addr.host, "Worker response failed signature verification");
        }
        verified
    }
}
