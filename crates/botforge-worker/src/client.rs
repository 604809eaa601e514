//! HTTP client side of the trial protocol.

use botforge_core::{
    ControlPlane, Error, Result, StartDecision, StartResponse, TrialResult, WorkerConfig,
};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

pub struct CoordinatorClient {
    config: WorkerConfig,
    http_client: Client,
    worker_id: String,
}

#[derive(Serialize)]
struct TrialStartRequest {
    worker_id: Option<String>,
}

impl CoordinatorClient {
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let worker_id = config
            .worker_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            worker_id,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    async fn post_start(&self) -> Result<StartDecision> {
        let url = format!("{}/api/trials/request", self.config.coordinator_url);

        debug!("Requesting trial start from {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(&TrialStartRequest {
                worker_id: Some(self.worker_id.clone()),
            })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Start request failed: {} - {}", status, body);
            return Err(Error::Network(format!("start request failed: {}", status)));
        }

        let start: StartResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        match (start.ok, start.trial) {
            (true, Some(assignment)) => {
                info!(
                    generation = assignment.generation,
                    trial_index = assignment.trial_index,
                    "received trial grant"
                );
                Ok(StartDecision::Granted(assignment))
            }
            (true, None) => Err(Error::Network(
                "granted start carried no trial assignment".to_string(),
            )),
            (false, _) => Ok(StartDecision::Denied),
        }
    }

    async fn post_result(&self, result: &TrialResult) -> Result<()> {
        let url = format!("{}/api/trials/submit", self.config.coordinator_url);

        debug!(
            generation = result.generation,
            trial_index = result.trial_index,
            "submitting trial result"
        );

        let response = self
            .http_client
            .post(&url)
            .json(result)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if response.status().is_success() {
            info!(
                generation = result.generation,
                trial_index = result.trial_index,
                "result submitted"
            );
            Ok(())
        } else if response.status() == reqwest::StatusCode::CONFLICT {
            // The generation this trial belonged to is gone (coordinator
            // restart). Retrying can never succeed; drop the result.
            warn!(
                generation = result.generation,
                trial_index = result.trial_index,
                "coordinator no longer accepts this result; dropping it"
            );
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Network(format!(
                "failed to submit result: {} - {}",
                status, body
            )))
        }
    }
}

impl ControlPlane for CoordinatorClient {
    async fn request_start(&self) -> Result<StartDecision> {
        self.post_start().await
    }

    async fn submit_result(&self, result: TrialResult) -> Result<()> {
        self.post_result(&result).await
    }
}
