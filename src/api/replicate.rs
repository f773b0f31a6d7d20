//! Replicate image generation (flux-schnell).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use super::client::{Auth, UpstreamClient};
use super::types::{Prediction, PredictionInput, PredictionRequest};
use crate::credentials::Secret;

pub const REPLICATE_BASE_URL: &str = "https://api.replicate.com/v1/";

const FLUX_SCHNELL_PREDICTIONS: &str = "models/black-forest-labs/flux-schnell/predictions";

/// Poll cadence when `Prefer: wait` returned before the prediction finished
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: usize = 60;

pub struct ReplicateClient {
    client: Arc<UpstreamClient>,
    api_token: Secret,
    base_url: Url,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub fn new(client: Arc<UpstreamClient>, api_token: Secret) -> Result<Self> {
        Self::with_base_url(client, api_token, REPLICATE_BASE_URL, POLL_INTERVAL)
    }

    fn with_base_url(
        client: Arc<UpstreamClient>,
        api_token: Secret,
        base_url: &str,
        poll_interval: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid Replicate base URL")?;
        Ok(Self {
            client,
            api_token,
            base_url,
            poll_interval,
        })
    }

    /// Generate an image and return its URL.
    pub async fn generate_image(&self, prompt: &str) -> Result<String> {
        let url = self.base_url.join(FLUX_SCHNELL_PREDICTIONS)?;
        let body = PredictionRequest {
            input: PredictionInput {
                prompt: prompt.to_string(),
            },
        };

        let mut prediction: Prediction = self
            .client
            .post_json(
                &url,
                Auth::Bearer(&self.api_token),
                &[("Prefer", "wait")],
                &body,
            )
            .await
            .context("Replicate request failed")?;

        let mut polls = 0;
        while !is_terminal(&prediction.status) {
            if polls == MAX_POLLS {
                bail!(
                    "Replicate prediction {} still {} after {} polls",
                    prediction.id,
                    prediction.status,
                    MAX_POLLS
                );
            }
            polls += 1;
            debug!(
                "Prediction {} is {}, polling again",
                prediction.id, prediction.status
            );
            sleep(self.poll_interval).await;

            let poll_url = self
                .base_url
                .join(&format!("predictions/{}", prediction.id))?;
            prediction = self
                .client
                .get_json(&poll_url, Auth::Bearer(&self.api_token))
                .await
                .context("Replicate poll failed")?;
        }

        image_url(&prediction)
    }
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "succeeded" | "failed" | "canceled")
}

fn image_url(prediction: &Prediction) -> Result<String> {
    if prediction.status != "succeeded" {
        let reason = prediction
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no error reported".to_string());
        bail!("Replicate prediction {}: {}", prediction.status, reason);
    }

    // flux-schnell returns a list of URLs; some models return a single string
    let url = match &prediction.output {
        Some(serde_json::Value::Array(items)) => items.first().and_then(|v| v.as_str()),
        Some(serde_json::Value::String(url)) => Some(url.as_str()),
        _ => None,
    };

    match url {
        Some(url) => Ok(url.to_string()),
        None => bail!("Did not receive an image URL from Replicate"),
    }
}
