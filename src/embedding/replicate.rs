//! Prediction-job client for a hosted CLIP embedding model.
//!
//! The service is asynchronous: a prediction is submitted, then its status is
//! polled until it reaches a terminal state. The wait ceiling runs from
//! submission, and every request is cut short so it cannot outlive it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use super::image_ref::ImageRef;
use super::provider::{Embedding, EmbeddingProvider, ProviderError};
use crate::config::EmbeddingConfig;

/// Environment variable consulted when no token is set in the config file.
pub const API_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

/// Bounds for the status polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_secs(config.max_wait_secs),
            max_attempts: config.max_poll_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PredictionInput<'a> {
    Image { image: &'a str },
    Text { text: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PredictionStatus::Starting | PredictionStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Starting => "starting",
            PredictionStatus::Processing => "processing",
            PredictionStatus::Succeeded => "succeeded",
            PredictionStatus::Failed => "failed",
            PredictionStatus::Canceled => "canceled",
            PredictionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

/// Job descriptor returned on submission and on every poll.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingOutput {
    embedding: Vec<f32>,
}

impl Prediction {
    fn poll_url(&self, api_base: &str) -> String {
        self.urls
            .as_ref()
            .and_then(|u| u.get.clone())
            .unwrap_or_else(|| format!("{}/predictions/{}", api_base, self.id))
    }

    fn error_detail(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Extract the embedding from a succeeded prediction.
    pub fn embedding(&self) -> Result<Embedding, ProviderError> {
        let output = self.output.clone().ok_or_else(|| {
            ProviderError::Malformed(format!("prediction {} succeeded without output", self.id))
        })?;

        let parsed: EmbeddingOutput = serde_json::from_value(output)
            .map_err(|e| ProviderError::Malformed(format!("prediction {}: {}", self.id, e)))?;

        if parsed.embedding.is_empty() {
            return Err(ProviderError::Malformed(format!(
                "prediction {} returned an empty embedding",
                self.id
            )));
        }
        if parsed.embedding.iter().any(|v| !v.is_finite()) {
            return Err(ProviderError::Malformed(format!(
                "prediction {} returned a non-finite embedding component",
                self.id
            )));
        }

        Ok(Embedding::from(parsed.embedding))
    }
}

/// Time left before `deadline`, capped at `cap` and floored at one
/// millisecond.
pub fn request_budget(deadline: Instant, cap: Duration) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .min(cap)
        .max(Duration::from_millis(1))
}

/// Poll `prediction` through `refresh` until it succeeds, fails, or the
/// policy runs out. The wait ceiling counts from `started`, which callers
/// take before submitting.
pub fn wait_for_prediction<F>(
    mut prediction: Prediction,
    started: Instant,
    policy: &PollPolicy,
    mut refresh: F,
) -> Result<Prediction, ProviderError>
where
    F: FnMut(&Prediction) -> Result<Prediction, ProviderError>,
{
    let mut attempts = 0u32;

    loop {
        match prediction.status {
            PredictionStatus::Succeeded => return Ok(prediction),
            status if status.is_terminal() => {
                let detail = prediction.error_detail();
                return Err(ProviderError::JobFailed {
                    id: prediction.id,
                    status: status.to_string(),
                    detail,
                });
            }
            _ => {}
        }

        let waited = started.elapsed();
        if attempts >= policy.max_attempts || waited + policy.interval > policy.max_wait {
            return Err(ProviderError::Timeout {
                id: prediction.id,
                waited,
                attempts,
            });
        }

        thread::sleep(policy.interval);
        prediction = refresh(&prediction)?;
        attempts += 1;

        tracing::trace!(
            id = %prediction.id,
            status = %prediction.status,
            attempt = attempts,
            "Polled prediction"
        );
    }
}

fn map_http_error(err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            ProviderError::Http { status, body }
        }
        ureq::Error::Transport(transport) => ProviderError::Transport(transport.to_string()),
    }
}

/// CLIP embeddings served through a prediction-job HTTP API.
pub struct ReplicateProvider {
    agent: ureq::Agent,
    api_base: String,
    model_version: String,
    api_token: Option<String>,
    request_timeout: Duration,
    poll: PollPolicy,
}

impl ReplicateProvider {
    /// Build from configuration. A token missing from the config is looked up
    /// in `REPLICATE_API_TOKEN`.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let api_token = config
            .api_token
            .clone()
            .or_else(|| std::env::var(API_TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty());

        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let agent = ureq::AgentBuilder::new().timeout(request_timeout).build();

        Self {
            agent,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model_version: config.model_version.clone(),
            api_token,
            request_timeout,
            poll: PollPolicy::from_config(config),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_token.is_some()
    }

    fn token(&self) -> Result<&str, ProviderError> {
        self.api_token.as_deref().ok_or_else(|| {
            ProviderError::Unavailable(format!("no API token configured (set {})", API_TOKEN_ENV))
        })
    }

    fn submit(
        &self,
        token: &str,
        input: PredictionInput<'_>,
        deadline: Instant,
    ) -> Result<Prediction, ProviderError> {
        let url = format!("{}/predictions", self.api_base);
        let request = PredictionRequest {
            version: &self.model_version,
            input,
        };

        let response = self
            .agent
            .post(&url)
            .timeout(request_budget(deadline, self.request_timeout))
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", token))
            .send_json(&request)
            .map_err(map_http_error)?;

        response
            .into_json()
            .map_err(|e| ProviderError::Malformed(format!("failed to parse prediction: {}", e)))
    }

    fn fetch(
        &self,
        token: &str,
        prediction: &Prediction,
        deadline: Instant,
    ) -> Result<Prediction, ProviderError> {
        let url = prediction.poll_url(&self.api_base);

        let response = self
            .agent
            .get(&url)
            .timeout(request_budget(deadline, self.request_timeout))
            .set("Authorization", &format!("Bearer {}", token))
            .call()
            .map_err(map_http_error)?;

        response
            .into_json()
            .map_err(|e| ProviderError::Malformed(format!("failed to parse prediction: {}", e)))
    }

    fn predict(&self, input: PredictionInput<'_>) -> Result<Embedding, ProviderError> {
        let token = self.token()?;
        let started = Instant::now();
        let deadline = started + self.poll.max_wait;

        let submitted = self.submit(token, input, deadline)?;
        tracing::debug!(id = %submitted.id, status = %submitted.status, "Prediction submitted");

        let finished = wait_for_prediction(submitted, started, &self.poll, |p| {
            self.fetch(token, p, deadline)
        })?;
        let embedding = finished.embedding()?;

        tracing::debug!(
            id = %finished.id,
            dims = embedding.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prediction succeeded"
        );
        Ok(embedding)
    }
}

impl EmbeddingProvider for ReplicateProvider {
    fn embed_image(&self, image: &ImageRef) -> Result<Embedding, ProviderError> {
        self.predict(PredictionInput::Image {
            image: image.as_str(),
        })
    }

    fn embed_text(&self, text: &str) -> Result<Embedding, ProviderError> {
        self.predict(PredictionInput::Text { text })
    }

    fn provider_name(&self) -> &'static str {
        "Replicate CLIP"
    }
}
