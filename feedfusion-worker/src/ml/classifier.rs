use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ClassifierError {
    #[error("error executing classifier request")]
    RequestError(#[source] reqwest::Error),

    #[error("classifier reported an error status")]
    StatusError(#[source] reqwest::Error),

    #[error("error decoding classifier response")]
    DecodeError(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub news_id: i32,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub news_id: i32,
    /// The raw label the model produced; may be absent when the model had
    /// no confident answer, and may name a label this deployment does not
    /// recognize.
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSample {
    pub title: String,
    pub summary: Option<String>,
    pub category: String,
}

/// The invocation seam around the model. Prediction arithmetic and the
/// training loop live on the other side of it; this side only cares about
/// the batch contract and the artifact directory both halves share.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict_batch(
        &self,
        inputs: &[PredictionInput],
    ) -> Result<Vec<Prediction>, ClassifierError>;

    /// Runs one training epoch over `samples`; `resume` continues from the
    /// current artifacts instead of starting fresh. Returns the metrics the
    /// trainer reported.
    async fn train(
        &self,
        samples: &[TrainingSample],
        resume: bool,
        config: &serde_json::Value,
    ) -> Result<serde_json::Value, ClassifierError>;
}

/// Classifier sidecar spoken to over HTTP. The sidecar owns the model
/// process; artifacts land in the shared model directory.
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    metrics: serde_json::Value,
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn predict_batch(
        &self,
        inputs: &[PredictionInput],
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&serde_json::json!({ "inputs": inputs }))
            .send()
            .await
            .map_err(ClassifierError::RequestError)?
            .error_for_status()
            .map_err(ClassifierError::StatusError)?;

        let parsed: PredictResponse =
            response.json().await.map_err(ClassifierError::DecodeError)?;
        Ok(parsed.predictions)
    }

    async fn train(
        &self,
        samples: &[TrainingSample],
        resume: bool,
        config: &serde_json::Value,
    ) -> Result<serde_json::Value, ClassifierError> {
        let response = self
            .client
            .post(format!("{}/train", self.base_url))
            .json(&serde_json::json!({
                "samples": samples,
                "resume": resume,
                "config": config,
            }))
            .send()
            .await
            .map_err(ClassifierError::RequestError)?
            .error_for_status()
            .map_err(ClassifierError::StatusError)?;

        let parsed: TrainResponse =
            response.json().await.map_err(ClassifierError::DecodeError)?;
        Ok(parsed.metrics)
    }
}
