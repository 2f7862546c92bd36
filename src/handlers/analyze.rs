use std::sync::Arc;

use thiserror::Error;

use crate::models::{AnalysisRequest, AnalysisResult};
use crate::services::extraction;
use crate::services::prompt;
use crate::services::rate_limit::{self, AdmissionDenied, RateLimiter};
use crate::services::validation::{self, ImageRejection};
use crate::services::vision::{UpstreamError, VisionEstimator};

/// Everything that can stop a request between arrival and answer.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Image(#[from] ImageRejection),
    #[error(transparent)]
    Admission(#[from] AdmissionDenied),
    #[error("analysis service is unavailable")]
    Configuration,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Runs one photo through the full pipeline: validate the payload, admit
/// the client, build the prompt, call the model, extract the numbers.
pub struct AnalysisHandler {
    limiter: Arc<RateLimiter>,
    estimator: Arc<dyn VisionEstimator>,
    allowed_origins: Vec<String>,
    max_image_bytes: usize,
}

impl AnalysisHandler {
    pub fn new(
        limiter: Arc<RateLimiter>,
        estimator: Arc<dyn VisionEstimator>,
        allowed_origins: Vec<String>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            limiter,
            estimator,
            allowed_origins,
            max_image_bytes,
        }
    }

    pub async fn handle(
        &self,
        client_key: &str,
        origin: Option<&str>,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResult, AnalyzeError> {
        // Cheap local checks first: a bad payload never costs quota and a
        // gated client never reaches the model.
        let format = validation::validate_image(&request.image, self.max_image_bytes)?;
        rate_limit::check_origin(origin, &self.allowed_origins)?;
        let admission = self.limiter.admit(client_key)?;

        if !self.estimator.is_configured() {
            log::error!("❌ Analysis requested but no vision credential is configured");
            return Err(AnalyzeError::Configuration);
        }

        log::info!(
            "📸 Analyzing {} photo for client {} ({} requests left in window)",
            format.media_type(),
            client_key,
            admission.remaining
        );

        let prompt_text = prompt::build_prompt(request);
        let raw_text = match self.estimator.estimate(&prompt_text, &request.image).await {
            Ok(text) => text,
            Err(UpstreamError::Malformed) => {
                // Degraded but answerable: extraction turns the empty text
                // into an all-defaults estimate.
                log::warn!("⚠️ Model answer was unusable, falling back to defaults");
                String::new()
            }
            Err(e) => return Err(AnalyzeError::Upstream(e)),
        };

        let estimate = extraction::parse_analysis(&raw_text);
        if !estimate.calories.is_parsed() {
            log::debug!("🔍 No calorie figure found in the answer");
        }

        log::info!(
            "✅ Analysis done: {} kcal, {} g, confidence {}/10",
            estimate.calories.value(),
            estimate.weight_grams.value(),
            estimate.confidence.value()
        );

        Ok(estimate.into_result(raw_text))
    }
}
