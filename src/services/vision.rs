use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_COMPLETION_TOKENS: u32 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upstream failures, classified so the HTTP layer can map them to useful
/// statuses without inspecting provider internals.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream quota exhausted")]
    QuotaExceeded { retry_after_secs: Option<u64> },
    #[error("upstream rate limited")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("upstream API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("upstream returned no usable text")]
    Malformed,
}

/// A model that can look at a food photo and answer with an estimate as text.
#[async_trait]
pub trait VisionEstimator: Send + Sync {
    /// Whether the client has the credentials it needs to make calls.
    fn is_configured(&self) -> bool;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Sends the prompt plus the image and returns the raw answer text.
    async fn estimate(&self, prompt: &str, image_data_url: &str) -> Result<String, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// OpenAI-compatible chat completions client for vision models.
pub struct OpenAiVisionClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiVisionClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl VisionEstimator for OpenAiVisionClient {
    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn estimate(&self, prompt: &str, image_data_url: &str) -> Result<String, UpstreamError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        content_type: "text".to_string(),
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        content_type: "image_url".to_string(),
                        image_url: ImageData {
                            url: image_data_url.to_string(),
                        },
                    },
                ],
            }],
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        log::info!("🤖 Sending vision request with model: {}", self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            let body = response.text().await.unwrap_or_default();
            log::warn!("⚠️ Vision API throttled us: {}", body);
            return Err(classify_429(&body, retry_after_secs));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            log::error!("❌ Vision API error ({}): {}", status, message);
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            log::error!("❌ Could not decode vision API response: {}", e);
            UpstreamError::Malformed
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            log::warn!("⚠️ Vision API returned an empty answer");
            return Err(UpstreamError::Malformed);
        }

        log::debug!("💬 Vision answer: {}", content);
        Ok(content)
    }
}

/// OpenAI reports exhausted credit and plain throttling with the same 429
/// status; the error body tells them apart.
fn classify_429(body: &str, retry_after_secs: Option<u64>) -> UpstreamError {
    let body = body.to_ascii_lowercase();
    if body.contains("quota") || body.contains("billing") {
        UpstreamError::QuotaExceeded { retry_after_secs }
    } else {
        UpstreamError::RateLimited { retry_after_secs }
    }
}

/// Canned estimator for tests. Records calls and prompts instead of talking
/// to a real model.
#[allow(dead_code)]
pub struct MockEstimator {
    behavior: MockBehavior,
    configured: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
#[derive(Debug)]
pub enum MockBehavior {
    Reply(String),
    Malformed,
    RateLimited,
    QuotaExceeded,
    Timeout,
}

#[allow(dead_code)]
impl MockEstimator {
    pub fn replying(text: &str) -> Self {
        Self::with_behavior(MockBehavior::Reply(text.to_string()))
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            configured: true,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        let mut mock = Self::with_behavior(MockBehavior::Malformed);
        mock.configured = false;
        mock
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VisionEstimator for MockEstimator {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn model_name(&self) -> &str {
        "mock-vision"
    }

    async fn estimate(&self, prompt: &str, _image_data_url: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match &self.behavior {
            MockBehavior::Reply(text) => Ok(text.clone()),
            MockBehavior::Malformed => Err(UpstreamError::Malformed),
            MockBehavior::RateLimited => Err(UpstreamError::RateLimited {
                retry_after_secs: Some(7),
            }),
            MockBehavior::QuotaExceeded => Err(UpstreamError::QuotaExceeded {
                retry_after_secs: None,
            }),
            MockBehavior::Timeout => Err(UpstreamError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_to_the_openai_wire_shape() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        content_type: "text".to_string(),
                        text: "what is this dish".to_string(),
                    },
                    ContentPart::ImageUrl {
                        content_type: "image_url".to_string(),
                        image_url: ImageData {
                            url: "data:image/png;base64,QUJD".to_string(),
                        },
                    },
                ],
            }],
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let json = serde_json::to_value(&request).expect("serializable request");
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn chat_response_tolerates_missing_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"role": "assistant"}}]}"#)
                .expect("parsable response");
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn quota_and_throttle_responses_are_told_apart() {
        let quota = classify_429(
            r#"{"error": {"message": "You exceeded your current quota"}}"#,
            None,
        );
        assert!(matches!(quota, UpstreamError::QuotaExceeded { .. }));

        let limited = classify_429(
            r#"{"error": {"message": "Rate limit reached, slow down"}}"#,
            Some(12),
        );
        assert!(matches!(
            limited,
            UpstreamError::RateLimited {
                retry_after_secs: Some(12)
            }
        ));
    }

    #[test]
    fn client_without_key_reports_unconfigured() {
        let client = OpenAiVisionClient::new(
            String::new(),
            "gpt-4o".to_string(),
            "https://api.openai.com/v1".to_string(),
        );
        assert!(!client.is_configured());
        assert_eq!(client.model_name(), "gpt-4o");

        let client = OpenAiVisionClient::new(
            "sk-test".to_string(),
            "gpt-4o".to_string(),
            "https://api.openai.com/v1".to_string(),
        );
        assert!(client.is_configured());
    }

    #[tokio::test]
    async fn mock_estimator_counts_calls_and_records_prompts() {
        let mock = MockEstimator::replying("🔥 CALORIES: 100 kcal");

        let first = mock
            .estimate("prompt one", "data:image/png;base64,QUJD")
            .await
            .expect("canned reply");
        assert_eq!(first, "🔥 CALORIES: 100 kcal");

        mock.estimate("prompt two", "data:image/png;base64,QUJD")
            .await
            .expect("canned reply");

        assert_eq!(mock.calls(), 2);
        assert_eq!(
            mock.prompts(),
            vec!["prompt one".to_string(), "prompt two".to_string()]
        );
    }
}
