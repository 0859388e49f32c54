use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EnrichmentSettings;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("provider API error: {0}")]
    Api(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider call timed out after {0}s")]
    Timeout(u64),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// One finding handed to the classifier.
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub code_snippet: String,
    pub finding_type: String,
    pub file_path: String,
    pub line: usize,
}

/// The classifier's judgement on one finding. This is what the cache
/// persists; it is a pure function of `(code_snippet, finding_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_true_positive: bool,

    /// In [0, 1].
    pub confidence: f64,

    pub explanation: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggested_fix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub severity_adjustment: Option<String>,
}

impl Verdict {
    /// What the original service falls back to when the model's reply
    /// cannot be parsed: assume a true positive at half confidence.
    pub fn conservative(reason: impl Into<String>) -> Self {
        Self {
            is_true_positive: true,
            confidence: 0.5,
            explanation: reason.into(),
            suggested_fix: None,
            severity_adjustment: None,
        }
    }
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn classify(&self, request: EnrichmentRequest) -> Result<Verdict, EnrichmentError>;

    fn model_name(&self) -> &str;
}

const SYSTEM_PROMPT: &str = "You are a security code reviewer. You judge whether a static-analysis \
finding is a true positive and, when it is, propose a minimal fix. Respond with JSON only.";

/// Classifier backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn from_settings(settings: &EnrichmentSettings) -> Result<Self, EnrichmentError> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                EnrichmentError::NotConfigured("no API key in config or OPENAI_API_KEY".to_string())
            })?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(ref base_url) = settings.base_url {
            config = config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(config),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: 3,
        })
    }

    fn build_prompt(request: &EnrichmentRequest) -> String {
        format!(
            "Analyze this static-analysis finding:\n\n\
             File: {}\n\
             Line: {}\n\
             Finding type: {}\n\n\
             Code snippet:\n```\n{}\n```\n\n\
             Respond with JSON only (no markdown):\n\
             {{\n\
               \"is_true_positive\": true/false,\n\
               \"confidence\": 0.0-1.0,\n\
               \"explanation\": \"brief explanation\",\n\
               \"suggested_fix\": \"code fix if applicable\",\n\
               \"severity_adjustment\": \"same/higher/lower\"\n\
             }}",
            request.file_path, request.line, request.finding_type, request.code_snippet
        )
    }

    /// Models sometimes wrap the JSON in a code fence or prose despite the
    /// response-format hint; dig the first balanced object out of the text.
    fn extract_json_from_text(text: &str) -> Option<&str> {
        let start = text.find('{')?;
        let bytes = text.as_bytes();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, &byte) in bytes[start..].iter().enumerate() {
            if escape_next {
                escape_next = false;
                continue;
            }
            match byte {
                b'\\' if in_string => escape_next = true,
                b'"' => in_string = !in_string,
                b'{' if !in_string => depth += 1,
                b'}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..start + i + 1]);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn parse_verdict(content: &str) -> Verdict {
        if let Ok(verdict) = serde_json::from_str::<Verdict>(content) {
            return verdict;
        }
        if let Some(json) = Self::extract_json_from_text(content) {
            if let Ok(verdict) = serde_json::from_str::<Verdict>(json) {
                return verdict;
            }
        }
        warn!("could not parse classifier response, falling back to conservative verdict");
        Verdict::conservative("Could not parse classifier response")
    }
}

#[async_trait]
impl EnrichmentProvider for OpenAiProvider {
    async fn classify(&self, request: EnrichmentRequest) -> Result<Verdict, EnrichmentError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| EnrichmentError::Api(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(Self::build_prompt(&request))
            .build()
            .map_err(|e| EnrichmentError::Api(e.to_string()))?;

        let api_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([system.into(), user.into()])
            .temperature(0.2)
            .max_tokens(1000u32)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| EnrichmentError::Api(e.to_string()))?;

        let mut attempt = 0u32;
        let response = loop {
            attempt += 1;
            debug!(attempt, max = self.max_retries, model = %self.model, "classifier call");

            let chat = self.client.chat();
            let call = tokio::time::timeout(
                self.timeout,
                chat.create(api_request.clone()),
            );
            match call.await {
                Ok(Ok(response)) => break response,
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "classifier API error");
                    if attempt >= self.max_retries {
                        return Err(EnrichmentError::Api(e.to_string()));
                    }
                    let wait = if e.to_string().contains("rate") {
                        Duration::from_secs(2u64.pow(attempt))
                    } else {
                        Duration::from_millis(100 * attempt as u64)
                    };
                    tokio::time::sleep(wait).await;
                }
                Err(_) => return Err(EnrichmentError::Timeout(self.timeout.as_secs())),
            }
        };

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| EnrichmentError::InvalidResponse("no content in response".to_string()))?;

        Ok(Self::parse_verdict(&content))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_response() {
        let text = "Here is my analysis:\n```json\n{\"is_true_positive\": false, \"confidence\": 0.9, \"explanation\": \"parameterized query\"}\n```";
        let json = OpenAiProvider::extract_json_from_text(text).unwrap();
        let verdict: Verdict = serde_json::from_str(json).unwrap();
        assert!(!verdict.is_true_positive);
        assert_eq!(verdict.confidence, 0.9);
    }

    #[test]
    fn test_extract_json_handles_nested_braces_in_strings() {
        let text = r#"{"is_true_positive": true, "confidence": 1.0, "explanation": "uses format(\"{}\", x)"}"#;
        let json = OpenAiProvider::extract_json_from_text(text).unwrap();
        assert!(serde_json::from_str::<Verdict>(json).is_ok());
    }

    #[test]
    fn test_unparseable_response_degrades_to_conservative() {
        let verdict = OpenAiProvider::parse_verdict("I cannot help with that.");
        assert!(verdict.is_true_positive);
        assert_eq!(verdict.confidence, 0.5);
    }
}
