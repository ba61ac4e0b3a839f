//! Gemini generate-content handler.
//!
//! The request carries a response schema so the model is forced to emit the
//! two-field structured object; the inner text still gets a strict parse
//! because schema enforcement upstream is best-effort.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::GatewayError;
use crate::retry::{run_with_retry, RetryPolicy, Waiter};

use super::{
    classify_upstream_failure, parse_structured_output, GenerationRequest, GenerationResult,
    ProviderHandler,
};

pub(crate) struct GeminiHandler<'a> {
    pub client: &'a Client,
    pub base_url: &'a str,
    pub retry: &'a RetryPolicy,
    pub waiter: &'a dyn Waiter,
}

#[async_trait]
impl ProviderHandler for GeminiHandler<'_> {
    async fn handle(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<GenerationResult, GatewayError> {
        let body = run_with_retry(self.retry, self.waiter, || {
            self.call_upstream(request, api_key)
        })
        .await?;

        let text = body
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.get(0))
            .and_then(|part| part.get("text"))
            .and_then(|text| text.as_str())
            .ok_or(GatewayError::NoContent)?;
        parse_structured_output(text)
    }
}

impl GeminiHandler<'_> {
    async fn call_upstream(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<Value, GatewayError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            request.model
        );
        let payload = json!({
            "contents": [
                { "parts": [ { "text": request.user_query } ] }
            ],
            "systemInstruction": {
                "parts": [ { "text": request.system_prompt } ]
            },
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "whatsappMessage": { "type": "STRING" },
                        "actionItems": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" }
                        }
                    },
                    "required": ["whatsappMessage", "actionItems"]
                }
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .await
            .map_err(|err| GatewayError::TransientUpstream {
                status: None,
                detail: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(classify_upstream_failure(response).await);
        }
        response
            .json()
            .await
            .map_err(|err| GatewayError::TransientUpstream {
                status: None,
                detail: format!("failed to read upstream body: {err}"),
            })
    }
}
