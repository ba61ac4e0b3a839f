//! OpenRouter chat-completions handler.
//!
//! OpenRouter has no schema constraint, so the request asks for JSON-object
//! response mode and the extracted message content gets the same strict
//! structured-output parse as Gemini.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::GatewayError;
use crate::retry::{run_with_retry, RetryPolicy, Waiter};

use super::{
    classify_upstream_failure, parse_structured_output, GenerationRequest, GenerationResult,
    ProviderHandler,
};

pub(crate) struct OpenRouterHandler<'a> {
    pub client: &'a Client,
    pub base_url: &'a str,
    pub retry: &'a RetryPolicy,
    pub waiter: &'a dyn Waiter,
}

#[async_trait]
impl ProviderHandler for OpenRouterHandler<'_> {
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
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or(GatewayError::NoContent)?;
        parse_structured_output(text)
    }
}

impl OpenRouterHandler<'_> {
    async fn call_upstream(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_query }
            ],
            "response_format": { "type": "json_object" }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, GatewayConfig};
    use crate::retry::testing::RecordingWaiter;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            user_query: "Raw Meeting Notes: demo went well".into(),
            system_prompt: "You are an SDR.".into(),
            provider: "openrouter".into(),
            model: "vendor/alpha".into(),
            api_key: Some("or-key".into()),
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": content } }
            ]
        })
    }

    async fn gateway_for(server: &MockServer) -> Gateway {
        let config = GatewayConfig {
            openrouter_base_url: server.uri(),
            ..GatewayConfig::default()
        };
        Gateway::new(config)
            .unwrap()
            .with_waiter(Arc::new(RecordingWaiter::default()))
    }

    #[tokio::test]
    async fn maps_to_chat_completions_with_json_object_mode() {
        let server = MockServer::start().await;
        let inner = r#"{"whatsappMessage":"Hi Erin, great talking today.","actionItems":["Send pricing"]}"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer or-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "vendor/alpha",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(inner)))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server).await;
        let result = gateway.handle(&request()).await.unwrap();
        assert_eq!(result.whatsapp_message, "Hi Erin, great talking today.");
        assert_eq!(result.action_items, vec!["Send pricing".to_string()]);
    }

    #[tokio::test]
    async fn missing_choice_content_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server).await;
        let err = gateway.handle(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoContent));
    }

    #[tokio::test]
    async fn non_object_model_output_is_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("Sure! Here you go")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server).await;
        let err = gateway.handle(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidJson));
    }
}
