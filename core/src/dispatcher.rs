//! Caller-side request dispatcher.
//!
//! Builds the outbound payload from the injected settings store, posts it to
//! the gateway, and retries transient failures with the shared backoff
//! policy. Provider-specific error shapes never reach this layer: terminal
//! gateway responses are surfaced via their `{error}` body verbatim.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;

use crate::errors::DispatchError;
use crate::gateway::{GenerationRequest, GenerationResult};
use crate::retry::{run_with_retry, RetryPolicy, TokioWaiter, Waiter};
use crate::stores::settings::SettingsStore;

pub struct Dispatcher {
    client: Client,
    gateway_url: String,
    settings: Arc<dyn SettingsStore>,
    retry: RetryPolicy,
    waiter: Arc<dyn Waiter>,
}

impl Dispatcher {
    pub fn new(gateway_url: impl Into<String>, settings: Arc<dyn SettingsStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("MomGen-App/0.1")
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self {
            client,
            gateway_url: gateway_url.into(),
            settings,
            retry: RetryPolicy::default(),
            waiter: Arc::new(TokioWaiter),
        })
    }

    /// Substitute the wait effect, used by tests to avoid real backoff.
    pub fn with_waiter(mut self, waiter: Arc<dyn Waiter>) -> Self {
        self.waiter = waiter;
        self
    }

    /// Generate a follow-up message for the composed query.
    pub async fn generate(
        &self,
        user_query: &str,
        system_prompt: &str,
    ) -> Result<GenerationResult, DispatchError> {
        if user_query.trim().is_empty() || system_prompt.trim().is_empty() {
            return Err(DispatchError::Validation);
        }
        let settings = self
            .settings
            .load()
            .map_err(|err| DispatchError::Config(err.to_string()))?;
        let payload = GenerationRequest {
            user_query: user_query.to_string(),
            system_prompt: system_prompt.to_string(),
            provider: settings.provider,
            model: settings.model,
            api_key: Some(settings.api_key).filter(|key| !key.trim().is_empty()),
        };

        run_with_retry(&self.retry, self.waiter.as_ref(), || {
            self.post_once(&payload)
        })
        .await
    }

    async fn post_once(
        &self,
        payload: &GenerationRequest,
    ) -> Result<GenerationResult, DispatchError> {
        let response = self
            .client
            .post(&self.gateway_url)
            .json(payload)
            .send()
            .await
            .map_err(|err| DispatchError::Transport(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DispatchError::Unavailable {
                status: status.as_u16(),
                detail,
            });
        }
        if !status.is_success() {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("error")
                        .and_then(|e| e.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| {
                    format!(
                        "API Error: {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("")
                    )
                });
            return Err(DispatchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|err| DispatchError::Transport(err.to_string()))?;
        serde_json::from_str::<GenerationResult>(&text)
            .map_err(|err| DispatchError::MalformedResult(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::testing::RecordingWaiter;
    use crate::stores::settings::GenerationSettings;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedSettings(GenerationSettings);

    impl SettingsStore for FixedSettings {
        fn load(&self) -> Result<GenerationSettings> {
            Ok(self.0.clone())
        }

        fn save(&self, _settings: &GenerationSettings) -> Result<()> {
            Ok(())
        }
    }

    fn dispatcher_for(uri: &str) -> (Dispatcher, Arc<RecordingWaiter>) {
        let waiter = Arc::new(RecordingWaiter::default());
        let settings = FixedSettings(GenerationSettings {
            provider: "gemini".into(),
            model: "gemini-2.0-flash-exp".into(),
            api_key: "valid".into(),
        });
        let dispatcher = Dispatcher::new(format!("{uri}/api/generate"), Arc::new(settings))
            .unwrap()
            .with_waiter(waiter.clone() as Arc<dyn Waiter>);
        (dispatcher, waiter)
    }

    #[tokio::test]
    async fn forwards_settings_and_returns_the_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "provider": "gemini",
                "model": "gemini-2.0-flash-exp",
                "apiKey": "valid"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "whatsappMessage": "Hi Alice, thanks again!",
                "actionItems": ["Send proposal"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, waiter) = dispatcher_for(&server.uri());
        let result = dispatcher.generate("notes", "prompt").await.unwrap();
        assert_eq!(result.whatsapp_message, "Hi Alice, thanks again!");
        assert_eq!(result.action_items, vec!["Send proposal".to_string()]);
        assert!(waiter.delays_ms().is_empty());
    }

    #[tokio::test]
    async fn gateway_outages_are_retried_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "whatsappMessage": "Hi Bob,",
                "actionItems": []
            })))
            .mount(&server)
            .await;

        let (dispatcher, waiter) = dispatcher_for(&server.uri());
        let result = dispatcher.generate("notes", "prompt").await.unwrap();
        assert!(result.action_items.is_empty());
        assert_eq!(waiter.delays_ms(), vec![1000, 2000]);
    }

    #[tokio::test]
    async fn terminal_errors_surface_the_error_body_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "error": "Unsupported provider: unknown" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, waiter) = dispatcher_for(&server.uri());
        let err = dispatcher.generate("notes", "prompt").await.unwrap_err();
        match err {
            DispatchError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Unsupported provider: unknown");
            }
            other => panic!("expected terminal api error, got {other:?}"),
        }
        assert!(waiter.delays_ms().is_empty());
    }

    #[tokio::test]
    async fn malformed_results_never_surface_partially_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "whatsappMessage": "Hi Carol," })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, _) = dispatcher_for(&server.uri());
        let err = dispatcher.generate("notes", "prompt").await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResult(_)));
    }

    #[tokio::test]
    async fn persistent_outage_exhausts_with_four_waits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(5)
            .mount(&server)
            .await;

        let (dispatcher, waiter) = dispatcher_for(&server.uri());
        let err = dispatcher.generate("notes", "prompt").await.unwrap_err();
        assert!(matches!(err, DispatchError::Exhausted { attempts: 5, .. }));
        assert_eq!(waiter.delays_ms(), vec![1000, 2000, 4000, 8000]);
    }

    #[tokio::test]
    async fn empty_query_fails_fast_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (dispatcher, _) = dispatcher_for(&server.uri());
        let err = dispatcher.generate("", "prompt").await.unwrap_err();
        assert!(matches!(err, DispatchError::Validation));
    }
}
