//! Provider gateway: validates generation requests, resolves credentials,
//! and routes to the provider-specific handler.
//!
//! The gateway is the boundary against the upstream LLM APIs. Each handler
//! runs its own bounded retry loop, independent of whatever retry policy the
//! caller applies on its side of the HTTP hop.

pub mod gemini;
pub mod openrouter;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::providers::{ProviderKind, GEMINI_BASE_URL, OPENROUTER_BASE_URL};
use crate::retry::{RetryPolicy, TokioWaiter, Waiter};

use gemini::GeminiHandler;
use openrouter::OpenRouterHandler;

/// Normalised generation request, shared by dispatcher and gateway.
///
/// Every field carries a serde default so an absent field deserialises to
/// empty instead of failing extraction; the gateway then answers absent and
/// blank fields alike with its own validation error. `provider` stays a
/// string on the wire so an unknown value can be answered with an
/// "unsupported provider" error instead of a deserialisation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub user_query: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// The structured-output contract every handler enforces.
///
/// `action_items` has no serde default on purpose: an upstream response that
/// omits it must be rejected as malformed, never silently filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub whatsapp_message: String,
    pub action_items: Vec<String>,
}

/// Server-side configuration: default credentials and upstream endpoints.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gemini_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub gemini_base_url: String,
    pub openrouter_base_url: String,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            openrouter_api_key: None,
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            openrouter_base_url: OPENROUTER_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Read server-held default keys from the environment.
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            ..Self::default()
        }
    }
}

/// Capability contract implemented once per provider variant.
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    async fn handle(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<GenerationResult, GatewayError>;
}

pub struct Gateway {
    client: Client,
    config: GatewayConfig,
    waiter: Arc<dyn Waiter>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(45))
            .user_agent("MomGen-Gateway/0.1")
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self {
            client,
            config,
            waiter: Arc::new(TokioWaiter),
        })
    }

    /// Substitute the wait effect, used by tests to avoid real backoff.
    pub fn with_waiter(mut self, waiter: Arc<dyn Waiter>) -> Self {
        self.waiter = waiter;
        self
    }

    /// Serve one generation call end to end.
    pub async fn handle(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GatewayError> {
        if request.user_query.trim().is_empty()
            || request.system_prompt.trim().is_empty()
            || request.model.trim().is_empty()
        {
            return Err(GatewayError::Validation);
        }
        let kind = ProviderKind::parse(&request.provider)
            .ok_or_else(|| GatewayError::UnsupportedProvider(request.provider.clone()))?;
        let api_key = self.resolve_api_key(kind, request)?;

        log::info!(
            "generation call: provider={} model={}",
            kind.as_str(),
            request.model
        );

        match kind {
            ProviderKind::Gemini => {
                let handler = GeminiHandler {
                    client: &self.client,
                    base_url: &self.config.gemini_base_url,
                    retry: &self.config.retry,
                    waiter: self.waiter.as_ref(),
                };
                handler.handle(request, &api_key).await
            }
            ProviderKind::OpenRouter => {
                let handler = OpenRouterHandler {
                    client: &self.client,
                    base_url: &self.config.openrouter_base_url,
                    retry: &self.config.retry,
                    waiter: self.waiter.as_ref(),
                };
                handler.handle(request, &api_key).await
            }
        }
    }

    /// Request-supplied key wins; otherwise fall back to the server-held
    /// default for the provider. No outbound call is made without a key.
    fn resolve_api_key(
        &self,
        kind: ProviderKind,
        request: &GenerationRequest,
    ) -> Result<String, GatewayError> {
        let supplied = request
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        let fallback = match kind {
            ProviderKind::Gemini => self.config.gemini_api_key.as_deref(),
            ProviderKind::OpenRouter => self.config.openrouter_api_key.as_deref(),
        };
        supplied
            .or(fallback)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::MissingCredentials(kind.profile().display_name))
    }
}

/// Translate a non-2xx upstream response into the error taxonomy.
pub(crate) async fn classify_upstream_failure(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let detail = response.text().await.unwrap_or_default();
    if status.as_u16() == 429 || status.is_server_error() {
        GatewayError::TransientUpstream {
            status: Some(status.as_u16()),
            detail,
        }
    } else {
        GatewayError::TerminalUpstream {
            status: status.as_u16(),
            detail,
        }
    }
}

/// Parse model output against the structured-output contract. Any shape
/// mismatch, including a missing `actionItems` array, is terminal.
pub(crate) fn parse_structured_output(text: &str) -> Result<GenerationResult, GatewayError> {
    serde_json::from_str::<GenerationResult>(text).map_err(|err| {
        log::debug!("structured output rejected: {err}");
        GatewayError::InvalidJson
    })
}
