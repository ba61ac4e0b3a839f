//! Static provider metadata and model discovery.
//!
//! Profiles are seeded as constants: Gemini ships a fixed model list, while
//! OpenRouter exposes a remote models endpoint that is queried per call.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Minimum context window a remote model must advertise to be listed.
const MIN_MODEL_CONTEXT: u64 = 8000;

/// The two supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenRouter,
}

impl ProviderKind {
    /// Parse the wire-format provider string. Anything unrecognised is left
    /// for the gateway to reject as an unsupported provider.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gemini" => Some(Self::Gemini),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn profile(&self) -> &'static ProviderProfile {
        match self {
            Self::Gemini => &PROVIDER_SEEDS[0],
            Self::OpenRouter => &PROVIDER_SEEDS[1],
        }
    }
}

/// Immutable per-provider metadata, loaded once.
pub struct ProviderProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub api_key_label: &'static str,
    pub api_key_help: &'static str,
    /// `None` when the model list is fixed.
    pub models_endpoint: Option<&'static str>,
    pub default_models: &'static [ModelSeed],
}

pub struct ModelSeed {
    pub id: &'static str,
    pub name: &'static str,
}

pub const PROVIDER_SEEDS: &[ProviderProfile] = &[
    ProviderProfile {
        id: "gemini",
        display_name: "Google Gemini",
        api_key_label: "Gemini API Key",
        api_key_help: "Get your API key from Google AI Studio",
        models_endpoint: None,
        default_models: &[
            ModelSeed {
                id: "gemini-2.0-flash-exp",
                name: "Gemini 2.0 Flash (Experimental)",
            },
            ModelSeed {
                id: "gemini-1.5-pro",
                name: "Gemini 1.5 Pro",
            },
            ModelSeed {
                id: "gemini-1.5-flash",
                name: "Gemini 1.5 Flash",
            },
        ],
    },
    ProviderProfile {
        id: "openrouter",
        display_name: "OpenRouter",
        api_key_label: "OpenRouter API Key",
        api_key_help: "Get your API key from OpenRouter.ai",
        models_endpoint: Some("https://openrouter.ai/api/v1/models"),
        default_models: &[],
    },
];

/// A model offered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub context: Option<u64>,
}

/// List the models available for `kind`.
///
/// Gemini returns its fixed list without touching the network. OpenRouter
/// needs an API key; `endpoint_override` replaces the seeded endpoint in
/// tests.
pub async fn list_models(
    client: &reqwest::Client,
    kind: ProviderKind,
    api_key: Option<&str>,
    endpoint_override: Option<&str>,
) -> Result<Vec<ModelInfo>> {
    let profile = kind.profile();
    match profile.models_endpoint {
        None => Ok(profile
            .default_models
            .iter()
            .map(|seed| ModelInfo {
                id: seed.id.to_string(),
                name: seed.name.to_string(),
                context: None,
            })
            .collect()),
        Some(endpoint) => {
            let api_key = api_key
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| anyhow!("API key required to fetch models"))?;
            let endpoint = endpoint_override.unwrap_or(endpoint);
            let response = client.get(endpoint).bearer_auth(api_key).send().await?;
            if !response.status().is_success() {
                return Err(anyhow!(
                    "Failed to fetch models: {}",
                    response.status().canonical_reason().unwrap_or("error")
                ));
            }
            let body: Value = response.json().await?;
            Ok(filter_remote_models(&body))
        }
    }
}

/// Keep paid models with a workable context window, sorted by display name.
fn filter_remote_models(body: &Value) -> Vec<ModelInfo> {
    let mut models: Vec<ModelInfo> = body
        .get("data")
        .and_then(|data| data.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let id = entry.get("id")?.as_str()?;
                    let context = entry.get("context_length").and_then(|c| c.as_u64());
                    if id.contains("free") || context.unwrap_or(0) < MIN_MODEL_CONTEXT {
                        return None;
                    }
                    Some(ModelInfo {
                        id: id.to_string(),
                        name: entry
                            .get("name")
                            .and_then(|n| n.as_str())
                            .unwrap_or(id)
                            .to_string(),
                        context,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    models.sort_by(|a, b| a.name.cmp(&b.name));
    models
}
