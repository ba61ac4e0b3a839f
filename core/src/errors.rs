//! Central error catalogue for the generation pipeline.
//!
//! Every provider-specific failure is translated into one of these shapes
//! before it crosses a component boundary, so the dispatcher never inspects
//! upstream error bodies and the HTTP layer maps variants to status codes
//! mechanically.

use thiserror::Error;

use crate::retry::RetryClass;

/// Failures raised by the provider gateway while serving a generation call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing required parameters")]
    Validation,
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("API key not configured for {0}")]
    MissingCredentials(&'static str),
    /// Retryable upstream fault: 429, 5xx, or a network-level failure
    /// (`status` is `None` when the request never produced a response).
    #[error("Upstream error{}: {detail}", fmt_status(.status))]
    TransientUpstream { status: Option<u16>, detail: String },
    #[error("API Error ({status}): {detail}")]
    TerminalUpstream { status: u16, detail: String },
    #[error("AI returned invalid JSON")]
    InvalidJson,
    #[error("AI returned no content")]
    NoContent,
    #[error("API call failed after {attempts} retries: {last}")]
    Exhausted { attempts: u32, last: String },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "GW-0400",
            Self::UnsupportedProvider(_) => "GW-0401",
            Self::MissingCredentials(_) => "GW-0500",
            Self::TransientUpstream { .. } => "GW-0502",
            Self::TerminalUpstream { .. } => "GW-0503",
            Self::InvalidJson => "GW-0504",
            Self::NoContent => "GW-0505",
            Self::Exhausted { .. } => "GW-0506",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::Validation => "The request omitted the user query or the system prompt.",
            Self::UnsupportedProvider(_) => "The provider field matched no configured backend.",
            Self::MissingCredentials(_) => {
                "Neither the request nor the server environment supplied an API key."
            }
            Self::TransientUpstream { .. } => {
                "The upstream provider was throttling or unavailable; the call was retried."
            }
            Self::TerminalUpstream { .. } => {
                "The upstream provider rejected the request; retrying would not help."
            }
            Self::InvalidJson => "The model output did not parse as the structured result object.",
            Self::NoContent => "The upstream response carried no candidate content to parse.",
            Self::Exhausted { .. } => "Every retry attempt failed; the last error is included.",
        }
    }

    /// HTTP status the gateway surface should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation | Self::UnsupportedProvider(_) => 400,
            _ => 500,
        }
    }
}

impl RetryClass for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientUpstream { .. })
    }

    fn after_retries(self, attempts: u32) -> Self {
        Self::Exhausted {
            attempts,
            last: self.to_string(),
        }
    }
}

/// Failures raised by the caller-side request dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Missing required parameters")]
    Validation,
    #[error("Settings unavailable: {0}")]
    Config(String),
    /// Network-level failure before any response arrived.
    #[error("Request failed: {0}")]
    Transport(String),
    /// Retryable gateway response (429 or 5xx).
    #[error("Gateway returned {status}: {detail}")]
    Unavailable { status: u16, detail: String },
    /// Terminal gateway response; `message` is the parsed `{error}` body.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Malformed generation result: {0}")]
    MalformedResult(String),
    #[error("API call failed after {attempts} retries: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "DSP-0400",
            Self::Config(_) => "DSP-0500",
            Self::Transport(_) => "DSP-0502",
            Self::Unavailable { .. } => "DSP-0503",
            Self::Api { .. } => "DSP-0504",
            Self::MalformedResult(_) => "DSP-0505",
            Self::Exhausted { .. } => "DSP-0506",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::Validation => "The query or system prompt was empty; nothing was dispatched.",
            Self::Config(_) => "The settings store could not supply provider configuration.",
            Self::Transport(_) => "The gateway could not be reached; the call was retried.",
            Self::Unavailable { .. } => {
                "The gateway answered with a retryable status; the call was retried."
            }
            Self::Api { .. } => "The gateway rejected the call with a terminal error.",
            Self::MalformedResult(_) => {
                "The gateway answered 2xx but the body was not a valid generation result."
            }
            Self::Exhausted { .. } => "Every retry attempt failed; the last error is included.",
        }
    }
}

impl RetryClass for DispatchError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable { .. })
    }

    fn after_retries(self, attempts: u32) -> Self {
        Self::Exhausted {
            attempts,
            last: self.to_string(),
        }
    }
}
