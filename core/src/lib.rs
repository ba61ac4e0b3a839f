//! Core library for turning raw meeting notes into WhatsApp follow-ups.
//!
//! Each module is intentionally kept lightweight so that the boundaries
//! between responsibilities remain obvious when exploring the codebase:
//! - [`compose`] builds system prompts and user queries from meeting details.
//! - [`dispatcher`] posts generation requests to the gateway with retry.
//! - [`gateway`] talks to the upstream AI providers behind one contract.
//! - [`providers`] describes the supported providers and their model lists.
//! - [`retry`] holds the shared exponential backoff machinery.
//! - [`db`] initialises the SQLite database and applies migrations.
//! - [`stores`] persists settings, snippets, contacts, and history.
//! - [`errors`] keeps the central error catalogue with human friendly metadata.
//! - [`logging`] writes structured diagnostics to the event log table.

pub mod compose;
pub mod db;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod providers;
pub mod retry;
pub mod stores;
