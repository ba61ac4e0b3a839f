//! SQLite-backed persistence for settings, snippets, contacts, and the
//! generation history. Free functions take a borrowed connection so call
//! sites decide pooling and transactions.

pub mod contacts;
pub mod history;
pub mod settings;
pub mod snippets;
