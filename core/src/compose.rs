//! Prompt and query composition.
//!
//! Turns structured meeting details plus raw notes into the user query sent
//! alongside a system prompt, resolves snippet markers embedded in the notes,
//! and builds the WhatsApp deep link for the finished message.

use std::fmt;

use anyhow::{bail, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Built-in system prompt for the minutes-of-meeting style.
pub const DEFAULT_MOM_PROMPT: &str = r#"You are an expert administrative assistant. Your task is to generate a concise, professional, and friendly "Minutes of Meeting" (MOM) message suitable for WhatsApp.
- The user will provide raw notes, participant names, meeting details, and optionally, a personalized service snippet.
- Format the output as a single JSON object with two keys: "whatsappMessage" (a string for WhatsApp) and "actionItems" (an array of strings for the user's private to-do list).
- The "whatsappMessage" should start with "Hi [Recipient's Name]," and summarize the key discussion points, decisions, and action items for the *recipient*.
- The "actionItems" array should *only* list tasks for the *user* (the sender), derived from the notes.
- If a [USE_SNIPPET:...] tag is present, you MUST take the provided snippet content, personalize it based on the meeting notes, and weave it *naturally* into the "whatsappMessage". Do not just paste it.
- Be friendly, professional, and concise."#;

/// Built-in system prompt for the sales follow-up style.
pub const DEFAULT_SALES_PROMPT: &str = r#"You are an expert AI Sales Development Representative (SDR). Your task is to generate a persuasive, value-driven, and friendly sales follow-up message suitable for WhatsApp.
- The user will provide raw notes, participant names, meeting details, and optionally, a personalized service snippet.
- Format the output as a single JSON object with two keys: "whatsappMessage" (a string for WhatsApp) and "actionItems" (an array of strings for the user's private to-do list).
- The "whatsappMessage" should start with "Hi [Recipient's Name]," thank them for their time, and reinforce the value proposition of the user's services, connecting it to the recipient's needs discussed in the meeting.
- The "actionItems" array should *only* list sales-related next steps for the *user* (the sender), e.g., "Send proposal," "Follow up next Tuesday."
- If a [USE_SNIPPET:...] tag is present, you MUST take the provided snippet content, personalize it, and make it a core, natural part of the "whatsappMessage" to drive the sale forward.
- The message should be enthusiastic, confident, and clearly define the next step (e.g., "I'll send over that proposal by EOD")."#;

const SNIPPET_MARKER_OPEN: &str = "[USE_SNIPPET: ";

/// Which style of follow-up message to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Mom,
    Sales,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Mom => "mom",
            MessageType::Sales => "sales",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mom" => Ok(MessageType::Mom),
            "sales" => Ok(MessageType::Sales),
            other => bail!("unknown message type '{other}', expected 'mom' or 'sales'"),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default system prompt for the given message type. User overrides stored in
/// settings take precedence at the call site.
pub fn default_prompt(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::Mom => DEFAULT_MOM_PROMPT,
        MessageType::Sales => DEFAULT_SALES_PROMPT,
    }
}

/// Structured details captured alongside the raw notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingDetails {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub company_name: String,
    pub company_address: String,
    pub meeting_location: String,
    pub participants: String,
    pub raw_notes: String,
}

/// Extract the snippet name from a `[USE_SNIPPET: name]` marker in the notes.
/// Only the first marker counts.
pub fn find_snippet_marker(notes: &str) -> Option<&str> {
    let start = notes.find(SNIPPET_MARKER_OPEN)? + SNIPPET_MARKER_OPEN.len();
    let rest = &notes[start..];
    let end = rest.find(']')?;
    Some(&rest[..end])
}

fn or_na(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        "N/A"
    } else {
        trimmed
    }
}

/// Assemble the user query from the meeting details, appending the snippet
/// content when one was resolved.
pub fn build_user_query(details: &MeetingDetails, snippet: Option<&str>) -> String {
    let mut query = format!(
        "\nMeeting Details:\n\
         - Recipient: {}\n\
         - Company: {}\n\
         - Address: {}\n\
         - Location: {}\n\
         - Participants: {}\n\n\
         Raw Meeting Notes:\n{}\n",
        details.recipient_name.trim(),
        or_na(&details.company_name),
        or_na(&details.company_address),
        or_na(&details.meeting_location),
        or_na(&details.participants),
        details.raw_notes
    );
    if let Some(content) = snippet {
        query.push_str("\n\nPersonalize and integrate this service snippet:\n");
        query.push_str(content);
        query.push('\n');
    }
    query
}

/// Build a `wa.me` deep link for the recipient. Non-digit characters in the
/// phone number are stripped, the message is percent-encoded as the `text`
/// query parameter.
pub fn whatsapp_link(phone: &str, message: &str) -> Result<Url> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        bail!("recipient phone number contains no digits");
    }
    let url = Url::parse_with_params(
        &format!("https://wa.me/{digits}"),
        &[("text", message)],
    )?;
    Ok(url)
}
