//! Loading emails from disk.
//!
//! Two input shapes are accepted: JSON (one object or an array of
//! `{"id", "from", "subject", "body"}` objects) and raw RFC 822 messages
//! (`.eml`), parsed with `mail-parser`.

use std::path::Path;

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use serde_json::Value;
use tracing::debug;

use crate::error::ConfigError;
use crate::pipeline::types::Email;

/// Load every email contained in `path`.
///
/// Files ending in `.eml` are parsed as RFC 822; anything else is
/// read as JSON.
pub fn load_emails(path: &Path) -> Result<Vec<Email>, ConfigError> {
    let bytes = std::fs::read(path)?;
    let is_eml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("eml"));

    let emails = if is_eml {
        vec![parse_rfc822(&bytes)?]
    } else {
        parse_json(&bytes)?
    };

    debug!(path = %path.display(), count = emails.len(), "Loaded emails");
    Ok(emails)
}

/// Parse a JSON object or array of objects into emails.
pub fn parse_json(bytes: &[u8]) -> Result<Vec<Email>, ConfigError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ConfigError::ParseError(format!("invalid JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(ConfigError::ParseError(format!(
                "expected an email object or array, found {other}"
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item)
                .map_err(|e| ConfigError::ParseError(format!("email #{i}: {e}")))
        })
        .collect()
}

/// Parse a raw RFC 822 message.
///
/// The Message-ID becomes the email id when present. A missing subject
/// or body is left empty so that validation can reject it.
pub fn parse_rfc822(raw: &[u8]) -> Result<Email, ConfigError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ConfigError::ParseError("unparseable RFC 822 message".into()))?;

    let sender = extract_sender(&parsed)
        .ok_or_else(|| ConfigError::ParseError("message has no From address".into()))?;
    let subject = parsed.subject().unwrap_or_default().trim().to_string();
    let body = extract_text(&parsed);

    let mut email = Email::new(sender, subject, body);
    if let Some(id) = parsed.message_id() {
        email.id = id.to_string();
    }
    if let Some(date) = parsed.date()
        && let Some(received_at) = DateTime::<Utc>::from_timestamp(date.to_timestamp(), 0)
    {
        email.received_at = received_at;
    }
    Ok(email)
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> Option<String> {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.trim().to_string();
        }
    }
    String::new()
}

/// Drop tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                result.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
