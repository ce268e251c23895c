//! Threaded reply composition
//!
//! Builds the RFC 2822 text of an automated reply and encodes it the way the
//! Gmail `raw` field expects. Nothing here performs I/O.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};

/// Body sent when no other text is configured
pub const DEFAULT_REPLY_BODY: &str =
    "Thank You for Your Message. I'm on a Vacation and will reach out to you soon.";

/// A reply ready to be rendered and sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: String,
    pub thread_id: String,
}

impl ReplyMessage {
    /// Header lines in the order they are written
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("From", self.from.clone()),
            ("To", self.to.clone()),
            ("Subject", self.subject.clone()),
            ("Thread-ID", self.thread_id.clone()),
            // Original Message-ID, not the thread id
            ("In-Reply-To", self.in_reply_to.clone()),
            ("References", format!("{}, {}", self.in_reply_to, self.thread_id)),
            ("Content-Type", "text/plain; charset=utf-8".to_string()),
        ]
    }

    /// Render as CRLF-separated message text
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .headers()
            .into_iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        lines.push(String::new());
        lines.push(self.body.clone());
        lines.join("\r\n")
    }

    /// base64url encoding of [`render`](Self::render)
    pub fn encode_raw(&self) -> String {
        URL_SAFE.encode(self.render())
    }
}

/// Prefix a subject with "Re: "
///
/// The prefix is always added, so replying to "Re: Hi" yields "Re: Re: Hi".
pub fn reply_subject(subject: &str) -> String {
    format!("Re: {}", subject)
}

/// Build the reply record
///
/// `from` is the address the reply is sent from (the original recipient) and
/// `to` the address it goes to (the original sender).
pub fn build_reply(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    original_message_id: &str,
    thread_id: &str,
) -> ReplyMessage {
    ReplyMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: reply_subject(subject),
        body: body.to_string(),
        in_reply_to: original_message_id.to_string(),
        thread_id: thread_id.to_string(),
    }
}

/// Compose a reply and return it encoded for the Gmail `raw` field
pub fn compose_reply(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    original_message_id: &str,
    thread_id: &str,
) -> String {
    build_reply(from, to, subject, body, original_message_id, thread_id).encode_raw()
}

/// Decode a `raw` value produced by [`compose_reply`]
pub fn decode_raw(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE.decode(raw)
}
