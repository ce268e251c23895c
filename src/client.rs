//! Gmail API client used by the label ensurer and the responder

use async_trait::async_trait;
use google_gmail1::api::{Label, Message, ModifyThreadRequest};
use std::future::Future;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, MODIFY_SCOPE};
use crate::error::{GmailError, Result};
use crate::models::{InboxMessage, LabelInfo, MessageRef};
use crate::reply::decode_raw;

/// Headers requested when fetching a message for reply
const REPLY_HEADERS: &[&str] = &["From", "To", "Subject", "Message-ID"];

/// Trait defining the mailbox operations the responder needs, for easier testing
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List every message matching a Gmail search query (all pages)
    async fn list_messages(&self, query: &str) -> Result<Vec<MessageRef>>;

    /// Fetch a message's reply headers and label set
    async fn get_message(&self, id: &str) -> Result<InboxMessage>;

    /// Label ids of the first message of a thread
    async fn get_thread_labels(&self, thread_id: &str) -> Result<Vec<String>>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a user label visible in the message and label lists
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Send a base64url `raw` message into a thread, returning the new message id
    async fn send_message(&self, raw: &str, thread_id: &str) -> Result<String>;

    /// Add labels to every message of a thread
    async fn add_thread_labels(&self, thread_id: &str, label_ids: &[String]) -> Result<()>;
}

/// Production Gmail client backed by the `google-gmail1` hub
///
/// Calls are not retried; a failed call surfaces to the responder, which
/// either records it against the message or ends the cycle.
pub struct ProductionGmailClient {
    hub: GmailHub,
    call_timeout: Duration,
}

impl ProductionGmailClient {
    /// Create a new production Gmail client
    pub fn new(hub: GmailHub) -> Self {
        Self {
            hub,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Override the per-call timeout
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Run an API call, turning an elapsed timeout into a network error
    async fn timed<T, Fut>(&self, operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        debug!("Calling Gmail API: {}", operation_name);
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(GmailError::from),
            Err(_) => {
                warn!(
                    "Gmail API {} call timed out after {:?}",
                    operation_name, self.call_timeout
                );
                Err(GmailError::NetworkError(format!(
                    "API call timed out after {:?}",
                    self.call_timeout
                )))
            }
        }
    }
}

/// Parse a Gmail API Message into an InboxMessage
pub(crate) fn parse_inbox_message(msg: Message) -> Result<InboxMessage> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let thread_id = msg
        .thread_id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let mut parsed = InboxMessage {
        id,
        thread_id,
        ..Default::default()
    };

    let headers = msg
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default();

    for header in headers {
        if let (Some(name), Some(value)) = (header.name, header.value) {
            // Header names are case-insensitive; the first occurrence wins
            let slot = match name.to_lowercase().as_str() {
                "from" => &mut parsed.from,
                "to" => &mut parsed.to,
                "subject" => &mut parsed.subject,
                "message-id" => &mut parsed.message_id_header,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    }

    Ok(parsed)
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_messages(&self, query: &str) -> Result<Vec<MessageRef>> {
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(query)
                .max_results(100);

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = self
                .timed("messages.list", call.add_scope(MODIFY_SCOPE).doit())
                .await?;

            for msg_ref in response.messages.unwrap_or_default() {
                if let (Some(id), Some(thread_id)) = (msg_ref.id, msg_ref.thread_id) {
                    refs.push(MessageRef { id, thread_id });
                }
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Query '{}' matched {} messages", query, refs.len());
        Ok(refs)
    }

    async fn get_message(&self, id: &str) -> Result<InboxMessage> {
        let mut call = self.hub.users().messages_get("me", id).format("metadata");
        for header in REPLY_HEADERS {
            call = call.add_metadata_headers(header);
        }

        let (_, msg) = self
            .timed("messages.get", call.add_scope(MODIFY_SCOPE).doit())
            .await?;

        parse_inbox_message(msg)
    }

    async fn get_thread_labels(&self, thread_id: &str) -> Result<Vec<String>> {
        let call = self
            .hub
            .users()
            .threads_get("me", thread_id)
            .format("minimal")
            .add_scope(MODIFY_SCOPE);

        let (_, thread) = self.timed("threads.get", call.doit()).await?;

        Ok(thread
            .messages
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|m| m.label_ids)
            .unwrap_or_default())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let call = self.hub.users().labels_list("me").add_scope(MODIFY_SCOPE);
        let (_, response) = self.timed("labels.list", call.doit()).await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            type_: Some("user".to_string()),
            ..Default::default()
        };

        let call = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope(MODIFY_SCOPE);
        let (_, created_label) = self.timed("labels.create", call.doit()).await?;

        created_label
            .id
            .ok_or_else(|| GmailError::LabelError("Created label has no ID".to_string()))
    }

    async fn send_message(&self, raw: &str, thread_id: &str) -> Result<String> {
        // The send endpoint only takes the message as a media upload
        let bytes = decode_raw(raw)
            .map_err(|e| GmailError::InvalidMessageFormat(format!("Invalid raw message: {}", e)))?;
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| GmailError::InvalidMessageFormat(format!("Invalid media type: {}", e)))?;

        let metadata = Message {
            thread_id: Some(thread_id.to_string()),
            ..Default::default()
        };

        let call = self
            .hub
            .users()
            .messages_send(metadata, "me")
            .add_scope(MODIFY_SCOPE);
        let (_, sent) = self
            .timed("messages.send", call.upload(Cursor::new(bytes), mime_type))
            .await?;

        sent.id
            .ok_or_else(|| GmailError::ApiError("Sent message has no ID".to_string()))
    }

    async fn add_thread_labels(&self, thread_id: &str, label_ids: &[String]) -> Result<()> {
        let modify_request = ModifyThreadRequest {
            add_label_ids: Some(label_ids.to_vec()),
            remove_label_ids: None,
        };

        let call = self
            .hub
            .users()
            .threads_modify(modify_request, "me", thread_id)
            .add_scope(MODIFY_SCOPE);
        self.timed("threads.modify", call.doit()).await?;

        Ok(())
    }
}
