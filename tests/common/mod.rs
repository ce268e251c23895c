//! Common test utilities and fixtures
//!
//! `FakeMailbox` is an in-memory stand-in for a Gmail account. It evaluates
//! the subset of the search syntax the responder uses and records every
//! write so tests can assert on what reached the "server".

#![allow(dead_code)]

use async_trait::async_trait;
use gmail_autoresponder::auth::CredentialProvider;
use gmail_autoresponder::client::GmailClient;
use gmail_autoresponder::error::{GmailError, Result};
use gmail_autoresponder::label_manager::search_term;
use gmail_autoresponder::models::{InboxMessage, LabelInfo, MessageRef};
use gmail_autoresponder::reply::decode_raw;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A message stored in the fake mailbox
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub message_id_header: Option<String>,
    pub labels: Vec<String>,
}

impl StoredMessage {
    /// Unread inbox message with every header the responder needs
    pub fn unread(id: &str, thread_id: &str, from: &str, subject: &str) -> Self {
        Self {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
            from: Some(from.to_string()),
            to: Some("me@example.com".to_string()),
            subject: Some(subject.to_string()),
            message_id_header: Some(format!("<{}@mail.example.com>", id)),
            labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }

    pub fn without_label(mut self, label: &str) -> Self {
        self.labels.retain(|l| l != label);
        self
    }

    pub fn without_from(mut self) -> Self {
        self.from = None;
        self
    }
}

/// A reply that went through `send_message`
#[derive(Debug, Clone)]
pub struct SentReply {
    pub id: String,
    pub thread_id: String,
    pub rendered: String,
}

impl SentReply {
    /// Value of the first header named `name`
    pub fn header(&self, name: &str) -> Option<&str> {
        let head = self.rendered.split("\r\n\r\n").next()?;
        head.split("\r\n").find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.eq_ignore_ascii_case(name) {
                Some(value.trim())
            } else {
                None
            }
        })
    }

    pub fn body(&self) -> &str {
        self.rendered
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or("")
    }
}

#[derive(Debug, Default)]
struct MailboxState {
    messages: Vec<StoredMessage>,
    labels: Vec<LabelInfo>,
    sent: Vec<SentReply>,
    next_label: usize,
    create_label_calls: usize,
    modify_calls: usize,
    fail_list_messages: bool,
    fail_list_labels: bool,
    fail_get: HashSet<String>,
    fail_send: HashSet<String>,
    fail_modify: HashSet<String>,
}

/// Shared in-memory mailbox; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        let mailbox = Self::default();
        for system in ["INBOX", "UNREAD", "SENT"] {
            mailbox.add_label(system, system);
        }
        for category in [
            "CATEGORY_PROMOTIONS",
            "CATEGORY_SOCIAL",
            "CATEGORY_UPDATES",
            "CATEGORY_FORUMS",
        ] {
            mailbox.add_label(category, category);
        }
        mailbox
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.state.lock().unwrap().labels.push(LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn add_message(&self, message: StoredMessage) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn fail_list_messages(&self) {
        self.state.lock().unwrap().fail_list_messages = true;
    }

    pub fn fail_list_labels(&self) {
        self.state.lock().unwrap().fail_list_labels = true;
    }

    pub fn fail_get(&self, message_id: &str) {
        self.state.lock().unwrap().fail_get.insert(message_id.to_string());
    }

    pub fn fail_send(&self, thread_id: &str) {
        self.state.lock().unwrap().fail_send.insert(thread_id.to_string());
    }

    pub fn fail_modify(&self, thread_id: &str) {
        self.state.lock().unwrap().fail_modify.insert(thread_id.to_string());
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_list_messages = false;
        state.fail_list_labels = false;
        state.fail_get.clear();
        state.fail_send.clear();
        state.fail_modify.clear();
    }

    pub fn sent(&self) -> Vec<SentReply> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_to_thread(&self, thread_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|s| s.thread_id == thread_id)
            .count()
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn labels_named(&self, name: &str) -> usize {
        self.labels().iter().filter(|l| l.name == name).count()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.labels()
            .into_iter()
            .filter(|l| l.name == name)
            .last()
            .map(|l| l.id)
    }

    pub fn create_label_calls(&self) -> usize {
        self.state.lock().unwrap().create_label_calls
    }

    pub fn modify_calls(&self) -> usize {
        self.state.lock().unwrap().modify_calls
    }

    /// Labels on every message of the thread, excluding sent replies
    pub fn thread_has_label(&self, thread_id: &str, label_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        let mut thread = state.messages.iter().filter(|m| m.thread_id == thread_id).peekable();
        thread.peek().is_some() && thread.all(|m| m.labels.iter().any(|l| l == label_id))
    }

    /// Message ids matching `query`, in mailbox order
    pub fn search(&self, query: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .messages
            .iter()
            .filter(|m| matches_query(&state.labels, m, query))
            .map(|m| m.id.clone())
            .collect()
    }
}

/// Evaluate the search terms the responder builds
///
/// Supported: `is:unread`, `label:inbox`, `-label:<name or id>`.
fn matches_query(labels: &[LabelInfo], message: &StoredMessage, query: &str) -> bool {
    let has = |term: &str| {
        message.labels.iter().any(|id| {
            id.eq_ignore_ascii_case(term)
                || labels
                    .iter()
                    .any(|l| &l.id == id && search_term(&l.name).eq_ignore_ascii_case(term))
        })
    };

    query.split_whitespace().all(|token| {
        if token == "is:unread" {
            has("UNREAD")
        } else if let Some(term) = token.strip_prefix("-label:") {
            !has(term)
        } else if let Some(term) = token.strip_prefix("label:") {
            has(term)
        } else {
            panic!("unsupported search token: {}", token)
        }
    })
}

#[async_trait]
impl GmailClient for FakeMailbox {
    async fn list_messages(&self, query: &str) -> Result<Vec<MessageRef>> {
        let state = self.state.lock().unwrap();
        if state.fail_list_messages {
            return Err(GmailError::ServerError {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| matches_query(&state.labels, m, query))
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
            })
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<InboxMessage> {
        let state = self.state.lock().unwrap();
        if state.fail_get.contains(id) {
            return Err(GmailError::NetworkError(format!("connection reset fetching {}", id)));
        }
        let message = state
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))?;
        Ok(InboxMessage {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            subject: message.subject.clone(),
            message_id_header: message.message_id_header.clone(),
        })
    }

    async fn get_thread_labels(&self, thread_id: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .messages
            .iter()
            .find(|m| m.thread_id == thread_id)
            .map(|m| m.labels.clone())
            .ok_or_else(|| GmailError::MessageNotFound(format!("thread {}", thread_id)))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let state = self.state.lock().unwrap();
        if state.fail_list_labels {
            return Err(GmailError::ApiError("labels.list failed".to_string()));
        }
        Ok(state.labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.create_label_calls += 1;
        if state.labels.iter().any(|l| l.name == name) {
            return Err(GmailError::BadRequest(format!("Label name exists: {}", name)));
        }
        state.next_label += 1;
        let id = format!("Label_{}", state.next_label);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn send_message(&self, raw: &str, thread_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send.contains(thread_id) {
            return Err(GmailError::ServerError {
                status: 500,
                message: "send failed".to_string(),
            });
        }
        let bytes = decode_raw(raw)
            .map_err(|e| GmailError::InvalidMessageFormat(format!("raw is not base64url: {}", e)))?;
        let rendered = String::from_utf8(bytes)
            .map_err(|e| GmailError::InvalidMessageFormat(e.to_string()))?;

        let id = format!("sent-{}", state.sent.len() + 1);
        state.sent.push(SentReply {
            id: id.clone(),
            thread_id: thread_id.to_string(),
            rendered,
        });
        Ok(id)
    }

    async fn add_thread_labels(&self, thread_id: &str, label_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.modify_calls += 1;
        if state.fail_modify.contains(thread_id) {
            return Err(GmailError::RateLimited("threads.modify".to_string()));
        }
        if !state.messages.iter().any(|m| m.thread_id == thread_id) {
            return Err(GmailError::MessageNotFound(format!("thread {}", thread_id)));
        }
        for message in state.messages.iter_mut().filter(|m| m.thread_id == thread_id) {
            for label in label_ids {
                if !message.labels.contains(label) {
                    message.labels.push(label.clone());
                }
            }
        }
        Ok(())
    }
}

/// Hands out clients backed by one shared `FakeMailbox`
#[derive(Debug, Default)]
pub struct FakeProvider {
    mailbox: FakeMailbox,
    auth_failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(mailbox: FakeMailbox) -> Self {
        Self {
            mailbox,
            auth_failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// The next `n` authorizations fail
    pub fn fail_next_authorizations(&self, n: usize) {
        self.auth_failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for FakeProvider {
    async fn obtain_authorized_client(&self) -> Result<Box<dyn GmailClient>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.auth_failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.auth_failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(GmailError::AuthError("token has been revoked".to_string()));
        }
        Ok(Box::new(self.mailbox.clone()))
    }
}
