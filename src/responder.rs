//! Inbox scanner and responder
//!
//! One call to [`Responder::scan_and_respond`] queries the inbox for unread,
//! unanswered, non-bulk messages and handles each in turn: fetch its headers,
//! look at the thread's labels, and if the marker label is absent send the
//! reply and mark the thread. Each message yields its own [`MessageOutcome`],
//! so one bad message never stops the rest of the batch.
//!
//! Sending and marking are two separate calls. If marking fails after the
//! reply went out, the thread still matches the query next cycle and is
//! answered again.

use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::CredentialProvider;
use crate::client::GmailClient;
use crate::config::ResponderConfig;
use crate::error::{GmailError, Result};
use crate::label_manager::{search_term, LabelManager};
use crate::models::{CycleReport, InboxMessage, MessageOutcome, MessageRef, ReplyStatus};
use crate::reply::build_reply;

/// Build the admission query: unread, in the inbox, not yet marked, not bulk
pub fn build_unread_query(label_name: &str, excluded_categories: &[String]) -> String {
    let mut terms = vec![
        "is:unread".to_string(),
        "label:inbox".to_string(),
        format!("-label:{}", search_term(label_name)),
    ];
    terms.extend(
        excluded_categories
            .iter()
            .map(|category| format!("-label:{}", category.trim())),
    );
    terms.join(" ")
}

fn require_header<'m>(message: &'m InboxMessage, value: &'m Option<String>, name: &str) -> Result<&'m str> {
    value.as_deref().ok_or_else(|| GmailError::MissingHeader {
        message_id: message.id.clone(),
        header: name.to_string(),
    })
}

/// Scans the inbox and answers each eligible thread once
pub struct Responder<'a> {
    client: &'a dyn GmailClient,
    config: &'a ResponderConfig,
    dry_run: bool,
}

impl<'a> Responder<'a> {
    pub fn new(client: &'a dyn GmailClient, config: &'a ResponderConfig) -> Self {
        Self {
            client,
            config,
            dry_run: false,
        }
    }

    /// Compose replies without sending them or touching labels
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn query(&self) -> String {
        build_unread_query(&self.config.label_name, &self.config.excluded_categories)
    }

    /// Run one scan to completion
    ///
    /// Only the listing query can fail the whole scan; failures while
    /// handling a message are returned inside that message's outcome.
    pub async fn scan_and_respond(&self, marker_label_id: &str) -> Result<Vec<MessageOutcome>> {
        let query = self.query();
        let unread = self.client.list_messages(&query).await?;

        if unread.is_empty() {
            debug!("No unread messages need a reply");
            return Ok(Vec::new());
        }

        info!("Found {} unread messages to check", unread.len());

        // Threads a dry run has already counted; nothing marks them on the server
        let mut dry_run_threads = HashSet::new();
        let mut outcomes = Vec::with_capacity(unread.len());
        for msg_ref in unread {
            let result = self
                .respond_to(&msg_ref, marker_label_id, &mut dry_run_threads)
                .await;
            if let Err(e) = &result {
                error!("Failed to process message {}: {}", msg_ref.id, e);
            }
            outcomes.push(MessageOutcome {
                message_id: msg_ref.id,
                thread_id: msg_ref.thread_id,
                result,
            });
        }

        Ok(outcomes)
    }

    async fn respond_to(
        &self,
        msg_ref: &MessageRef,
        marker_label_id: &str,
        dry_run_threads: &mut HashSet<String>,
    ) -> Result<ReplyStatus> {
        let message = self.client.get_message(&msg_ref.id).await?;

        let original_from = require_header(&message, &message.from, "From")?;
        let original_to = require_header(&message, &message.to, "To")?;
        let subject = require_header(&message, &message.subject, "Subject")?;
        let original_message_id = require_header(&message, &message.message_id_header, "Message-ID")?;
        let thread_id = message.thread_id.as_str();

        let thread_labels = self.client.get_thread_labels(thread_id).await?;
        if thread_labels.iter().any(|label| label == marker_label_id)
            || (self.dry_run && dry_run_threads.contains(thread_id))
        {
            debug!("Thread {} already answered, skipping message {}", thread_id, message.id);
            return Ok(ReplyStatus::AlreadyMarked);
        }

        // The reply comes from the address the original was sent to
        let reply = build_reply(
            original_to,
            original_from,
            subject,
            &self.config.reply_body,
            original_message_id,
            thread_id,
        );

        if self.dry_run {
            dry_run_threads.insert(thread_id.to_string());
            info!(
                "[dry run] Would reply to {} in thread {} with subject '{}'",
                reply.to, thread_id, reply.subject
            );
            return Ok(ReplyStatus::WouldReply);
        }

        let reply_id = self.client.send_message(&reply.encode_raw(), thread_id).await?;
        info!("Sent reply {} to {} in thread {}", reply_id, reply.to, thread_id);

        if let Err(e) = self
            .client
            .add_thread_labels(thread_id, &[marker_label_id.to_string()])
            .await
        {
            warn!(
                "Reply {} was sent but thread {} could not be marked; it will be answered again",
                reply_id, thread_id
            );
            return Err(e);
        }

        Ok(ReplyStatus::Replied { reply_id })
    }
}

/// One full cycle: authorize, ensure the marker label, scan and respond
pub struct CycleRunner<'a> {
    provider: &'a dyn CredentialProvider,
    config: &'a ResponderConfig,
    dry_run: bool,
}

impl<'a> CycleRunner<'a> {
    pub fn new(provider: &'a dyn CredentialProvider, config: &'a ResponderConfig, dry_run: bool) -> Self {
        Self {
            provider,
            config,
            dry_run,
        }
    }

    /// Run cycle number `cycle`
    ///
    /// A fresh client is obtained every time. Errors from authorization,
    /// the label ensurer or the listing query are returned; per-message
    /// errors are in the report.
    pub async fn run_cycle(&self, cycle: u64) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4().to_string();
        let span = info_span!("cycle", cycle, id = %cycle_id);

        async move {
            let started_at = Utc::now();

            let client = self.provider.obtain_authorized_client().await?;
            let marker_label_id = LabelManager::new(client.as_ref(), self.config.label_name.as_str())
                .ensure_label()
                .await?;

            let outcomes = Responder::new(client.as_ref(), self.config)
                .dry_run(self.dry_run)
                .scan_and_respond(&marker_label_id)
                .await?;

            let report = CycleReport {
                cycle_id,
                started_at,
                completed_at: Utc::now(),
                marker_label_id,
                outcomes,
            };

            info!(
                "Cycle complete: {} scanned, {} replied, {} already answered, {} failed{} ({} ms)",
                report.scanned(),
                report.replied(),
                report.already_marked(),
                report.failed(),
                if self.dry_run {
                    format!(", {} would reply", report.would_reply())
                } else {
                    String::new()
                },
                report.duration_ms()
            );

            Ok::<_, GmailError>(report)
        }
        .instrument(span)
        .await
    }
}
