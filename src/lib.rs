//! Gmail Vacation Auto-Responder
//!
//! Polls a Gmail inbox and answers every unread, non-bulk message once with a
//! fixed "on vacation" reply, then tags the thread with a marker label so it
//! is never answered again.
//!
//! # Overview
//!
//! Each cycle:
//! - **Authorization**: obtains a Gmail client from the OAuth2 token cache
//! - **Label Management**: finds or creates the marker label
//! - **Scanning**: lists unread inbox mail outside the bulk categories
//! - **Replying**: sends an in-thread reply and labels the thread
//!
//! Cycles repeat after a random 45 to 120 second wait.
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_autoresponder::auth::InstalledAppAuthenticator;
//! use gmail_autoresponder::cli::run_cycles;
//! use gmail_autoresponder::config::Config;
//! use gmail_autoresponder::scheduler::{Scheduler, TokioSleeper};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let authenticator = InstalledAppAuthenticator::new(
//!         "credentials.json",
//!         ".gmail-autoresponder/token.json",
//!     );
//!
//!     let mut scheduler = Scheduler::from_config(&config.schedule, TokioSleeper)?;
//!     let totals = run_cycles(&authenticator, &config, &mut scheduler).await?;
//!     println!("Sent {} replies", totals.replies_sent);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Gmail API client trait and production implementation
//! - [`cli`] - Command-line interface and run orchestration
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`label_manager`] - Marker label lookup and creation
//! - [`models`] - Core data structures
//! - [`reply`] - Reply composition and encoding
//! - [`responder`] - Per-cycle scan and reply logic
//! - [`scheduler`] - Polling loop with randomized delay

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod label_manager;
pub mod models;
pub mod reply;
pub mod responder;
pub mod scheduler;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

// Core data models
pub use models::{CycleReport, InboxMessage, LabelInfo, MessageOutcome, MessageRef, ReplyStatus};

// Config types
pub use config::{Config, ExecutionConfig, ResponderConfig, ScheduleConfig};

// Client and auth traits
pub use auth::{CredentialProvider, InstalledAppAuthenticator};
pub use client::{GmailClient, ProductionGmailClient};

// Cycle components
pub use label_manager::LabelManager;
pub use reply::{build_reply, compose_reply, ReplyMessage};
pub use responder::{build_unread_query, CycleRunner, Responder};
pub use scheduler::{DelayRange, Scheduler, Sleeper, StopHandle, TokioSleeper};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, RunOptions, RunTotals};
