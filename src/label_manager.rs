//! Marker label lookup and creation
use crate::client::GmailClient;
use crate::error::{GmailError, Result};
use crate::models::LabelInfo;
use tracing::{debug, info, warn};

/// Ensures the marker label exists and resolves its id
pub struct LabelManager<'a> {
    client: &'a dyn GmailClient,
    label_name: String,
}

impl<'a> LabelManager<'a> {
    /// Creates a new LabelManager instance
    pub fn new(client: &'a dyn GmailClient, label_name: impl Into<String>) -> Self {
        Self {
            client,
            label_name: label_name.into(),
        }
    }

    /// Returns the marker label id, creating the label if the mailbox has none
    ///
    /// Names are compared exactly. When several labels carry the marker
    /// name, the last one in listing order is used.
    pub async fn ensure_label(&self) -> Result<String> {
        let labels = self.client.list_labels().await?;
        debug!("Loaded {} existing labels", labels.len());

        let matching = count_named(&labels, &self.label_name);
        if matching > 1 {
            warn!(
                "Found {} labels named '{}'; using the last one listed",
                matching, self.label_name
            );
        }

        if let Some(id) = find_label_id(&labels, &self.label_name) {
            debug!("Label '{}' already exists with ID: {}", self.label_name, id);
            return Ok(id);
        }

        info!("Creating label: {}", self.label_name);

        let label_id = self
            .client
            .create_label(&self.label_name)
            .await
            .map_err(|e| {
                if e.is_auth_failure() {
                    return e;
                }
                GmailError::LabelError(format!(
                    "Failed to create label '{}': {}",
                    self.label_name, e
                ))
            })?;

        info!(
            "Successfully created label '{}' with ID: {}",
            self.label_name, label_id
        );
        Ok(label_id)
    }
}

/// Id of the last label whose name equals `name` exactly
pub fn find_label_id(labels: &[LabelInfo], name: &str) -> Option<String> {
    labels
        .iter()
        .filter(|label| label.name == name)
        .last()
        .map(|label| label.id.clone())
}

fn count_named(labels: &[LabelInfo], name: &str) -> usize {
    labels.iter().filter(|label| label.name == name).count()
}

/// Form of a label name usable in a Gmail `label:` search term
///
/// Gmail search writes spaces and hierarchy separators in label names as '-'.
pub fn search_term(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' { '-' } else { c })
        .collect()
}
