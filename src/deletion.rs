use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};

use crate::auth::Credential;
use crate::error::{PurgeError, Result};
use crate::mailbox::MailboxProvider;

/// Per-id result of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub requested: usize,
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    /// Nothing was deleted and the provider rejected the credential
    pub needs_reauthorization: bool,
}

impl DeletionOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.succeeded.len() == self.requested
    }

    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// Message describing the outcome for the user
    pub fn summary(&self) -> String {
        if self.is_complete() {
            format!("Successfully deleted {} emails", self.succeeded.len())
        } else if self.succeeded.is_empty() {
            format!("Failed to delete {} emails", self.failed.len())
        } else {
            format!(
                "Deleted {} of {} emails; {} could not be deleted",
                self.succeeded.len(),
                self.requested,
                self.failed.len()
            )
        }
    }
}

/// Deletes messages concurrently, isolating each id's failure
pub struct BulkDeleter<P> {
    provider: Arc<P>,
    concurrency: usize,
}

impl<P: MailboxProvider> BulkDeleter<P> {
    pub fn new(provider: Arc<P>, concurrency: usize) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
        }
    }

    /// Deletes every id, waiting for all outcomes instead of stopping at the first failure
    pub async fn delete_messages(
        &self,
        credential: &Credential,
        ids: &[String],
    ) -> Result<DeletionOutcome> {
        validate_ids(ids)?;

        let mut outcome = DeletionOutcome {
            requested: ids.len(),
            ..Default::default()
        };
        let mut auth_failures = 0usize;
        let mut queue = ids.iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.concurrency {
                match queue.next() {
                    Some(id) => in_flight.push(delete_one(self.provider.as_ref(), credential, id)),
                    None => break,
                }
            }

            let Some((id, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(()) => {
                    outcome.succeeded.insert(id.to_string());
                }
                Err(e) => {
                    warn!(message_id = %id, error = %e, "delete failed");
                    if e.is_auth() {
                        auth_failures += 1;
                    }
                    outcome.failed.insert(id.to_string());
                }
            }
        }

        outcome.needs_reauthorization = outcome.succeeded.is_empty() && auth_failures > 0;

        info!(
            requested = outcome.requested,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "bulk delete finished"
        );
        Ok(outcome)
    }
}

async fn delete_one<'a, P: MailboxProvider>(
    provider: &P,
    credential: &Credential,
    id: &'a str,
) -> (&'a str, Result<()>) {
    (id, provider.delete_message(credential, id).await)
}

/// Rejects empty batches, blank ids and duplicates
fn validate_ids(ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(PurgeError::InvalidInput("No messages selected".to_string()));
    }

    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if id.trim().is_empty() {
            return Err(PurgeError::InvalidInput(
                "Message ids must not be empty".to_string(),
            ));
        }
        if !seen.insert(id.as_str()) {
            return Err(PurgeError::InvalidInput(format!(
                "Message id {id} is listed more than once"
            )));
        }
    }
    Ok(())
}
