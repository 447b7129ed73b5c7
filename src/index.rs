use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

use crate::auth::Credential;
use crate::email::{self, IdentityPolicy, MessageRef, METADATA_HEADERS};
use crate::error::{PurgeError, Result};
use crate::mailbox::{MailboxProvider, MessageMetadata, MAX_PAGE_SIZE};

/// All messages seen from one sender identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderRecord {
    display_name: String,
    identity: String,
    messages: Vec<MessageRef>,
}

impl SenderRecord {
    fn new(identity: String, display_name: String) -> Self {
        Self {
            display_name,
            identity,
            messages: Vec::new(),
        }
    }

    /// Raw From value of the first listed message for this identity
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn count(&self) -> usize {
        self.messages.len()
    }

    /// Messages in listing order
    pub fn messages(&self) -> &[MessageRef] {
        &self.messages
    }

    pub fn message_ids(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.id.as_str())
    }
}

/// Senders ranked by message count, descending; ties keep first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderIndex {
    senders: Vec<SenderRecord>,
    policy: IdentityPolicy,
}

impl SenderIndex {
    /// Groups fetched messages by sender identity, in listing order.
    /// Messages without a usable From header are left out.
    pub fn aggregate<I>(messages: I, policy: IdentityPolicy) -> Self
    where
        I: IntoIterator<Item = (String, MessageMetadata)>,
    {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut senders: Vec<SenderRecord> = Vec::new();

        for (id, meta) in messages {
            // Whitespace-only From values count as missing, see DESIGN.md "Blank From"
            let Some(from) = meta.header(email::FROM).filter(|v| !v.trim().is_empty()) else {
                debug!(message_id = %id, "dropping message without From header");
                continue;
            };

            let identity = policy.identity(from);
            let slot = *positions.entry(identity.clone()).or_insert_with(|| {
                senders.push(SenderRecord::new(identity, from.to_string()));
                senders.len() - 1
            });

            senders[slot].messages.push(MessageRef::new(
                id,
                meta.header(email::SUBJECT),
                meta.header(email::DATE),
            ));
        }

        Self::ranked(senders, policy)
    }

    fn ranked(mut senders: Vec<SenderRecord>, policy: IdentityPolicy) -> Self {
        // sort_by is stable, so equal counts keep first-seen order
        senders.sort_by(|a, b| b.count().cmp(&a.count()));
        Self { senders, policy }
    }

    pub fn senders(&self) -> &[SenderRecord] {
        &self.senders
    }

    pub fn into_senders(self) -> Vec<SenderRecord> {
        self.senders
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Looks up a sender; the input is folded the same way stored identities were
    pub fn get(&self, identity: &str) -> Option<&SenderRecord> {
        let key = self.policy.identity(identity);
        self.senders.iter().find(|s| s.identity == key)
    }

    /// Number of messages across all senders
    pub fn total_messages(&self) -> usize {
        self.senders.iter().map(SenderRecord::count).sum()
    }

    /// Union of the message ids of the given senders, in ranking order.
    /// Unknown identities are ignored.
    pub fn message_ids_for(&self, identities: &[String]) -> Vec<String> {
        let wanted: HashSet<String> = identities
            .iter()
            .map(|identity| self.policy.identity(identity))
            .collect();
        self.senders
            .iter()
            .filter(|s| wanted.contains(&s.identity))
            .flat_map(|s| s.message_ids().map(str::to_string))
            .collect()
    }

    /// Copy of the index with the given messages removed.
    /// Senders left without messages disappear and the rest are re-ranked.
    pub fn without_messages(&self, removed: &HashSet<String>) -> Self {
        let senders = self
            .senders
            .iter()
            .filter_map(|sender| {
                let messages: Vec<MessageRef> = sender
                    .messages
                    .iter()
                    .filter(|m| !removed.contains(&m.id))
                    .cloned()
                    .collect();
                (!messages.is_empty()).then(|| SenderRecord {
                    display_name: sender.display_name.clone(),
                    identity: sender.identity.clone(),
                    messages,
                })
            })
            .collect();
        Self::ranked(senders, self.policy)
    }
}

/// Builds sender indexes from a mailbox provider
pub struct SenderIndexBuilder<P> {
    provider: Arc<P>,
    concurrency: usize,
    policy: IdentityPolicy,
}

impl<P: MailboxProvider> SenderIndexBuilder<P> {
    pub fn new(provider: Arc<P>, concurrency: usize, policy: IdentityPolicy) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
            policy,
        }
    }

    /// Lists up to `max_messages` messages and groups them by sender
    pub async fn build_index(
        &self,
        credential: &Credential,
        max_messages: usize,
    ) -> Result<SenderIndex> {
        if max_messages == 0 {
            return Err(PurgeError::InvalidInput(
                "max_messages must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        let ids = self.list_ids(credential, max_messages).await?;
        let metadata = self.fetch_metadata(credential, &ids).await?;

        let index = SenderIndex::aggregate(ids.into_iter().zip(metadata), self.policy);

        info!(
            senders = index.len(),
            messages = index.total_messages(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sender index built"
        );
        Ok(index)
    }

    /// Follows the listing cursor until it runs out or the cap is reached
    async fn list_ids(&self, credential: &Credential, max_messages: usize) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max_messages - ids.len();
            let page_size = u32::try_from(remaining)
                .unwrap_or(MAX_PAGE_SIZE)
                .min(MAX_PAGE_SIZE);

            let page = self
                .provider
                .list_messages(credential, page_size, page_token.take())
                .await?;

            debug!(
                page_ids = page.ids.len(),
                has_more = page.next_page_token.is_some(),
                "listed message page"
            );

            let listed = page.ids.len();
            ids.extend(page.ids.into_iter().take(remaining));

            page_token = page.next_page_token;
            if page_token.is_none() || listed == 0 || ids.len() >= max_messages {
                break;
            }
        }

        Ok(ids)
    }

    /// Fetches metadata for every id through a bounded pool.
    /// Results land in the slot of their input position, not completion order.
    async fn fetch_metadata(
        &self,
        credential: &Credential,
        ids: &[String],
    ) -> Result<Vec<MessageMetadata>> {
        let mut slots: Vec<Option<MessageMetadata>> = vec![None; ids.len()];
        let mut queue = ids.iter().enumerate();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.concurrency {
                match queue.next() {
                    Some((slot, id)) => {
                        in_flight.push(fetch_one(self.provider.as_ref(), credential, slot, id))
                    }
                    None => break,
                }
            }

            match in_flight.next().await {
                Some(result) => {
                    let (slot, meta) = result?;
                    slots[slot] = Some(meta);
                }
                None => break,
            }
        }

        slots
            .into_iter()
            .zip(ids)
            .map(|(meta, id)| {
                meta.ok_or_else(|| {
                    PurgeError::Provider(format!("No metadata fetched for message {id}"))
                })
            })
            .collect()
    }
}

async fn fetch_one<P: MailboxProvider>(
    provider: &P,
    credential: &Credential,
    slot: usize,
    id: &str,
) -> Result<(usize, MessageMetadata)> {
    let meta = provider
        .get_message_metadata(credential, id, METADATA_HEADERS)
        .await?;
    Ok((slot, meta))
}
