use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Duration, Utc};
use tracing::debug;

use crate::auth::Credential;
use crate::email::{DATE, FROM, SUBJECT};
use crate::error::{PurgeError, Result};
use crate::mailbox::{MailboxProvider, MessageMetadata, MessagePage};

#[derive(Debug, Clone)]
struct DemoMessage {
    id: String,
    from: Option<String>,
    subject: Option<String>,
    date: Option<String>,
}

impl DemoMessage {
    fn header(&self, name: &str) -> Option<&str> {
        match name {
            n if n.eq_ignore_ascii_case(FROM) => self.from.as_deref(),
            n if n.eq_ignore_ascii_case(SUBJECT) => self.subject.as_deref(),
            n if n.eq_ignore_ascii_case(DATE) => self.date.as_deref(),
            _ => None,
        }
    }
}

/// In-memory mailbox used by `--demo` and by tests.
/// Listing order is the insertion order, newest first.
#[derive(Debug, Default)]
pub struct DemoMailbox {
    messages: Mutex<Vec<DemoMessage>>,
    failing_deletes: HashSet<String>,
}

impl DemoMailbox {
    /// Creates a realistic demo mailbox for trying out the server and CLI
    pub fn seeded() -> Self {
        let now = Utc::now();
        let seed: [(&str, Option<&str>, Option<&str>, Duration); 16] = [
            (
                "demo_1",
                Some("GitHub <notifications@github.com>"),
                Some("[rust-lang/rust] Fix ICE in pattern matching (PR #12345)"),
                Duration::hours(1),
            ),
            (
                "demo_2",
                Some("Linear <notify@linear.app>"),
                Some("ENG-1234: Implement user authentication"),
                Duration::hours(2),
            ),
            (
                "demo_3",
                Some("Alice Chen <alice@example.com>"),
                Some("Re: Coffee tomorrow?"),
                Duration::hours(3),
            ),
            (
                "demo_4",
                Some("GitHub <notifications@github.com>"),
                Some("[tokio-rs/tokio] New issue: Memory leak in async runtime"),
                Duration::hours(5),
            ),
            (
                "demo_5",
                Some("Stripe <receipts@stripe.com>"),
                Some("Your receipt from Acme Corp"),
                Duration::hours(9),
            ),
            (
                "demo_6",
                Some("This Week in Rust <noreply@this-week-in-rust.org>"),
                Some("This Week in Rust 542"),
                Duration::hours(20),
            ),
            (
                "demo_7",
                Some("GitHub <notifications@github.com>"),
                Some("Your mass migration jobs are now available"),
                Duration::days(1),
            ),
            (
                "demo_8",
                Some("Slack <feedback@slack.com>"),
                Some("Your daily digest from Acme Workspace"),
                Duration::days(1),
            ),
            (
                "demo_9",
                None,
                Some("Undelivered draft"),
                Duration::days(1),
            ),
            (
                "demo_10",
                Some("Linear <notify@linear.app>"),
                Some("Weekly project digest - Sprint 42"),
                Duration::days(2),
            ),
            (
                "demo_11",
                Some("Stripe <receipts@stripe.com>"),
                Some("Your receipt from Cloud Services Inc"),
                Duration::days(3),
            ),
            (
                "demo_12",
                Some("GitHub <notifications@github.com>"),
                None,
                Duration::days(4),
            ),
            (
                "demo_13",
                Some("Amazon Web Services <no-reply@aws.amazon.com>"),
                Some("AWS Billing Alert: Your costs exceeded the threshold"),
                Duration::days(5),
            ),
            (
                "demo_14",
                Some("Slack <feedback@slack.com>"),
                Some("Your daily digest from Acme Workspace"),
                Duration::days(6),
            ),
            (
                "demo_15",
                Some("Alice Chen <alice@example.com>"),
                Some("Coffee tomorrow?"),
                Duration::days(7),
            ),
            (
                "demo_16",
                Some("noreply@figma.com"),
                Some("Bob commented on 'Homepage Redesign'"),
                Duration::days(8),
            ),
        ];

        let messages = seed
            .into_iter()
            .map(|(id, from, subject, age)| DemoMessage {
                id: id.to_string(),
                from: from.map(str::to_string),
                subject: subject.map(str::to_string),
                date: Some((now - age).to_rfc2822()),
            })
            .collect();

        Self {
            messages: Mutex::new(messages),
            failing_deletes: HashSet::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DemoMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
impl DemoMailbox {
    /// Creates a mailbox of `(id, From)` pairs with generated subjects and dates
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let messages = messages
            .into_iter()
            .map(|(id, from)| DemoMessage {
                id: id.to_string(),
                from: from.map(str::to_string),
                subject: Some(format!("Message {id}")),
                date: Some("Mon, 6 Jan 2025 09:00:00 +0000".to_string()),
            })
            .collect();
        Self {
            messages: Mutex::new(messages),
            failing_deletes: HashSet::new(),
        }
    }

    /// Makes deletes of the given ids fail with a provider error
    pub fn with_failing_deletes<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.failing_deletes
            .extend(ids.into_iter().map(str::to_string));
        self
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

fn authorize(credential: &Credential) -> Result<()> {
    if credential.access_token().is_empty() {
        return Err(PurgeError::Auth("Empty access token".to_string()));
    }
    Ok(())
}

impl MailboxProvider for DemoMailbox {
    async fn list_messages(
        &self,
        credential: &Credential,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        authorize(credential)?;

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| PurgeError::Provider(format!("Invalid page token {token}")))?,
            None => 0,
        };

        let messages = self.lock();
        let end = messages.len().min(offset.saturating_add(max_results as usize));
        let ids = messages
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let next_page_token = (end < messages.len()).then(|| end.to_string());

        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message_metadata(
        &self,
        credential: &Credential,
        id: &str,
        headers: &'static [&'static str],
    ) -> Result<MessageMetadata> {
        authorize(credential)?;

        let messages = self.lock();
        let message = messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| PurgeError::Provider(format!("Message {id} not found")))?;

        let mut meta = MessageMetadata::new();
        for name in headers {
            if let Some(value) = message.header(name) {
                meta.insert(name, value);
            }
        }
        Ok(meta)
    }

    async fn delete_message(&self, credential: &Credential, id: &str) -> Result<()> {
        authorize(credential)?;

        if self.failing_deletes.contains(id) {
            return Err(PurgeError::Provider(format!("Failed to delete message {id}")));
        }

        let mut messages = self.lock();
        let before = messages.len();
        messages.retain(|m| m.id != id);
        if messages.len() == before {
            return Err(PurgeError::Provider(format!("Message {id} not found")));
        }

        debug!(message_id = %id, remaining = messages.len(), "demo message deleted");
        Ok(())
    }
}
