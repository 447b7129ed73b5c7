use std::collections::HashMap;
use std::future::Future;

use crate::auth::Credential;
use crate::error::Result;

/// Gmail caps a single listing page at 500 ids
pub const MAX_PAGE_SIZE: u32 = 500;

/// One page of message ids from the provider's listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    /// Cursor for the next page, `None` once the listing is exhausted
    pub next_page_token: Option<String>,
}

/// Header values fetched for a single message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    // keyed by lowercased header name
    headers: HashMap<String, String>,
}

impl MessageMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a header; later duplicates of the same name are ignored
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.into());
    }

    #[cfg(test)]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Trait for mailbox operations - allows mocking in tests.
/// Every call carries the caller's credential explicitly.
#[cfg_attr(test, mockall::automock)]
pub trait MailboxProvider: Send + Sync {
    /// Lists up to `max_results` message ids, starting at `page_token`
    fn list_messages(
        &self,
        credential: &Credential,
        max_results: u32,
        page_token: Option<String>,
    ) -> impl Future<Output = Result<MessagePage>> + Send;

    /// Fetches only the named headers of a message
    fn get_message_metadata(
        &self,
        credential: &Credential,
        id: &str,
        headers: &'static [&'static str],
    ) -> impl Future<Output = Result<MessageMetadata>> + Send;

    /// Deletes a single message
    fn delete_message(
        &self,
        credential: &Credential,
        id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::METADATA_HEADERS;
    use crate::error::PurgeError;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let meta = MessageMetadata::new().with_header("From", "a@x.com");
        assert_eq!(meta.header("from"), Some("a@x.com"));
        assert_eq!(meta.header("FROM"), Some("a@x.com"));
        assert_eq!(meta.header("Subject"), None);
    }

    #[test]
    fn test_first_header_occurrence_wins() {
        let meta = MessageMetadata::new()
            .with_header("Subject", "first")
            .with_header("subject", "second");
        assert_eq!(meta.header("Subject"), Some("first"));
    }

    #[tokio::test]
    async fn test_mock_provider_list() {
        let mut mock = MockMailboxProvider::new();

        mock.expect_list_messages()
            .with(
                mockall::predicate::always(),
                mockall::predicate::eq(100),
                mockall::predicate::eq(None),
            )
            .returning(|_, _, _| {
                Box::pin(async {
                    Ok(MessagePage {
                        ids: vec!["1".to_string()],
                        next_page_token: None,
                    })
                })
            });

        let page = mock
            .list_messages(&Credential::new("t"), 100, None)
            .await
            .unwrap();
        assert_eq!(page.ids, vec!["1"]);
    }

    #[tokio::test]
    async fn test_mock_provider_metadata() {
        let mut mock = MockMailboxProvider::new();

        mock.expect_get_message_metadata()
            .withf(|_, id, headers| id == "email123" && headers.len() == 3)
            .returning(|_, _, _| {
                Box::pin(async { Ok(MessageMetadata::new().with_header("From", "a@x.com")) })
            });

        let meta = mock
            .get_message_metadata(&Credential::new("t"), "email123", METADATA_HEADERS)
            .await
            .unwrap();
        assert_eq!(meta.header("From"), Some("a@x.com"));
    }

    #[tokio::test]
    async fn test_mock_provider_delete() {
        let mut mock = MockMailboxProvider::new();

        mock.expect_delete_message()
            .withf(|_, id| id == "email456")
            .returning(|_, _| Box::pin(async { Err(PurgeError::Provider("boom".to_string())) }));

        let result = mock.delete_message(&Credential::new("t"), "email456").await;
        assert!(result.is_err());
    }
}
