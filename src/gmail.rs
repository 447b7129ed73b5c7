use anyhow::Context;
use google_gmail1::api::Message;
use google_gmail1::Gmail;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use tracing::debug;

use crate::auth::Credential;
use crate::config::DeleteMode;
use crate::error::{PurgeError, Result};
use crate::mailbox::{MailboxProvider, MessageMetadata, MessagePage};

const USER_ID: &str = "me";

type HttpsClient = google_gmail1::common::Client<HttpsConnector<HttpConnector>>;

/// Gmail API mailbox provider
pub struct GmailMailbox {
    client: HttpsClient,
    delete_mode: DeleteMode,
    query: Option<String>,
}

impl GmailMailbox {
    /// Creates a Gmail provider over a rustls HTTPS client
    pub fn new(delete_mode: DeleteMode, query: Option<String>) -> anyhow::Result<Self> {
        let client = google_gmail1::hyper_util::client::legacy::Client::builder(
            google_gmail1::hyper_util::rt::TokioExecutor::new(),
        )
        .build(
            google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .context("Failed to load native TLS roots")?
                .https_or_http()
                .enable_http1()
                .build(),
        );

        Ok(Self {
            client,
            delete_mode,
            query,
        })
    }

    /// A hub authorized with exactly the caller's token
    fn hub(&self, credential: &Credential) -> Gmail<HttpsConnector<HttpConnector>> {
        Gmail::new(self.client.clone(), credential.access_token().to_string())
    }
}

impl MailboxProvider for GmailMailbox {
    async fn list_messages(
        &self,
        credential: &Credential,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let hub = self.hub(credential);
        let mut request = hub.users().messages_list(USER_ID).max_results(max_results);

        if let Some(query) = &self.query {
            request = request.q(query);
        }
        if let Some(token) = &page_token {
            request = request.page_token(token);
        }

        let (_, response) = request
            .doit()
            .await
            .map_err(|e| classify("Failed to list messages", e))?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| msg.id)
            .collect();

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn get_message_metadata(
        &self,
        credential: &Credential,
        id: &str,
        headers: &'static [&'static str],
    ) -> Result<MessageMetadata> {
        let hub = self.hub(credential);
        let mut request = hub.users().messages_get(USER_ID, id).format("metadata");

        for name in headers {
            request = request.add_metadata_headers(name);
        }

        let (_, msg) = request
            .doit()
            .await
            .map_err(|e| classify("Failed to get message", e))?;

        Ok(parse_headers(&msg))
    }

    async fn delete_message(&self, credential: &Credential, id: &str) -> Result<()> {
        let hub = self.hub(credential);

        match self.delete_mode {
            DeleteMode::Trash => {
                hub.users()
                    .messages_trash(USER_ID, id)
                    .doit()
                    .await
                    .map_err(|e| classify("Failed to trash message", e))?;
            }
            DeleteMode::Permanent => {
                hub.users()
                    .messages_delete(USER_ID, id)
                    .doit()
                    .await
                    .map_err(|e| classify("Failed to delete message", e))?;
            }
        }

        debug!(message_id = %id, mode = ?self.delete_mode, "message deleted");
        Ok(())
    }
}

/// Collects the payload headers of a metadata-format message
fn parse_headers(msg: &Message) -> MessageMetadata {
    let mut meta = MessageMetadata::new();

    let headers = msg
        .payload
        .as_ref()
        .and_then(|payload| payload.headers.as_ref());

    for header in headers.into_iter().flatten() {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            meta.insert(name, value.as_str());
        }
    }

    meta
}

/// Maps a Gmail API error onto the engine's taxonomy
fn classify(context: &str, err: google_gmail1::Error) -> PurgeError {
    let unauthorized = match &err {
        google_gmail1::Error::MissingToken(_) => true,
        google_gmail1::Error::Failure(response) => response.status().as_u16() == 401,
        google_gmail1::Error::BadRequest(body) => error_code(body) == Some(401),
        _ => false,
    };

    if unauthorized {
        PurgeError::Auth(format!("{context}: {err}"))
    } else {
        PurgeError::Provider(format!("{context}: {err}"))
    }
}

/// Extracts `error.code` from a Google API error body
fn error_code(body: &serde_json::Value) -> Option<u64> {
    body.get("error")?.get("code")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePart, MessagePartHeader};
    use serde_json::json;

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_parse_headers() {
        let msg = Message {
            id: Some("abc".to_string()),
            payload: Some(MessagePart {
                headers: Some(vec![
                    header("From", "Jane Doe <jane@x.com>"),
                    header("Subject", "Hello"),
                    header("Date", "Sun, 25 Jan 2026 10:30:00 -0500"),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let meta = parse_headers(&msg);
        assert_eq!(meta.header("from"), Some("Jane Doe <jane@x.com>"));
        assert_eq!(meta.header("subject"), Some("Hello"));
        assert_eq!(meta.header("date"), Some("Sun, 25 Jan 2026 10:30:00 -0500"));
    }

    #[test]
    fn test_parse_headers_without_payload() {
        let meta = parse_headers(&Message::default());
        assert_eq!(meta, MessageMetadata::new());
    }

    #[test]
    fn test_error_code() {
        let body = json!({ "error": { "code": 401, "message": "Invalid Credentials" } });
        assert_eq!(error_code(&body), Some(401));
        assert_eq!(error_code(&json!({ "error": "nope" })), None);
    }

    #[test]
    fn test_classify_bad_request() {
        let unauthorized = google_gmail1::Error::BadRequest(json!({ "error": { "code": 401 } }));
        assert!(classify("Failed to list messages", unauthorized).is_auth());

        let not_found = google_gmail1::Error::BadRequest(json!({ "error": { "code": 404 } }));
        assert!(matches!(
            classify("Failed to get message", not_found),
            PurgeError::Provider(_)
        ));
    }

    #[test]
    fn test_classify_cancelled_is_provider_error() {
        let err = classify("Failed to trash message", google_gmail1::Error::Cancelled);
        assert!(matches!(err, PurgeError::Provider(msg) if msg.starts_with("Failed to trash message")));
    }
}
