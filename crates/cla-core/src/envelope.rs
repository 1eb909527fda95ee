//! Wire types and transport seam for the e-signature provider.
//!
//! Field names follow the provider's JSON contract exactly (camelCase).

use crate::error::SignResult;
use crate::tabs::Tabs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Envelope status the provider is asked to notify on.
pub const COMPLETED_EVENT: &str = "Completed";

/// Status submitted with a new envelope; `sent` dispatches it immediately.
pub const STATUS_SENT: &str = "sent";

/// Document id used for the single CLA document of every envelope.
pub const CLA_DOCUMENT_ID: &str = "1";

/// Recipient id used for the single signer of every envelope.
pub const SIGNER_RECIPIENT_ID: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDocument {
    pub document_base64: String,
    pub document_id: String,
    pub file_extension: String,
    pub name: String,
}

impl EnvelopeDocument {
    pub fn pdf(name: impl Into<String>, document_base64: impl Into<String>) -> Self {
        Self {
            document_base64: document_base64.into(),
            document_id: CLA_DOCUMENT_ID.to_string(),
            file_extension: "pdf".to_string(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub email: String,
    pub name: String,
    pub recipient_id: String,
    /// Present only for embedded signing; its absence makes the provider email the signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_user_id: Option<String>,
    #[serde(default)]
    pub tabs: Tabs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipients {
    pub signers: Vec<Signer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeEvent {
    pub envelope_event_status_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    pub url: String,
    pub logging_enabled: String,
    pub envelope_events: Vec<EnvelopeEvent>,
}

impl EventNotification {
    /// Notification on envelope completion only.
    pub fn on_completed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            logging_enabled: "true".to_string(),
            envelope_events: vec![EnvelopeEvent {
                envelope_event_status_code: COMPLETED_EVENT.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRequest {
    pub documents: Vec<EnvelopeDocument>,
    pub recipients: Recipients,
    pub email_subject: String,
    pub email_blurb: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_notification: Option<EventNotification>,
    pub status: String,
}

impl EnvelopeRequest {
    pub fn new(
        document: EnvelopeDocument,
        signer: Signer,
        email_subject: impl Into<String>,
        email_blurb: impl Into<String>,
    ) -> Self {
        Self {
            documents: vec![document],
            recipients: Recipients {
                signers: vec![signer],
            },
            email_subject: email_subject.into(),
            email_blurb: email_blurb.into(),
            event_notification: None,
            status: STATUS_SENT.to_string(),
        }
    }

    pub fn with_event_notification(mut self, notification: EventNotification) -> Self {
        self.event_notification = Some(notification);
        self
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.recipients.signers.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    pub envelope_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Request for an embedded-signing session URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientViewRequest {
    pub authentication_method: String,
    pub email: String,
    pub user_name: String,
    pub recipient_id: String,
    pub client_user_id: String,
    pub return_url: String,
}

impl RecipientViewRequest {
    pub fn new(
        email: impl Into<String>,
        recipient_id: impl Into<String>,
        user_name: impl Into<String>,
        client_user_id: impl Into<String>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            authentication_method: "None".to_string(),
            email: email.into(),
            user_name: user_name.into(),
            recipient_id: recipient_id.into(),
            client_user_id: client_user_id.into(),
            return_url: return_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientView {
    pub url: String,
}

/// Recipient as reported back by the provider for an existing envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRecipient {
    pub recipient_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub client_user_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeRecipients {
    #[serde(default)]
    pub signers: Vec<EnvelopeRecipient>,
}

/// Bearer token source for provider calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token valid for at least the next call; refreshes transparently.
    async fn get_token(&self) -> SignResult<String>;
}

/// Stateless transport to the e-signature provider.
///
/// `create_envelope` must not be retried blindly: a failed call may still have
/// created the envelope on the provider side.
#[async_trait]
pub trait EnvelopeClient: Send + Sync {
    async fn create_envelope(&self, request: &EnvelopeRequest) -> SignResult<String>;

    async fn attach_document(
        &self,
        envelope_id: &str,
        document: &EnvelopeDocument,
    ) -> SignResult<()>;

    async fn void_envelope(&self, envelope_id: &str, reason: &str) -> SignResult<()>;

    async fn get_sign_url(
        &self,
        envelope_id: &str,
        view: &RecipientViewRequest,
    ) -> SignResult<String>;

    async fn get_envelope_recipients(&self, envelope_id: &str)
        -> SignResult<Vec<EnvelopeRecipient>>;

    async fn get_signed_document(&self, envelope_id: &str, document_id: &str)
        -> SignResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_request_uses_provider_field_names() {
        let request = EnvelopeRequest::new(
            EnvelopeDocument::pdf("ICLA", "JVBERi0="),
            Signer {
                email: "a@example.org".into(),
                name: "Ada".into(),
                recipient_id: SIGNER_RECIPIENT_ID.into(),
                client_user_id: Some("sig-1".into()),
                tabs: Tabs::default(),
            },
            "subject",
            "blurb",
        )
        .with_event_notification(EventNotification::on_completed("https://cb/x"));

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["documents"][0]["documentBase64"], "JVBERi0=");
        assert_eq!(value["documents"][0]["documentId"], "1");
        assert_eq!(value["documents"][0]["fileExtension"], "pdf");
        assert_eq!(value["recipients"]["signers"][0]["clientUserId"], "sig-1");
        assert_eq!(value["emailBlurb"], "blurb");
        assert_eq!(value["status"], "sent");
        assert_eq!(
            value["eventNotification"]["envelopeEvents"][0]["envelopeEventStatusCode"],
            "Completed"
        );
        assert_eq!(value["eventNotification"]["loggingEnabled"], "true");
    }

    #[test]
    fn email_signer_omits_client_user_id() {
        let signer = Signer {
            email: "a@example.org".into(),
            name: "Ada".into(),
            recipient_id: SIGNER_RECIPIENT_ID.into(),
            client_user_id: None,
            tabs: Tabs::default(),
        };
        let value = serde_json::to_value(&signer).unwrap();
        assert!(value.get("clientUserId").is_none());
    }
}
