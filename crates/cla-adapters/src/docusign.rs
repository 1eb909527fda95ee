//! reqwest transport for the e-signature provider's v2.1 envelopes API.

use async_trait::async_trait;
use cla_core::envelope::{
    EnvelopeClient, EnvelopeDocument, EnvelopeRecipient, EnvelopeRecipients, EnvelopeRequest,
    EnvelopeSummary, RecipientView, RecipientViewRequest, TokenProvider,
};
use cla_core::error::{SignError, SignResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoidRequest<'a> {
    status: &'static str,
    voided_reason: &'a str,
}

#[derive(Debug, Serialize)]
struct AttachDocuments<'a> {
    documents: [&'a EnvelopeDocument; 1],
}

pub struct DocuSignClient {
    client: Client,
    account_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl DocuSignClient {
    /// `base_url` is the REST root, e.g. `https://demo.docusign.net/restapi`.
    pub fn new(
        base_url: &str,
        account_id: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> SignResult<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            SignError::Validation(format!("invalid provider base url '{base_url}': {e}"))
        })?;
        if account_id.trim().is_empty() {
            return Err(SignError::Validation("provider account id is required".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignError::provider("build client", None, e.to_string()))?;

        Ok(Self {
            client,
            account_url: format!(
                "{}/v2.1/accounts/{}",
                base.as_str().trim_end_matches('/'),
                account_id
            ),
            tokens,
        })
    }

    fn envelope_url(&self, envelope_id: &str, suffix: &str) -> String {
        format!("{}/envelopes/{}{}", self.account_url, envelope_id, suffix)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> SignResult<Response> {
        let token = self.tokens.get_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SignError::provider(operation, None, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "provider call succeeded");
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        warn!(
            operation,
            status = status.as_u16(),
            message = %message,
            "provider call failed"
        );
        Err(SignError::provider(operation, Some(status.as_u16()), message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> SignResult<T> {
        self.send(operation, request)
            .await?
            .json()
            .await
            .map_err(|e| SignError::provider(operation, None, format!("invalid response: {e}")))
    }
}

#[async_trait]
impl EnvelopeClient for DocuSignClient {
    async fn create_envelope(&self, request: &EnvelopeRequest) -> SignResult<String> {
        let url = format!("{}/envelopes", self.account_url);
        let summary: EnvelopeSummary = self
            .send_json("create envelope", self.client.post(url).json(request))
            .await?;
        if summary.envelope_id.is_empty() {
            return Err(SignError::provider(
                "create envelope",
                None,
                "response carried no envelopeId",
            ));
        }
        Ok(summary.envelope_id)
    }

    async fn attach_document(
        &self,
        envelope_id: &str,
        document: &EnvelopeDocument,
    ) -> SignResult<()> {
        let url = self.envelope_url(envelope_id, "/documents");
        let body = AttachDocuments {
            documents: [document],
        };
        self.send("attach document", self.client.put(url).json(&body))
            .await?;
        Ok(())
    }

    async fn void_envelope(&self, envelope_id: &str, reason: &str) -> SignResult<()> {
        let url = self.envelope_url(envelope_id, "");
        let body = VoidRequest {
            status: "voided",
            voided_reason: reason,
        };
        self.send("void envelope", self.client.put(url).json(&body))
            .await?;
        Ok(())
    }

    async fn get_sign_url(
        &self,
        envelope_id: &str,
        view: &RecipientViewRequest,
    ) -> SignResult<String> {
        let url = self.envelope_url(envelope_id, "/views/recipient");
        let view: RecipientView = self
            .send_json("create recipient view", self.client.post(url).json(view))
            .await?;
        Ok(view.url)
    }

    async fn get_envelope_recipients(
        &self,
        envelope_id: &str,
    ) -> SignResult<Vec<EnvelopeRecipient>> {
        let url = self.envelope_url(envelope_id, "/recipients");
        let recipients: EnvelopeRecipients = self
            .send_json("list recipients", self.client.get(url))
            .await?;
        Ok(recipients.signers)
    }

    async fn get_signed_document(
        &self,
        envelope_id: &str,
        document_id: &str,
    ) -> SignResult<Vec<u8>> {
        let url = self.envelope_url(envelope_id, &format!("/documents/{document_id}"));
        let bytes = self
            .send("get signed document", self.client.get(url))
            .await?
            .bytes()
            .await
            .map_err(|e| SignError::provider("get signed document", None, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;
    use cla_core::envelope::{EventNotification, Signer, SIGNER_RECIPIENT_ID};
    use cla_core::tabs::Tabs;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ACCOUNT_PATH: &str = "/restapi/v2.1/accounts/acct-1";

    fn client(server: &MockServer) -> DocuSignClient {
        DocuSignClient::new(
            &format!("{}/restapi", server.uri()),
            "acct-1",
            Arc::new(StaticTokenProvider::new("tok-123")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn request() -> EnvelopeRequest {
        EnvelopeRequest::new(
            EnvelopeDocument::pdf("ICLA", "JVBERi0="),
            Signer {
                email: "ada@example.org".into(),
                name: "Ada".into(),
                recipient_id: SIGNER_RECIPIENT_ID.into(),
                client_user_id: Some("sig-1".into()),
                tabs: Tabs::default(),
            },
            "subject",
            "blurb",
        )
        .with_event_notification(EventNotification::on_completed("https://cb.test/x"))
    }

    #[tokio::test]
    async fn create_envelope_posts_wire_request_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{ACCOUNT_PATH}/envelopes")))
            .and(header("authorization", "Bearer tok-123"))
            .and(body_partial_json(json!({
                "status": "sent",
                "recipients": {"signers": [{"clientUserId": "sig-1", "recipientId": "1"}]},
                "eventNotification": {"envelopeEvents": [{"envelopeEventStatusCode": "Completed"}]}
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"envelopeId": "env-42", "status": "sent"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).create_envelope(&request()).await.unwrap();
        assert_eq!(id, "env-42");
    }

    #[tokio::test]
    async fn non_success_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{ACCOUNT_PATH}/envelopes")))
            .respond_with(ResponseTemplate::new(400).set_body_string("INVALID_REQUEST_BODY"))
            .mount(&server)
            .await;

        let err = client(&server).create_envelope(&request()).await.unwrap_err();
        match err {
            SignError::Provider {
                status, message, ..
            } => {
                assert_eq!(status, Some(400));
                assert!(message.contains("INVALID_REQUEST_BODY"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn void_puts_voided_status_and_reason() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{ACCOUNT_PATH}/envelopes/env-1")))
            .and(body_partial_json(json!({"status": "voided", "voidedReason": "superseded"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .void_envelope("env-1", "superseded")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recipient_view_and_recipients() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{ACCOUNT_PATH}/envelopes/env-1/recipients")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "signers": [{"recipientId": "1", "name": "Ada", "email": "ada@example.org", "clientUserId": "sig-1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{ACCOUNT_PATH}/envelopes/env-1/views/recipient")))
            .and(body_partial_json(json!({"clientUserId": "sig-1", "authenticationMethod": "None"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"url": "https://sign.test/abc"})),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let recipients = client.get_envelope_recipients("env-1").await.unwrap();
        assert_eq!(recipients[0].client_user_id.as_deref(), Some("sig-1"));

        let url = client
            .get_sign_url(
                "env-1",
                &RecipientViewRequest::new("ada@example.org", "1", "Ada", "sig-1", "https://back"),
            )
            .await
            .unwrap();
        assert_eq!(url, "https://sign.test/abc");
    }

    #[tokio::test]
    async fn signed_document_returns_raw_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{ACCOUNT_PATH}/envelopes/env-1/documents/1")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;

        let bytes = client(&server)
            .get_signed_document("env-1", "1")
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = DocuSignClient::new(
            "not a url",
            "acct",
            Arc::new(StaticTokenProvider::new("t")),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(SignError::Validation(_))));
    }
}
