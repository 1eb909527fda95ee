//! Completion webhook payload (provider XML) parsing.

use crate::envelope::COMPLETED_EVENT;
use crate::error::{SignError, SignResult};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct EnvelopeInformationXml {
    #[serde(rename = "EnvelopeStatus")]
    envelope_status: EnvelopeStatusXml,
    /// Account time zone in whole hours from UTC.
    #[serde(rename = "TimeZoneOffset", default)]
    time_zone_offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeStatusXml {
    #[serde(rename = "EnvelopeID")]
    envelope_id: String,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "RecipientStatuses", default)]
    recipient_statuses: RecipientStatusesXml,
    #[serde(rename = "DocumentStatuses", default)]
    document_statuses: DocumentStatusesXml,
}

#[derive(Debug, Default, Deserialize)]
struct RecipientStatusesXml {
    #[serde(rename = "RecipientStatus", default)]
    items: Vec<RecipientStatusXml>,
}

#[derive(Debug, Deserialize)]
struct RecipientStatusXml {
    #[serde(rename = "Email", default)]
    email: Option<String>,
    #[serde(rename = "UserName", default)]
    user_name: Option<String>,
    #[serde(rename = "ClientUserId", default)]
    client_user_id: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Signed", default)]
    signed: Option<String>,
    #[serde(rename = "TabStatuses", default)]
    tab_statuses: TabStatusesXml,
}

#[derive(Debug, Default, Deserialize)]
struct TabStatusesXml {
    #[serde(rename = "TabStatus", default)]
    items: Vec<TabStatusXml>,
}

#[derive(Debug, Deserialize)]
struct TabStatusXml {
    #[serde(rename = "TabLabel", default)]
    tab_label: Option<String>,
    #[serde(rename = "TabValue", default)]
    tab_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentStatusesXml {
    #[serde(rename = "DocumentStatus", default)]
    items: Vec<DocumentStatusXml>,
}

#[derive(Debug, Deserialize)]
struct DocumentStatusXml {
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

/// Normalized view of an "envelope completed" notification.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub envelope_id: String,
    pub envelope_status: Option<String>,
    /// Status of the first recipient; drives the state machine.
    pub status: String,
    pub client_user_id: Option<String>,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub document_id: Option<String>,
    pub tab_values: BTreeMap<String, String>,
    pub raw: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn account_offset(hours: Option<String>) -> Option<FixedOffset> {
    let hours: i32 = non_empty(hours)?.parse().ok()?;
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

/// Timestamps without an offset are in the account's local time; with no
/// `TimeZoneOffset` in the payload they are taken as UTC.
fn parse_signed_at(value: &str, offset: Option<FixedOffset>) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    match offset {
        Some(offset) => naive
            .and_local_timezone(offset)
            .single()
            .map(|local| local.with_timezone(&Utc)),
        None => Some(naive.and_utc()),
    }
}

impl CompletionEvent {
    pub fn parse(body: &str) -> SignResult<Self> {
        let info: EnvelopeInformationXml = quick_xml::de::from_str(body)
            .map_err(|e| SignError::MalformedPayload(e.to_string()))?;
        let offset = account_offset(info.time_zone_offset);
        let status = info.envelope_status;

        if status.envelope_id.trim().is_empty() {
            return Err(SignError::MalformedPayload(
                "EnvelopeStatus.EnvelopeID is empty".to_string(),
            ));
        }

        let recipient = status
            .recipient_statuses
            .items
            .into_iter()
            .next()
            .ok_or_else(|| {
                SignError::MalformedPayload("payload carries no RecipientStatus".to_string())
            })?;

        let tab_values = recipient
            .tab_statuses
            .items
            .into_iter()
            .filter_map(|tab| {
                let label = non_empty(tab.tab_label)?;
                let value = non_empty(tab.tab_value)?;
                Some((label, value))
            })
            .collect();

        Ok(Self {
            envelope_id: status.envelope_id.trim().to_string(),
            envelope_status: non_empty(status.status),
            status: non_empty(recipient.status).unwrap_or_default(),
            client_user_id: non_empty(recipient.client_user_id),
            signer_name: non_empty(recipient.user_name),
            signer_email: non_empty(recipient.email),
            signed_at: non_empty(recipient.signed)
                .as_deref()
                .and_then(|signed| parse_signed_at(signed, offset)),
            document_id: status
                .document_statuses
                .items
                .into_iter()
                .next()
                .and_then(|doc| non_empty(doc.id)),
            tab_values,
            raw: body.to_string(),
        })
    }

    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_EVENT
    }

    /// Full name as typed by the signer, falling back to the recipient name.
    pub fn signer_full_name(&self) -> Option<String> {
        ["full_name", "signatory_name"]
            .iter()
            .find_map(|label| self.tab_values.get(*label).cloned())
            .or_else(|| self.signer_name.clone())
    }

    pub fn signatory_email(&self) -> Option<String> {
        self.tab_values
            .get("signatory_email")
            .cloned()
            .or_else(|| self.signer_email.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn completed_xml(envelope_id: &str, client_user_id: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<DocuSignEnvelopeInformation xmlns="http://www.docusign.net/API/3.0">
  <EnvelopeStatus>
    <RecipientStatuses>
      <RecipientStatus>
        <Type>Signer</Type>
        <Email>ada@example.org</Email>
        <UserName>Ada L</UserName>
        <RecipientId>1</RecipientId>
        <ClientUserId>{client_user_id}</ClientUserId>
        <Status>Completed</Status>
        <Signed>2024-03-01T10:15:30.497</Signed>
        <TabStatuses>
          <TabStatus>
            <TabType>Custom</TabType>
            <TabLabel>full_name</TabLabel>
            <TabValue>Ada Lovelace</TabValue>
          </TabStatus>
        </TabStatuses>
      </RecipientStatus>
    </RecipientStatuses>
    <EnvelopeID>{envelope_id}</EnvelopeID>
    <Status>Completed</Status>
    <DocumentStatuses>
      <DocumentStatus>
        <ID>1</ID>
        <Name>ICLA</Name>
      </DocumentStatus>
    </DocumentStatuses>
  </EnvelopeStatus>
</DocuSignEnvelopeInformation>"#
        )
    }

    #[test]
    fn parses_completed_notification() {
        let event = CompletionEvent::parse(&completed_xml("env-1", "sig-1")).unwrap();
        assert_eq!(event.envelope_id, "env-1");
        assert!(event.is_completed());
        assert_eq!(event.client_user_id.as_deref(), Some("sig-1"));
        assert_eq!(event.document_id.as_deref(), Some("1"));
        assert_eq!(event.signer_full_name().as_deref(), Some("Ada Lovelace"));
        assert_eq!(
            event.signed_at.unwrap().to_rfc3339(),
            "2024-03-01T10:15:30.497+00:00"
        );
    }

    #[test]
    fn signed_time_honours_account_offset() {
        let xml = completed_xml("env-1", "sig-1").replace(
            "</EnvelopeStatus>",
            "</EnvelopeStatus>\n  <TimeZone>Pacific Standard Time</TimeZone>\n  <TimeZoneOffset>-8</TimeZoneOffset>",
        );
        let event = CompletionEvent::parse(&xml).unwrap();
        assert_eq!(
            event.signed_at.unwrap().to_rfc3339(),
            "2024-03-01T18:15:30.497+00:00"
        );
    }

    #[test]
    fn intermediate_status_is_not_completed() {
        let xml = completed_xml("env-2", "sig-2").replace(
            "<Status>Completed</Status>\n        <Signed>",
            "<Status>Delivered</Status>\n        <Signed>",
        );
        let event = CompletionEvent::parse(&xml).unwrap();
        assert_eq!(event.status, "Delivered");
        assert!(!event.is_completed());
    }

    #[test]
    fn rejects_payload_without_recipients() {
        let xml = r#"<DocuSignEnvelopeInformation><EnvelopeStatus><EnvelopeID>e</EnvelopeID></EnvelopeStatus></DocuSignEnvelopeInformation>"#;
        let err = CompletionEvent::parse(xml).unwrap_err();
        assert!(matches!(err, SignError::MalformedPayload(_)));
    }

    #[test]
    fn rejects_non_xml_body() {
        assert!(matches!(
            CompletionEvent::parse("{\"status\":\"Completed\"}"),
            Err(SignError::MalformedPayload(_))
        ));
    }
}
