use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Whether a signature binds an individual or a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    User,
    Company,
}

impl ReferenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Company => "company",
        }
    }
}

/// Agreement flavour carried by a signature record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaType {
    /// Individual contributor agreement.
    Icla,
    /// Corporate agreement signed on behalf of a company.
    Ccla,
    /// Employee acknowledgement under a company's CCLA.
    Ecla,
}

impl ClaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Icla => "icla",
            Self::Ccla => "ccla",
            Self::Ecla => "ecla",
        }
    }

    /// Path segment used when archiving signed documents.
    pub fn archive_segment(self) -> &'static str {
        match self {
            Self::Icla => "ICLA",
            Self::Ccla => "CCLA",
            Self::Ecla => "ECLA",
        }
    }
}

impl fmt::Display for ClaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Major/minor version of a CLA document template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub major: u32,
    pub minor: u32,
}

impl DocumentVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DocumentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One request/response cycle with the e-signature provider.
///
/// `signature_id` never changes after creation and doubles as the provider's
/// embedded-signing `clientUserId`. `envelope_id` may be replaced while the
/// record is unsigned; `signed` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub signature_id: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub reference_name: String,
    pub reference_name_lower: String,
    pub project_id: String,
    pub cla_type: ClaType,
    pub document_major_version: u32,
    pub document_minor_version: u32,
    pub envelope_id: Option<String>,
    pub signed: bool,
    pub approved: bool,
    pub sign_url: Option<String>,
    pub callback_url: String,
    pub return_url: String,
    pub acl: Vec<String>,
    pub signatory_name: Option<String>,
    pub signatory_email: Option<String>,
    pub signer_full_name: Option<String>,
    pub completion_payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub signed_on: Option<DateTime<Utc>>,
}

impl Signature {
    pub fn new(
        reference_type: ReferenceType,
        reference_id: impl Into<String>,
        reference_name: impl Into<String>,
        project_id: impl Into<String>,
        cla_type: ClaType,
        version: DocumentVersion,
    ) -> Self {
        let now = Utc::now();
        let reference_name = reference_name.into();
        Self {
            signature_id: Uuid::new_v4().to_string(),
            reference_type,
            reference_id: reference_id.into(),
            reference_name_lower: reference_name.to_lowercase(),
            reference_name,
            project_id: project_id.into(),
            cla_type,
            document_major_version: version.major,
            document_minor_version: version.minor,
            envelope_id: None,
            signed: false,
            approved: true,
            sign_url: None,
            callback_url: String::new(),
            return_url: String::new(),
            acl: Vec::new(),
            signatory_name: None,
            signatory_email: None,
            signer_full_name: None,
            completion_payload: None,
            created_at: now,
            modified_at: now,
            signed_on: None,
        }
    }

    pub fn with_acl(mut self, acl: impl IntoIterator<Item = String>) -> Self {
        self.acl = acl.into_iter().filter(|name| !name.is_empty()).collect();
        self
    }

    pub fn document_version(&self) -> DocumentVersion {
        DocumentVersion::new(self.document_major_version, self.document_minor_version)
    }

    /// An unsigned record with an envelope still awaiting the signer.
    pub fn has_live_envelope(&self) -> bool {
        !self.signed && self.envelope_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn is_active_for(&self, version: DocumentVersion) -> bool {
        self.document_major_version == version.major
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Picks the record with the highest (major, minor) document version.
pub fn latest_signature(signatures: &[Signature]) -> Option<&Signature> {
    signatures
        .iter()
        .max_by_key(|signature| (signature.document_version(), signature.created_at))
}

/// Field kinds understood by the tab compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TabType {
    Text,
    TextUnlocked,
    TextOptional,
    Number,
    Sign,
    SignOptional,
    Date,
    Unknown(String),
}

impl TabType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::TextUnlocked => "text_unlocked",
            Self::TextOptional => "text_optional",
            Self::Number => "number",
            Self::Sign => "sign",
            Self::SignOptional => "sign_optional",
            Self::Date => "date",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for TabType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text" => Self::Text,
            "text_unlocked" => Self::TextUnlocked,
            "text_optional" => Self::TextOptional,
            "number" => Self::Number,
            "sign" => Self::Sign,
            "sign_optional" => Self::SignOptional,
            "date" => Self::Date,
            _ => Self::Unknown(value),
        }
    }
}

impl From<TabType> for String {
    fn from(value: TabType) -> Self {
        value.as_str().to_string()
    }
}

/// Field placement inside a CLA document template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTab {
    pub tab_id: String,
    pub tab_type: TabType,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub position_x: i32,
    #[serde(default)]
    pub position_y: i32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub anchor_string: Option<String>,
    #[serde(default)]
    pub anchor_x_offset: Option<i32>,
    #[serde(default)]
    pub anchor_y_offset: Option<i32>,
    #[serde(default)]
    pub anchor_ignore_if_not_present: bool,
    #[serde(default)]
    pub default_value: Option<String>,
}

fn default_page() -> u32 {
    1
}

/// Versioned CLA document template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaDocument {
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
    /// Base64 encoded PDF presented to the signer.
    pub content_base64: String,
    #[serde(default)]
    pub tabs: Vec<DocumentTab>,
}

impl ClaDocument {
    pub fn version(&self) -> DocumentVersion {
        DocumentVersion::new(self.major_version, self.minor_version)
    }
}

/// Which document family of a CLA group is being signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Individual,
    Corporate,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Corporate => "corporate",
        }
    }
}

/// A CLA group and its document templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaGroup {
    pub cla_group_id: String,
    pub name: String,
    #[serde(default)]
    pub foundation_sfid: Option<String>,
    #[serde(default = "default_true")]
    pub icla_enabled: bool,
    #[serde(default)]
    pub ccla_enabled: bool,
    #[serde(default)]
    pub individual_documents: Vec<ClaDocument>,
    #[serde(default)]
    pub corporate_documents: Vec<ClaDocument>,
}

fn default_true() -> bool {
    true
}

impl ClaGroup {
    pub fn documents(&self, kind: DocumentKind) -> &[ClaDocument] {
        match kind {
            DocumentKind::Individual => &self.individual_documents,
            DocumentKind::Corporate => &self.corporate_documents,
        }
    }

    /// Current template: the highest (major, minor) version of the family.
    pub fn current_document(&self, kind: DocumentKind) -> Option<&ClaDocument> {
        self.documents(kind).iter().max_by_key(|doc| doc.version())
    }
}

/// Platform user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub name: String,
    #[serde(default)]
    pub lf_email: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub github_id: Option<String>,
    #[serde(default)]
    pub github_username: Option<String>,
    #[serde(default)]
    pub gitlab_username: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
}

impl User {
    /// Preferred contact address: the LF address, else the first listed email.
    pub fn best_email(&self) -> Option<&str> {
        self.lf_email
            .as_deref()
            .filter(|email| !email.is_empty())
            .or_else(|| self.emails.iter().map(String::as_str).find(|e| !e.is_empty()))
    }

    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else {
            self.username.as_deref().unwrap_or(&self.user_id)
        }
    }
}

/// Company record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: String,
    pub company_sfid: String,
    pub name: String,
    pub signing_entity_name: String,
    #[serde(default)]
    pub acl: Vec<String>,
}

/// Project hierarchy node from the project service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub sfid: String,
    pub name: String,
    #[serde(default)]
    pub parent_sfid: Option<String>,
}

/// How a company is located for a corporate signature request.
///
/// The two lookups are not interchangeable: several signing entities may
/// share one external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyLookup {
    BySigningEntityName(String),
    ByExternalId(String),
}

impl CompanyLookup {
    pub fn from_request(company_sfid: &str, signing_entity_name: Option<&str>) -> Self {
        match signing_entity_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => Self::BySigningEntityName(name.to_string()),
            None => Self::ByExternalId(company_sfid.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(major: u32, minor: u32) -> ClaDocument {
        ClaDocument {
            name: format!("v{major}.{minor}"),
            major_version: major,
            minor_version: minor,
            content_base64: String::new(),
            tabs: vec![],
        }
    }

    #[test]
    fn current_document_is_highest_version() {
        let group = ClaGroup {
            cla_group_id: "g".into(),
            name: "G".into(),
            foundation_sfid: None,
            icla_enabled: true,
            ccla_enabled: false,
            individual_documents: vec![doc(1, 3), doc(2, 0), doc(1, 9)],
            corporate_documents: vec![],
        };
        assert_eq!(
            group.current_document(DocumentKind::Individual).unwrap().version(),
            DocumentVersion::new(2, 0)
        );
        assert!(group.current_document(DocumentKind::Corporate).is_none());
    }

    #[test]
    fn latest_signature_orders_by_major_then_minor() {
        let a = Signature::new(
            ReferenceType::User,
            "u",
            "U",
            "p",
            ClaType::Icla,
            DocumentVersion::new(1, 9),
        );
        let b = Signature::new(
            ReferenceType::User,
            "u",
            "U",
            "p",
            ClaType::Icla,
            DocumentVersion::new(2, 1),
        );
        let all = vec![a, b.clone()];
        assert_eq!(latest_signature(&all).unwrap().signature_id, b.signature_id);
    }

    #[test]
    fn unknown_tab_types_survive_deserialization() {
        let tab: DocumentTab =
            serde_json::from_str(r#"{"tab_id":"x","tab_type":"checkbox"}"#).unwrap();
        assert_eq!(tab.tab_type, TabType::Unknown("checkbox".into()));
        assert_eq!(tab.page, 1);
    }

    #[test]
    fn company_lookup_prefers_signing_entity_name() {
        assert_eq!(
            CompanyLookup::from_request("sf-1", Some("Acme EU")),
            CompanyLookup::BySigningEntityName("Acme EU".into())
        );
        assert_eq!(
            CompanyLookup::from_request("sf-1", Some("  ")),
            CompanyLookup::ByExternalId("sf-1".into())
        );
    }

    #[test]
    fn best_email_falls_back_to_first_listed() {
        let user = User {
            user_id: "u".into(),
            username: None,
            name: "Uma".into(),
            lf_email: None,
            emails: vec!["uma@example.org".into()],
            github_id: None,
            github_username: None,
            gitlab_username: None,
            company_id: None,
        };
        assert_eq!(user.best_email(), Some("uma@example.org"));
    }
}
