//! External platform services consumed by the signing workflow.
//!
//! Each seam is a trait object injected at construction; nothing here holds
//! process-wide state.

use crate::error::SignResult;
use crate::types::{ClaGroup, ClaType, Company, Project, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Role granted to whoever signs a corporate agreement.
pub const CLA_SIGNATORY_ROLE: &str = "cla-signatory";

#[async_trait]
pub trait UserService: Send + Sync {
    async fn get_user(&self, user_id: &str) -> SignResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> SignResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> SignResult<Option<User>>;
    async fn get_user_by_github_id(&self, github_id: &str) -> SignResult<Option<User>>;
}

#[async_trait]
pub trait CompanyService: Send + Sync {
    async fn get_company(&self, company_id: &str) -> SignResult<Option<Company>>;
    async fn get_company_by_signing_entity_name(&self, name: &str)
        -> SignResult<Option<Company>>;
    async fn get_company_by_external_id(&self, company_sfid: &str)
        -> SignResult<Option<Company>>;
    async fn add_to_acl(&self, company_id: &str, username: &str) -> SignResult<()>;
}

/// A role granted on a (company, project) scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleScope {
    pub role: String,
    pub company_sfid: String,
    pub project_sfid: String,
    pub username: String,
}

impl RoleScope {
    pub fn signatory(company_sfid: &str, project_sfid: &str, username: &str) -> Self {
        Self {
            role: CLA_SIGNATORY_ROLE.to_string(),
            company_sfid: company_sfid.to_string(),
            project_sfid: project_sfid.to_string(),
            username: username.to_string(),
        }
    }
}

impl fmt::Display for RoleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{} for {}",
            self.role, self.company_sfid, self.project_sfid, self.username
        )
    }
}

#[async_trait]
pub trait OrganizationService: Send + Sync {
    /// Fails with `Conflict` when the grant already exists.
    async fn create_role_scope(&self, scope: &RoleScope) -> SignResult<()>;
    async fn delete_role_scope(&self, scope: &RoleScope) -> SignResult<()>;
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn get_project(&self, project_sfid: &str) -> SignResult<Option<Project>>;
    async fn is_the_linux_foundation(&self, project_sfid: &str) -> SignResult<bool>;
}

#[async_trait]
pub trait ClaGroupRepository: Send + Sync {
    async fn get_cla_group(&self, cla_group_id: &str) -> SignResult<Option<ClaGroup>>;
    async fn cla_group_for_project(&self, project_sfid: &str) -> SignResult<Option<ClaGroup>>;
    async fn cla_groups_for_foundation(&self, foundation_sfid: &str)
        -> SignResult<Vec<ClaGroup>>;
}

/// Templated email; rendering belongs to the notification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub subject: String,
    pub recipients: Vec<String>,
    pub params: BTreeMap<String, String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> SignResult<()>;
}

/// Archive location of a signed document: `{project}/{CLATYPE}/{reference}/{signature}`.
pub fn archive_key(
    project_id: &str,
    cla_type: ClaType,
    reference_id: &str,
    signature_id: &str,
) -> String {
    format!(
        "{}/{}/{}/{}",
        project_id,
        cla_type.archive_segment(),
        reference_id,
        signature_id
    )
}

#[async_trait]
pub trait DocumentArchive: Send + Sync {
    async fn upload(
        &self,
        document: Vec<u8>,
        project_id: &str,
        cla_type: ClaType,
        reference_id: &str,
        signature_id: &str,
    ) -> SignResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub signature_id: String,
    pub project_id: String,
    pub reference_id: String,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> SignResult<()>;
}

/// A commit author on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    #[serde(default)]
    pub github_id: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Committer {
    pub fn label(&self) -> &str {
        self.login
            .as_deref()
            .or(self.name.as_deref())
            .or(self.email.as_deref())
            .unwrap_or("unknown")
    }
}

/// CLA coverage of a pull request's committers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaCheckReport {
    pub signed: Vec<Committer>,
    pub missing: Vec<Committer>,
}

impl ClaCheckReport {
    pub fn all_signed(&self) -> bool {
        self.missing.is_empty()
    }
}

#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn pull_request_committers(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
    ) -> SignResult<Vec<Committer>>;

    async fn update_pull_request_status(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
        report: &ClaCheckReport,
    ) -> SignResult<()>;
}

#[async_trait]
pub trait GitlabClient: Send + Sync {
    /// Re-triggers the CLA check of a merge request.
    async fn recheck_merge_request(
        &self,
        organization_id: i64,
        repository_id: i64,
        merge_request_id: i64,
        user_id: &str,
    ) -> SignResult<()>;
}

/// Platform services shared by the orchestrator and the completion handler.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserService>,
    pub companies: Arc<dyn CompanyService>,
    pub organizations: Arc<dyn OrganizationService>,
    pub projects: Arc<dyn ProjectService>,
    pub cla_groups: Arc<dyn ClaGroupRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub archive: Arc<dyn DocumentArchive>,
    pub audit: Arc<dyn AuditSink>,
}
