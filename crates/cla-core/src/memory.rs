//! In-memory collaborators for standalone runs and tests.

use crate::collaborators::*;
use crate::envelope::{
    EnvelopeClient, EnvelopeDocument, EnvelopeRecipient, EnvelopeRequest, RecipientViewRequest,
};
use crate::error::{SignError, SignResult};
use crate::types::{ClaGroup, ClaType, Company, Project, User};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// JSON fixture accepted by [`PlatformDirectory::from_json`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub cla_groups: Vec<ClaGroup>,
    /// project sfid -> CLA group id
    #[serde(default)]
    pub project_cla_groups: BTreeMap<String, String>,
    /// Sfids treated as the umbrella foundation.
    #[serde(default)]
    pub linux_foundation_sfids: Vec<String>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<String, User>,
    companies: HashMap<String, Company>,
    projects: HashMap<String, Project>,
    cla_groups: HashMap<String, ClaGroup>,
    project_cla_groups: HashMap<String, String>,
    linux_foundation_sfids: HashSet<String>,
    role_scopes: HashSet<RoleScope>,
}

/// Users, companies, projects, CLA groups and role grants held in memory.
#[derive(Debug, Clone, Default)]
pub struct PlatformDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl PlatformDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let mut state = DirectoryState::default();
        for user in seed.users {
            state.users.insert(user.user_id.clone(), user);
        }
        for company in seed.companies {
            state.companies.insert(company.company_id.clone(), company);
        }
        for project in seed.projects {
            state.projects.insert(project.sfid.clone(), project);
        }
        for group in seed.cla_groups {
            state.cla_groups.insert(group.cla_group_id.clone(), group);
        }
        state.project_cla_groups = seed.project_cla_groups.into_iter().collect();
        state.linux_foundation_sfids = seed.linux_foundation_sfids.into_iter().collect();
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn from_json(raw: &str) -> SignResult<Self> {
        let seed: DirectorySeed = serde_json::from_str(raw)
            .map_err(|e| SignError::Validation(format!("invalid directory fixture: {e}")))?;
        Ok(Self::from_seed(seed))
    }

    pub async fn insert_user(&self, user: User) {
        let mut state = self.state.write().await;
        state.users.insert(user.user_id.clone(), user);
    }

    pub async fn insert_company(&self, company: Company) {
        let mut state = self.state.write().await;
        state.companies.insert(company.company_id.clone(), company);
    }

    pub async fn insert_project(&self, project: Project) {
        let mut state = self.state.write().await;
        state.projects.insert(project.sfid.clone(), project);
    }

    /// Registers `group` and maps each of `project_sfids` to it.
    pub async fn insert_cla_group(&self, group: ClaGroup, project_sfids: &[&str]) {
        let mut state = self.state.write().await;
        for sfid in project_sfids {
            state
                .project_cla_groups
                .insert(sfid.to_string(), group.cla_group_id.clone());
        }
        state.cla_groups.insert(group.cla_group_id.clone(), group);
    }

    pub async fn mark_linux_foundation(&self, sfid: &str) {
        let mut state = self.state.write().await;
        state.linux_foundation_sfids.insert(sfid.to_string());
    }

    pub async fn role_scopes(&self) -> Vec<RoleScope> {
        self.state.read().await.role_scopes.iter().cloned().collect()
    }

    pub async fn company(&self, company_id: &str) -> Option<Company> {
        self.state.read().await.companies.get(company_id).cloned()
    }

    pub fn into_collaborators(
        self,
        notifier: Arc<dyn Notifier>,
        archive: Arc<dyn DocumentArchive>,
        audit: Arc<dyn AuditSink>,
    ) -> Collaborators {
        let directory = Arc::new(self);
        Collaborators {
            users: directory.clone(),
            companies: directory.clone(),
            organizations: directory.clone(),
            projects: directory.clone(),
            cla_groups: directory,
            notifier,
            archive,
            audit,
        }
    }
}

#[async_trait]
impl UserService for PlatformDirectory {
    async fn get_user(&self, user_id: &str) -> SignResult<Option<User>> {
        Ok(self.state.read().await.users.get(user_id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> SignResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> SignResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| {
                u.lf_email
                    .iter()
                    .chain(u.emails.iter())
                    .any(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn get_user_by_github_id(&self, github_id: &str) -> SignResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.github_id.as_deref() == Some(github_id))
            .cloned())
    }
}

#[async_trait]
impl CompanyService for PlatformDirectory {
    async fn get_company(&self, company_id: &str) -> SignResult<Option<Company>> {
        Ok(self.state.read().await.companies.get(company_id).cloned())
    }

    async fn get_company_by_signing_entity_name(
        &self,
        name: &str,
    ) -> SignResult<Option<Company>> {
        let state = self.state.read().await;
        Ok(state
            .companies
            .values()
            .find(|c| c.signing_entity_name == name)
            .cloned())
    }

    async fn get_company_by_external_id(
        &self,
        company_sfid: &str,
    ) -> SignResult<Option<Company>> {
        let state = self.state.read().await;
        // Several signing entities may share an sfid; the primary one carries the company name.
        let mut matches: Vec<&Company> = state
            .companies
            .values()
            .filter(|c| c.company_sfid == company_sfid)
            .collect();
        matches.sort_by_key(|c| (c.signing_entity_name != c.name, c.company_id.clone()));
        Ok(matches.first().map(|c| (*c).clone()))
    }

    async fn add_to_acl(&self, company_id: &str, username: &str) -> SignResult<()> {
        let mut state = self.state.write().await;
        let company = state
            .companies
            .get_mut(company_id)
            .ok_or_else(|| SignError::NotFound(format!("company '{company_id}'")))?;
        if !company.acl.iter().any(|name| name == username) {
            company.acl.push(username.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationService for PlatformDirectory {
    async fn create_role_scope(&self, scope: &RoleScope) -> SignResult<()> {
        let mut state = self.state.write().await;
        if !state.role_scopes.insert(scope.clone()) {
            return Err(SignError::Conflict(format!("role scope {scope} already exists")));
        }
        Ok(())
    }

    async fn delete_role_scope(&self, scope: &RoleScope) -> SignResult<()> {
        let mut state = self.state.write().await;
        if !state.role_scopes.remove(scope) {
            return Err(SignError::NotFound(format!("role scope {scope}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectService for PlatformDirectory {
    async fn get_project(&self, project_sfid: &str) -> SignResult<Option<Project>> {
        Ok(self.state.read().await.projects.get(project_sfid).cloned())
    }

    async fn is_the_linux_foundation(&self, project_sfid: &str) -> SignResult<bool> {
        let state = self.state.read().await;
        if state.linux_foundation_sfids.contains(project_sfid) {
            return Ok(true);
        }
        Ok(state
            .projects
            .get(project_sfid)
            .is_some_and(|p| p.name == "The Linux Foundation"))
    }
}

#[async_trait]
impl ClaGroupRepository for PlatformDirectory {
    async fn get_cla_group(&self, cla_group_id: &str) -> SignResult<Option<ClaGroup>> {
        Ok(self.state.read().await.cla_groups.get(cla_group_id).cloned())
    }

    async fn cla_group_for_project(&self, project_sfid: &str) -> SignResult<Option<ClaGroup>> {
        let state = self.state.read().await;
        Ok(state
            .project_cla_groups
            .get(project_sfid)
            .and_then(|id| state.cla_groups.get(id))
            .cloned())
    }

    async fn cla_groups_for_foundation(
        &self,
        foundation_sfid: &str,
    ) -> SignResult<Vec<ClaGroup>> {
        let state = self.state.read().await;
        let mut groups: Vec<ClaGroup> = state
            .cla_groups
            .values()
            .filter(|g| g.foundation_sfid.as_deref() == Some(foundation_sfid))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.cla_group_id.cmp(&b.cla_group_id));
        Ok(groups)
    }
}

/// Fails the next call once when armed.
#[derive(Debug, Default)]
struct FailOnce(AtomicBool);

impl FailOnce {
    fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<Notification>>,
    failure: FailOnce,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.failure.arm();
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> SignResult<()> {
        if self.failure.take() {
            return Err(SignError::collaborator("notifier", "injected failure"));
        }
        self.sent.write().await.push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryArchive {
    documents: RwLock<BTreeMap<String, Vec<u8>>>,
    failure: FailOnce,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.failure.arm();
    }

    pub async fn keys(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.documents.read().await.get(key).cloned()
    }
}

#[async_trait]
impl DocumentArchive for InMemoryArchive {
    async fn upload(
        &self,
        document: Vec<u8>,
        project_id: &str,
        cla_type: ClaType,
        reference_id: &str,
        signature_id: &str,
    ) -> SignResult<()> {
        if self.failure.take() {
            return Err(SignError::collaborator("archive", "injected failure"));
        }
        let key = archive_key(project_id, cla_type, reference_id, signature_id);
        self.documents.write().await.insert(key, document);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: &AuditEvent) -> SignResult<()> {
        tracing::info!(
            event_type = %event.event_type,
            signature_id = %event.signature_id,
            "audit event"
        );
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Envelope client that keeps every envelope in memory.
#[derive(Debug, Default)]
pub struct RecordingEnvelopeClient {
    sequence: AtomicU64,
    created: RwLock<Vec<(String, EnvelopeRequest)>>,
    voided: RwLock<Vec<(String, String)>>,
    sign_url_requests: RwLock<Vec<RecipientViewRequest>>,
    create_failure: FailOnce,
    sign_url_failure: FailOnce,
}

impl RecordingEnvelopeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self) {
        self.create_failure.arm();
    }

    pub fn fail_next_sign_url(&self) {
        self.sign_url_failure.arm();
    }

    pub async fn created(&self) -> Vec<(String, EnvelopeRequest)> {
        self.created.read().await.clone()
    }

    pub async fn created_count(&self) -> usize {
        self.created.read().await.len()
    }

    pub async fn voided(&self) -> Vec<String> {
        self.voided
            .read()
            .await
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub async fn sign_url_requests(&self) -> Vec<RecipientViewRequest> {
        self.sign_url_requests.read().await.clone()
    }

    async fn request_for(&self, envelope_id: &str) -> SignResult<EnvelopeRequest> {
        self.created
            .read()
            .await
            .iter()
            .find(|(id, _)| id == envelope_id)
            .map(|(_, request)| request.clone())
            .ok_or_else(|| {
                SignError::provider("lookup envelope", Some(404), format!("no envelope {envelope_id}"))
            })
    }
}

#[async_trait]
impl EnvelopeClient for RecordingEnvelopeClient {
    async fn create_envelope(&self, request: &EnvelopeRequest) -> SignResult<String> {
        if self.create_failure.take() {
            return Err(SignError::provider(
                "create envelope",
                Some(500),
                "injected failure",
            ));
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope_id = format!("env-{n}");
        self.created
            .write()
            .await
            .push((envelope_id.clone(), request.clone()));
        Ok(envelope_id)
    }

    async fn attach_document(
        &self,
        envelope_id: &str,
        document: &EnvelopeDocument,
    ) -> SignResult<()> {
        let mut created = self.created.write().await;
        let (_, request) = created
            .iter_mut()
            .find(|(id, _)| id == envelope_id)
            .ok_or_else(|| {
                SignError::provider("attach document", Some(404), format!("no envelope {envelope_id}"))
            })?;
        request.documents.push(document.clone());
        Ok(())
    }

    async fn void_envelope(&self, envelope_id: &str, reason: &str) -> SignResult<()> {
        self.request_for(envelope_id).await?;
        self.voided
            .write()
            .await
            .push((envelope_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn get_sign_url(
        &self,
        envelope_id: &str,
        view: &RecipientViewRequest,
    ) -> SignResult<String> {
        if self.sign_url_failure.take() {
            return Err(SignError::provider(
                "create recipient view",
                Some(500),
                "injected failure",
            ));
        }
        self.request_for(envelope_id).await?;
        self.sign_url_requests.write().await.push(view.clone());
        Ok(format!(
            "https://sign.example.test/{}/{}",
            envelope_id, view.client_user_id
        ))
    }

    async fn get_envelope_recipients(
        &self,
        envelope_id: &str,
    ) -> SignResult<Vec<EnvelopeRecipient>> {
        let request = self.request_for(envelope_id).await?;
        Ok(request
            .recipients
            .signers
            .iter()
            .map(|signer| EnvelopeRecipient {
                recipient_id: signer.recipient_id.clone(),
                name: signer.name.clone(),
                email: signer.email.clone(),
                client_user_id: signer.client_user_id.clone(),
                status: Some("sent".to_string()),
            })
            .collect())
    }

    async fn get_signed_document(
        &self,
        envelope_id: &str,
        document_id: &str,
    ) -> SignResult<Vec<u8>> {
        self.request_for(envelope_id).await?;
        Ok(format!("%PDF-1.4 signed {envelope_id}/{document_id}").into_bytes())
    }
}

#[derive(Debug, Default)]
pub struct RecordingGithubClient {
    committers: RwLock<HashMap<(i64, i64, i64), Vec<Committer>>>,
    statuses: RwLock<Vec<((i64, i64, i64), ClaCheckReport)>>,
}

impl RecordingGithubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_committers(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
        committers: Vec<Committer>,
    ) {
        self.committers
            .write()
            .await
            .insert((installation_id, repository_id, pull_request_id), committers);
    }

    pub async fn statuses(&self) -> Vec<((i64, i64, i64), ClaCheckReport)> {
        self.statuses.read().await.clone()
    }
}

#[async_trait]
impl GithubClient for RecordingGithubClient {
    async fn pull_request_committers(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
    ) -> SignResult<Vec<Committer>> {
        Ok(self
            .committers
            .read()
            .await
            .get(&(installation_id, repository_id, pull_request_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn update_pull_request_status(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
        report: &ClaCheckReport,
    ) -> SignResult<()> {
        self.statuses.write().await.push((
            (installation_id, repository_id, pull_request_id),
            report.clone(),
        ));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingGitlabClient {
    rechecks: RwLock<Vec<(i64, i64, i64, String)>>,
}

impl RecordingGitlabClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rechecks(&self) -> Vec<(i64, i64, i64, String)> {
        self.rechecks.read().await.clone()
    }
}

#[async_trait]
impl GitlabClient for RecordingGitlabClient {
    async fn recheck_merge_request(
        &self,
        organization_id: i64,
        repository_id: i64,
        merge_request_id: i64,
        user_id: &str,
    ) -> SignResult<()> {
        self.rechecks.write().await.push((
            organization_id,
            repository_id,
            merge_request_id,
            user_id.to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "users": [{"user_id": "u-1", "name": "Uma", "username": "uma", "lf_email": "uma@lf.test", "github_id": "42"}],
        "companies": [
            {"company_id": "c-1", "company_sfid": "sf-c", "name": "Acme", "signing_entity_name": "Acme"},
            {"company_id": "c-2", "company_sfid": "sf-c", "name": "Acme", "signing_entity_name": "Acme EU"}
        ],
        "projects": [{"sfid": "lf", "name": "The Linux Foundation"}, {"sfid": "p-1", "name": "Kernel", "parent_sfid": "lf"}],
        "cla_groups": [{"cla_group_id": "g-1", "name": "Kernel CLA", "foundation_sfid": "lf"}],
        "project_cla_groups": {"p-1": "g-1"}
    }"#;

    #[tokio::test]
    async fn seeded_directory_resolves_lookups() {
        let directory = PlatformDirectory::from_json(FIXTURE).unwrap();

        assert!(directory.get_user_by_github_id("42").await.unwrap().is_some());
        assert!(directory.get_user_by_email("UMA@lf.test").await.unwrap().is_some());
        assert_eq!(
            directory
                .get_company_by_external_id("sf-c")
                .await
                .unwrap()
                .unwrap()
                .company_id,
            "c-1"
        );
        assert_eq!(
            directory
                .get_company_by_signing_entity_name("Acme EU")
                .await
                .unwrap()
                .unwrap()
                .company_id,
            "c-2"
        );
        assert!(directory.is_the_linux_foundation("lf").await.unwrap());
        assert_eq!(
            directory
                .cla_group_for_project("p-1")
                .await
                .unwrap()
                .unwrap()
                .cla_group_id,
            "g-1"
        );
        assert_eq!(directory.cla_groups_for_foundation("lf").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_role_grant_conflicts() {
        let directory = PlatformDirectory::new();
        let scope = RoleScope::signatory("sf-c", "p-1", "uma");
        directory.create_role_scope(&scope).await.unwrap();
        assert!(directory
            .create_role_scope(&scope)
            .await
            .unwrap_err()
            .is_conflict());
        directory.delete_role_scope(&scope).await.unwrap();
        assert!(directory.role_scopes().await.is_empty());
    }

    #[tokio::test]
    async fn recording_client_tracks_envelopes() {
        let client = RecordingEnvelopeClient::new();
        client.fail_next_create();
        let request = EnvelopeRequest::new(
            EnvelopeDocument::pdf("ICLA", ""),
            crate::envelope::Signer {
                email: "a@example.org".into(),
                name: "Ada".into(),
                recipient_id: "1".into(),
                client_user_id: Some("sig".into()),
                tabs: Default::default(),
            },
            "s",
            "b",
        );
        assert!(client.create_envelope(&request).await.is_err());

        let id = client.create_envelope(&request).await.unwrap();
        assert_eq!(id, "env-1");
        let recipients = client.get_envelope_recipients(&id).await.unwrap();
        assert_eq!(recipients[0].client_user_id.as_deref(), Some("sig"));
        client.void_envelope(&id, "superseded").await.unwrap();
        assert_eq!(client.voided().await, vec!["env-1".to_string()]);
        assert!(client.void_envelope("env-9", "x").await.is_err());
    }
}
