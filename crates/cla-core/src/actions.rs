//! Post-signature actions per originating platform.

use crate::collaborators::{ClaCheckReport, Committer, GithubClient, GitlabClient, UserService};
use crate::error::{SignError, SignResult};
use crate::fan_out::run_bounded;
use crate::platform::{CallbackTarget, PlatformKind};
use crate::store::SignatureStore;
use crate::types::{ClaType, ReferenceType, Signature};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Work done once a signature from a given platform becomes signed.
#[async_trait]
pub trait PostSignatureAction: Send + Sync {
    fn kind(&self) -> PlatformKind;

    async fn on_signed(&self, signature: &Signature, target: &CallbackTarget) -> SignResult<()>;
}

fn wrong_target(kind: PlatformKind, target: &CallbackTarget) -> SignError {
    SignError::Validation(format!(
        "{} action received a {} callback",
        kind,
        target.kind()
    ))
}

/// Whether `user_id` holds an approved, signed ICLA or ECLA for `project_id`.
pub async fn user_is_covered(
    store: &dyn SignatureStore,
    user_id: &str,
    project_id: &str,
) -> SignResult<bool> {
    let signatures = store
        .list_for_reference(ReferenceType::User, user_id, project_id, None)
        .await?;
    Ok(signatures.iter().any(|s| {
        s.approved && s.signed && matches!(s.cla_type, ClaType::Icla | ClaType::Ecla)
    }))
}

/// Re-evaluates every committer on the pull request and posts the result.
pub struct GithubPullRequestAction {
    github: Arc<dyn GithubClient>,
    users: Arc<dyn UserService>,
    store: Arc<dyn SignatureStore>,
    width: usize,
}

impl GithubPullRequestAction {
    pub fn new(
        github: Arc<dyn GithubClient>,
        users: Arc<dyn UserService>,
        store: Arc<dyn SignatureStore>,
        width: usize,
    ) -> Self {
        Self {
            github,
            users,
            store,
            width,
        }
    }

    async fn evaluate(
        &self,
        committers: Vec<Committer>,
        project_id: &str,
    ) -> SignResult<ClaCheckReport> {
        let users = self.users.clone();
        let store = self.store.clone();
        let project_id = project_id.to_string();

        let report = run_bounded(committers, self.width, move |committer: Committer| {
            let users = users.clone();
            let store = store.clone();
            let project_id = project_id.clone();
            async move {
                let Some(github_id) = committer.github_id.clone() else {
                    return Ok((committer, false));
                };
                let covered = match users.get_user_by_github_id(&github_id).await? {
                    Some(user) => user_is_covered(store.as_ref(), &user.user_id, &project_id).await?,
                    None => false,
                };
                Ok((committer, covered))
            }
        })
        .await;

        let mut check = ClaCheckReport::default();
        for (committer, covered) in report.into_result()? {
            if covered {
                check.signed.push(committer);
            } else {
                check.missing.push(committer);
            }
        }
        Ok(check)
    }
}

#[async_trait]
impl PostSignatureAction for GithubPullRequestAction {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Github
    }

    async fn on_signed(&self, signature: &Signature, target: &CallbackTarget) -> SignResult<()> {
        let CallbackTarget::GithubIndividual {
            installation_id,
            repository_id,
            pull_request_id,
        } = *target
        else {
            return Err(wrong_target(self.kind(), target));
        };

        let committers = self
            .github
            .pull_request_committers(installation_id, repository_id, pull_request_id)
            .await?;
        let report = self.evaluate(committers, &signature.project_id).await?;

        info!(
            signature_id = %signature.signature_id,
            repository_id,
            pull_request_id,
            signed = report.signed.len(),
            missing = report.missing.len(),
            "updating pull request CLA status"
        );
        self.github
            .update_pull_request_status(installation_id, repository_id, pull_request_id, &report)
            .await
    }
}

/// Re-triggers the merge request's CLA check.
pub struct GitlabMergeRequestAction {
    gitlab: Arc<dyn GitlabClient>,
}

impl GitlabMergeRequestAction {
    pub fn new(gitlab: Arc<dyn GitlabClient>) -> Self {
        Self { gitlab }
    }
}

#[async_trait]
impl PostSignatureAction for GitlabMergeRequestAction {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Gitlab
    }

    async fn on_signed(&self, signature: &Signature, target: &CallbackTarget) -> SignResult<()> {
        let CallbackTarget::GitlabIndividual {
            user_id,
            organization_id,
            repository_id,
            merge_request_id,
        } = target
        else {
            return Err(wrong_target(self.kind(), target));
        };

        info!(
            signature_id = %signature.signature_id,
            organization_id,
            repository_id,
            merge_request_id,
            "re-checking merge request"
        );
        self.gitlab
            .recheck_merge_request(*organization_id, *repository_id, *merge_request_id, user_id)
            .await
    }
}

/// Gerrit group membership is not managed here; nothing beyond the common steps.
#[derive(Debug, Default)]
pub struct GerritAction;

#[async_trait]
impl PostSignatureAction for GerritAction {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Gerrit
    }

    async fn on_signed(&self, signature: &Signature, target: &CallbackTarget) -> SignResult<()> {
        if target.kind() != PlatformKind::Gerrit {
            return Err(wrong_target(self.kind(), target));
        }
        debug!(
            signature_id = %signature.signature_id,
            "gerrit group membership is disabled; skipping"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CorporateAction;

#[async_trait]
impl PostSignatureAction for CorporateAction {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Corporate
    }

    async fn on_signed(&self, signature: &Signature, target: &CallbackTarget) -> SignResult<()> {
        if target.kind() != PlatformKind::Corporate {
            return Err(wrong_target(self.kind(), target));
        }
        info!(
            signature_id = %signature.signature_id,
            company_id = %signature.reference_id,
            project_id = %signature.project_id,
            "corporate agreement signed"
        );
        Ok(())
    }
}

/// Registry of post-signature actions keyed by platform.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<PlatformKind, Arc<dyn PostSignatureAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// GitHub, GitLab, Gerrit and corporate actions wired to the given clients.
    pub fn standard(
        github: Arc<dyn GithubClient>,
        gitlab: Arc<dyn GitlabClient>,
        users: Arc<dyn UserService>,
        store: Arc<dyn SignatureStore>,
        width: usize,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GithubPullRequestAction::new(
            github, users, store, width,
        )));
        registry.register(Arc::new(GitlabMergeRequestAction::new(gitlab)));
        registry.register(Arc::new(GerritAction));
        registry.register(Arc::new(CorporateAction));
        registry
    }

    pub fn register(&mut self, action: Arc<dyn PostSignatureAction>) {
        self.actions.insert(action.kind(), action);
    }

    pub fn get(&self, kind: PlatformKind) -> Option<Arc<dyn PostSignatureAction>> {
        self.actions.get(&kind).cloned()
    }

    pub fn has(&self, kind: PlatformKind) -> bool {
        self.actions.contains_key(&kind)
    }

    pub async fn dispatch(&self, signature: &Signature, target: &CallbackTarget) -> SignResult<()> {
        let action = self.get(target.kind()).ok_or_else(|| {
            SignError::collaborator(
                "actions",
                format!("no post-signature action registered for {}", target.kind()),
            )
        })?;
        action.on_signed(signature, target).await
    }
}
