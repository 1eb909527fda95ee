//! Signature request orchestration: decides reuse, builds and dispatches envelopes.

use crate::collaborators::{Collaborators, RoleScope};
use crate::envelope::{
    EnvelopeClient, EnvelopeDocument, EnvelopeRequest, EventNotification, RecipientViewRequest,
    Signer, SIGNER_RECIPIENT_ID,
};
use crate::error::{SignError, SignResult};
use crate::platform::{CallbackTarget, IndividualPlatform};
use crate::store::SignatureStore;
use crate::tabs::{compile_tabs, corporate_defaults, individual_defaults, DefaultValues};
use crate::types::{
    latest_signature, ClaDocument, ClaGroup, ClaType, Company, CompanyLookup, DocumentKind,
    ReferenceType, Signature, User,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

const VOID_REASON_SUPERSEDED: &str = "Superseded by a new signature request";
const VOID_REASON_ABORTED: &str = "Signature request failed before completion";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualSignatureRequest {
    pub user_id: String,
    /// CLA group the agreement belongs to.
    pub project_id: String,
    pub return_url: String,
    #[serde(flatten)]
    pub platform: IndividualPlatform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateSignatureRequest {
    pub lf_username: String,
    pub company_sfid: String,
    pub project_sfid: String,
    #[serde(default)]
    pub signing_entity_name: Option<String>,
    #[serde(default)]
    pub send_as_email: bool,
    #[serde(default)]
    pub authority_name: Option<String>,
    #[serde(default)]
    pub authority_email: Option<String>,
    #[serde(default)]
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureOutcome {
    pub signature_id: String,
    pub project_id: String,
    pub reference_id: String,
    pub envelope_id: Option<String>,
    pub sign_url: Option<String>,
    pub signed: bool,
    /// An existing record was reused rather than a new one created.
    pub reused: bool,
}

impl SignatureOutcome {
    fn from_signature(signature: &Signature, reused: bool) -> Self {
        Self {
            signature_id: signature.signature_id.clone(),
            project_id: signature.project_id.clone(),
            reference_id: signature.reference_id.clone(),
            envelope_id: signature.envelope_id.clone(),
            sign_url: signature.sign_url.clone(),
            signed: signature.signed,
            reused,
        }
    }
}

/// Who the provider addresses the envelope to.
#[derive(Debug, Clone)]
struct SignerIdentity {
    name: String,
    email: String,
}

/// Inputs to one envelope population pass.
struct Population<'a> {
    document: &'a ClaDocument,
    signer: SignerIdentity,
    defaults: DefaultValues,
    /// Embedded signing returns a sign URL; otherwise the provider emails the signer.
    embedded: bool,
    callback: CallbackTarget,
    email_subject: String,
    email_blurb: String,
    is_new: bool,
}

/// Entry points for individual and corporate signature requests.
pub struct SignService {
    store: Arc<dyn SignatureStore>,
    envelopes: Arc<dyn EnvelopeClient>,
    collaborators: Collaborators,
    callback_base_url: String,
}

impl SignService {
    pub fn new(
        store: Arc<dyn SignatureStore>,
        envelopes: Arc<dyn EnvelopeClient>,
        collaborators: Collaborators,
        callback_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            envelopes,
            collaborators,
            callback_base_url: callback_base_url.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SignatureStore> {
        &self.store
    }

    pub async fn get_signature(&self, signature_id: &str) -> SignResult<Signature> {
        self.store
            .get_signature(signature_id)
            .await?
            .ok_or_else(|| SignError::NotFound(format!("signature '{signature_id}'")))
    }

    pub async fn project_signatures(
        &self,
        project_id: &str,
        reference_id: Option<&str>,
    ) -> SignResult<Vec<Signature>> {
        let mut signatures = self.store.list_for_project(project_id).await?;
        if let Some(reference_id) = reference_id {
            signatures.retain(|s| s.reference_id == reference_id);
        }
        Ok(signatures)
    }

    pub async fn request_individual_signature(
        &self,
        request: IndividualSignatureRequest,
    ) -> SignResult<SignatureOutcome> {
        require("user_id", &request.user_id)?;
        require("project_id", &request.project_id)?;

        let user = self
            .collaborators
            .users
            .get_user(&request.user_id)
            .await?
            .ok_or_else(|| SignError::NotFound(format!("user '{}'", request.user_id)))?;
        let group = self.cla_group(&request.project_id).await?;
        if !group.icla_enabled {
            return Err(SignError::IclaNotEnabled(group.cla_group_id.clone()));
        }
        let document = group
            .current_document(DocumentKind::Individual)
            .ok_or_else(|| {
                SignError::template_missing(&group.cla_group_id, DocumentKind::Individual.as_str())
            })?;
        let version = document.version();

        let existing = self
            .store
            .list_for_reference(
                ReferenceType::User,
                &user.user_id,
                &group.cla_group_id,
                Some(ClaType::Icla),
            )
            .await?;

        let (mut signature, is_new) = match latest_signature(&existing) {
            Some(latest) if latest.is_active_for(version) && latest.signed => {
                info!(
                    signature_id = %latest.signature_id,
                    user_id = %user.user_id,
                    "individual agreement already signed for current document version"
                );
                return Ok(SignatureOutcome::from_signature(latest, true));
            }
            Some(latest) if latest.is_active_for(version) => (latest.clone(), false),
            _ => {
                let identity = platform_identity(&user, &request.platform);
                let signature = Signature::new(
                    ReferenceType::User,
                    &user.user_id,
                    user.display_name(),
                    &group.cla_group_id,
                    ClaType::Icla,
                    version,
                )
                .with_acl(identity);
                (signature, true)
            }
        };

        let signer = SignerIdentity {
            name: user.display_name().to_string(),
            email: user
                .best_email()
                .ok_or_else(|| {
                    SignError::Validation(format!("user '{}' has no email address", user.user_id))
                })?
                .to_string(),
        };
        let defaults = individual_defaults(&signer.name, &signer.email);
        signature.return_url = request.return_url.clone();

        info!(
            signature_id = %signature.signature_id,
            user_id = %user.user_id,
            project_id = %group.cla_group_id,
            platform = %request.platform.kind(),
            version = %version,
            reused = !is_new,
            "requesting individual signature"
        );

        self.populate_sign_url(
            &mut signature,
            Population {
                document,
                signer,
                defaults,
                embedded: true,
                callback: request.platform.callback_target(&user.user_id),
                email_subject: format!("CLA signature request for {}", group.name),
                email_blurb: format!(
                    "Please sign the individual contributor license agreement for {}.",
                    group.name
                ),
                is_new,
            },
        )
        .await?;

        Ok(SignatureOutcome::from_signature(&signature, !is_new))
    }

    pub async fn request_corporate_signature(
        &self,
        request: CorporateSignatureRequest,
    ) -> SignResult<SignatureOutcome> {
        require("lf_username", &request.lf_username)?;
        require("company_sfid", &request.company_sfid)?;
        require("project_sfid", &request.project_sfid)?;
        let authority = if request.send_as_email {
            let email = non_blank(request.authority_email.as_deref()).ok_or_else(|| {
                SignError::Validation("authority_email is required when sending as email".into())
            })?;
            let name = non_blank(request.authority_name.as_deref()).ok_or_else(|| {
                SignError::Validation("authority_name is required when sending as email".into())
            })?;
            Some(SignerIdentity {
                name: name.to_string(),
                email: email.to_string(),
            })
        } else {
            None
        };

        let company = self.resolve_company(&request).await?;
        let group = self.resolve_corporate_group(&request.project_sfid).await?;
        if !group.ccla_enabled {
            return Err(SignError::CclaNotEnabled(group.cla_group_id.clone()));
        }
        let document = group
            .current_document(DocumentKind::Corporate)
            .ok_or_else(|| {
                SignError::template_missing(&group.cla_group_id, DocumentKind::Corporate.as_str())
            })?;

        let acting_user = self
            .collaborators
            .users
            .get_user_by_username(&request.lf_username)
            .await?
            .ok_or_else(|| SignError::NotFound(format!("user '{}'", request.lf_username)))?;

        let granted = self
            .grant_signatory(&company, &request, authority.as_ref())
            .await?;

        let result = self
            .corporate_envelope(&request, &company, &group, document, &acting_user, authority)
            .await;

        let (signature, reused) = match result {
            Ok(done) => done,
            Err(err) => {
                error!(
                    company_id = %company.company_id,
                    project_id = %group.cla_group_id,
                    error = %err,
                    "corporate signature request failed"
                );
                if let Some(scope) = granted {
                    if let Err(revoke_err) =
                        self.collaborators.organizations.delete_role_scope(&scope).await
                    {
                        warn!(scope = %scope, error = %revoke_err, "failed to revoke signatory role");
                    }
                }
                return Err(err);
            }
        };

        if let Err(err) = self
            .collaborators
            .companies
            .add_to_acl(&company.company_id, &request.lf_username)
            .await
        {
            warn!(
                company_id = %company.company_id,
                username = %request.lf_username,
                error = %err,
                "failed to add user to company access list"
            );
        }

        Ok(SignatureOutcome::from_signature(&signature, reused))
    }

    async fn corporate_envelope(
        &self,
        request: &CorporateSignatureRequest,
        company: &Company,
        group: &ClaGroup,
        document: &ClaDocument,
        acting_user: &User,
        authority: Option<SignerIdentity>,
    ) -> SignResult<(Signature, bool)> {
        let existing = self
            .store
            .list_corporate(&company.company_id, &group.cla_group_id)
            .await?;
        if existing.iter().any(|s| s.signed) {
            return Err(SignError::AlreadySigned {
                company_id: company.company_id.clone(),
                project_id: group.cla_group_id.clone(),
            });
        }

        let (mut signature, is_new) = match latest_signature(&existing) {
            Some(unsigned) => (unsigned.clone(), false),
            None => (
                Signature::new(
                    ReferenceType::Company,
                    &company.company_id,
                    &company.signing_entity_name,
                    &group.cla_group_id,
                    ClaType::Ccla,
                    document.version(),
                )
                .with_acl([request.lf_username.clone()]),
                true,
            ),
        };
        if !is_new && signature.document_version() != document.version() {
            signature.document_major_version = document.major_version;
            signature.document_minor_version = document.minor_version;
        }
        if !signature.acl.contains(&request.lf_username) {
            signature.acl.push(request.lf_username.clone());
        }

        let manager = SignerIdentity {
            name: acting_user.display_name().to_string(),
            email: acting_user
                .best_email()
                .ok_or_else(|| {
                    SignError::Validation(format!(
                        "user '{}' has no email address",
                        request.lf_username
                    ))
                })?
                .to_string(),
        };

        let embedded = authority.is_none();
        let (signer, defaults) = match authority {
            Some(authority) => {
                signature.signatory_name = Some(authority.name.clone());
                signature.signatory_email = Some(authority.email.clone());
                let defaults = corporate_defaults(
                    &company.signing_entity_name,
                    &authority.name,
                    &authority.email,
                    Some((&manager.name, &manager.email)),
                );
                (authority, defaults)
            }
            None => {
                // Embedded: the manager signs, so no delegated signatory.
                signature.signatory_name = None;
                signature.signatory_email = None;
                let defaults = corporate_defaults(
                    &company.signing_entity_name,
                    &manager.name,
                    &manager.email,
                    None,
                );
                (manager, defaults)
            }
        };
        signature.return_url = request.return_url.clone();

        info!(
            signature_id = %signature.signature_id,
            company_id = %company.company_id,
            project_id = %group.cla_group_id,
            send_as_email = request.send_as_email,
            reused = !is_new,
            "requesting corporate signature"
        );

        self.populate_sign_url(
            &mut signature,
            Population {
                document,
                signer,
                defaults,
                embedded,
                callback: CallbackTarget::Corporate {
                    company_id: company.company_id.clone(),
                    project_id: group.cla_group_id.clone(),
                },
                email_subject: format!("CLA signature request for {}", group.name),
                email_blurb: format!(
                    "Please sign the corporate contributor license agreement for {} on behalf of {}.",
                    group.name, company.signing_entity_name
                ),
                is_new,
            },
        )
        .await?;

        Ok((signature, !is_new))
    }

    async fn cla_group(&self, cla_group_id: &str) -> SignResult<ClaGroup> {
        self.collaborators
            .cla_groups
            .get_cla_group(cla_group_id)
            .await?
            .ok_or_else(|| SignError::NotFound(format!("CLA group '{cla_group_id}'")))
    }

    async fn resolve_company(&self, request: &CorporateSignatureRequest) -> SignResult<Company> {
        let lookup = CompanyLookup::from_request(
            &request.company_sfid,
            request.signing_entity_name.as_deref(),
        );
        let companies = &self.collaborators.companies;
        let found = match &lookup {
            CompanyLookup::BySigningEntityName(name) => {
                companies.get_company_by_signing_entity_name(name).await?
            }
            CompanyLookup::ByExternalId(sfid) => companies.get_company_by_external_id(sfid).await?,
        };
        found.ok_or_else(|| SignError::NotFound(format!("company for {lookup:?}")))
    }

    /// Root projects resolve through the foundation mapping, others directly.
    async fn resolve_corporate_group(&self, project_sfid: &str) -> SignResult<ClaGroup> {
        let projects = &self.collaborators.projects;
        let project = projects
            .get_project(project_sfid)
            .await?
            .ok_or_else(|| SignError::NotFound(format!("project '{project_sfid}'")))?;

        let is_root = match project.parent_sfid.as_deref() {
            None | Some("") => true,
            Some(parent) => projects.is_the_linux_foundation(parent).await?,
        };

        let cla_groups = &self.collaborators.cla_groups;
        if is_root {
            let mut groups = cla_groups.cla_groups_for_foundation(project_sfid).await?;
            match groups.len() {
                0 => Err(SignError::NotFound(format!(
                    "CLA group for foundation '{project_sfid}'"
                ))),
                1 => Ok(groups.remove(0)),
                count => Err(SignError::MultipleClaGroups {
                    foundation_id: project_sfid.to_string(),
                    count,
                }),
            }
        } else {
            cla_groups
                .cla_group_for_project(project_sfid)
                .await?
                .ok_or_else(|| SignError::NotFound(format!("CLA group for project '{project_sfid}'")))
        }
    }

    /// Returns the scope only when this call created it.
    async fn grant_signatory(
        &self,
        company: &Company,
        request: &CorporateSignatureRequest,
        authority: Option<&SignerIdentity>,
    ) -> SignResult<Option<RoleScope>> {
        let grantee = match authority {
            Some(authority) => {
                match self
                    .collaborators
                    .users
                    .get_user_by_email(&authority.email)
                    .await?
                    .and_then(|user| user.username)
                {
                    Some(username) => username,
                    None => {
                        warn!(
                            authority_email = %authority.email,
                            "signatory has no platform account; skipping role grant"
                        );
                        return Ok(None);
                    }
                }
            }
            None => request.lf_username.clone(),
        };

        let scope = RoleScope::signatory(&company.company_sfid, &request.project_sfid, &grantee);
        match self
            .collaborators
            .organizations
            .create_role_scope(&scope)
            .await
        {
            Ok(()) => {
                info!(scope = %scope, "granted signatory role");
                Ok(Some(scope))
            }
            Err(err) if err.is_conflict() => {
                info!(scope = %scope, "signatory role already present");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Voids any live envelope, sends a fresh one and persists the record.
    ///
    /// A failure after the envelope is created voids it before returning.
    async fn populate_sign_url(
        &self,
        signature: &mut Signature,
        population: Population<'_>,
    ) -> SignResult<()> {
        let callback_url = population.callback.callback_url(&self.callback_base_url);
        signature.callback_url = callback_url.clone();

        if signature.has_live_envelope() {
            if let Some(previous) = signature.envelope_id.clone() {
                self.void_best_effort(&signature.signature_id, &previous, VOID_REASON_SUPERSEDED)
                    .await;
            }
        }

        let tabs = compile_tabs(population.document, &population.defaults);
        let signer = Signer {
            email: population.signer.email.clone(),
            name: population.signer.name.clone(),
            recipient_id: SIGNER_RECIPIENT_ID.to_string(),
            client_user_id: population
                .embedded
                .then(|| signature.signature_id.clone()),
            tabs,
        };
        let envelope = EnvelopeRequest::new(
            EnvelopeDocument::pdf(
                population.document.name.clone(),
                population.document.content_base64.clone(),
            ),
            signer,
            population.email_subject.clone(),
            population.email_blurb.clone(),
        )
        .with_event_notification(EventNotification::on_completed(callback_url));

        let envelope_id = self.envelopes.create_envelope(&envelope).await?;
        info!(
            signature_id = %signature.signature_id,
            envelope_id = %envelope_id,
            embedded = population.embedded,
            "envelope created"
        );

        match self
            .finish_population(signature, &population, &envelope_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                self.void_best_effort(&signature.signature_id, &envelope_id, VOID_REASON_ABORTED)
                    .await;
                Err(err)
            }
        }
    }

    async fn finish_population(
        &self,
        signature: &mut Signature,
        population: &Population<'_>,
        envelope_id: &str,
    ) -> SignResult<()> {
        signature.sign_url = if population.embedded {
            Some(
                self.embedded_sign_url(signature, &population.signer, envelope_id)
                    .await?,
            )
        } else {
            None
        };
        signature.envelope_id = Some(envelope_id.to_string());
        signature.touch();

        if population.is_new {
            self.store.create_signature(signature).await
        } else {
            self.store.update_signature(signature).await
        }
    }

    async fn embedded_sign_url(
        &self,
        signature: &Signature,
        signer: &SignerIdentity,
        envelope_id: &str,
    ) -> SignResult<String> {
        let recipients = self.envelopes.get_envelope_recipients(envelope_id).await?;
        let bound = recipients
            .into_iter()
            .find(|r| r.client_user_id.as_deref() == Some(signature.signature_id.as_str()));

        let view = match bound {
            Some(recipient) => RecipientViewRequest::new(
                if recipient.email.is_empty() { signer.email.clone() } else { recipient.email },
                recipient.recipient_id,
                if recipient.name.is_empty() { signer.name.clone() } else { recipient.name },
                signature.signature_id.clone(),
                signature.return_url.clone(),
            ),
            None => {
                warn!(
                    signature_id = %signature.signature_id,
                    envelope_id = %envelope_id,
                    "no recipient bound to signature; using request values"
                );
                RecipientViewRequest::new(
                    signer.email.clone(),
                    SIGNER_RECIPIENT_ID,
                    signer.name.clone(),
                    signature.signature_id.clone(),
                    signature.return_url.clone(),
                )
            }
        };

        self.envelopes.get_sign_url(envelope_id, &view).await
    }

    async fn void_best_effort(&self, signature_id: &str, envelope_id: &str, reason: &str) {
        match self.envelopes.void_envelope(envelope_id, reason).await {
            Ok(()) => info!(signature_id, envelope_id, reason, "envelope voided"),
            Err(err) => warn!(
                signature_id,
                envelope_id,
                error = %err,
                "failed to void envelope"
            ),
        }
    }
}

fn require(field: &str, value: &str) -> SignResult<()> {
    if value.trim().is_empty() {
        return Err(SignError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Username the platform knows the signer by; goes into the record's ACL.
fn platform_identity(user: &User, platform: &IndividualPlatform) -> Option<String> {
    match platform {
        IndividualPlatform::Github { .. } => user.github_username.clone(),
        IndividualPlatform::Gitlab { .. } => user.gitlab_username.clone(),
        IndividualPlatform::Gerrit => user.username.clone(),
    }
}
