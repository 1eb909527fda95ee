//! Webhook completion handling: validates a provider notification against the
//! stored signature, flips it to signed once, then runs each downstream step
//! that has not yet been recorded for this delivery key.

use crate::actions::ActionRegistry;
use crate::collaborators::{AuditEvent, Collaborators, Notification};
use crate::envelope::{EnvelopeClient, CLA_DOCUMENT_ID};
use crate::error::{SignError, SignResult};
use crate::flow::{CompletionPlan, CompletionStep};
use crate::payload::CompletionEvent;
use crate::platform::CallbackTarget;
use crate::store::{SignatureStore, SignedUpdate};
use crate::types::{latest_signature, ReferenceType, Signature};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DOCUMENT_SIGNED_TEMPLATE: &str = "document_signed";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Intermediate provider event; nothing changed.
    Ignored { envelope_id: String, status: String },
    Completed {
        signature_id: String,
        envelope_id: String,
        /// This delivery performed the `signed` transition.
        transitioned: bool,
        steps_run: Vec<CompletionStep>,
    },
    /// Every step was already recorded for this delivery key.
    AlreadyProcessed {
        signature_id: String,
        envelope_id: String,
    },
}

pub struct CompletionHandler {
    store: Arc<dyn SignatureStore>,
    envelopes: Arc<dyn EnvelopeClient>,
    collaborators: Collaborators,
    actions: Arc<ActionRegistry>,
}

impl CompletionHandler {
    pub fn new(
        store: Arc<dyn SignatureStore>,
        envelopes: Arc<dyn EnvelopeClient>,
        collaborators: Collaborators,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            store,
            envelopes,
            collaborators,
            actions,
        }
    }

    pub async fn handle_completion(
        &self,
        target: &CallbackTarget,
        body: &str,
    ) -> SignResult<CompletionOutcome> {
        let event = CompletionEvent::parse(body)?;
        if !event.is_completed() {
            info!(
                envelope_id = %event.envelope_id,
                status = %event.status,
                platform = %target.kind(),
                "ignoring non-completion envelope event"
            );
            return Ok(CompletionOutcome::Ignored {
                envelope_id: event.envelope_id,
                status: event.status,
            });
        }

        let signature = self.locate(target, &event).await?;
        check_envelope(&signature, &event)?;
        check_correlation(target, &signature)?;

        let marked = self
            .store
            .mark_signed(
                &signature.signature_id,
                SignedUpdate {
                    signed_on: event.signed_at.unwrap_or_else(Utc::now),
                    completion_payload: event.raw.clone(),
                    signer_full_name: event.signer_full_name(),
                },
            )
            .await?;
        let transitioned = marked.transitioned();
        let signature = marked.into_signature();
        info!(
            signature_id = %signature.signature_id,
            envelope_id = %event.envelope_id,
            transitioned,
            "signature marked signed"
        );

        let done = self
            .store
            .completed_steps(&signature.signature_id, &event.envelope_id)
            .await?;
        let mut plan = CompletionPlan::resume(&signature.signature_id, done);
        if plan.is_finished() {
            info!(
                signature_id = %signature.signature_id,
                envelope_id = %event.envelope_id,
                "completion already processed"
            );
            return Ok(CompletionOutcome::AlreadyProcessed {
                signature_id: signature.signature_id,
                envelope_id: event.envelope_id,
            });
        }

        let mut steps_run = Vec::new();
        for step in plan.pending() {
            if let Err(err) = self.run_step(step, target, &signature, &event).await {
                error!(
                    signature_id = %signature.signature_id,
                    envelope_id = %event.envelope_id,
                    step = step.name(),
                    error = %err,
                    "completion step failed"
                );
                return Err(err);
            }
            self.store
                .record_step(&signature.signature_id, &event.envelope_id, step)
                .await?;
            plan.complete(step)?;
            steps_run.push(step);
        }

        Ok(CompletionOutcome::Completed {
            signature_id: signature.signature_id,
            envelope_id: event.envelope_id,
            transitioned,
            steps_run,
        })
    }

    /// By `ClientUserId`, then by envelope id; corporate callbacks may fall
    /// back to the pending record for (company, project).
    async fn locate(
        &self,
        target: &CallbackTarget,
        event: &CompletionEvent,
    ) -> SignResult<Signature> {
        if let Some(client_user_id) = event.client_user_id.as_deref() {
            if let Some(signature) = self.store.get_signature(client_user_id).await? {
                return Ok(signature);
            }
        }
        if let Some(signature) = self.store.get_by_envelope(&event.envelope_id).await? {
            return Ok(signature);
        }
        if let CallbackTarget::Corporate {
            company_id,
            project_id,
        } = target
        {
            let pending: Vec<Signature> = self
                .store
                .list_corporate(company_id, project_id)
                .await?
                .into_iter()
                .filter(|s| !s.signed)
                .collect();
            if let Some(signature) = latest_signature(&pending) {
                return Ok(signature.clone());
            }
        }
        Err(SignError::NotFound(format!(
            "signature for envelope '{}'",
            event.envelope_id
        )))
    }

    async fn run_step(
        &self,
        step: CompletionStep,
        target: &CallbackTarget,
        signature: &Signature,
        event: &CompletionEvent,
    ) -> SignResult<()> {
        match step {
            CompletionStep::PlatformAction => self.actions.dispatch(signature, target).await,
            CompletionStep::Notification => self.notify(signature, event).await,
            CompletionStep::DocumentArchive => self.archive(signature, event).await,
            CompletionStep::AuditEvent => {
                self.collaborators
                    .audit
                    .record(&AuditEvent {
                        event_type: format!("{}_signed", signature.cla_type),
                        signature_id: signature.signature_id.clone(),
                        project_id: signature.project_id.clone(),
                        reference_id: signature.reference_id.clone(),
                        detail: format!(
                            "{} signed via {} envelope {}",
                            signature.reference_name,
                            target.kind(),
                            event.envelope_id
                        ),
                        occurred_at: Utc::now(),
                    })
                    .await
            }
        }
    }

    async fn archive(&self, signature: &Signature, event: &CompletionEvent) -> SignResult<()> {
        let document_id = event.document_id.as_deref().unwrap_or(CLA_DOCUMENT_ID);
        let document = self
            .envelopes
            .get_signed_document(&event.envelope_id, document_id)
            .await?;
        self.collaborators
            .archive
            .upload(
                document,
                &signature.project_id,
                signature.cla_type,
                &signature.reference_id,
                &signature.signature_id,
            )
            .await
    }

    async fn notify(&self, signature: &Signature, event: &CompletionEvent) -> SignResult<()> {
        let recipients = self.recipients(signature, event).await?;
        if recipients.is_empty() {
            warn!(
                signature_id = %signature.signature_id,
                "no address to notify of signed document"
            );
            return Ok(());
        }

        let project_name = self
            .collaborators
            .cla_groups
            .get_cla_group(&signature.project_id)
            .await?
            .map(|group| group.name)
            .unwrap_or_else(|| signature.project_id.clone());

        let mut params = BTreeMap::new();
        params.insert("signature_id".to_string(), signature.signature_id.clone());
        params.insert("project_name".to_string(), project_name.clone());
        params.insert("cla_type".to_string(), signature.cla_type.as_str().to_string());
        params.insert(
            "signer_name".to_string(),
            signature
                .signer_full_name
                .clone()
                .unwrap_or_else(|| signature.reference_name.clone()),
        );
        if let Some(signed_on) = signature.signed_on {
            params.insert("signed_on".to_string(), signed_on.to_rfc3339());
        }

        self.collaborators
            .notifier
            .send(&Notification {
                template: DOCUMENT_SIGNED_TEMPLATE.to_string(),
                subject: format!("Signed {} for {}", signature.cla_type.archive_segment(), project_name),
                recipients,
                params,
            })
            .await
    }

    /// Best-available addresses: the user's profile for individual records,
    /// the signatory and CLA managers for corporate ones.
    async fn recipients(
        &self,
        signature: &Signature,
        event: &CompletionEvent,
    ) -> SignResult<Vec<String>> {
        let users = &self.collaborators.users;
        let mut recipients = Vec::new();
        match signature.reference_type {
            ReferenceType::User => {
                if let Some(user) = users.get_user(&signature.reference_id).await? {
                    recipients.extend(user.best_email().map(str::to_string));
                }
            }
            ReferenceType::Company => {
                recipients.extend(signature.signatory_email.clone());
                for username in &signature.acl {
                    if let Some(user) = users.get_user_by_username(username).await? {
                        recipients.extend(user.best_email().map(str::to_string));
                    }
                }
            }
        }
        if recipients.is_empty() {
            recipients.extend(event.signatory_email());
        }
        let mut seen = BTreeSet::new();
        recipients.retain(|address| seen.insert(address.to_ascii_lowercase()));
        Ok(recipients)
    }
}

/// Completions for a superseded (voided) envelope are rejected.
fn check_envelope(signature: &Signature, event: &CompletionEvent) -> SignResult<()> {
    match signature.envelope_id.as_deref() {
        Some(current) if current == event.envelope_id => Ok(()),
        current => Err(SignError::provider(
            "completion webhook",
            None,
            format!(
                "envelope '{}' is not the current envelope '{}' of signature '{}'",
                event.envelope_id,
                current.unwrap_or(""),
                signature.signature_id
            ),
        )),
    }
}

fn check_correlation(target: &CallbackTarget, signature: &Signature) -> SignResult<()> {
    let consistent = match target {
        CallbackTarget::GithubIndividual { .. } => {
            signature.reference_type == ReferenceType::User
        }
        CallbackTarget::GitlabIndividual { user_id, .. }
        | CallbackTarget::GerritIndividual { user_id } => {
            signature.reference_type == ReferenceType::User && &signature.reference_id == user_id
        }
        CallbackTarget::Corporate {
            company_id,
            project_id,
        } => {
            signature.reference_type == ReferenceType::Company
                && &signature.reference_id == company_id
                && &signature.project_id == project_id
        }
    };
    if consistent {
        Ok(())
    } else {
        Err(SignError::Validation(format!(
            "callback {} does not match signature '{}'",
            target.path(),
            signature.signature_id
        )))
    }
}
