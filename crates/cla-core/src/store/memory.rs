//! In-memory signature store

use super::traits::*;
use crate::error::SignError;
use crate::flow::{CompletionStep, SignatureState};
use crate::types::{ClaType, ReferenceType, Signature};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemorySignatureStore {
    signatures: Arc<RwLock<HashMap<String, Signature>>>,
    steps: Arc<RwLock<HashMap<(String, String), BTreeSet<CompletionStep>>>>,
}

impl InMemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.signatures.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.signatures.read().await.is_empty()
    }
}

#[async_trait]
impl SignatureStore for InMemorySignatureStore {
    async fn create_signature(&self, signature: &Signature) -> StoreResult<()> {
        let mut signatures = self.signatures.write().await;
        if signatures.contains_key(&signature.signature_id) {
            return Err(SignError::Conflict(format!(
                "signature '{}' already exists",
                signature.signature_id
            )));
        }
        signatures.insert(signature.signature_id.clone(), signature.clone());
        Ok(())
    }

    async fn update_signature(&self, signature: &Signature) -> StoreResult<()> {
        let mut signatures = self.signatures.write().await;
        let existing = signatures.get_mut(&signature.signature_id).ok_or_else(|| {
            SignError::NotFound(format!("signature '{}'", signature.signature_id))
        })?;
        if existing.signed && !signature.signed {
            return Err(SignError::Conflict(format!(
                "signature '{}' is signed and cannot be reopened",
                signature.signature_id
            )));
        }
        *existing = signature.clone();
        Ok(())
    }

    async fn get_signature(&self, signature_id: &str) -> StoreResult<Option<Signature>> {
        Ok(self.signatures.read().await.get(signature_id).cloned())
    }

    async fn get_by_envelope(&self, envelope_id: &str) -> StoreResult<Option<Signature>> {
        let signatures = self.signatures.read().await;
        Ok(signatures
            .values()
            .find(|s| s.envelope_id.as_deref() == Some(envelope_id))
            .cloned())
    }

    async fn list_for_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
        project_id: &str,
        cla_type: Option<ClaType>,
    ) -> StoreResult<Vec<Signature>> {
        let signatures = self.signatures.read().await;
        let mut found: Vec<Signature> = signatures
            .values()
            .filter(|s| {
                s.reference_type == reference_type
                    && s.reference_id == reference_id
                    && s.project_id == project_id
                    && cla_type.map_or(true, |kind| s.cla_type == kind)
            })
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn list_corporate(
        &self,
        company_id: &str,
        project_id: &str,
    ) -> StoreResult<Vec<Signature>> {
        let mut found = self
            .list_for_reference(
                ReferenceType::Company,
                company_id,
                project_id,
                Some(ClaType::Ccla),
            )
            .await?;
        found.retain(|s| s.approved);
        Ok(found)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Signature>> {
        let signatures = self.signatures.read().await;
        let mut found: Vec<Signature> = signatures
            .values()
            .filter(|s| s.reference_type == ReferenceType::User && s.reference_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn list_for_project(&self, project_id: &str) -> StoreResult<Vec<Signature>> {
        let signatures = self.signatures.read().await;
        let mut found: Vec<Signature> = signatures
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn mark_signed(
        &self,
        signature_id: &str,
        update: SignedUpdate,
    ) -> StoreResult<MarkSigned> {
        let mut signatures = self.signatures.write().await;
        let existing = signatures
            .get_mut(signature_id)
            .ok_or_else(|| SignError::NotFound(format!("signature '{signature_id}'")))?;

        if SignatureState::of(existing.signed)
            .transition_to(SignatureState::Signed)
            .is_err()
        {
            return Ok(MarkSigned::AlreadySigned(existing.clone()));
        }

        existing.signed = true;
        existing.signed_on = Some(update.signed_on);
        existing.completion_payload = Some(update.completion_payload);
        if update.signer_full_name.is_some() {
            existing.signer_full_name = update.signer_full_name;
        }
        existing.touch();
        Ok(MarkSigned::Transitioned(existing.clone()))
    }

    async fn completed_steps(
        &self,
        signature_id: &str,
        envelope_id: &str,
    ) -> StoreResult<Vec<CompletionStep>> {
        let steps = self.steps.read().await;
        Ok(steps
            .get(&(signature_id.to_string(), envelope_id.to_string()))
            .map(|done| done.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn record_step(
        &self,
        signature_id: &str,
        envelope_id: &str,
        step: CompletionStep,
    ) -> StoreResult<()> {
        let mut steps = self.steps.write().await;
        steps
            .entry((signature_id.to_string(), envelope_id.to_string()))
            .or_default()
            .insert(step);
        Ok(())
    }
}
