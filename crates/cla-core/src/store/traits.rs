//! Signature store trait definitions

use crate::error::SignError;
use crate::flow::CompletionStep;
use crate::types::{ClaType, ReferenceType, Signature};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result type for store operations
pub type StoreResult<T> = Result<T, SignError>;

/// Fields written on the `signed = false -> true` edge.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUpdate {
    pub signed_on: DateTime<Utc>,
    pub completion_payload: String,
    pub signer_full_name: Option<String>,
}

/// Outcome of the compare-and-set completion write.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkSigned {
    /// This call flipped the flag; carries the updated record.
    Transitioned(Signature),
    /// The record was already signed; carries it untouched.
    AlreadySigned(Signature),
}

impl MarkSigned {
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Transitioned(signature) | Self::AlreadySigned(signature) => signature,
        }
    }

    pub fn into_signature(self) -> Signature {
        match self {
            Self::Transitioned(signature) | Self::AlreadySigned(signature) => signature,
        }
    }

    pub fn transitioned(&self) -> bool {
        matches!(self, Self::Transitioned(_))
    }
}

/// Persistent signature records plus the completion progress ledger.
///
/// Records are never deleted.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Insert a new record; fails with `Conflict` if the id exists.
    async fn create_signature(&self, signature: &Signature) -> StoreResult<()>;

    /// Replace an existing record by id.
    ///
    /// A signed record cannot be written back as unsigned.
    async fn update_signature(&self, signature: &Signature) -> StoreResult<()>;

    async fn get_signature(&self, signature_id: &str) -> StoreResult<Option<Signature>>;

    async fn get_by_envelope(&self, envelope_id: &str) -> StoreResult<Option<Signature>>;

    /// All records binding `reference_id` to `project_id`, any version.
    async fn list_for_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
        project_id: &str,
        cla_type: Option<ClaType>,
    ) -> StoreResult<Vec<Signature>>;

    /// Approved corporate records for (company, project).
    async fn list_corporate(
        &self,
        company_id: &str,
        project_id: &str,
    ) -> StoreResult<Vec<Signature>>;

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Signature>>;

    async fn list_for_project(&self, project_id: &str) -> StoreResult<Vec<Signature>>;

    /// Sets `signed = true` only if it is currently false.
    async fn mark_signed(&self, signature_id: &str, update: SignedUpdate)
        -> StoreResult<MarkSigned>;

    /// Steps already recorded for this delivery key.
    async fn completed_steps(
        &self,
        signature_id: &str,
        envelope_id: &str,
    ) -> StoreResult<Vec<CompletionStep>>;

    /// Records a finished step. Recording twice is a no-op.
    async fn record_step(
        &self,
        signature_id: &str,
        envelope_id: &str,
        step: CompletionStep,
    ) -> StoreResult<()>;
}
