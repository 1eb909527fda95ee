use crate::error::{SignError, SignResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle of a signature record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureState {
    /// Created, envelope may or may not be live.
    Pending,
    /// Terminal. The provider reported completion.
    Signed,
}

impl SignatureState {
    pub fn of(signed: bool) -> Self {
        if signed {
            Self::Signed
        } else {
            Self::Pending
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signed => "signed",
        }
    }

    /// Only `pending -> signed` is a legal move.
    pub fn transition_to(self, next: SignatureState) -> SignResult<SignatureState> {
        match (self, next) {
            (Self::Pending, Self::Signed) => Ok(next),
            (current, next) => Err(SignError::Conflict(format!(
                "illegal signature transition '{}' -> '{}'",
                current.name(),
                next.name()
            ))),
        }
    }
}

/// Side effects run after a signature is marked signed, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStep {
    PlatformAction,
    Notification,
    DocumentArchive,
    AuditEvent,
}

impl CompletionStep {
    pub const ALL: [CompletionStep; 4] = [
        Self::PlatformAction,
        Self::Notification,
        Self::DocumentArchive,
        Self::AuditEvent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PlatformAction => "platform_action",
            Self::Notification => "notification",
            Self::DocumentArchive => "document_archive",
            Self::AuditEvent => "audit_event",
        }
    }

    pub fn parse(value: &str) -> SignResult<Self> {
        Self::ALL
            .into_iter()
            .find(|step| step.name() == value)
            .ok_or_else(|| SignError::Storage(format!("unknown completion step '{value}'")))
    }
}

/// Tracks which completion steps remain for one (signature, envelope) pair.
///
/// Steps run in [`CompletionStep::ALL`] order; a redelivered notification
/// resumes from the first step not yet recorded.
#[derive(Debug, Clone)]
pub struct CompletionPlan {
    signature_id: String,
    done: BTreeSet<CompletionStep>,
}

impl CompletionPlan {
    pub fn resume(
        signature_id: impl Into<String>,
        done: impl IntoIterator<Item = CompletionStep>,
    ) -> Self {
        Self {
            signature_id: signature_id.into(),
            done: done.into_iter().collect(),
        }
    }

    pub fn is_done(&self, step: CompletionStep) -> bool {
        self.done.contains(&step)
    }

    pub fn is_finished(&self) -> bool {
        CompletionStep::ALL.iter().all(|step| self.done.contains(step))
    }

    pub fn pending(&self) -> Vec<CompletionStep> {
        CompletionStep::ALL
            .into_iter()
            .filter(|step| !self.done.contains(step))
            .collect()
    }

    pub fn next_pending(&self) -> Option<CompletionStep> {
        CompletionStep::ALL
            .into_iter()
            .find(|step| !self.done.contains(step))
    }

    /// Records `step`; it must be the next pending one.
    pub fn complete(&mut self, step: CompletionStep) -> SignResult<()> {
        match self.next_pending() {
            Some(expected) if expected == step => {
                self.done.insert(step);
                Ok(())
            }
            Some(expected) => Err(SignError::Conflict(format!(
                "completion of '{}' out of order: expected '{}', got '{}'",
                self.signature_id,
                expected.name(),
                step.name()
            ))),
            None => Err(SignError::Conflict(format!(
                "completion of '{}' already finished",
                self.signature_id
            ))),
        }
    }
}
