use thiserror::Error;

/// Signature subsystem errors.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corporate CLA already signed for company '{company_id}' and project '{project_id}'")]
    AlreadySigned {
        company_id: String,
        project_id: String,
    },

    #[error("Foundation '{foundation_id}' is claimed by {count} CLA groups")]
    MultipleClaGroups { foundation_id: String, count: usize },

    #[error("Individual CLA is not enabled for CLA group '{0}'")]
    IclaNotEnabled(String),

    #[error("Corporate CLA is not enabled for CLA group '{0}'")]
    CclaNotEnabled(String),

    #[error("No {kind} document template for CLA group '{cla_group_id}'")]
    TemplateMissing { cla_group_id: String, kind: String },

    #[error("E-signature provider call '{operation}' failed: {message}")]
    Provider {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed completion payload: {0}")]
    MalformedPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{service} call failed: {message}")]
    Collaborator { service: String, message: String },
}

/// Coarse classification of [`SignError`] used by outer layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Provider,
    Configuration,
    Internal,
}

impl SignError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::AlreadySigned { .. } | Self::MultipleClaGroups { .. } => {
                ErrorKind::Conflict
            }
            Self::Provider { .. } | Self::MalformedPayload(_) => ErrorKind::Provider,
            Self::IclaNotEnabled(_) | Self::CclaNotEnabled(_) | Self::TemplateMissing { .. } => {
                ErrorKind::Configuration
            }
            Self::Storage(_) | Self::Collaborator { .. } => ErrorKind::Internal,
        }
    }

    /// Role-already-granted style conflicts are success-equivalent at most call sites.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn provider(operation: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn collaborator(service: &str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn template_missing(cla_group_id: &str, kind: &str) -> Self {
        Self::TemplateMissing {
            cla_group_id: cla_group_id.to_string(),
            kind: kind.to_string(),
        }
    }
}

pub type SignResult<T> = Result<T, SignError>;
