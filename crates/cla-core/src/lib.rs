//! CLA signature lifecycle.
//!
//! Requests signatures from an e-signature provider, tracks each signature
//! record through the webhook-driven completion protocol and runs the
//! post-signature work of the platform that originated the request.

#![deny(unsafe_code)]

pub mod actions;
pub mod collaborators;
pub mod completion;
pub mod envelope;
pub mod error;
pub mod fan_out;
pub mod flow;
pub mod memory;
pub mod orchestrator;
pub mod payload;
pub mod platform;
pub mod store;
pub mod tabs;
pub mod types;

pub use actions::{
    ActionRegistry, CorporateAction, GerritAction, GithubPullRequestAction,
    GitlabMergeRequestAction, PostSignatureAction,
};
pub use collaborators::{
    archive_key, AuditEvent, AuditSink, ClaCheckReport, ClaGroupRepository, Collaborators,
    Committer, CompanyService, DocumentArchive, GithubClient, GitlabClient, Notification,
    Notifier, OrganizationService, ProjectService, RoleScope, UserService, CLA_SIGNATORY_ROLE,
};
pub use completion::{CompletionHandler, CompletionOutcome};
pub use envelope::{
    EnvelopeClient, EnvelopeDocument, EnvelopeRecipient, EnvelopeRecipients, EnvelopeRequest,
    EnvelopeSummary, EventNotification, RecipientView, RecipientViewRequest, Signer,
    TokenProvider,
};
pub use error::{ErrorKind, SignError, SignResult};
pub use fan_out::{run_bounded, FanOutReport};
pub use flow::{CompletionPlan, CompletionStep, SignatureState};
pub use orchestrator::{
    CorporateSignatureRequest, IndividualSignatureRequest, SignService, SignatureOutcome,
};
pub use payload::CompletionEvent;
pub use platform::{CallbackTarget, IndividualPlatform, PlatformKind};
pub use store::{
    InMemorySignatureStore, MarkSigned, PostgresSignatureStore, SignatureStorageConfig,
    SignatureStore, SignedUpdate,
};
pub use tabs::{compile_tabs, DefaultValues, Tab, Tabs};
pub use types::{
    ClaDocument, ClaGroup, ClaType, Company, CompanyLookup, DocumentKind, DocumentTab,
    DocumentVersion, Project, ReferenceType, Signature, TabType, User,
};
