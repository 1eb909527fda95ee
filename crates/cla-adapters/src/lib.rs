//! Network and filesystem adapters for the CLA signing core.

#![deny(unsafe_code)]

pub mod archive;
pub mod docusign;
pub mod github;
pub mod log;
pub mod token;

pub use archive::FilesystemArchive;
pub use docusign::DocuSignClient;
pub use github::{GithubRestClient, STATUS_CONTEXT};
pub use log::{LoggingAuditSink, LoggingGithubClient, LoggingGitlabClient, LoggingNotifier};
pub use token::{
    HttpTokenSource, IssuedToken, RefreshingTokenProvider, StaticTokenProvider, TokenSource,
};
