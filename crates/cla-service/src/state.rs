//! Shared application state and backend wiring

use crate::config::{ArchiveConfig, ProviderConfig, ServiceConfig, StorageConfig};
use crate::error::{ServiceError, ServiceResult};
use cla_adapters::{
    DocuSignClient, FilesystemArchive, GithubRestClient, HttpTokenSource, LoggingAuditSink,
    LoggingGithubClient, LoggingGitlabClient, LoggingNotifier, RefreshingTokenProvider,
    StaticTokenProvider,
};
use cla_core::memory::{
    InMemoryArchive, PlatformDirectory, RecordingAuditSink, RecordingEnvelopeClient,
    RecordingGithubClient, RecordingGitlabClient, RecordingNotifier,
};
use cla_core::{
    ActionRegistry, AuditSink, CompletionHandler, DocumentArchive, EnvelopeClient, GithubClient,
    GitlabClient, Notifier, SignService, SignatureStorageConfig, SignatureStore, TokenProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Concrete collaborators the service runs against.
pub struct Backends {
    pub store: Arc<dyn SignatureStore>,
    pub envelopes: Arc<dyn EnvelopeClient>,
    pub directory: PlatformDirectory,
    pub notifier: Arc<dyn Notifier>,
    pub archive: Arc<dyn DocumentArchive>,
    pub audit: Arc<dyn AuditSink>,
    pub github: Arc<dyn GithubClient>,
    pub gitlab: Arc<dyn GitlabClient>,
}

impl Backends {
    /// Everything in process memory.
    pub fn in_memory(directory: PlatformDirectory) -> Self {
        Self {
            store: Arc::new(cla_core::InMemorySignatureStore::new()),
            envelopes: Arc::new(RecordingEnvelopeClient::new()),
            directory,
            notifier: Arc::new(RecordingNotifier::new()),
            archive: Arc::new(InMemoryArchive::new()),
            audit: Arc::new(RecordingAuditSink::new()),
            github: Arc::new(RecordingGithubClient::new()),
            gitlab: Arc::new(RecordingGitlabClient::new()),
        }
    }

    pub async fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        let storage = match &config.storage {
            StorageConfig::Memory => SignatureStorageConfig::memory(),
            StorageConfig::Postgres {
                url,
                max_connections,
            } => SignatureStorageConfig::postgres(url.clone(), *max_connections),
        };
        let store = storage.connect().await?;
        info!(backend = storage.label(), "signature store ready");

        let directory = match &config.directory.fixture {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                PlatformDirectory::from_json(&raw)?
            }
            None => PlatformDirectory::new(),
        };

        let archive: Arc<dyn DocumentArchive> = match &config.archive {
            ArchiveConfig::Memory => Arc::new(InMemoryArchive::new()),
            ArchiveConfig::Filesystem { root } => Arc::new(FilesystemArchive::new(root.clone())),
        };

        let github: Arc<dyn GithubClient> = match &config.github {
            Some(github) => Arc::new(GithubRestClient::new(
                &github.api_base,
                github.token.clone(),
                Duration::from_secs(config.server.request_timeout_secs),
            )?),
            None => {
                info!("no github credentials configured, pull request updates are logged only");
                Arc::new(LoggingGithubClient)
            }
        };

        Ok(Self {
            store,
            envelopes: envelope_client(&config.provider)?,
            directory,
            notifier: Arc::new(LoggingNotifier),
            archive,
            audit: Arc::new(LoggingAuditSink),
            github,
            gitlab: Arc::new(LoggingGitlabClient),
        })
    }
}

fn envelope_client(config: &ProviderConfig) -> ServiceResult<Arc<dyn EnvelopeClient>> {
    match config {
        ProviderConfig::Recording => Ok(Arc::new(RecordingEnvelopeClient::new())),
        ProviderConfig::Docusign {
            base_url,
            account_id,
            access_token,
            oauth,
            timeout_secs,
        } => {
            let timeout = Duration::from_secs(*timeout_secs);
            let tokens: Arc<dyn TokenProvider> = match (access_token, oauth) {
                (Some(token), _) => Arc::new(StaticTokenProvider::new(token.clone())),
                (None, Some(oauth)) => Arc::new(RefreshingTokenProvider::new(
                    Arc::new(HttpTokenSource::new(
                        oauth.token_url.clone(),
                        oauth.client_id.clone(),
                        oauth.client_secret.clone(),
                        timeout,
                    )?),
                    Duration::from_secs(oauth.refresh_skew_secs),
                )),
                (None, None) => {
                    return Err(ServiceError::Config(
                        "provider requires either access_token or oauth".to_string(),
                    ))
                }
            };
            Ok(Arc::new(DocuSignClient::new(
                base_url, account_id, tokens, timeout,
            )?))
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct ServiceState {
    pub sign: Arc<SignService>,
    pub completion: Arc<CompletionHandler>,
    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl ServiceState {
    pub fn assemble(backends: Backends, callback_base_url: &str, fan_out_width: usize) -> Self {
        let Backends {
            store,
            envelopes,
            directory,
            notifier,
            archive,
            audit,
            github,
            gitlab,
        } = backends;

        let collaborators = directory.into_collaborators(notifier, archive, audit);
        let actions = Arc::new(ActionRegistry::standard(
            github,
            gitlab,
            collaborators.users.clone(),
            store.clone(),
            fan_out_width,
        ));

        Self {
            sign: Arc::new(SignService::new(
                store.clone(),
                envelopes.clone(),
                collaborators.clone(),
                callback_base_url,
            )),
            completion: Arc::new(CompletionHandler::new(
                store,
                envelopes,
                collaborators,
                actions,
            )),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    pub async fn bootstrap(config: &ServiceConfig) -> ServiceResult<Self> {
        let backends = Backends::from_config(config).await?;
        Ok(Self::assemble(
            backends,
            &config.callbacks.base_url,
            config.fan_out.width,
        ))
    }
}
