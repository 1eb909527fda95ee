//! Log-only collaborators for deployments without a mail relay, audit
//! store, or code-host credentials. Each call is written to the tracing
//! subscriber and succeeds; nothing is retained.

use async_trait::async_trait;
use cla_core::collaborators::{
    AuditEvent, AuditSink, ClaCheckReport, Committer, GithubClient, GitlabClient, Notification,
    Notifier,
};
use cla_core::error::SignResult;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, notification: &Notification) -> SignResult<()> {
        info!(
            template = %notification.template,
            subject = %notification.subject,
            recipients = ?notification.recipients,
            "notification"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAuditSink;

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn record(&self, event: &AuditEvent) -> SignResult<()> {
        info!(
            event_type = %event.event_type,
            signature_id = %event.signature_id,
            project_id = %event.project_id,
            reference_id = %event.reference_id,
            occurred_at = %event.occurred_at,
            detail = %event.detail,
            "audit event"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingGitlabClient;

#[async_trait]
impl GitlabClient for LoggingGitlabClient {
    async fn recheck_merge_request(
        &self,
        organization_id: i64,
        repository_id: i64,
        merge_request_id: i64,
        user_id: &str,
    ) -> SignResult<()> {
        info!(
            organization_id,
            repository_id,
            merge_request_id,
            user_id,
            "gitlab merge request recheck"
        );
        Ok(())
    }
}

/// Reports no committers, so a pull request status update carries an empty
/// report.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingGithubClient;

#[async_trait]
impl GithubClient for LoggingGithubClient {
    async fn pull_request_committers(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
    ) -> SignResult<Vec<Committer>> {
        info!(
            installation_id,
            repository_id,
            pull_request_id,
            "github committers lookup skipped"
        );
        Ok(Vec::new())
    }

    async fn update_pull_request_status(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
        report: &ClaCheckReport,
    ) -> SignResult<()> {
        info!(
            installation_id,
            repository_id,
            pull_request_id,
            signed = report.signed.len(),
            missing = report.missing.len(),
            "github pull request status"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn notifier_and_audit_sink_accept_every_call() {
        let notification = Notification {
            template: "individual_signed".into(),
            subject: "Signed".into(),
            recipients: vec!["ada@example.org".into()],
            params: BTreeMap::new(),
        };
        LoggingNotifier.send(&notification).await.unwrap();

        let event = AuditEvent {
            event_type: "IndividualSignatureSigned".into(),
            signature_id: "sig".into(),
            project_id: "P".into(),
            reference_id: "U".into(),
            detail: "signed".into(),
            occurred_at: Utc::now(),
        };
        LoggingAuditSink.record(&event).await.unwrap();
    }

    #[tokio::test]
    async fn code_host_clients_report_nothing() {
        LoggingGitlabClient
            .recheck_merge_request(4, 5, 6, "U")
            .await
            .unwrap();

        let committers = LoggingGithubClient
            .pull_request_committers(1, 2, 3)
            .await
            .unwrap();
        assert!(committers.is_empty());
        let report = ClaCheckReport {
            signed: Vec::new(),
            missing: Vec::new(),
        };
        LoggingGithubClient
            .update_pull_request_status(1, 2, 3, &report)
            .await
            .unwrap();
    }
}
