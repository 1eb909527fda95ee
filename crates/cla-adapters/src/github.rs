//! GitHub REST client for pull-request CLA checks.

use async_trait::async_trait;
use cla_core::collaborators::{ClaCheckReport, Committer, GithubClient};
use cla_core::error::{SignError, SignResult};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

/// Status context shown on pull requests.
pub const STATUS_CONTEXT: &str = "EasyCLA";

#[derive(Debug, Deserialize)]
struct PullRequest {
    head: Head,
}

#[derive(Debug, Deserialize)]
struct Head {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
    #[serde(default)]
    author: Option<Account>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<GitIdentity>,
}

#[derive(Debug, Deserialize)]
struct GitIdentity {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: i64,
    login: String,
}

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    state: &'a str,
    context: &'a str,
    description: String,
}

pub struct GithubRestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GithubRestClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> SignResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("cla-signing-service")
            .build()
            .map_err(|e| SignError::collaborator("github", e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> SignResult<T> {
        let response = request
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| SignError::collaborator("github", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SignError::collaborator(
                "github",
                format!("HTTP {}: {}", status.as_u16(), message),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| SignError::collaborator("github", format!("invalid response: {e}")))
    }
}

fn describe(report: &ClaCheckReport) -> String {
    if report.all_signed() {
        return "All committers have signed the CLA.".to_string();
    }
    let missing: BTreeSet<&str> = report.missing.iter().map(Committer::label).collect();
    format!(
        "Missing CLA authorization: {}",
        missing.into_iter().collect::<Vec<_>>().join(", ")
    )
}

#[async_trait]
impl GithubClient for GithubRestClient {
    async fn pull_request_committers(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
    ) -> SignResult<Vec<Committer>> {
        let url = self.url(&format!(
            "/repositories/{repository_id}/pulls/{pull_request_id}/commits"
        ));
        let commits: Vec<CommitEntry> = self.send_json(self.client.get(url)).await?;
        debug!(
            installation_id,
            repository_id,
            pull_request_id,
            commits = commits.len(),
            "fetched pull request commits"
        );

        let mut seen = BTreeSet::new();
        let mut committers = Vec::new();
        for entry in commits {
            let identity = entry.commit.author;
            let committer = Committer {
                github_id: entry.author.as_ref().map(|a| a.id.to_string()),
                login: entry.author.map(|a| a.login),
                name: identity.as_ref().and_then(|i| i.name.clone()),
                email: identity.and_then(|i| i.email),
            };
            if seen.insert(committer.label().to_string()) {
                committers.push(committer);
            }
        }
        Ok(committers)
    }

    async fn update_pull_request_status(
        &self,
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
        report: &ClaCheckReport,
    ) -> SignResult<()> {
        let pr: PullRequest = self
            .send_json(self.client.get(self.url(&format!(
                "/repositories/{repository_id}/pulls/{pull_request_id}"
            ))))
            .await?;

        let state = if report.all_signed() { "success" } else { "failure" };
        let body = StatusUpdate {
            state,
            context: STATUS_CONTEXT,
            description: describe(report),
        };
        let _: serde_json::Value = self
            .send_json(
                self.client
                    .post(self.url(&format!(
                        "/repositories/{repository_id}/statuses/{}",
                        pr.head.sha
                    )))
                    .json(&body),
            )
            .await?;
        info!(
            installation_id,
            repository_id,
            pull_request_id,
            state,
            "updated pull request status"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GithubRestClient {
        GithubRestClient::new(&server.uri(), "gh-token", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn committers_are_deduplicated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/2/pulls/3/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"commit": {"author": {"name": "Ada", "email": "ada@example.org"}}, "author": {"id": 7, "login": "ada"}},
                {"commit": {"author": {"name": "Ada", "email": "ada@example.org"}}, "author": {"id": 7, "login": "ada"}},
                {"commit": {"author": {"name": "Bob", "email": "bob@example.org"}}, "author": null}
            ])))
            .mount(&server)
            .await;

        let committers = client(&server).pull_request_committers(1, 2, 3).await.unwrap();
        assert_eq!(committers.len(), 2);
        assert_eq!(committers[0].github_id.as_deref(), Some("7"));
        assert_eq!(committers[1].label(), "Bob");
    }

    #[tokio::test]
    async fn status_posts_against_head_sha() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/2/pulls/3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"head": {"sha": "abc123"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repositories/2/statuses/abc123"))
            .and(body_partial_json(json!({"state": "failure", "context": STATUS_CONTEXT})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let report = ClaCheckReport {
            signed: vec![],
            missing: vec![Committer {
                github_id: None,
                login: Some("bob".into()),
                name: None,
                email: None,
            }],
        };
        client(&server)
            .update_pull_request_status(1, 2, 3, &report)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failures_map_to_collaborator_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = client(&server)
            .pull_request_committers(1, 2, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::Collaborator { .. }));
    }

    #[test]
    fn description_lists_missing_committers() {
        let report = ClaCheckReport {
            signed: vec![],
            missing: vec![Committer {
                github_id: None,
                login: Some("zed".into()),
                name: None,
                email: None,
            }],
        };
        assert_eq!(describe(&report), "Missing CLA authorization: zed");
        assert!(describe(&ClaCheckReport {
            signed: vec![],
            missing: vec![]
        })
        .starts_with("All committers"));
    }
}
