//! Request → provider callback lifecycle through the HTTP surface.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cla_core::memory::{
    InMemoryArchive, PlatformDirectory, RecordingAuditSink, RecordingEnvelopeClient,
    RecordingGithubClient, RecordingGitlabClient, RecordingNotifier,
};
use cla_core::{Committer, InMemorySignatureStore};
use cla_service::config::ServerConfig;
use cla_service::{create_router, Backends, ServiceState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const CALLBACK_BASE: &str = "https://cla.example.test";

fn fixture() -> String {
    let document = json!({
        "name": "Apache style CLA",
        "major_version": 2,
        "minor_version": 0,
        "content_base64": "JVBERi0xLjQ=",
        "tabs": [
            {"tab_id": "full_name", "tab_type": "text", "position_x": 10, "position_y": 20, "width": 100, "height": 20},
            {"tab_id": "sign", "tab_type": "sign", "position_x": 10, "position_y": 60, "width": 100, "height": 20}
        ]
    });
    json!({
        "users": [
            {"user_id": "U", "username": "U-lf", "name": "User U", "lf_email": "U@example.org", "github_id": "gh-U", "github_username": "U-gh"},
            {"user_id": "mgr", "username": "mgr-lf", "name": "Manager", "lf_email": "mgr@example.org"}
        ],
        "companies": [
            {"company_id": "C", "company_sfid": "sf-C", "name": "Acme", "signing_entity_name": "Acme"}
        ],
        "projects": [
            {"sfid": "lf", "name": "The Linux Foundation"},
            {"sfid": "fdn", "name": "Foundation", "parent_sfid": "lf"},
            {"sfid": "sub", "name": "Sub project", "parent_sfid": "fdn"}
        ],
        "cla_groups": [
            {
                "cla_group_id": "P",
                "name": "P CLA",
                "foundation_sfid": "fdn",
                "ccla_enabled": true,
                "individual_documents": [document.clone()],
                "corporate_documents": [document]
            }
        ],
        "project_cla_groups": {"sub": "P"},
        "linux_foundation_sfids": ["lf"]
    })
    .to_string()
}

struct TestApp {
    router: Router,
    envelopes: Arc<RecordingEnvelopeClient>,
    github: Arc<RecordingGithubClient>,
    archive: Arc<InMemoryArchive>,
    notifier: Arc<RecordingNotifier>,
}

fn test_app() -> TestApp {
    let envelopes = Arc::new(RecordingEnvelopeClient::new());
    let github = Arc::new(RecordingGithubClient::new());
    let archive = Arc::new(InMemoryArchive::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let backends = Backends {
        store: Arc::new(InMemorySignatureStore::new()),
        envelopes: envelopes.clone(),
        directory: PlatformDirectory::from_json(&fixture()).unwrap(),
        notifier: notifier.clone(),
        archive: archive.clone(),
        audit: Arc::new(RecordingAuditSink::new()),
        github: github.clone(),
        gitlab: Arc::new(RecordingGitlabClient::new()),
    };
    let state = ServiceState::assemble(backends, CALLBACK_BASE, 4);

    TestApp {
        router: create_router(state, &ServerConfig::default()),
        envelopes,
        github,
        archive,
        notifier,
    }
}

fn completed_xml(envelope_id: &str, client_user_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<DocuSignEnvelopeInformation xmlns="http://www.docusign.net/API/3.0">
  <EnvelopeStatus>
    <RecipientStatuses>
      <RecipientStatus>
        <Type>Signer</Type>
        <Email>signer@example.org</Email>
        <UserName>Signer</UserName>
        <RecipientId>1</RecipientId>
        <ClientUserId>{client_user_id}</ClientUserId>
        <Status>Completed</Status>
        <Signed>2024-03-01T10:15:30.497</Signed>
        <TabStatuses>
          <TabStatus>
            <TabType>Custom</TabType>
            <TabLabel>full_name</TabLabel>
            <TabValue>Signer Name</TabValue>
          </TabStatus>
        </TabStatuses>
      </RecipientStatus>
    </RecipientStatuses>
    <EnvelopeID>{envelope_id}</EnvelopeID>
    <Status>Completed</Status>
    <DocumentStatuses>
      <DocumentStatus>
        <ID>1</ID>
        <Name>CLA</Name>
      </DocumentStatus>
    </DocumentStatuses>
  </EnvelopeStatus>
</DocuSignEnvelopeInformation>"#
    )
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_xml(uri: &str, body: String) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "text/xml")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn github_request() -> Value {
    json!({
        "user_id": "U",
        "project_id": "P",
        "return_url": "https://github.com/org/repo/pull/3",
        "return_url_type": "github",
        "installation_id": 1,
        "repository_id": 2,
        "pull_request_id": 3
    })
}

#[tokio::test]
async fn github_individual_lifecycle() {
    let app = test_app();
    app.github
        .set_committers(
            1,
            2,
            3,
            vec![Committer {
                github_id: Some("gh-U".into()),
                login: Some("U-gh".into()),
                name: None,
                email: None,
            }],
        )
        .await;

    let (status, outcome) = send(
        &app.router,
        post_json("/v4/request-individual-signature", github_request()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let signature_id = outcome["signature_id"].as_str().unwrap().to_string();
    let envelope_id = outcome["envelope_id"].as_str().unwrap().to_string();
    assert!(outcome["sign_url"].as_str().unwrap().ends_with(&signature_id));
    assert_eq!(outcome["signed"], false);

    let created = app.envelopes.created().await;
    assert_eq!(
        created[0].1.event_notification.as_ref().unwrap().url,
        format!("{CALLBACK_BASE}/v4/signed/individual/1/2/3")
    );

    let (status, completion) = send(
        &app.router,
        post_xml(
            "/v4/signed/individual/1/2/3",
            completed_xml(&envelope_id, &signature_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completion["outcome"], "completed");
    assert_eq!(completion["transitioned"], true);
    assert_eq!(
        completion["steps_run"],
        json!(["platform_action", "notification", "document_archive", "audit_event"])
    );

    let statuses = app.github.statuses().await;
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].1.all_signed());
    assert_eq!(
        app.archive.keys().await,
        vec![format!("P/ICLA/U/{signature_id}")]
    );
    assert_eq!(app.notifier.sent().await.len(), 1);

    let (status, stored) = send(&app.router, get(&format!("/v4/signatures/{signature_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["signed"], true);
    assert!(stored["signed_on"].is_string());

    // Provider redelivery performs no further side effects.
    let (status, replay) = send(
        &app.router,
        post_xml(
            "/v4/signed/individual/1/2/3",
            completed_xml(&envelope_id, &signature_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["outcome"], "already_processed");
    assert_eq!(app.github.statuses().await.len(), 1);
    assert_eq!(app.notifier.sent().await.len(), 1);

    // A signed agreement is returned as-is without a new envelope.
    let (status, again) = send(
        &app.router,
        post_json("/v4/request-individual-signature", github_request()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["signature_id"], signature_id.as_str());
    assert_eq!(again["signed"], true);
    assert_eq!(app.envelopes.created_count().await, 1);
}

#[tokio::test]
async fn corporate_lifecycle_then_conflict() {
    let app = test_app();
    let request = json!({
        "lf_username": "mgr-lf",
        "company_sfid": "sf-C",
        "project_sfid": "sub",
        "return_url": "https://cla.example.test/done"
    });

    let (status, outcome) = send(
        &app.router,
        post_json("/v4/request-corporate-signature", request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["reference_id"], "C");
    assert_eq!(outcome["project_id"], "P");
    let signature_id = outcome["signature_id"].as_str().unwrap().to_string();
    let envelope_id = outcome["envelope_id"].as_str().unwrap().to_string();

    let (status, completion) = send(
        &app.router,
        post_xml(
            "/v4/signed/corporate/C/P",
            completed_xml(&envelope_id, &signature_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completion["outcome"], "completed");
    assert_eq!(
        app.archive.keys().await,
        vec![format!("P/CCLA/C/{signature_id}")]
    );

    let (status, error) = send(
        &app.router,
        post_json("/v4/request-corporate-signature", request),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "CONFLICT");

    let (status, listed) = send(&app.router, get("/v4/projects/P/signatures?reference_id=C")).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["signature_id"], signature_id.as_str());
}

#[tokio::test]
async fn callback_for_wrong_user_is_rejected() {
    let app = test_app();
    let (_, outcome) = send(
        &app.router,
        post_json(
            "/v4/request-individual-signature",
            json!({
                "user_id": "U",
                "project_id": "P",
                "return_url": "https://review.example.test",
                "return_url_type": "gerrit"
            }),
        ),
    )
    .await;
    let signature_id = outcome["signature_id"].as_str().unwrap();
    let envelope_id = outcome["envelope_id"].as_str().unwrap();

    let (status, error) = send(
        &app.router,
        post_xml(
            "/v4/signed/gerrit/individual/someone-else",
            completed_xml(envelope_id, signature_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");

    let (_, stored) = send(&app.router, get(&format!("/v4/signatures/{signature_id}"))).await;
    assert_eq!(stored["signed"], false);
}

#[tokio::test]
async fn callback_for_superseded_envelope_is_rejected() {
    let app = test_app();
    let (_, first) = send(
        &app.router,
        post_json("/v4/request-individual-signature", github_request()),
    )
    .await;
    let (_, second) = send(
        &app.router,
        post_json("/v4/request-individual-signature", github_request()),
    )
    .await;
    assert_eq!(first["signature_id"], second["signature_id"]);
    assert_ne!(first["envelope_id"], second["envelope_id"]);

    let (status, error) = send(
        &app.router,
        post_xml(
            "/v4/signed/individual/1/2/3",
            completed_xml(
                first["envelope_id"].as_str().unwrap(),
                first["signature_id"].as_str().unwrap(),
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error["code"], "PROVIDER_ERROR");
}
