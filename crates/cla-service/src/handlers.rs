//! Request and webhook handlers

use crate::error::{ApiError, ApiResult};
use crate::state::ServiceState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use cla_core::{
    CallbackTarget, CompletionOutcome, CorporateSignatureRequest, IndividualSignatureRequest,
    Signature, SignatureOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: i64,
}

pub async fn health_check(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

pub async fn request_individual_signature(
    State(state): State<ServiceState>,
    Json(request): Json<IndividualSignatureRequest>,
) -> ApiResult<Json<SignatureOutcome>> {
    if request.user_id.trim().is_empty() || request.project_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "user_id and project_id are required".to_string(),
        ));
    }
    let outcome = state.sign.request_individual_signature(request).await?;
    Ok(Json(outcome))
}

pub async fn request_corporate_signature(
    State(state): State<ServiceState>,
    Json(request): Json<CorporateSignatureRequest>,
) -> ApiResult<Json<SignatureOutcome>> {
    let outcome = state.sign.request_corporate_signature(request).await?;
    Ok(Json(outcome))
}

async fn complete(
    state: &ServiceState,
    target: CallbackTarget,
    body: String,
) -> ApiResult<Json<CompletionOutcome>> {
    info!(path = %target.path(), bytes = body.len(), "completion callback received");
    let outcome = state.completion.handle_completion(&target, &body).await?;
    Ok(Json(outcome))
}

pub async fn signed_github_individual(
    State(state): State<ServiceState>,
    Path((installation_id, repository_id, pull_request_id)): Path<(i64, i64, i64)>,
    body: String,
) -> ApiResult<Json<CompletionOutcome>> {
    let target = CallbackTarget::GithubIndividual {
        installation_id,
        repository_id,
        pull_request_id,
    };
    complete(&state, target, body).await
}

pub async fn signed_gitlab_individual(
    State(state): State<ServiceState>,
    Path((user_id, organization_id, repository_id, merge_request_id)): Path<(
        String,
        i64,
        i64,
        i64,
    )>,
    body: String,
) -> ApiResult<Json<CompletionOutcome>> {
    let target = CallbackTarget::GitlabIndividual {
        user_id,
        organization_id,
        repository_id,
        merge_request_id,
    };
    complete(&state, target, body).await
}

pub async fn signed_gerrit_individual(
    State(state): State<ServiceState>,
    Path(user_id): Path<String>,
    body: String,
) -> ApiResult<Json<CompletionOutcome>> {
    complete(&state, CallbackTarget::GerritIndividual { user_id }, body).await
}

pub async fn signed_corporate(
    State(state): State<ServiceState>,
    Path((company_id, project_id)): Path<(String, String)>,
    body: String,
) -> ApiResult<Json<CompletionOutcome>> {
    let target = CallbackTarget::Corporate {
        company_id,
        project_id,
    };
    complete(&state, target, body).await
}

pub async fn get_signature(
    State(state): State<ServiceState>,
    Path(signature_id): Path<String>,
) -> ApiResult<Json<Signature>> {
    Ok(Json(state.sign.get_signature(&signature_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SignatureFilter {
    #[serde(default)]
    pub reference_id: Option<String>,
}

pub async fn project_signatures(
    State(state): State<ServiceState>,
    Path(project_id): Path<String>,
    Query(filter): Query<SignatureFilter>,
) -> ApiResult<Json<Vec<Signature>>> {
    let signatures = state
        .sign
        .project_signatures(&project_id, filter.reference_id.as_deref())
        .await?;
    Ok(Json(signatures))
}
