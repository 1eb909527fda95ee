//! cla-signd: REST entry points for CLA signature requests and the
//! e-signature provider's completion callbacks.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use config::ServiceConfig;
pub use error::{ApiError, ServiceError, ServiceResult};
pub use router::create_router;
pub use state::{Backends, ServiceState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cla_core::memory::PlatformDirectory;
    use tower::ServiceExt;

    fn app() -> axum::Router {
        let state = ServiceState::assemble(
            Backends::in_memory(PlatformDirectory::new()),
            "https://cla.example.test",
            4,
        );
        create_router(state, &ServerConfig::default())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_signature_is_not_found() {
        let response = app()
            .oneshot(
                Request::get("/v4/signatures/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn individual_request_for_unknown_user_is_not_found() {
        let body = serde_json::json!({
            "user_id": "nobody",
            "project_id": "P",
            "return_url": "https://example.test",
            "return_url_type": "gerrit"
        });
        let response = app()
            .oneshot(
                Request::post("/v4/request-individual-signature")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_user_id_is_bad_request() {
        let body = serde_json::json!({
            "user_id": " ",
            "project_id": "P",
            "return_url": "",
            "return_url_type": "gerrit"
        });
        let response = app()
            .oneshot(
                Request::post("/v4/request-individual-signature")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn malformed_callback_is_bad_gateway() {
        let response = app()
            .oneshot(
                Request::post("/v4/signed/gerrit/individual/U")
                    .header("content-type", "text/xml")
                    .body(Body::from("not xml"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["code"], "PROVIDER_ERROR");
    }
}
