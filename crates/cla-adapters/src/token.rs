//! Access-token providers for the envelope client.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cla_core::envelope::TokenProvider;
use cla_core::error::{SignError, SignResult};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Fixed token, for integration keys issued out of band.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> SignResult<String> {
        if self.token.is_empty() {
            return Err(SignError::provider("get token", None, "no access token configured"));
        }
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues fresh access tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn issue(&self) -> SignResult<IssuedToken>;
}

/// Caches a token from a [`TokenSource`] and reissues it `skew` before expiry.
pub struct RefreshingTokenProvider {
    source: Arc<dyn TokenSource>,
    skew: ChronoDuration,
    cached: Mutex<Option<IssuedToken>>,
}

impl RefreshingTokenProvider {
    pub fn new(source: Arc<dyn TokenSource>, skew: Duration) -> Self {
        Self {
            source,
            skew: ChronoDuration::from_std(skew).unwrap_or_else(|_| ChronoDuration::seconds(60)),
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for RefreshingTokenProvider {
    async fn get_token(&self) -> SignResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - self.skew > Utc::now() {
                return Ok(token.access_token.clone());
            }
            debug!(expires_at = %token.expires_at, "access token near expiry");
        }
        let issued = self.source.issue().await?;
        info!(expires_at = %issued.expires_at, "issued provider access token");
        let access_token = issued.access_token.clone();
        *cached = Some(issued);
        Ok(access_token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// OAuth client-credentials grant against the provider's token endpoint.
pub struct HttpTokenSource {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpTokenSource {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> SignResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignError::provider("build client", None, e.to_string()))?;
        Ok(Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn issue(&self) -> SignResult<IssuedToken> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| SignError::provider("issue token", None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SignError::provider(
                "issue token",
                Some(status.as_u16()),
                message,
            ));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SignError::provider("issue token", None, format!("invalid response: {e}")))?;

        Ok(IssuedToken {
            access_token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingSource {
        issued: AtomicUsize,
        lifetime: ChronoDuration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn issue(&self) -> SignResult<IssuedToken> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                access_token: format!("tok-{n}"),
                expires_at: Utc::now() + self.lifetime,
            })
        }
    }

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.get_token().await.unwrap(), "abc");
        assert!(StaticTokenProvider::new("").get_token().await.is_err());
    }

    #[tokio::test]
    async fn refreshing_provider_caches_until_near_expiry() {
        let source = Arc::new(CountingSource {
            issued: AtomicUsize::new(0),
            lifetime: ChronoDuration::hours(1),
        });
        let provider = RefreshingTokenProvider::new(source.clone(), Duration::from_secs(60));

        assert_eq!(provider.get_token().await.unwrap(), "tok-1");
        assert_eq!(provider.get_token().await.unwrap(), "tok-1");
        assert_eq!(source.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshing_provider_reissues_inside_skew() {
        let source = Arc::new(CountingSource {
            issued: AtomicUsize::new(0),
            lifetime: ChronoDuration::seconds(30),
        });
        let provider = RefreshingTokenProvider::new(source.clone(), Duration::from_secs(60));

        assert_eq!(provider.get_token().await.unwrap(), "tok-1");
        assert_eq!(provider.get_token().await.unwrap(), "tok-2");
    }

    #[tokio::test]
    async fn http_source_uses_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "issued",
                "token_type": "Bearer",
                "expires_in": 120
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpTokenSource::new(
            format!("{}/oauth/token", server.uri()),
            "id",
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();
        let token = source.issue().await.unwrap();
        assert_eq!(token.access_token, "issued");
        assert!(token.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn http_source_maps_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let source = HttpTokenSource::new(server.uri(), "id", "bad", Duration::from_secs(5)).unwrap();
        let err = source.issue().await.unwrap_err();
        assert!(matches!(err, SignError::Provider { status: Some(401), .. }));
    }
}
