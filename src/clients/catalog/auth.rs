//! Client-credentials token cache.

use std::time::{Duration, Instant};

use reqwest::{Client, Url};
use tokio::sync::Mutex;
use tracing::debug;

use super::CatalogError;
use super::models::TokenResponse;

/// Tokens are refreshed when they would expire within this window.
pub(crate) const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Longest lifetime trusted from the token endpoint.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

fn token_expiry(now: Instant, expires_in_secs: u64) -> Instant {
    let lifetime = Duration::from_secs(expires_in_secs).min(MAX_TOKEN_LIFETIME);
    now.checked_add(lifetime).unwrap_or(now)
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + REFRESH_MARGIN
    }
}

/// Holds the application credentials and the current access token.
///
/// The lock is held across a refresh so concurrent callers wait for one
/// exchange instead of each requesting their own token.
pub(crate) struct ClientCredentials {
    client: Client,
    auth_url: Url,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    pub(crate) fn new(
        client: Client,
        auth_url: Url,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            client,
            auth_url,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn access_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.cached.lock().await;
        let now = Instant::now();
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let fresh = self.exchange().await?;
        let value = fresh.access_token.clone();
        *cached = Some(CachedToken {
            value: fresh.access_token,
            expires_at: token_expiry(now, fresh.expires_in),
        });
        debug!(expires_in = fresh.expires_in, "catalog access token refreshed");
        Ok(value)
    }

    /// Drops the cached token so the next call exchanges credentials again.
    pub(crate) async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn exchange(&self) -> Result<TokenResponse, CatalogError> {
        let response = self
            .client
            .post(self.auth_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(format!(
                "token endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CatalogError::Auth(format!("malformed token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_inside_refresh_margin_is_stale() {
        let now = Instant::now();
        let almost_expired = CachedToken {
            value: "t".into(),
            expires_at: now + Duration::from_secs(30),
        };
        let fresh = CachedToken {
            value: "t".into(),
            expires_at: now + Duration::from_secs(3600),
        };

        assert!(!almost_expired.is_fresh(now));
        assert!(fresh.is_fresh(now));
    }

    #[test]
    fn huge_expires_in_is_clamped_instead_of_overflowing() {
        let now = Instant::now();

        let expiry = token_expiry(now, u64::MAX);

        assert_eq!(expiry, now + MAX_TOKEN_LIFETIME);
        assert_eq!(token_expiry(now, 3600), now + Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn caches_token_with_oversized_lifetime() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "long-lived",
                "token_type": "Bearer",
                "expires_in": u64::MAX
            })))
            .expect(1)
            .mount(&server)
            .await;
        let auth_url =
            Url::parse(&format!("{}/api/token", server.uri())).expect("valid mock url");
        let credentials =
            ClientCredentials::new(Client::new(), auth_url, "id".into(), "secret".into());

        assert_eq!(credentials.access_token().await.expect("token"), "long-lived");
        assert_eq!(credentials.access_token().await.expect("cached"), "long-lived");
    }
}
