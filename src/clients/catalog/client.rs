use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::util::redact::redact;
use crate::util::retry::{RetryConfig, is_retryable_error, is_retryable_status, parse_retry_after};

use super::auth::ClientCredentials;
use super::models::{
    AddTracksBody, CreatePlaylistBody, PlaylistObject, SearchResponse, TrackObject, UserObject,
};
use super::{
    CatalogError, CatalogMatch, CatalogMetadata, CatalogSearch, CatalogTrack, NewPlaylist,
    PLAYLIST_ADD_CHUNK, PlaylistSink,
};

/// Connection settings for [`CatalogClient`].
#[derive(Clone)]
pub struct CatalogClientConfig {
    pub api_base_url: String,
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    /// Retries after the first attempt on 429, 5xx and transport failures.
    pub max_retries: usize,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl fmt::Debug for CatalogClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("auth_url", &self.auth_url)
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &redact(&self.client_secret))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Spotify Web API 互換のカタログクライアント。
///
/// 検索とメタデータ取得はアプリの client-credentials トークンで行い、
/// プレイリスト操作は呼び出し元ユーザーのトークンで行う。
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    api_base: Url,
    credentials: Arc<ClientCredentials>,
    retry: RetryConfig,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("api_base", &self.api_base.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn parse_base(raw: &str, what: &str) -> Result<Url> {
    let mut raw = raw.to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).with_context(|| format!("invalid catalog {what} URL"))
}

impl CatalogClient {
    /// # Errors
    /// URLが不正、またはHTTPクライアントの構築に失敗した場合。
    pub fn new(config: CatalogClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build catalog client")?;

        let api_base = parse_base(&config.api_base_url, "API base")?;
        let auth_url = Url::parse(&config.auth_url).context("invalid catalog auth URL")?;
        let credentials = ClientCredentials::new(
            client.clone(),
            auth_url,
            config.client_id,
            config.client_secret,
        );

        Ok(Self {
            client,
            api_base,
            credentials: Arc::new(credentials),
            retry: RetryConfig::new(
                config.max_retries.saturating_add(1),
                config.backoff_base_ms,
                config.backoff_cap_ms,
            ),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| CatalogError::InvalidRequest("catalog base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends the request built by `build`, retrying 429/5xx and transient
    /// transport failures with backoff. `Retry-After` wins over the computed delay.
    async fn execute<F>(&self, build: F) -> Result<Response, CatalogError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send().await {
                Ok(response) if is_retryable_status(response.status()) => {
                    if !self.retry.can_retry(attempt) {
                        return Ok(response);
                    }
                    let hint = parse_retry_after(response.headers().get(RETRY_AFTER));
                    let delay = self.retry.delay_with_hint(attempt, hint);
                    warn!(
                        status = %response.status(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        "catalog request throttled or failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(error) if is_retryable_error(&error) && self.retry.can_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "catalog transport error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Like [`Self::execute`] with the app token; a 401 forces one token refresh.
    async fn execute_app<F>(&self, build: F) -> Result<Response, CatalogError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.credentials.access_token().await?;
        let response = self.execute(|| build(&token)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("catalog rejected the access token, refreshing once");
        self.credentials.invalidate().await;
        let token = self.credentials.access_token().await?;
        self.execute(|| build(&token)).await
    }

    async fn read_json<T: DeserializeOwned>(
        response: Response,
        missing: impl FnOnce() -> String,
    ) -> Result<T, CatalogError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(missing()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl CatalogSearch for CatalogClient {
    async fn search_tracks(
        &self,
        query: &str,
        limit: u8,
        market: &str,
    ) -> Result<Vec<CatalogMatch>, CatalogError> {
        let url = self.endpoint(&["search"])?;
        let limit = limit.to_string();
        let response = self
            .execute_app(|token| {
                self.client
                    .get(url.clone())
                    .bearer_auth(token)
                    .query(&[
                        ("q", query),
                        ("type", "track"),
                        ("limit", limit.as_str()),
                        ("market", market),
                    ])
            })
            .await?;

        let parsed: SearchResponse =
            Self::read_json(response, || format!("search endpoint for {query:?}")).await?;
        Ok(parsed.into_matches())
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        self.credentials.access_token().await.map(|_| ())
    }
}

#[async_trait]
impl CatalogMetadata for CatalogClient {
    async fn track(&self, id: &str, market: &str) -> Result<CatalogTrack, CatalogError> {
        let url = self.endpoint(&["tracks", id])?;
        let response = self
            .execute_app(|token| {
                self.client
                    .get(url.clone())
                    .bearer_auth(token)
                    .query(&[("market", market)])
            })
            .await?;

        let track: TrackObject = Self::read_json(response, || format!("track {id}")).await?;
        Ok(track.into_track(id))
    }
}

#[async_trait]
impl PlaylistSink for CatalogClient {
    async fn current_user_id(&self, user_token: &str) -> Result<String, CatalogError> {
        let url = self.endpoint(&["me"])?;
        let response = self
            .execute(|| self.client.get(url.clone()).bearer_auth(user_token))
            .await?;
        let user: UserObject = Self::read_json(response, || "current user".to_string()).await?;
        Ok(user.id)
    }

    async fn create_playlist(
        &self,
        user_token: &str,
        owner_id: &str,
        playlist: &NewPlaylist,
    ) -> Result<String, CatalogError> {
        let url = self.endpoint(&["users", owner_id, "playlists"])?;
        let body = CreatePlaylistBody {
            name: &playlist.name,
            public: playlist.public,
            collaborative: playlist.collaborative,
            description: &playlist.description,
        };
        let response = self
            .execute(|| {
                self.client
                    .post(url.clone())
                    .bearer_auth(user_token)
                    .json(&body)
            })
            .await?;
        let created: PlaylistObject =
            Self::read_json(response, || format!("user {owner_id}")).await?;
        Ok(created.id)
    }

    async fn add_tracks(
        &self,
        user_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), CatalogError> {
        if uris.len() > PLAYLIST_ADD_CHUNK {
            return Err(CatalogError::InvalidRequest(format!(
                "at most {PLAYLIST_ADD_CHUNK} URIs per call, got {}",
                uris.len()
            )));
        }
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        let body = AddTracksBody { uris };
        let response = self
            .execute(|| {
                self.client
                    .post(url.clone())
                    .bearer_auth(user_token)
                    .json(&body)
            })
            .await?;
        let _: serde_json::Value =
            Self::read_json(response, || format!("playlist {playlist_id}")).await?;
        Ok(())
    }
}
