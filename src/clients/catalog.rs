//! Music-catalog capabilities: search, track metadata and playlist writes.

mod auth;
mod client;
mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{CatalogClient, CatalogClientConfig};

/// Maximum number of URIs accepted by a single add-tracks call.
pub const PLAYLIST_ADD_CHUNK: usize = 100;

/// A search hit: only the identity is needed downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub id: String,
    pub name: String,
}

/// Full track metadata as returned by a lookup by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album_name: String,
    pub uri: String,
    pub external_url: String,
    /// Highest resolution first.
    pub artwork_urls: Vec<String>,
}

impl CatalogTrack {
    #[must_use]
    pub fn artists_display(&self) -> String {
        self.artists.join(", ")
    }

    #[must_use]
    pub fn artwork_url(&self) -> &str {
        self.artwork_urls.first().map_or("", String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub public: bool,
    pub collaborative: bool,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog authentication failed: {0}")]
    Auth(String),

    #[error("catalog item not found: {0}")]
    NotFound(String),

    #[error("catalog API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("catalog transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid catalog request: {0}")]
    InvalidRequest(String),

    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    /// Whether the caller's user token was rejected.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. } | Self::Auth(_))
    }
}

#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Free-text track search. Results keep the catalog's ranking order.
    async fn search_tracks(
        &self,
        query: &str,
        limit: u8,
        market: &str,
    ) -> Result<Vec<CatalogMatch>, CatalogError>;

    /// Cheap probe used by readiness checks.
    async fn ping(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[async_trait]
pub trait CatalogMetadata: Send + Sync {
    async fn track(&self, id: &str, market: &str) -> Result<CatalogTrack, CatalogError>;
}

/// Playlist writes, authorised by an end-user token rather than app credentials.
#[async_trait]
pub trait PlaylistSink: Send + Sync {
    async fn current_user_id(&self, user_token: &str) -> Result<String, CatalogError>;

    async fn create_playlist(
        &self,
        user_token: &str,
        owner_id: &str,
        playlist: &NewPlaylist,
    ) -> Result<String, CatalogError>;

    /// Appends at most [`PLAYLIST_ADD_CHUNK`] URIs.
    async fn add_tracks(
        &self,
        user_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), CatalogError>;
}

/// Outcome of [`save_playlist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPlaylist {
    pub playlist_id: String,
    pub tracks_added: usize,
}

/// Creates a playlist owned by the token holder and appends `uris` in order,
/// in chunks the catalog accepts.
///
/// # Errors
/// Propagates the first failing catalog call. Chunks already appended stay.
pub async fn save_playlist(
    sink: &dyn PlaylistSink,
    user_token: &str,
    playlist: &NewPlaylist,
    uris: &[String],
) -> Result<SavedPlaylist, CatalogError> {
    let owner = sink.current_user_id(user_token).await?;
    let playlist_id = sink.create_playlist(user_token, &owner, playlist).await?;

    let mut tracks_added = 0;
    for chunk in uris.chunks(PLAYLIST_ADD_CHUNK) {
        sink.add_tracks(user_token, &playlist_id, chunk).await?;
        tracks_added += chunk.len();
    }

    tracing::info!(
        playlist_id = %playlist_id,
        tracks_added,
        "playlist saved"
    );

    Ok(SavedPlaylist {
        playlist_id,
        tracks_added,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PlaylistSink for RecordingSink {
        async fn current_user_id(&self, _user_token: &str) -> Result<String, CatalogError> {
            Ok("user-1".to_string())
        }

        async fn create_playlist(
            &self,
            _user_token: &str,
            owner_id: &str,
            _playlist: &NewPlaylist,
        ) -> Result<String, CatalogError> {
            assert_eq!(owner_id, "user-1");
            Ok("pl-1".to_string())
        }

        async fn add_tracks(
            &self,
            _user_token: &str,
            _playlist_id: &str,
            uris: &[String],
        ) -> Result<(), CatalogError> {
            self.chunks.lock().unwrap().push(uris.len());
            Ok(())
        }
    }

    #[tokio::test]
    async fn save_playlist_appends_in_chunks_of_one_hundred() {
        let sink = RecordingSink::default();
        let uris: Vec<String> = (0..250).map(|i| format!("spotify:track:{i}")).collect();
        let playlist = NewPlaylist {
            name: "AI Playlist".into(),
            description: "rainy day".into(),
            public: true,
            collaborative: false,
        };

        let saved = save_playlist(&sink, "user-token", &playlist, &uris)
            .await
            .expect("save succeeds");

        assert_eq!(saved.playlist_id, "pl-1");
        assert_eq!(saved.tracks_added, 250);
        assert_eq!(*sink.chunks.lock().unwrap(), vec![100, 100, 50]);
    }

    #[test]
    fn artwork_url_defaults_to_empty() {
        let track = CatalogTrack {
            id: "1".into(),
            name: "n".into(),
            artists: vec!["A".into(), "B".into()],
            album_name: "al".into(),
            uri: "spotify:track:1".into(),
            external_url: String::new(),
            artwork_urls: Vec::new(),
        };
        assert_eq!(track.artwork_url(), "");
        assert_eq!(track.artists_display(), "A, B");
    }
}
