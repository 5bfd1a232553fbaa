//! Wire shapes of the catalog Web API. Only the fields the worker reads.

use serde::{Deserialize, Serialize};

use super::{CatalogMatch, CatalogTrack};

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default = "default_expires_in")]
    pub(crate) expires_in: u64,
}

const fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub(crate) tracks: Option<Paging<SearchItem>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub(crate) items: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) name: String,
}

impl SearchResponse {
    pub(crate) fn into_matches(self) -> Vec<CatalogMatch> {
        self.tracks
            .map(|paging| paging.items)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|item| {
                item.id
                    .filter(|id| !id.is_empty())
                    .map(|id| CatalogMatch {
                        id,
                        name: item.name,
                    })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackObject {
    #[serde(default)]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) artists: Vec<ArtistObject>,
    #[serde(default)]
    pub(crate) album: Option<AlbumObject>,
    #[serde(default)]
    pub(crate) uri: String,
    #[serde(default)]
    pub(crate) external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistObject {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumObject {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) images: Vec<ImageObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageObject {
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) width: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExternalUrls {
    #[serde(default)]
    pub(crate) spotify: Option<String>,
}

impl TrackObject {
    pub(crate) fn into_track(self, requested_id: &str) -> CatalogTrack {
        let (album_name, mut images) = self
            .album
            .map(|album| (album.name, album.images))
            .unwrap_or_default();
        images.sort_by(|a, b| b.width.unwrap_or(0).cmp(&a.width.unwrap_or(0)));

        CatalogTrack {
            id: self.id.unwrap_or_else(|| requested_id.to_string()),
            name: self.name,
            artists: self.artists.into_iter().map(|artist| artist.name).collect(),
            album_name,
            uri: self.uri,
            external_url: self.external_urls.spotify.unwrap_or_default(),
            artwork_urls: images.into_iter().map(|image| image.url).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserObject {
    pub(crate) id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePlaylistBody<'a> {
    pub(crate) name: &'a str,
    pub(crate) public: bool,
    pub(crate) collaborative: bool,
    pub(crate) description: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistObject {
    pub(crate) id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddTracksBody<'a> {
    pub(crate) uris: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_response_skips_null_and_idless_items() {
        let response: SearchResponse = serde_json::from_value(json!({
            "tracks": {
                "items": [
                    { "id": "a", "name": "First" },
                    null,
                    { "name": "No id" },
                    { "id": "b", "name": "Second" }
                ]
            }
        }))
        .expect("deserializes");

        let matches = response.into_matches();
        let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn track_object_orders_artwork_by_width() {
        let track: TrackObject = serde_json::from_value(json!({
            "id": "t1",
            "name": "Headlines",
            "artists": [{ "name": "Drake" }],
            "album": {
                "name": "Take Care",
                "images": [
                    { "url": "small", "width": 64 },
                    { "url": "large", "width": 640 },
                    { "url": "medium", "width": 300 }
                ]
            },
            "uri": "spotify:track:t1",
            "external_urls": { "spotify": "https://open.spotify.com/track/t1" }
        }))
        .expect("deserializes");

        let track = track.into_track("t1");
        assert_eq!(track.artwork_urls, ["large", "medium", "small"]);
        assert_eq!(track.album_name, "Take Care");
        assert_eq!(track.external_url, "https://open.spotify.com/track/t1");
    }

    #[test]
    fn missing_search_section_yields_no_matches() {
        let response: SearchResponse = serde_json::from_value(json!({})).expect("deserializes");
        assert!(response.into_matches().is_empty());
    }
}
