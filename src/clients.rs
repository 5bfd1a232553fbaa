pub mod catalog;
pub mod generative;

pub use catalog::{
    CatalogClient, CatalogClientConfig, CatalogError, CatalogMatch, CatalogMetadata,
    CatalogSearch, CatalogTrack, NewPlaylist, PlaylistSink, SavedPlaylist, save_playlist,
};
pub use generative::{GenerativeClient, LlmError, StructuredGenerator, StructuredRequest};
