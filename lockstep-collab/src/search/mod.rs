use log::warn;
use serde::{Deserialize, Serialize};

mod youtube;
pub use youtube::*;

/// A searchable video, as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub channel_title: String,
    pub thumbnail_url: String,
    pub duration_seconds: Option<i32>,
}

/// Video search with graceful degradation. A missing API key or an upstream
/// failure yields an empty result list, never an error, because search is not
/// essential to a running session.
pub struct VideoSearch {
    youtube: Option<YouTubeSearch>,
}

impl VideoSearch {
    pub fn new(youtube_api_key: Option<String>) -> Self {
        if youtube_api_key.is_none() {
            warn!("No YouTube API key configured, search will return empty results");
        }

        Self {
            youtube: youtube_api_key.map(YouTubeSearch::new),
        }
    }

    pub async fn search(&self, query: &str) -> Vec<VideoMetadata> {
        if query.trim().is_empty() {
            return vec![];
        }

        let Some(youtube) = &self.youtube else {
            return vec![];
        };

        match youtube.search(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Video search failed: {}", e);
                vec![]
            }
        }
    }
}
