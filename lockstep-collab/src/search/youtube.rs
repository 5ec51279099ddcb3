use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::VideoMetadata;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const MAX_RESULTS: &str = "10";

lazy_static! {
    static ref DURATION_REGEX: Regex =
        Regex::new(r"PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?").expect("regex is valid");
}

/// Searches videos via the YouTube Data API v3.
///
/// The search endpoint doesn't return durations, so a second request against
/// the videos endpoint fills those in. A failure of the second request only
/// loses the durations, not the results.
pub struct YouTubeSearch {
    client: Client,
    api_key: String,
}

#[derive(Debug, Error)]
pub enum YouTubeError {
    #[error("YouTube API request failed: {0}")]
    Request(reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

impl YouTubeSearch {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<VideoMetadata>, YouTubeError> {
        let response: SearchResponse = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", MAX_RESULTS),
                ("safeSearch", "moderate"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(YouTubeError::Request)?
            .json()
            .await
            .map_err(YouTubeError::Request)?;

        let ids: Vec<_> = response
            .items
            .iter()
            .map(|item| item.id.video_id.as_str())
            .collect();

        let durations = self.durations(&ids).await;

        let results = response
            .items
            .into_iter()
            .map(|item| {
                let duration_seconds = durations
                    .iter()
                    .find(|(id, _)| *id == item.id.video_id)
                    .and_then(|(_, duration)| *duration);

                item.into_metadata(duration_seconds)
            })
            .collect();

        Ok(results)
    }

    /// Fetches durations for the given video ids, best effort
    async fn durations(&self, ids: &[&str]) -> Vec<(String, Option<i32>)> {
        if ids.is_empty() {
            return vec![];
        }

        let response: Result<VideosResponse, _> = async {
            self.client
                .get(VIDEOS_URL)
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("part", "contentDetails"),
                    ("id", &ids.join(",")),
                ])
                .send()
                .await
                .and_then(|r| r.error_for_status())?
                .json()
                .await
        }
        .await;

        match response {
            Ok(response) => response
                .items
                .into_iter()
                .map(|item| {
                    let duration = parse_iso8601_duration(&item.content_details.duration);
                    (item.id, duration)
                })
                .collect(),
            Err(_) => vec![],
        }
    }
}

impl SearchItem {
    fn into_metadata(self, duration_seconds: Option<i32>) -> VideoMetadata {
        let thumbnail_url = self.snippet.thumbnail_url();

        VideoMetadata {
            video_id: self.id.video_id,
            title: self.snippet.title,
            channel_title: self.snippet.channel_title,
            thumbnail_url,
            duration_seconds,
        }
    }
}

impl Snippet {
    fn thumbnail_url(&self) -> String {
        self.thumbnails
            .medium
            .as_ref()
            .or(self.thumbnails.high.as_ref())
            .or(self.thumbnails.default.as_ref())
            .map(|t| t.url.clone())
            .unwrap_or_default()
    }
}

/// Parses an ISO 8601 duration like "PT1H2M3S" into whole seconds
pub fn parse_iso8601_duration(duration: &str) -> Option<i32> {
    let captures = DURATION_REGEX.captures(duration)?;

    let part = |index: usize| -> i32 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    Some(part(1) * 3600 + part(2) * 60 + part(3))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT3M33S"), Some(213));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("PT2H"), Some(7200));
        assert_eq!(parse_iso8601_duration("PT0S"), Some(0));
    }

    #[test]
    fn test_search_response_deserializes() {
        let json = serde_json::json!({
            "items": [
                {
                    "id": { "videoId": "dQw4w9WgXcQ" },
                    "snippet": {
                        "title": "Sample Track",
                        "channelTitle": "Channel",
                        "thumbnails": {
                            "medium": { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/mqdefault.jpg" }
                        }
                    }
                }
            ]
        });

        let mut response: SearchResponse = serde_json::from_value(json).unwrap();

        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].id.video_id, "dQw4w9WgXcQ");

        let metadata = response.items.remove(0).into_metadata(Some(213));

        assert_eq!(metadata.video_id, "dQw4w9WgXcQ");
        assert_eq!(metadata.title, "Sample Track");
        assert_eq!(metadata.channel_title, "Channel");
        assert_eq!(
            metadata.thumbnail_url,
            "https://i.ytimg.com/vi/dQw4w9WgXcQ/mqdefault.jpg"
        );
        assert_eq!(metadata.duration_seconds, Some(213));
    }
}
