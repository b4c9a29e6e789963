use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

// --- TikTok profile scraper (clockworks/tiktok-scraper) ---

/// Input for the clockworks/tiktok-scraper actor, profile mode.
#[derive(Debug, Clone, Serialize)]
pub struct TikTokProfileInput {
    pub profiles: Vec<String>,
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
    #[serde(rename = "profileSorting")]
    pub profile_sorting: String,
    #[serde(rename = "shouldDownloadVideos")]
    pub should_download_videos: bool,
    #[serde(rename = "shouldDownloadCovers")]
    pub should_download_covers: bool,
}

impl TikTokProfileInput {
    pub fn latest(handle: &str, limit: u32) -> Self {
        Self {
            profiles: vec![handle.to_string()],
            results_per_page: limit,
            profile_sorting: "latest".to_string(),
            should_download_videos: false,
            should_download_covers: false,
        }
    }
}

/// A single TikTok video from the Apify dataset.
///
/// Every field is optional: the actor emits partial rows for private or
/// region-locked videos, and error rows (only `error` + `url`) for profiles it
/// could not resolve.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TikTokPost {
    pub id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "webVideoUrl")]
    pub web_video_url: Option<String>,
    #[serde(rename = "createTimeISO")]
    pub create_time_iso: Option<String>,
    #[serde(rename = "createTime")]
    pub create_time: Option<i64>,
    #[serde(rename = "authorMeta")]
    pub author_meta: Option<TikTokAuthor>,
    #[serde(rename = "videoMeta")]
    pub video_meta: Option<TikTokVideoMeta>,
    #[serde(rename = "musicMeta")]
    pub music_meta: Option<TikTokMusicMeta>,
    #[serde(rename = "playCount")]
    pub play_count: Option<i64>,
    #[serde(rename = "diggCount")]
    pub digg_count: Option<i64>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<i64>,
    #[serde(rename = "shareCount")]
    pub share_count: Option<i64>,
    /// ISO country code the video was posted from, when TikTok exposes it.
    #[serde(rename = "locationCreated")]
    pub location_created: Option<String>,
    pub hashtags: Option<Vec<TikTokHashtag>>,
    pub error: Option<String>,
}

impl TikTokPost {
    /// Publish time, preferring the ISO field over the unix timestamp.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        if let Some(iso) = self.create_time_iso.as_deref() {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(iso) {
                return Some(parsed.with_timezone(&Utc));
            }
        }
        self.create_time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn is_error_row(&self) -> bool {
        self.error.is_some() && self.id.is_none()
    }

    pub fn hashtag_names(&self) -> Vec<String> {
        self.hashtags
            .iter()
            .flatten()
            .filter_map(|h| h.name.clone())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Author metadata from a TikTok post.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TikTokAuthor {
    /// The handle, without `@`.
    pub name: Option<String>,
    #[serde(rename = "nickName")]
    pub nick_name: Option<String>,
    /// Profile bio.
    pub signature: Option<String>,
    pub verified: Option<bool>,
    pub fans: Option<i64>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TikTokVideoMeta {
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TikTokMusicMeta {
    #[serde(rename = "musicName")]
    pub music_name: Option<String>,
    #[serde(rename = "musicAuthor")]
    pub music_author: Option<String>,
}

/// A hashtag reference in a TikTok post.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TikTokHashtag {
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dataset_row() {
        let raw = serde_json::json!({
            "id": "7300000000000000001",
            "text": "3 high-protein breakfasts #nutrition",
            "webVideoUrl": "https://www.tiktok.com/@dietitian.jane/video/7300000000000000001",
            "createTimeISO": "2026-10-01T14:30:00.000Z",
            "authorMeta": {
                "name": "dietitian.jane",
                "signature": "RD in Austin, TX",
                "fans": 120000,
                "verified": true
            },
            "videoMeta": {"duration": 42},
            "playCount": 250000, "diggCount": 18000, "commentCount": 320, "shareCount": 900,
            "hashtags": [{"name": "nutrition"}, {"name": ""}],
            "somethingNew": {"ignored": true}
        });
        let post: TikTokPost = serde_json::from_value(raw).unwrap();
        assert_eq!(post.hashtag_names(), vec!["nutrition"]);
        assert_eq!(
            post.published_at().unwrap().to_rfc3339(),
            "2026-10-01T14:30:00+00:00"
        );
        assert!(!post.is_error_row());
        assert_eq!(post.author_meta.unwrap().fans, Some(120000));
    }

    #[test]
    fn falls_back_to_unix_create_time() {
        let post = TikTokPost {
            create_time_iso: Some("not a date".into()),
            create_time: Some(1_700_000_000),
            ..Default::default()
        };
        assert_eq!(post.published_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn error_rows_are_detected() {
        let raw = serde_json::json!({
            "url": "https://www.tiktok.com/@ghost",
            "error": "Profile not found"
        });
        let post: TikTokPost = serde_json::from_value(raw).unwrap();
        assert!(post.is_error_row());
    }
}
