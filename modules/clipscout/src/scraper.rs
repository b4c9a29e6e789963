// Production adapters for the search and content-source traits.
//
// SerperSearcher wraps the Serper Google Search API. ApifyClient gets a
// ContentSource impl that maps its TikTok rows into RawPost.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use apify_client::{ApifyClient, ApifyError, TikTokPost};
use clipscout_common::{normalize_handle, EngagementMetrics, RawPost};

use crate::traits::{ContentSource, SearchResult, UpstreamError, WebSearcher};

const SERPER_URL: &str = "https://google.serper.dev/search";

static RE_TIKTOK_PROFILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)tiktok\.com/@([a-z0-9._]+)").expect("valid regex")
});

/// Pull the account handle out of a TikTok URL (`tiktok.com/@<handle>/...`).
pub fn handle_from_url(url: &str) -> Option<String> {
    let caps = RE_TIKTOK_PROFILE.captures(url)?;
    normalize_handle(caps.get(1)?.as_str())
}

// ---------------------------------------------------------------------------
// Serper
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

pub struct SerperSearcher {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
}

impl SerperSearcher {
    pub fn new(api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_key: api_key.to_string(),
            client,
            endpoint: SERPER_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, url: &str) -> Self {
        self.endpoint = url.to_string();
        self
    }
}

fn status_error(status: u16, body: String) -> UpstreamError {
    let message = format!("status {status}: {body}");
    match status {
        429 | 500..=599 => UpstreamError::Transient(message),
        404 => UpstreamError::NotFound(message),
        _ => UpstreamError::Permanent(message),
    }
}

#[async_trait]
impl WebSearcher for SerperSearcher {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, UpstreamError> {
        info!(query, max_results, "Serper search");

        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transient(format!("Serper request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let data: SerperResponse = resp
            .json()
            .await
            .map_err(|e| {
                UpstreamError::Permanent(format!("Failed to parse Serper response: {e}"))
            })?;

        let results: Vec<SearchResult> = data
            .organic
            .into_iter()
            .map(|r| SearchResult {
                url: r.link,
                title: r.title,
                snippet: r.snippet,
            })
            .collect();

        info!(query, count = results.len(), "Serper search complete");
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Apify TikTok
// ---------------------------------------------------------------------------

impl From<ApifyError> for UpstreamError {
    fn from(err: ApifyError) -> Self {
        if err.is_not_found() {
            UpstreamError::NotFound(err.to_string())
        } else if err.is_transient() {
            UpstreamError::Transient(err.to_string())
        } else {
            UpstreamError::Permanent(err.to_string())
        }
    }
}

fn count(value: Option<i64>) -> u64 {
    value.unwrap_or(0).max(0) as u64
}

/// Map one actor row into the platform-neutral record.
pub fn raw_post_from_tiktok(post: TikTokPost) -> RawPost {
    let published_at = post.published_at();
    let hashtags = post.hashtag_names();
    let author = post.author_meta.unwrap_or_default();
    let handle = author
        .name
        .clone()
        .or_else(|| post.web_video_url.as_deref().and_then(handle_from_url));

    RawPost {
        id: post.id.filter(|id| !id.is_empty()),
        handle,
        url: post.web_video_url,
        published_at,
        metrics: EngagementMetrics {
            views: count(post.play_count),
            likes: count(post.digg_count),
            comments: count(post.comment_count),
            shares: count(post.share_count),
        },
        caption: post.text,
        hashtags,
        author_display_name: author.nick_name,
        author_bio: author.signature,
        author_region: author.region,
        author_followers: author.fans.map(|f| f.max(0) as u64),
        author_verified: author.verified.unwrap_or(false),
        location_created: post.location_created,
        duration_secs: post.video_meta.and_then(|v| v.duration),
        music: post.music_meta.and_then(|m| match (m.music_name, m.music_author) {
            (Some(name), Some(author)) => Some(format!("{name} - {author}")),
            (Some(name), None) => Some(name),
            (None, author) => author,
        }),
    }
}

#[async_trait]
impl ContentSource for ApifyClient {
    async fn fetch_recent(&self, handle: &str, limit: u32) -> Result<Vec<RawPost>, UpstreamError> {
        let posts = self.scrape_tiktok_posts(handle, limit).await?;
        Ok(posts.into_iter().map(raw_post_from_tiktok).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_handles_from_tiktok_urls() {
        assert_eq!(
            handle_from_url("https://www.tiktok.com/@Dietitian.Jane/video/7300000000000000001"),
            Some("dietitian.jane".into())
        );
        assert_eq!(
            handle_from_url("https://tiktok.com/@eatwell_rd?lang=en"),
            Some("eatwell_rd".into())
        );
        assert_eq!(handle_from_url("https://www.tiktok.com/tag/nutrition"), None);
        assert_eq!(handle_from_url("https://www.tiktok.com/discover/nutritionist"), None);
        assert_eq!(handle_from_url("https://instagram.com/@someone"), None);
    }

    #[test]
    fn http_statuses_map_to_retry_classes() {
        assert!(status_error(429, String::new()).is_transient());
        assert!(status_error(503, String::new()).is_transient());
        assert!(matches!(status_error(404, String::new()), UpstreamError::NotFound(_)));
        assert!(matches!(status_error(401, String::new()), UpstreamError::Permanent(_)));
    }

    #[tokio::test]
    async fn unreachable_search_endpoint_is_transient() {
        let searcher = SerperSearcher::new("test-key")
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/search");
        let err = searcher.search("site:tiktok.com \"dietitian\"", 10).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn apify_errors_map_to_retry_classes() {
        let e: UpstreamError = ApifyError::RunFailed("TIMED-OUT".into()).into();
        assert!(e.is_transient());
        let e: UpstreamError = ApifyError::RunFailed("FAILED".into()).into();
        assert!(matches!(e, UpstreamError::Permanent(_)));
        let e: UpstreamError = ApifyError::NotFound("ghost".into()).into();
        assert!(matches!(e, UpstreamError::NotFound(_)));
    }

    #[test]
    fn tiktok_row_maps_to_raw_post() {
        let raw = serde_json::json!({
            "id": "7300000000000000001",
            "text": "What I eat in a day #nutrition",
            "webVideoUrl": "https://www.tiktok.com/@dietitian.jane/video/7300000000000000001",
            "createTimeISO": "2026-10-01T12:00:00.000Z",
            "authorMeta": {
                "name": "dietitian.jane",
                "nickName": "Jane RD",
                "signature": "RD in Austin, TX",
                "verified": true,
                "fans": 120000,
                "region": "US"
            },
            "videoMeta": {"duration": 61.0},
            "musicMeta": {"musicName": "original sound", "musicAuthor": "Jane RD"},
            "playCount": 50000,
            "diggCount": 4000,
            "commentCount": -1,
            "shareCount": 30,
            "hashtags": [{"name": "nutrition"}]
        });
        let post: TikTokPost = serde_json::from_value(raw).unwrap();
        let raw = raw_post_from_tiktok(post);

        assert_eq!(raw.id.as_deref(), Some("7300000000000000001"));
        assert_eq!(raw.handle.as_deref(), Some("dietitian.jane"));
        assert!(raw.published_at.is_some());
        assert_eq!(raw.metrics.views, 50_000);
        assert_eq!(raw.metrics.comments, 0);
        assert_eq!(raw.author_followers, Some(120_000));
        assert!(raw.author_verified);
        assert_eq!(raw.author_region.as_deref(), Some("US"));
        assert_eq!(raw.music.as_deref(), Some("original sound - Jane RD"));
        assert_eq!(raw.hashtags, vec!["nutrition".to_string()]);
    }

    #[test]
    fn missing_author_falls_back_to_url_handle() {
        let post: TikTokPost = serde_json::from_value(serde_json::json!({
            "id": "1",
            "webVideoUrl": "https://www.tiktok.com/@fallback.user/video/1"
        }))
        .unwrap();
        let raw = raw_post_from_tiktok(post);
        assert_eq!(raw.handle.as_deref(), Some("fallback.user"));
        assert!(raw.published_at.is_none());
    }
}
