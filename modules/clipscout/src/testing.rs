// Test mocks for the curation pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockSearcher (WebSearcher): query → results, or fail every call
// - MockSource (ContentSource): scripted per-handle response sequences,
//   with call counts and an in-flight high-water mark
// - MockModel (CurationModel): canned variants and suggestions, per-id
//   relevance with omissions, optional transient failures
//
// Plus helpers for building RawPosts and search results.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use clipscout_common::{ContentItem, EngagementMetrics, Keyword, RawPost};

use crate::traits::{
    ContentSource, CurationModel, HandleSuggestion, RawJudgment, SearchResult, UpstreamError,
    WebSearcher,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A well-formed, US-located post with modest engagement.
pub fn tiktok_post(id: &str, handle: &str, published_at: DateTime<Utc>) -> RawPost {
    RawPost {
        id: Some(id.to_string()),
        handle: Some(handle.to_string()),
        url: Some(format!("https://www.tiktok.com/@{handle}/video/{id}")),
        published_at: Some(published_at),
        metrics: EngagementMetrics {
            views: 20_000,
            likes: 1_500,
            comments: 40,
            shares: 12,
        },
        caption: Some(format!("Nutrition tips from @{handle}")),
        hashtags: vec!["nutrition".to_string()],
        author_display_name: Some(handle.to_string()),
        author_bio: Some("Registered dietitian".to_string()),
        author_region: Some("US".to_string()),
        author_followers: Some(50_000),
        author_verified: false,
        location_created: None,
        duration_secs: Some(45.0),
        music: None,
    }
}

/// `count` posts for one handle, ids `<handle>-0..count`.
pub fn posts_for(handle: &str, count: usize, published_at: DateTime<Utc>) -> Vec<RawPost> {
    (0..count)
        .map(|i| tiktok_post(&format!("{handle}-{i}"), handle, published_at))
        .collect()
}

pub fn profile_result(handle: &str) -> SearchResult {
    SearchResult {
        url: format!("https://www.tiktok.com/@{handle}/video/1"),
        title: format!("{handle} on TikTok"),
        snippet: String::new(),
    }
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Query-keyed search results. Unregistered queries return no results.
pub struct MockSearcher {
    results: HashMap<String, Vec<SearchResult>>,
    failing: bool,
    calls: AtomicU32,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            failing: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Every call fails with a transient error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn on_search(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(UpstreamError::Transient("MockSearcher: 503".to_string()));
        }
        Ok(self
            .results
            .get(query)
            .map(|r| r.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

type FetchResult = Result<Vec<RawPost>, UpstreamError>;

/// Per-handle scripted responses. Each call pops the next response; the last
/// one repeats. Unregistered handles are not found.
pub struct MockSource {
    scripts: Mutex<HashMap<String, VecDeque<FetchResult>>>,
    calls: Mutex<HashMap<String, u32>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn on_posts(self, handle: &str, posts: Vec<RawPost>) -> Self {
        self.on_responses(handle, vec![Ok(posts)])
    }

    pub fn on_responses(self, handle: &str, responses: Vec<FetchResult>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(handle.to_string(), responses.into());
        self
    }

    /// Hold each fetch open so concurrent calls overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls_for(&self, handle: &str) -> u32 {
        self.calls.lock().unwrap().get(handle).copied().unwrap_or(0)
    }

    /// Distinct handles fetched at least once.
    pub fn handles_fetched(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSource for MockSource {
    async fn fetch_recent(&self, handle: &str, limit: u32) -> FetchResult {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(handle.to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut scripts = self.scripts.lock().unwrap();
        let Some(queue) = scripts.get_mut(handle) else {
            return Err(UpstreamError::NotFound(format!("MockSource: no script for {handle}")));
        };
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match response {
            Some(Ok(posts)) => Ok(posts.into_iter().take(limit as usize).collect()),
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockModel
// ---------------------------------------------------------------------------

/// Canned AI behaviour. Classification scores every item at the default
/// relevance unless overridden by id; omitted ids are left out of the
/// response entirely.
pub struct MockModel {
    variants: Option<Vec<String>>,
    suggestions: Option<Vec<HandleSuggestion>>,
    relevance: HashMap<String, f64>,
    default_relevance: f64,
    omitted: HashSet<String>,
    classify_failures: AtomicU32,
    expand_calls: AtomicU32,
    suggest_calls: AtomicU32,
    classify_calls: AtomicU32,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            variants: Some(Vec::new()),
            suggestions: Some(Vec::new()),
            relevance: HashMap::new(),
            default_relevance: 0.9,
            omitted: HashSet::new(),
            classify_failures: AtomicU32::new(0),
            expand_calls: AtomicU32::new(0),
            suggest_calls: AtomicU32::new(0),
            classify_calls: AtomicU32::new(0),
        }
    }

    pub fn with_variants(mut self, variants: &[&str]) -> Self {
        self.variants = Some(variants.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Expansion fails permanently.
    pub fn failing_expansion(mut self) -> Self {
        self.variants = None;
        self
    }

    pub fn with_suggestions(mut self, handles: &[(&str, f64)]) -> Self {
        self.suggestions = Some(
            handles
                .iter()
                .map(|(h, c)| HandleSuggestion {
                    handle: h.to_string(),
                    confidence: Some(*c),
                    region: None,
                    approx_followers: None,
                })
                .collect(),
        );
        self
    }

    pub fn failing_suggestions(mut self) -> Self {
        self.suggestions = None;
        self
    }

    pub fn with_relevance(mut self, id: &str, relevance: f64) -> Self {
        self.relevance.insert(id.to_string(), relevance);
        self
    }

    /// Leave these ids out of every classification response.
    pub fn omitting(mut self, ids: &[&str]) -> Self {
        self.omitted.extend(ids.iter().map(|id| id.to_string()));
        self
    }

    /// The next `n` classify calls fail transiently.
    pub fn with_classify_failures(self, n: u32) -> Self {
        self.classify_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn expand_calls(&self) -> u32 {
        self.expand_calls.load(Ordering::SeqCst)
    }

    pub fn suggest_calls(&self) -> u32 {
        self.suggest_calls.load(Ordering::SeqCst)
    }

    pub fn classify_calls(&self) -> u32 {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u32 {
        self.expand_calls() + self.suggest_calls() + self.classify_calls()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CurationModel for MockModel {
    async fn expand_keyword(
        &self,
        _keyword: &Keyword,
        count: usize,
    ) -> Result<Vec<String>, UpstreamError> {
        self.expand_calls.fetch_add(1, Ordering::SeqCst);
        match &self.variants {
            Some(v) => Ok(v.iter().take(count).cloned().collect()),
            None => Err(UpstreamError::Permanent("MockModel: expansion refused".to_string())),
        }
    }

    async fn suggest_handles(
        &self,
        _keyword: &Keyword,
        limit: usize,
    ) -> Result<Vec<HandleSuggestion>, UpstreamError> {
        self.suggest_calls.fetch_add(1, Ordering::SeqCst);
        match &self.suggestions {
            Some(s) => Ok(s.iter().take(limit).cloned().collect()),
            None => Err(UpstreamError::Permanent("MockModel: suggestions refused".to_string())),
        }
    }

    async fn classify(
        &self,
        _keyword: &Keyword,
        items: &[ContentItem],
    ) -> Result<Vec<RawJudgment>, UpstreamError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .classify_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(UpstreamError::Transient("MockModel: 529 overloaded".to_string()));
        }

        Ok(items
            .iter()
            .filter(|item| !self.omitted.contains(&item.id))
            .map(|item| RawJudgment {
                id: Some(item.id.clone()),
                relevance: Some(
                    self.relevance
                        .get(&item.id)
                        .copied()
                        .unwrap_or(self.default_relevance),
                ),
                rationale: Some("mock judgment".to_string()),
                region_confidence: Some(0.9),
            })
            .collect())
    }
}
