// Trait boundaries for the curation pipeline's external collaborators.
//
// - WebSearcher (Serper): search-engine lookup
// - ContentSource (Apify TikTok actor): per-handle recent content
// - CurationModel (Claude): keyword expansion, handle suggestion and batch
//   relevance classification
//
// Stages only see these traits, so tests run against the in-memory mocks in
// `testing.rs` with no network.

use async_trait::async_trait;
use thiserror::Error;

use clipscout_common::{ContentItem, Keyword, RawPost};

/// Failure reported by an external collaborator, classified for retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    /// Rate limit, timeout, overload. Retrying may succeed.
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// The requested handle or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Permanent(String),
}

impl UpstreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// WebSearcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Run one query. An empty result list is a valid answer.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, UpstreamError>;
}

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch up to `limit` of the handle's most recent posts.
    async fn fetch_recent(&self, handle: &str, limit: u32) -> Result<Vec<RawPost>, UpstreamError>;
}

// ---------------------------------------------------------------------------
// CurationModel
// ---------------------------------------------------------------------------

/// An account the model proposes for the keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleSuggestion {
    pub handle: String,
    pub confidence: Option<f64>,
    pub region: Option<String>,
    pub approx_followers: Option<u64>,
}

/// One item's judgment as returned by the model, before validation.
/// Any field may be missing or out of range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawJudgment {
    pub id: Option<String>,
    pub relevance: Option<f64>,
    pub rationale: Option<String>,
    pub region_confidence: Option<f64>,
}

#[async_trait]
pub trait CurationModel: Send + Sync {
    /// Alternate phrasings, descriptors and hashtags for the keyword.
    async fn expand_keyword(
        &self,
        keyword: &Keyword,
        count: usize,
    ) -> Result<Vec<String>, UpstreamError>;

    /// Accounts the model believes post about the keyword.
    async fn suggest_handles(
        &self,
        keyword: &Keyword,
        limit: usize,
    ) -> Result<Vec<HandleSuggestion>, UpstreamError>;

    /// Judge one batch of items against the keyword (or its topic hint).
    async fn classify(
        &self,
        keyword: &Keyword,
        items: &[ContentItem],
    ) -> Result<Vec<RawJudgment>, UpstreamError>;
}
