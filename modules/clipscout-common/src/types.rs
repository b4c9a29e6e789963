use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RunConfig;

// --- Keyword expansion ---

/// The user's search intent. Supplied once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    pub topic: Option<String>,
}

impl Keyword {
    pub fn new(text: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            topic: topic
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }

    /// What the relevance classifier should judge against.
    pub fn classifier_hint(&self) -> &str {
        self.topic.as_deref().unwrap_or(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantOrigin {
    Seed,
    AiGenerated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryVariant {
    pub text: String,
    pub origin: VariantOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleOrigin {
    Seed,
    SearchEngine,
    AiSuggested,
}

impl HandleOrigin {
    /// Lower wins when the same handle arrives from several sources.
    pub fn priority(self) -> u8 {
        match self {
            HandleOrigin::Seed => 0,
            HandleOrigin::SearchEngine => 1,
            HandleOrigin::AiSuggested => 2,
        }
    }
}

/// A content source (an account) discovered for this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHandle {
    /// Normalized: lowercase, no leading `@`.
    pub identifier: String,
    /// Discovery confidence in [0, 1]; only AI-suggested handles carry one.
    pub confidence: Option<f64>,
    pub origin: HandleOrigin,
    pub region_hint: Option<String>,
    pub audience_size: Option<u64>,
}

impl SourceHandle {
    /// Build a handle from a raw identifier. Returns `None` when the identifier
    /// is not a plausible account name.
    pub fn new(raw: &str, origin: HandleOrigin) -> Option<Self> {
        Some(Self {
            identifier: normalize_handle(raw)?,
            confidence: None,
            origin,
            region_hint: None,
            audience_size: None,
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        });
        self
    }
}

/// Normalize an account identifier: trim, drop a leading `@`, lowercase.
/// Only `[a-z0-9._]` and 2–24 characters are accepted (TikTok's username rules).
pub fn normalize_handle(raw: &str) -> Option<String> {
    let handle = raw.trim().trim_start_matches('@').to_lowercase();
    let valid_chars = handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    if valid_chars && (2..=24).contains(&handle.len()) {
        Some(handle)
    } else {
        None
    }
}

// --- Crawled content ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
}

/// One record as returned by the content source, before validation.
/// Platform adapters convert their native payloads into this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: Option<String>,
    pub handle: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub metrics: EngagementMetrics,
    pub caption: Option<String>,
    pub hashtags: Vec<String>,
    pub author_display_name: Option<String>,
    pub author_bio: Option<String>,
    pub author_region: Option<String>,
    pub author_followers: Option<u64>,
    pub author_verified: bool,
    /// Country code the video was posted from, if the platform reports it.
    pub location_created: Option<String>,
    pub duration_secs: Option<f64>,
    pub music: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionHint {
    Us,
    NonUs,
    Unknown,
}

impl fmt::Display for RegionHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionHint::Us => write!(f, "us"),
            RegionHint::NonUs => write!(f, "non_us"),
            RegionHint::Unknown => write!(f, "unknown"),
        }
    }
}

/// A validated candidate video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub handle: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub metrics: EngagementMetrics,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub author_display_name: Option<String>,
    pub author_bio: Option<String>,
    pub author_followers: Option<u64>,
    pub author_verified: bool,
    pub duration_secs: Option<f64>,
    pub music: Option<String>,
    pub region_hint: RegionHint,
    /// Query variants and hashtags found in the caption or bio.
    pub keyword_hits: Vec<String>,
}

// --- Scoring ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// In [0, 1].
    pub relevance: f64,
    pub rationale: String,
    pub region_confidence: Option<f64>,
    /// True when the model gave no usable judgment and relevance defaulted to 0.
    pub fallback: bool,
}

impl Classification {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            relevance: 0.0,
            rationale: format!("fallback: {}", reason.into()),
            region_confidence: None,
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub item: ContentItem,
    pub classification: Classification,
    pub numeric_score: f64,
    pub composite_score: f64,
    /// Relevance fell below the admission threshold.
    pub demoted: bool,
}

impl FeedEntry {
    /// Ranking order: composite score descending, then item id ascending.
    pub fn rank_cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .composite_score
            .total_cmp(&self.composite_score)
            .then_with(|| self.item.id.cmp(&other.item.id))
    }
}

/// Why a scored entry did not make the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    BelowThreshold,
    OverCreatorCap,
    /// Eligible, but the feed was already full.
    OverLimit,
}

/// A scored entry left out of the feed, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedEntry {
    pub entry: FeedEntry,
    pub reason: ExclusionReason,
}

// --- Run bookkeeping ---

/// The fixed sequence of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Expand,
    Crawl,
    Filter,
    Score,
    Diversify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Expand => "expand",
            Stage::Crawl => "crawl",
            Stage::Filter => "filter",
            Stage::Score => "score",
            Stage::Diversify => "diversify",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    AiExpansionFailed,
    AiSeedFailed,
    SearchFailed,
    HandleRetried,
    HandleSkipped,
    MalformedRecords,
    BatchFailed,
    ClassificationFallback,
    PartialResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWarning {
    pub stage: Stage,
    pub code: WarningCode,
    pub message: String,
}

impl RunWarning {
    pub fn new(stage: Stage, code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub variants: u32,
    pub handles_discovered: u32,
    pub handles_attempted: u32,
    pub handles_succeeded: u32,
    pub handles_failed: u32,
    pub fetch_retries: u32,
    pub items_harvested: u32,
    pub rejected_stale: u32,
    pub rejected_region: u32,
    pub rejected_malformed: u32,
    /// Items that passed the filter stage and went to scoring.
    pub items_filtered: u32,
    pub items_below_threshold: u32,
    pub items_over_creator_cap: u32,
    /// Items in the final feed.
    pub items_admitted: u32,
    pub early_stopped: bool,
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Curation Run Complete ===")?;
        writeln!(f, "Query variants:      {}", self.variants)?;
        writeln!(f, "Handles discovered:  {}", self.handles_discovered)?;
        writeln!(f, "Handles attempted:   {}", self.handles_attempted)?;
        writeln!(f, "Handles succeeded:   {}", self.handles_succeeded)?;
        writeln!(f, "Handles failed:      {}", self.handles_failed)?;
        writeln!(f, "Fetch retries:       {}", self.fetch_retries)?;
        writeln!(
            f,
            "Early stop:          {}",
            if self.early_stopped { "yes" } else { "no" }
        )?;
        writeln!(f, "\nItems harvested:     {}", self.items_harvested)?;
        writeln!(f, "  Stale:             {}", self.rejected_stale)?;
        writeln!(f, "  Outside region:    {}", self.rejected_region)?;
        writeln!(f, "  Malformed:         {}", self.rejected_malformed)?;
        writeln!(f, "Items scored:        {}", self.items_filtered)?;
        writeln!(f, "  Below threshold:   {}", self.items_below_threshold)?;
        writeln!(f, "  Over creator cap:  {}", self.items_over_creator_cap)?;
        writeln!(f, "Items admitted:      {}", self.items_admitted)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiUsage {
    pub calls: u32,
    pub failed_calls: u32,
    pub classification_batches: u32,
    pub items_classified: u32,
    pub fallback_items: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub millis: u64,
}

/// Everything one invocation produces. Written to disk exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub run_id: Uuid,
    pub keyword: Keyword,
    pub config: RunConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub variants: Vec<QueryVariant>,
    pub entries: Vec<FeedEntry>,
    /// Scored entries that were not selected, in rank order.
    pub excluded: Vec<ExcludedEntry>,
    pub crawl: CrawlSummary,
    pub ai_usage: AiUsage,
    pub warnings: Vec<RunWarning>,
    pub timings: Vec<StageTiming>,
}

impl RunArtifact {
    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_normalization() {
        assert_eq!(normalize_handle("  @Dietitian.Jane "), Some("dietitian.jane".into()));
        assert_eq!(normalize_handle("eat_well_99"), Some("eat_well_99".into()));
        assert_eq!(normalize_handle("@"), None);
        assert_eq!(normalize_handle("has space"), None);
        assert_eq!(normalize_handle("tiktok.com/@x"), None);
    }

    #[test]
    fn confidence_is_clamped() {
        let h = SourceHandle::new("abc", HandleOrigin::AiSuggested)
            .unwrap()
            .with_confidence(1.7);
        assert_eq!(h.confidence, Some(1.0));
        let h = h.with_confidence(f64::NAN);
        assert_eq!(h.confidence, Some(0.0));
    }

    #[test]
    fn keyword_prefers_topic_hint() {
        let k = Keyword::new(" nutritionist ", Some("  ".into()));
        assert_eq!(k.text, "nutritionist");
        assert_eq!(k.classifier_hint(), "nutritionist");

        let k = Keyword::new("nutritionist", Some("registered dietitians".into()));
        assert_eq!(k.classifier_hint(), "registered dietitians");
    }

    #[test]
    fn fallback_classification_is_zero_and_flagged() {
        let c = Classification::fallback("missing from response");
        assert_eq!(c.relevance, 0.0);
        assert!(c.fallback);
        assert!(c.rationale.starts_with("fallback:"));
    }

    #[test]
    fn artifact_enums_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(WarningCode::PartialResult).unwrap(),
            "partial_result"
        );
        assert_eq!(serde_json::to_value(HandleOrigin::SearchEngine).unwrap(), "search_engine");
        assert_eq!(serde_json::to_value(RegionHint::NonUs).unwrap(), "non_us");
        assert_eq!(
            serde_json::to_value(ExclusionReason::OverCreatorCap).unwrap(),
            "over_creator_cap"
        );
    }

    #[test]
    fn scores_survive_json_round_trip_bit_for_bit() {
        for i in 1..5000u32 {
            let views = f64::from(i) * 997.0;
            let score = views.ln_1p() / 1e7f64.ln_1p() * 0.5f64.powf(f64::from(i) / 7.0);
            let text = serde_json::to_string(&score).unwrap();
            let back: f64 = serde_json::from_str(&text).unwrap();
            assert_eq!(back.to_bits(), score.to_bits(), "{text}");
        }
    }
}
