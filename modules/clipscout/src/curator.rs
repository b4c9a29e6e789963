//! Claude-backed [`CurationModel`]: keyword expansion, handle suggestion and
//! batch relevance classification, all through forced structured output.
//!
//! Classification responses are validated per item rather than per call, so
//! one malformed verdict never costs the rest of the batch.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use ai_client::{truncate_to_char_boundary, AiError, Claude, StructuredOutput};
use clipscout_common::{ContentItem, Keyword};

use crate::traits::{CurationModel, HandleSuggestion, RawJudgment, UpstreamError};

impl From<AiError> for UpstreamError {
    fn from(err: AiError) -> Self {
        if err.is_transient() {
            UpstreamError::Transient(err.to_string())
        } else {
            UpstreamError::Permanent(err.to_string())
        }
    }
}

#[derive(Deserialize, JsonSchema)]
struct ExpansionResponse {
    /// Alternate search phrasings, descriptors or hashtags. No leading '#'.
    variants: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
struct HandleSuggestionResponse {
    /// TikTok accounts that regularly post about the topic.
    handles: Vec<SuggestedHandle>,
}

#[derive(Deserialize, JsonSchema)]
struct SuggestedHandle {
    /// TikTok username without the '@'.
    handle: String,
    /// How sure you are this account posts about the topic, 0.0 to 1.0.
    confidence: Option<f64>,
    /// Country or US state the creator is based in, if known.
    region: Option<String>,
    /// Approximate follower count, if known.
    approx_followers: Option<u64>,
}

/// Schema handed to the model for classification. Parsing goes through
/// [`parse_judgments`] instead of this type.
#[allow(dead_code)]
#[derive(Deserialize, JsonSchema)]
struct ClassificationResponse {
    /// One judgment per submitted video.
    items: Vec<ItemJudgment>,
}

#[allow(dead_code)]
#[derive(Deserialize, JsonSchema)]
struct ItemJudgment {
    /// The video id exactly as given.
    id: String,
    /// How well the video matches the topic, 0.0 to 1.0.
    relevance: f64,
    /// One short sentence explaining the score.
    rationale: String,
    /// Likelihood the creator is US-based, 0.0 to 1.0.
    region_confidence: Option<f64>,
}

const EXPANSION_SYSTEM: &str = "\
You help find short-form video creators on TikTok. Given a search keyword, \
produce alternate phrasings a viewer or creator would use: synonyms, job \
titles, niche descriptors and popular hashtags (without the '#').\n\
Keep each variant short (1-4 words). Do not repeat the keyword itself.";

const SUGGEST_SYSTEM: &str = "\
You recommend TikTok creators. Given a topic, list real, currently active \
TikTok accounts that regularly post about it, preferring US-based creators. \
Only include accounts you are reasonably sure exist. Give the username \
without '@'.";

const CLASSIFY_SYSTEM: &str = "\
You judge whether TikTok videos match a topic. For each video, score \
relevance from 0.0 (unrelated) to 1.0 (squarely on topic) using the caption, \
hashtags and the creator's bio. A creator who is on topic but posted an \
off-topic video scores low. Also estimate how likely the creator is US-based.\n\
Return exactly one judgment per video id. Keep rationales under 20 words.";

const CAPTION_CHARS: usize = 300;
const BIO_CHARS: usize = 200;

#[derive(Clone)]
pub struct ClaudeCurator {
    ai: Claude,
}

impl ClaudeCurator {
    pub fn new(ai: Claude) -> Self {
        Self { ai }
    }
}

fn classify_prompt(keyword: &Keyword, items: &[ContentItem]) -> String {
    let mut prompt = format!("Topic: {}\n\nVideos:\n", keyword.classifier_hint());
    for item in items {
        prompt.push_str(&format!(
            "\n[id: {}] @{}\ncaption: {}\nhashtags: {}\nbio: {}\n",
            item.id,
            item.handle,
            truncate_to_char_boundary(&item.caption.replace('\n', " "), CAPTION_CHARS),
            item.hashtags.join(", "),
            truncate_to_char_boundary(
                &item.author_bio.as_deref().unwrap_or("").replace('\n', " "),
                BIO_CHARS
            ),
        ));
    }
    prompt
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read whatever judgments the model returned. Items that are not objects are
/// skipped; fields that are missing or of the wrong type come back as `None`
/// for the scorer to reject.
pub fn parse_judgments(value: &Value) -> Vec<RawJudgment> {
    let Some(items) = value.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| RawJudgment {
            id: obj.get("id").and_then(|id| match id {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            relevance: obj.get("relevance").and_then(number),
            rationale: obj
                .get("rationale")
                .and_then(Value::as_str)
                .map(str::to_string),
            region_confidence: obj.get("region_confidence").and_then(number),
        })
        .collect()
}

#[async_trait]
impl CurationModel for ClaudeCurator {
    async fn expand_keyword(
        &self,
        keyword: &Keyword,
        count: usize,
    ) -> Result<Vec<String>, UpstreamError> {
        let prompt = format!(
            "Keyword: {}\nTopic: {}\n\nGive up to {count} variants.",
            keyword.text,
            keyword.classifier_hint()
        );
        let response = self
            .ai
            .extract::<ExpansionResponse>(EXPANSION_SYSTEM, prompt)
            .await?;
        info!(keyword = %keyword.text, count = response.variants.len(), "AI expansion complete");
        Ok(response.variants)
    }

    async fn suggest_handles(
        &self,
        keyword: &Keyword,
        limit: usize,
    ) -> Result<Vec<HandleSuggestion>, UpstreamError> {
        let prompt = format!(
            "Topic: {}\n\nList up to {limit} TikTok accounts.",
            keyword.classifier_hint()
        );
        let response = self
            .ai
            .extract::<HandleSuggestionResponse>(SUGGEST_SYSTEM, prompt)
            .await?;
        info!(keyword = %keyword.text, count = response.handles.len(), "AI handle suggestions");
        Ok(response
            .handles
            .into_iter()
            .map(|h| HandleSuggestion {
                handle: h.handle,
                confidence: h.confidence,
                region: h.region,
                approx_followers: h.approx_followers,
            })
            .collect())
    }

    async fn classify(
        &self,
        keyword: &Keyword,
        items: &[ContentItem],
    ) -> Result<Vec<RawJudgment>, UpstreamError> {
        let value = self
            .ai
            .extract_value(
                CLASSIFY_SYSTEM,
                classify_prompt(keyword, items),
                ClassificationResponse::tool_schema(),
            )
            .await?;
        let judgments = parse_judgments(&value);
        debug!(submitted = items.len(), returned = judgments.len(), "Classification batch");
        Ok(judgments)
    }
}
