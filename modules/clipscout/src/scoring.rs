//! Relevance scoring: numeric engagement/recency score plus batched AI
//! classification, combined into the composite ranking score.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use clipscout_common::{
    AiUsage, Classification, ContentItem, FeedEntry, Keyword, RunConfig, RunWarning, Stage,
    WarningCode,
};

use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{CurationModel, RawJudgment};

/// View count at which reach saturates.
const REACH_SATURATION_VIEWS: f64 = 10_000_000.0;
/// Weighted interaction rate at which interaction saturates.
const INTERACTION_SATURATION: f64 = 0.10;

/// Engagement and recency blended into [0, 1]. Does not depend on the AI.
pub fn numeric_score(item: &ContentItem, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let m = item.metrics;
    let views = m.views as f64;

    let reach = ((1.0 + views).ln() / (1.0 + REACH_SATURATION_VIEWS).ln()).min(1.0);
    let weighted = m.likes as f64 + 2.0 * m.comments as f64 + 3.0 * m.shares as f64;
    let interaction = ((weighted / views.max(1.0)) / INTERACTION_SATURATION).min(1.0);
    let engagement = 0.6 * reach + 0.4 * interaction;

    let age_days = ((now - item.published_at).num_seconds() as f64 / 86_400.0).max(0.0);
    let recency = 0.5_f64.powf(age_days / half_life_days);

    engagement * (0.5 + 0.5 * recency)
}

pub fn composite_score(numeric: f64, relevance: f64) -> f64 {
    numeric * (0.5 + 0.5 * relevance)
}

/// Turn one model judgment into a classification, or `None` if unusable.
fn validate(judgment: &RawJudgment) -> Option<Classification> {
    let relevance = judgment
        .relevance
        .filter(|r| r.is_finite() && (0.0..=1.0).contains(r))?;
    Some(Classification {
        relevance,
        rationale: judgment
            .rationale
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("no rationale given")
            .to_string(),
        region_confidence: judgment
            .region_confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0)),
        fallback: false,
    })
}

/// Match judgments to items by id. Every item gets exactly one classification.
pub fn classify_batch(items: &[ContentItem], judgments: &[RawJudgment]) -> Vec<Classification> {
    let mut by_id: HashMap<&str, &RawJudgment> = HashMap::new();
    for j in judgments {
        if let Some(id) = j.id.as_deref() {
            by_id.entry(id).or_insert(j);
        }
    }

    items
        .iter()
        .map(|item| match by_id.get(item.id.as_str()) {
            None => Classification::fallback("missing from model response"),
            Some(j) => validate(j)
                .unwrap_or_else(|| Classification::fallback("invalid relevance in model response")),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ScoreOutcome {
    /// Sorted by composite score desc, then item id.
    pub entries: Vec<FeedEntry>,
    pub usage: AiUsage,
    pub warnings: Vec<RunWarning>,
}

pub struct RelevanceScorer<'a> {
    model: &'a dyn CurationModel,
    policy: RetryPolicy,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(model: &'a dyn CurationModel, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub async fn score(
        &self,
        keyword: &Keyword,
        items: Vec<ContentItem>,
        config: &RunConfig,
        now: DateTime<Utc>,
    ) -> ScoreOutcome {
        let mut out = ScoreOutcome::default();
        if items.is_empty() {
            return out;
        }

        let batches: Vec<&[ContentItem]> =
            items.chunks(config.classify_batch_size.max(1)).collect();
        info!(items = items.len(), batches = batches.len(), "Classifying items");

        let calls = batches.into_iter().enumerate().map(|(idx, batch)| async move {
            let retried =
                with_retry(&self.policy, "classify", || self.model.classify(keyword, batch)).await;
            (idx, batch, retried)
        });
        let results: Vec<_> = stream::iter(calls)
            .buffer_unordered(config.classify_concurrency.max(1))
            .collect()
            .await;

        let mut scored: Vec<FeedEntry> = Vec::with_capacity(items.len());
        for (idx, batch, retried) in results {
            out.usage.classification_batches += 1;
            out.usage.calls += retried.attempts;
            out.usage.failed_calls += retried.retries();

            let classifications = match retried.result {
                Ok(judgments) => {
                    let c = classify_batch(batch, &judgments);
                    let fallbacks = c.iter().filter(|c| c.fallback).count();
                    if fallbacks > 0 {
                        out.warnings.push(RunWarning::new(
                            Stage::Score,
                            WarningCode::ClassificationFallback,
                            format!(
                                "batch {}: {fallbacks} of {} items fell back to relevance 0",
                                idx + 1,
                                batch.len()
                            ),
                        ));
                    }
                    c
                }
                Err(e) => {
                    out.usage.failed_calls += 1;
                    warn!(batch = idx + 1, error = %e, "Classification batch failed");
                    out.warnings.push(RunWarning::new(
                        Stage::Score,
                        WarningCode::BatchFailed,
                        format!("batch {} of {} items failed: {e}", idx + 1, batch.len()),
                    ));
                    batch
                        .iter()
                        .map(|_| {
                            Classification::fallback(format!("classification call failed: {e}"))
                        })
                        .collect()
                }
            };

            for (item, classification) in batch.iter().zip(classifications) {
                if classification.fallback {
                    out.usage.fallback_items += 1;
                } else {
                    out.usage.items_classified += 1;
                }
                let numeric = numeric_score(item, now, config.recency_half_life_days);
                scored.push(FeedEntry {
                    item: item.clone(),
                    composite_score: composite_score(numeric, classification.relevance),
                    numeric_score: numeric,
                    demoted: classification.relevance < config.ai_threshold,
                    classification,
                });
            }
        }

        scored.sort_by(FeedEntry::rank_cmp);
        out.entries = scored;
        info!(
            entries = out.entries.len(),
            classified = out.usage.items_classified,
            fallback = out.usage.fallback_items,
            "Scoring complete"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use clipscout_common::{EngagementMetrics, RegionHint};

    fn item(id: &str, views: u64, likes: u64, age_days: i64, now: DateTime<Utc>) -> ContentItem {
        ContentItem {
            id: id.into(),
            handle: "creator".into(),
            url: format!("https://www.tiktok.com/@creator/video/{id}"),
            published_at: now - Duration::days(age_days),
            metrics: EngagementMetrics {
                views,
                likes,
                comments: 0,
                shares: 0,
            },
            caption: String::new(),
            hashtags: vec![],
            author_display_name: None,
            author_bio: None,
            author_followers: None,
            author_verified: false,
            duration_secs: None,
            music: None,
            region_hint: RegionHint::Unknown,
            keyword_hits: vec![],
        }
    }

    fn judgment(id: &str, relevance: Option<f64>) -> RawJudgment {
        RawJudgment {
            id: Some(id.into()),
            relevance,
            rationale: Some("on topic".into()),
            region_confidence: None,
        }
    }

    #[test]
    fn numeric_score_saturates_and_decays() {
        let now = Utc::now();
        // 10M views, 10% like rate, posted now: both terms saturate.
        let top = numeric_score(&item("a", 10_000_000, 1_000_000, 0, now), now, 7.0);
        assert!((top - 1.0).abs() < 1e-9);

        // Same engagement one half-life old: recency 0.5 → factor 0.75.
        let week_old = numeric_score(&item("b", 10_000_000, 1_000_000, 7, now), now, 7.0);
        assert!((week_old - 0.75).abs() < 1e-9);

        let none = numeric_score(&item("c", 0, 0, 0, now), now, 7.0);
        assert_eq!(none, 0.0);
    }

    #[test]
    fn composite_formula_is_exact() {
        assert_eq!(composite_score(0.8, 0.0), 0.4);
        assert_eq!(composite_score(0.8, 1.0), 0.8);
        assert_eq!(composite_score(0.5, 0.5), 0.375);
    }

    #[test]
    fn missing_and_invalid_judgments_fall_back() {
        let now = Utc::now();
        let items: Vec<_> = ["1", "2", "3", "4"]
            .into_iter()
            .map(|id| item(id, 10, 1, 0, now))
            .collect();
        let judgments = vec![
            judgment("1", Some(0.9)),
            judgment("2", Some(1.4)),
            judgment("3", Some(f64::NAN)),
        ];
        let c = classify_batch(&items, &judgments);
        assert_eq!(c.len(), 4);
        assert_eq!(c[0].relevance, 0.9);
        assert!(!c[0].fallback);
        for fallback in &c[1..] {
            assert!(fallback.fallback);
            assert_eq!(fallback.relevance, 0.0);
            assert!(fallback.rationale.starts_with("fallback:"));
        }
    }

    #[test]
    fn first_judgment_for_an_id_wins() {
        let now = Utc::now();
        let items = vec![item("1", 10, 1, 0, now)];
        let c = classify_batch(&items, &[judgment("1", Some(0.2)), judgment("1", Some(0.9))]);
        assert_eq!(c[0].relevance, 0.2);
    }
}
