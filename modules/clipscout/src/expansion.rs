//! Keyword → query variants + candidate source handles.
//!
//! AI expansion and AI handle suggestion run concurrently; search-engine
//! discovery then runs once per accepted variant. Every failure here degrades
//! to a warning.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use clipscout_common::{
    HandleOrigin, Keyword, QueryVariant, RunConfig, RunWarning, SourceHandle, Stage,
    VariantOrigin, WarningCode,
};

use crate::retry::{with_retry, RetryPolicy};
use crate::scraper::handle_from_url;
use crate::traits::{CurationModel, HandleSuggestion, WebSearcher};

const SEARCH_CONCURRENCY: usize = 4;

/// Search query for one variant, constrained to TikTok content URLs.
pub fn search_query(variant: &str) -> String {
    format!("site:tiktok.com \"{variant}\"")
}

/// Seed first, then AI variants: trimmed, leading `#` stripped, deduplicated
/// case-insensitively, capped at `target` (seed included).
pub fn merge_variants(
    keyword: &Keyword,
    generated: Vec<String>,
    target: usize,
) -> Vec<QueryVariant> {
    let mut seen = HashSet::new();
    let mut variants = Vec::new();

    let seed = std::iter::once((keyword.text.clone(), VariantOrigin::Seed));
    let rest = generated.into_iter().map(|v| (v, VariantOrigin::AiGenerated));

    for (text, origin) in seed.chain(rest) {
        if variants.len() >= target.max(1) {
            break;
        }
        let text = text.trim().trim_start_matches('#').trim().to_string();
        if text.is_empty() || !seen.insert(text.to_lowercase()) {
            continue;
        }
        variants.push(QueryVariant { text, origin });
    }
    variants
}

/// Sort key that makes the merge independent of input order.
fn merge_order(a: &SourceHandle, b: &SourceHandle) -> std::cmp::Ordering {
    a.origin
        .priority()
        .cmp(&b.origin.priority())
        .then_with(|| {
            b.confidence
                .unwrap_or(-1.0)
                .total_cmp(&a.confidence.unwrap_or(-1.0))
        })
        .then_with(|| a.identifier.cmp(&b.identifier))
        .then_with(|| a.region_hint.cmp(&b.region_hint))
        .then_with(|| a.audience_size.cmp(&b.audience_size))
}

/// Deduplicate handles by identifier. The merged entry keeps the
/// highest-priority origin, the highest confidence, and the first region and
/// audience metadata in priority order.
pub fn merge_handles(handles: impl IntoIterator<Item = SourceHandle>) -> Vec<SourceHandle> {
    let mut all: Vec<SourceHandle> = handles.into_iter().collect();
    all.sort_by(merge_order);

    let mut merged: HashMap<String, SourceHandle> = HashMap::new();
    for handle in all {
        match merged.get_mut(&handle.identifier) {
            None => {
                merged.insert(handle.identifier.clone(), handle);
            }
            Some(existing) => {
                existing.confidence = match (existing.confidence, handle.confidence) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                if existing.region_hint.is_none() {
                    existing.region_hint = handle.region_hint;
                }
                if existing.audience_size.is_none() {
                    existing.audience_size = handle.audience_size;
                }
            }
        }
    }

    let mut out: Vec<SourceHandle> = merged.into_values().collect();
    out.sort_by(merge_order);
    out
}

fn suggested_handle(s: HandleSuggestion) -> Option<SourceHandle> {
    let mut handle = SourceHandle::new(&s.handle, HandleOrigin::AiSuggested)?;
    if let Some(c) = s.confidence {
        handle = handle.with_confidence(c);
    }
    handle.region_hint = s.region.filter(|r| !r.trim().is_empty());
    handle.audience_size = s.approx_followers;
    Some(handle)
}

#[derive(Debug, Default)]
pub struct Expansion {
    pub variants: Vec<QueryVariant>,
    pub handles: Vec<SourceHandle>,
    pub warnings: Vec<RunWarning>,
    pub searches_attempted: u32,
    pub searches_succeeded: u32,
    pub ai_calls: u32,
    pub ai_failed_calls: u32,
}

pub struct QueryExpander<'a> {
    model: &'a dyn CurationModel,
    searcher: &'a dyn WebSearcher,
    policy: RetryPolicy,
}

impl<'a> QueryExpander<'a> {
    pub fn new(
        model: &'a dyn CurationModel,
        searcher: &'a dyn WebSearcher,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            model,
            searcher,
            policy,
        }
    }

    pub async fn expand(&self, keyword: &Keyword, config: &RunConfig) -> Expansion {
        let mut out = Expansion::default();
        let ai_count = config.variant_count.saturating_sub(1);

        let expansion = async {
            if ai_count == 0 {
                return None;
            }
            Some(
                with_retry(&self.policy, "ai_expansion", || {
                    self.model.expand_keyword(keyword, ai_count)
                })
                .await,
            )
        };
        let suggestion = async {
            if !config.ai_seed {
                return None;
            }
            Some(
                with_retry(&self.policy, "ai_seed", || {
                    self.model.suggest_handles(keyword, config.ai_seed_limit)
                })
                .await,
            )
        };
        let (expansion, suggestion) = tokio::join!(expansion, suggestion);

        let mut generated = Vec::new();
        if let Some(retried) = expansion {
            out.ai_calls += retried.attempts;
            out.ai_failed_calls += retried.retries();
            match retried.result {
                Ok(v) => generated = v,
                Err(e) => {
                    out.ai_failed_calls += 1;
                    out.warnings.push(RunWarning::new(
                        Stage::Expand,
                        WarningCode::AiExpansionFailed,
                        format!("AI keyword expansion failed, searching with the seed only: {e}"),
                    ));
                }
            }
        }
        out.variants = merge_variants(keyword, generated, config.variant_count);
        info!(count = out.variants.len(), "Query variants ready");

        let mut candidates: Vec<SourceHandle> = config
            .seed_handles
            .iter()
            .filter_map(|h| {
                let handle = SourceHandle::new(h, HandleOrigin::Seed);
                if handle.is_none() {
                    warn!(handle = h.as_str(), "Ignoring invalid seed handle");
                }
                handle
            })
            .collect();

        if let Some(retried) = suggestion {
            out.ai_calls += retried.attempts;
            out.ai_failed_calls += retried.retries();
            match retried.result {
                Ok(suggestions) => {
                    candidates.extend(
                        suggestions
                            .into_iter()
                            .take(config.ai_seed_limit)
                            .filter_map(suggested_handle),
                    );
                }
                Err(e) => {
                    out.ai_failed_calls += 1;
                    out.warnings.push(RunWarning::new(
                        Stage::Expand,
                        WarningCode::AiSeedFailed,
                        format!("AI handle suggestion failed: {e}"),
                    ));
                }
            }
        }

        let searches: Vec<_> = stream::iter(out.variants.iter().map(|variant| {
            let query = search_query(&variant.text);
            async move {
                let retried = with_retry(&self.policy, "search", || {
                    self.searcher.search(&query, config.search_results_per_query)
                })
                .await;
                (query, retried)
            }
        }))
        .buffer_unordered(SEARCH_CONCURRENCY)
        .collect()
        .await;

        for (query, retried) in searches {
            out.searches_attempted += 1;
            match retried.result {
                Ok(results) => {
                    out.searches_succeeded += 1;
                    candidates.extend(results.iter().filter_map(|r| {
                        let id = handle_from_url(&r.url)?;
                        SourceHandle::new(&id, HandleOrigin::SearchEngine)
                    }));
                }
                Err(e) => {
                    out.warnings.push(RunWarning::new(
                        Stage::Expand,
                        WarningCode::SearchFailed,
                        format!(
                            "search for {query} failed after {} attempt(s): {e}",
                            retried.attempts
                        ),
                    ));
                }
            }
        }

        out.handles = merge_handles(candidates);
        info!(
            variants = out.variants.len(),
            handles = out.handles.len(),
            searches_ok = out.searches_succeeded,
            searches = out.searches_attempted,
            "Expansion complete"
        );
        out
    }
}
