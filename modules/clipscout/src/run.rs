//! Run orchestrator: validates the config, drives the five stages in order,
//! and assembles the [`RunArtifact`].

use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use clipscout_common::{
    AiUsage, ClipScoutError, CrawlSummary, Keyword, RunArtifact, RunConfig, RunWarning, Stage,
    StageTiming,
};

use crate::crawl::CrawlController;
use crate::diversity::diversify;
use crate::expansion::QueryExpander;
use crate::filter::extract_and_filter;
use crate::retry::RetryPolicy;
use crate::scoring::RelevanceScorer;
use crate::traits::{ContentSource, CurationModel, WebSearcher};

/// Accumulates warnings and stage timings across the run.
#[derive(Default)]
struct RunLog {
    warnings: Vec<RunWarning>,
    timings: Vec<StageTiming>,
}

impl RunLog {
    fn warn_all(&mut self, warnings: Vec<RunWarning>) {
        for w in warnings {
            warn!(stage = %w.stage, code = ?w.code, "{}", w.message);
            self.warnings.push(w);
        }
    }

    fn finish_stage(&mut self, stage: Stage, started: Instant) {
        let millis = started.elapsed().as_millis() as u64;
        info!(%stage, millis, "Stage complete");
        self.timings.push(StageTiming { stage, millis });
    }
}

pub struct Curator<'a> {
    searcher: &'a dyn WebSearcher,
    source: &'a dyn ContentSource,
    model: &'a dyn CurationModel,
    policy: RetryPolicy,
}

impl<'a> Curator<'a> {
    pub fn new(
        searcher: &'a dyn WebSearcher,
        source: &'a dyn ContentSource,
        model: &'a dyn CurationModel,
    ) -> Self {
        Self {
            searcher,
            source,
            model,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run(&self, config: &RunConfig) -> Result<RunArtifact, ClipScoutError> {
        config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let keyword = Keyword::new(config.keyword.clone(), config.topic.clone());
        let mut log = RunLog::default();

        info!(
            %run_id,
            keyword = keyword.text.as_str(),
            limit = config.limit,
            max_handles = config.max_handles,
            "Curation run starting"
        );

        // Expand
        let t = Instant::now();
        let expansion = QueryExpander::new(self.model, self.searcher, self.policy)
            .expand(&keyword, config)
            .await;
        log.warn_all(expansion.warnings);
        log.finish_stage(Stage::Expand, t);

        // Crawl
        let t = Instant::now();
        let crawl = CrawlController::new(self.source, self.policy)
            .crawl(&expansion.handles, config, started_at)
            .await;
        log.warn_all(crawl.warnings);
        log.finish_stage(Stage::Crawl, t);

        if expansion.searches_succeeded == 0 && crawl.handles_succeeded == 0 {
            return Err(ClipScoutError::UpstreamUnavailable(format!(
                "{} of {} searches failed and none of {} handle fetches succeeded",
                expansion.searches_attempted - expansion.searches_succeeded,
                expansion.searches_attempted,
                crawl.handles_attempted
            )));
        }

        // Filter
        let t = Instant::now();
        let filtered = extract_and_filter(crawl.posts, &expansion.variants, config, started_at);
        log.warn_all(filtered.warnings);
        log.finish_stage(Stage::Filter, t);
        let items_filtered = filtered.items.len() as u32;

        // Score
        let t = Instant::now();
        let scored = RelevanceScorer::new(self.model, self.policy)
            .score(&keyword, filtered.items, config, started_at)
            .await;
        log.warn_all(scored.warnings);
        log.finish_stage(Stage::Score, t);

        // Diversify
        let t = Instant::now();
        let selection = diversify(scored.entries, config);
        log.warn_all(selection.warnings);
        log.finish_stage(Stage::Diversify, t);

        let crawl_summary = CrawlSummary {
            variants: expansion.variants.len() as u32,
            handles_discovered: expansion.handles.len() as u32,
            handles_attempted: crawl.handles_attempted,
            handles_succeeded: crawl.handles_succeeded,
            handles_failed: crawl.handles_failed,
            fetch_retries: crawl.fetch_retries,
            items_harvested: crawl.items_harvested,
            rejected_stale: crawl.rejected_stale + filtered.rejected_stale,
            rejected_region: filtered.rejected_region,
            rejected_malformed: filtered.rejected_malformed,
            items_filtered,
            items_below_threshold: selection.below_threshold,
            items_over_creator_cap: selection.over_creator_cap,
            items_admitted: selection.entries.len() as u32,
            early_stopped: crawl.early_stopped,
        };

        let scoring_usage = scored.usage;
        let ai_usage = AiUsage {
            calls: expansion.ai_calls + scoring_usage.calls,
            failed_calls: expansion.ai_failed_calls + scoring_usage.failed_calls,
            ..scoring_usage
        };

        let finished_at = Utc::now();
        info!(
            %run_id,
            admitted = crawl_summary.items_admitted,
            warnings = log.warnings.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Curation run complete"
        );

        Ok(RunArtifact {
            run_id,
            keyword,
            config: config.clone(),
            started_at,
            finished_at,
            variants: expansion.variants,
            entries: selection.entries,
            excluded: selection.excluded,
            crawl: crawl_summary,
            ai_usage,
            warnings: log.warnings,
            timings: log.timings,
        })
    }
}
