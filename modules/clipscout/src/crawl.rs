//! Staged crawl: fetch recent content per handle in waves of `concurrency`,
//! stopping early once enough qualifying records are in hand.
//!
//! Workers only fetch. Their results are joined per wave and folded into a
//! [`RunningHarvest`] owned by the controller loop.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use clipscout_common::{RawPost, RunConfig, RunWarning, SourceHandle, Stage, WarningCode};

use crate::retry::{with_retry, Retried, RetryPolicy};
use crate::traits::ContentSource;

/// One handle's fetch, as returned by a worker.
struct HandleFetch {
    handle: String,
    outcome: Retried<Vec<RawPost>>,
}

#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub posts: Vec<RawPost>,
    pub warnings: Vec<RunWarning>,
    pub handles_attempted: u32,
    pub handles_succeeded: u32,
    pub handles_failed: u32,
    pub fetch_retries: u32,
    /// Records returned by the source, before any filtering.
    pub items_harvested: u32,
    /// Records outside the recency window, discarded at fetch time.
    pub rejected_stale: u32,
    pub early_stopped: bool,
}

/// Running collection of qualifying records. Only the controller writes it.
#[derive(Default)]
struct RunningHarvest {
    posts: Vec<RawPost>,
    seen_ids: HashSet<String>,
    qualifying: usize,
    harvested: u32,
    stale: u32,
}

impl RunningHarvest {
    fn absorb(&mut self, posts: Vec<RawPost>, cutoff: DateTime<Utc>) {
        for post in posts {
            self.harvested += 1;
            if post.published_at.is_some_and(|t| t < cutoff) {
                self.stale += 1;
                continue;
            }
            // Id-less records are kept for the filter stage to count as malformed.
            if let Some(id) = post.id.as_deref() {
                if !self.seen_ids.insert(id.to_string()) {
                    continue;
                }
                if post.published_at.is_some() {
                    self.qualifying += 1;
                }
            }
            self.posts.push(post);
        }
    }
}

pub struct CrawlController<'a> {
    source: &'a dyn ContentSource,
    policy: RetryPolicy,
}

impl<'a> CrawlController<'a> {
    pub fn new(source: &'a dyn ContentSource, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    async fn fetch_handle(&self, handle: &str, limit: u32) -> HandleFetch {
        let outcome =
            with_retry(&self.policy, handle, || self.source.fetch_recent(handle, limit)).await;
        HandleFetch {
            handle: handle.to_string(),
            outcome,
        }
    }

    pub async fn crawl(
        &self,
        handles: &[SourceHandle],
        config: &RunConfig,
        now: DateTime<Utc>,
    ) -> CrawlOutcome {
        let mut out = CrawlOutcome::default();
        let cutoff = config.window_start(now);
        let quota = config.early_stop_quota();
        let budget = &handles[..handles.len().min(config.max_handles)];
        let concurrency = config.concurrency.max(1);

        if handles.len() > budget.len() {
            info!(
                discovered = handles.len(),
                max_handles = config.max_handles,
                "Handle budget reached, extra handles will not be crawled"
            );
        }

        let mut harvest = RunningHarvest::default();
        let waves: Vec<&[SourceHandle]> = budget.chunks(concurrency).collect();

        for (wave_idx, wave) in waves.iter().enumerate() {
            let fetches: Vec<HandleFetch> = stream::iter(
                wave.iter()
                    .map(|h| self.fetch_handle(&h.identifier, config.posts_per_handle)),
            )
            .buffer_unordered(concurrency)
            .collect()
            .await;

            for fetch in fetches {
                out.handles_attempted += 1;
                let retries = fetch.outcome.retries();
                out.fetch_retries += retries;
                match fetch.outcome.result {
                    Ok(posts) => {
                        out.handles_succeeded += 1;
                        if retries > 0 {
                            out.warnings.push(RunWarning::new(
                                Stage::Crawl,
                                WarningCode::HandleRetried,
                                format!("@{} succeeded after {retries} retries", fetch.handle),
                            ));
                        }
                        harvest.absorb(posts, cutoff);
                    }
                    Err(e) => {
                        out.handles_failed += 1;
                        out.warnings.push(RunWarning::new(
                            Stage::Crawl,
                            WarningCode::HandleSkipped,
                            format!(
                                "@{} skipped after {} attempt(s): {e}",
                                fetch.handle, fetch.outcome.attempts
                            ),
                        ));
                    }
                }
            }

            info!(
                wave = wave_idx + 1,
                waves = waves.len(),
                qualifying = harvest.qualifying,
                quota,
                "Crawl wave complete"
            );

            let remaining = waves.len() - wave_idx - 1;
            if harvest.qualifying >= quota && remaining > 0 {
                warn!(
                    qualifying = harvest.qualifying,
                    quota,
                    abandoned_waves = remaining,
                    "Early stop: quota reached"
                );
                out.early_stopped = true;
                break;
            }
        }

        out.items_harvested = harvest.harvested;
        out.rejected_stale = harvest.stale;
        out.posts = harvest.posts;
        info!(
            attempted = out.handles_attempted,
            succeeded = out.handles_succeeded,
            failed = out.handles_failed,
            posts = out.posts.len(),
            early_stopped = out.early_stopped,
            "Crawl complete"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn post(id: Option<&str>, published_at: Option<DateTime<Utc>>) -> RawPost {
        RawPost {
            id: id.map(str::to_string),
            handle: Some("someone".into()),
            published_at,
            ..Default::default()
        }
    }

    #[test]
    fn harvest_drops_stale_and_duplicate_records() {
        let now = Utc::now();
        let cutoff = now - Duration::days(30);
        let mut harvest = RunningHarvest::default();
        harvest.absorb(
            vec![
                post(Some("1"), Some(now)),
                post(Some("1"), Some(now)),
                post(Some("2"), Some(now - Duration::days(45))),
                post(Some("3"), None),
                post(None, Some(now)),
            ],
            cutoff,
        );

        assert_eq!(harvest.harvested, 5);
        assert_eq!(harvest.stale, 1);
        // "1" once, "3" kept untimed, id-less kept for the filter to reject
        assert_eq!(harvest.posts.len(), 3);
        assert_eq!(harvest.qualifying, 1);
    }
}
