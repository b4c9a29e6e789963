//! Diversity selection: threshold exclusion, per-creator cap, and a
//! round-robin over creators so the feed does not clump.

use std::collections::{HashMap, VecDeque};

use tracing::info;

use clipscout_common::{
    ExcludedEntry, ExclusionReason, FeedEntry, RunConfig, RunWarning, Stage, WarningCode,
};

#[derive(Debug, Default)]
pub struct Selection {
    pub entries: Vec<FeedEntry>,
    /// Everything scored but not selected, in rank order.
    pub excluded: Vec<ExcludedEntry>,
    pub below_threshold: u32,
    pub over_creator_cap: u32,
    pub warnings: Vec<RunWarning>,
}

struct CreatorQueue {
    handle: String,
    entries: VecDeque<FeedEntry>,
}

impl CreatorQueue {
    fn best_score(&self) -> f64 {
        self.entries.front().map_or(f64::NEG_INFINITY, |e| e.composite_score)
    }
}

/// Pick up to `limit` entries. A creator never appears twice in a row while
/// another creator still has entries left.
pub fn diversify(mut entries: Vec<FeedEntry>, config: &RunConfig) -> Selection {
    let mut out = Selection::default();
    entries.sort_by(FeedEntry::rank_cmp);

    let mut groups: HashMap<String, CreatorQueue> = HashMap::new();
    for entry in entries {
        if entry.classification.relevance < config.ai_threshold {
            out.below_threshold += 1;
            out.excluded.push(ExcludedEntry {
                entry,
                reason: ExclusionReason::BelowThreshold,
            });
            continue;
        }
        let queue = groups
            .entry(entry.item.handle.clone())
            .or_insert_with(|| CreatorQueue {
                handle: entry.item.handle.clone(),
                entries: VecDeque::new(),
            });
        if queue.entries.len() >= config.max_per_creator {
            out.over_creator_cap += 1;
            out.excluded.push(ExcludedEntry {
                entry,
                reason: ExclusionReason::OverCreatorCap,
            });
            continue;
        }
        queue.entries.push_back(entry);
    }

    let mut queues: Vec<CreatorQueue> = groups.into_values().collect();
    let mut last_handle: Option<String> = None;

    while out.entries.len() < config.limit {
        queues.retain(|q| !q.entries.is_empty());
        if queues.is_empty() {
            break;
        }
        queues.sort_by(|a, b| {
            b.best_score()
                .total_cmp(&a.best_score())
                .then_with(|| a.handle.cmp(&b.handle))
        });
        if queues.len() > 1 && last_handle.as_deref() == Some(queues[0].handle.as_str()) {
            queues.swap(0, 1);
        }

        for queue in queues.iter_mut() {
            if out.entries.len() >= config.limit {
                break;
            }
            if let Some(entry) = queue.entries.pop_front() {
                last_handle = Some(queue.handle.clone());
                out.entries.push(entry);
            }
        }
    }

    out.excluded.extend(queues.into_iter().flat_map(|q| q.entries).map(|entry| {
        ExcludedEntry {
            entry,
            reason: ExclusionReason::OverLimit,
        }
    }));
    out.excluded.sort_by(|a, b| a.entry.rank_cmp(&b.entry));

    if out.entries.len() < config.limit {
        out.warnings.push(RunWarning::new(
            Stage::Diversify,
            WarningCode::PartialResult,
            format!(
                "only {} of {} requested items met the relevance threshold and creator cap",
                out.entries.len(),
                config.limit
            ),
        ));
    }

    info!(
        selected = out.entries.len(),
        limit = config.limit,
        below_threshold = out.below_threshold,
        over_cap = out.over_creator_cap,
        excluded = out.excluded.len(),
        "Diversity selection complete"
    );
    out
}
