use std::env;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::ClipScoutError;

/// Longest recency window accepted, in days.
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Per-run options. Built from CLI flags; embedded in the artifact for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct RunConfig {
    #[builder(setter(into))]
    pub keyword: String,
    /// Overrides the keyword as the hint given to the relevance classifier.
    #[builder(default, setter(strip_option, into))]
    pub topic: Option<String>,
    /// Crawl handle budget.
    #[builder(default = 100)]
    pub max_handles: usize,
    /// Target delivered item count.
    #[builder(default = 60)]
    pub limit: usize,
    /// Recency window in days.
    #[builder(default = 30)]
    pub days: u32,
    /// Crawl worker-pool size.
    #[builder(default = 8)]
    pub concurrency: usize,
    #[builder(default = 3)]
    pub max_per_creator: usize,
    #[builder(default = 0.6)]
    pub ai_threshold: f64,
    /// Ask the model for handles directly, in addition to search discovery.
    #[builder(default = false)]
    pub ai_seed: bool,
    #[builder(default = 20)]
    pub ai_seed_limit: usize,
    #[builder(default = 2.0)]
    pub stop_multiplier: f64,
    /// Target number of query variants, the keyword itself included.
    #[builder(default = 8)]
    pub variant_count: usize,
    #[builder(default = 30)]
    pub posts_per_handle: u32,
    #[builder(default)]
    pub seed_handles: Vec<String>,
    #[builder(default = true)]
    pub region_filter: bool,
    #[builder(default = 20)]
    pub classify_batch_size: usize,
    #[builder(default = 4)]
    pub classify_concurrency: usize,
    #[builder(default = 10)]
    pub search_results_per_query: usize,
    #[builder(default = 7.0)]
    pub recency_half_life_days: f64,
}

impl RunConfig {
    /// Reject nonsensical options before any network call is made.
    pub fn validate(&self) -> Result<(), ClipScoutError> {
        fn positive(name: &str, value: usize) -> Result<(), ClipScoutError> {
            if value == 0 {
                return Err(ClipScoutError::Config(format!("{name} must be greater than 0")));
            }
            Ok(())
        }

        if self.keyword.trim().is_empty() {
            return Err(ClipScoutError::Config("keyword must not be empty".to_string()));
        }
        positive("limit", self.limit)?;
        positive("handles", self.max_handles)?;
        positive("concurrency", self.concurrency)?;
        positive("max-per-creator", self.max_per_creator)?;
        positive("variants", self.variant_count)?;
        positive("posts-per-handle", self.posts_per_handle as usize)?;
        positive("days", self.days as usize)?;
        if self.days > MAX_WINDOW_DAYS {
            return Err(ClipScoutError::Config(format!(
                "days must be at most {MAX_WINDOW_DAYS}, got {}",
                self.days
            )));
        }
        positive("classify batch size", self.classify_batch_size)?;
        positive("classify concurrency", self.classify_concurrency)?;
        if self.ai_seed {
            positive("ai-seed-limit", self.ai_seed_limit)?;
        }
        if !(0.0..=1.0).contains(&self.ai_threshold) {
            return Err(ClipScoutError::Config(format!(
                "ai-threshold must be within [0, 1], got {}",
                self.ai_threshold
            )));
        }
        if !self.stop_multiplier.is_finite() || self.stop_multiplier < 1.0 {
            return Err(ClipScoutError::Config(format!(
                "stop-multiplier must be a finite value >= 1.0, got {}",
                self.stop_multiplier
            )));
        }
        if !self.recency_half_life_days.is_finite() || self.recency_half_life_days <= 0.0 {
            return Err(ClipScoutError::Config(
                "recency half-life must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Oldest publish time still inside the recency window. Clamps to the
    /// earliest representable instant instead of overflowing.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Running item count at which the crawl may stop early.
    pub fn early_stop_quota(&self) -> usize {
        (self.limit as f64 * self.stop_multiplier).ceil() as usize
    }
}

/// Secrets and environment-specific values.
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub anthropic_api_key: String,
    pub serper_api_key: String,
    pub apify_api_key: String,
    pub claude_model: String,
}

impl ApiKeys {
    pub fn from_env() -> Result<Self, ClipScoutError> {
        dotenvy::dotenv().ok();

        let keys = Self {
            anthropic_api_key: required_env("ANTHROPIC_API_KEY")?,
            serper_api_key: required_env("SERPER_API_KEY")?,
            apify_api_key: required_env("APIFY_API_KEY")?,
            claude_model: env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
        };

        keys.log_redacted();
        Ok(keys)
    }

    fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview(&self.anthropic_api_key));
        tracing::info!("  SERPER_API_KEY: {}", preview(&self.serper_api_key));
        tracing::info!("  APIFY_API_KEY: {}", preview(&self.apify_api_key));
        tracing::info!("  CLAUDE_MODEL: {}", self.claude_model);
    }
}

fn required_env(key: &str) -> Result<String, ClipScoutError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ClipScoutError::Config(format!(
            "{key} environment variable is required"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::builder().keyword("nutritionist").build();
        assert!(config.validate().is_ok());
        assert_eq!(config.limit, 60);
        assert_eq!(config.max_per_creator, 3);
        assert_eq!(config.early_stop_quota(), 120);
    }

    #[test]
    fn zero_limit_and_concurrency_are_rejected() {
        let config = RunConfig::builder().keyword("x").limit(0).build();
        assert!(matches!(config.validate(), Err(ClipScoutError::Config(_))));

        let config = RunConfig::builder().keyword("x").concurrency(0).build();
        assert!(matches!(config.validate(), Err(ClipScoutError::Config(_))));
    }

    #[test]
    fn out_of_range_threshold_and_multiplier_are_rejected() {
        let config = RunConfig::builder().keyword("x").ai_threshold(1.5).build();
        assert!(config.validate().is_err());

        let config = RunConfig::builder().keyword("x").stop_multiplier(0.5).build();
        assert!(config.validate().is_err());

        let config = RunConfig::builder()
            .keyword("x")
            .stop_multiplier(f64::INFINITY)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_window_is_rejected() {
        let config = RunConfig::builder().keyword("x").days(100_000_000).build();
        assert!(matches!(config.validate(), Err(ClipScoutError::Config(_))));

        let config = RunConfig::builder().keyword("x").days(MAX_WINDOW_DAYS).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn window_start_never_overflows() {
        let now = Utc::now();
        let config = RunConfig::builder().keyword("x").days(30).build();
        assert_eq!(config.window_start(now), now - Duration::days(30));

        let config = RunConfig::builder().keyword("x").days(u32::MAX).build();
        assert_eq!(config.window_start(now), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn blank_keyword_is_rejected() {
        let config = RunConfig::builder().keyword("   ").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn fractional_quota_rounds_up() {
        let config = RunConfig::builder()
            .keyword("x")
            .limit(5)
            .stop_multiplier(1.5)
            .build();
        assert_eq!(config.early_stop_quota(), 8);
    }
}
