use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use apify_client::ApifyClient;
use clipscout::curator::ClaudeCurator;
use clipscout::export::{default_out_dir, export};
use clipscout::run::Curator;
use clipscout::scraper::SerperSearcher;
use clipscout_common::{ApiKeys, RunConfig};

/// Curate a feed of recent, relevant TikTok videos for a keyword.
#[derive(Debug, Parser)]
#[command(name = "clipscout", version)]
struct Cli {
    /// Seed search term, e.g. "nutritionist".
    keyword: String,

    /// Maximum number of handles to crawl.
    #[arg(long = "handles", default_value_t = 100)]
    max_handles: usize,

    /// Number of videos to deliver.
    #[arg(long, default_value_t = 60)]
    limit: usize,

    /// Only keep videos posted within this many days.
    #[arg(long, default_value_t = 30)]
    days: u32,

    /// Concurrent handle fetches.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    #[arg(long, default_value_t = 3)]
    max_per_creator: usize,

    /// Minimum AI relevance for a video to be admitted.
    #[arg(long, default_value_t = 0.6)]
    ai_threshold: f64,

    /// Also ask the model for handles directly.
    #[arg(long)]
    ai_seed: bool,

    #[arg(long, default_value_t = 20)]
    ai_seed_limit: usize,

    /// Stop crawling once limit × multiplier candidates are in hand.
    #[arg(long, default_value_t = 2.0)]
    stop_multiplier: f64,

    /// What relevance is judged against, if different from the keyword.
    #[arg(long)]
    topic: Option<String>,

    /// Number of query variants, the keyword included.
    #[arg(long = "variants", default_value_t = 8)]
    variant_count: usize,

    #[arg(long, default_value_t = 30)]
    posts_per_handle: u32,

    /// Handle to crawl regardless of discovery. Repeatable.
    #[arg(long = "seed-handle")]
    seed_handles: Vec<String>,

    /// Keep creators the region heuristic places outside the US.
    #[arg(long)]
    no_region_filter: bool,

    /// Artifact directory. Defaults to $DATA_DIR/clipscout-runs.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let config = RunConfig::builder()
            .keyword(self.keyword.clone())
            .max_handles(self.max_handles)
            .limit(self.limit)
            .days(self.days)
            .concurrency(self.concurrency)
            .max_per_creator(self.max_per_creator)
            .ai_threshold(self.ai_threshold)
            .ai_seed(self.ai_seed)
            .ai_seed_limit(self.ai_seed_limit)
            .stop_multiplier(self.stop_multiplier)
            .variant_count(self.variant_count)
            .posts_per_handle(self.posts_per_handle)
            .seed_handles(self.seed_handles.clone())
            .region_filter(!self.no_region_filter)
            .build();
        RunConfig {
            topic: self.topic.clone(),
            ..config
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("clipscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = cli.run_config();
    config.validate()?;

    info!(keyword = config.keyword.as_str(), "ClipScout starting");

    let keys = ApiKeys::from_env()?;
    let searcher = SerperSearcher::new(&keys.serper_api_key)?;
    let source = ApifyClient::new(keys.apify_api_key.clone())
        .context("Failed to build Apify client")?;
    let model = ClaudeCurator::new(
        Claude::new(keys.anthropic_api_key.clone(), keys.claude_model.clone())
            .context("Failed to build Claude client")?,
    );

    let artifact = Curator::new(&searcher, &source, &model).run(&config).await?;

    let out_dir = cli.out_dir.clone().unwrap_or_else(default_out_dir);
    let paths = export(&artifact, &out_dir)?;

    println!("{}", artifact.crawl);
    if !artifact.warnings.is_empty() {
        println!("Warnings:");
        for w in &artifact.warnings {
            println!("  [{}] {}", w.stage, w.message);
        }
    }
    println!("\nJSON: {}", paths.json.display());
    println!("CSV:  {}", paths.csv.display());

    Ok(())
}
