//! Artifact export: pretty JSON plus a CSV rendering for spreadsheets.
//!
//! Both files are opened with create-new semantics; an existing artifact is
//! never overwritten.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use clipscout_common::{ClipScoutError, FeedEntry, RunArtifact};

const CAPTION_PREVIEW_CHARS: usize = 100;

/// `$DATA_DIR`, defaulting to `data`.
pub fn data_dir() -> PathBuf {
    std::env::var("DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

pub fn default_out_dir() -> PathBuf {
    data_dir().join("clipscout-runs")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// 950 → "950", 12_300 → "12.3K", 1_000_000 → "1M".
pub fn format_count(n: u64) -> String {
    fn scaled(value: f64, suffix: &str) -> String {
        let s = format!("{value:.1}");
        format!("{}{suffix}", s.strip_suffix(".0").unwrap_or(&s))
    }
    match n {
        0..=999 => n.to_string(),
        1_000..=999_949 => scaled(n as f64 / 1_000.0, "K"),
        _ => scaled(n as f64 / 1_000_000.0, "M"),
    }
}

/// Seconds as `m:ss`.
pub fn format_duration(secs: Option<f64>) -> String {
    match secs.filter(|s| s.is_finite() && *s >= 0.0) {
        Some(s) => {
            let total = s.round() as u64;
            format!("{}:{:02}", total / 60, total % 60)
        }
        None => String::new(),
    }
}

/// First 100 characters of the caption on one line.
pub fn caption_preview(caption: &str) -> String {
    let flat = caption.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= CAPTION_PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(CAPTION_PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    rank: usize,
    url: &'a str,
    creator: String,
    followers: String,
    verified: &'static str,
    views: String,
    likes: String,
    comments: String,
    shares: String,
    duration: String,
    caption: String,
    posted: String,
    music: &'a str,
    region: String,
    relevance: String,
    rationale: &'a str,
    keyword_hits: String,
    numeric_score: String,
    composite_score: String,
}

impl<'a> CsvRow<'a> {
    fn new(rank: usize, entry: &'a FeedEntry) -> Self {
        let item = &entry.item;
        Self {
            rank,
            url: &item.url,
            creator: format!("@{}", item.handle),
            followers: item.author_followers.map(format_count).unwrap_or_default(),
            verified: if item.author_verified { "yes" } else { "no" },
            views: format_count(item.metrics.views),
            likes: format_count(item.metrics.likes),
            comments: format_count(item.metrics.comments),
            shares: format_count(item.metrics.shares),
            duration: format_duration(item.duration_secs),
            caption: caption_preview(&item.caption),
            posted: item.published_at.format("%Y-%m-%d %H:%M").to_string(),
            music: item.music.as_deref().unwrap_or(""),
            region: item.region_hint.to_string(),
            relevance: format!("{:.2}", entry.classification.relevance),
            rationale: &entry.classification.rationale,
            keyword_hits: item.keyword_hits.join("; "),
            numeric_score: format!("{:.4}", entry.numeric_score),
            composite_score: format!("{:.4}", entry.composite_score),
        }
    }
}

fn slug(keyword: &str) -> String {
    let s: String = keyword
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let s = s
        .split('-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if s.is_empty() {
        "run".to_string()
    } else {
        s
    }
}

/// `<keyword-slug>-<YYYYmmdd-HHMMSS>-<run id prefix>`
pub fn artifact_stem(artifact: &RunArtifact) -> String {
    format!(
        "{}-{}-{}",
        slug(&artifact.keyword.text),
        artifact.started_at.format("%Y%m%d-%H%M%S"),
        &artifact.run_id.simple().to_string()[..8]
    )
}

fn create_new(path: &Path) -> Result<File, ClipScoutError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ClipScoutError::Export(format!("cannot create {}: {e}", path.display())))
}

pub fn write_json(artifact: &RunArtifact, path: &Path) -> Result<(), ClipScoutError> {
    let mut writer = BufWriter::new(create_new(path)?);
    serde_json::to_writer_pretty(&mut writer, artifact)
        .map_err(|e| ClipScoutError::Export(format!("JSON serialization failed: {e}")))?;
    writer
        .flush()
        .map_err(|e| ClipScoutError::Export(format!("cannot write {}: {e}", path.display())))
}

pub fn write_csv(entries: &[FeedEntry], path: &Path) -> Result<(), ClipScoutError> {
    let mut writer = csv::Writer::from_writer(create_new(path)?);
    for (idx, entry) in entries.iter().enumerate() {
        writer
            .serialize(CsvRow::new(idx + 1, entry))
            .map_err(|e| ClipScoutError::Export(format!("CSV row {}: {e}", idx + 1)))?;
    }
    if entries.is_empty() {
        // serde-driven headers are only emitted with the first row
        writer
            .write_record(CSV_HEADERS)
            .map_err(|e| ClipScoutError::Export(format!("CSV header: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| ClipScoutError::Export(format!("cannot write {}: {e}", path.display())))
}

const CSV_HEADERS: [&str; 19] = [
    "rank",
    "url",
    "creator",
    "followers",
    "verified",
    "views",
    "likes",
    "comments",
    "shares",
    "duration",
    "caption",
    "posted",
    "music",
    "region",
    "relevance",
    "rationale",
    "keyword_hits",
    "numeric_score",
    "composite_score",
];

/// Write the artifact's JSON and CSV files into `out_dir`.
pub fn export(artifact: &RunArtifact, out_dir: &Path) -> Result<ExportPaths, ClipScoutError> {
    fs::create_dir_all(out_dir)
        .map_err(|e| ClipScoutError::Export(format!("cannot create {}: {e}", out_dir.display())))?;

    let stem = artifact_stem(artifact);
    let paths = ExportPaths {
        json: out_dir.join(format!("{stem}.json")),
        csv: out_dir.join(format!("{stem}.csv")),
    };

    write_json(artifact, &paths.json)?;
    write_csv(&artifact.entries, &paths.csv)?;

    info!(
        json = %paths.json.display(),
        csv = %paths.csv.display(),
        entries = artifact.entries.len(),
        "Artifact exported"
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_use_k_and_m_suffixes() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1K");
        assert_eq!(format_count(12_345), "12.3K");
        assert_eq!(format_count(1_500_000), "1.5M");
        assert_eq!(format_count(2_000_000), "2M");
        assert_eq!(format_count(999_960), "1M");
    }

    #[test]
    fn durations_render_as_minutes_and_seconds() {
        assert_eq!(format_duration(Some(61.4)), "1:01");
        assert_eq!(format_duration(Some(9.0)), "0:09");
        assert_eq!(format_duration(None), "");
        assert_eq!(format_duration(Some(f64::NAN)), "");
    }

    #[test]
    fn caption_preview_flattens_and_truncates() {
        assert_eq!(caption_preview("line one\nline two"), "line one line two");
        let long = "word ".repeat(40);
        let preview = caption_preview(&long);
        assert!(preview.ends_with("..."));
        assert!(preview.chars().count() <= CAPTION_PREVIEW_CHARS + 3);
    }

    #[test]
    fn slug_is_filesystem_safe() {
        assert_eq!(slug("Registered Dietitian!"), "registered-dietitian");
        assert_eq!(slug("  ##  "), "run");
    }
}
