//! Extraction and filtering: raw records → validated [`ContentItem`]s.
//!
//! Rejects malformed and stale records, applies the US region heuristic and
//! records keyword-hit evidence. Evidence never affects admission.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::info;

use clipscout_common::{
    normalize_handle, ContentItem, QueryVariant, RawPost, RegionHint, RunConfig, RunWarning,
    Stage, WarningCode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionVerdict {
    Likely,
    /// No evidence either way. Admitted.
    Unknown,
    Unlikely,
}

impl From<RegionVerdict> for RegionHint {
    fn from(v: RegionVerdict) -> Self {
        match v {
            RegionVerdict::Likely => RegionHint::Us,
            RegionVerdict::Unknown => RegionHint::Unknown,
            RegionVerdict::Unlikely => RegionHint::NonUs,
        }
    }
}

const US_FLAG: &str = "\u{1F1FA}\u{1F1F8}";

static RE_US_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:usa|united states|",
        r"alabama|alaska|arizona|arkansas|california|colorado|connecticut|delaware|florida|",
        r"georgia|hawaii|idaho|illinois|indiana|iowa|kansas|kentucky|louisiana|maine|maryland|",
        r"massachusetts|michigan|minnesota|mississippi|missouri|montana|nebraska|nevada|",
        r"new hampshire|new jersey|new mexico|new york|north carolina|north dakota|ohio|",
        r"oklahoma|oregon|pennsylvania|rhode island|south carolina|south dakota|tennessee|",
        r"texas|utah|vermont|virginia|washington|west virginia|wisconsin|wyoming|",
        r"nyc|los angeles|chicago|houston|phoenix|philadelphia|san antonio|san diego|dallas|",
        r"austin|seattle|miami|atlanta|boston|denver|nashville|portland|las vegas|",
        r"san francisco|brooklyn|detroit|orlando|minneapolis)\b"
    ))
    .expect("valid regex")
});

// ", TX" style suffixes. Case-sensitive so "in, or" does not match.
static RE_US_STATE_ABBR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r",\s*(?:AL|AK|AZ|AR|CA|CO|CT|DE|FL|GA|HI|ID|IL|IN|IA|KS|KY|LA|ME|MD|MA|MI|MN|MS|",
        r"MO|MT|NE|NV|NH|NJ|NM|NY|NC|ND|OH|OK|OR|PA|RI|SC|SD|TN|TX|UT|VT|VA|WA|WV|WI|WY|DC)\b"
    ))
    .expect("valid regex")
});

static RE_NON_US_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:canada|canadian|uk|united kingdom|england|scotland|wales|ireland|australia|",
        r"aussie|new zealand|india|pakistan|philippines|nigeria|kenya|ghana|south africa|",
        r"germany|france|spain|italy|mexico|brazil|singapore|malaysia|indonesia|netherlands|",
        r"uae|dubai|",
        r"london|manchester|toronto|vancouver|montreal|calgary|sydney|melbourne|brisbane|",
        r"auckland|dublin|lagos|mumbai|delhi|bangalore|manila|paris|berlin|madrid)\b"
    ))
    .expect("valid regex")
});

static RE_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{1F1E6}-\x{1F1FF}]{2}").expect("valid regex"));

fn text_signals(text: &str) -> (usize, usize) {
    let us_spans: Vec<(usize, usize)> = RE_US_TERMS
        .find_iter(text)
        .chain(RE_US_STATE_ABBR.find_iter(text))
        .map(|m| (m.start(), m.end()))
        .collect();
    let mut us = us_spans.len();

    // "New Mexico" and "Paris, TX" are US places that contain a foreign name.
    let mut non_us = RE_NON_US_TERMS
        .find_iter(text)
        .filter(|m| {
            !us_spans
                .iter()
                .any(|&(start, end)| (start <= m.start() && m.end() <= end) || start == m.end())
        })
        .count();

    for flag in RE_FLAG.find_iter(text) {
        if flag.as_str() == US_FLAG {
            us += 1;
        } else {
            non_us += 1;
        }
    }
    (us, non_us)
}

/// Judge whether a creator is US-based. A platform region code is decisive;
/// otherwise bio and caption signals are weighed against each other.
pub fn is_likely_us(
    region_code: Option<&str>,
    bio: Option<&str>,
    caption: Option<&str>,
) -> RegionVerdict {
    if let Some(code) = region_code.map(str::trim).filter(|c| !c.is_empty()) {
        return if code.eq_ignore_ascii_case("US") {
            RegionVerdict::Likely
        } else {
            RegionVerdict::Unlikely
        };
    }

    let (mut us, mut non_us) = (0, 0);
    for text in [bio, caption].into_iter().flatten() {
        let (u, n) = text_signals(text);
        us += u;
        non_us += n;
    }

    match us.cmp(&non_us) {
        std::cmp::Ordering::Greater => RegionVerdict::Likely,
        std::cmp::Ordering::Less => RegionVerdict::Unlikely,
        std::cmp::Ordering::Equal => RegionVerdict::Unknown,
    }
}

/// Variants found in the caption or bio, plus the item's hashtags that
/// spell out a variant.
pub fn keyword_hits(
    variants: &[QueryVariant],
    caption: &str,
    bio: Option<&str>,
    hashtags: &[String],
) -> Vec<String> {
    let haystack = format!("{} {}", caption, bio.unwrap_or("")).to_lowercase();
    let compact: HashSet<String> = variants
        .iter()
        .map(|v| v.text.to_lowercase().replace(' ', ""))
        .collect();

    let mut hits: Vec<String> = variants
        .iter()
        .filter(|v| haystack.contains(&v.text.to_lowercase()))
        .map(|v| v.text.clone())
        .collect();
    hits.extend(
        hashtags
            .iter()
            .filter(|tag| compact.contains(&tag.to_lowercase()))
            .map(|tag| format!("#{tag}")),
    );
    hits
}

#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub items: Vec<ContentItem>,
    pub rejected_stale: u32,
    pub rejected_region: u32,
    pub rejected_malformed: u32,
    pub warnings: Vec<RunWarning>,
}

fn extract(post: RawPost) -> Option<(ContentItem, Option<String>)> {
    let id = post.id.filter(|id| !id.trim().is_empty())?;
    let handle = normalize_handle(post.handle.as_deref()?)?;
    let published_at = post.published_at?;
    let url = post
        .url
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("https://www.tiktok.com/@{handle}/video/{id}"));
    let region_code = post.author_region.or(post.location_created);

    let item = ContentItem {
        id,
        handle,
        url,
        published_at,
        metrics: post.metrics,
        caption: post.caption.unwrap_or_default(),
        hashtags: post.hashtags,
        author_display_name: post.author_display_name,
        author_bio: post.author_bio,
        author_followers: post.author_followers,
        author_verified: post.author_verified,
        duration_secs: post.duration_secs,
        music: post.music,
        region_hint: RegionHint::Unknown,
        keyword_hits: Vec::new(),
    };
    Some((item, region_code))
}

/// Validate, window, region-filter and deduplicate crawled records.
pub fn extract_and_filter(
    posts: Vec<RawPost>,
    variants: &[QueryVariant],
    config: &RunConfig,
    now: DateTime<Utc>,
) -> FilterOutcome {
    let mut out = FilterOutcome::default();
    let cutoff = config.window_start(now);
    let mut seen = HashSet::new();

    for post in posts {
        let Some((mut item, region_code)) = extract(post) else {
            out.rejected_malformed += 1;
            continue;
        };
        if item.published_at < cutoff {
            out.rejected_stale += 1;
            continue;
        }
        if !seen.insert(item.id.clone()) {
            continue;
        }

        let verdict = is_likely_us(
            region_code.as_deref(),
            item.author_bio.as_deref(),
            Some(&item.caption),
        );
        item.region_hint = verdict.into();
        if config.region_filter && verdict == RegionVerdict::Unlikely {
            out.rejected_region += 1;
            continue;
        }

        item.keyword_hits = keyword_hits(
            variants,
            &item.caption,
            item.author_bio.as_deref(),
            &item.hashtags,
        );
        out.items.push(item);
    }

    if out.rejected_malformed > 0 {
        out.warnings.push(RunWarning::new(
            Stage::Filter,
            WarningCode::MalformedRecords,
            format!(
                "{} record(s) missing an id, handle or timestamp were dropped",
                out.rejected_malformed
            ),
        ));
    }

    info!(
        admitted = out.items.len(),
        stale = out.rejected_stale,
        region = out.rejected_region,
        malformed = out.rejected_malformed,
        "Filter complete"
    );
    out
}
