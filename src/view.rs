use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{JobRecord, ScoreTier};
use crate::saved::SavedJobSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Feed,
    Saved,
}

impl Tab {
    pub fn toggle(self) -> Self {
        match self {
            Tab::Feed => Tab::Saved,
            Tab::Saved => Tab::Feed,
        }
    }
}

/// Transient UI state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub tab: Tab,
    pub search: String,
}

impl ViewState {
    pub fn new(tab: Tab, search: impl Into<String>) -> Self {
        Self {
            tab,
            search: search.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayJob<'a> {
    pub job: &'a JobRecord,
    pub time_label: String,
    pub source_label: String,
    pub is_saved: bool,
    pub show_salary: bool,
    pub tier: ScoreTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSummary {
    pub total: usize,
    pub saved: usize,
    pub shown: usize,
}

/// Ranks, filters and decorates the raw feed for display.
///
/// Steps run in a fixed order: stable sort by descending match score, tab
/// filter, search filter, then decoration. Output depends only on the
/// arguments.
pub fn compute_view<'a>(
    raw_jobs: &'a [JobRecord],
    view: &ViewState,
    saved: &SavedJobSet,
    now: DateTime<Utc>,
) -> Vec<DisplayJob<'a>> {
    let mut ranked: Vec<&JobRecord> = raw_jobs.iter().collect();
    ranked.sort_by(|a, b| b.analysis.match_score.cmp(&a.analysis.match_score));

    let needle = view.search.trim().to_lowercase();

    ranked
        .into_iter()
        .filter(|job| match view.tab {
            Tab::Feed => true,
            Tab::Saved => saved.contains(&job.id),
        })
        .filter(|job| matches_search(job, &needle))
        .map(|job| DisplayJob {
            job,
            time_label: time_label(job.found_at.as_deref(), now),
            source_label: source_label(&job.site),
            is_saved: saved.contains(&job.id),
            show_salary: job.analysis.has_salary(),
            tier: job.analysis.tier(),
        })
        .collect()
}

pub fn summarize(raw_jobs: &[JobRecord], saved: &SavedJobSet, shown: &[DisplayJob]) -> ViewSummary {
    ViewSummary {
        total: raw_jobs.len(),
        saved: saved.len(),
        shown: shown.len(),
    }
}

/// `needle` must already be trimmed and lowercased.
fn matches_search(job: &JobRecord, needle: &str) -> bool {
    needle.is_empty()
        || job.title.to_lowercase().contains(needle)
        || job.company.to_lowercase().contains(needle)
}

// --- Time labels ---

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]`, ISO without offset, or a bare
/// date. Values without an offset are read as UTC.
pub fn parse_found_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn time_label(found_at: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(found) = found_at.and_then(parse_found_at) else {
        return "Recently".to_string();
    };

    let minutes = (now - found).num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{} mins ago", minutes)
    } else if minutes < 24 * 60 {
        format!("{} hours ago", minutes / 60)
    } else {
        "Yesterday".to_string()
    }
}

// --- Source labels ---

const KNOWN_SOURCES: [(&str, &str); 3] = [
    ("linkedin", "LinkedIn"),
    ("indeed", "Indeed"),
    ("zip", "ZipRecruiter"),
];

pub fn source_label(site: &str) -> String {
    let lower = site.to_lowercase();
    KNOWN_SOURCES
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| site.to_string())
}
