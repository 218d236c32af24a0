use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::JobRecord;

/// Query parameter carrying the cache-busting timestamp.
pub const CACHE_BUST_PARAM: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Unreachable,
    MalformedPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("feed unreachable: {0}")]
    Unreachable(String),
    #[error("malformed feed payload: {0}")]
    MalformedPayload(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Unreachable(_) => FetchErrorKind::Unreachable,
            FetchError::MalformedPayload(_) => FetchErrorKind::MalformedPayload,
        }
    }
}

// --- Sources ---

pub trait FeedSource {
    /// Reads the whole feed once. Returns jobs in payload order.
    fn load_feed(&self) -> Result<Vec<JobRecord>, FetchError>;
}

#[derive(Debug)]
pub struct HttpFeedSource {
    url: Url,
    client: reqwest::blocking::Client,
}

impl HttpFeedSource {
    pub fn new(feed_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(feed_url)
            .with_context(|| format!("Invalid feed URL: {}", feed_url))?;
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn cache_busted_url(&self, stamp: i64) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair(CACHE_BUST_PARAM, &stamp.to_string());
        url
    }

    pub fn load_feed_at(&self, stamp: i64) -> Result<Vec<JobRecord>, FetchError> {
        let url = self.cache_busted_url(stamp);
        debug!(%url, "fetching feed");

        let response = self
            .client
            .get(url)
            .header("Cache-Control", "no-cache")
            .send()
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!(
                "feed request failed with status {}",
                status
            )));
        }

        let body = response
            .text()
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        decode_feed(&body)
    }
}

impl FeedSource for HttpFeedSource {
    fn load_feed(&self) -> Result<Vec<JobRecord>, FetchError> {
        self.load_feed_at(Utc::now().timestamp_millis())
    }
}

/// Decodes a feed body. The body must be a JSON array of objects; an object
/// that does not make a usable record (no `id`, wrong field types) is skipped
/// and the rest of the feed is kept.
pub fn decode_feed(body: &str) -> Result<Vec<JobRecord>, FetchError> {
    let items = serde_json::from_str::<Vec<serde_json::Map<String, serde_json::Value>>>(body)
        .map_err(|e| FetchError::MalformedPayload(e.to_string()))?;

    let total = items.len();
    let jobs: Vec<JobRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            match serde_json::from_value::<JobRecord>(serde_json::Value::Object(item)) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable job record");
                    None
                }
            }
        })
        .collect();

    if jobs.len() < total {
        warn!(kept = jobs.len(), skipped = total - jobs.len(), "feed had unreadable records");
    }
    Ok(jobs)
}

// --- Session ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Loading,
    Ready,
    Failed(FetchErrorKind),
}

#[derive(Debug, PartialEq, Eq)]
pub struct RefreshTicket {
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Replaced(usize),
    Failed(FetchErrorKind),
    Stale,
}

/// Owns the raw job snapshot for one session.
///
/// A failed load never touches the snapshot. Responses are ordered by the
/// sequence number of their ticket: once a ticket has been applied, any
/// response carrying an older ticket is dropped.
#[derive(Debug)]
pub struct FeedSession {
    jobs: Vec<JobRecord>,
    status: FeedStatus,
    last_error: Option<FetchError>,
    next_seq: u64,
    last_applied: u64,
    in_flight: Option<u64>,
}

impl Default for FeedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSession {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            status: FeedStatus::Loading,
            last_error: None,
            next_seq: 0,
            last_applied: 0,
            in_flight: None,
        }
    }

    /// Session start hook: runs the initial load once.
    pub fn start(source: &dyn FeedSource) -> Self {
        let mut session = Self::new();
        session.refresh(source);
        session
    }

    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn begin_refresh(&mut self) -> Option<RefreshTicket> {
        if let Some(seq) = self.in_flight {
            debug!(seq, "refresh already in flight");
            return None;
        }
        self.next_seq += 1;
        self.in_flight = Some(self.next_seq);
        Some(RefreshTicket { seq: self.next_seq })
    }

    /// Gives up waiting on a ticket so a new refresh can be issued. A late
    /// response for it is still accepted unless a newer one got there first.
    pub fn abandon_refresh(&mut self, ticket: &RefreshTicket) {
        if self.in_flight == Some(ticket.seq) {
            self.in_flight = None;
        }
    }

    pub fn apply(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<JobRecord>, FetchError>,
    ) -> Applied {
        if self.in_flight == Some(ticket.seq) {
            self.in_flight = None;
        }

        if ticket.seq <= self.last_applied {
            warn!(
                seq = ticket.seq,
                last_applied = self.last_applied,
                "discarding superseded feed response"
            );
            return Applied::Stale;
        }
        self.last_applied = ticket.seq;

        match result {
            Ok(jobs) => {
                let count = jobs.len();
                info!(count, "feed loaded");
                self.jobs = jobs;
                self.status = FeedStatus::Ready;
                self.last_error = None;
                Applied::Replaced(count)
            }
            Err(e) => {
                warn!(error = %e, kept = self.jobs.len(), "feed load failed, keeping previous snapshot");
                let kind = e.kind();
                self.status = FeedStatus::Failed(kind);
                self.last_error = Some(e);
                Applied::Failed(kind)
            }
        }
    }

    /// Begin, load, apply. `None` when a refresh is already in flight.
    pub fn refresh(&mut self, source: &dyn FeedSource) -> Option<Applied> {
        let ticket = self.begin_refresh()?;
        let result = source.load_feed();
        Some(self.apply(ticket, result))
    }
}
