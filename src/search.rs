use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::models::RoleQuery;

pub const SEARCH_BASE_URL: &str = "https://www.linkedin.com/jobs/search/";
pub const POSTING_BASE_URL: &str = "https://www.linkedin.com/jobs/view/";
pub const DEFAULT_RECENCY: &str = "r86400";

/// The site accepts recency windows between one hour and one day.
pub const MIN_RECENCY_SECS: u64 = 3600;
pub const MAX_RECENCY_SECS: u64 = 86400;

static POSTING_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/jobs/view/(?:[^/?#]*-)?(\d+)").expect("valid regex"));
static CURRENT_JOB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]currentJobId=(\d+)").expect("valid regex"));

/// A "posted within" filter in seconds, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow(u64);

impl RecencyWindow {
    /// Parse `r<seconds>` (a bare number also works). Out-of-range windows are
    /// clamped; anything unparseable becomes the one-day default.
    pub fn parse(raw: &str) -> Self {
        let digits = raw.trim().trim_start_matches(['r', 'R']);
        match digits.parse::<u64>() {
            Ok(secs) => Self(secs.clamp(MIN_RECENCY_SECS, MAX_RECENCY_SECS)),
            Err(_) => Self(MAX_RECENCY_SECS),
        }
    }

    pub fn seconds(self) -> u64 {
        self.0
    }

    pub fn as_param(self) -> String {
        format!("r{}", self.0)
    }
}

impl Default for RecencyWindow {
    fn default() -> Self {
        Self(MAX_RECENCY_SECS)
    }
}

/// Site code for an experience level name. Unknown names map to `None`.
pub fn experience_code(level: &str) -> Option<&'static str> {
    match level.trim().to_lowercase().as_str() {
        "internship" => Some("1"),
        "entry level" | "entry" => Some("2"),
        "associate" => Some("3"),
        "mid-senior level" | "mid-senior" => Some("4"),
        "director" => Some("5"),
        "executive" => Some("6"),
        _ => None,
    }
}

/// First results-page URL for a role.
pub fn build_search_url(role: &RoleQuery) -> String {
    let mut params: Vec<(&str, String)> = vec![("keywords", role.title.trim().to_string())];

    if !role.location.trim().is_empty() {
        params.push(("location", role.location.trim().to_string()));
    }
    if role.remote {
        params.push(("f_WT", "2".to_string()));
    }

    let mut codes: Vec<&str> = role
        .experience_levels
        .iter()
        .filter_map(|level| experience_code(level))
        .collect();
    codes.sort_unstable();
    codes.dedup();
    if !codes.is_empty() {
        params.push(("f_E", codes.join(",")));
    }

    let window = role
        .date_posted_window
        .as_deref()
        .map(RecencyWindow::parse)
        .unwrap_or_default();
    params.push(("f_TPR", window.as_param()));
    params.push(("sortBy", "DD".to_string()));

    match Url::parse_with_params(SEARCH_BASE_URL, &params) {
        Ok(url) => url.to_string(),
        Err(_) => SEARCH_BASE_URL.to_string(),
    }
}

/// Numeric posting id from a posting or results URL.
pub fn posting_id_from_url(url: &str) -> Option<String> {
    POSTING_ID_RE
        .captures(url)
        .or_else(|| CURRENT_JOB_RE.captures(url))
        .map(|caps| caps[1].to_string())
}

pub fn posting_url(posting_id: &str) -> String {
    format!("{}{}/", POSTING_BASE_URL, posting_id)
}

/// Strip tracking query parameters and fragments; relative links are
/// resolved against the site root.
pub fn clean_tracking_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    let mut parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("https://www.linkedin.com").ok()?.join(url).ok()?
        }
        Err(_) => return None,
    };
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}
