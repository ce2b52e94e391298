use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel for optional detail fields the page did not show.
pub const UNKNOWN: &str = "Unknown";

fn default_true() -> bool {
    true
}

/// One configured search, read from the roles file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleQuery {
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub experience_levels: Vec<String>,
    #[serde(default)]
    pub remote: bool,
    #[serde(default, rename = "date_posted")]
    pub date_posted_window: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RoleQuery {
    pub fn new(title: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            location: location.into(),
            experience_levels: Vec::new(),
            remote: false,
            date_posted_window: None,
            enabled: true,
        }
    }
}

/// A listing card as seen on a results page.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingSummary {
    pub posting_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub source_url: String,
    pub already_seen: bool,
    /// Which marker flagged the card as seen, for diagnostics
    pub seen_indicator: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostingDetail {
    pub posting_id: String,
    pub source_url: String,
    pub title: Option<String>, // as shown in the detail pane
    pub company: Option<String>,
    pub description: String,
    pub seniority: String,
    pub employment_type: String,
    pub job_function: String,
    pub industries: String,
    pub posted_time: String,
    pub applicant_count: Option<u32>,
    pub remote_eligible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDecision {
    pub gate_name: &'static str,
    pub accepted: bool,
    pub reason: String,
}

impl FilterDecision {
    pub fn accept(gate_name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            gate_name,
            accepted: true,
            reason: reason.into(),
        }
    }

    pub fn reject(gate_name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            gate_name,
            accepted: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    pub reason: String,
    pub model_used: Option<String>,
    pub reranked: bool,
    pub first_score: f64,
    pub reason_first: String,
    pub reason_rerank: Option<String>,
    pub model_used_rerank: Option<String>,
    pub inferred_title: Option<String>,
    pub inferred_company: Option<String>,
}

/// An accepted posting as persisted, keyed by `posting_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredJob {
    pub posting_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub job_url: String,
    pub source: String,
    pub applicants: Option<u32>,
    pub posted_date: String,
    pub scraped_date: String,
    pub match_score: f64,
    pub match_reason: String,
    pub model_used: Option<String>,
    pub reranked: bool,
    pub first_score: f64,
    pub reason_first: String,
    pub reason_rerank: Option<String>,
    pub model_used_rerank: Option<String>,
    pub description: String,
    pub viewed: bool,
    pub saved: bool,
    pub applied: bool,
    pub emailed: bool,
}

impl StoredJob {
    /// Merge the transient pipeline records into a storable row with all
    /// bookkeeping flags cleared.
    pub fn from_parts(
        summary: &PostingSummary,
        detail: &PostingDetail,
        score: &ScoreResult,
        title: &str,
        company: &str,
        source: &str,
    ) -> Self {
        Self {
            posting_id: summary.posting_id.clone(),
            title: title.to_string(),
            company: company.to_string(),
            location: summary.location.clone(),
            job_url: detail.source_url.clone(),
            source: source.to_string(),
            applicants: detail.applicant_count,
            posted_date: detail.posted_time.clone(),
            scraped_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            match_score: score.score,
            match_reason: score.reason.clone(),
            model_used: score.model_used.clone(),
            reranked: score.reranked,
            first_score: score.first_score,
            reason_first: score.reason_first.clone(),
            reason_rerank: score.reason_rerank.clone(),
            model_used_rerank: score.model_used_rerank.clone(),
            description: detail.description.clone(),
            viewed: false,
            saved: false,
            applied: false,
            emailed: false,
        }
    }
}

/// Bookkeeping flags that only explicit updates change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFlag {
    Viewed,
    Saved,
    Applied,
    Emailed,
}

impl JobFlag {
    pub fn column(self) -> &'static str {
        match self {
            JobFlag::Viewed => "viewed",
            JobFlag::Saved => "saved",
            JobFlag::Applied => "applied",
            JobFlag::Emailed => "emailed",
        }
    }
}

impl FromStr for JobFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "viewed" => Ok(JobFlag::Viewed),
            "saved" => Ok(JobFlag::Saved),
            "applied" => Ok(JobFlag::Applied),
            "emailed" => Ok(JobFlag::Emailed),
            other => Err(format!(
                "unknown flag '{}' (expected viewed, saved, applied or emailed)",
                other
            )),
        }
    }
}

/// Append-only outreach log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub timestamp: String,
    pub name: String,
    pub title: String,
    pub profile_url: String,
    pub company: String,
    pub country: String,
    pub role_searched: String,
    pub role_match: bool,
    pub message_available: bool,
    pub connected: bool,
    pub status: String,
}

/// A person surfaced for outreach alongside an accepted posting.
#[derive(Debug, Clone, PartialEq)]
pub struct OutreachProfile {
    pub name: String,
    pub title: String,
    pub profile_url: String,
    pub company: String,
    pub country: String,
    pub role_match: bool,
    pub message_available: bool,
}

impl OutreachProfile {
    pub fn to_record(&self, role_searched: &str, status: &str) -> ConnectionRecord {
        ConnectionRecord {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            name: self.name.clone(),
            title: self.title.clone(),
            profile_url: self.profile_url.clone(),
            company: self.company.clone(),
            country: self.country.clone(),
            role_searched: role_searched.to_string(),
            role_match: self.role_match,
            message_available: self.message_available,
            connected: false,
            status: status.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandidateProfile {
    pub resume: String,
    pub preferences: String,
}

/// Why a role's walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    NoCards,
    NoNextPage,
    AdvanceUnconfirmed,
    RejectionStreak,
    NoMatchPages,
    PageCap,
    LoadFailed,
    AllDuplicates,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::NoCards => "no cards on page",
            StopReason::NoNextPage => "no next-page control",
            StopReason::AdvanceUnconfirmed => "page advance not confirmed",
            StopReason::RejectionStreak => "consecutive rejection limit reached",
            StopReason::NoMatchPages => "too many pages without a match",
            StopReason::PageCap => "page cap reached",
            StopReason::LoadFailed => "results page failed to load",
            StopReason::AllDuplicates => "page repeated earlier cards",
        };
        f.write_str(s)
    }
}

/// Counters for one role's pipeline pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleOutcome {
    pub pages: u32,
    pub cards: u32,
    pub skipped_seen: u32,
    pub extract_failures: u32,
    pub rejected: u32,
    pub below_threshold: u32,
    pub inserted: u32,
    pub updated: u32,
    pub notified: u32,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Ok,
    Error,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStatus::Ok => f.pad("ok"),
            CycleStatus::Error => f.pad("error"),
        }
    }
}

/// One role's result within one scheduler cycle. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub role: String,
    pub status: CycleStatus,
    pub outcome: Option<RoleOutcome>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CycleResult {
    pub fn ok(role: &str, outcome: RoleOutcome) -> Self {
        Self {
            role: role.to_string(),
            status: CycleStatus::Ok,
            outcome: Some(outcome),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(role: &str, error: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            status: CycleStatus::Error,
            outcome: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_query_defaults() {
        let role: RoleQuery = serde_json::from_str(r#"{"title": "Data Engineer"}"#).unwrap();
        assert!(role.enabled);
        assert!(!role.remote);
        assert!(role.experience_levels.is_empty());
        assert_eq!(role.date_posted_window, None);
    }

    #[test]
    fn test_role_query_full() {
        let role: RoleQuery = serde_json::from_str(
            r#"{"title": "ML Engineer", "location": "Boston", "experience_levels": ["Entry level"],
                "remote": true, "date_posted": "r3600", "enabled": false}"#,
        )
        .unwrap();
        assert_eq!(role.location, "Boston");
        assert_eq!(role.date_posted_window.as_deref(), Some("r3600"));
        assert!(role.remote);
        assert!(!role.enabled);
    }

    #[test]
    fn test_job_flag_parse() {
        assert_eq!("Applied".parse::<JobFlag>().unwrap(), JobFlag::Applied);
        assert_eq!(" saved ".parse::<JobFlag>().unwrap(), JobFlag::Saved);
        assert!("starred".parse::<JobFlag>().is_err());
    }

    #[test]
    fn test_cycle_result_constructors() {
        let ok = CycleResult::ok("A", RoleOutcome::default());
        assert_eq!(ok.status, CycleStatus::Ok);
        assert!(ok.error.is_none());

        let err = CycleResult::error("B", "boom");
        assert_eq!(err.status, CycleStatus::Error);
        assert_eq!(err.error.as_deref(), Some("boom"));
        assert_eq!(err.status.to_string(), "error");
    }
}
