use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::ProviderKind;
use crate::models::{CandidateProfile, RoleQuery};
use crate::search::DEFAULT_RECENCY;

/// Runtime settings, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm_provider: ProviderKind,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub base_model: String,
    pub rerank_model: String,
    pub hr_model: String,
    pub sponsorship_model: String,
    pub match_threshold: f64,
    pub rerank_trigger: f64,

    pub scrape_interval: Duration,
    pub request_delay_min: f64,
    pub request_delay_max: f64,
    pub max_applicants: u32, // 0 disables the cap
    pub skip_seen: bool,
    pub rejection_streak_limit: u32,
    pub no_match_pages_limit: u32,
    pub max_pages: u32,

    pub requires_sponsorship: bool,
    pub reject_hr_companies: bool,
    pub reject_unpaid: bool,
    pub reject_volunteer: bool,
    pub max_required_experience_years: u32, // 0 disables the check
    pub allow_phd_required: bool,

    pub networking_enabled: bool,
    pub connect_pages_limit: u32,
    pub max_connections_per_job: usize,

    pub webdriver_url: String,
    pub headless: bool,

    pub data_dir: PathBuf,
    pub resume_path: PathBuf,
    pub preferences_path: PathBuf,
    pub roles_path: PathBuf,
    pub blocklist_path: PathBuf,
    pub selectors_path: PathBuf,
    pub db_path: PathBuf,
    pub prompt_dir: PathBuf,
    pub log_level: String,
}

impl Settings {
    /// Load `.env` (if any) and read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = match get("JOBWATCH_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };
        let path_or = |key: &str, file: &str| {
            get(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(file))
        };

        let llm_provider = match get("LLM_PROVIDER") {
            Some(p) => p.parse::<ProviderKind>().map_err(|e| anyhow!(e))?,
            None => ProviderKind::OpenAI,
        };
        let base_model = get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let rerank_model = get("OPENAI_MODEL_RERANK").unwrap_or_else(|| "gpt-4o".to_string());

        Ok(Self {
            llm_provider,
            openai_api_key: get("OPENAI_API_KEY"),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            hr_model: get("HR_CHECK_MODEL").unwrap_or_else(|| base_model.clone()),
            sponsorship_model: get("SPONSORSHIP_MODEL").unwrap_or_else(|| "gpt-5-nano".to_string()),
            base_model,
            rerank_model,
            match_threshold: parse_or(&get, "JOB_MATCH_THRESHOLD", 8.0)?,
            rerank_trigger: parse_or(&get, "JOB_MATCH_RERANK_TRIGGER", 8.0)?,

            scrape_interval: minutes(parse_or(&get, "SCRAPE_INTERVAL_MINUTES", 30)?),
            request_delay_min: parse_or(&get, "REQUEST_DELAY_MIN", 2.0)?,
            request_delay_max: parse_or(&get, "REQUEST_DELAY_MAX", 5.0)?,
            max_applicants: parse_or(&get, "MAX_APPLICANTS", 100)?,
            skip_seen: flag_or(&get, "SKIP_VIEWED_JOBS", true)?,
            rejection_streak_limit: parse_or(&get, "REJECTION_STREAK_LIMIT", 25)?,
            no_match_pages_limit: parse_or(&get, "NO_MATCH_PAGES_THRESHOLD", 8)?,
            max_pages: parse_or(&get, "MAX_PAGES_PER_ROLE", 40)?,

            requires_sponsorship: flag_or(&get, "REQUIRES_SPONSORSHIP", true)?,
            reject_hr_companies: flag_or(&get, "REJECT_HR_COMPANIES", true)?,
            reject_unpaid: flag_or(&get, "REJECT_UNPAID_ROLES", true)?,
            reject_volunteer: flag_or(&get, "REJECT_VOLUNTEER_ROLES", true)?,
            max_required_experience_years: parse_or(&get, "MAX_REQUIRED_EXPERIENCE_YEARS", 0)?,
            allow_phd_required: flag_or(&get, "ALLOW_PHD_REQUIRED", true)?,

            networking_enabled: flag_or(&get, "NETWORKING_ENABLED", false)?,
            connect_pages_limit: parse_or(&get, "CONNECT_PAGES_THRESHOLD", 3)?,
            max_connections_per_job: parse_or(&get, "MAX_CONNECTIONS_PER_JOB", 30)?,

            webdriver_url: get("WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            headless: flag_or(&get, "HEADLESS", false)?,

            resume_path: path_or("RESUME_PATH", "resume.txt"),
            preferences_path: path_or("PREFERENCES_PATH", "preferences.txt"),
            roles_path: path_or("ROLES_PATH", "roles.json"),
            blocklist_path: path_or("BLOCKLIST_PATH", "blocklist.json"),
            selectors_path: path_or("SELECTORS_PATH", "selectors.json"),
            db_path: path_or("DB_PATH", "jobwatch.db"),
            prompt_dir: path_or("PROMPT_DIR", "prompts"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            data_dir,
        })
    }

    /// Problems that should stop a pipeline run before it starts.
    pub fn validate(&self, roles: &[RoleQuery]) -> Vec<String> {
        let mut problems = Vec::new();

        match self.llm_provider {
            ProviderKind::OpenAI if self.openai_api_key.is_none() => {
                problems.push("OPENAI_API_KEY is not set".to_string())
            }
            ProviderKind::Anthropic if self.anthropic_api_key.is_none() => {
                problems.push("ANTHROPIC_API_KEY is not set".to_string())
            }
            _ => {}
        }
        if !(0.0..=10.0).contains(&self.match_threshold) {
            problems.push(format!(
                "JOB_MATCH_THRESHOLD must be within 0-10 (got {})",
                self.match_threshold
            ));
        }
        if self.request_delay_min < 0.0 || self.request_delay_min > self.request_delay_max {
            problems.push(format!(
                "REQUEST_DELAY_MIN ({}) must be between 0 and REQUEST_DELAY_MAX ({})",
                self.request_delay_min, self.request_delay_max
            ));
        }
        if self.rejection_streak_limit == 0 {
            problems.push("REJECTION_STREAK_LIMIT must be at least 1".to_string());
        }
        if !roles.iter().any(|r| r.enabled) {
            problems.push(format!(
                "no enabled roles in {}",
                self.roles_path.display()
            ));
        }
        if !self.resume_path.exists() {
            problems.push(format!(
                "resume not found at {}",
                self.resume_path.display()
            ));
        }

        problems
    }

    pub fn api_key_for(&self, provider: &ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::OpenAI => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

/// Minutes as a duration; absurdly large values saturate instead of overflowing.
pub fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobwatch") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("invalid value for {}: '{}' ({})", key, raw, e)),
        None => Ok(default),
    }
}

fn flag_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("invalid boolean for {}: '{}'", key, raw)),
        },
        None => Ok(default),
    }
}

// --- Roles file ---

#[derive(Debug, Deserialize)]
struct RolesFile {
    #[serde(default)]
    roles: Vec<RoleQuery>,
    #[serde(default)]
    search_settings: SearchSettings,
}

#[derive(Debug, Default, Deserialize)]
struct SearchSettings {
    date_posted: Option<String>,
}

pub fn load_roles(path: &Path) -> Result<Vec<RoleQuery>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read roles file: {}", path.display()))?;
    parse_roles(&raw).with_context(|| format!("Invalid roles file: {}", path.display()))
}

fn parse_roles(raw: &str) -> Result<Vec<RoleQuery>> {
    let file: RolesFile = serde_json::from_str(raw)?;
    let window = file
        .search_settings
        .date_posted
        .unwrap_or_else(|| DEFAULT_RECENCY.to_string());

    Ok(file
        .roles
        .into_iter()
        .map(|mut role| {
            if role.date_posted_window.is_none() {
                role.date_posted_window = Some(window.clone());
            }
            role
        })
        .collect())
}

// --- Candidate profile ---

pub fn load_profile(resume_path: &Path, preferences_path: &Path) -> Result<CandidateProfile> {
    let resume = std::fs::read_to_string(resume_path)
        .with_context(|| format!("Failed to read resume: {}", resume_path.display()))?;
    if resume.trim().is_empty() {
        return Err(anyhow!("Resume at {} is empty", resume_path.display()));
    }
    let preferences = std::fs::read_to_string(preferences_path).unwrap_or_default();
    Ok(CandidateProfile {
        resume,
        preferences,
    })
}

// --- Prompts ---

pub const DEFAULT_HR_PROMPT: &str = "Determine if the company \"{company_name}\" is a staffing, \
recruitment, HR, or temp agency firm. Return JSON: {\"is_hr_company\": true/false, \
\"reason\": \"brief explanation\"}.";

pub const DEFAULT_SPONSORSHIP_PROMPT: &str = "You are evaluating sponsorship for a candidate on \
F-1 STEM OPT who will need continued work authorization (e.g., H-1B or similar). From the job \
description, decide if the employer supports work visas. Return JSON only: \
{\"accepts_sponsorship\": true|false, \"reason\": \"brief explanation\"}. Reject ONLY when the \
description explicitly denies sponsorship or requires unrestricted work authorization. If the \
description is unclear or does not mention sponsorship, return accepts_sponsorship=true. If the \
description is positive about sponsorship or is open to international/OPT candidates, return \
accepts_sponsorship=true.";

pub const DEFAULT_SCORE_PROMPT: &str = "You are a concise matcher. Score 0-10 (float) how well the \
candidate fits the job. Consider resume and preferences. If the job title or company is \
missing/blank, infer them from the description and return them. Return JSON only: \
{\"score\": number, \"reason\": string, \"title\": string, \"company\": string}. Keep \
title/company unchanged if already provided; otherwise, supply concise inferred values.";

/// System prompts for each model call, overridable from text files.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub hr_check: String,
    pub sponsorship: String,
    pub base_score: String,
    pub rerank_score: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            hr_check: DEFAULT_HR_PROMPT.to_string(),
            sponsorship: DEFAULT_SPONSORSHIP_PROMPT.to_string(),
            base_score: DEFAULT_SCORE_PROMPT.to_string(),
            rerank_score: DEFAULT_SCORE_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// Any of `hr_check.txt`, `sponsorship.txt`, `base_score.txt` or
    /// `rerank_score.txt` found in `dir` replaces the built-in prompt.
    /// The rerank prompt falls back to the base prompt.
    pub fn load(dir: &Path) -> Self {
        let read = |name: &str| {
            std::fs::read_to_string(dir.join(name))
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let defaults = Self::default();
        let base_score = read("base_score.txt").unwrap_or(defaults.base_score);
        Self {
            hr_check: read("hr_check.txt").unwrap_or(defaults.hr_check),
            sponsorship: read("sponsorship.txt").unwrap_or(defaults.sponsorship),
            rerank_score: read("rerank_score.txt").unwrap_or_else(|| base_score.clone()),
            base_score,
        }
    }
}
