//! Sponsorship and eligibility gate.
//!
//! Cheap text heuristics run first and decide most postings without a model
//! call: eligibility rules (unpaid, volunteer, experience, PhD), explicit
//! denials of sponsorship, and postings that never mention work
//! authorization at all. Only descriptions that do talk about visas but
//! don't plainly refuse them are sent to the model.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::ai::{classify_as, AIProvider, LlmRequest, SponsorshipVerdict};
use crate::config::Settings;
use crate::models::FilterDecision;
use crate::short_reason;

pub const GATE: &str = "sponsorship";

const STRONG_NEGATIVES: &[&str] = &[
    "no visa sponsorship",
    "without sponsorship",
    "cannot sponsor",
    "will not sponsor",
    "not able to sponsor",
    "cannot hire international",
    "international candidates will not be considered",
    "us citizens only",
    "citizens only",
    "must be a us citizen",
    "usc only",
    "permanent resident only",
    "green card holders only",
    "must have permanent work authorization",
    "must have unrestricted work authorization",
    "no opt",
    "no cpt",
    "no h-1b",
    "no h1b",
    "no visa transfer",
    "no relocation or visa",
    "no relocation/visa",
    "must be authorized to work without sponsorship",
];

const SPONSORSHIP_KEYWORDS: &[&str] = &[
    "visa",
    "sponsor",
    "sponsorship",
    "work authorization",
    "international",
    "authorisation",
    "h-1b",
    "h1b",
    "tn visa",
    "o-1",
    "o1",
    "green card",
    "gc holder",
    "permanent resident",
    "citizen",
    "citizens only",
    "usc",
    "c2c",
    "w2",
    "e-verify",
    "opt",
    "stem opt",
    "cpt",
    "work permit",
    "permanent work authorization",
    "must be eligible to work",
    "authorized to work",
    "authorization to work",
    "non-citizen",
    "relocation/visa",
];

const UNPAID_KEYWORDS: &[&str] = &[
    "unpaid",
    "no pay",
    "without pay",
    "no compensation",
    "uncompensated",
    "stipend only",
];

const VOLUNTEER_KEYWORDS: &[&str] = &["volunteer", "voluntary position", "voluntary role"];

const PHD_KEYWORDS: &[&str] = &["phd", "ph.d", "doctorate", "doctoral"];

/// Phrases in a model rejection that only mean "the posting doesn't say".
const UNCERTAINTY_MARKERS: &[&str] = &[
    "does not mention",
    "no mention",
    "not mention",
    "unspecified",
    "unclear",
    "not specified",
    "no information",
    "not provided",
    "unknown",
];

/// Case-insensitive, word-boundary matchers for a phrase list, so "opt" does
/// not fire on "optimize".
struct PhraseSet {
    phrases: Vec<(&'static str, Regex)>,
}

impl PhraseSet {
    fn new(phrases: &[&'static str]) -> Self {
        let phrases = phrases
            .iter()
            .filter_map(|phrase| {
                let source = format!(r"(?i)\b{}\b", regex::escape(phrase));
                Regex::new(&source).ok().map(|re| (*phrase, re))
            })
            .collect();
        Self { phrases }
    }

    fn first_match(&self, text: &str) -> Option<&'static str> {
        self.phrases
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(phrase, _)| *phrase)
    }
}

static STRONG_NEGATIVE_SET: LazyLock<PhraseSet> = LazyLock::new(|| PhraseSet::new(STRONG_NEGATIVES));
static KEYWORD_SET: LazyLock<PhraseSet> = LazyLock::new(|| PhraseSet::new(SPONSORSHIP_KEYWORDS));
static UNPAID_SET: LazyLock<PhraseSet> = LazyLock::new(|| PhraseSet::new(UNPAID_KEYWORDS));
static VOLUNTEER_SET: LazyLock<PhraseSet> = LazyLock::new(|| PhraseSet::new(VOLUNTEER_KEYWORDS));
static PHD_SET: LazyLock<PhraseSet> = LazyLock::new(|| PhraseSet::new(PHD_KEYWORDS));
static EXPERIENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*\+?\s*(?:years|year|yrs|yr)[^\n]{0,20}experience").expect("valid regex")
});

/// The candidate's eligibility constraints.
#[derive(Debug, Clone)]
pub struct SponsorshipPolicy {
    pub requires_sponsorship: bool,
    pub reject_unpaid: bool,
    pub reject_volunteer: bool,
    /// 0 disables the experience check.
    pub max_required_experience_years: u32,
    pub allow_phd_required: bool,
}

impl SponsorshipPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            requires_sponsorship: settings.requires_sponsorship,
            reject_unpaid: settings.reject_unpaid,
            reject_volunteer: settings.reject_volunteer,
            max_required_experience_years: settings.max_required_experience_years,
            allow_phd_required: settings.allow_phd_required,
        }
    }

    /// First eligibility rule the description breaks, if any.
    fn ineligibility(&self, description: &str) -> Option<String> {
        if self.reject_unpaid && UNPAID_SET.first_match(description).is_some() {
            return Some("Unpaid role detected".to_string());
        }
        if self.reject_volunteer && VOLUNTEER_SET.first_match(description).is_some() {
            return Some("Volunteer role detected".to_string());
        }
        if self.max_required_experience_years > 0 {
            let allowed = self.max_required_experience_years;
            let too_many = EXPERIENCE_RE
                .captures_iter(description)
                .filter_map(|caps| caps[1].parse::<u32>().ok())
                .find(|years| *years > allowed);
            if let Some(years) = too_many {
                return Some(format!(
                    "Experience requirement too high ({}+ years > allowed {})",
                    years, allowed
                ));
            }
        }
        if !self.allow_phd_required && PHD_SET.first_match(description).is_some() {
            return Some("PhD requirement detected".to_string());
        }
        None
    }
}

impl Default for SponsorshipPolicy {
    fn default() -> Self {
        Self {
            requires_sponsorship: true,
            reject_unpaid: true,
            reject_volunteer: true,
            max_required_experience_years: 0,
            allow_phd_required: true,
        }
    }
}

pub fn find_strong_negative(description: &str) -> Option<&'static str> {
    STRONG_NEGATIVE_SET.first_match(description)
}

pub fn has_sponsorship_signal(description: &str) -> bool {
    KEYWORD_SET.first_match(description).is_some()
}

fn is_uncertain(reason: &str) -> bool {
    let lowered = reason.to_lowercase();
    UNCERTAINTY_MARKERS.iter().any(|marker| lowered.contains(marker))
}

pub struct SponsorshipGate {
    policy: SponsorshipPolicy,
    provider: Arc<dyn AIProvider>,
    model: String,
    prompt: String,
}

impl SponsorshipGate {
    pub fn new(
        policy: SponsorshipPolicy,
        provider: Arc<dyn AIProvider>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            provider,
            model: model.into(),
            prompt: prompt.into(),
        }
    }

    pub fn evaluate(&self, description: &str) -> FilterDecision {
        if !self.policy.requires_sponsorship {
            return FilterDecision::accept(GATE, "requires_sponsorship disabled");
        }
        if description.trim().is_empty() {
            warn!("no description; assuming sponsorship accepted");
            return FilterDecision::accept(GATE, "No description provided");
        }

        if let Some(reason) = self.policy.ineligibility(description) {
            info!(reason = %reason, "eligibility check rejected");
            return FilterDecision::reject(GATE, reason);
        }

        if let Some(phrase) = find_strong_negative(description) {
            info!(phrase, "sponsorship rejected by strong negative phrase");
            return FilterDecision::reject(GATE, format!("Found strong negative: {}", phrase));
        }

        if !has_sponsorship_signal(description) {
            debug!("no sponsorship language; assuming accept");
            return FilterDecision::accept(GATE, "No sponsorship info present; assumed accept");
        }

        let request = LlmRequest::new(&self.model, &self.prompt, description);
        let decision = match classify_as::<SponsorshipVerdict>(self.provider.as_ref(), &request) {
            Ok(verdict) if !verdict.accepts_sponsorship && is_uncertain(&verdict.reason) => {
                FilterDecision::accept(GATE, "LLM uncertain (no explicit denial); defaulting to accept")
            }
            Ok(verdict) => {
                let reason = if verdict.reason.trim().is_empty() {
                    "No reason provided".to_string()
                } else {
                    verdict.reason
                };
                if verdict.accepts_sponsorship {
                    FilterDecision::accept(GATE, reason)
                } else {
                    FilterDecision::reject(GATE, reason)
                }
            }
            Err(err) => {
                warn!(error = %err, "sponsorship check failed; defaulting to accept");
                FilterDecision::accept(GATE, format!("LLM error (assumed accept): {}", err))
            }
        };

        info!(
            accepted = decision.accepted,
            reason = %short_reason(&decision.reason),
            "sponsorship check"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::testing::ScriptedLlm;

    fn gate(llm: &Arc<ScriptedLlm>, policy: SponsorshipPolicy) -> SponsorshipGate {
        SponsorshipGate::new(policy, llm.clone(), "gpt-5-nano", "policy prompt")
    }

    #[test]
    fn test_strong_negative_rejects_without_llm() {
        let llm = Arc::new(ScriptedLlm::new());
        let decision = gate(&llm, SponsorshipPolicy::default())
            .evaluate("We cannot hire international candidates or provide visas.");
        assert!(!decision.accepted);
        assert_eq!(decision.reason, "Found strong negative: cannot hire international");
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_silence_accepts_without_llm() {
        let llm = Arc::new(ScriptedLlm::new());
        let decision = gate(&llm, SponsorshipPolicy::default())
            .evaluate("We build delightful products for our customers.");
        assert!(decision.accepted);
        assert_eq!(decision.reason, "No sponsorship info present; assumed accept");
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_keywords_respect_word_boundaries() {
        assert!(!has_sponsorship_signal("We optimize adoption of our platform."));
        assert!(has_sponsorship_signal("OPT candidates welcome."));
        assert!(has_sponsorship_signal("Must be authorized to work in the US."));
        assert_eq!(find_strong_negative("Sorry, NO H-1B transfers."), Some("no h-1b"));
        assert_eq!(find_strong_negative("No optimization needed."), None);
    }

    #[test]
    fn test_not_required_skips_everything() {
        let llm = Arc::new(ScriptedLlm::new());
        let policy = SponsorshipPolicy {
            requires_sponsorship: false,
            ..SponsorshipPolicy::default()
        };
        let decision = gate(&llm, policy).evaluate("US citizens only. Unpaid.");
        assert!(decision.accepted);
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_eligibility_rules() {
        let llm = Arc::new(ScriptedLlm::new());
        let strict = SponsorshipPolicy {
            max_required_experience_years: 3,
            allow_phd_required: false,
            ..SponsorshipPolicy::default()
        };
        let g = gate(&llm, strict);

        assert_eq!(g.evaluate("This is an unpaid internship.").reason, "Unpaid role detected");
        assert_eq!(g.evaluate("Volunteer with our team.").reason, "Volunteer role detected");
        assert_eq!(
            g.evaluate("Requires 5+ years of professional experience.").reason,
            "Experience requirement too high (5+ years > allowed 3)"
        );
        assert!(g.evaluate("2 years experience preferred.").accepted);
        assert_eq!(g.evaluate("PhD in statistics required.").reason, "PhD requirement detected");
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_llm_verdicts() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .reply(r#"{"accepts_sponsorship": false, "reason": "Requires existing work authorization."}"#)
                .reply(r#"{"accepts_sponsorship": true, "reason": "Sponsors H-1B."}"#),
        );
        let g = gate(&llm, SponsorshipPolicy::default());
        let desc = "Applicants must have work authorization for the role.";

        let rejected = g.evaluate(desc);
        assert!(!rejected.accepted);
        assert_eq!(rejected.reason, "Requires existing work authorization.");
        assert!(g.evaluate(desc).accepted);

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, "gpt-5-nano");
        assert_eq!(requests[0].system_prompt, "policy prompt");
        assert_eq!(requests[0].user_content, desc);
    }

    #[test]
    fn test_uncertain_rejection_is_overridden() {
        let llm = Arc::new(ScriptedLlm::new().reply(
            r#"{"accepts_sponsorship": false, "reason": "The description does not mention visas explicitly."}"#,
        ));
        let decision = gate(&llm, SponsorshipPolicy::default()).evaluate("Visa details discussed later.");
        assert!(decision.accepted);
        assert!(decision.reason.starts_with("LLM uncertain"));
    }

    #[test]
    fn test_llm_failure_fails_open() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .fail(LlmError::Transport("timeout".into()))
                .reply("I think they probably sponsor"),
        );
        let g = gate(&llm, SponsorshipPolicy::default());
        let desc = "We discuss sponsorship case by case.";

        let first = g.evaluate(desc);
        assert!(first.accepted);
        assert!(first.reason.starts_with("LLM error (assumed accept)"));

        let second = g.evaluate(desc);
        assert!(second.accepted);
        assert!(second.reason.starts_with("LLM error (assumed accept)"));
    }
}
