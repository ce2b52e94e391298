use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ai::{classify_as, AIProvider, HrVerdict, LlmRequest};
use crate::blocklist::Blocklist;
use crate::config::{Prompts, Settings};
use crate::models::FilterDecision;
use crate::short_reason;
use crate::sponsorship::{SponsorshipGate, SponsorshipPolicy};

pub const BLOCKLIST_GATE: &str = "blocklist";
pub const HR_GATE: &str = "hr";

/// Description context sent alongside the company name to the HR check.
const HR_CONTEXT_CHARS: usize = 4000;

// --- HR / staffing gate ---

pub struct HrGate {
    enabled: bool,
    provider: Arc<dyn AIProvider>,
    model: String,
    prompt: String,
}

impl HrGate {
    pub fn new(
        enabled: bool,
        provider: Arc<dyn AIProvider>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            enabled,
            provider,
            model: model.into(),
            prompt: prompt.into(),
        }
    }

    /// Staffing agencies found here are added to `blocklist` so later
    /// postings stop at the blocklist gate.
    pub fn evaluate(&self, blocklist: &mut Blocklist, company: &str, description: &str) -> FilterDecision {
        let company = company.trim();
        if !self.enabled {
            return FilterDecision::accept(HR_GATE, "HR company check disabled");
        }
        if company.is_empty() {
            return FilterDecision::accept(HR_GATE, "No company name; skipped HR check");
        }
        if let Some(entry) = blocklist.matches(company) {
            return FilterDecision::reject(HR_GATE, format!("Blocklisted company: {}", entry));
        }

        let context: String = description.chars().take(HR_CONTEXT_CHARS).collect();
        let request = LlmRequest::new(
            &self.model,
            self.prompt.replace("{company_name}", company),
            format!("Company: {}\nContext: {}", company, context),
        );

        match classify_as::<HrVerdict>(self.provider.as_ref(), &request) {
            Ok(verdict) if verdict.is_hr_company => {
                info!(company, reason = %short_reason(&verdict.reason), "staffing company detected");
                if let Err(err) = blocklist.add(company) {
                    warn!(company, error = %err, "could not persist blocklist entry");
                }
                FilterDecision::reject(HR_GATE, verdict.reason)
            }
            Ok(verdict) => {
                debug!(company, "not a staffing company");
                FilterDecision::accept(HR_GATE, verdict.reason)
            }
            Err(err) => {
                warn!(company, error = %err, "HR check failed; defaulting to accept");
                FilterDecision::accept(HR_GATE, format!("LLM error (assumed accept): {}", err))
            }
        }
    }
}

// --- Chain ---

/// Every decision made for one posting, in gate order. The chain stops at
/// the first rejection.
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    pub decisions: Vec<FilterDecision>,
}

impl ChainOutcome {
    pub fn rejection(&self) -> Option<&FilterDecision> {
        self.decisions.iter().find(|d| !d.accepted)
    }

    pub fn is_accepted(&self) -> bool {
        self.rejection().is_none()
    }
}

pub struct FilterChain {
    blocklist: Blocklist,
    hr: HrGate,
    sponsorship: SponsorshipGate,
}

impl FilterChain {
    pub fn new(blocklist: Blocklist, hr: HrGate, sponsorship: SponsorshipGate) -> Self {
        Self {
            blocklist,
            hr,
            sponsorship,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        prompts: &Prompts,
        blocklist: Blocklist,
        provider: Arc<dyn AIProvider>,
    ) -> Self {
        let hr = HrGate::new(
            settings.reject_hr_companies,
            provider.clone(),
            &settings.hr_model,
            &prompts.hr_check,
        );
        let sponsorship = SponsorshipGate::new(
            SponsorshipPolicy::from_settings(settings),
            provider,
            &settings.sponsorship_model,
            &prompts.sponsorship,
        );
        Self::new(blocklist, hr, sponsorship)
    }

    pub fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }

    pub fn evaluate(&mut self, company: &str, description: &str) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();

        let blocked = match self.blocklist.matches(company) {
            Some(entry) => FilterDecision::reject(BLOCKLIST_GATE, format!("Blocklisted company: {}", entry)),
            None => FilterDecision::accept(BLOCKLIST_GATE, "Not blocklisted"),
        };
        outcome.decisions.push(blocked);
        if !outcome.is_accepted() {
            return outcome;
        }

        outcome
            .decisions
            .push(self.hr.evaluate(&mut self.blocklist, company, description));
        if !outcome.is_accepted() {
            return outcome;
        }

        outcome.decisions.push(self.sponsorship.evaluate(description));
        outcome
    }
}
