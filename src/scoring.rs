use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ai::{classify_as, AIProvider, LlmRequest, ScoreVerdict};
use crate::config::{Prompts, Settings};
use crate::error::LlmError;
use crate::models::{CandidateProfile, ScoreResult};
use crate::short_reason;

const DESCRIPTION_CHARS: usize = 4000;

/// The posting fields the matcher sees.
#[derive(Debug, Clone, Default)]
pub struct ScoreRequest<'a> {
    pub title: &'a str,
    pub company: &'a str,
    pub location: &'a str,
    pub description: &'a str,
}

pub struct ScoringEngine {
    provider: Arc<dyn AIProvider>,
    base_model: String,
    rerank_model: String,
    rerank_trigger: f64,
    match_threshold: f64,
    base_prompt: String,
    rerank_prompt: String,
}

impl ScoringEngine {
    pub fn new(settings: &Settings, prompts: &Prompts, provider: Arc<dyn AIProvider>) -> Self {
        Self {
            provider,
            base_model: settings.base_model.clone(),
            rerank_model: settings.rerank_model.clone(),
            rerank_trigger: settings.rerank_trigger,
            match_threshold: settings.match_threshold,
            base_prompt: prompts.base_score.clone(),
            rerank_prompt: prompts.rerank_score.clone(),
        }
    }

    /// Score returned when the model cannot be reached: just above the
    /// threshold, so the posting is kept for a human to look at.
    pub fn fallback_score(&self) -> f64 {
        (self.match_threshold.max(0.0) + 0.1).min(10.0)
    }

    /// Base pass, then a rerank pass with the stronger model when the base
    /// score reaches the trigger. Never fails; model errors produce the
    /// fallback score.
    pub fn score(&self, profile: &CandidateProfile, request: &ScoreRequest<'_>) -> ScoreResult {
        match self.try_score(profile, request) {
            Ok(result) => {
                info!(
                    score = result.score,
                    reranked = result.reranked,
                    reason = %short_reason(&result.reason),
                    "scored posting"
                );
                result
            }
            Err(err) => {
                let score = self.fallback_score();
                warn!(error = %err, score, "scoring failed; accepting with fallback score");
                let reason = format!("LLM error (accepted): {}", err);
                ScoreResult {
                    score,
                    reason: reason.clone(),
                    model_used: None,
                    reranked: false,
                    first_score: score,
                    reason_first: reason,
                    reason_rerank: None,
                    model_used_rerank: None,
                    inferred_title: None,
                    inferred_company: None,
                }
            }
        }
    }

    fn try_score(&self, profile: &CandidateProfile, request: &ScoreRequest<'_>) -> Result<ScoreResult, LlmError> {
        let user_content = build_user_content(profile, request);

        let base = self.call(&self.base_model, &self.base_prompt, &user_content)?;
        let inferred_title = adopt_inferred(request.title, base.title.as_deref());
        let inferred_company = adopt_inferred(request.company, base.company.as_deref());

        let needs_rerank = self.rerank_model != self.base_model && base.score >= self.rerank_trigger;
        if !needs_rerank {
            return Ok(ScoreResult {
                score: base.score,
                reason: base.reason.clone(),
                model_used: Some(self.base_model.clone()),
                reranked: false,
                first_score: base.score,
                reason_first: base.reason,
                reason_rerank: None,
                model_used_rerank: None,
                inferred_title,
                inferred_company,
            });
        }

        debug!(base_score = base.score, model = %self.rerank_model, "rerank triggered");
        let rerank = self.call(&self.rerank_model, &self.rerank_prompt, &user_content)?;
        Ok(ScoreResult {
            score: rerank.score,
            reason: rerank.reason.clone(),
            model_used: Some(self.base_model.clone()),
            reranked: true,
            first_score: base.score,
            reason_first: base.reason,
            reason_rerank: Some(rerank.reason),
            model_used_rerank: Some(self.rerank_model.clone()),
            inferred_title,
            inferred_company,
        })
    }

    fn call(&self, model: &str, prompt: &str, user_content: &str) -> Result<ScoreVerdict, LlmError> {
        let request = LlmRequest::new(model, prompt, user_content);
        let mut verdict: ScoreVerdict = classify_as(self.provider.as_ref(), &request)?;
        if !verdict.score.is_finite() {
            return Err(LlmError::Format(format!("score is not a number: {}", verdict.score)));
        }
        verdict.score = verdict.score.clamp(0.0, 10.0);
        Ok(verdict)
    }
}

fn build_user_content(profile: &CandidateProfile, request: &ScoreRequest<'_>) -> String {
    let description: String = request.description.chars().take(DESCRIPTION_CHARS).collect();
    format!(
        "Resume:\n{}\n\nPreferences:\n{}\n\nJob Title: {}\nCompany: {}\nLocation: {}\nDescription: {}",
        profile.resume, profile.preferences, request.title, request.company, request.location, description
    )
}

/// The model's value, only when the posting had none of its own.
fn adopt_inferred(original: &str, inferred: Option<&str>) -> Option<String> {
    if !original.trim().is_empty() {
        return None;
    }
    inferred
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
