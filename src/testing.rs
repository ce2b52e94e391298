//! Test doubles shared by the module tests: a scripted language model and
//! builders for listing, detail and people search HTML.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::ai::{AIProvider, LlmRequest};
use crate::error::LlmError;
use crate::models::StoredJob;

/// Replays queued replies in order and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, raw: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(raw.into()));
        self
    }

    pub fn fail(self, err: LlmError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl AIProvider for ScriptedLlm {
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("no scripted reply".to_string())))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// One results-list card in the site's two-pane layout.
pub fn card_html(id: &str, title: &str, company: &str) -> String {
    format!(
        r#"<li class="jobs-search-results__list-item" data-job-id="{id}">
  <div class="job-card-container">
    <a class="job-card-list__title" href="/jobs/view/{id}/">{title}</a>
    <div class="artdeco-entity-lockup__subtitle">{company}</div>
    <div class="job-card-container__metadata-item">United States (Remote)</div>
  </div>
</li>"#,
        id = escape(id),
        title = escape(title),
        company = escape(company),
    )
}

/// A results page. `next` of `Some("")` renders a next control that leads
/// nowhere; `None` renders no control at all.
pub fn results_page(cards: &[String], next: Option<&str>, page_state: Option<&str>) -> String {
    let next = match next {
        Some("") => r#"<button class="jobs-search-pagination__button--next">Next</button>"#.to_string(),
        Some(url) => format!(
            r#"<button class="jobs-search-pagination__button--next" data-href="{}">Next</button>"#,
            escape(url)
        ),
        None => String::new(),
    };
    let state = page_state
        .map(|s| format!(r#"<p class="jobs-search-pagination__page-state">{}</p>"#, escape(s)))
        .unwrap_or_default();
    format!(
        r#"<html><body>
<div class="jobs-search-results-list__subtitle">{count} results</div>
<ul class="scaffold-layout__list">{cards}</ul>
{state}
{next}
</body></html>"#,
        count = cards.len(),
        cards = cards.join("\n"),
    )
}

/// One card on the people search results page. `degree` is the badge text,
/// e.g. "1st" or "2nd".
pub fn person_card_html(slug: &str, name: &str, title: &str, degree: &str) -> String {
    format!(
        r#"<li class="reusable-search__result-container">
  <div class="entity-result">
    <span class="entity-result__title-text">
      <a class="app-aware-link" href="https://www.linkedin.com/in/{slug}/?miniProfileUrn=urn%3Ali%3A{slug}">
        <span aria-hidden="true">{name}</span>
      </a>
    </span>
    <span class="entity-result__badge-text">{degree}</span>
    <div class="entity-result__primary-subtitle">{title}</div>
  </div>
</li>"#,
        slug = escape(slug),
        name = escape(name),
        title = escape(title),
        degree = escape(degree),
    )
}

/// A people search page. `next` of `Some("")` renders a disabled next
/// button; `None` renders none.
pub fn people_page(cards: &[String], next: Option<&str>) -> String {
    let next = match next {
        Some("") => r#"<button class="artdeco-pagination__button--next" aria-label="Next" disabled>Next</button>"#
            .to_string(),
        Some(url) => format!(
            r#"<button class="artdeco-pagination__button--next" aria-label="Next" data-href="{}">Next</button>"#,
            escape(url)
        ),
        None => String::new(),
    };
    format!(
        r#"<html><body>
<ul class="reusable-search__entity-result-list">{cards}</ul>
{next}
</body></html>"#,
        cards = cards.join("\n"),
    )
}

/// A stored posting with plausible bookkeeping values.
pub fn stored_job(title: &str, company: &str, location: &str) -> StoredJob {
    StoredJob {
        posting_id: "4100".into(),
        title: title.into(),
        company: company.into(),
        location: location.into(),
        job_url: "https://www.linkedin.com/jobs/view/4100/".into(),
        source: "linkedin".into(),
        applicants: None,
        posted_date: "1 day ago".into(),
        scraped_date: "2026-01-05 09:00:00".into(),
        match_score: 8.5,
        match_reason: "Strong.".into(),
        model_used: None,
        reranked: false,
        first_score: 8.5,
        reason_first: "Strong.".into(),
        reason_rerank: None,
        model_used_rerank: None,
        description: String::new(),
        viewed: false,
        saved: false,
        applied: false,
        emailed: false,
    }
}

/// Builder for a posting detail page.
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    title: String,
    company: String,
    description: String,
    chips: Vec<String>,
    posted: Option<String>,
    applicants: Option<String>,
    workplace: Option<String>,
}

impl DetailPage {
    pub fn new(title: &str, company: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            company: company.to_string(),
            description: description.to_string(),
            ..Self::default()
        }
    }

    pub fn chip(mut self, text: &str) -> Self {
        self.chips.push(text.to_string());
        self
    }

    pub fn posted(mut self, text: &str) -> Self {
        self.posted = Some(text.to_string());
        self
    }

    pub fn applicants(mut self, text: &str) -> Self {
        self.applicants = Some(text.to_string());
        self
    }

    pub fn workplace(mut self, text: &str) -> Self {
        self.workplace = Some(text.to_string());
        self
    }

    pub fn render(&self) -> String {
        let chips: String = self
            .chips
            .iter()
            .map(|c| format!(r#"<li class="job-details-jobs-unified-top-card__job-insight">{}</li>"#, escape(c)))
            .collect();
        let posted = self
            .posted
            .as_deref()
            .map(|p| format!(r#"<span class="jobs-unified-top-card__posted-date">{}</span>"#, escape(p)))
            .unwrap_or_default();
        let applicants = self
            .applicants
            .as_deref()
            .map(|a| format!(r#"<span class="jobs-unified-top-card__applicant-count">{}</span>"#, escape(a)))
            .unwrap_or_default();
        let workplace = self
            .workplace
            .as_deref()
            .map(|w| format!(r#"<span class="jobs-unified-top-card__workplace-type">{}</span>"#, escape(w)))
            .unwrap_or_default();
        format!(
            r#"<html><body>
<div class="jobs-search__job-details--container">
  <h1 class="job-details-jobs-unified-top-card__job-title">{title}</h1>
  <div class="job-details-jobs-unified-top-card__company-name"><a href="/company/x">{company}</a></div>
  {posted}{applicants}{workplace}
  <ul>{chips}</ul>
  <div class="jobs-description__content"><div class="jobs-box__html-content">{description}</div>
  <button class="jobs-description__footer-button">Show more</button></div>
</div>
</body></html>"#,
            title = escape(&self.title),
            company = escape(&self.company),
            description = escape(&self.description),
        )
    }
}
