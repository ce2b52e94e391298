use regex::Regex;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::{first_text, Browser, BrowserResult, PageElement, ScrollTarget};
use crate::error::{BrowserError, ExtractError};
use crate::models::{PostingDetail, PostingSummary, UNKNOWN};
use crate::selectors::SelectorSet;

static APPLICANTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d,]+)\+?\s*(?:applicants?|people clicked apply|total)").expect("valid regex")
});
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d[\d,]*)").expect("valid regex"));
static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:remote|work from home|wfh|hybrid)\b").expect("valid regex")
});

const POSTED_KEYWORDS: &[&str] = &[
    "ago", "hour", "day", "week", "month", "reposted", "posted", "just now",
];

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub ready_polls: u32,
    pub poll_interval: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ready_polls: 6,
            poll_interval: Duration::from_millis(500),
            attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Which detail field a chip label feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsightField {
    Seniority,
    EmploymentType,
    JobFunction,
    Industries,
}

/// Chip keywords, checked in order; the first hit decides the field. Labelled
/// chips ("Seniority level Entry level") have the label stripped.
const INSIGHT_KEYWORDS: &[(&str, InsightField, bool)] = &[
    ("seniority level", InsightField::Seniority, true),
    ("employment type", InsightField::EmploymentType, true),
    ("job function", InsightField::JobFunction, true),
    ("industries", InsightField::Industries, true),
    ("full-time", InsightField::EmploymentType, false),
    ("part-time", InsightField::EmploymentType, false),
    ("contract", InsightField::EmploymentType, false),
    ("temporary", InsightField::EmploymentType, false),
    ("internship", InsightField::EmploymentType, false),
    ("level", InsightField::Seniority, false),
];

#[derive(Debug, Default, PartialEq)]
struct Insights {
    seniority: Option<String>,
    employment_type: Option<String>,
    job_function: Option<String>,
    industries: Option<String>,
}

fn parse_insights<'a>(chips: impl IntoIterator<Item = &'a str>) -> Insights {
    let mut insights = Insights::default();
    for chip in chips {
        let chip = chip.trim();
        let lower = chip.to_lowercase();
        let Some((label, field, labelled)) = INSIGHT_KEYWORDS
            .iter()
            .find(|(keyword, _, _)| lower.contains(keyword))
        else {
            continue;
        };

        let value = match chip.get(label.len()..) {
            Some(rest) if *labelled && lower.starts_with(label) => rest.trim().to_string(),
            _ => chip.to_string(),
        };
        if value.is_empty() {
            continue;
        }

        let slot = match *field {
            InsightField::Seniority => &mut insights.seniority,
            InsightField::EmploymentType => &mut insights.employment_type,
            InsightField::JobFunction => &mut insights.job_function,
            InsightField::Industries => &mut insights.industries,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
    insights
}

fn parse_applicants(text: &str) -> Option<u32> {
    let caps = APPLICANTS_RE.captures(text).or_else(|| {
        if text.to_lowercase().contains("applicant") {
            NUMBER_RE.captures(text)
        } else {
            None
        }
    })?;
    caps[1].replace(',', "").parse().ok()
}

fn is_posted_time(text: &str) -> bool {
    let lower = text.to_lowercase();
    POSTED_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Opens one posting and reads its detail pane.
pub struct JobExtractor {
    selectors: SelectorSet,
    config: ExtractorConfig,
}

impl JobExtractor {
    pub fn new(selectors: SelectorSet, config: ExtractorConfig) -> Self {
        Self { selectors, config }
    }

    /// Retries the whole extraction on non-fatal failures. A lost session
    /// returns [`ExtractError::Fatal`] at once.
    pub fn extract<B: Browser>(
        &self,
        browser: &mut B,
        summary: &PostingSummary,
    ) -> Result<PostingDetail, ExtractError> {
        let attempts = self.config.attempts.max(1);
        let mut last = BrowserError::NotFound("no attempt made".to_string());

        for attempt in 1..=attempts {
            match self.try_extract(browser, summary) {
                Ok(detail) => return Ok(detail),
                Err(err) if err.is_fatal() => return Err(ExtractError::Fatal(err)),
                Err(err) => {
                    warn!(
                        posting_id = %summary.posting_id,
                        attempt,
                        error = %err,
                        "detail extraction failed"
                    );
                    last = err;
                    if attempt < attempts && !self.config.retry_delay.is_zero() {
                        thread::sleep(self.config.retry_delay);
                    }
                }
            }
        }

        Err(ExtractError::Exhausted {
            posting_id: summary.posting_id.clone(),
            attempts,
            last,
        })
    }

    fn try_extract<B: Browser>(
        &self,
        browser: &mut B,
        summary: &PostingSummary,
    ) -> BrowserResult<PostingDetail> {
        self.open(browser, summary)?;

        let ready_sel = self.selectors.details_ready.clone();
        let ready = browser.wait_until(
            self.config.poll_interval * self.config.ready_polls.max(1),
            self.config.poll_interval,
            &mut |b: &mut B| match b.find_one(&ready_sel) {
                Ok(found) => Ok(found.is_some()),
                Err(err) if err.is_transient() => Ok(false),
                Err(err) => Err(err),
            },
        )?;
        if !ready {
            return Err(BrowserError::NotFound("job details pane".to_string()));
        }

        self.expand_description(browser)?;

        let description = first_text(browser, &self.selectors.description)?.unwrap_or_default();
        let title = first_text(browser, &self.selectors.detail_title)?;
        let company = first_text(browser, &self.selectors.detail_company)?;

        let chips = self.collect_all(browser, &self.selectors.insight_chips)?;
        let insights = parse_insights(chips.iter().map(String::as_str));

        let posted_time = self
            .collect_each(browser, &self.selectors.posted_time)?
            .into_iter()
            .find(|text| is_posted_time(text))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let applicant_count = self
            .collect_each(browser, &self.selectors.applicants)?
            .iter()
            .find_map(|text| parse_applicants(text));

        let badge = first_text(browser, &self.selectors.workplace_type)?
            .map(|t| t.to_lowercase())
            .unwrap_or_default();
        let remote_eligible =
            REMOTE_RE.is_match(&description) || badge.contains("remote") || badge.contains("hybrid");

        if description.is_empty() {
            debug!(posting_id = %summary.posting_id, "detail pane has no description");
        }

        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN.to_string());
        Ok(PostingDetail {
            posting_id: summary.posting_id.clone(),
            source_url: summary.source_url.clone(),
            title,
            company,
            description,
            seniority: or_unknown(insights.seniority),
            employment_type: or_unknown(insights.employment_type),
            job_function: or_unknown(insights.job_function),
            industries: or_unknown(insights.industries),
            posted_time,
            applicant_count,
            remote_eligible,
        })
    }

    /// Click the posting's card when it is on screen, otherwise load its page.
    fn open<B: Browser>(&self, browser: &mut B, summary: &PostingSummary) -> BrowserResult<()> {
        let link = match browser.find_one(&SelectorSet::card_link_for(&summary.posting_id)) {
            Ok(link) => link,
            Err(err) if err.is_transient() => None,
            Err(err) => return Err(err),
        };
        match link {
            Some(link) => {
                if let Err(err) = browser.scroll_to(ScrollTarget::Element(link.clone())) {
                    if err.is_fatal() {
                        return Err(err);
                    }
                }
                browser.click(&link)
            }
            None => browser.navigate(&summary.source_url),
        }
    }

    /// Best-effort click on a "show more" control.
    fn expand_description<B: Browser>(&self, browser: &mut B) -> BrowserResult<()> {
        let result = match browser.find_one(&self.selectors.show_more) {
            Ok(Some(button)) => browser.click(&button),
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        match result {
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                debug!(error = %err, "could not expand description");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Texts from every selector in the list, not just the first that matches.
    fn collect_all<B: Browser>(&self, browser: &B, selectors: &[String]) -> BrowserResult<Vec<String>> {
        let mut texts = Vec::new();
        for selector in selectors {
            for element in browser.find_all(std::slice::from_ref(selector))? {
                let text = element.text()?.trim().to_string();
                if !text.is_empty() && !texts.contains(&text) {
                    texts.push(text);
                }
            }
        }
        Ok(texts)
    }

    /// Texts of each selector's first match, in selector order.
    fn collect_each<B: Browser>(&self, browser: &B, selectors: &[String]) -> BrowserResult<Vec<String>> {
        let mut texts = Vec::new();
        for selector in selectors {
            if let Some(text) = first_text(browser, std::slice::from_ref(selector))? {
                texts.push(text);
            }
        }
        Ok(texts)
    }
}
