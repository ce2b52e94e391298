use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::browser::{Browser, Pacer};
use crate::config::Settings;
use crate::db::{JobStore, UpsertOutcome};
use crate::error::ExtractError;
use crate::extractor::{ExtractorConfig, JobExtractor};
use crate::filters::FilterChain;
use crate::models::{CandidateProfile, PostingSummary, RoleOutcome, RoleQuery, StoredJob};
use crate::notify::{LogNotifier, NoOutreach, Notifier, OutreachFinder};
use crate::scheduler::RoleRunner;
use crate::scoring::{ScoreRequest, ScoringEngine};
use crate::search::build_search_url;
use crate::selectors::SelectorSet;
use crate::walker::{PageWalker, PostingOutcome, WalkerConfig};
use crate::short_reason;

pub const SOURCE: &str = "linkedin";
pub const APPLICANTS_GATE: &str = "applicants";

/// Per-posting policy knobs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub skip_seen: bool,
    /// 0 disables the cap
    pub max_applicants: u32,
    pub match_threshold: f64,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            skip_seen: settings.skip_seen,
            max_applicants: settings.max_applicants,
            match_threshold: settings.match_threshold,
        }
    }
}

pub fn walker_config(settings: &Settings) -> WalkerConfig {
    WalkerConfig {
        rejection_streak_limit: settings.rejection_streak_limit,
        no_match_pages_limit: settings.no_match_pages_limit,
        max_pages: settings.max_pages,
        ..WalkerConfig::default()
    }
}

/// Runs one role end to end: walk the results, extract each posting, filter,
/// score, store and notify. Owns the browser session, which is reused
/// across roles.
pub struct RolePipeline<B: Browser> {
    browser: B,
    selectors: SelectorSet,
    walker_config: WalkerConfig,
    extractor: JobExtractor,
    filters: FilterChain,
    scorer: ScoringEngine,
    store: JobStore,
    profile: CandidateProfile,
    notifier: Box<dyn Notifier>,
    outreach: Box<dyn OutreachFinder<B>>,
    pacer: Pacer,
    options: PipelineOptions,
}

impl<B: Browser> RolePipeline<B> {
    pub fn new(
        browser: B,
        settings: &Settings,
        filters: FilterChain,
        scorer: ScoringEngine,
        store: JobStore,
        profile: CandidateProfile,
    ) -> Self {
        let selectors = SelectorSet::default();
        Self {
            browser,
            extractor: JobExtractor::new(selectors.clone(), ExtractorConfig::default()),
            selectors,
            walker_config: walker_config(settings),
            filters,
            scorer,
            store,
            profile,
            notifier: Box::new(LogNotifier),
            outreach: Box::new(NoOutreach),
            pacer: Pacer::new(settings.request_delay_min, settings.request_delay_max),
            options: PipelineOptions::from_settings(settings),
        }
    }

    pub fn with_selectors(mut self, selectors: SelectorSet) -> Self {
        self.extractor = JobExtractor::new(selectors.clone(), ExtractorConfig::default());
        self.selectors = selectors;
        self
    }

    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    pub fn with_extractor_config(mut self, config: ExtractorConfig) -> Self {
        self.extractor = JobExtractor::new(self.selectors.clone(), config);
        self
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_outreach(mut self, outreach: Box<dyn OutreachFinder<B>>) -> Self {
        self.outreach = outreach;
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn run(&mut self, role: &RoleQuery) -> Result<RoleOutcome> {
        let url = build_search_url(role);
        info!(role = %role.title, url = %url, "starting role");
        let mut walker = PageWalker::new(&role.title, url, self.selectors.clone(), self.walker_config.clone());
        let mut outcome = RoleOutcome::default();

        while let Some(batch) = walker
            .next_batch(&mut self.browser)
            .with_context(|| format!("Results walk failed for '{}'", role.title))?
        {
            outcome.pages += 1;
            outcome.cards += batch.postings.len() as u32;

            for summary in &batch.postings {
                let result = self.process(role, summary, &mut outcome)?;
                let keep_going = walker.record_outcome(result);

                if let Err(err) = walker.settle(&mut self.browser) {
                    if err.is_fatal() {
                        return Err(err).context("Browser session lost");
                    }
                    warn!(error = %err, "could not return to results page");
                }
                if !keep_going {
                    info!(role = %role.title, "rejection streak reached; abandoning role");
                    break;
                }
            }
        }

        outcome.stop_reason = walker.stop_reason();
        info!(
            role = %role.title,
            pages = outcome.pages,
            inserted = outcome.inserted,
            updated = outcome.updated,
            rejected = outcome.rejected,
            stop = ?outcome.stop_reason,
            "role finished"
        );
        Ok(outcome)
    }

    fn process(&mut self, role: &RoleQuery, summary: &PostingSummary, outcome: &mut RoleOutcome) -> Result<PostingOutcome> {
        if summary.already_seen && self.options.skip_seen {
            debug!(posting_id = %summary.posting_id, "skipping seen posting");
            outcome.skipped_seen += 1;
            return Ok(PostingOutcome::Skipped);
        }

        self.pacer.pause();
        let detail = match self.extractor.extract(&mut self.browser, summary) {
            Ok(detail) => detail,
            Err(ExtractError::Fatal(err)) => return Err(err).context("Browser session lost"),
            Err(err) => {
                warn!(posting_id = %summary.posting_id, error = %err, "skipping posting");
                outcome.extract_failures += 1;
                return Ok(PostingOutcome::Skipped);
            }
        };

        if let Some(count) = detail.applicant_count {
            if self.options.max_applicants > 0 && count > self.options.max_applicants {
                info!(
                    posting_id = %summary.posting_id,
                    gate = APPLICANTS_GATE,
                    "too many applicants ({} > {})",
                    count,
                    self.options.max_applicants
                );
                outcome.rejected += 1;
                return Ok(PostingOutcome::Rejected);
            }
        }

        let title = prefer_card(&summary.title, detail.title.as_deref());
        let company = prefer_card(&summary.company, detail.company.as_deref());

        let chain = self.filters.evaluate(&company, &detail.description);
        if let Some(rejection) = chain.rejection() {
            info!(
                posting_id = %summary.posting_id,
                company = %company,
                gate = rejection.gate_name,
                reason = %short_reason(&rejection.reason),
                "posting rejected"
            );
            outcome.rejected += 1;
            return Ok(PostingOutcome::Rejected);
        }

        let score = self.scorer.score(
            &self.profile,
            &ScoreRequest {
                title: &title,
                company: &company,
                location: &summary.location,
                description: &detail.description,
            },
        );
        if score.score < self.options.match_threshold {
            info!(
                posting_id = %summary.posting_id,
                score = score.score,
                threshold = self.options.match_threshold,
                "below match threshold"
            );
            outcome.below_threshold += 1;
            return Ok(PostingOutcome::Rejected);
        }

        let title = score.inferred_title.clone().unwrap_or(title);
        let company = score.inferred_company.clone().unwrap_or(company);
        let job = StoredJob::from_parts(summary, &detail, &score, &title, &company, SOURCE);
        match self.store.upsert(&job)? {
            UpsertOutcome::Inserted => outcome.inserted += 1,
            UpsertOutcome::Updated => outcome.updated += 1,
        }

        let profiles = match self.outreach.find(&mut self.browser, &job) {
            Ok(profiles) => profiles,
            Err(err) => {
                warn!(posting_id = %job.posting_id, error = %err, "outreach lookup failed");
                Vec::new()
            }
        };
        for profile in &profiles {
            self.store.append_connection(&profile.to_record(&role.title, "found"))?;
        }

        if self.notifier.notify(&job, &profiles) {
            outcome.notified += 1;
        } else {
            warn!(posting_id = %job.posting_id, "notification failed");
        }
        Ok(PostingOutcome::Accepted)
    }
}

impl<B: Browser> RoleRunner for RolePipeline<B> {
    fn run_role(&mut self, role: &RoleQuery) -> Result<RoleOutcome> {
        self.run(role)
    }
}

/// Card text wins; the detail pane fills in what the card lacked.
fn prefer_card(card: &str, detail: Option<&str>) -> String {
    let card = card.trim();
    if !card.is_empty() {
        return card.to_string();
    }
    detail.map(str::trim).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::Blocklist;
    use crate::config::Prompts;
    use crate::error::BrowserError;
    use crate::fixture::FixtureBrowser;
    use crate::filters::HrGate;
    use crate::models::{OutreachProfile, StopReason};
    use crate::people::{people_search_url, PeopleConfig, PeopleFinder};
    use crate::search::posting_url;
    use crate::sponsorship::{SponsorshipGate, SponsorshipPolicy};
    use crate::testing::{card_html, people_page, person_card_html, results_page, DetailPage, ScriptedLlm};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::Duration;

    const PAGE2: &str = "https://www.linkedin.com/jobs/search/?keywords=next";

    fn role() -> RoleQuery {
        RoleQuery::new("Data Engineer", "United States")
    }

    fn settings() -> Settings {
        Settings::from_lookup(|_| None).unwrap()
    }

    fn build(
        browser: FixtureBrowser,
        llm: &Arc<ScriptedLlm>,
        blocklist: Blocklist,
    ) -> RolePipeline<FixtureBrowser> {
        let s = settings();
        let filters = FilterChain::new(
            blocklist,
            HrGate::new(true, llm.clone(), "gpt-4o-mini", "hr?"),
            SponsorshipGate::new(SponsorshipPolicy::default(), llm.clone(), "gpt-5-nano", "sponsor?"),
        );
        let scorer = ScoringEngine::new(&s, &Prompts::default(), llm.clone());
        let profile = CandidateProfile {
            resume: "Rust, SQL".into(),
            preferences: String::new(),
        };
        RolePipeline::new(browser, &s, filters, scorer, JobStore::open_in_memory().unwrap(), profile)
            .with_pacer(Pacer::none())
            .with_walker_config(WalkerConfig {
                poll_interval: Duration::from_millis(10),
                advance_timeout: Duration::from_millis(50),
                retry_backoff: Duration::ZERO,
                ..walker_config(&s)
            })
            .with_extractor_config(ExtractorConfig {
                poll_interval: Duration::from_millis(10),
                retry_delay: Duration::ZERO,
                ..ExtractorConfig::default()
            })
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: Rc<RefCell<Vec<(String, usize)>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, job: &StoredJob, profiles: &[OutreachProfile]) -> bool {
            self.sent.borrow_mut().push((job.posting_id.clone(), profiles.len()));
            true
        }
    }

    struct OneContact;

    impl<B: Browser> OutreachFinder<B> for OneContact {
        fn find(&self, _browser: &mut B, job: &StoredJob) -> Result<Vec<OutreachProfile>> {
            Ok(vec![OutreachProfile {
                name: "Dana Lee".into(),
                title: "Hiring Manager".into(),
                profile_url: "https://www.linkedin.com/in/dana".into(),
                company: job.company.clone(),
                country: "United States".into(),
                role_match: true,
                message_available: false,
            }])
        }
    }

    fn single_posting_browser(id: &str) -> FixtureBrowser {
        let detail = DetailPage::new("Data Engineer", "Acme", "Build pipelines in Rust.")
            .applicants("12 applicants")
            .posted("1 day ago")
            .render();
        FixtureBrowser::new()
            .with_page(
                build_search_url(&role()),
                results_page(&[card_html(id, "Data Engineer", "Acme")], None, None),
            )
            .with_page(posting_url(id), detail)
    }

    #[test]
    fn test_accepted_posting_is_stored_and_notified() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .reply(r#"{"is_hr_company": false, "reason": "Product company."}"#)
                .reply(r#"{"score": 8.5, "reason": "Strong."}"#)
                .reply(r#"{"score": 9.0, "reason": "Confirmed."}"#),
        );
        let notifier = RecordingNotifier::default();
        let mut pipeline = build(single_posting_browser("101"), &llm, Blocklist::default())
            .with_notifier(Box::new(notifier.clone()))
            .with_outreach(Box::new(OneContact));

        let outcome = pipeline.run(&role()).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.notified, 1);
        assert_eq!(outcome.stop_reason, Some(StopReason::NoNextPage));

        let stored = pipeline.store().get("101").unwrap().unwrap();
        assert_eq!(stored.match_score, 9.0);
        assert_eq!(stored.first_score, 8.5);
        assert!(stored.reranked);
        assert_eq!(stored.applicants, Some(12));
        assert_eq!(stored.posted_date, "1 day ago");
        assert_eq!(stored.source, SOURCE);
        assert_eq!(pipeline.store().list_connections().unwrap().len(), 1);
        assert_eq!(notifier.sent.borrow().as_slice(), &[("101".to_string(), 1)]);
    }

    #[test]
    fn test_people_search_results_are_stored_as_connections() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .reply(r#"{"is_hr_company": false, "reason": "Product company."}"#)
                .reply(r#"{"score": 8.5, "reason": "Strong."}"#)
                .reply(r#"{"score": 9.0, "reason": "Confirmed."}"#),
        );
        let people_url = people_search_url("Data Engineer", "Acme");
        let browser = single_posting_browser("103").with_page(
            &people_url,
            people_page(
                &[
                    person_card_html("dana-lee", "Dana Lee", "Senior Data Engineer", "1st"),
                    person_card_html("sam-roe", "Sam Roe", "Recruiter", "2nd"),
                ],
                None,
            ),
        );
        let finder = PeopleFinder::new(
            SelectorSet::default(),
            PeopleConfig {
                results_timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(10),
                ..PeopleConfig::default()
            },
        );
        let notifier = RecordingNotifier::default();
        let mut pipeline = build(browser, &llm, Blocklist::default())
            .with_notifier(Box::new(notifier.clone()))
            .with_outreach(Box::new(finder));

        let outcome = pipeline.run(&role()).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.stop_reason, Some(StopReason::NoNextPage));

        let connections = pipeline.store().list_connections().unwrap();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].name, "Dana Lee");
        assert_eq!(connections[0].role_searched, "Data Engineer");
        assert!(connections[0].role_match);
        assert!(connections[0].message_available);
        assert!(!connections[1].role_match);
        assert_eq!(notifier.sent.borrow().as_slice(), &[("103".to_string(), 2)]);

        let navigations = pipeline.browser().navigations();
        assert!(navigations.contains(&people_url));
        assert_eq!(navigations.last(), Some(&build_search_url(&role())));
    }

    #[test]
    fn test_below_threshold_is_not_stored() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .reply(r#"{"is_hr_company": false, "reason": "Product company."}"#)
                .reply(r#"{"score": 7.0, "reason": "Partial fit."}"#),
        );
        let mut pipeline = build(single_posting_browser("102"), &llm, Blocklist::default());

        let outcome = pipeline.run(&role()).unwrap();
        assert_eq!(outcome.below_threshold, 1);
        assert_eq!(outcome.inserted, 0);
        assert!(pipeline.store().list(None).unwrap().is_empty());
        assert_eq!(llm.calls(), 2);
    }

    #[test]
    fn test_rejection_streak_stops_before_next_page() {
        let start = build_search_url(&role());
        let cards: Vec<String> = (1..=30)
            .map(|i| card_html(&i.to_string(), "Recruiter Role", "Agency Co"))
            .collect();
        let mut browser = FixtureBrowser::new().with_page(&start, results_page(&cards, Some(PAGE2), None));
        for i in 1..=30 {
            browser = browser.with_page(
                posting_url(&i.to_string()),
                DetailPage::new("Recruiter Role", "Agency Co", "Placement work.").render(),
            );
        }
        browser = browser.with_page(PAGE2, results_page(&[card_html("99", "X", "Y")], None, None));

        let llm = Arc::new(ScriptedLlm::new());
        let mut pipeline = build(browser, &llm, Blocklist::from_parts(vec!["Agency Co".into()], vec![]));
        let outcome = pipeline.run(&role()).unwrap();

        assert_eq!(outcome.rejected, 25);
        assert_eq!(outcome.stop_reason, Some(StopReason::RejectionStreak));
        assert!(!pipeline.browser().navigations().iter().any(|url| url == PAGE2));
        assert!(!pipeline.browser().navigations().contains(&posting_url("26")));
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_applicant_cap_and_seen_cards() {
        let start = build_search_url(&role());
        let seen_card = card_html("2", "Analyst", "Beta").replace(
            "jobs-search-results__list-item",
            "jobs-search-results__list-item job-card-container--visited",
        );
        let browser = FixtureBrowser::new()
            .with_page(&start, results_page(&[card_html("1", "Analyst", "Acme"), seen_card], None, None))
            .with_page(
                posting_url("1"),
                DetailPage::new("Analyst", "Acme", "desc").applicants("450 applicants").render(),
            );
        let llm = Arc::new(ScriptedLlm::new());
        let mut pipeline = build(browser, &llm, Blocklist::default());

        let outcome = pipeline.run(&role()).unwrap();
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.skipped_seen, 1);
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_extraction_failure_skips_posting() {
        let start = build_search_url(&role());
        let browser = FixtureBrowser::new()
            .with_page(&start, results_page(&[card_html("5", "Analyst", "Acme")], None, None))
            .with_page(posting_url("5"), "<html><body>Please sign in</body></html>");
        let llm = Arc::new(ScriptedLlm::new());
        let mut pipeline = build(browser, &llm, Blocklist::default());

        let outcome = pipeline.run(&role()).unwrap();
        assert_eq!(outcome.extract_failures, 1);
        assert_eq!(outcome.inserted, 0);
    }

    #[test]
    fn test_lost_session_fails_role() {
        let start = build_search_url(&role());
        let browser = FixtureBrowser::new()
            .with_page(&start, results_page(&[card_html("5", "Analyst", "Acme")], None, None));
        browser.fail_next(1, BrowserError::SessionLost("chrome exited".into()));
        let llm = Arc::new(ScriptedLlm::new());
        let mut pipeline = build(browser, &llm, Blocklist::default());
        assert!(pipeline.run(&role()).is_err());
    }

    #[test]
    fn test_prefer_card() {
        assert_eq!(prefer_card("Acme", Some("Other")), "Acme");
        assert_eq!(prefer_card("  ", Some(" Other ")), "Other");
        assert_eq!(prefer_card("", None), "");
    }
}
