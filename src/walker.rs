use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{first_text_within, retry_transient, Browser, BrowserResult, PageElement, ScrollTarget};
use crate::error::BrowserError;
use crate::models::{PostingSummary, StopReason};
use crate::search::{clean_tracking_url, posting_id_from_url, posting_url};
use crate::selectors::SelectorSet;

static VIEWED_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bviewed\b").expect("valid regex"));
static PAGE_STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)page\s+(\d+)\s+of\s+(\d+)").expect("valid regex"));
static RESULTS_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d,]+)\+?\s+results?").expect("valid regex"));
static TRAILING_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*$").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Stop loading more cards once this many are on the page
    pub target_cards: usize,
    /// Load rounds in a row without a new card before giving up on a page
    pub stagnation_rounds: u32,
    pub max_scroll_rounds: u32,
    pub advance_attempts: u32,
    pub advance_timeout: Duration,
    pub poll_interval: Duration,
    pub rejection_streak_limit: u32,
    /// Consecutive pages without an accepted posting; 0 disables
    pub no_match_pages_limit: u32,
    pub max_pages: u32,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            target_cards: 25,
            stagnation_rounds: 4,
            max_scroll_rounds: 24,
            advance_attempts: 3,
            advance_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            rejection_streak_limit: 25,
            no_match_pages_limit: 8,
            max_pages: 40,
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(300),
        }
    }
}

/// One results page worth of new postings, in DOM order.
#[derive(Debug, Clone)]
pub struct PageBatch {
    pub page: u32,
    pub postings: Vec<PostingSummary>,
    pub total_results: Option<u32>,
    pub page_state: Option<(u32, u32)>,
}

/// What the caller did with a posting; drives the early-exit heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingOutcome {
    Accepted,
    Rejected,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    NotStarted,
    OnPage,
    Finished(StopReason),
}

/// Walks the paginated results for one role.
///
/// The walker holds no browser; every call borrows the session so the
/// extractor can use it between batches.
pub struct PageWalker {
    role: String,
    start_url: String,
    results_url: String,
    selectors: SelectorSet,
    config: WalkerConfig,
    state: WalkState,
    page: u32,
    seen_keys: HashSet<String>,
    rejection_streak: u32,
    page_accepted: u32,
    no_match_pages: u32,
}

impl PageWalker {
    pub fn new(
        role: impl Into<String>,
        start_url: impl Into<String>,
        selectors: SelectorSet,
        config: WalkerConfig,
    ) -> Self {
        let start_url = start_url.into();
        Self {
            role: role.into(),
            results_url: start_url.clone(),
            start_url,
            selectors,
            config,
            state: WalkState::NotStarted,
            page: 0,
            seen_keys: HashSet::new(),
            rejection_streak: 0,
            page_accepted: 0,
            no_match_pages: 0,
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.state {
            WalkState::Finished(reason) => Some(reason),
            _ => None,
        }
    }

    /// Feed back what happened to one posting. Returns `false` once the
    /// rejection streak says the rest of this role is not worth walking.
    pub fn record_outcome(&mut self, outcome: PostingOutcome) -> bool {
        match outcome {
            PostingOutcome::Accepted => {
                self.rejection_streak = 0;
                self.page_accepted += 1;
            }
            PostingOutcome::Rejected => self.rejection_streak += 1,
            PostingOutcome::Skipped => {}
        }
        !self.streak_exhausted()
    }

    fn streak_exhausted(&self) -> bool {
        self.config.rejection_streak_limit > 0
            && self.rejection_streak >= self.config.rejection_streak_limit
    }

    fn finish(&mut self, reason: StopReason) {
        info!(role = %self.role, page = self.page, %reason, "walk finished");
        self.state = WalkState::Finished(reason);
    }

    /// Non-fatal failures end the walk; a lost session propagates.
    fn absorb(&mut self, err: BrowserError) -> Result<Option<PageBatch>, BrowserError> {
        if err.is_fatal() {
            self.state = WalkState::Finished(StopReason::LoadFailed);
            return Err(err);
        }
        warn!(role = %self.role, page = self.page, error = %err, "results page failed; treating as end of results");
        self.finish(StopReason::LoadFailed);
        Ok(None)
    }

    /// Load and return the next page of unseen postings, or `None` once a
    /// stop condition holds.
    pub fn next_batch<B: Browser>(&mut self, browser: &mut B) -> Result<Option<PageBatch>, BrowserError> {
        match self.state {
            WalkState::Finished(_) => return Ok(None),
            WalkState::NotStarted => {
                let url = self.start_url.clone();
                let attempts = self.config.retry_attempts;
                let backoff = self.config.retry_backoff;
                if let Err(err) = retry_transient(attempts, backoff, || browser.navigate(&url)) {
                    return self.absorb(err);
                }
                self.page = 1;
                self.state = WalkState::OnPage;
            }
            WalkState::OnPage => {
                if let Some(reason) = self.end_of_page() {
                    self.finish(reason);
                    return Ok(None);
                }
                match self.advance(browser) {
                    Ok(true) => self.page += 1,
                    Ok(false) => return Ok(None),
                    Err(err) => return self.absorb(err),
                }
            }
        }

        self.page_accepted = 0;
        let cards = match self.load_cards(browser) {
            Ok(cards) => cards,
            Err(err) => return self.absorb(err),
        };
        if cards.is_empty() {
            self.finish(StopReason::NoCards);
            return Ok(None);
        }

        let found = cards.len();
        let postings: Vec<PostingSummary> = cards
            .into_iter()
            .filter(|card| self.seen_keys.insert(card.posting_id.clone()))
            .collect();
        if postings.is_empty() {
            self.finish(StopReason::AllDuplicates);
            return Ok(None);
        }

        let page_state = self.read_page_state(browser).and_then(|text| parse_page_state(&text));
        let total_results = self.read_results_count(browser);
        info!(
            role = %self.role,
            page = self.page,
            found,
            new = postings.len(),
            total = ?total_results,
            "results page loaded"
        );

        Ok(Some(PageBatch {
            page: self.page,
            postings,
            total_results,
            page_state,
        }))
    }

    /// Bookkeeping when the caller is done with a page; returns a stop reason
    /// if the walk should not continue.
    fn end_of_page(&mut self) -> Option<StopReason> {
        if self.streak_exhausted() {
            return Some(StopReason::RejectionStreak);
        }
        if self.page_accepted == 0 {
            self.no_match_pages += 1;
        } else {
            self.no_match_pages = 0;
        }
        if self.config.no_match_pages_limit > 0
            && self.no_match_pages >= self.config.no_match_pages_limit
        {
            return Some(StopReason::NoMatchPages);
        }
        if self.config.max_pages > 0 && self.page >= self.config.max_pages {
            return Some(StopReason::PageCap);
        }
        None
    }

    /// Return the session to this walk's results page if it has wandered off.
    pub fn settle<B: Browser>(&self, browser: &mut B) -> BrowserResult<()> {
        let current = browser.current_url()?;
        if !same_results_page(&current, &self.results_url) {
            debug!(from = %current, to = %self.results_url, "settling back to results page");
            browser.navigate(&self.results_url)?;
        }
        Ok(())
    }

    // --- Loading ---

    fn load_cards<B: Browser>(&self, browser: &mut B) -> BrowserResult<Vec<PostingSummary>> {
        let cards_sel = self.selectors.cards.clone();
        browser.wait_until(
            self.config.poll_interval * 6,
            self.config.poll_interval,
            &mut |b: &mut B| match b.find_all(&cards_sel) {
                Ok(found) => Ok(!found.is_empty()),
                Err(err) if err.is_transient() => Ok(false),
                Err(err) => Err(err),
            },
        )?;

        let mut ordered = Vec::new();
        let mut keys = HashSet::new();
        let mut stagnant = 0;
        let mut rounds = 0;

        loop {
            let added = self.collect_cards(browser, &mut ordered, &mut keys)?;
            if ordered.len() >= self.config.target_cards {
                break;
            }
            if added == 0 {
                stagnant += 1;
                if stagnant >= self.config.stagnation_rounds {
                    debug!(cards = ordered.len(), "card loading stagnated");
                    break;
                }
            } else {
                stagnant = 0;
            }
            rounds += 1;
            if rounds >= self.config.max_scroll_rounds {
                break;
            }
            match browser.scroll_to(ScrollTarget::Bottom) {
                Ok(()) => {}
                Err(err) if err.is_transient() => debug!(error = %err, "scroll failed"),
                Err(err) => return Err(err),
            }
        }

        Ok(ordered)
    }

    fn collect_cards<B: Browser>(
        &self,
        browser: &B,
        ordered: &mut Vec<PostingSummary>,
        keys: &mut HashSet<String>,
    ) -> BrowserResult<usize> {
        let elements = retry_transient(self.config.retry_attempts, self.config.retry_backoff, || {
            browser.find_all(&self.selectors.cards)
        })?;

        let mut added = 0;
        for element in elements {
            let card = match self.parse_card(&element) {
                Ok(Some(card)) => card,
                Ok(None) => continue,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(error = %err, "skipping unreadable card");
                    continue;
                }
            };
            if keys.insert(card.posting_id.clone()) {
                ordered.push(card);
                added += 1;
            }
        }
        Ok(added)
    }

    fn parse_card<E: PageElement>(&self, card: &E) -> BrowserResult<Option<PostingSummary>> {
        let link = card.find_within(&self.selectors.card_link)?.into_iter().next();
        let href = match &link {
            Some(link) => link.attr("href")?,
            None => None,
        };
        let text = card.text()?;

        let Some(posting_id) = card_key(card, href.as_deref(), &text)? else {
            return Ok(None);
        };

        let title = match first_text_within(card, &self.selectors.card_title)? {
            Some(title) => title,
            None => match &link {
                Some(link) => {
                    let text = link.text()?.trim().to_string();
                    if text.is_empty() {
                        link.attr("aria-label")?.unwrap_or_default()
                    } else {
                        text
                    }
                }
                None => String::new(),
            },
        };
        let company = first_text_within(card, &self.selectors.card_company)?.unwrap_or_default();
        let location = first_text_within(card, &self.selectors.card_location)?.unwrap_or_default();

        let source_url = if posting_id.chars().all(|c| c.is_ascii_digit()) {
            posting_url(&posting_id)
        } else {
            href.as_deref()
                .and_then(clean_tracking_url)
                .unwrap_or_else(|| self.results_url.clone())
        };

        let seen_indicator = self.seen_indicator(card, link.as_ref(), &text)?;
        if let Some(indicator) = &seen_indicator {
            debug!(posting_id = %posting_id, indicator = %indicator, "card already seen");
        }

        Ok(Some(PostingSummary {
            posting_id,
            title,
            company,
            location,
            source_url,
            already_seen: seen_indicator.is_some(),
            seen_indicator,
        }))
    }

    /// First matching seen marker: class, then data attribute, then text.
    fn seen_indicator<E: PageElement>(
        &self,
        card: &E,
        link: Option<&E>,
        text: &str,
    ) -> BrowserResult<Option<String>> {
        let mut classes = card.attr("class")?.unwrap_or_default();
        if let Some(link) = link {
            classes.push(' ');
            classes.push_str(&link.attr("class")?.unwrap_or_default());
        }
        let tokens: HashSet<&str> = classes.split_whitespace().collect();
        if let Some(marker) = self
            .selectors
            .seen_classes
            .iter()
            .find(|marker| tokens.contains(marker.as_str()))
        {
            return Ok(Some(format!("has '{}' class", marker)));
        }

        let mut data_viewed = card.attr("data-viewed")?;
        if data_viewed.is_none() {
            if let Some(link) = link {
                data_viewed = link.attr("data-viewed")?;
            }
        }
        if let Some(value) = data_viewed {
            if matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes") {
                return Ok(Some("data-viewed=true".to_string()));
            }
        }

        if VIEWED_TEXT_RE.is_match(text) {
            return Ok(Some("text contains 'viewed'".to_string()));
        }
        Ok(None)
    }

    // --- Pagination ---

    fn read_page_state<B: Browser>(&self, browser: &B) -> Option<String> {
        crate::browser::first_text(browser, &self.selectors.page_state)
            .ok()
            .flatten()
    }

    fn read_results_count<B: Browser>(&self, browser: &B) -> Option<u32> {
        let text = crate::browser::first_text(browser, &self.selectors.results_count)
            .ok()
            .flatten()?;
        let caps = RESULTS_COUNT_RE.captures(&text)?;
        caps[1].replace(',', "").parse().ok()
    }

    /// Click the next-page control and wait for the page state or URL to
    /// change. Returns `Ok(false)` with the walk finished when it cannot.
    fn advance<B: Browser>(&mut self, browser: &mut B) -> BrowserResult<bool> {
        self.settle(browser)?;
        let before_url = browser.current_url()?;
        let before_state = self.read_page_state(browser);
        let next_sel = self.selectors.next_page.clone();
        let state_sel = self.selectors.page_state.clone();

        for attempt in 1..=self.config.advance_attempts {
            let button = match browser.find_one(&next_sel) {
                Ok(Some(button)) => button,
                Ok(None) if attempt == 1 => {
                    self.finish(StopReason::NoNextPage);
                    return Ok(false);
                }
                Ok(None) => continue,
                Err(err) if err.is_transient() => continue,
                Err(err) => return Err(err),
            };
            if is_disabled(&button)? {
                self.finish(StopReason::NoNextPage);
                return Ok(false);
            }

            match browser.click(&button) {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    debug!(attempt, error = %err, "next-page click failed");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let confirmed = browser.wait_until(
                self.config.advance_timeout,
                self.config.poll_interval,
                &mut |b: &mut B| {
                    if b.current_url()? != before_url {
                        return Ok(true);
                    }
                    let state = crate::browser::first_text(b, &state_sel).ok().flatten();
                    Ok(state.is_some() && state != before_state)
                },
            )?;
            if confirmed {
                self.results_url = browser.current_url()?;
                debug!(role = %self.role, page = self.page + 1, url = %self.results_url, "advanced to next page");
                return Ok(true);
            }
            debug!(attempt, "next-page advance not confirmed");
        }

        self.finish(StopReason::AdvanceUnconfirmed);
        Ok(false)
    }
}

pub(crate) fn is_disabled<E: PageElement>(element: &E) -> BrowserResult<bool> {
    if element.attr("disabled")?.is_some() {
        return Ok(true);
    }
    Ok(element
        .attr("aria-disabled")?
        .is_some_and(|v| v.eq_ignore_ascii_case("true")))
}

/// Composite dedup key: explicit id attribute, else the id in the link,
/// else a hash of the card's text.
fn card_key<E: PageElement>(card: &E, href: Option<&str>, text: &str) -> BrowserResult<Option<String>> {
    for attr in ["data-job-id", "data-occludable-job-id", "data-entity-urn"] {
        if let Some(value) = card.attr(attr)? {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            // urn:li:jobPosting:123 -> 123
            let id = TRAILING_DIGITS_RE
                .captures(value)
                .map(|caps| caps[1].to_string())
                .unwrap_or_else(|| value.to_string());
            return Ok(Some(id));
        }
    }
    if let Some(id) = href.and_then(posting_id_from_url) {
        return Ok(Some(id));
    }
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Ok(None);
    }
    let digest = Sha256::digest(normalized.as_bytes());
    Ok(Some(format!("h-{}", &hex::encode(digest)[..16])))
}

fn parse_page_state(text: &str) -> Option<(u32, u32)> {
    let caps = PAGE_STATE_RE.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Results URLs match when they differ only in the selected posting.
fn same_results_page(a: &str, b: &str) -> bool {
    fn normalize(raw: &str) -> String {
        match Url::parse(raw) {
            Ok(mut url) => {
                let pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| k != "currentJobId")
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                url.set_fragment(None);
                if pairs.is_empty() {
                    url.set_query(None);
                } else {
                    url.query_pairs_mut().clear().extend_pairs(pairs);
                }
                url.to_string()
            }
            Err(_) => raw.to_string(),
        }
    }
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureBrowser;
    use crate::testing::{card_html, results_page};

    const START: &str = "https://www.linkedin.com/jobs/search/?keywords=rust";
    const PAGE2: &str = "https://www.linkedin.com/jobs/search/?keywords=rust&start=25";

    fn walker() -> PageWalker {
        let config = WalkerConfig {
            poll_interval: Duration::from_millis(10),
            advance_timeout: Duration::from_millis(50),
            retry_backoff: Duration::ZERO,
            no_match_pages_limit: 0,
            ..WalkerConfig::default()
        };
        PageWalker::new("Rust Engineer", START, SelectorSet::default(), config)
    }

    fn ids(batch: &PageBatch) -> Vec<&str> {
        batch.postings.iter().map(|p| p.posting_id.as_str()).collect()
    }

    fn drain(walker: &mut PageWalker, browser: &mut FixtureBrowser) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(batch) = walker.next_batch(browser).unwrap() {
            out.extend(batch.postings.iter().map(|p| p.posting_id.clone()));
            for _ in &batch.postings {
                walker.record_outcome(PostingOutcome::Accepted);
            }
        }
        out
    }

    #[test]
    fn test_dedup_across_scrolls_and_pages() {
        let page1 = vec![
            results_page(&[card_html("1", "A", "Acme"), card_html("2", "B", "Beta")], Some(PAGE2), Some("Page 1 of 2")),
            results_page(
                &[card_html("1", "A", "Acme"), card_html("2", "B", "Beta"), card_html("3", "C", "Core")],
                Some(PAGE2),
                Some("Page 1 of 2"),
            ),
        ];
        let page2 = results_page(
            &[card_html("3", "C", "Core"), card_html("4", "D", "Delta"), card_html("2", "B", "Beta")],
            None,
            Some("Page 2 of 2"),
        );
        let mut browser = FixtureBrowser::new()
            .with_snapshots(START, page1)
            .with_page(PAGE2, page2);
        let mut walker = walker();

        let batch = walker.next_batch(&mut browser).unwrap().unwrap();
        assert_eq!(ids(&batch), vec!["1", "2", "3"]);
        assert_eq!(batch.page_state, Some((1, 2)));

        let batch = walker.next_batch(&mut browser).unwrap().unwrap();
        assert_eq!(ids(&batch), vec!["4"]);
        assert_eq!(batch.page, 2);

        assert!(walker.next_batch(&mut browser).unwrap().is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::NoNextPage));
    }

    #[test]
    fn test_no_cards_stops() {
        let mut browser = FixtureBrowser::new().with_page(START, results_page(&[], None, None));
        let mut walker = walker();
        assert!(walker.next_batch(&mut browser).unwrap().is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::NoCards));
    }

    #[test]
    fn test_load_failure_is_end_of_results() {
        let mut browser = FixtureBrowser::new();
        let mut walker = walker();
        assert!(walker.next_batch(&mut browser).unwrap().is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::LoadFailed));
    }

    #[test]
    fn test_lost_session_propagates() {
        let mut browser = FixtureBrowser::new().with_page(START, results_page(&[], None, None));
        browser.fail_next(1, BrowserError::SessionLost("gone".into()));
        let mut walker = walker();
        assert!(matches!(
            walker.next_batch(&mut browser),
            Err(BrowserError::SessionLost(_))
        ));
    }

    #[test]
    fn test_transient_errors_retried() {
        let mut browser = FixtureBrowser::new()
            .with_page(START, results_page(&[card_html("7", "G", "Gamma")], None, None));
        browser.fail_next(2, BrowserError::Stale);
        let mut walker = walker();
        let batch = walker.next_batch(&mut browser).unwrap().unwrap();
        assert_eq!(ids(&batch), vec!["7"]);
    }

    #[test]
    fn test_unconfirmed_advance_stops() {
        // next button with nowhere to go: neither URL nor page state changes
        let html = results_page(&[card_html("1", "A", "Acme")], Some(""), Some("Page 1 of 3"));
        let mut browser = FixtureBrowser::new().with_page(START, html);
        let mut walker = walker();
        assert_eq!(drain(&mut walker, &mut browser), vec!["1"]);
        assert_eq!(walker.stop_reason(), Some(StopReason::AdvanceUnconfirmed));
        assert_eq!(browser.clicks(), 3);
    }

    #[test]
    fn test_advance_confirmed_by_page_state_alone() {
        // client-side pagination: the URL never changes, only the indicator
        let page1 = results_page(&[card_html("1", "A", "Acme")], Some("inplace-2"), Some("Page 1 of 3"))
            .replace("data-href=", "data-render=");
        let page2 = results_page(&[card_html("2", "B", "Beta")], None, Some("Page 2 of 3"));
        let mut browser = FixtureBrowser::new()
            .with_page(START, page1)
            .with_page("inplace-2", page2);
        let mut walker = walker();

        assert_eq!(drain(&mut walker, &mut browser), vec!["1", "2"]);
        assert_eq!(walker.stop_reason(), Some(StopReason::NoNextPage));
        assert_eq!(browser.navigations(), &[START.to_string()]);
        assert_eq!(browser.current_url().unwrap(), START);
    }

    #[test]
    fn test_page_that_never_grows_stops_scrolling() {
        let html = results_page(&[card_html("1", "A", "Acme")], None, None);
        let mut browser = FixtureBrowser::new().with_page(START, html);
        let mut walker = walker();

        let batch = walker.next_batch(&mut browser).unwrap().unwrap();
        assert_eq!(ids(&batch), vec!["1"]);
        // one scroll after the first read, then one per stagnant round until the fourth
        assert_eq!(browser.scrolls(), 4);
    }

    #[test]
    fn test_repeated_page_stops() {
        let page1 = results_page(&[card_html("1", "A", "Acme")], Some(PAGE2), Some("Page 1 of 3"));
        let page2 = results_page(&[card_html("1", "A", "Acme")], Some(START), Some("Page 2 of 3"));
        let mut browser = FixtureBrowser::new().with_page(START, page1).with_page(PAGE2, page2);
        let mut walker = walker();
        assert_eq!(drain(&mut walker, &mut browser), vec!["1"]);
        assert_eq!(walker.stop_reason(), Some(StopReason::AllDuplicates));
    }

    #[test]
    fn test_page_cap() {
        let page1 = results_page(&[card_html("1", "A", "Acme")], Some(PAGE2), None);
        let page2 = results_page(&[card_html("2", "B", "Beta")], Some(START), None);
        let mut browser = FixtureBrowser::new().with_page(START, page1).with_page(PAGE2, page2);
        let mut walker = walker();
        walker.config.max_pages = 1;
        assert_eq!(drain(&mut walker, &mut browser), vec!["1"]);
        assert_eq!(walker.stop_reason(), Some(StopReason::PageCap));
    }

    #[test]
    fn test_rejection_streak_stops_before_next_page() {
        let cards: Vec<String> = (1..=30)
            .map(|i| card_html(&i.to_string(), "Role", "Corp"))
            .collect();
        let mut browser = FixtureBrowser::new()
            .with_page(START, results_page(&cards, Some(PAGE2), None))
            .with_page(PAGE2, results_page(&[card_html("99", "Z", "Zed")], None, None));
        let mut walker = walker();

        let batch = walker.next_batch(&mut browser).unwrap().unwrap();
        let mut processed = 0;
        for _ in &batch.postings {
            processed += 1;
            if !walker.record_outcome(PostingOutcome::Rejected) {
                break;
            }
        }
        assert_eq!(processed, 25);
        assert!(walker.next_batch(&mut browser).unwrap().is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::RejectionStreak));
        assert!(!browser.navigations().iter().any(|u| u == PAGE2));
    }

    #[test]
    fn test_accept_resets_streak() {
        let mut walker = walker();
        for _ in 0..24 {
            assert!(walker.record_outcome(PostingOutcome::Rejected));
        }
        assert!(walker.record_outcome(PostingOutcome::Accepted));
        for _ in 0..24 {
            assert!(walker.record_outcome(PostingOutcome::Rejected));
        }
        assert!(walker.record_outcome(PostingOutcome::Skipped));
        assert!(!walker.record_outcome(PostingOutcome::Rejected));
    }

    #[test]
    fn test_no_match_pages_limit() {
        let page1 = results_page(&[card_html("1", "A", "Acme")], Some(PAGE2), None);
        let page2 = results_page(&[card_html("2", "B", "Beta")], Some(START), None);
        let mut browser = FixtureBrowser::new().with_page(START, page1).with_page(PAGE2, page2);
        let mut walker = walker();
        walker.config.no_match_pages_limit = 1;
        walker.config.rejection_streak_limit = 0;

        let batch = walker.next_batch(&mut browser).unwrap().unwrap();
        walker.record_outcome(PostingOutcome::Rejected);
        assert_eq!(batch.page, 1);
        assert!(walker.next_batch(&mut browser).unwrap().is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::NoMatchPages));
    }

    #[test]
    fn test_seen_indicators() {
        let cards = vec![
            r#"<li data-job-id="1" class="job-card-container job-card-container--visited"><a href="/jobs/view/1/">One</a></li>"#.to_string(),
            r#"<li data-job-id="2" data-viewed="true"><a href="/jobs/view/2/">Two</a></li>"#.to_string(),
            r#"<li data-job-id="3"><a href="/jobs/view/3/">Three</a><span>Viewed</span></li>"#.to_string(),
            r#"<li data-job-id="4"><a href="/jobs/view/4/">Four</a><span>Reviewed daily by our team</span></li>"#.to_string(),
        ];
        let mut browser = FixtureBrowser::new().with_page(START, results_page(&cards, None, None));
        let mut walker = walker();
        let batch = walker.next_batch(&mut browser).unwrap().unwrap();
        let indicators: Vec<Option<&str>> = batch
            .postings
            .iter()
            .map(|p| p.seen_indicator.as_deref())
            .collect();
        assert_eq!(
            indicators,
            vec![
                Some("has 'job-card-container--visited' class"),
                Some("data-viewed=true"),
                Some("text contains 'viewed'"),
                None,
            ]
        );
        assert!(batch.postings[0].already_seen);
        assert!(!batch.postings[3].already_seen);
    }

    #[test]
    fn test_card_key_fallbacks() {
        let cards = vec![
            r#"<li data-entity-urn="urn:li:jobPosting:555"><a href="/jobs/view/1/">Urn</a></li>"#.to_string(),
            r#"<li class="job-card-container"><a href="https://www.linkedin.com/jobs/view/777/?trk=x">Link</a></li>"#.to_string(),
            r#"<li class="job-card-container"><span>Mystery posting</span></li>"#.to_string(),
        ];
        let html = format!(
            "<html><body><ul>{}</ul></body></html>",
            cards.join("")
        );
        let mut browser = FixtureBrowser::new().with_page(START, html);
        let mut walker = walker();
        walker.selectors.cards = vec!["li".to_string()];
        let batch = walker.next_batch(&mut browser).unwrap().unwrap();

        assert_eq!(batch.postings[0].posting_id, "555");
        assert_eq!(batch.postings[1].posting_id, "777");
        assert_eq!(
            batch.postings[1].source_url,
            "https://www.linkedin.com/jobs/view/777/"
        );
        assert!(batch.postings[2].posting_id.starts_with("h-"));
        assert_eq!(batch.postings[2].posting_id.len(), 18);
    }

    #[test]
    fn test_settle_ignores_selected_posting() {
        assert!(same_results_page(
            "https://www.linkedin.com/jobs/search/?keywords=rust&currentJobId=9",
            "https://www.linkedin.com/jobs/search/?keywords=rust"
        ));
        assert!(!same_results_page(
            "https://www.linkedin.com/jobs/view/9/",
            "https://www.linkedin.com/jobs/search/?keywords=rust"
        ));
    }

    #[test]
    fn test_parse_page_state() {
        assert_eq!(parse_page_state("Page 3 of 40"), Some((3, 40)));
        assert_eq!(parse_page_state("nothing"), None);
    }
}
