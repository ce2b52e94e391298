//! People search for an accepted posting: who at the hiring company holds
//! the posted role, and which of them can already be messaged.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};
use url::{form_urlencoded, Url};

use crate::browser::{first_text_within, Browser, BrowserResult, PageElement, ScrollTarget};
use crate::config::Settings;
use crate::models::{OutreachProfile, StoredJob};
use crate::notify::OutreachFinder;
use crate::selectors::SelectorSet;
use crate::walker::is_disabled;

pub const PEOPLE_SEARCH_URL: &str = "https://www.linkedin.com/search/results/people/";

#[derive(Debug, Clone)]
pub struct PeopleConfig {
    /// Result pages read per posting
    pub max_pages: u32,
    /// 0 disables the cap
    pub max_profiles: usize,
    pub results_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PeopleConfig {
    fn default() -> Self {
        Self {
            max_pages: 3,
            max_profiles: 30,
            results_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl PeopleConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_pages: settings.connect_pages_limit,
            max_profiles: settings.max_connections_per_job,
            ..Self::default()
        }
    }
}

/// Search URL for "`title` at `company`", form-encoded.
pub fn people_search_url(title: &str, company: &str) -> String {
    let query = format!("{} at {}", title.trim(), company.trim());
    let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("{}?keywords={}", PEOPLE_SEARCH_URL, encoded)
}

/// The headline names the role, case-insensitively. "scientist" also
/// accepts "science", so "Head of Data Science" matches "Data Scientist".
pub fn role_match(headline: &str, role: &str) -> bool {
    let headline = headline.to_lowercase();
    let role = role.trim().to_lowercase();
    if headline.trim().is_empty() || role.is_empty() {
        return false;
    }
    headline.contains(&role)
        || (role.contains("scientist") && headline.contains(&role.replace("scientist", "science")))
}

/// Last comma-separated part of a location, e.g. "Austin, TX, United States".
fn country_of(location: &str) -> String {
    location
        .rsplit(',')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Profile link without tracking parameters, absolute.
fn clean_profile_url(href: &str) -> String {
    match Url::parse(PEOPLE_SEARCH_URL).and_then(|base| base.join(href.trim())) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => href.trim().to_string(),
    }
}

/// Reads the people search results for each accepted posting through the
/// same browser session the walker uses. The walker settles back onto its
/// results page afterwards.
#[derive(Debug, Clone)]
pub struct PeopleFinder {
    selectors: SelectorSet,
    config: PeopleConfig,
}

impl PeopleFinder {
    pub fn new(selectors: SelectorSet, config: PeopleConfig) -> Self {
        Self { selectors, config }
    }

    fn wait_for_cards<B: Browser>(&self, browser: &mut B) -> BrowserResult<bool> {
        let cards = self.selectors.people_cards.clone();
        browser.wait_until(
            self.config.results_timeout,
            self.config.poll_interval,
            &mut |b: &mut B| match b.find_all(&cards) {
                Ok(found) => Ok(!found.is_empty()),
                Err(err) if err.is_transient() => Ok(false),
                Err(err) => Err(err),
            },
        )
    }

    fn read_page<B: Browser>(&self, browser: &B, job: &StoredJob) -> BrowserResult<Vec<OutreachProfile>> {
        let mut profiles = Vec::new();
        for card in browser.find_all(&self.selectors.people_cards)? {
            match self.read_card(&card, job) {
                Ok(Some(profile)) => profiles.push(profile),
                Ok(None) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => debug!(error = %err, "skipping unreadable people card"),
            }
        }
        Ok(profiles)
    }

    fn read_card<E: PageElement>(&self, card: &E, job: &StoredJob) -> BrowserResult<Option<OutreachProfile>> {
        let profile_url = match card.find_within(&self.selectors.people_link)?.first() {
            Some(link) => link.attr("href")?.map(|href| clean_profile_url(&href)).unwrap_or_default(),
            None => String::new(),
        };
        let name = first_text_within(card, &self.selectors.people_name)?.unwrap_or_default();
        let title = first_text_within(card, &self.selectors.people_title)?
            .filter(|t| !t.to_lowercase().contains("mutual connection"))
            .unwrap_or_default();
        if profile_url.is_empty() && name.is_empty() && title.is_empty() {
            return Ok(None);
        }
        let status = first_text_within(card, &self.selectors.people_status)?.unwrap_or_default();

        Ok(Some(OutreachProfile {
            role_match: role_match(&title, &job.title),
            // first-degree connections can be messaged directly
            message_available: status.to_lowercase().contains("1st"),
            name,
            title,
            profile_url,
            company: job.company.clone(),
            country: country_of(&job.location),
        }))
    }

    /// Click the next control and wait for the first card to change.
    fn next_page<B: Browser>(&self, browser: &mut B) -> BrowserResult<bool> {
        let Some(button) = browser.find_one(&self.selectors.people_next)? else {
            debug!("no next button on people search");
            return Ok(false);
        };
        if is_disabled(&button)? {
            return Ok(false);
        }

        let before = first_card_key(browser, &self.selectors)?;
        browser.click(&button)?;
        let selectors = &self.selectors;
        let advanced = browser.wait_until(
            self.config.results_timeout,
            self.config.poll_interval,
            &mut |b: &mut B| match first_card_key(b, selectors) {
                Ok(key) => Ok(key.is_some() && key != before),
                Err(err) if err.is_transient() => Ok(false),
                Err(err) => Err(err),
            },
        )?;
        if !advanced {
            debug!("people search did not advance after next");
        }
        Ok(advanced)
    }
}

fn first_card_key<B: Browser>(browser: &B, selectors: &SelectorSet) -> BrowserResult<Option<String>> {
    let Some(card) = browser.find_one(&selectors.people_cards)? else {
        return Ok(None);
    };
    if let Some(link) = card.find_within(&selectors.people_link)?.first() {
        if let Some(href) = link.attr("href")? {
            return Ok(Some(href));
        }
    }
    Ok(Some(card.text()?))
}

impl<B: Browser> OutreachFinder<B> for PeopleFinder {
    fn find(&self, browser: &mut B, job: &StoredJob) -> Result<Vec<OutreachProfile>> {
        let (title, company) = (job.title.trim(), job.company.trim());
        if title.is_empty() || company.is_empty() {
            info!(posting_id = %job.posting_id, "missing title or company; skipping people search");
            return Ok(Vec::new());
        }

        let url = people_search_url(title, company);
        info!(posting_id = %job.posting_id, query = %format!("{} at {}", title, company), "searching people");
        browser
            .navigate(&url)
            .with_context(|| format!("Could not open people search for '{}'", company))?;

        let mut profiles: Vec<OutreachProfile> = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 0;
        loop {
            page += 1;
            if !self.wait_for_cards(browser)? {
                info!(page, "no people results on page");
                break;
            }
            browser.scroll_to(ScrollTarget::Bottom)?;

            let found = self.read_page(browser, job)?;
            debug!(page, profiles = found.len(), "people page read");
            for profile in found {
                let key = if profile.profile_url.is_empty() {
                    format!("{}|{}", profile.name, profile.title)
                } else {
                    profile.profile_url.clone()
                };
                if seen.insert(key) {
                    profiles.push(profile);
                }
            }

            if self.config.max_profiles > 0 && profiles.len() >= self.config.max_profiles {
                profiles.truncate(self.config.max_profiles);
                break;
            }
            if page >= self.config.max_pages.max(1) || !self.next_page(browser)? {
                break;
            }
        }

        info!(
            posting_id = %job.posting_id,
            profiles = profiles.len(),
            role_matches = profiles.iter().filter(|p| p.role_match).count(),
            pages = page,
            "people search finished"
        );
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowserError;
    use crate::fixture::FixtureBrowser;
    use crate::testing::{people_page, person_card_html, stored_job};

    const PAGE2: &str = "https://www.linkedin.com/search/results/people/?keywords=page2";
    const PAGE3: &str = "https://www.linkedin.com/search/results/people/?keywords=page3";

    fn job() -> StoredJob {
        stored_job("Data Scientist", "Acme", "Austin, Texas, United States")
    }

    fn finder(max_pages: u32, max_profiles: usize) -> PeopleFinder {
        PeopleFinder::new(
            SelectorSet::default(),
            PeopleConfig {
                max_pages,
                max_profiles,
                results_timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(10),
            },
        )
    }

    fn search_url() -> String {
        people_search_url("Data Scientist", "Acme")
    }

    #[test]
    fn test_people_search_url() {
        assert_eq!(
            people_search_url(" Data Engineer ", "Acme & Co"),
            "https://www.linkedin.com/search/results/people/?keywords=Data+Engineer+at+Acme+%26+Co"
        );
    }

    #[test]
    fn test_role_match() {
        assert!(role_match("Senior Data Scientist at Acme", "Data Scientist"));
        assert!(role_match("Director of Data Science", "data scientist"));
        assert!(!role_match("AI Scientist", "Data Scientist"));
        assert!(!role_match("ML Engineer", "Data Scientist"));
        assert!(!role_match("", "Data Scientist"));
        assert!(!role_match("Data Scientist", "  "));
    }

    #[test]
    fn test_country_and_profile_url_cleanup() {
        assert_eq!(country_of("Austin, Texas, United States"), "United States");
        assert_eq!(country_of("Remote"), "Remote");
        assert_eq!(
            clean_profile_url("/in/dana-lee/?miniProfileUrn=abc#top"),
            "https://www.linkedin.com/in/dana-lee/"
        );
    }

    #[test]
    fn test_profiles_read_from_cards() {
        let cards = vec![
            person_card_html("dana-lee", "Dana Lee", "Lead Data Scientist at Acme", "1st"),
            person_card_html("sam-roe", "Sam Roe", "3 mutual connections", "2nd"),
            person_card_html("kim-poe", "Kim Poe", "Head of Data Science", "3rd+"),
        ];
        let mut browser = FixtureBrowser::new().with_page(search_url(), people_page(&cards, None));

        let profiles = finder(3, 30).find(&mut browser, &job()).unwrap();
        assert_eq!(profiles.len(), 3);

        let dana = &profiles[0];
        assert_eq!(dana.name, "Dana Lee");
        assert_eq!(dana.profile_url, "https://www.linkedin.com/in/dana-lee/");
        assert_eq!(dana.company, "Acme");
        assert_eq!(dana.country, "United States");
        assert!(dana.role_match);
        assert!(dana.message_available);

        assert_eq!(profiles[1].title, "");
        assert!(!profiles[1].role_match);
        assert!(!profiles[1].message_available);
        assert!(profiles[2].role_match);
        assert_eq!(browser.navigations(), &[search_url()]);
    }

    #[test]
    fn test_pagination_stops_at_page_limit() {
        let mut browser = FixtureBrowser::new()
            .with_page(
                search_url(),
                people_page(&[person_card_html("a", "A", "Data Scientist", "2nd")], Some(PAGE2)),
            )
            .with_page(
                PAGE2,
                people_page(&[person_card_html("b", "B", "Data Scientist", "2nd")], Some(PAGE3)),
            )
            .with_page(
                PAGE3,
                people_page(&[person_card_html("c", "C", "Data Scientist", "2nd")], None),
            );

        let profiles = finder(2, 30).find(&mut browser, &job()).unwrap();
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(!browser.navigations().iter().any(|url| url == PAGE3));
    }

    #[test]
    fn test_disabled_next_ends_search() {
        let mut browser = FixtureBrowser::new().with_page(
            search_url(),
            people_page(&[person_card_html("a", "A", "Analyst", "2nd")], Some("")),
        );
        let profiles = finder(3, 30).find(&mut browser, &job()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(browser.clicks(), 0);
    }

    #[test]
    fn test_profile_cap() {
        let cards: Vec<String> = (1..=5)
            .map(|i| person_card_html(&format!("p{}", i), &format!("P{}", i), "Data Scientist", "2nd"))
            .collect();
        let mut browser = FixtureBrowser::new().with_page(search_url(), people_page(&cards, Some(PAGE2)));
        let profiles = finder(3, 3).find(&mut browser, &job()).unwrap();
        assert_eq!(profiles.len(), 3);
        assert_eq!(browser.clicks(), 0);
    }

    #[test]
    fn test_empty_results_page() {
        let mut browser = FixtureBrowser::new().with_page(search_url(), people_page(&[], None));
        assert!(finder(3, 30).find(&mut browser, &job()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_company_skips_search() {
        let mut browser = FixtureBrowser::new();
        let job = stored_job("Data Scientist", "  ", "Remote");
        assert!(finder(3, 30).find(&mut browser, &job).unwrap().is_empty());
        assert!(browser.navigations().is_empty());
    }

    #[test]
    fn test_lost_session_is_an_error() {
        let mut browser = FixtureBrowser::new().with_page(search_url(), people_page(&[], None));
        browser.fail_next(1, BrowserError::SessionLost("chrome exited".into()));
        assert!(finder(3, 30).find(&mut browser, &job()).is_err());
    }
}
