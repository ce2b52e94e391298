//! Ordered CSS selector strategies for each extraction point.
//!
//! The listing site reshuffles its markup often, so every lookup is a list
//! tried in order; the first selector that matches wins. The defaults can be
//! overridden per field from a `selectors.json` file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    pub cards: Vec<String>,
    pub card_link: Vec<String>,
    pub card_title: Vec<String>,
    pub card_company: Vec<String>,
    pub card_location: Vec<String>,
    pub seen_classes: Vec<String>,
    pub next_page: Vec<String>,
    pub page_state: Vec<String>,
    pub results_count: Vec<String>,

    pub details_ready: Vec<String>,
    pub detail_title: Vec<String>,
    pub detail_company: Vec<String>,
    pub description: Vec<String>,
    pub show_more: Vec<String>,
    pub insight_chips: Vec<String>,
    pub posted_time: Vec<String>,
    pub applicants: Vec<String>,
    pub workplace_type: Vec<String>,

    pub people_cards: Vec<String>,
    pub people_link: Vec<String>,
    pub people_name: Vec<String>,
    pub people_title: Vec<String>,
    pub people_status: Vec<String>,
    pub people_next: Vec<String>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            cards: list(&[
                "[data-job-id]",
                "article[data-job-id]",
                "div[data-view-id='job-card']",
                "div.job-card-container",
                "div.base-card",
                "li.jobs-search-results__list-item",
                "li.scaffold-layout__list-item",
                "ul.jobs-search__results-list > li",
            ]),
            card_link: list(&[
                "a.job-card-list__title",
                "a.job-card-container__link",
                "a[data-job-id]",
                "a[href*='/jobs/view/']",
                "a",
            ]),
            card_title: list(&[
                "a.job-card-list__title",
                ".job-card-list__title",
                ".artdeco-entity-lockup__title",
                "h3",
            ]),
            card_company: list(&[
                ".job-card-container__company-name",
                ".artdeco-entity-lockup__subtitle",
                ".job-card-container__primary-description",
                "h4",
            ]),
            card_location: list(&[
                ".job-card-container__metadata-item",
                ".artdeco-entity-lockup__caption",
                ".job-card-container__metadata-wrapper",
            ]),
            seen_classes: list(&[
                "job-card-container--visited",
                "job-card-list--visited",
                "job-card-container--is-viewed",
                "is-dismissed",
                "visited",
                "seen",
            ]),
            next_page: list(&[
                "button.jobs-search-pagination__button--next",
                "button[aria-label='View next page']",
                "button[aria-label='Next']",
                "li.artdeco-pagination__indicator--number + li button",
            ]),
            page_state: list(&[
                "p.jobs-search-pagination__page-state",
                "div.jobs-search-pagination__page-state",
                "div[data-test-pagination-page-state]",
            ]),
            results_count: list(&[
                "div.jobs-search-results-list__subtitle",
                "small.jobs-search-results-list__text",
                "span.results-context-header__job-count",
            ]),

            details_ready: list(&[
                "div.jobs-search__job-details--container",
                "div.job-details-jobs-unified-top-card__container--two-pane",
                "div.jobs-details__main-content",
                "div.jobs-description__content",
                "section.description",
            ]),
            detail_title: list(&[
                "div.job-details-jobs-unified-top-card__job-title h1 a",
                "h1.job-details-jobs-unified-top-card__job-title",
                "h1.jobs-unified-top-card__job-title",
                "h1.top-card-layout__title",
                "h1",
            ]),
            detail_company: list(&[
                "div.job-details-jobs-unified-top-card__company-name a",
                "div.job-details-jobs-unified-top-card__company-name",
                "a.jobs-unified-top-card__company-name",
                "span.jobs-unified-top-card__company-name",
                "a.topcard__org-name-link",
            ]),
            description: list(&[
                "div.show-more-less-html__markup",
                "div.jobs-box__html-content",
                "div.jobs-description__content",
                "div.jobs-description-content__text",
                "#job-details",
                "article.jobs-description",
            ]),
            show_more: list(&[
                "button.show-more-less-html__button--more",
                "button.jobs-description__footer-button",
                "button[aria-label*='Show more']",
                "button[aria-label*='See more']",
                "button[aria-label*='more']",
            ]),
            insight_chips: list(&[
                ".jobs-unified-top-card__job-insight",
                ".job-details-jobs-unified-top-card__job-insight",
                ".jobs-unified-top-card__job-insight-view-model-secondary",
                "li.description__job-criteria-item",
                "span.ui-label",
            ]),
            posted_time: list(&[
                ".jobs-unified-top-card__posted-date",
                ".job-details-jobs-unified-top-card__primary-description",
                ".jobs-unified-top-card__subtitle",
                "span.posted-time-ago__text",
                "span.tvm__text--low-emphasis",
            ]),
            applicants: list(&[
                ".jobs-unified-top-card__applicant-count",
                ".jobs-unified-top-card__bullet",
                "span.num-applicants__caption",
                "span.tvm__text--low-emphasis",
                ".job-details-jobs-unified-top-card__primary-description",
            ]),
            workplace_type: list(&[
                ".jobs-unified-top-card__workplace-type",
                ".job-details-jobs-unified-top-card__workplace-type",
            ]),

            people_cards: list(&[
                "[data-view-name='people-search-result']",
                "li.reusable-search__result-container",
                "div.reusable-search__result-container",
                "div.search-result__occluded-item",
                "div.entity-result",
                "div.search-result__info",
            ]),
            people_link: list(&[
                "a[data-view-name='search-result-lockup-title']",
                "a.app-aware-link",
                "a[href*='/in/']",
            ]),
            people_name: list(&[
                "a[data-view-name='search-result-lockup-title']",
                "span.entity-result__title-text span[aria-hidden='true']",
                "span[dir='ltr']",
            ]),
            people_title: list(&[
                "p[data-view-name='search-result-subtitle']",
                "div.entity-result__primary-subtitle",
                "div.entity-result__secondary-subtitle",
            ]),
            people_status: list(&[
                "span.entity-result__badge-text",
                "span.entity-result__badge",
                "span[data-test-entity-result-badge]",
                "span.artdeco-entity-lockup__subtitle",
            ]),
            people_next: list(&[
                "button[aria-label='Next']",
                "button.artdeco-pagination__button--next",
            ]),
        }
    }
}

impl SelectorSet {
    /// Defaults, with any field present in the JSON file at `path` replaced.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read selectors file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid selectors file: {}", path.display()))
    }

    /// Link selectors for one specific card. Generic link selectors are not
    /// included since they would match whichever card comes first.
    pub fn card_link_for(posting_id: &str) -> Vec<String> {
        vec![
            format!("a[data-job-id='{}']", posting_id),
            format!("[data-job-id='{}'] a", posting_id),
            format!("a[href*='/jobs/view/{}']", posting_id),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectors.json");
        std::fs::write(&path, r#"{"next_page": ["button.next"]}"#).unwrap();

        let set = SelectorSet::load_or_default(&path).unwrap();
        assert_eq!(set.next_page, vec!["button.next".to_string()]);
        assert_eq!(set.cards, SelectorSet::default().cards);
    }

    #[test]
    fn test_missing_file_is_default() {
        let set = SelectorSet::load_or_default(Path::new("/nonexistent/selectors.json")).unwrap();
        assert_eq!(set, SelectorSet::default());
    }

    #[test]
    fn test_card_link_for_is_specific() {
        let selectors = SelectorSet::card_link_for("42");
        assert_eq!(selectors[0], "a[data-job-id='42']");
        assert!(selectors.iter().all(|s| s.contains("42")));
    }
}
