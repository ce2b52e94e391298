//! In-memory browser over recorded HTML.
//!
//! Each URL maps to one or more snapshots of the same page; scrolling to the
//! bottom reveals the next snapshot, which is how lazy-loaded result lists are
//! replayed. Clicking an element with `href` or `data-href` navigates there;
//! `data-render` swaps in another registered page while the URL stays put,
//! the way client-side pagination behaves.

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::browser::{Browser, BrowserResult, PageElement, ScrollTarget};
use crate::error::BrowserError;

/// An owned copy of a matched element.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureElement {
    html: String,
    text: String,
    attrs: HashMap<String, String>,
}

impl FixtureElement {
    fn from_ref(element: ElementRef<'_>) -> Self {
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let attrs = element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            html: element.html(),
            text,
            attrs,
        }
    }

    fn render_target(&self) -> Option<&str> {
        self.attrs.get("data-render").map(String::as_str)
    }

    fn link_target(&self) -> Option<&str> {
        self.attrs
            .get("data-href")
            .or_else(|| self.attrs.get("href"))
            .map(String::as_str)
    }
}

fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(_) => {
            debug!(selector = raw, "skipping unparseable selector");
            None
        }
    }
}

impl PageElement for FixtureElement {
    fn text(&self) -> BrowserResult<String> {
        Ok(self.text.clone())
    }

    fn attr(&self, name: &str) -> BrowserResult<Option<String>> {
        Ok(self.attrs.get(name).cloned())
    }

    fn find_within(&self, selectors: &[String]) -> BrowserResult<Vec<Self>> {
        let fragment = Html::parse_fragment(&self.html);
        let Some(top) = fragment.root_element().child_elements().next() else {
            return Ok(Vec::new());
        };
        for raw in selectors {
            let Some(selector) = parse_selector(raw) else { continue };
            // descendants only, like a driver's element-scoped lookup
            let found: Vec<Self> = top
                .select(&selector)
                .filter(|el| el.id() != top.id())
                .map(FixtureElement::from_ref)
                .collect();
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
pub struct FixtureBrowser {
    pages: HashMap<String, Vec<String>>,
    current: Option<String>,
    // URL reported while an in-place render is showing
    shown_url: Option<String>,
    snapshot: usize,
    navigations: Vec<String>,
    clicks: usize,
    scrolls: usize,
    failures: RefCell<VecDeque<BrowserError>>,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page with a single snapshot.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), vec![html.into()]);
        self
    }

    /// Register a page whose content grows as it is scrolled.
    pub fn with_snapshots(mut self, url: impl Into<String>, snapshots: Vec<String>) -> Self {
        self.pages.insert(url.into(), snapshots);
        self
    }

    /// The next `count` browser operations fail with `err`.
    pub fn fail_next(&self, count: usize, err: BrowserError) {
        let mut failures = self.failures.borrow_mut();
        for _ in 0..count {
            failures.push_back(err.clone());
        }
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn clicks(&self) -> usize {
        self.clicks
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls
    }

    /// Load pages from a directory holding `manifest.json`:
    /// `{"pages": {"<url>": ["page-1.html", "page-1-scrolled.html"]}}`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        #[derive(Deserialize)]
        struct Manifest {
            pages: HashMap<String, Vec<String>>,
        }

        let manifest_path = dir.join("manifest.json");
        let raw = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid manifest: {}", manifest_path.display()))?;

        let mut browser = Self::new();
        for (url, files) in manifest.pages {
            let snapshots = files
                .iter()
                .map(|file| {
                    std::fs::read_to_string(dir.join(file))
                        .with_context(|| format!("Failed to read fixture page {}", file))
                })
                .collect::<Result<Vec<_>>>()?;
            browser.pages.insert(url, snapshots);
        }
        Ok(browser)
    }

    fn take_failure(&self) -> BrowserResult<()> {
        match self.failures.borrow_mut().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn current_html(&self) -> Option<&str> {
        let url = self.current.as_ref()?;
        let snapshots = self.pages.get(url)?;
        snapshots.get(self.snapshot).map(String::as_str)
    }

    fn resolve(&self, target: &str) -> String {
        if let Ok(url) = Url::parse(target) {
            return url.to_string();
        }
        self.shown_url
            .as_deref()
            .or(self.current.as_deref())
            .and_then(|base| Url::parse(base).ok())
            .and_then(|base| base.join(target).ok())
            .map(|url| url.to_string())
            .unwrap_or_else(|| target.to_string())
    }
}

impl Browser for FixtureBrowser {
    type Element = FixtureElement;

    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.take_failure()?;
        self.navigations.push(url.to_string());
        if !self.pages.contains_key(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "no fixture page".to_string(),
            });
        }
        self.current = Some(url.to_string());
        self.shown_url = None;
        self.snapshot = 0;
        Ok(())
    }

    fn find_all(&self, selectors: &[String]) -> BrowserResult<Vec<Self::Element>> {
        self.take_failure()?;
        let Some(html) = self.current_html() else {
            return Ok(Vec::new());
        };
        let document = Html::parse_document(html);
        for raw in selectors {
            let Some(selector) = parse_selector(raw) else { continue };
            let found: Vec<FixtureElement> = document
                .select(&selector)
                .map(FixtureElement::from_ref)
                .collect();
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    fn click(&mut self, element: &Self::Element) -> BrowserResult<()> {
        self.take_failure()?;
        self.clicks += 1;
        if let Some(key) = element.render_target() {
            if !self.pages.contains_key(key) {
                return Err(BrowserError::NotFound(format!("no fixture page '{}'", key)));
            }
            let url = self.current_url()?;
            self.current = Some(key.to_string());
            self.shown_url = Some(url);
            self.snapshot = 0;
            return Ok(());
        }
        match element.link_target() {
            Some(target) => {
                let url = self.resolve(target);
                self.navigate(&url)
            }
            None => Ok(()),
        }
    }

    fn scroll_to(&mut self, target: ScrollTarget<Self::Element>) -> BrowserResult<()> {
        self.scrolls += 1;
        if let ScrollTarget::Bottom = target {
            let count = self
                .current
                .as_ref()
                .and_then(|url| self.pages.get(url))
                .map_or(0, Vec::len);
            if self.snapshot + 1 < count {
                self.snapshot += 1;
            }
        }
        Ok(())
    }

    fn current_url(&self) -> BrowserResult<String> {
        Ok(self
            .shown_url
            .clone()
            .or_else(|| self.current.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    /// Same contract as the default, without real sleeping.
    fn wait_until(
        &mut self,
        timeout: Duration,
        poll: Duration,
        predicate: &mut dyn FnMut(&mut Self) -> BrowserResult<bool>,
    ) -> BrowserResult<bool> {
        let polls = if poll.is_zero() {
            1
        } else {
            (timeout.as_millis() / poll.as_millis().max(1)).max(1)
        };
        for _ in 0..polls {
            if predicate(self)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
