//! Browser capability surface consumed by the walker and extractor.
//!
//! Two adapters implement it: [`crate::webdriver::WebDriverSession`] drives a
//! real browser, [`crate::fixture::FixtureBrowser`] replays HTML snapshots.

use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::BrowserError;

pub type BrowserResult<T> = Result<T, BrowserError>;

/// A located element. Adapters hand out owned handles so callers can keep
/// them across further lookups.
pub trait PageElement: Clone {
    fn text(&self) -> BrowserResult<String>;
    fn attr(&self, name: &str) -> BrowserResult<Option<String>>;
    /// First selector with a match inside this element wins.
    fn find_within(&self, selectors: &[String]) -> BrowserResult<Vec<Self>>;
}

#[derive(Debug, Clone)]
pub enum ScrollTarget<E> {
    Bottom,
    Element(E),
}

pub trait Browser {
    type Element: PageElement;

    fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    /// First element matched by the first selector that matches anything.
    fn find_one(&self, selectors: &[String]) -> BrowserResult<Option<Self::Element>> {
        Ok(self.find_all(selectors)?.into_iter().next())
    }

    /// All elements for the first selector with a non-empty result.
    fn find_all(&self, selectors: &[String]) -> BrowserResult<Vec<Self::Element>>;

    fn click(&mut self, element: &Self::Element) -> BrowserResult<()>;

    fn scroll_to(&mut self, target: ScrollTarget<Self::Element>) -> BrowserResult<()>;

    fn current_url(&self) -> BrowserResult<String>;

    /// Poll `predicate` until it holds or `timeout` passes. The predicate is
    /// always evaluated at least once. Returns whether it held.
    fn wait_until(
        &mut self,
        timeout: Duration,
        poll: Duration,
        predicate: &mut dyn FnMut(&mut Self) -> BrowserResult<bool>,
    ) -> BrowserResult<bool>
    where
        Self: Sized,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(self)? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(poll);
        }
    }
}

/// Text of the first element matched by `selectors`, trimmed. Empty text is
/// treated as absent.
pub fn first_text<B: Browser>(browser: &B, selectors: &[String]) -> BrowserResult<Option<String>> {
    for element in browser.find_all(selectors)? {
        let text = element.text()?.trim().to_string();
        if !text.is_empty() {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Like [`first_text`], scoped to one element.
pub fn first_text_within<E: PageElement>(
    element: &E,
    selectors: &[String],
) -> BrowserResult<Option<String>> {
    for child in element.find_within(selectors)? {
        let text = child.text()?.trim().to_string();
        if !text.is_empty() {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Run `op`, retrying transient failures up to `attempts` times in total.
/// Non-transient errors are returned immediately.
pub fn retry_transient<T, F>(attempts: u32, backoff: Duration, mut op: F) -> BrowserResult<T>
where
    F: FnMut() -> BrowserResult<T>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                debug!(attempt, error = %err, "transient browser error; retrying");
                if !backoff.is_zero() {
                    thread::sleep(backoff * attempt);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Randomized pause between requests.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    min_secs: f64,
    max_secs: f64,
}

impl Pacer {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let min_secs = min_secs.max(0.0);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
        }
    }

    /// A pacer that never sleeps.
    pub fn none() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn next_delay(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs);
        }
        let secs = rand::thread_rng().gen_range(self.min_secs..=self.max_secs);
        Duration::from_secs_f64(secs)
    }

    pub fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}
