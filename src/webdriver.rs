use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

use crate::browser::{Browser, BrowserResult, PageElement, ScrollTarget};
use crate::error::BrowserError;

/// Map a driver error onto the pipeline's error taxonomy by its message.
fn classify(err: WebDriverError) -> BrowserError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("stale element") {
        BrowserError::Stale
    } else if lower.contains("no such element") {
        BrowserError::NotFound(message)
    } else if lower.contains("invalid session id")
        || lower.contains("no such window")
        || lower.contains("session deleted")
        || lower.contains("disconnected")
        || lower.contains("connection refused")
    {
        BrowserError::SessionLost(message)
    } else {
        BrowserError::Driver(message)
    }
}

#[derive(Clone)]
pub struct WebDriverElement {
    inner: WebElement,
    handle: Handle,
}

impl PageElement for WebDriverElement {
    fn text(&self) -> BrowserResult<String> {
        self.handle.block_on(self.inner.text()).map_err(classify)
    }

    fn attr(&self, name: &str) -> BrowserResult<Option<String>> {
        self.handle.block_on(self.inner.attr(name)).map_err(classify)
    }

    fn find_within(&self, selectors: &[String]) -> BrowserResult<Vec<Self>> {
        for selector in selectors {
            match self.handle.block_on(self.inner.find_all(By::Css(selector.as_str()))) {
                Ok(found) if !found.is_empty() => {
                    return Ok(found
                        .into_iter()
                        .map(|inner| WebDriverElement {
                            inner,
                            handle: self.handle.clone(),
                        })
                        .collect());
                }
                Ok(_) => {}
                Err(err) => match classify(err) {
                    BrowserError::NotFound(_) => {}
                    BrowserError::Driver(message) if message.contains("invalid selector") => {
                        debug!(selector = %selector, "invalid selector skipped");
                    }
                    other => return Err(other),
                },
            }
        }
        Ok(Vec::new())
    }
}

/// A live Chrome session behind a WebDriver server (e.g. chromedriver).
///
/// thirtyfour is async; the session owns a small runtime and blocks on each
/// call so the pipeline stays strictly sequential.
pub struct WebDriverSession {
    runtime: Runtime,
    driver: Option<WebDriver>,
}

impl WebDriverSession {
    pub fn connect(server_url: &str, headless: bool) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        let driver = runtime.block_on(async {
            let mut caps = DesiredCapabilities::chrome();
            if headless {
                caps.set_headless()?;
            }
            caps.add_arg("--window-size=1400,1000")?;
            caps.add_arg("--disable-blink-features=AutomationControlled")?;
            WebDriver::new(server_url, caps).await
        })?;
        info!(server = server_url, headless, "browser session started");

        Ok(Self {
            runtime,
            driver: Some(driver),
        })
    }

    fn driver(&self) -> BrowserResult<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| BrowserError::SessionLost("session already closed".to_string()))
    }

    fn wrap(&self, inner: WebElement) -> WebDriverElement {
        WebDriverElement {
            inner,
            handle: self.runtime.handle().clone(),
        }
    }

    fn quit(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(err) = self.runtime.block_on(driver.quit()) {
                warn!(error = %err, "browser did not shut down cleanly");
            }
        }
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        self.quit();
    }
}

impl Browser for WebDriverSession {
    type Element = WebDriverElement;

    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let driver = self.driver()?;
        self.runtime
            .block_on(driver.goto(url))
            .map_err(|err| match classify(err) {
                BrowserError::Driver(reason) => BrowserError::Navigation {
                    url: url.to_string(),
                    reason,
                },
                other => other,
            })
    }

    fn find_all(&self, selectors: &[String]) -> BrowserResult<Vec<Self::Element>> {
        let driver = self.driver()?;
        for selector in selectors {
            match self.runtime.block_on(driver.find_all(By::Css(selector.as_str()))) {
                Ok(found) if !found.is_empty() => {
                    return Ok(found.into_iter().map(|el| self.wrap(el)).collect());
                }
                Ok(_) => {}
                Err(err) => match classify(err) {
                    BrowserError::NotFound(_) => {}
                    BrowserError::Driver(message) if message.contains("invalid selector") => {
                        debug!(selector = %selector, "invalid selector skipped");
                    }
                    other => return Err(other),
                },
            }
        }
        Ok(Vec::new())
    }

    fn click(&mut self, element: &Self::Element) -> BrowserResult<()> {
        self.runtime
            .block_on(element.inner.click())
            .map_err(classify)
    }

    fn scroll_to(&mut self, target: ScrollTarget<Self::Element>) -> BrowserResult<()> {
        let driver = self.driver()?;
        let result = match target {
            ScrollTarget::Bottom => self.runtime.block_on(driver.execute(
                "window.scrollTo(0, document.body.scrollHeight);\
                 const list = document.querySelector('div.jobs-search-results-list, div.scaffold-layout__list');\
                 if (list) { list.scrollTop = list.scrollHeight; }",
                Vec::new(),
            )),
            ScrollTarget::Element(element) => {
                let arg = element.inner.to_json().map_err(classify)?;
                self.runtime.block_on(
                    driver.execute("arguments[0].scrollIntoView(true);", vec![arg]),
                )
            }
        };
        // give lazy loaders a moment
        std::thread::sleep(Duration::from_millis(400));
        result.map(|_| ()).map_err(classify)
    }

    fn current_url(&self) -> BrowserResult<String> {
        let driver = self.driver()?;
        self.runtime
            .block_on(driver.current_url())
            .map(|url| url.to_string())
            .map_err(classify)
    }
}
