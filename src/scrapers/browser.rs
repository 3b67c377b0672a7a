use async_trait::async_trait;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use scraper::{Html, Selector};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{Result, ScrapeError};
use crate::models::Source;
use crate::scrapers::collect_site;
use crate::scrapers::driver::{BrowserDriver, ElementHandle, Locator};
use crate::scrapers::traits::SiteScraper;
use crate::scrapers::types::UnitOutcome;

const WINDOW_SIZE: (u32, u32) = (1920, 1080);

// Sites pause for up to 15s between actions; keep the browser alive through that
const IDLE_TIMEOUT: Duration = Duration::from_secs(180);

const ELEMENT_TIMEOUT: Duration = Duration::from_secs(30);

const SELECT_BY_LABEL: &str = r#"
function (label) {
    const option = Array.from(this.options).find(o => o.text.trim() === label);
    if (!option) {
        return false;
    }
    this.value = option.value;
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}
"#;

const CLICK_IN_FRAME: &str = r#"
function (xpath) {
    const doc = this.contentDocument;
    if (!doc) {
        return false;
    }
    const target = doc
        .evaluate(xpath, doc, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null)
        .singleNodeValue;
    if (!target) {
        return false;
    }
    target.click();
    return true;
}
"#;

fn driver_error(error: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Driver(error.to_string())
}

/// One headless Chrome process with a single tab
pub struct ChromeDriver {
    // Dropping the browser kills the process
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    /// Launch headless Chrome, from `chrome_path` when given
    pub fn launch(chrome_path: Option<&PathBuf>) -> Result<Self> {
        info!("Launching headless Chrome...");

        let mut options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some(WINDOW_SIZE))
            .idle_browser_timeout(IDLE_TIMEOUT)
            .build()
            .map_err(driver_error)?;

        if let Some(path) = chrome_path {
            options.path = Some(path.clone());
        }

        let browser = Browser::new(options).map_err(driver_error)?;
        let tab = browser.new_tab().map_err(driver_error)?;
        tab.set_default_timeout(ELEMENT_TIMEOUT);

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn find_elements(&self, locator: &Locator) -> Vec<Element<'_>> {
        let found = match locator {
            Locator::Css(selector) => self.tab.find_elements(selector),
            Locator::XPath(expression) => self.tab.find_elements_by_xpath(expression),
        };
        // headless_chrome reports an empty match as an error
        found.unwrap_or_else(|e| {
            debug!("No match for {}: {}", locator, e);
            Vec::new()
        })
    }

    /// Resolve a handle against the current page and run `action` on it
    fn with_element<T>(
        &self,
        handle: &ElementHandle,
        action: impl FnOnce(&Element<'_>) -> anyhow::Result<T>,
    ) -> Result<T> {
        let elements = self.find_elements(&handle.locator);
        let element = elements.get(handle.index).ok_or_else(|| {
            ScrapeError::not_found(format!("{} #{}", handle.locator, handle.index))
        })?;
        action(element).map_err(driver_error)
    }

    fn run_script(&self, script: &str) -> Result<()> {
        self.tab.evaluate(script, false).map_err(driver_error)?;
        Ok(())
    }
}

impl BrowserDriver for ChromeDriver {
    fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| ScrapeError::navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        let url = self.tab.get_url();
        if url.is_empty() || url == "about:blank" {
            None
        } else {
            Some(url)
        }
    }

    fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let count = self.find_elements(locator).len();
        Ok((0..count)
            .map(|index| ElementHandle::new(locator.clone(), index))
            .collect())
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        self.with_element(element, |e| e.click().map(|_| ()))
    }

    fn text(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |e| e.get_inner_text())
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.with_element(element, |e| e.get_attribute_value(name))
    }

    fn texts(&self, locator: &Locator) -> Result<Vec<String>> {
        self.find_elements(locator)
            .iter()
            .map(|e| e.get_inner_text().map_err(driver_error))
            .collect()
    }

    fn attributes(&self, locator: &Locator, name: &str) -> Result<Vec<Option<String>>> {
        self.find_elements(locator)
            .iter()
            .map(|e| e.get_attribute_value(name).map_err(driver_error))
            .collect()
    }

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.with_element(element, |e| e.scroll_into_view().map(|_| ()))
    }

    fn scroll_by(&self, pixels: i64) -> Result<()> {
        self.run_script(&format!("window.scrollBy(0, {});", pixels))
    }

    fn scroll_to_bottom(&self) -> Result<()> {
        self.run_script("window.scrollTo(0, document.body.scrollHeight);")
    }

    fn options(&self, select: &ElementHandle) -> Result<Vec<String>> {
        let html = self.with_element(select, |e| e.get_content())?;
        let document = Html::parse_fragment(&html);
        let option_selector = Selector::parse("option").map_err(driver_error)?;

        Ok(document
            .select(&option_selector)
            .map(|option| option.text().collect::<String>().trim().to_string())
            .collect())
    }

    fn select_option(&self, select: &ElementHandle, label: &str) -> Result<()> {
        let selected = self.with_element(select, |e| {
            e.call_js_fn(SELECT_BY_LABEL, vec![json!(label)], false)
        })?;

        match selected.value {
            Some(serde_json::Value::Bool(true)) => Ok(()),
            _ => Err(ScrapeError::not_found(format!("option {:?} of {}", label, select.locator))),
        }
    }

    fn press_key(&self, element: &ElementHandle, key: &str) -> Result<()> {
        self.with_element(element, |e| e.focus().map(|_| ()))?;
        self.tab.press_key(key).map_err(driver_error)?;
        Ok(())
    }

    fn click_in_frame(&self, frame: &Locator, target: &Locator) -> Result<()> {
        let Locator::XPath(expression) = target else {
            return Err(ScrapeError::Driver(format!("{} is not an XPath locator", target)));
        };
        let frame_handle = ElementHandle::new(frame.clone(), 0);
        let clicked = self.with_element(&frame_handle, |e| {
            e.call_js_fn(CLICK_IN_FRAME, vec![json!(expression)], false)
        })?;

        match clicked.value {
            Some(serde_json::Value::Bool(true)) => Ok(()),
            _ => Err(ScrapeError::not_found(format!("{} in {}", target, frame))),
        }
    }

    fn wait(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Runs every unit in its own headless Chrome on the blocking thread pool
pub struct ChromeScraper {
    chrome_path: Option<PathBuf>,
}

impl ChromeScraper {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }
}

#[async_trait]
impl SiteScraper for ChromeScraper {
    async fn scrape(&self, source: Source) -> UnitOutcome {
        let chrome_path = self.chrome_path.clone();

        let unit = tokio::task::spawn_blocking(move || {
            let driver = match ChromeDriver::launch(chrome_path.as_ref()) {
                Ok(driver) => driver,
                Err(e) => {
                    error!("Could not start a browser for {}: {}", source, e);
                    return UnitOutcome::failed(source, e);
                }
            };
            collect_site(source, &driver)
        });

        match unit.await {
            Ok(outcome) => outcome,
            Err(e) => UnitOutcome::failed(
                source,
                ScrapeError::Driver(format!("{} unit panicked: {}", source, e)),
            ),
        }
    }

    fn backend_name(&self) -> &'static str {
        "headless_chrome"
    }
}
