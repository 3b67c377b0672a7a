//! Scripted in-memory page used to drive site flows in tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::{Result, ScrapeError};
use crate::scrapers::driver::{BrowserDriver, ElementHandle, Locator};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub options: Vec<String>,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn link(href: &str) -> Self {
        let mut element = Self::default();
        element.attributes.insert("href".to_string(), href.to_string());
        element
    }

    pub fn select(options: &[&str]) -> Self {
        Self {
            options: options.iter().map(|o| o.to_string()).collect(),
            ..Self::default()
        }
    }
}

/// Elements that replace the matches of `target` once `trigger` is clicked
struct Overlay {
    target: Locator,
    elements: Vec<FakeElement>,
}

/// Every locator maps to a list of elements; actions are recorded in `log`.
#[derive(Default)]
pub struct FakeDriver {
    elements: RefCell<HashMap<Locator, Vec<FakeElement>>>,
    overlays: HashMap<Locator, Overlay>,
    frames: HashMap<Locator, HashSet<Locator>>,
    unreachable: HashSet<String>,
    url: RefCell<Option<String>>,
    lookups: RefCell<HashMap<Locator, usize>>,
    pub log: RefCell<Vec<String>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, locator: Locator, elements: Vec<FakeElement>) -> Self {
        self.elements.borrow_mut().insert(locator, elements);
        self
    }

    /// Clicking any match of `trigger` makes `target` resolve to `elements`
    pub fn with_overlay(
        mut self,
        trigger: Locator,
        target: Locator,
        elements: Vec<FakeElement>,
    ) -> Self {
        self.overlays.insert(trigger, Overlay { target, elements });
        self
    }

    /// `target` exists inside the document of `frame`
    pub fn with_frame(mut self, frame: Locator, target: Locator) -> Self {
        self.frames.entry(frame).or_default().insert(target);
        self
    }

    pub fn unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    pub fn actions(&self, prefix: &str) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter(|a| a.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// How many times `locator` was resolved against the page
    pub fn lookups(&self, locator: &Locator) -> usize {
        self.lookups.borrow().get(locator).copied().unwrap_or(0)
    }

    fn matches(&self, locator: &Locator) -> Vec<FakeElement> {
        *self.lookups.borrow_mut().entry(locator.clone()).or_default() += 1;
        self.elements.borrow().get(locator).cloned().unwrap_or_default()
    }

    fn element(&self, handle: &ElementHandle) -> Result<FakeElement> {
        self.matches(&handle.locator)
            .into_iter()
            .nth(handle.index)
            .ok_or_else(|| ScrapeError::not_found(&handle.locator))
    }

    fn record(&self, action: String) {
        self.log.borrow_mut().push(action);
    }
}

impl BrowserDriver for FakeDriver {
    fn navigate(&self, url: &str) -> Result<()> {
        if self.unreachable.contains(url) {
            return Err(ScrapeError::navigation(format!("{}: connection refused", url)));
        }
        self.record(format!("navigate {}", url));
        *self.url.borrow_mut() = Some(url.to_string());
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.url.borrow().clone()
    }

    fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let count = self.matches(locator).len();
        Ok((0..count)
            .map(|index| ElementHandle::new(locator.clone(), index))
            .collect())
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        self.element(element)?;
        self.record(format!("click {}#{}", element.locator, element.index));
        if let Some(overlay) = self.overlays.get(&element.locator) {
            self.elements
                .borrow_mut()
                .insert(overlay.target.clone(), overlay.elements.clone());
        }
        Ok(())
    }

    fn text(&self, element: &ElementHandle) -> Result<String> {
        Ok(self.element(element)?.text)
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    fn texts(&self, locator: &Locator) -> Result<Vec<String>> {
        Ok(self.matches(locator).into_iter().map(|e| e.text).collect())
    }

    fn attributes(&self, locator: &Locator, name: &str) -> Result<Vec<Option<String>>> {
        Ok(self
            .matches(locator)
            .into_iter()
            .map(|e| e.attributes.get(name).cloned())
            .collect())
    }

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.element(element)?;
        Ok(())
    }

    fn scroll_by(&self, pixels: i64) -> Result<()> {
        self.record(format!("scroll {}", pixels));
        Ok(())
    }

    fn scroll_to_bottom(&self) -> Result<()> {
        self.record("scroll bottom".to_string());
        Ok(())
    }

    fn options(&self, select: &ElementHandle) -> Result<Vec<String>> {
        Ok(self.element(select)?.options)
    }

    fn select_option(&self, select: &ElementHandle, label: &str) -> Result<()> {
        if !self.element(select)?.options.iter().any(|o| o == label) {
            return Err(ScrapeError::not_found(format!("option {:?}", label)));
        }
        self.record(format!("select {} {}", select.locator, label));
        Ok(())
    }

    fn press_key(&self, element: &ElementHandle, key: &str) -> Result<()> {
        self.element(element)?;
        self.record(format!("key {}", key));
        Ok(())
    }

    fn click_in_frame(&self, frame: &Locator, target: &Locator) -> Result<()> {
        let found = self
            .frames
            .get(frame)
            .is_some_and(|targets| targets.contains(target));
        if !found {
            return Err(ScrapeError::not_found(format!("{} in {}", target, frame)));
        }
        self.record(format!("click {} in {}", target, frame));
        Ok(())
    }

    fn wait(&self, _duration: Duration) {}
}
