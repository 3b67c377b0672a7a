use std::fmt;
use std::time::Duration;

use crate::error::{Result, ScrapeError};

/// How an element is looked up on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    /// Any element whose own text contains `text`
    pub fn text(text: &str) -> Self {
        Locator::XPath(format!("//*[contains(text(), \"{}\")]", text))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css:{}", selector),
            Locator::XPath(expression) => write!(f, "xpath:{}", expression),
        }
    }
}

/// Reference to the `index`-th match of a locator.
///
/// Handles are resolved again on every action, so a handle taken before a page
/// transition simply fails with `ElementNotFound` instead of going stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub locator: Locator,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(locator: Locator, index: usize) -> Self {
        Self { locator, index }
    }
}

/// Primitives a site flow needs from a browser-automation session
pub trait BrowserDriver {
    fn navigate(&self, url: &str) -> Result<()>;

    fn current_url(&self) -> Option<String>;

    /// Every match of `locator`, in document order. No match is an empty list.
    fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>>;

    fn find(&self, locator: &Locator) -> Result<ElementHandle> {
        self.find_all(locator)?
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::not_found(locator))
    }

    fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Visible text of the element
    fn text(&self, element: &ElementHandle) -> Result<String>;

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    /// Visible text of every match of `locator`, read in one pass over the page
    fn texts(&self, locator: &Locator) -> Result<Vec<String>>;

    /// Attribute `name` of every match of `locator`, read in one pass over the page
    fn attributes(&self, locator: &Locator, name: &str) -> Result<Vec<Option<String>>>;

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()>;

    fn scroll_by(&self, pixels: i64) -> Result<()>;

    fn scroll_to_bottom(&self) -> Result<()>;

    /// Visible labels of a `<select>` control's options
    fn options(&self, select: &ElementHandle) -> Result<Vec<String>>;

    /// Choose the option of a `<select>` control whose visible label is `label`
    fn select_option(&self, select: &ElementHandle, label: &str) -> Result<()>;

    /// Focus the element and press a key (`"ArrowLeft"`, `"Escape"`, ...)
    fn press_key(&self, element: &ElementHandle, key: &str) -> Result<()>;

    /// Click `target` inside the document of the `frame` element
    fn click_in_frame(&self, frame: &Locator, target: &Locator) -> Result<()>;

    fn wait(&self, duration: Duration);

    /// Text of the first match, `None` when nothing matches.
    fn optional_text(&self, locator: &Locator) -> Result<Option<String>> {
        Ok(self.texts(locator)?.into_iter().next())
    }
}

impl<D: BrowserDriver + ?Sized> BrowserDriver for &D {
    fn navigate(&self, url: &str) -> Result<()> {
        (**self).navigate(url)
    }

    fn current_url(&self) -> Option<String> {
        (**self).current_url()
    }

    fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        (**self).find_all(locator)
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        (**self).click(element)
    }

    fn text(&self, element: &ElementHandle) -> Result<String> {
        (**self).text(element)
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        (**self).attribute(element, name)
    }

    fn texts(&self, locator: &Locator) -> Result<Vec<String>> {
        (**self).texts(locator)
    }

    fn attributes(&self, locator: &Locator, name: &str) -> Result<Vec<Option<String>>> {
        (**self).attributes(locator, name)
    }

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        (**self).scroll_into_view(element)
    }

    fn scroll_by(&self, pixels: i64) -> Result<()> {
        (**self).scroll_by(pixels)
    }

    fn scroll_to_bottom(&self) -> Result<()> {
        (**self).scroll_to_bottom()
    }

    fn options(&self, select: &ElementHandle) -> Result<Vec<String>> {
        (**self).options(select)
    }

    fn select_option(&self, select: &ElementHandle, label: &str) -> Result<()> {
        (**self).select_option(select, label)
    }

    fn press_key(&self, element: &ElementHandle, key: &str) -> Result<()> {
        (**self).press_key(element, key)
    }

    fn click_in_frame(&self, frame: &Locator, target: &Locator) -> Result<()> {
        (**self).click_in_frame(frame, target)
    }

    fn wait(&self, duration: Duration) {
        (**self).wait(duration)
    }
}
