use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::models::Source;
use crate::normalize::parse_integer_quantity;
use crate::scrapers::driver::{BrowserDriver, ElementHandle, Locator};
use crate::scrapers::traits::SiteFlow;
use crate::scrapers::types::{Axis, Listing, PlanOption, RawQuote};

pub const COLLECTION_URL: &str = "https://livre.unidas.com.br/carros";

// "Ver mais" keeps appearing until every card is loaded
const MAX_EXPANSIONS: usize = 200;

fn card_locator() -> Locator {
    Locator::css(".bottom")
}

fn mileage_select() -> Locator {
    Locator::css("#franchise")
}

fn term_select() -> Locator {
    Locator::css("#period")
}

fn price_locator() -> Locator {
    Locator::xpath(
        "//p[contains(@class, \"overview-purchase__card-p\") \
         and contains(@class, \"price\")]/span",
    )
}

fn note_locator() -> Locator {
    Locator::xpath("//p[contains(@class, \"text-success\")]")
}

/// livre.unidas.com.br: an expandable card grid, each vehicle page has a
/// mileage `<select>` and a contract-length `<select>`.
pub struct UnidasFlow<D> {
    driver: D,
    on_collection: bool,
}

impl<D: BrowserDriver> UnidasFlow<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            on_collection: false,
        }
    }

    /// Press "Ver mais" until it is gone
    fn expand_collection(&self) {
        for _ in 0..MAX_EXPANSIONS {
            let buttons = self.driver.find_all(&Locator::text("Ver mais")).unwrap_or_default();
            let Some(button) = buttons.last() else {
                break;
            };
            // Clear the cookie bar that sits over the button
            let clicked = self
                .driver
                .scroll_into_view(button)
                .and_then(|_| self.driver.scroll_by(200))
                .and_then(|_| {
                    self.driver.wait(Duration::from_secs(1));
                    self.driver.click(button)
                });
            if clicked.is_err() {
                break;
            }
            self.driver.wait(Duration::from_secs(2));
        }
    }

    fn load_collection(&mut self, settle: Duration) -> Result<()> {
        self.driver.navigate(COLLECTION_URL)?;
        self.driver.wait(settle);
        self.expand_collection();
        self.on_collection = true;
        Ok(())
    }

    /// Cards that carry a monthly price, i.e. vehicle cards
    fn cards(&self) -> Result<Vec<ElementHandle>> {
        Ok(self
            .driver
            .texts(&card_locator())?
            .iter()
            .enumerate()
            .filter(|(_, text)| text.contains("/mês"))
            .map(|(index, _)| ElementHandle::new(card_locator(), index))
            .collect())
    }

    fn control(&self, axis: Axis) -> Result<ElementHandle> {
        match axis {
            Axis::Mileage => self.driver.find(&mileage_select()),
            Axis::Term => self.driver.find(&term_select()),
        }
    }
}

/// `"R$ 2.199,00/mês"` → `"2.199,00"`
fn price_token(text: &str) -> &str {
    let last = text.split_whitespace().last().unwrap_or("");
    last.split('/').next().unwrap_or(last)
}

impl<D: BrowserDriver> SiteFlow for UnidasFlow<D> {
    fn source(&self) -> Source {
        Source::Unidas
    }

    fn axis_order(&self) -> [Axis; 2] {
        [Axis::Mileage, Axis::Term]
    }

    fn open_collection(&mut self) -> Result<usize> {
        self.driver.navigate(COLLECTION_URL)?;
        self.driver.wait(Duration::from_secs(10));

        if let Some(accept) = self.driver.find_all(&Locator::text("OK"))?.first() {
            let _ = self.driver.click(accept);
        }
        self.expand_collection();
        self.on_collection = true;

        let count = self.cards()?.len();
        info!("Unidas collection expanded to {} vehicles", count);
        Ok(count)
    }

    fn open_listing(&mut self, index: usize) -> Result<Listing> {
        if !self.on_collection {
            self.load_collection(Duration::from_secs(3))?;
        }

        let cards = self.cards()?;
        let card = cards
            .get(index)
            .ok_or_else(|| ScrapeError::not_found(format!("{} #{}", card_locator(), index)))?;
        self.driver.scroll_into_view(card)?;
        self.driver.wait(Duration::from_secs(2));
        self.driver.click(card)?;
        self.on_collection = false;
        self.driver.wait(Duration::from_secs(3));

        let popups = self.driver.find_all(&Locator::xpath("//*[@title=\"Close\"]"))?;
        if let Some(popup) = popups.first() {
            let _ = self.driver.click(popup);
        }

        let title = self.driver.find(&Locator::css(".page-title"))?;
        let name = self.driver.text(&title)?.trim().to_string();
        debug!("Unidas listing {}: {}", index, name);

        Ok(Listing {
            name,
            url: self.driver.current_url(),
        })
    }

    fn options(&mut self, axis: Axis) -> Result<Vec<PlanOption>> {
        let control = self.control(axis)?;
        let labels = self.driver.options(&control)?;
        let unit = match axis {
            Axis::Mileage => " Km",
            Axis::Term => "Meses",
        };
        PlanOption::parse_all(axis, labels, 0, |l| parse_integer_quantity(l, unit))
    }

    fn select(&mut self, option: &PlanOption) -> Result<()> {
        let control = self.control(option.axis)?;
        self.driver.select_option(&control, &option.label)?;
        self.driver.wait(Duration::from_secs(2));
        Ok(())
    }

    fn read_quote(&mut self) -> Result<RawQuote> {
        let prices = self.driver.find_all(&price_locator())?;
        let price = prices
            .last()
            .ok_or_else(|| ScrapeError::not_found(price_locator()))?;
        let text = self.driver.text(price)?;

        Ok(RawQuote {
            price_text: price_token(&text).to_string(),
            note: self.driver.optional_text(&note_locator())?,
        })
    }

    fn close_listing(&mut self) -> Result<()> {
        self.load_collection(Duration::from_secs(3))
    }

    fn return_to_collection(&mut self) -> Result<()> {
        self.load_collection(Duration::from_secs(3))
    }
}
