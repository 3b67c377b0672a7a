use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::models::Source;
use crate::normalize::parse_integer_quantity;
use crate::scrapers::driver::{BrowserDriver, ElementHandle, Locator};
use crate::scrapers::traits::SiteFlow;
use crate::scrapers::types::{Axis, Listing, PlanOption, RawQuote};

pub const COLLECTION_URL: &str = "https://www.movidazerokm.com.br/assinatura/busca";

// Dropdown ids shift once the page has re-rendered; try both
const TERM_PANELS: [&str; 2] = ["mat-select-0", "mat-select-4"];
const MILEAGE_PANELS: [&str; 2] = ["mat-select-1", "mat-select-5"];

const CARD_SCROLL_STEP: i64 = 125;

fn card_locator(index: usize) -> Locator {
    Locator::css(format!("#vehicleCard{}", index))
}

fn panel_locator(id: &str) -> Locator {
    Locator::xpath(format!("//mat-select[@id=\"{}\"]", id))
}

fn option_locator() -> Locator {
    Locator::xpath("//*[@role=\"option\"]")
}

fn chat_frame() -> Locator {
    Locator::xpath("//iframe[@id=\"chat-widget\" or @name=\"chat-widget\"]")
}

fn chat_minimize() -> Locator {
    Locator::xpath("//button[@aria-label=\"Minimizar janela\"]")
}

fn price_locator() -> Locator {
    Locator::xpath("//h1[contains(@class, \"price-label\")]")
}

fn note_locator() -> Locator {
    Locator::xpath("//h5[contains(@class, \"price-observation\")]")
}

/// movidazerokm.com.br: an Angular app whose selectors are Material dropdown
/// panels rather than native `<select>` controls.
pub struct MovidaFlow<D> {
    driver: D,
}

impl<D: BrowserDriver> MovidaFlow<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    fn press_escape(&self) -> Result<()> {
        let body = self.driver.find(&Locator::css("body"))?;
        self.driver.press_key(&body, "Escape")
    }

    /// The support chat opens over the cards; it is not always present
    fn minimize_chat(&self) {
        if self.driver.click_in_frame(&chat_frame(), &chat_minimize()).is_ok() {
            debug!("Minimized the Movida chat widget");
        }
    }

    /// Open the dropdown of `axis` and return the entry labels
    fn open_panel(&self, axis: Axis) -> Result<Vec<String>> {
        let ids = match axis {
            Axis::Term => TERM_PANELS,
            Axis::Mileage => MILEAGE_PANELS,
        };

        for id in ids {
            let Some(panel) = self.driver.find_all(&panel_locator(id))?.into_iter().next() else {
                // A stale overlay can hide the panel
                self.press_escape()?;
                self.driver.wait(Duration::from_secs(2));
                continue;
            };
            self.driver.scroll_into_view(&panel)?;
            self.driver.click(&panel)?;
            self.driver.wait(Duration::from_millis(500));
            return self.driver.texts(&option_locator());
        }

        Err(ScrapeError::not_found(format!("{} dropdown", axis)))
    }

    fn parse_entry(axis: Axis, label: &str) -> Result<u32> {
        match axis {
            Axis::Term => parse_integer_quantity(label, "meses"),
            Axis::Mileage => parse_integer_quantity(label, " Km"),
        }
    }
}

impl<D: BrowserDriver> SiteFlow for MovidaFlow<D> {
    fn source(&self) -> Source {
        Source::Movida
    }

    fn axis_order(&self) -> [Axis; 2] {
        [Axis::Term, Axis::Mileage]
    }

    fn open_collection(&mut self) -> Result<usize> {
        self.driver.navigate(COLLECTION_URL)?;
        self.driver.wait(Duration::from_secs(15));
        self.minimize_chat();

        if let Some(cookies) = self
            .driver
            .find_all(&Locator::xpath("//a[@aria-label=\"allow cookies\"]"))?
            .first()
        {
            let _ = self.driver.click(cookies);
        }

        let count = self
            .driver
            .find_all(&Locator::xpath("//*[starts-with(@id, \"vehicleCard\")]"))?
            .len();
        info!("Found {} vehicles on {}", count, COLLECTION_URL);
        Ok(count)
    }

    fn open_listing(&mut self, index: usize) -> Result<Listing> {
        self.driver.navigate(COLLECTION_URL)?;
        self.driver.wait(Duration::from_secs(5));
        self.minimize_chat();

        // Cards render lazily as the list scrolls
        self.driver.scroll_by(CARD_SCROLL_STEP * index as i64)?;
        self.driver.wait(Duration::from_secs(2));

        let card = self.driver.find(&card_locator(index))?;
        self.driver.scroll_into_view(&card)?;
        self.driver.wait(Duration::from_secs(1));
        self.driver.click(&card)?;
        self.driver.wait(Duration::from_secs(8));

        let title = self
            .driver
            .find(&Locator::xpath("//h1[contains(@class, \"subtitle-car-detail\")]"))?;
        let name = self.driver.text(&title)?.trim().to_string();
        debug!("Movida listing {}: {}", index, name);

        self.driver.scroll_by(200)?;
        self.driver.wait(Duration::from_secs(1));

        Ok(Listing {
            name,
            url: self.driver.current_url(),
        })
    }

    fn options(&mut self, axis: Axis) -> Result<Vec<PlanOption>> {
        let labels = self.open_panel(axis)?;
        self.press_escape()?;

        PlanOption::parse_all(axis, labels, 0, |l| Self::parse_entry(axis, l))
    }

    fn select(&mut self, option: &PlanOption) -> Result<()> {
        let labels = self.open_panel(option.axis)?;
        let Some(position) = labels.iter().position(|l| l.trim() == option.label) else {
            self.press_escape()?;
            return Err(ScrapeError::not_found(format!(
                "{} entry {:?}",
                option.axis, option.label
            )));
        };

        self.driver.click(&ElementHandle::new(option_locator(), position))?;
        let settle = match option.axis {
            Axis::Term => Duration::from_secs(1),
            Axis::Mileage => Duration::from_secs(2),
        };
        self.driver.wait(settle);
        Ok(())
    }

    fn read_quote(&mut self) -> Result<RawQuote> {
        let price = self.driver.find(&price_locator())?;
        Ok(RawQuote {
            price_text: self.driver.text(&price)?,
            note: self.driver.optional_text(&note_locator())?,
        })
    }

    fn close_listing(&mut self) -> Result<()> {
        // open_listing always starts from the collection page
        Ok(())
    }

    fn return_to_collection(&mut self) -> Result<()> {
        self.driver.navigate(COLLECTION_URL)?;
        self.driver.wait(Duration::from_secs(8));
        Ok(())
    }
}
