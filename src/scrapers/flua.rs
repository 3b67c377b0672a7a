use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::models::Source;
use crate::normalize::parse_integer_quantity;
use crate::scrapers::driver::{BrowserDriver, ElementHandle, Locator};
use crate::scrapers::traits::SiteFlow;
use crate::scrapers::types::{Axis, Listing, PlanOption, RawQuote};

/// Brand pages, scraped one after the other as a single collection
pub const BRAND_PAGES: [&str; 2] = [
    "https://www.meuflua.com.br/jeep",
    "https://www.meuflua.com.br/fiat",
];

// More presses than the slider has stops
const SLIDER_RESET_PRESSES: usize = 10;

fn vehicle_button() -> Locator {
    Locator::text("EU QUERO ESTE")
}

fn term_card_locator() -> Locator {
    Locator::css(".monthly-plans__item")
}

fn slider_locator() -> Locator {
    Locator::xpath("//input[@type=\"range\"]")
}

fn slider_stops_locator() -> Locator {
    Locator::css(".hub-input-range")
}

fn price_locator() -> Locator {
    Locator::xpath("//div[@class=\"offer-info__price\"]/h3")
}

/// meuflua.com.br: term plans are cards, the mileage plan is a range slider
/// moved with the arrow keys.
pub struct FluaFlow<D> {
    driver: D,
    /// Vehicles found on each brand page, in `BRAND_PAGES` order
    brand_counts: Vec<usize>,
    brand: usize,
    on_collection: bool,
    slider_position: usize,
}

impl<D: BrowserDriver> FluaFlow<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            brand_counts: Vec::new(),
            brand: 0,
            on_collection: false,
            slider_position: 0,
        }
    }

    fn load_brand(&mut self, brand: usize) -> Result<()> {
        let url = BRAND_PAGES
            .get(brand)
            .ok_or_else(|| ScrapeError::navigation(format!("no brand page #{}", brand)))?;
        self.driver.navigate(url)?;
        self.driver.wait(Duration::from_secs(10));

        if let Some(close) = self.driver.find_all(&Locator::text("Fechar"))?.last() {
            let _ = self.driver.click(close);
        }

        self.driver.scroll_to_bottom()?;
        if let Some(more) = self.driver.find_all(&Locator::text("VER MAIS"))?.last() {
            self.driver.click(more)?;
            self.driver.wait(Duration::from_secs(1));
        }
        // The remaining cards render once the page bottom is reached
        self.driver.scroll_to_bottom()?;
        self.driver.wait(Duration::from_secs(1));

        self.brand = brand;
        self.on_collection = true;
        Ok(())
    }

    /// Map a collection-wide index to (brand page, index on that page)
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut offset = index;
        for (brand, count) in self.brand_counts.iter().enumerate() {
            if offset < *count {
                return Some((brand, offset));
            }
            offset -= count;
        }
        None
    }

    fn term_card(&self, position: usize) -> Result<ElementHandle> {
        self.driver
            .find_all(&term_card_locator())?
            .into_iter()
            .nth(position)
            .ok_or_else(|| ScrapeError::not_found(format!("{} #{}", term_card_locator(), position)))
    }

    fn move_slider(&mut self, target: usize) -> Result<()> {
        let slider = self.driver.find(&slider_locator())?;
        while self.slider_position < target {
            self.driver.press_key(&slider, "ArrowRight")?;
            self.slider_position += 1;
        }
        while self.slider_position > target {
            self.driver.press_key(&slider, "ArrowLeft")?;
            self.slider_position -= 1;
        }
        Ok(())
    }

    fn reset_slider(&mut self) -> Result<()> {
        let slider = self.driver.find(&slider_locator())?;
        for _ in 0..SLIDER_RESET_PRESSES {
            self.driver.press_key(&slider, "ArrowLeft")?;
        }
        self.slider_position = 0;
        Ok(())
    }
}

impl<D: BrowserDriver> SiteFlow for FluaFlow<D> {
    fn source(&self) -> Source {
        Source::Flua
    }

    fn axis_order(&self) -> [Axis; 2] {
        [Axis::Term, Axis::Mileage]
    }

    fn open_collection(&mut self) -> Result<usize> {
        self.brand_counts.clear();
        for (brand, url) in BRAND_PAGES.iter().enumerate() {
            self.load_brand(brand)?;
            let count = self.driver.find_all(&vehicle_button())?.len();
            info!("Found {} vehicles on {}", count, url);
            self.brand_counts.push(count);
        }
        Ok(self.brand_counts.iter().sum())
    }

    fn open_listing(&mut self, index: usize) -> Result<Listing> {
        let (brand, local) = self
            .locate(index)
            .ok_or_else(|| ScrapeError::not_found(format!("{} #{}", vehicle_button(), index)))?;
        if !self.on_collection || self.brand != brand {
            self.load_brand(brand)?;
        }

        let button = self
            .driver
            .find_all(&vehicle_button())?
            .into_iter()
            .nth(local)
            .ok_or_else(|| ScrapeError::not_found(format!("{} #{}", vehicle_button(), local)))?;
        self.driver.scroll_into_view(&button)?;
        self.driver.wait(Duration::from_millis(500));
        self.driver.click(&button)?;
        self.on_collection = false;
        self.driver.wait(Duration::from_secs(1));

        let title = self
            .driver
            .find(&Locator::xpath("//div[contains(@class, \"offer-header\")]/h3"))?;
        let name = self.driver.text(&title)?.trim().to_string();
        debug!("Flua listing {}: {}", index, name);

        self.slider_position = 0;
        Ok(Listing { name, url: None })
    }

    fn options(&mut self, axis: Axis) -> Result<Vec<PlanOption>> {
        match axis {
            Axis::Term => {
                let labels = self
                    .driver
                    .texts(&term_card_locator())?
                    .iter()
                    .map(|text| text.lines().next().unwrap_or_default().to_string())
                    .collect();
                PlanOption::parse_all(axis, labels, 0, |l| parse_integer_quantity(l, "meses"))
            }
            Axis::Mileage => {
                let stops = self.driver.find(&slider_stops_locator())?;
                let labels = self.driver.text(&stops)?.lines().map(str::to_string).collect();
                PlanOption::parse_all(axis, labels, 0, |l| parse_integer_quantity(l, " Km"))
            }
        }
    }

    fn select(&mut self, option: &PlanOption) -> Result<()> {
        match option.axis {
            Axis::Term => {
                let card = self.term_card(option.position)?;
                self.driver.click(&card)?;
                self.driver.wait(Duration::from_secs(1));
                // A new plan keeps the slider where it was; start from the left
                self.reset_slider()
            }
            Axis::Mileage => {
                self.move_slider(option.position)?;
                self.driver.wait(Duration::from_secs(1));
                Ok(())
            }
        }
    }

    fn read_quote(&mut self) -> Result<RawQuote> {
        let price = self.driver.find(&price_locator())?;
        Ok(RawQuote {
            price_text: self.driver.text(&price)?,
            note: None,
        })
    }

    fn close_listing(&mut self) -> Result<()> {
        let back = self.driver.find(&Locator::text("Voltar"))?;
        self.driver.click(&back)?;
        self.driver.wait(Duration::from_secs(1));
        self.on_collection = true;
        Ok(())
    }

    fn return_to_collection(&mut self) -> Result<()> {
        self.load_brand(self.brand)
    }
}
