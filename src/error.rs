use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Format error: cannot read {field} from {text:?}")]
    Format { field: &'static str, text: String },

    #[error("Element not found: {locator}")]
    ElementNotFound { locator: String },

    #[error("Navigation error: {context}")]
    Navigation { context: String },

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ScrapeError {
    pub fn format(field: &'static str, text: impl Into<String>) -> Self {
        ScrapeError::Format {
            field,
            text: text.into(),
        }
    }

    pub fn not_found(locator: impl ToString) -> Self {
        ScrapeError::ElementNotFound {
            locator: locator.to_string(),
        }
    }

    pub fn navigation(context: impl Into<String>) -> Self {
        ScrapeError::Navigation {
            context: context.into(),
        }
    }

    /// Errors caused by the page not having settled yet. Only these are worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScrapeError::ElementNotFound { .. })
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self, ScrapeError::Navigation { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
