use crate::driver::traits::Backend;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the resolution and execution engine.
///
/// Driver collaborators report failures through `anyhow`; those surface here
/// as [`Error::Backend`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported selector type: {0}")]
    UnsupportedSelectorType(String),

    #[error("Selector type '{selector}' is not supported by the {backend} backend")]
    UnsupportedForBackend { selector: String, backend: Backend },

    #[error("Selector type '{0}' is already registered")]
    DuplicateSelectorType(String),

    #[error("Locator key '{0}' is not defined in the locator catalog")]
    UnknownLocator(String),

    #[error("Element '{key}' not found (tried: {})", attempts.join(", "))]
    ElementNotFound { key: String, attempts: Vec<String> },

    #[error("Element '{key}' not found within {:.1}s", elapsed.as_secs_f64())]
    ElementNotFoundWithinTimeout { key: String, elapsed: Duration },

    #[error("Element '{key}' not reached after {swipes} swipe(s)")]
    SwipeExhausted { key: String, swipes: u32 },

    #[error("Invalid swipe direction: '{0}' (expected up, down, left or right)")]
    InvalidDirection(String),

    #[error("{0}")]
    AssertionFailed(String),

    #[error("Unknown assertion type: {0}")]
    UnknownAssertion(String),

    #[error("Duplicate locator key '{key}' found in {file}")]
    DuplicateLocator { key: String, file: String },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    /// True for the recoverable "nothing matched" class of failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ElementNotFound { .. }
                | Error::ElementNotFoundWithinTimeout { .. }
                | Error::SwipeExhausted { .. }
        )
    }

    /// True for selector configuration errors that must abort a lookup
    /// instead of falling through to the next strategy.
    pub fn is_selector_config(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedSelectorType(_)
                | Error::UnsupportedForBackend { .. }
                | Error::DuplicateSelectorType(_)
        )
    }

    /// True for definition errors that fail the same way on every attempt.
    /// These are never retried.
    pub fn is_configuration(&self) -> bool {
        self.is_selector_config()
            || matches!(self, Error::UnknownLocator(_) | Error::InvalidDefinition(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = Error::ElementNotFound {
            key: "login".into(),
            attempts: vec!["primary".into()],
        };
        assert!(err.is_not_found());
        assert!(!err.is_selector_config());
        assert_eq!(err.to_string(), "Element 'login' not found (tried: primary)");

        let err = Error::UnsupportedForBackend {
            selector: "image".into(),
            backend: Backend::Uiautomator2,
        };
        assert!(err.is_selector_config());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(Error::UnknownLocator("logo".into()).is_configuration());
        assert!(Error::InvalidDefinition("bad".into()).is_configuration());
        assert!(Error::DuplicateSelectorType("text".into()).is_configuration());

        let not_found = Error::SwipeExhausted {
            key: "banner".into(),
            swipes: 3,
        };
        assert!(!not_found.is_configuration());
        assert!(!Error::Backend(anyhow::anyhow!("adb offline")).is_configuration());
    }

    #[test]
    fn test_timeout_message_carries_elapsed() {
        let err = Error::ElementNotFoundWithinTimeout {
            key: "banner".into(),
            elapsed: Duration::from_millis(2500),
        };
        assert_eq!(err.to_string(), "Element 'banner' not found within 2.5s");
    }
}
