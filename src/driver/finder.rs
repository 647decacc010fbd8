use super::selector::{BackendLocator, SelectorTransformer};
use super::traits::{DeviceDriver, Element};
use crate::error::Result;
use std::sync::Arc;

/// Single-attempt element lookup with generic selectors.
///
/// Every call transforms the selector for the driver's backend and issues
/// exactly one backend query. There is no retry and no waiting here.
#[derive(Clone)]
pub struct UnifiedFinder {
    driver: Arc<dyn DeviceDriver>,
    transformer: Arc<SelectorTransformer>,
}

impl UnifiedFinder {
    pub fn new(driver: Arc<dyn DeviceDriver>, transformer: Arc<SelectorTransformer>) -> Self {
        Self {
            driver,
            transformer,
        }
    }

    pub fn driver(&self) -> &Arc<dyn DeviceDriver> {
        &self.driver
    }

    pub fn locator(&self, selector_type: &str, value: &str) -> Result<BackendLocator> {
        self.transformer
            .transform(selector_type, value, self.driver.backend())
    }

    pub async fn find_one(&self, selector_type: &str, value: &str) -> Result<Element> {
        let locator = self.locator(selector_type, value)?;
        Ok(self.driver.find_element(&locator).await?)
    }

    pub async fn find_all(&self, selector_type: &str, value: &str) -> Result<Vec<Element>> {
        let locator = self.locator(selector_type, value)?;
        Ok(self.driver.find_elements(&locator).await?)
    }

    /// Query descendants of `parent` with a generic selector
    pub async fn find_children(
        &self,
        parent: &Element,
        selector_type: &str,
        value: &str,
    ) -> Result<Vec<Element>> {
        let locator = self.locator(selector_type, value)?;
        Ok(parent.find_children(&locator).await?)
    }
}
