use crate::driver::finder::UnifiedFinder;
use crate::driver::traits::{Bounds, DeviceDriver, Element};
use crate::error::{Error, Result};
use crate::parser::locators::{LocatorCatalog, Strategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of one strategy in a fallback chain
enum Attempt<T> {
    Found(T),
    /// Nothing usable; try the next strategy
    Miss(String),
}

/// Resolves symbolic locator keys through their fallback chains
#[derive(Clone)]
pub struct Resolver {
    finder: UnifiedFinder,
    catalog: Arc<LocatorCatalog>,
    poll_interval: Duration,
}

impl Resolver {
    pub fn new(finder: UnifiedFinder, catalog: Arc<LocatorCatalog>, poll_interval: Duration) -> Self {
        Self {
            finder,
            catalog,
            poll_interval,
        }
    }

    pub fn finder(&self) -> &UnifiedFinder {
        &self.finder
    }

    pub fn driver(&self) -> &Arc<dyn DeviceDriver> {
        self.finder.driver()
    }

    pub fn catalog(&self) -> &LocatorCatalog {
        &self.catalog
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn attempt_one(&self, strategy: &Strategy) -> Result<Attempt<Element>> {
        match self.finder.find_one(&strategy.kind, &strategy.value).await {
            Ok(element) => Ok(Attempt::Found(element)),
            Err(e) if e.is_selector_config() => Err(e),
            Err(e) => Ok(Attempt::Miss(e.to_string())),
        }
    }

    async fn attempt_all(&self, strategy: &Strategy) -> Result<Attempt<Vec<Element>>> {
        match self.finder.find_all(&strategy.kind, &strategy.value).await {
            Ok(elements) if !elements.is_empty() => Ok(Attempt::Found(elements)),
            Ok(_) => Ok(Attempt::Miss("no matches".to_string())),
            Err(e) if e.is_selector_config() => Err(e),
            Err(e) => Ok(Attempt::Miss(e.to_string())),
        }
    }

    /// Try each strategy in chain order; the first hit wins
    pub async fn resolve(&self, key: &str) -> Result<Element> {
        let definition = self.catalog.get(key)?;
        let mut tried = Vec::with_capacity(definition.len());

        for (name, strategy) in definition.strategies() {
            match self.attempt_one(strategy).await? {
                Attempt::Found(element) => {
                    log::debug!("Resolved '{}' with {} ({}={})", key, name, strategy.kind, strategy.value);
                    return Ok(element);
                }
                Attempt::Miss(reason) => {
                    log::debug!("'{}' {} ({}={}) missed: {}", key, name, strategy.kind, strategy.value, reason);
                    tried.push(name.to_string());
                }
            }
        }

        Err(Error::ElementNotFound {
            key: key.to_string(),
            attempts: tried,
        })
    }

    /// Poll [`Self::resolve`] until it succeeds or `timeout` elapses
    pub async fn resolve_with_wait(&self, key: &str, timeout: Duration) -> Result<Element> {
        let start = Instant::now();
        loop {
            match self.resolve(key).await {
                Ok(element) => return Ok(element),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::ElementNotFoundWithinTimeout {
                    key: key.to_string(),
                    elapsed,
                });
            }
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// All matches of the first strategy that matches anything; empty when none does
    pub async fn resolve_all(&self, key: &str) -> Result<Vec<Element>> {
        let definition = self.catalog.get(key)?;
        for (name, strategy) in definition.strategies() {
            match self.attempt_all(strategy).await? {
                Attempt::Found(elements) => {
                    log::debug!("Resolved {} '{}' elements with {}", elements.len(), key, name);
                    return Ok(elements);
                }
                Attempt::Miss(reason) => log::debug!("'{}' {} missed: {}", key, name, reason),
            }
        }
        Ok(Vec::new())
    }

    pub async fn resolve_all_with_wait(&self, key: &str, timeout: Duration) -> Result<Vec<Element>> {
        let start = Instant::now();
        loop {
            let elements = self.resolve_all(key).await?;
            let elapsed = start.elapsed();
            if !elements.is_empty() || elapsed >= timeout {
                return Ok(elements);
            }
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Resolves and reports itself visible. A missing element is not visible.
    pub async fn is_visible(&self, key: &str) -> Result<bool> {
        match self.resolve(key).await {
            Ok(element) => Ok(element_visible(&element).await),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn bounds(&self, key: &str) -> Result<Bounds> {
        let element = self.resolve(key).await?;
        Ok(element.bounds().await?)
    }
}

/// Backend visibility flag; a handle that went stale counts as not visible
pub async fn element_visible(element: &Element) -> bool {
    match element.is_visible().await {
        Ok(visible) => visible,
        Err(e) => {
            log::debug!("Visibility check failed: {:#}", e);
            false
        }
    }
}
