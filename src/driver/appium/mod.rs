//! XPath-style backend talking to an Appium server.

pub mod client;

use crate::driver::selector::BackendLocator;
use crate::driver::traits::{
    Backend, Bounds, DeviceDriver, Element, ElementHandle, Orientation, Point,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use client::WebDriverClient;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

pub struct AppiumDriver {
    udid: String,
    client: Arc<WebDriverClient>,
}

impl AppiumDriver {
    /// Open a session for `udid`; explicit capabilities override the defaults
    pub async fn connect(udid: &str, server_url: &str, capabilities: &Map<String, Value>) -> Result<Self> {
        let mut caps = Map::new();
        caps.insert("platformName".into(), Value::from("Android"));
        caps.insert("appium:automationName".into(), Value::from("UiAutomator2"));
        caps.insert("appium:udid".into(), Value::from(udid));
        caps.insert("appium:noReset".into(), Value::from(true));
        for (key, value) in capabilities {
            caps.insert(key.clone(), value.clone());
        }

        let client = WebDriverClient::start_session(server_url, Value::Object(caps))
            .await
            .with_context(|| format!("Failed to start Appium session for {}", udid))?;
        Ok(Self {
            udid: udid.to_string(),
            client: Arc::new(client),
        })
    }

    fn query(locator: &BackendLocator) -> Result<(&str, &str)> {
        match locator {
            BackendLocator::Query { using, value } => Ok((using.as_str(), value.as_str())),
            BackendLocator::Native(_) => {
                anyhow::bail!("Appium backend cannot run native query {}", locator)
            }
        }
    }

    fn handle(&self, id: String) -> Element {
        Box::new(AppiumElement {
            client: self.client.clone(),
            id,
        })
    }
}

#[async_trait]
impl DeviceDriver for AppiumDriver {
    fn backend(&self) -> Backend {
        Backend::Appium
    }

    fn device_id(&self) -> &str {
        &self.udid
    }

    async fn find_element(&self, locator: &BackendLocator) -> Result<Element> {
        let (using, value) = Self::query(locator)?;
        let id = self.client.find_element(using, value, None).await?;
        Ok(self.handle(id))
    }

    async fn find_elements(&self, locator: &BackendLocator) -> Result<Vec<Element>> {
        let (using, value) = Self::query(locator)?;
        let ids = self.client.find_elements(using, value, None).await?;
        Ok(ids.into_iter().map(|id| self.handle(id)).collect())
    }

    async fn screen_size(&self) -> Result<(u32, u32)> {
        self.client.window_size().await
    }

    async fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        self.client.swipe(from, to, duration_ms).await
    }

    async fn launch_app(&self, package: &str) -> Result<()> {
        self.client.activate_app(package).await
    }

    async fn stop_app(&self, package: &str) -> Result<()> {
        self.client.terminate_app(package).await
    }

    async fn current_package(&self) -> Result<String> {
        self.client.current_package().await
    }

    async fn orientation(&self) -> Result<Orientation> {
        self.client.orientation().await?.parse()
    }

    async fn take_screenshot(&self, path: &Path) -> Result<()> {
        let encoded = self.client.screenshot().await?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("Failed to decode screenshot")?;
        tokio::fs::write(path, png)
            .await
            .with_context(|| format!("Failed to write screenshot {}", path.display()))
    }

    async fn close(&self) -> Result<()> {
        self.client.delete_session().await
    }
}

struct AppiumElement {
    client: Arc<WebDriverClient>,
    id: String,
}

#[async_trait]
impl ElementHandle for AppiumElement {
    async fn click(&self) -> Result<()> {
        self.client.click(&self.id).await
    }

    async fn text(&self) -> Result<String> {
        let text = self.client.text(&self.id).await?;
        if !text.is_empty() {
            return Ok(text);
        }
        Ok(self
            .client
            .attribute(&self.id, "contentDescription")
            .await?
            .unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.client.attribute(&self.id, name).await
    }

    async fn bounds(&self) -> Result<Bounds> {
        self.client.rect(&self.id).await
    }

    async fn class_name(&self) -> Result<String> {
        self.client.tag_name(&self.id).await
    }

    async fn is_visible(&self) -> Result<bool> {
        self.client.displayed(&self.id).await
    }

    async fn is_enabled(&self) -> Result<bool> {
        self.client.enabled(&self.id).await
    }

    async fn is_selected(&self) -> Result<bool> {
        self.client.selected(&self.id).await
    }

    async fn find_children(&self, locator: &BackendLocator) -> Result<Vec<Element>> {
        let (using, value) = AppiumDriver::query(locator)?;
        let ids = self.client.find_elements(using, value, Some(&self.id)).await?;
        Ok(ids
            .into_iter()
            .map(|id| {
                Box::new(AppiumElement {
                    client: self.client.clone(),
                    id,
                }) as Element
            })
            .collect())
    }
}
