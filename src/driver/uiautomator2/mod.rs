//! Native-query backend driving a device through `adb` and `uiautomator dump`.

pub mod hierarchy;
pub mod query;

use crate::driver::adb;
use crate::driver::selector::BackendLocator;
use crate::driver::traits::{
    Backend, Bounds, DeviceDriver, Element, ElementHandle, Orientation, Point,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use hierarchy::UiNode;
use std::path::Path;
use std::sync::Arc;

pub struct Uiautomator2Driver {
    serial: String,
}

impl Uiautomator2Driver {
    pub async fn connect(serial: &str) -> Result<Self> {
        let state = adb::exec(serial, &["get-state"])
            .await
            .with_context(|| format!("Device {} is not reachable", serial))?;
        if state.trim() != "device" {
            anyhow::bail!("Device {} is in state '{}'", serial, state.trim());
        }
        log::debug!("Connected to {} via uiautomator2", serial);
        Ok(Self {
            serial: serial.to_string(),
        })
    }

    /// Fresh hierarchy snapshot; never cached so lookups reflect live state
    async fn dump(&self) -> Result<Arc<Vec<UiNode>>> {
        let xml = match adb::exec_out(&self.serial, "uiautomator dump /dev/stdout").await {
            Ok(output) if output.contains("<hierarchy") => output,
            _ => {
                // Older Android versions cannot dump to stdout
                adb::shell(
                    &self.serial,
                    "uiautomator dump /sdcard/window_dump.xml > /dev/null && cat /sdcard/window_dump.xml",
                )
                .await?
            }
        };
        Ok(Arc::new(hierarchy::parse_hierarchy(&xml)?))
    }

    fn handles(&self, nodes: &Arc<Vec<UiNode>>, indices: Vec<usize>) -> Vec<Element> {
        indices
            .into_iter()
            .map(|index| {
                Box::new(Uiautomator2Element {
                    serial: self.serial.clone(),
                    nodes: nodes.clone(),
                    index,
                }) as Element
            })
            .collect()
    }
}

#[async_trait]
impl DeviceDriver for Uiautomator2Driver {
    fn backend(&self) -> Backend {
        Backend::Uiautomator2
    }

    fn device_id(&self) -> &str {
        &self.serial
    }

    async fn find_element(&self, locator: &BackendLocator) -> Result<Element> {
        self.find_elements(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No element matches {}", locator))
    }

    async fn find_elements(&self, locator: &BackendLocator) -> Result<Vec<Element>> {
        let nodes = self.dump().await?;
        let indices = query::select(&nodes, locator, None)?;
        Ok(self.handles(&nodes, indices))
    }

    async fn screen_size(&self) -> Result<(u32, u32)> {
        adb::get_screen_size(&self.serial).await
    }

    async fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        let cmd = format!(
            "input swipe {} {} {} {} {}",
            from.x, from.y, to.x, to.y, duration_ms
        );
        adb::shell(&self.serial, &cmd).await?;
        Ok(())
    }

    async fn launch_app(&self, package: &str) -> Result<()> {
        adb::launch(&self.serial, package).await
    }

    async fn stop_app(&self, package: &str) -> Result<()> {
        adb::force_stop(&self.serial, package).await
    }

    async fn current_package(&self) -> Result<String> {
        adb::current_package(&self.serial).await
    }

    async fn orientation(&self) -> Result<Orientation> {
        adb::orientation(&self.serial).await
    }

    async fn take_screenshot(&self, path: &Path) -> Result<()> {
        let png = adb::exec_out_binary(&self.serial, "screencap -p").await?;
        tokio::fs::write(path, png)
            .await
            .with_context(|| format!("Failed to write screenshot {}", path.display()))
    }
}

/// Node of one hierarchy snapshot
struct Uiautomator2Element {
    serial: String,
    nodes: Arc<Vec<UiNode>>,
    index: usize,
}

impl Uiautomator2Element {
    fn node(&self) -> Result<&UiNode> {
        self.nodes
            .get(self.index)
            .context("Element no longer present in hierarchy snapshot")
    }
}

#[async_trait]
impl ElementHandle for Uiautomator2Element {
    async fn click(&self) -> Result<()> {
        let center = self.node()?.bounds.center();
        adb::shell(&self.serial, &format!("input tap {} {}", center.x, center.y)).await?;
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        let node = self.node()?;
        Ok(if node.text.is_empty() {
            node.content_desc.clone()
        } else {
            node.text.clone()
        })
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.node()?.attribute(name))
    }

    async fn bounds(&self) -> Result<Bounds> {
        Ok(self.node()?.bounds)
    }

    async fn class_name(&self) -> Result<String> {
        Ok(self.node()?.class.clone())
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(self.node()?.visible_to_user)
    }

    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.node()?.enabled)
    }

    async fn is_selected(&self) -> Result<bool> {
        let node = self.node()?;
        Ok(node.selected || node.checked)
    }

    async fn find_children(&self, locator: &BackendLocator) -> Result<Vec<Element>> {
        let indices = query::select(&self.nodes, locator, Some(self.index))?;
        Ok(indices
            .into_iter()
            .map(|index| {
                Box::new(Uiautomator2Element {
                    serial: self.serial.clone(),
                    nodes: self.nodes.clone(),
                    index,
                }) as Element
            })
            .collect())
    }
}
