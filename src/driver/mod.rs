pub mod adb;
pub mod appium;
pub mod finder;
pub mod selector;
pub mod traits;
pub mod uiautomator2;

#[cfg(test)]
pub(crate) mod testing;

use crate::utils::config::FrameworkConfig;
use anyhow::Result;
use colored::Colorize;
use serde_json::{Map, Value};
use std::sync::Arc;
use traits::{Backend, DeviceDriver};

/// A device a worker can drive, with the backend to use for it
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    pub id: String,
    pub backend: Backend,
    pub server_url: Option<String>,
    pub capabilities: Map<String, Value>,
}

impl DeviceTarget {
    pub fn uiautomator2(id: &str) -> Self {
        Self {
            id: id.to_string(),
            backend: Backend::Uiautomator2,
            server_url: None,
            capabilities: Map::new(),
        }
    }

    /// Open a driver session for this device
    pub async fn connect(&self) -> Result<Arc<dyn DeviceDriver>> {
        Ok(match self.backend {
            Backend::Uiautomator2 => Arc::new(uiautomator2::Uiautomator2Driver::connect(&self.id).await?),
            Backend::Appium => {
                let url = self
                    .server_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("No Appium server URL for {}", self.id))?;
                Arc::new(appium::AppiumDriver::connect(&self.id, url, &self.capabilities).await?)
            }
        })
    }
}

/// Eligible devices in priority order: configured uiautomator2 devices, then
/// configured Appium devices, else every connected adb device on uiautomator2.
pub async fn eligible_devices(config: &FrameworkConfig) -> Result<Vec<DeviceTarget>> {
    let connected: Vec<String> = adb::get_devices()
        .await
        .unwrap_or_else(|e| {
            log::warn!("Could not list adb devices: {:#}", e);
            Vec::new()
        })
        .into_iter()
        .filter(|d| d.is_online())
        .map(|d| d.serial)
        .collect();

    Ok(select_devices(config, &connected))
}

fn select_devices(config: &FrameworkConfig, connected: &[String]) -> Vec<DeviceTarget> {
    let u2 = &config.drivers.uiautomator2;
    if u2.enabled && !u2.device_ids.is_empty() {
        let targets: Vec<DeviceTarget> = u2
            .device_ids
            .iter()
            .filter(|id| connected.contains(id))
            .map(|id| DeviceTarget::uiautomator2(id))
            .collect();
        if !targets.is_empty() {
            return targets;
        }
        log::warn!("None of the configured uiautomator2 devices are connected");
    }

    let appium = &config.drivers.appium;
    if appium.enabled {
        let targets: Vec<DeviceTarget> = appium
            .devices
            .iter()
            .filter(|d| connected.contains(&d.udid))
            .map(|d| DeviceTarget {
                id: d.udid.clone(),
                backend: Backend::Appium,
                server_url: Some(d.server_url.clone()),
                capabilities: d.capabilities.clone(),
            })
            .collect();
        if !targets.is_empty() {
            return targets;
        }
    }

    connected.iter().map(|id| DeviceTarget::uiautomator2(id)).collect()
}

/// Print connected Android devices
pub async fn list_devices() -> Result<()> {
    let devices = adb::get_devices().await?;
    if devices.is_empty() {
        println!("{} No Android devices connected", "ℹ".blue());
        return Ok(());
    }
    println!("{}", "Connected devices:".bold());
    for device in devices {
        let state = if device.is_online() {
            device.state.green()
        } else {
            device.state.yellow()
        };
        println!("  {} [{}]", device.serial.cyan(), state);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::AppiumDevice;

    fn connected() -> Vec<String> {
        vec!["emulator-5554".to_string(), "R58M".to_string()]
    }

    #[test]
    fn test_uiautomator2_devices_take_priority() {
        let mut config = FrameworkConfig::default();
        config.drivers.uiautomator2.device_ids = vec!["R58M".into(), "offline-1".into()];
        config.drivers.appium.enabled = true;
        config.drivers.appium.devices = vec![AppiumDevice {
            udid: "emulator-5554".into(),
            server_url: "http://127.0.0.1:4723".into(),
            capabilities: Map::new(),
        }];

        let targets = select_devices(&config, &connected());
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, "R58M");
        assert_eq!(targets[0].backend, Backend::Uiautomator2);

        config.drivers.uiautomator2.device_ids.clear();
        let targets = select_devices(&config, &connected());
        assert_eq!(targets[0].backend, Backend::Appium);
        assert_eq!(targets[0].server_url.as_deref(), Some("http://127.0.0.1:4723"));
    }

    #[test]
    fn test_falls_back_to_every_connected_device() {
        let config = FrameworkConfig::default();
        let targets = select_devices(&config, &connected());
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "emulator-5554");
        assert!(targets.iter().all(|t| t.backend == Backend::Uiautomator2));

        assert!(select_devices(&config, &[]).is_empty());
    }
}
