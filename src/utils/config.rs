use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Framework configuration (`config/framework.yaml`).
///
/// Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub core: CoreConfig,
    pub drivers: DriversConfig,
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Root directory for results, screenshots, videos and device logs
    pub artifacts_root: PathBuf,
    pub parallel_execution: bool,
    pub max_workers: usize,
    /// Extra attempts for a failing step action
    pub retry_count: u32,
    /// Pause between action attempts (seconds)
    pub retry_backoff_secs: f64,
    /// Locator resolver poll interval (ms)
    pub poll_interval_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from("artifacts"),
            parallel_execution: false,
            max_workers: 4,
            retry_count: 1,
            retry_backoff_secs: 2.0,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    pub uiautomator2: Uiautomator2Config,
    pub appium: AppiumConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Uiautomator2Config {
    pub enabled: bool,
    #[serde(alias = "deviceIds")]
    pub device_ids: Vec<String>,
}

impl Default for Uiautomator2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            device_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppiumConfig {
    pub enabled: bool,
    pub devices: Vec<AppiumDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppiumDevice {
    pub udid: String,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub capabilities: serde_json::Map<String, serde_json::Value>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:4723".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub screenshots: ScreenshotConfig,
    pub videos: VideoConfig,
    pub logs: LogConfig,
    pub device_logs: DeviceLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// Capture after every step action
    pub enabled: bool,
    /// Capture after every failed attempt
    pub on_failure: bool,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,
    pub save_on_failure: bool,
    pub save_on_pass: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            save_on_failure: true,
            save_on_pass: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLogConfig {
    pub enabled: bool,
    pub clear_before_test: bool,
    /// logcat priority: VERBOSE, DEBUG, INFO, WARN or ERROR
    pub log_level: String,
    /// Restrict capture to these tags
    pub include_tags: Vec<String>,
}

impl Default for DeviceLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clear_before_test: true,
            log_level: "INFO".to_string(),
            include_tags: Vec::new(),
        }
    }
}

impl DeviceLogConfig {
    /// logcat arguments for this configuration
    pub fn logcat_args(&self) -> Vec<String> {
        let priority = match self.log_level.to_uppercase().as_str() {
            "VERBOSE" => "V",
            "DEBUG" => "D",
            "WARN" => "W",
            "ERROR" => "E",
            _ => "I",
        };
        let mut args = vec!["logcat".to_string(), "-v".to_string(), "time".to_string()];
        if self.include_tags.is_empty() {
            args.push(format!("*:{}", priority));
        } else {
            args.extend(self.include_tags.iter().map(|t| format!("{}:{}", t, priority)));
            args.push("*:S".to_string());
        }
        args
    }
}

impl FrameworkConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.core.retry_backoff_secs.max(0.0))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.core.poll_interval_ms.max(1))
    }

    pub fn results_dir(&self) -> PathBuf {
        self.core.artifacts_root.join("results")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = FrameworkConfig::from_yaml(
            r#"
core:
  retry_count: 3
drivers:
  uiautomator2:
    deviceIds: [emulator-5554]
  appium:
    enabled: true
    devices:
      - udid: R58M123
        capabilities:
          appium:newCommandTimeout: 300
"#,
        )
        .unwrap();

        assert_eq!(config.core.retry_count, 3);
        assert_eq!(config.core.max_workers, 4);
        assert_eq!(config.retry_backoff(), Duration::from_secs(2));
        assert_eq!(config.drivers.uiautomator2.device_ids, vec!["emulator-5554"]);
        assert!(config.drivers.uiautomator2.enabled);
        let device = &config.drivers.appium.devices[0];
        assert_eq!(device.server_url, "http://127.0.0.1:4723");
        assert_eq!(device.capabilities["appium:newCommandTimeout"], 300);
        assert!(config.artifacts.screenshots.on_failure);
        assert_eq!(config.results_dir(), PathBuf::from("artifacts/results"));
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = FrameworkConfig::from_yaml("").unwrap();
        assert_eq!(config.core.poll_interval_ms, 500);
        assert!(!config.core.parallel_execution);
    }

    #[test]
    fn test_logcat_args() {
        let mut logs = DeviceLogConfig::default();
        assert_eq!(logs.logcat_args(), vec!["logcat", "-v", "time", "*:I"]);

        logs.log_level = "debug".into();
        logs.include_tags = vec!["Analytics".into()];
        assert_eq!(
            logs.logcat_args(),
            vec!["logcat", "-v", "time", "Analytics:D", "*:S"]
        );
    }
}
