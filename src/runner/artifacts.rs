//! Screenshots, screen recordings and device log capture for a running test.

use crate::driver::adb;
use crate::driver::traits::DeviceDriver;
use crate::utils::config::DeviceLogConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Child;

const REMOTE_RECORDING: &str = "/sdcard/mobi_runner_record.mp4";
const RECORDING_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Screenshot to `path`; a failed capture is logged, never fatal
pub async fn capture_screenshot(driver: &dyn DeviceDriver, path: &Path) -> Option<String> {
    match driver.take_screenshot(path).await {
        Ok(()) => {
            log::debug!("Screenshot saved: {}", path.display());
            Some(path.display().to_string())
        }
        Err(e) => {
            log::warn!("Screenshot failed for {}: {:#}", driver.device_id(), e);
            None
        }
    }
}

/// `adb logcat` streamed into a file for the duration of one test
pub struct LogCapture {
    child: Child,
    path: PathBuf,
}

impl LogCapture {
    pub async fn start(serial: &str, config: &DeviceLogConfig, path: &Path) -> Result<Self> {
        if config.clear_before_test {
            if let Err(e) = adb::exec(serial, &["logcat", "-c"]).await {
                log::warn!("Could not clear logcat on {}: {:#}", serial, e);
            }
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create device log {}", path.display()))?;
        let args = config.logcat_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let child = adb::spawn(serial, &args, Stdio::from(file))?;
        log::debug!("Capturing device log of {} into {}", serial, path.display());
        Ok(Self {
            child,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn stop(mut self) -> PathBuf {
        if let Err(e) = self.child.kill().await {
            log::debug!("logcat already exited: {}", e);
        }
        self.path
    }
}

/// On-device `screenrecord`, pulled to the host when kept
pub struct ScreenRecording {
    serial: String,
    child: Child,
    local: PathBuf,
}

impl ScreenRecording {
    pub fn start(serial: &str, local: &Path) -> Result<Self> {
        let child = adb::spawn(
            serial,
            &["shell", "screenrecord", "--bit-rate", "4000000", REMOTE_RECORDING],
            Stdio::null(),
        )?;
        Ok(Self {
            serial: serial.to_string(),
            child,
            local: local.to_path_buf(),
        })
    }

    /// Finalize the recording; pull it when `keep`, then delete it on the device
    pub async fn stop(mut self, keep: bool) -> Result<Option<PathBuf>> {
        // SIGINT lets screenrecord finish the mp4 container
        let _ = adb::shell(&self.serial, "pkill -2 screenrecord").await;
        if tokio::time::timeout(RECORDING_STOP_TIMEOUT, self.child.wait())
            .await
            .is_err()
        {
            log::warn!("screenrecord on {} did not exit, killing it", self.serial);
            let _ = self.child.kill().await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let saved = if keep {
            let local = self.local.display().to_string();
            adb::pull(&self.serial, REMOTE_RECORDING, &local).await?;
            log::info!("Saved video recording: {}", local);
            Some(self.local.clone())
        } else {
            None
        };
        if let Err(e) = adb::shell(&self.serial, &format!("rm -f {}", REMOTE_RECORDING)).await {
            log::debug!("Could not remove {}: {:#}", REMOTE_RECORDING, e);
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::MockDriver;
    use crate::driver::traits::Backend;

    #[tokio::test]
    async fn test_capture_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let driver = MockDriver::new(Backend::Uiautomator2);
        let path = dir.path().join("LOGIN_1.png");

        let saved = capture_screenshot(&driver, &path).await;
        assert_eq!(saved, Some(path.display().to_string()));
        assert!(path.exists());

        let missing_dir = dir.path().join("nope/LOGIN_2.png");
        assert!(capture_screenshot(&driver, &missing_dir).await.is_none());
        assert_eq!(driver.screenshots(), 1);
    }
}
