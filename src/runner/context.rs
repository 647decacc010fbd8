use crate::report::types::TestArtifacts;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Device ids can contain `:` (tcp serials); keep directory names portable
pub fn safe_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// Per-test runtime information and artifact locations
#[derive(Debug, Clone)]
pub struct TestContext {
    pub test_id: String,
    pub device_id: String,
    /// Screenshots for this test on this device
    pub screenshots_dir: PathBuf,
    pub videos_dir: PathBuf,
    /// Captured device log, read by `event_triggered`
    pub log_file: PathBuf,
}

impl TestContext {
    /// Lay out `<root>/{screenshots,videos,device_logs}/<device>/` and create
    /// the directories
    pub fn new(artifacts_root: &Path, test_id: &str, device_id: &str) -> Result<Self> {
        let device = safe_name(device_id);
        let screenshots_dir = artifacts_root.join("screenshots").join(&device).join(test_id);
        let videos_dir = artifacts_root.join("videos").join(&device);
        let logs_dir = artifacts_root.join("device_logs").join(&device);

        for dir in [&screenshots_dir, &videos_dir, &logs_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create artifact directory {}", dir.display()))?;
        }

        Ok(Self {
            test_id: test_id.to_string(),
            device_id: device_id.to_string(),
            screenshots_dir,
            videos_dir,
            log_file: logs_dir.join(format!("{}.log", test_id)),
        })
    }

    /// `<step_id>_<ts>.png`, or `<step_id>_fail_<ts>.png` for a failed attempt
    pub fn screenshot_path(&self, step_id: &str, failed: bool) -> PathBuf {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S%3f");
        let name = if failed {
            format!("{}_fail_{}.png", step_id, ts)
        } else {
            format!("{}_{}.png", step_id, ts)
        };
        self.screenshots_dir.join(name)
    }

    pub fn video_path(&self) -> PathBuf {
        self.videos_dir.join(format!("{}.mp4", self.test_id))
    }

    pub fn artifacts(&self) -> TestArtifacts {
        TestArtifacts {
            screenshots_dir: Some(self.screenshots_dir.display().to_string()),
            log_file: self
                .log_file
                .exists()
                .then(|| self.log_file.display().to_string()),
            video: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let root = tempfile::tempdir().unwrap();
        let ctx = TestContext::new(root.path(), "TC001", "192.168.1.5:5555").unwrap();

        assert!(ctx.screenshots_dir.is_dir());
        assert!(ctx.videos_dir.is_dir());
        assert_eq!(
            ctx.log_file,
            root.path().join("device_logs/192.168.1.5_5555/TC001.log")
        );
        assert_eq!(ctx.video_path(), root.path().join("videos/192.168.1.5_5555/TC001.mp4"));

        let shot = ctx.screenshot_path("LOGIN", true);
        let name = shot.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("LOGIN_fail_") && name.ends_with(".png"));
        assert!(ctx.artifacts().log_file.is_none());
    }
}
