use super::traits::Orientation;
use crate::utils::binary_resolver;
use anyhow::{Context, Result};
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::{Child, Command};

/// `pm clear` is a hard failure when it does not answer within this window
const CLEAR_DATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Represents an Android device
#[derive(Debug, Clone)]
pub struct Device {
    pub serial: String,
    pub state: String,
}

impl Device {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

fn command(serial: Option<&str>) -> Result<Command> {
    let adb_path = binary_resolver::find_adb()?;
    let mut cmd = Command::new(adb_path);
    if let Some(s) = serial {
        cmd.args(["-s", s]);
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    Ok(cmd)
}

/// Get list of connected Android devices
pub async fn get_devices() -> Result<Vec<Device>> {
    let output = command(None)?
        .arg("devices")
        .output()
        .await
        .context("Failed to execute adb devices")?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        log::debug!("adb devices stderr: {}", stderr.trim());
    }

    Ok(parse_devices(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_devices(stdout: &str) -> Vec<Device> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some(Device {
                serial: parts.next()?.to_string(),
                state: parts.next()?.to_string(),
            })
        })
        .collect()
}

/// Execute an ADB shell command
pub async fn shell(serial: &str, cmd: &str) -> Result<String> {
    let output = command(Some(serial))?
        .args(["shell", cmd])
        .output()
        .await
        .with_context(|| format!("Failed to execute: adb shell {}", cmd))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ADB shell command failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Execute a raw ADB command
pub async fn exec(serial: &str, args: &[&str]) -> Result<String> {
    let output = command(Some(serial))?
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to execute: adb {:?}", args))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ADB command failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Execute ADB exec-out and return raw bytes
pub async fn exec_out_binary(serial: &str, cmd: &str) -> Result<Vec<u8>> {
    let output = command(Some(serial))?
        .args(["exec-out", cmd])
        .output()
        .await
        .with_context(|| format!("Failed to execute: adb exec-out {}", cmd))?;

    // exec-out may not set exit status properly, check if we got output
    if output.stdout.is_empty() && !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ADB exec-out command failed: {}", stderr.trim());
    }

    Ok(output.stdout)
}

pub async fn exec_out(serial: &str, cmd: &str) -> Result<String> {
    let bytes = exec_out_binary(serial, cmd).await?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Spawn a long-running adb process (logcat, screenrecord)
pub fn spawn(serial: &str, args: &[&str], stdout: Stdio) -> Result<Child> {
    let adb_path = binary_resolver::find_adb()?;
    Command::new(adb_path)
        .args(["-s", serial])
        .args(args)
        .stdout(stdout)
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn: adb {:?}", args))
}

/// Pull a file from device
pub async fn pull(serial: &str, remote: &str, local: &str) -> Result<()> {
    exec(serial, &["pull", remote, local])
        .await
        .with_context(|| format!("Failed to pull {} to {}", remote, local))?;
    Ok(())
}

/// Get screen resolution (handles rotation)
pub async fn get_screen_size(serial: &str) -> Result<(u32, u32)> {
    let output = shell(serial, "wm size").await?;
    let (width, height) = parse_screen_size(&output)
        .with_context(|| format!("Unexpected `wm size` output: {}", output.trim()))?;

    if orientation(serial).await.ok() == Some(Orientation::Landscape) && height > width {
        Ok((height, width))
    } else {
        Ok((width, height))
    }
}

/// Parse "Physical size: 1080x1920", preferring an "Override size" line
fn parse_screen_size(output: &str) -> Option<(u32, u32)> {
    let mut size = None;
    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        if !label.contains("size") {
            continue;
        }
        let Some((w, h)) = value.trim().split_once('x') else {
            continue;
        };
        if let (Ok(w), Ok(h)) = (w.trim().parse(), h.trim().parse()) {
            size = Some((w, h));
            if label.contains("Override") {
                break;
            }
        }
    }
    size
}

/// Display orientation from `SurfaceOrientation` (0/2 portrait, 1/3 landscape)
pub async fn orientation(serial: &str) -> Result<Orientation> {
    let output = shell(serial, "dumpsys input | grep SurfaceOrientation").await?;
    let rotation = output
        .split(':')
        .nth(1)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    Ok(if rotation % 2 == 1 {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    })
}

/// Clear application data; `pm clear` must answer "Success"
pub async fn clear_app_data(serial: &str, package: &str) -> Result<()> {
    let cmd = format!("pm clear {}", package);
    let output = tokio::time::timeout(CLEAR_DATA_TIMEOUT, shell(serial, &cmd))
        .await
        .with_context(|| {
            format!(
                "Timed out after {}s clearing data for {}",
                CLEAR_DATA_TIMEOUT.as_secs(),
                package
            )
        })??;

    if !output.contains("Success") {
        anyhow::bail!("Failed to clear data for {}: {}", package, output.trim());
    }
    log::info!("Cleared app data for {}", package);
    Ok(())
}

pub async fn force_stop(serial: &str, package: &str) -> Result<()> {
    shell(serial, &format!("am force-stop {}", package)).await?;
    Ok(())
}

/// Start the launcher activity of a package
pub async fn launch(serial: &str, package: &str) -> Result<()> {
    let output = shell(
        serial,
        &format!("monkey -p {} -c android.intent.category.LAUNCHER 1", package),
    )
    .await?;
    if output.contains("No activities found") {
        anyhow::bail!("No launchable activity found for {}", package);
    }
    Ok(())
}

/// Package owning the focused window
pub async fn current_package(serial: &str) -> Result<String> {
    let output = shell(serial, "dumpsys window | grep -E 'mCurrentFocus|mFocusedApp'").await?;
    parse_focused_package(&output)
        .with_context(|| format!("Could not determine foreground package from: {}", output.trim()))
}

fn focus_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:mCurrentFocus|mFocusedApp)=\S+\{[^}]*?\s([A-Za-z0-9_.]+)/").ok()
    })
    .as_ref()
}

fn parse_focused_package(output: &str) -> Option<String> {
    focus_regex()?
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// Packages in the recent tasks stack, most recent first
pub async fn recent_packages(serial: &str) -> Result<Vec<String>> {
    let output = shell(serial, "dumpsys activity recents").await?;
    Ok(parse_recent_packages(&output))
}

fn recent_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"A=\d+:([a-zA-Z0-9_.]+)").ok())
        .as_ref()
}

pub fn parse_recent_packages(output: &str) -> Vec<String> {
    let Some(re) = recent_regex() else {
        return Vec::new();
    };
    output
        .lines()
        .filter(|line| line.contains("Recent #"))
        .filter_map(|line| re.captures(line).map(|c| c[1].to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let out = "List of devices attached\nemulator-5554\tdevice\nR58M\tunauthorized\n\n";
        let devices = parse_devices(out);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert!(devices[0].is_online());
        assert!(!devices[1].is_online());
    }

    #[test]
    fn test_parse_screen_size_prefers_override() {
        assert_eq!(
            parse_screen_size("Physical size: 1080x2400\n"),
            Some((1080, 2400))
        );
        assert_eq!(
            parse_screen_size("Physical size: 1440x3040\nOverride size: 1080x2280\n"),
            Some((1080, 2280))
        );
        assert_eq!(parse_screen_size("garbage"), None);
    }

    #[test]
    fn test_parse_recent_packages() {
        let out = "\
  * Recent #0: Task{5f2 #41 type=standard A=10123:com.example.app U=0 visible=true}
    userId=0 effectiveUid=u0a123
  * Recent #1: Task{7a1 #1 type=home A=10045:com.android.launcher3 U=0}
";
        assert_eq!(
            parse_recent_packages(out),
            vec!["com.example.app".to_string(), "com.android.launcher3".to_string()]
        );
    }

    #[test]
    fn test_parse_focused_package() {
        let out = "  mCurrentFocus=Window{3c1 u0 com.example.app/com.example.app.MainActivity}\n";
        assert_eq!(parse_focused_package(out).as_deref(), Some("com.example.app"));

        let out = "  mFocusedApp=ActivityRecord{9d u0 com.android.settings/.Settings t12}\n";
        assert_eq!(parse_focused_package(out).as_deref(), Some("com.android.settings"));
    }
}
