use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;

fn adb_name() -> &'static str {
    if cfg!(windows) {
        "adb.exe"
    } else {
        "adb"
    }
}

/// Candidate SDK roots: `$ANDROID_HOME`, `$ANDROID_SDK_ROOT`, then the usual
/// per-user install locations
fn sdk_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .iter()
        .filter_map(|var| std::env::var_os(var).map(PathBuf::from))
        .collect();

    if let Some(home) = dirs::home_dir() {
        roots.push(home.join("Android").join("Sdk"));
        roots.push(home.join("Library").join("Android").join("sdk"));
    }
    if let Some(local) = dirs::data_local_dir() {
        roots.push(local.join("Android").join("Sdk"));
    }
    roots
}

fn resolve_adb() -> Result<PathBuf> {
    let mut checked = Vec::new();

    for root in sdk_roots() {
        let candidate = root.join("platform-tools").join(adb_name());
        if candidate.exists() {
            return Ok(candidate);
        }
        checked.push(candidate.display().to_string());
    }

    if let Ok(path) = which::which(adb_name()) {
        return Ok(path);
    }

    Err(anyhow::anyhow!(
        "Could not find adb in an Android SDK or on PATH. Checked paths:\n{}",
        checked.join("\n")
    ))
}

/// Locate the adb binary; the lookup runs once per process
pub fn find_adb() -> Result<PathBuf> {
    static ADB: OnceLock<std::result::Result<PathBuf, String>> = OnceLock::new();
    ADB.get_or_init(|| resolve_adb().map_err(|e| e.to_string()))
        .clone()
        .map_err(|e| anyhow::anyhow!(e))
}
