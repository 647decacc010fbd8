//! Result persistence.
//!
//! Every worker writes its record to a uniquely named shard, so concurrent
//! workers never touch the same file. [`aggregate`] folds the shards into
//! `results.json` once all workers are done.

use super::types::TestRecord;
use crate::runner::context::safe_name;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const RESULTS_FILE: &str = "results.json";
const SHARDS_DIR: &str = "shards";

/// Write one record to `<results_dir>/shards/<test>_<device>_<uuid>.json`
pub fn write_shard(results_dir: &Path, record: &TestRecord) -> Result<PathBuf> {
    let dir = results_dir.join(SHARDS_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create shard directory {}", dir.display()))?;

    let path = dir.join(format!(
        "{}_{}_{}.json",
        safe_name(&record.test_id),
        safe_name(&record.device_id),
        uuid::Uuid::new_v4()
    ));
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("Result shard written: {}", path.display());
    Ok(path)
}

/// Read a results file; a missing file is an empty collection
pub fn load_results(path: &Path) -> Result<Vec<TestRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).with_context(|| format!("Invalid results file {}", path.display()))
}

/// Merge every shard with the existing `results.json`, write it back and
/// delete the merged shards. Unreadable shards are left in place.
pub fn aggregate(results_dir: &Path) -> Result<Vec<TestRecord>> {
    let results_path = results_dir.join(RESULTS_FILE);
    let mut records = load_results(&results_path)?;

    let pattern = results_dir.join(SHARDS_DIR).join("*.json");
    let pattern = pattern.to_string_lossy();
    let mut shards: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid pattern {}", pattern))?
        .filter_map(|p| p.ok())
        .collect();
    shards.sort();

    let mut merged = Vec::with_capacity(shards.len());
    let mut fresh = Vec::with_capacity(shards.len());
    for shard in shards {
        let parsed = std::fs::read_to_string(&shard)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<TestRecord>(&content)?));
        match parsed {
            Ok(record) => {
                fresh.push(record);
                merged.push(shard);
            }
            Err(e) => log::warn!("Skipping unreadable shard {}: {:#}", shard.display(), e),
        }
    }
    fresh.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    records.extend(fresh);

    std::fs::create_dir_all(results_dir)
        .with_context(|| format!("Failed to create {}", results_dir.display()))?;
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(&results_path, json)
        .with_context(|| format!("Failed to write {}", results_path.display()))?;

    for shard in merged {
        if let Err(e) = std::fs::remove_file(&shard) {
            log::warn!("Could not remove shard {}: {}", shard.display(), e);
        }
    }
    log::info!("Aggregated {} result(s) into {}", records.len(), results_path.display());
    Ok(records)
}
