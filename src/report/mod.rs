pub mod html;
pub mod store;
pub mod types;

use anyhow::Result;
use std::path::Path;

/// Re-render the HTML report from a results file
pub fn generate_report(results_path: &Path, output: &Path) -> Result<()> {
    let records = store::load_results(results_path)?;
    if records.is_empty() {
        log::warn!("No results in {}", results_path.display());
    }
    html::generate(&records, output)
}
