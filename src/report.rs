use std::path::{Path, PathBuf};

use crate::run::RunOutcome;
use crate::tree::RunTarget;

/// Default directory for run details files.
pub fn default_dir() -> PathBuf {
    std::env::temp_dir().join("cukestream").join("runs")
}

/// Write full run details into `dir`. Returns the file path.
pub fn write_details(dir: &Path, target: &RunTarget, outcome: &RunOutcome) -> crate::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let short_id = run_id.split('-').next().unwrap_or("run");
    let date = chrono::Utc::now().format("%Y-%m-%d");
    let path = dir.join(format!("{}-{}.json", short_id, date));

    let details = serde_json::json!({
        "target": target.to_string(),
        "exitCode": outcome.exit_code,
        "failed": outcome.failed(),
        "summary": outcome.summary,
        "scenarios": outcome.scenarios,
        "steps": outcome.steps,
        "streamError": outcome.stream_error,
    });

    std::fs::write(&path, serde_json::to_string_pretty(&details)?)?;

    Ok(path)
}
