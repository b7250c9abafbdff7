use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SPAWN_FAILED: Could not start '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("FEATURE_NOT_FOUND: No feature file at '{0}'.")]
    FeatureNotFound(String),

    #[error("SCENARIO_NOT_FOUND: '{path}' has no scenario at line {line}.")]
    ScenarioNotFound { path: String, line: u32 },

    #[error("INVALID_TARGET: '{0}' is not a feature path or path:line.")]
    InvalidTarget(String),

    #[error("DEBUG_ATTACH_TIMEOUT: JVM did not report a debug listener within {0}ms.")]
    DebugAttachTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Discovery error: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
