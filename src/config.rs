use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::output::{GlyphTable, StepStatus};

pub const DEFAULT_DEBUG_PORT: u16 = 5005;

/// All configurable settings with their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CukeSettings {
    /// Report individual step items to the host, not just scenario aggregates.
    pub show_step_results: bool,
    /// Cucumber tag expression passed as `cucumber.filter.tags`.
    pub tags: Option<String>,
    /// Extra environment for the Maven process.
    pub env: HashMap<String, String>,
    /// Explicit Maven executable. None = `./mvnw` when present, else `mvn`.
    pub maven_command: Option<String>,
    pub debug_port: u16,
    pub debug_attach_timeout_ms: u64,
    /// Extra step status glyphs on top of the built-in table, in registration order.
    pub glyphs: Vec<(char, StepStatus)>,
}

impl Default for CukeSettings {
    fn default() -> Self {
        Self {
            show_step_results: true,
            tags: None,
            env: HashMap::new(),
            maven_command: None,
            debug_port: DEFAULT_DEBUG_PORT,
            debug_attach_timeout_ms: 30_000,
            glyphs: Vec::new(),
        }
    }
}

impl CukeSettings {
    /// The parser's glyph table with the configured glyphs registered.
    pub fn glyph_table(&self) -> GlyphTable {
        self.glyphs
            .iter()
            .fold(GlyphTable::default(), |table, (glyph, status)| table.with(*glyph, *status))
    }
}

/// Raw JSON representation; all fields optional for partial overrides.
#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    #[serde(rename = "steps.showResults")]
    show_step_results: Option<bool>,
    #[serde(rename = "run.tags")]
    tags: Option<String>,
    #[serde(rename = "run.env")]
    env: Option<HashMap<String, String>>,
    #[serde(rename = "maven.command")]
    maven_command: Option<String>,
    #[serde(rename = "debug.port")]
    debug_port: Option<u32>,
    #[serde(rename = "debug.attachTimeoutMs")]
    debug_attach_timeout_ms: Option<u64>,
    #[serde(rename = "output.glyphs")]
    glyphs: Option<HashMap<String, StepStatus>>,
}

/// Resolve settings: defaults → user global → project-local.
pub fn resolve(project_root: Option<&Path>) -> CukeSettings {
    let global_path = dirs::home_dir()
        .map(|h| h.join(".cukestream/settings.json"));
    let project_path = project_root
        .map(|r| r.join(".cukestream/settings.json"));
    resolve_with_paths(
        global_path.as_deref(),
        project_path.as_deref(),
    )
}

/// Testable resolver that accepts explicit file paths (no home dir dependency).
fn resolve_with_paths(
    global_path: Option<&Path>,
    project_path: Option<&Path>,
) -> CukeSettings {
    let mut settings = CukeSettings::default();

    if let Some(path) = global_path {
        apply_file(&mut settings, path);
    }
    if let Some(path) = project_path {
        apply_file(&mut settings, path);
    }

    settings
}

fn apply_file(settings: &mut CukeSettings, path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else { return };
    let Ok(file) = serde_json::from_str::<SettingsFile>(&content) else {
        tracing::warn!("Invalid settings file, ignoring: {}", path.display());
        return;
    };
    if let Some(v) = file.show_step_results {
        settings.show_step_results = v;
    }
    if let Some(v) = file.tags {
        let v = v.trim();
        settings.tags = if v.is_empty() { None } else { Some(v.to_string()) };
    }
    if let Some(env) = file.env {
        // Later layers add to and override earlier ones key by key.
        settings.env.extend(env);
    }
    if let Some(v) = file.maven_command {
        if !v.trim().is_empty() {
            settings.maven_command = Some(v);
        }
    }
    if let Some(v) = file.debug_port {
        match u16::try_from(v) {
            Ok(port) if port >= 1024 => settings.debug_port = port,
            _ => tracing::warn!(
                "debug.port ({}) out of range (1024..65535), using default",
                v
            ),
        }
    }
    if let Some(v) = file.debug_attach_timeout_ms {
        if (1_000..=300_000).contains(&v) {
            settings.debug_attach_timeout_ms = v;
        } else {
            tracing::warn!(
                "debug.attachTimeoutMs ({}) out of range (1000..300000), using default",
                v
            );
        }
    }
    if let Some(glyphs) = file.glyphs {
        let mut glyphs: Vec<(String, StepStatus)> = glyphs.into_iter().collect();
        glyphs.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, status) in glyphs {
            let mut chars = key.chars();
            let (Some(glyph), None) = (chars.next(), chars.next()) else {
                tracing::warn!("output.glyphs key '{}' is not a single character, ignoring", key);
                continue;
            };
            settings.glyphs.retain(|(g, _)| *g != glyph);
            settings.glyphs.push((glyph, status));
        }
    }
}
