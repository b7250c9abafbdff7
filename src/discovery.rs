//! Feature file discovery: a plain line scanner, not a Gherkin parser.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::{DirEntry, WalkDir};

use crate::output::StepKeyword;
use crate::tree::{ExpectedStep, FeatureNode, ScenarioNode, TestItemId};

const SKIPPED_DIRS: &[&str] = &["target", ".git", "node_modules", ".idea", "build"];

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Background,
    Scenario,
    Examples,
}

/// Find and parse every `*.feature` file under `root`, sorted by path.
pub fn discover(root: &Path) -> crate::Result<Vec<FeatureNode>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_skipped_dir(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Skipping unreadable path during discovery: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "feature")
        {
            files.push(entry.into_path());
        }
    }

    let mut features: Vec<FeatureNode> = files
        .par_iter()
        .filter_map(|path| {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                    return None;
                }
            };
            parse_feature(&relative_path(root, path), &text)
        })
        .collect();

    features.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("Discovered {} feature files under {}", features.len(), root.display());
    Ok(features)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Scan one feature file. Returns None when the text has no `Feature:` line.
pub fn parse_feature(path: &str, text: &str) -> Option<FeatureNode> {
    let mut feature: Option<FeatureNode> = None;
    let mut section = Section::Preamble;
    let mut in_doc_string = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let line = raw.trim();

        if line.starts_with("\"\"\"") || line.starts_with("```") {
            in_doc_string = !in_doc_string;
            continue;
        }
        if in_doc_string
            || line.is_empty()
            || line.starts_with('#')
            || line.starts_with('@')
            || line.starts_with('|')
        {
            continue;
        }

        if let Some(name) = header(line, &["Feature"]) {
            if feature.is_none() {
                feature = Some(FeatureNode {
                    id: TestItemId::new(path),
                    name: name.to_string(),
                    path: path.to_string(),
                    line: line_no,
                    background: Vec::new(),
                    scenarios: Vec::new(),
                });
            }
            continue;
        }

        let Some(feature) = feature.as_mut() else { continue };

        if header(line, &["Background"]).is_some() {
            section = Section::Background;
        } else if let Some(name) =
            header(line, &["Scenario Outline", "Scenario Template", "Scenario", "Example"])
        {
            section = Section::Scenario;
            feature.scenarios.push(ScenarioNode {
                id: TestItemId::new(format!("{}:{}", path, line_no)),
                name: name.to_string(),
                line: line_no,
                steps: Vec::new(),
            });
        } else if header(line, &["Examples", "Scenarios"]).is_some() {
            section = Section::Examples;
        } else if header(line, &["Rule"]).is_some() {
            section = Section::Preamble;
        } else if let Some(label) = step_label(line) {
            let step = ExpectedStep {
                id: TestItemId::new(format!("{}:{}", path, line_no)),
                label,
                line: line_no,
            };
            match section {
                Section::Background => feature.background.push(step),
                Section::Scenario => {
                    if let Some(scenario) = feature.scenarios.last_mut() {
                        scenario.steps.push(step);
                    }
                }
                Section::Preamble | Section::Examples => {}
            }
        }
    }

    feature
}

/// `"Keyword: title"` → title, for any of the given keywords.
fn header<'a>(line: &'a str, keywords: &[&str]) -> Option<&'a str> {
    keywords.iter().find_map(|kw| {
        line.strip_prefix(kw)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

fn step_label(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix("* ") {
        return Some(format!("{} {}", StepKeyword::And, rest.trim()));
    }
    StepKeyword::ALL.iter().find_map(|kw| {
        let rest = line.strip_prefix(kw.as_str())?;
        if !rest.starts_with(char::is_whitespace) || rest.trim().is_empty() {
            return None;
        }
        Some(format!("{} {}", kw, rest.trim()))
    })
}
