//! Static test tree: features, scenarios and their declared steps.

use serde::{Deserialize, Serialize};

/// Stable identity of an item in the host's test tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestItemId(pub String);

impl TestItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Child id under this one, e.g. `features/a.feature:4::before`.
    pub fn child(&self, suffix: &str) -> Self {
        Self(format!("{}::{}", self.0, suffix))
    }
}

impl std::fmt::Display for TestItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A step slot declared in a feature file. Two steps with the same label are
/// still distinct items, told apart by line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedStep {
    pub id: TestItemId,
    /// `"{keyword} {name}"` as written in the source.
    pub label: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioNode {
    pub id: TestItemId,
    pub name: String,
    pub line: u32,
    pub steps: Vec<ExpectedStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureNode {
    pub id: TestItemId,
    pub name: String,
    /// Path relative to the project root.
    pub path: String,
    pub line: u32,
    /// Background steps. Not registered as scenario children: they show up at
    /// run time as dynamic steps under each scenario.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub background: Vec<ExpectedStep>,
    pub scenarios: Vec<ScenarioNode>,
}

impl FeatureNode {
    pub fn scenario_at(&self, line: u32) -> Option<&ScenarioNode> {
        self.scenarios.iter().find(|s| s.line == line)
    }
}

/// What a single run executes: a whole feature file or one scenario in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub path: String,
    pub line: Option<u32>,
}

impl RunTarget {
    /// Parse `path` or `path:line`.
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(crate::Error::InvalidTarget(spec.to_string()));
        }
        if let Some((path, line)) = spec.rsplit_once(':') {
            if let Ok(line) = line.parse::<u32>() {
                if path.is_empty() || line == 0 {
                    return Err(crate::Error::InvalidTarget(spec.to_string()));
                }
                return Ok(Self { path: path.to_string(), line: Some(line) });
            }
        }
        Ok(Self { path: spec.to_string(), line: None })
    }

    /// Value for `cucumber.features`.
    pub fn features_arg(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{}", self.path, line),
            None => self.path.clone(),
        }
    }

    /// Scenarios this target runs, in declaration order.
    pub fn select<'a>(&self, features: &'a [FeatureNode]) -> crate::Result<Vec<&'a ScenarioNode>> {
        let feature = features
            .iter()
            .find(|f| f.path == self.path)
            .ok_or_else(|| crate::Error::FeatureNotFound(self.path.clone()))?;
        match self.line {
            None => Ok(feature.scenarios.iter().collect()),
            Some(line) => feature
                .scenario_at(line)
                .map(|s| vec![s])
                .ok_or_else(|| crate::Error::ScenarioNotFound {
                    path: self.path.clone(),
                    line,
                }),
        }
    }
}

impl std::fmt::Display for RunTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.features_arg())
    }
}
