//! Maps step results from process output onto the pre-registered step tree.
//!
//! Resolution order per result: exact, tag-insensitive or outline-placeholder label
//! match against the registered steps of the running scenario (every scenario
//! until a header has been seen), first unprocessed candidate in declaration
//! order; no candidate means a Background/hook step, materialized under a
//! per-scenario "Before" container.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::output::StepResult;
use crate::tree::{ScenarioNode, TestItemId};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\w+\]\s*").expect("Invalid tag regex pattern")
});

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^<>]+>").expect("Invalid outline placeholder regex pattern")
});

pub const BEFORE_LABEL: &str = "Before";

/// Remove `[TAG]` annotations and collapse whitespace.
pub fn strip_tags(text: &str) -> String {
    TAG_RE
        .replace_all(text, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Outline text such as `When user logs in with <password>` as an anchored
/// pattern with every `<param>` matching any non-empty text. None without placeholders.
fn placeholder_pattern(text: &str) -> Option<Regex> {
    if !PLACEHOLDER_RE.is_match(text) {
        return None;
    }
    let escaped = regex::escape(text);
    let pattern = format!("^{}$", PLACEHOLDER_RE.replace_all(&escaped, ".+"));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Cannot match outline text '{}': {}", text, e);
            None
        }
    }
}

/// Where a step result landed.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A step declared in the feature file.
    Static {
        scenario: TestItemId,
        step: TestItemId,
        /// The scenario header was printed again (another Examples row), so
        /// the step runs once more.
        repeat: bool,
    },
    /// A step only seen at run time (Background, hooks).
    Dynamic {
        scenario: TestItemId,
        container: TestItemId,
        step: TestItemId,
        label: String,
        /// Execution order within the container.
        sequence: usize,
        /// True for the first dynamic step of this container.
        container_is_new: bool,
    },
}

impl Resolution {
    pub fn scenario(&self) -> &TestItemId {
        match self {
            Resolution::Static { scenario, .. } | Resolution::Dynamic { scenario, .. } => scenario,
        }
    }

    pub fn step(&self) -> &TestItemId {
        match self {
            Resolution::Static { step, .. } | Resolution::Dynamic { step, .. } => step,
        }
    }
}

struct RegisteredStep {
    id: TestItemId,
    scenario: usize,
}

struct ScenarioSlot {
    id: TestItemId,
    name: String,
    name_pattern: Option<Regex>,
    /// Indices into `StepReconciler::steps`.
    steps: Vec<usize>,
    entered: bool,
}

impl ScenarioSlot {
    fn is_named(&self, name: &str) -> bool {
        self.name == name || self.name_pattern.as_ref().is_some_and(|re| re.is_match(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicStep {
    pub id: TestItemId,
    pub label: String,
    pub sequence: usize,
}

struct BeforeContainer {
    id: TestItemId,
    steps: Vec<DynamicStep>,
}

/// Per-run reconciliation state. Build a new one for every run.
pub struct StepReconciler {
    steps: Vec<RegisteredStep>,
    /// Tag-stripped label → registered step indices, in declaration order.
    step_items: HashMap<String, Vec<usize>>,
    /// Outline steps with `<param>` placeholders, matched as patterns.
    outline_steps: Vec<(Regex, usize)>,
    scenarios: Vec<ScenarioSlot>,
    /// Scenario index → its lazily created Before container.
    background_steps: HashMap<usize, BeforeContainer>,
    processed: HashSet<TestItemId>,
    current: Option<usize>,
    /// A header of this run was seen; candidates are limited to `current`.
    scoped: bool,
    /// Scenarios whose header was printed more than once.
    repeated: HashSet<usize>,
}

impl StepReconciler {
    pub fn new(scenarios: &[&ScenarioNode]) -> Self {
        let mut steps = Vec::new();
        let mut step_items: HashMap<String, Vec<usize>> = HashMap::new();
        let mut outline_steps = Vec::new();
        let mut slots = Vec::with_capacity(scenarios.len());

        for (scenario_idx, scenario) in scenarios.iter().enumerate() {
            let name = strip_tags(&scenario.name);
            let mut slot = ScenarioSlot {
                id: scenario.id.clone(),
                name_pattern: placeholder_pattern(&name),
                name,
                steps: Vec::new(),
                entered: false,
            };
            // Declaration order is line order within a scenario.
            let mut declared: Vec<_> = scenario.steps.iter().collect();
            declared.sort_by_key(|s| s.line);
            for step in declared {
                let idx = steps.len();
                let key = strip_tags(&step.label);
                if let Some(re) = placeholder_pattern(&key) {
                    outline_steps.push((re, idx));
                }
                step_items.entry(key).or_default().push(idx);
                slot.steps.push(idx);
                steps.push(RegisteredStep {
                    id: step.id.clone(),
                    scenario: scenario_idx,
                });
            }
            slots.push(slot);
        }

        Self {
            steps,
            step_items,
            outline_steps,
            scenarios: slots,
            background_steps: HashMap::new(),
            processed: HashSet::new(),
            current: None,
            scoped: false,
            repeated: HashSet::new(),
        }
    }

    /// A `Scenario:` header was printed; the steps that follow belong to it.
    /// Returns the scenario entered, or None when it isn't part of this run.
    pub fn scenario_started(&mut self, name: &str) -> Option<TestItemId> {
        let name = strip_tags(name);
        let matching: Vec<usize> = self
            .scenarios
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_named(&name))
            .map(|(i, _)| i)
            .collect();

        // Outline rows repeat the same header, so fall back to an entered slot.
        let chosen = matching
            .iter()
            .copied()
            .find(|&i| !self.scenarios[i].entered)
            .or_else(|| matching.first().copied());

        let Some(idx) = chosen else {
            tracing::debug!("Scenario '{}' is not part of this run", name);
            return None;
        };

        let slot = &mut self.scenarios[idx];
        if slot.entered {
            // Another Examples row: the same steps run again.
            for &i in &slot.steps {
                self.processed.remove(&self.steps[i].id);
            }
            self.repeated.insert(idx);
        }
        slot.entered = true;
        self.current = Some(idx);
        self.scoped = true;
        Some(slot.id.clone())
    }

    /// Resolve one result. None means the result was dropped (already logged).
    pub fn resolve(&mut self, result: &StepResult) -> Option<Resolution> {
        let label = result.label();
        let mut candidates = self.candidates(&strip_tags(&label));
        if let (true, Some(current)) = (self.scoped, self.current) {
            candidates.retain(|&i| self.steps[i].scenario == current);
        }

        if candidates.is_empty() {
            return self.resolve_dynamic(label);
        }

        let Some(idx) = candidates
            .into_iter()
            .find(|&i| !self.processed.contains(&self.steps[i].id))
        else {
            tracing::warn!(
                "Duplicate result for already resolved step '{}' ({}), dropping",
                label,
                result.status
            );
            return None;
        };

        let step = &self.steps[idx];
        self.processed.insert(step.id.clone());
        self.current = Some(step.scenario);
        self.scenarios[step.scenario].entered = true;
        Some(Resolution::Static {
            scenario: self.scenarios[step.scenario].id.clone(),
            step: step.id.clone(),
            repeat: self.repeated.contains(&step.scenario),
        })
    }

    /// Registered steps whose label matches `key`, in declaration order.
    fn candidates(&self, key: &str) -> Vec<usize> {
        let mut found = self.step_items.get(key).cloned().unwrap_or_default();
        found.extend(
            self.outline_steps
                .iter()
                .filter(|(re, _)| re.is_match(key))
                .map(|(_, idx)| *idx),
        );
        found.sort_unstable();
        found.dedup();
        found
    }

    fn resolve_dynamic(&mut self, label: String) -> Option<Resolution> {
        // Before any header or static match, Background output belongs to the first scenario.
        let fallback = (!self.scenarios.is_empty()).then_some(0);
        let Some(scenario_idx) = self.current.or(fallback) else {
            tracing::warn!("No scenario to attach step '{}' to, dropping", label);
            return None;
        };
        let scenario = &self.scenarios[scenario_idx];

        let container_is_new = !self.background_steps.contains_key(&scenario_idx);
        let container = self
            .background_steps
            .entry(scenario_idx)
            .or_insert_with(|| BeforeContainer {
                id: scenario.id.child("before"),
                steps: Vec::new(),
            });

        // Identical text can run more than once, so steps are keyed by sequence.
        let sequence = container.steps.len();
        let step = DynamicStep {
            id: container.id.child(&sequence.to_string()),
            label: label.clone(),
            sequence,
        };
        container.steps.push(step.clone());
        self.processed.insert(step.id.clone());
        tracing::debug!("Dynamic step #{} '{}' under {}", sequence, label, container.id);

        Some(Resolution::Dynamic {
            scenario: scenario.id.clone(),
            container: container.id.clone(),
            step: step.id,
            label,
            sequence,
            container_is_new,
        })
    }

    pub fn scenario_ids(&self) -> Vec<TestItemId> {
        self.scenarios.iter().map(|s| s.id.clone()).collect()
    }

    /// Before containers created so far, in scenario order.
    pub fn container_ids(&self) -> Vec<TestItemId> {
        let mut indices: Vec<&usize> = self.background_steps.keys().collect();
        indices.sort();
        indices
            .into_iter()
            .map(|i| self.background_steps[i].id.clone())
            .collect()
    }

    /// Dynamic steps of one scenario, in execution order.
    pub fn dynamic_steps(&self, scenario: &TestItemId) -> Vec<&DynamicStep> {
        self.scenarios
            .iter()
            .position(|s| &s.id == scenario)
            .and_then(|idx| self.background_steps.get(&idx))
            .map(|c| c.steps.iter().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{StepKeyword, StepStatus};
    use crate::tree::ExpectedStep;

    fn scenario(line: u32, name: &str, steps: &[(u32, &str)]) -> ScenarioNode {
        ScenarioNode {
            id: TestItemId::new(format!("f.feature:{}", line)),
            name: name.to_string(),
            line,
            steps: steps
                .iter()
                .map(|(l, label)| ExpectedStep {
                    id: TestItemId::new(format!("f.feature:{}", l)),
                    label: label.to_string(),
                    line: *l,
                })
                .collect(),
        }
    }

    fn result(keyword: StepKeyword, name: &str) -> StepResult {
        StepResult::new(keyword, name, StepStatus::Passed)
    }

    fn step_id(r: Option<Resolution>) -> String {
        r.expect("resolved").step().as_str().to_string()
    }

    #[test]
    fn test_exact_match() {
        let s = scenario(3, "Login", &[(4, "Given user exists"), (5, "When user logs in")]);
        let mut rec = StepReconciler::new(&[&s]);
        let r = rec.resolve(&result(StepKeyword::When, "user logs in"));
        assert_eq!(
            r,
            Some(Resolution::Static {
                scenario: TestItemId::new("f.feature:3"),
                step: TestItemId::new("f.feature:5"),
                repeat: false,
            })
        );
        assert_eq!(rec.resolve(&result(StepKeyword::When, "user logs in")), None);
    }

    #[test]
    fn test_duplicate_labels_resolve_in_declaration_order() {
        let s = scenario(1, "Dup", &[(2, "When user logs in"), (3, "Then ok"), (4, "When user logs in")]);
        let mut rec = StepReconciler::new(&[&s]);
        let r1 = rec.resolve(&result(StepKeyword::When, "user logs in"));
        let r2 = rec.resolve(&result(StepKeyword::When, "user logs in"));
        assert_eq!(step_id(r1), "f.feature:2");
        assert_eq!(step_id(r2), "f.feature:4");
        // A third result for the same text is an anomaly and is dropped.
        assert_eq!(rec.resolve(&result(StepKeyword::When, "user logs in")), None);
    }

    #[test]
    fn test_declaration_order_uses_line_numbers() {
        let s = scenario(1, "Dup", &[(7, "Given x"), (3, "Given x")]);
        let mut rec = StepReconciler::new(&[&s]);
        assert_eq!(step_id(rec.resolve(&result(StepKeyword::Given, "x"))), "f.feature:3");
        assert_eq!(step_id(rec.resolve(&result(StepKeyword::Given, "x"))), "f.feature:7");
    }

    #[test]
    fn test_single_candidate_already_processed_is_dropped() {
        let s = scenario(1, "One", &[(2, "Then done")]);
        let mut rec = StepReconciler::new(&[&s]);
        assert!(rec.resolve(&result(StepKeyword::Then, "done")).is_some());
        assert_eq!(rec.resolve(&result(StepKeyword::Then, "done")), None);
    }

    #[test]
    fn test_tag_insensitive_matching_both_directions() {
        let s = scenario(1, "Tags", &[(2, "Given the market [MKT05A06] is open"), (3, "Then the order is filled")]);
        let mut rec = StepReconciler::new(&[&s]);
        assert_eq!(
            step_id(rec.resolve(&result(StepKeyword::Given, "the market is open"))),
            "f.feature:2"
        );
        assert_eq!(
            step_id(rec.resolve(&result(StepKeyword::Then, "the order is filled [TAG123]"))),
            "f.feature:3"
        );
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("Given a [T1] b [T2]"), "Given a b");
        assert_eq!(strip_tags("Given [A1]  spaced"), "Given spaced");
        assert_eq!(strip_tags("Given [not a tag!]"), "Given [not a tag!]");
    }

    #[test]
    fn test_unknown_steps_become_ordered_dynamic_steps() {
        let s = scenario(1, "S", &[(2, "Then ok")]);
        let mut rec = StepReconciler::new(&[&s]);
        let a = rec.resolve(&result(StepKeyword::Given, "zebra setup")).unwrap();
        let b = rec.resolve(&result(StepKeyword::Given, "alpha setup")).unwrap();

        match (&a, &b) {
            (
                Resolution::Dynamic { sequence: 0, container_is_new: true, container: c1, .. },
                Resolution::Dynamic { sequence: 1, container_is_new: false, container: c2, .. },
            ) => {
                assert_eq!(c1, c2);
                assert_eq!(c1.as_str(), "f.feature:1::before");
            }
            other => panic!("unexpected {:?}", other),
        }
        let labels: Vec<&str> = rec
            .dynamic_steps(&TestItemId::new("f.feature:1"))
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(labels, ["Given zebra setup", "Given alpha setup"]);
    }

    #[test]
    fn test_repeated_dynamic_text_gets_distinct_items() {
        let s = scenario(1, "S", &[]);
        let mut rec = StepReconciler::new(&[&s]);
        let a = rec.resolve(&result(StepKeyword::Given, "a clean db")).unwrap();
        let b = rec.resolve(&result(StepKeyword::Given, "a clean db")).unwrap();
        assert_ne!(a.step(), b.step());
    }

    #[test]
    fn test_dynamic_steps_follow_current_scenario() {
        let s1 = scenario(1, "First", &[(2, "Then one")]);
        let s2 = scenario(5, "Second", &[(6, "Then two")]);
        let mut rec = StepReconciler::new(&[&s1, &s2]);

        rec.scenario_started("First");
        let bg1 = rec.resolve(&result(StepKeyword::Given, "background")).unwrap();
        rec.resolve(&result(StepKeyword::Then, "one"));
        rec.scenario_started("Second");
        let bg2 = rec.resolve(&result(StepKeyword::Given, "background")).unwrap();

        assert_eq!(bg1.scenario().as_str(), "f.feature:1");
        assert_eq!(bg2.scenario().as_str(), "f.feature:5");
        assert!(matches!(bg2, Resolution::Dynamic { container_is_new: true, sequence: 0, .. }));
        assert_eq!(rec.container_ids().len(), 2);
    }

    #[test]
    fn test_no_scenarios_drops_unknown_step() {
        let mut rec = StepReconciler::new(&[]);
        assert_eq!(rec.resolve(&result(StepKeyword::Given, "anything")), None);
        assert!(rec.container_ids().is_empty());
    }

    #[test]
    fn test_unknown_scenario_header_keeps_current() {
        let s = scenario(1, "Known", &[]);
        let mut rec = StepReconciler::new(&[&s]);
        rec.scenario_started("Somebody else's scenario");
        let r = rec.resolve(&result(StepKeyword::Given, "x")).unwrap();
        assert_eq!(r.scenario().as_str(), "f.feature:1");
    }

    #[test]
    fn test_header_limits_candidates_to_running_scenario() {
        let card = scenario(7, "Pay by card", &[(8, "Given a cart"), (9, "Then the order is confirmed")]);
        let voucher = scenario(14, "Pay by voucher", &[(15, "Given a cart"), (16, "Then the order is confirmed")]);
        let mut rec = StepReconciler::new(&[&card, &voucher]);

        assert_eq!(rec.scenario_started("Pay by voucher"), Some(TestItemId::new("f.feature:14")));
        let cart = rec.resolve(&result(StepKeyword::Given, "a cart")).unwrap();
        assert_eq!(cart.scenario().as_str(), "f.feature:14");
        assert_eq!(cart.step().as_str(), "f.feature:15");
        assert_eq!(
            step_id(rec.resolve(&result(StepKeyword::Then, "the order is confirmed"))),
            "f.feature:16"
        );
        // Already resolved within the running scenario; never spills into another one.
        assert_eq!(rec.resolve(&result(StepKeyword::Given, "a cart")), None);
    }

    #[test]
    fn test_step_of_other_scenario_is_dynamic_once_scoped() {
        let first = scenario(1, "First", &[(2, "Given shared")]);
        let second = scenario(5, "Second", &[(6, "Then two")]);
        let mut rec = StepReconciler::new(&[&first, &second]);
        rec.scenario_started("Second");
        let r = rec.resolve(&result(StepKeyword::Given, "shared")).unwrap();
        assert!(matches!(r, Resolution::Dynamic { .. }));
        assert_eq!(r.scenario().as_str(), "f.feature:5");
    }

    #[test]
    fn test_outline_placeholders_match_any_value() {
        let s = scenario(
            3,
            "Bad password <password>",
            &[(4, "Given user exists"), (5, "When user logs in with <password>")],
        );
        let mut rec = StepReconciler::new(&[&s]);
        assert_eq!(
            rec.scenario_started("Bad password hunter2"),
            Some(TestItemId::new("f.feature:3"))
        );
        let r = rec.resolve(&result(StepKeyword::When, "user logs in with x")).unwrap();
        assert_eq!(
            r,
            Resolution::Static {
                scenario: TestItemId::new("f.feature:3"),
                step: TestItemId::new("f.feature:5"),
                repeat: false,
            }
        );
        // Placeholders stand for some text, not none.
        assert!(matches!(
            rec.resolve(&result(StepKeyword::When, "user logs in with ")),
            Some(Resolution::Dynamic { .. })
        ));
    }

    #[test]
    fn test_placeholder_pattern_escapes_literal_text() {
        let re = placeholder_pattern("Then total is $<amount> (net)").unwrap();
        assert!(re.is_match("Then total is $12.50 (net)"));
        assert!(!re.is_match("Then total is 12.50 net"));
        assert!(placeholder_pattern("Then no params").is_none());
    }

    #[test]
    fn test_repeated_header_runs_steps_again() {
        let s = scenario(3, "Login", &[(4, "When user logs in with <password>")]);
        let mut rec = StepReconciler::new(&[&s]);

        rec.scenario_started("Login");
        let first = rec.resolve(&result(StepKeyword::When, "user logs in with a")).unwrap();
        assert!(matches!(first, Resolution::Static { repeat: false, .. }));

        rec.scenario_started("Login");
        let second = rec.resolve(&result(StepKeyword::When, "user logs in with b")).unwrap();
        assert!(matches!(second, Resolution::Static { repeat: true, .. }));
        assert_eq!(second.step().as_str(), "f.feature:4");
    }
}
