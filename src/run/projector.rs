use std::collections::HashMap;

use serde::Serialize;

use super::host::TestHost;
use super::reconcile::{Resolution, BEFORE_LABEL};
use crate::output::{StepResult, StepStatus};
use crate::tree::TestItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionState {
    NotStarted,
    Started,
    Passed,
    Failed,
    Skipped,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Passed | ExecutionState::Failed | ExecutionState::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Selected but never entered, e.g. filtered out by tags.
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOutcome {
    pub id: TestItemId,
    pub status: ScenarioStatus,
    /// Label of the first step that failed this scenario.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
}

/// Turns resolved step outcomes into host state transitions.
///
/// Every item moves not-started → started → exactly one terminal state. A scenario
/// starts when its header is printed or its first step resolves, and fails the
/// moment one of its steps fails; otherwise it passes at completion no matter what
/// the process exit code says. Scenarios that never started stay untouched.
pub struct LifecycleProjector {
    states: HashMap<TestItemId, ExecutionState>,
    /// Failed aggregates (scenarios, Before containers) → first failing step label.
    failed_aggregates: HashMap<TestItemId, String>,
    show_step_results: bool,
}

impl LifecycleProjector {
    pub fn new(show_step_results: bool) -> Self {
        Self {
            states: HashMap::new(),
            failed_aggregates: HashMap::new(),
            show_step_results,
        }
    }

    pub fn state(&self, id: &TestItemId) -> ExecutionState {
        self.states.get(id).copied().unwrap_or(ExecutionState::NotStarted)
    }

    /// The scenario's header was printed. Idempotent.
    pub fn enter_scenario<H: TestHost + ?Sized>(&mut self, host: &mut H, scenario: &TestItemId) {
        self.start(host, scenario, true);
    }

    /// Apply one resolved step. Returns false if the step already had a terminal state.
    pub fn apply<H: TestHost + ?Sized>(
        &mut self,
        host: &mut H,
        resolution: &Resolution,
        result: &StepResult,
    ) -> bool {
        let report = self.show_step_results;
        self.start(host, resolution.scenario(), true);

        if let Resolution::Dynamic { scenario, container, step, label, sequence, container_is_new } = resolution {
            if *container_is_new && report {
                host.create_item(scenario, container, BEFORE_LABEL, 0);
            }
            // The container starts with its first step, not with the scenario.
            self.start(host, container, report);
            if report {
                host.create_item(container, step, label, *sequence);
            }
        }

        let (terminal, message) = match result.status {
            StepStatus::Passed => (ExecutionState::Passed, None),
            StepStatus::Failed => (
                ExecutionState::Failed,
                Some(
                    result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("Step failed: {}", result.label())),
                ),
            ),
            StepStatus::Skipped | StepStatus::Pending | StepStatus::Undefined => {
                (ExecutionState::Skipped, None)
            }
        };

        let applied = match resolution {
            // Another Examples row: the step item keeps its first outcome, but the
            // row still counts toward the scenario.
            Resolution::Static { step, repeat: true, .. } if self.state(step).is_terminal() => {
                tracing::debug!("{} ran again for another example row", step);
                true
            }
            _ => self.finish(host, resolution.step(), terminal, message.as_deref(), report),
        };

        if applied && result.status == StepStatus::Failed {
            if let Resolution::Dynamic { container, .. } = resolution {
                self.fail_aggregate(host, container, result, report);
            }
            self.fail_aggregate(host, resolution.scenario(), result, true);
        }

        applied
    }

    /// Close out every aggregate that didn't fail. The exit code is logged, never trusted.
    pub fn complete<H: TestHost + ?Sized>(
        &mut self,
        host: &mut H,
        scenarios: &[TestItemId],
        containers: &[TestItemId],
        exit_code: Option<i32>,
    ) -> Vec<ScenarioOutcome> {
        if exit_code != Some(0) {
            tracing::debug!(
                "Process exit code {:?} ignored; scenario outcomes come from step results",
                exit_code
            );
        }

        let report = self.show_step_results;
        for container in containers {
            if !self.failed_aggregates.contains_key(container) {
                self.finish(host, container, ExecutionState::Passed, None, report);
            }
        }

        scenarios
            .iter()
            .map(|id| match self.failed_aggregates.get(id) {
                Some(label) => ScenarioOutcome {
                    id: id.clone(),
                    status: ScenarioStatus::Failed,
                    failed_step: Some(label.clone()),
                },
                None if self.state(id) == ExecutionState::NotStarted => {
                    tracing::debug!("{} never ran", id);
                    ScenarioOutcome {
                        id: id.clone(),
                        status: ScenarioStatus::NotRun,
                        failed_step: None,
                    }
                }
                None => {
                    self.finish(host, id, ExecutionState::Passed, None, true);
                    ScenarioOutcome {
                        id: id.clone(),
                        status: ScenarioStatus::Passed,
                        failed_step: None,
                    }
                }
            })
            .collect()
    }

    fn fail_aggregate<H: TestHost + ?Sized>(
        &mut self,
        host: &mut H,
        id: &TestItemId,
        result: &StepResult,
        report: bool,
    ) {
        if self.failed_aggregates.contains_key(id) {
            return;
        }
        let label = result.label();
        let message = match &result.error_message {
            Some(error) => format!("Step failed: {}\n{}", label, error),
            None => format!("Step failed: {}", label),
        };
        self.failed_aggregates.insert(id.clone(), label);
        self.finish(host, id, ExecutionState::Failed, Some(&message), report);
    }

    fn start<H: TestHost + ?Sized>(&mut self, host: &mut H, id: &TestItemId, report: bool) -> bool {
        let state = self.states.entry(id.clone()).or_insert(ExecutionState::NotStarted);
        if *state != ExecutionState::NotStarted {
            return false;
        }
        *state = ExecutionState::Started;
        if report {
            host.started(id);
        }
        true
    }

    fn finish<H: TestHost + ?Sized>(
        &mut self,
        host: &mut H,
        id: &TestItemId,
        terminal: ExecutionState,
        message: Option<&str>,
        report: bool,
    ) -> bool {
        self.start(host, id, report);
        let state = self.states.entry(id.clone()).or_insert(ExecutionState::Started);
        if state.is_terminal() {
            tracing::warn!("{} already {:?}, ignoring {:?}", id, state, terminal);
            return false;
        }
        *state = terminal;
        if report {
            match terminal {
                ExecutionState::Passed => host.passed(id),
                ExecutionState::Failed => host.failed(id, message),
                ExecutionState::Skipped => host.skipped(id),
                ExecutionState::NotStarted | ExecutionState::Started => {}
            }
        }
        true
    }
}
