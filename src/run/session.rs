use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::host::TestHost;
use super::projector::{LifecycleProjector, ScenarioOutcome, ScenarioStatus};
use super::reconcile::{Resolution, StepReconciler};
use crate::output::{GlyphTable, LineBuffer, ParserEvent, RunSummary, StepOutputParser, StepResult};
use crate::tree::{ScenarioNode, TestItemId};

static DEBUG_LISTENING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Listening for transport dt_socket at address: (\d+)")
        .expect("Invalid debug listener regex pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A step result and the item it was reconciled to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStep {
    pub item: TestItemId,
    pub scenario: TestItemId,
    pub dynamic: bool,
    pub result: StepResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub scenarios: Vec<ScenarioOutcome>,
    pub steps: Vec<ResolvedStep>,
    pub summary: RunSummary,
    /// Set when reading the process output or waiting on it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_error: Option<String>,
}

impl RunOutcome {
    pub fn failed(&self) -> bool {
        self.stream_error.is_some()
            || self.scenarios.iter().any(|s| s.status == ScenarioStatus::Failed)
    }
}

/// Everything one test run needs, from raw output bytes to host calls.
/// Not shared between runs.
pub struct RunSession<'h, H: TestHost + ?Sized> {
    host: &'h mut H,
    stdout: LineBuffer,
    stderr: LineBuffer,
    parser: StepOutputParser,
    reconciler: StepReconciler,
    projector: LifecycleProjector,
    steps: Vec<ResolvedStep>,
    debug_port: Option<u16>,
}

impl<'h, H: TestHost + ?Sized> RunSession<'h, H> {
    /// Prepare a run over `scenarios`. Nothing reaches the host until output
    /// shows a scenario running.
    pub fn new(host: &'h mut H, scenarios: &[&ScenarioNode], show_step_results: bool) -> Self {
        Self {
            host,
            stdout: LineBuffer::new(),
            stderr: LineBuffer::new(),
            parser: StepOutputParser::default(),
            reconciler: StepReconciler::new(scenarios),
            projector: LifecycleProjector::new(show_step_results),
            steps: Vec::new(),
            debug_port: None,
        }
    }

    pub fn with_glyphs(mut self, glyphs: GlyphTable) -> Self {
        self.parser = StepOutputParser::new(glyphs);
        self
    }

    /// Feed a raw chunk from one of the process streams.
    pub fn feed(&mut self, stream: OutputStream, chunk: &[u8]) {
        let lines = match stream {
            OutputStream::Stdout => self.stdout.feed_bytes(chunk),
            OutputStream::Stderr => self.stderr.feed_bytes(chunk),
        };
        for line in lines {
            self.feed_line(&line);
        }
    }

    /// Feed one complete line.
    pub fn feed_line(&mut self, line: &str) {
        self.host.append_output(line);

        if self.debug_port.is_none() {
            if let Some(port) = DEBUG_LISTENING_RE
                .captures(line)
                .and_then(|c| c[1].parse::<u16>().ok())
            {
                tracing::info!("JVM waiting for debugger on port {}", port);
                self.debug_port = Some(port);
                self.host.debugger_ready(port);
            }
        }

        for event in self.parser.feed_line(line) {
            self.handle(event);
        }
    }

    /// Port the JVM reported it is listening on for a debugger, once seen.
    pub fn debugger_port(&self) -> Option<u16> {
        self.debug_port
    }

    /// Flush partial lines and open steps, then settle every scenario.
    pub fn finish(mut self, exit_code: Option<i32>, stream_error: Option<String>) -> RunOutcome {
        let tails: Vec<String> = [self.stdout.flush(), self.stderr.flush()]
            .into_iter()
            .flatten()
            .collect();
        for line in tails {
            self.feed_line(&line);
        }
        for event in self.parser.finalize() {
            self.handle(event);
        }

        let scenarios = self.projector.complete(
            self.host,
            &self.reconciler.scenario_ids(),
            &self.reconciler.container_ids(),
            exit_code,
        );

        tracing::info!(
            "Run finished: {} steps, {} of {} scenarios failed (exit code {:?})",
            self.steps.len(),
            scenarios.iter().filter(|s| s.status == ScenarioStatus::Failed).count(),
            scenarios.len(),
            exit_code
        );

        RunOutcome {
            exit_code,
            scenarios,
            steps: self.steps,
            summary: self.parser.summary().clone(),
            stream_error,
        }
    }

    fn handle(&mut self, event: ParserEvent) {
        match event {
            ParserEvent::ScenarioStarted { name } => {
                if let Some(scenario) = self.reconciler.scenario_started(&name) {
                    self.projector.enter_scenario(self.host, &scenario);
                }
            }
            ParserEvent::Summary { kind, counts } => {
                tracing::debug!("Cucumber summary {:?}: {:?}", kind, counts);
            }
            ParserEvent::Step(result) => {
                tracing::debug!("{} {}", result.status, result.label());
                let Some(resolution) = self.reconciler.resolve(&result) else { return };
                if self.projector.apply(self.host, &resolution, &result) {
                    self.steps.push(ResolvedStep {
                        item: resolution.step().clone(),
                        scenario: resolution.scenario().clone(),
                        dynamic: matches!(resolution, Resolution::Dynamic { .. }),
                        result,
                    });
                }
            }
        }
    }
}
