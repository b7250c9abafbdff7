//! Line-at-a-time state machine that turns Cucumber `pretty` output into step events.
//!
//! Passed and skipped steps are emitted the moment their line is seen. A failed step
//! is held open until its error block ends, because the formatter prints the stack
//! trace after the step line.

use std::sync::LazyLock;

use regex::Regex;

use super::normalize::{is_application_log, normalize};
use super::types::*;

/// Cap on captured error lines per step; deep JVM traces add nothing past this.
const MAX_ERROR_LINES: usize = 200;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<kind>Feature|Background|Rule|Scenario Outline|Scenario Template|Scenario|Examples|Example):\s*(?P<title>.*?)(?:\s+#.*)?$"
    ).expect("Invalid section regex pattern")
});

static ERROR_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:java\.|org\.|Error|Exception|AssertionError|at\s|Caused by:|\.\.\.)")
        .expect("Invalid error line regex pattern")
});

static CONTINUATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:at\s|\.\.\.|\d+ more\b|Caused by:)")
        .expect("Invalid continuation regex pattern")
});

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<total>\d+) (?P<kind>Scenarios?|Steps?)(?: \((?P<details>[^)]*)\))?\s*$")
        .expect("Invalid summary regex pattern")
});

static SUMMARY_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<n>\d+) (?P<status>passed|failed|skipped|pending|undefined)")
        .expect("Invalid summary detail regex pattern")
});

/// Status glyphs the formatter prefixes step lines with. Open-ended: formatter
/// versions and locales differ, so callers can register more.
#[derive(Debug, Clone)]
pub struct GlyphTable {
    entries: Vec<(char, StepStatus)>,
}

impl Default for GlyphTable {
    fn default() -> Self {
        Self {
            entries: vec![
                ('✔', StepStatus::Passed),
                ('✓', StepStatus::Passed),
                ('✘', StepStatus::Failed),
                ('✗', StepStatus::Failed),
                ('×', StepStatus::Failed),
                ('↷', StepStatus::Skipped),
                ('⊝', StepStatus::Skipped),
                ('−', StepStatus::Skipped),
            ],
        }
    }
}

impl GlyphTable {
    /// Register (or remap) a glyph.
    pub fn with(mut self, glyph: char, status: StepStatus) -> Self {
        self.entries.retain(|(g, _)| *g != glyph);
        self.entries.push((glyph, status));
        self
    }

    pub fn status_of(&self, glyph: char) -> Option<StepStatus> {
        self.entries
            .iter()
            .find(|(g, _)| *g == glyph)
            .map(|(_, s)| *s)
    }

    fn step_regex(&self) -> Regex {
        let class: String = self
            .entries
            .iter()
            .map(|(g, _)| regex::escape(&g.to_string()))
            .collect();
        let keywords: Vec<&str> = StepKeyword::ALL.iter().map(|k| k.as_str()).collect();
        let pattern = format!(
            r"^\s*(?:(?P<glyph>[{}])\s*)?(?P<keyword>{})\s+(?P<name>\S.*?)(?:\s+#.*)?$",
            class,
            keywords.join("|"),
        );
        Regex::new(&pattern).expect("Invalid step line regex pattern")
    }
}

/// Something the parser recognized in the output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// A finished step.
    Step(StepResult),
    /// A `Scenario:` (or outline/example) header; scopes the steps that follow.
    ScenarioStarted { name: String },
    /// A `"<N> Scenarios (...)"` / `"<N> Steps (...)"` summary line.
    Summary { kind: SummaryKind, counts: OutcomeCounts },
}

#[derive(Debug)]
enum ParserState {
    Idle,
    /// Failed step seen, no error lines yet.
    AwaitingError(StepResult),
    CapturingError { step: StepResult, lines: Vec<String> },
}

pub struct StepOutputParser {
    glyphs: GlyphTable,
    step_re: Regex,
    state: ParserState,
    summary: RunSummary,
}

impl Default for StepOutputParser {
    fn default() -> Self {
        Self::new(GlyphTable::default())
    }
}

impl StepOutputParser {
    pub fn new(glyphs: GlyphTable) -> Self {
        let step_re = glyphs.step_regex();
        Self {
            glyphs,
            step_re,
            state: ParserState::Idle,
            summary: RunSummary::default(),
        }
    }

    /// Classify one raw output line. Never fails: unrecognized lines produce nothing.
    pub fn feed_line(&mut self, raw: &str) -> Vec<ParserEvent> {
        let normalized = normalize(raw);
        let line: &str = &normalized;
        let mut events = Vec::new();

        if is_application_log(line) {
            tracing::trace!("skipping application log line: {}", line);
            return events;
        }

        if let Some(step) = self.match_step(line) {
            self.close_open_step(&mut events);
            if step.status == StepStatus::Failed {
                self.state = ParserState::AwaitingError(step);
            } else {
                events.push(ParserEvent::Step(step));
            }
            return events;
        }

        if line.trim().is_empty() {
            self.close_open_step(&mut events);
            return events;
        }

        if let Some(caps) = SECTION_RE.captures(line) {
            self.close_open_step(&mut events);
            let kind = caps.name("kind").map_or("", |m| m.as_str());
            if matches!(kind, "Scenario" | "Scenario Outline" | "Scenario Template" | "Example") {
                let name = caps.name("title").map_or("", |m| m.as_str()).trim().to_string();
                events.push(ParserEvent::ScenarioStarted { name });
            }
            return events;
        }

        if let Some((kind, counts)) = parse_summary(line) {
            self.close_open_step(&mut events);
            self.summary.record(kind, counts);
            events.push(ParserEvent::Summary { kind, counts });
            return events;
        }

        self.state = match std::mem::replace(&mut self.state, ParserState::Idle) {
            ParserState::Idle => ParserState::Idle,
            ParserState::AwaitingError(step) => {
                if ERROR_LINE_RE.is_match(line) {
                    ParserState::CapturingError {
                        step,
                        lines: vec![line.trim().to_string()],
                    }
                } else {
                    // Data tables, doc strings and other step decoration.
                    ParserState::AwaitingError(step)
                }
            }
            ParserState::CapturingError { step, mut lines } => {
                if ERROR_LINE_RE.is_match(line) || CONTINUATION_RE.is_match(line) {
                    if lines.len() < MAX_ERROR_LINES {
                        lines.push(line.trim().to_string());
                    }
                    ParserState::CapturingError { step, lines }
                } else {
                    events.push(ParserEvent::Step(with_error(step, lines)));
                    ParserState::Idle
                }
            }
        };

        events
    }

    /// Force out a step still held open at end of stream.
    pub fn finalize(&mut self) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        self.close_open_step(&mut events);
        events
    }

    /// Drop all open state, including collected summary counts.
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.summary = RunSummary::default();
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn glyphs(&self) -> &GlyphTable {
        &self.glyphs
    }

    fn match_step(&self, line: &str) -> Option<StepResult> {
        let caps = self.step_re.captures(line)?;
        let keyword = caps.name("keyword")?.as_str().parse::<StepKeyword>().ok()?;
        let name = caps.name("name")?.as_str().trim();
        // No glyph: plain pretty output, which only marks steps that did not fail.
        let status = caps
            .name("glyph")
            .and_then(|g| g.as_str().chars().next())
            .and_then(|c| self.glyphs.status_of(c))
            .unwrap_or(StepStatus::Passed);
        Some(StepResult::new(keyword, name, status))
    }

    fn close_open_step(&mut self, events: &mut Vec<ParserEvent>) {
        match std::mem::replace(&mut self.state, ParserState::Idle) {
            ParserState::Idle => {}
            ParserState::AwaitingError(step) => events.push(ParserEvent::Step(step)),
            ParserState::CapturingError { step, lines } => {
                events.push(ParserEvent::Step(with_error(step, lines)))
            }
        }
    }
}

fn with_error(mut step: StepResult, lines: Vec<String>) -> StepResult {
    if !lines.is_empty() {
        step.error_message = Some(lines.join("\n"));
    }
    step
}

fn parse_summary(line: &str) -> Option<(SummaryKind, OutcomeCounts)> {
    let caps = SUMMARY_RE.captures(line)?;
    let kind = if caps.name("kind")?.as_str().starts_with("Scenario") {
        SummaryKind::Scenarios
    } else {
        SummaryKind::Steps
    };
    let mut counts = OutcomeCounts {
        total: caps.name("total")?.as_str().parse().ok()?,
        ..OutcomeCounts::default()
    };
    if let Some(details) = caps.name("details") {
        for part in SUMMARY_PART_RE.captures_iter(details.as_str()) {
            let n: u32 = part["n"].parse().unwrap_or(0);
            match &part["status"] {
                "passed" => counts.passed = n,
                "failed" => counts.failed = n,
                "skipped" => counts.skipped = n,
                "pending" => counts.pending = n,
                "undefined" => counts.undefined = n,
                _ => {}
            }
        }
    }
    Some((kind, counts))
}
