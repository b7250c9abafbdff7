use std::io::Write;

use serde::Serialize;

use crate::tree::TestItemId;

/// The consuming test UI. Implementations only mirror state; ordering and
/// at-most-once guarantees are enforced before these calls are made.
pub trait TestHost {
    /// Materialize an item that wasn't in the static tree.
    fn create_item(&mut self, parent: &TestItemId, id: &TestItemId, label: &str, sort_index: usize);

    fn started(&mut self, id: &TestItemId);

    fn passed(&mut self, id: &TestItemId);

    fn failed(&mut self, id: &TestItemId, message: Option<&str>);

    fn skipped(&mut self, id: &TestItemId);

    /// Raw process output, one line at a time.
    fn append_output(&mut self, _line: &str) {}

    /// The JVM is listening for a debugger on `port`.
    fn debugger_ready(&mut self, _port: u16) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    #[serde(rename_all = "camelCase")]
    Created {
        parent: TestItemId,
        id: TestItemId,
        label: String,
        sort_index: usize,
    },
    Started { id: TestItemId },
    Passed { id: TestItemId },
    Failed {
        id: TestItemId,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Skipped { id: TestItemId },
    DebuggerReady { port: u16 },
}

impl HostEvent {
    pub fn id(&self) -> Option<&TestItemId> {
        match self {
            HostEvent::Created { id, .. }
            | HostEvent::Started { id }
            | HostEvent::Passed { id }
            | HostEvent::Failed { id, .. }
            | HostEvent::Skipped { id } => Some(id),
            HostEvent::DebuggerReady { .. } => None,
        }
    }
}

/// Keeps every call in memory. Used by tests and offline replay.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub events: Vec<HostEvent>,
    pub output: Vec<String>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events for one item, in call order.
    pub fn events_for(&self, id: &TestItemId) -> Vec<&HostEvent> {
        self.events.iter().filter(|e| e.id() == Some(id)).collect()
    }

    /// Last lifecycle state reported for `id`: "started", "passed", "failed" or "skipped".
    pub fn final_state(&self, id: &TestItemId) -> Option<&'static str> {
        self.events_for(id).into_iter().rev().find_map(|e| match e {
            HostEvent::Started { .. } => Some("started"),
            HostEvent::Passed { .. } => Some("passed"),
            HostEvent::Failed { .. } => Some("failed"),
            HostEvent::Skipped { .. } => Some("skipped"),
            _ => None,
        })
    }

    /// Children created under `parent`, ordered by sort index.
    pub fn children_of(&self, parent: &TestItemId) -> Vec<(&TestItemId, &str)> {
        let mut children: Vec<(usize, &TestItemId, &str)> = self
            .events
            .iter()
            .filter_map(|e| match e {
                HostEvent::Created { parent: p, id, label, sort_index } if p == parent => {
                    Some((*sort_index, id, label.as_str()))
                }
                _ => None,
            })
            .collect();
        children.sort_by_key(|(idx, _, _)| *idx);
        children.into_iter().map(|(_, id, label)| (id, label)).collect()
    }
}

impl TestHost for RecordingHost {
    fn create_item(&mut self, parent: &TestItemId, id: &TestItemId, label: &str, sort_index: usize) {
        self.events.push(HostEvent::Created {
            parent: parent.clone(),
            id: id.clone(),
            label: label.to_string(),
            sort_index,
        });
    }

    fn started(&mut self, id: &TestItemId) {
        self.events.push(HostEvent::Started { id: id.clone() });
    }

    fn passed(&mut self, id: &TestItemId) {
        self.events.push(HostEvent::Passed { id: id.clone() });
    }

    fn failed(&mut self, id: &TestItemId, message: Option<&str>) {
        self.events.push(HostEvent::Failed {
            id: id.clone(),
            message: message.map(str::to_string),
        });
    }

    fn skipped(&mut self, id: &TestItemId) {
        self.events.push(HostEvent::Skipped { id: id.clone() });
    }

    fn append_output(&mut self, line: &str) {
        self.output.push(line.to_string());
    }

    fn debugger_ready(&mut self, port: u16) {
        self.events.push(HostEvent::DebuggerReady { port });
    }
}

/// Streams each event as one JSON object per line. Process output is not echoed.
pub struct JsonLinesHost<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesHost<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(&mut self, event: HostEvent) {
        let result = serde_json::to_string(&event)
            .map_err(std::io::Error::from)
            .and_then(|line| {
                writeln!(self.writer, "{}", line)?;
                self.writer.flush()
            });
        if let Err(e) = result {
            tracing::warn!("Failed to write host event: {}", e);
        }
    }
}

impl<W: Write> TestHost for JsonLinesHost<W> {
    fn create_item(&mut self, parent: &TestItemId, id: &TestItemId, label: &str, sort_index: usize) {
        self.emit(HostEvent::Created {
            parent: parent.clone(),
            id: id.clone(),
            label: label.to_string(),
            sort_index,
        });
    }

    fn started(&mut self, id: &TestItemId) {
        self.emit(HostEvent::Started { id: id.clone() });
    }

    fn passed(&mut self, id: &TestItemId) {
        self.emit(HostEvent::Passed { id: id.clone() });
    }

    fn failed(&mut self, id: &TestItemId, message: Option<&str>) {
        self.emit(HostEvent::Failed {
            id: id.clone(),
            message: message.map(str::to_string),
        });
    }

    fn skipped(&mut self, id: &TestItemId) {
        self.emit(HostEvent::Skipped { id: id.clone() });
    }

    fn debugger_ready(&mut self, port: u16) {
        self.emit(HostEvent::DebuggerReady { port });
    }
}
