pub mod driver;
pub mod host;
pub mod projector;
pub mod reconcile;
pub mod session;

pub use driver::{execute, run_items, run_target};
pub use host::{HostEvent, JsonLinesHost, RecordingHost, TestHost};
pub use projector::{ExecutionState, LifecycleProjector, ScenarioOutcome, ScenarioStatus};
pub use reconcile::{Resolution, StepReconciler};
pub use session::{OutputStream, ResolvedStep, RunOutcome, RunSession};
