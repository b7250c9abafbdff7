use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::host::TestHost;
use super::session::{OutputStream, RunOutcome, RunSession};
use crate::config::CukeSettings;
use crate::maven::{self, TestCommand};
use crate::tree::{FeatureNode, RunTarget, ScenarioNode};
use crate::{Error, Result};

const READ_CHUNK_SIZE: usize = 8192;

/// Everything the reader tasks hand to the run loop.
#[derive(Debug)]
pub enum DriverMessage {
    Chunk { stream: OutputStream, bytes: Vec<u8> },
    ReadFailed { stream: OutputStream, reason: String },
    Closed(OutputStream),
}

async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<DriverMessage>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let message = DriverMessage::Chunk { stream, bytes: buf[..n].to_vec() };
                if tx.send(message).is_err() {
                    // Run loop is gone (debug timeout); nobody left to read for.
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(DriverMessage::ReadFailed { stream, reason: e.to_string() });
                break;
            }
        }
    }
    let _ = tx.send(DriverMessage::Closed(stream));
}

/// Spawn `command` and stream its output through a fresh session until it exits.
///
/// In debug mode the run is abandoned with `DebugAttachTimeout` if the JVM never
/// reports it is listening within `debug_attach_timeout_ms`.
pub async fn execute<H: TestHost + ?Sized>(
    host: &mut H,
    command: &TestCommand,
    cwd: &Path,
    scenarios: &[&ScenarioNode],
    settings: &CukeSettings,
    debug: bool,
) -> Result<RunOutcome> {
    tracing::info!("Running {} {}", command.program, command.args.join(" "));

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .envs(&command.env)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::SpawnFailed {
            program: command.program.clone(),
            reason: e.to_string(),
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut open_streams = 0;
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, OutputStream::Stdout, tx.clone()));
        open_streams += 1;
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, OutputStream::Stderr, tx.clone()));
        open_streams += 1;
    }
    drop(tx);

    let mut session = RunSession::new(host, scenarios, settings.show_step_results)
        .with_glyphs(settings.glyph_table());
    let attach_deadline = debug.then(|| {
        tokio::time::Instant::now() + Duration::from_millis(settings.debug_attach_timeout_ms)
    });
    let mut stream_error: Option<String> = None;

    while open_streams > 0 {
        let waiting_for_debugger = attach_deadline.filter(|_| session.debugger_port().is_none());
        let message = match waiting_for_debugger {
            Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(message) => message,
                Err(_) => {
                    tracing::warn!(
                        "No debugger listener after {}ms, killing {}",
                        settings.debug_attach_timeout_ms,
                        command.program
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill {}: {}", command.program, e);
                    }
                    return Err(Error::DebugAttachTimeout(settings.debug_attach_timeout_ms));
                }
            },
            None => rx.recv().await,
        };

        let Some(message) = message else { break };
        match message {
            DriverMessage::Chunk { stream, bytes } => session.feed(stream, &bytes),
            DriverMessage::ReadFailed { stream, reason } => {
                tracing::warn!("Reading {:?} failed: {}", stream, reason);
                stream_error.get_or_insert(format!("{:?}: {}", stream, reason));
            }
            DriverMessage::Closed(_) => open_streams -= 1,
        }
    }

    let exit_code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!("Waiting for {} failed: {}", command.program, e);
            stream_error.get_or_insert(e.to_string());
            None
        }
    };

    Ok(session.finish(exit_code, stream_error))
}

/// Run one target against the discovered tree.
pub async fn run_target<H: TestHost + ?Sized>(
    host: &mut H,
    project_root: &Path,
    features: &[FeatureNode],
    target: &RunTarget,
    settings: &CukeSettings,
    debug: bool,
) -> Result<RunOutcome> {
    let scenarios = target.select(features)?;
    let command = maven::build_command(project_root, target, settings, debug);
    execute(host, &command, project_root, &scenarios, settings, debug).await
}

/// Run targets one after another. `cancel` is checked before each item; a run
/// already in flight is left to finish.
pub async fn run_items<H: TestHost + ?Sized>(
    host: &mut H,
    project_root: &Path,
    features: &[FeatureNode],
    targets: &[RunTarget],
    settings: &CukeSettings,
    debug: bool,
    cancel: &AtomicBool,
) -> Result<Vec<(RunTarget, RunOutcome)>> {
    let mut outcomes = Vec::with_capacity(targets.len());

    for target in targets {
        if cancel.load(Ordering::SeqCst) {
            tracing::info!("Run cancelled before {}", target);
            break;
        }

        let outcome = match run_target(host, project_root, features, target, settings, debug).await {
            Err(Error::DebugAttachTimeout(ms)) => {
                tracing::warn!(
                    "Debugger not ready after {}ms; running {} without debugging",
                    ms,
                    target
                );
                run_target(host, project_root, features, target, settings, false).await?
            }
            other => other?,
        };
        outcomes.push((target.clone(), outcome));
    }

    Ok(outcomes)
}
