use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cukestream::run::{self, JsonLinesHost, OutputStream, RunSession};
use cukestream::tree::RunTarget;
use cukestream::{config, discovery, report, Result};

const USAGE: &str = "Usage: cukestream <list [root] | run <root> <target>... [--debug] | replay <root> <target>>";

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON; logs go to stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();

    let failed = match args.get(1).map(|s| s.as_str()) {
        Some("list") if args.len() <= 3 => {
            list(Path::new(args.get(2).map_or(".", String::as_str)))?;
            false
        }
        Some("run") if args.iter().skip(2).filter(|a| *a != "--debug").count() >= 2 => {
            run_targets(&args[2..]).await?
        }
        Some("replay") if args.len() == 4 => replay(Path::new(&args[2]), &args[3])?,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn list(root: &Path) -> Result<()> {
    let features = discovery::discover(root)?;
    println!("{}", serde_json::to_string_pretty(&features)?);
    Ok(())
}

async fn run_targets(args: &[String]) -> Result<bool> {
    let debug = args.iter().any(|a| a == "--debug");
    let mut positional = args.iter().filter(|a| *a != "--debug");
    let root = Path::new(positional.next().map_or(".", String::as_str));
    let targets = positional
        .map(|t| RunTarget::parse(t))
        .collect::<Result<Vec<_>>>()?;

    let settings = config::resolve(Some(root));
    let features = discovery::discover(root)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let on_interrupt = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; remaining items will be skipped");
            on_interrupt.store(true, Ordering::SeqCst);
        }
    });

    let mut host = JsonLinesHost::new(std::io::stdout());
    let outcomes =
        run::run_items(&mut host, root, &features, &targets, &settings, debug, &cancel).await?;

    let mut failed = false;
    for (target, outcome) in &outcomes {
        failed |= outcome.failed();
        match report::write_details(&report::default_dir(), target, outcome) {
            Ok(path) => tracing::info!("Run details for {}: {}", target, path.display()),
            Err(e) => tracing::warn!("Failed to write run details for {}: {}", target, e),
        }
    }
    Ok(failed)
}

/// Reconcile captured process output from stdin against the tree, offline.
fn replay(root: &Path, target: &str) -> Result<bool> {
    let target = RunTarget::parse(target)?;
    let settings = config::resolve(Some(root));
    let features = discovery::discover(root)?;
    let scenarios = target.select(&features)?;

    let mut captured = Vec::new();
    std::io::stdin().read_to_end(&mut captured)?;

    let mut host = JsonLinesHost::new(std::io::stdout());
    let mut session = RunSession::new(&mut host, &scenarios, settings.show_step_results)
        .with_glyphs(settings.glyph_table());
    session.feed(OutputStream::Stdout, &captured);
    let outcome = session.finish(None, None);
    Ok(outcome.failed())
}
