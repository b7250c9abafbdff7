use std::collections::HashMap;
use std::path::Path;

use crate::config::CukeSettings;
use crate::tree::RunTarget;

#[derive(Debug, Clone)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Pick the Maven executable: explicit setting, then the project's wrapper, then PATH.
pub fn maven_program(project_root: &Path, settings: &CukeSettings) -> String {
    if let Some(cmd) = &settings.maven_command {
        return cmd.clone();
    }
    let wrapper = project_root.join(if cfg!(windows) { "mvnw.cmd" } else { "mvnw" });
    if wrapper.exists() {
        wrapper.to_string_lossy().to_string()
    } else {
        "mvn".to_string()
    }
}

/// Build the Maven invocation that runs `target` with the pretty formatter.
pub fn build_command(
    project_root: &Path,
    target: &RunTarget,
    settings: &CukeSettings,
    debug: bool,
) -> TestCommand {
    let mut args = vec![
        "test".to_string(),
        format!("-Dcucumber.features={}", target.features_arg()),
        "-Dcucumber.plugin=pretty".to_string(),
        "-Dsurefire.useFile=false".to_string(),
    ];

    if let Some(tags) = &settings.tags {
        args.push(format!("-Dcucumber.filter.tags={}", tags));
    }

    if debug {
        // suspend=y: the JVM waits for the debugger before running any step.
        args.push(format!(
            "-Dmaven.surefire.debug=-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address={}",
            settings.debug_port
        ));
    }

    TestCommand {
        program: maven_program(project_root, settings),
        args,
        env: settings.env.clone(),
    }
}
