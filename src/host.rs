use std::fmt::Display;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::{
    capability::{Capability, Frame, TraceStub},
    parse,
    vm::{ExeState, Registration},
};

/// Names the fixed template every script is compiled against: the entry
/// point a script registers blocks through, and the capability method those
/// blocks may call at dispatch time. Built once, passed explicitly.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub entry_point: String,
    pub capability_method: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            entry_point: "test".into(),
            capability_method: "doSomething".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub severity: Severity,
    pub message: String,
}

impl DiagnosticReport {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// The live result of running a script: the registrations it accumulated,
/// frozen in insertion order.
pub struct ScriptInstance {
    registrations: Vec<Registration>,
}

impl ScriptInstance {
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }
}

pub enum CompilationResult {
    Failure(Vec<DiagnosticReport>),
    Success(ScriptInstance),
}

pub struct Host {
    config: HostConfig,
}

impl Host {
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Self {
        Self { config }
    }

    /// Compile and run one script file. Read, compile and runtime failures
    /// all surface as diagnostic reports; no partial instance is produced.
    pub fn evaluate(&self, path: &Path) -> CompilationResult {
        match self.run_script(path) {
            Ok(instance) => CompilationResult::Success(instance),
            Err(err) => CompilationResult::Failure(vec![DiagnosticReport::error(format!(
                "{err:#}"
            ))]),
        }
    }

    fn run_script(&self, path: &Path) -> anyhow::Result<ScriptInstance> {
        let chunk = path.display().to_string();
        let source = fs::read_to_string(path)
            .with_context(|| format!("cannot read script {chunk}"))?;

        let proto = parse::load(&source, &chunk)
            .with_context(|| format!("cannot compile {chunk}"))?;

        let mut state = ExeState::for_script(&self.config);
        state.push_frame(Frame::new("<main chunk>", &chunk));
        state.execute(&proto)?;

        log::debug!("{chunk}: script executed");

        Ok(ScriptInstance {
            registrations: state.into_registrations(),
        })
    }

    /// Apply every registration, in order, to a fresh trace stub.
    pub fn dispatch(&self, script: &ScriptInstance) {
        self.dispatch_with(script, || Box::new(TraceStub));
    }

    pub fn dispatch_with<F>(&self, script: &ScriptInstance, mut make_stub: F)
    where
        F: FnMut() -> Box<dyn Capability>,
    {
        println!("Script has {} tests.", script.registrations().len());

        for (index, registration) in script.registrations().iter().enumerate() {
            println!("=== Test n°{}===", index + 1);

            let mut state = ExeState::for_dispatch(&self.config, make_stub());
            state.push_frame(Frame::new("<dispatch>", "host"));
            state.push_frame(Frame::new(
                format!("test n°{}", index + 1),
                registration.chunk.as_str(),
            ));

            // one failing registration does not abort the remaining ones
            if let Err(err) = state.execute(registration) {
                println!(
                    " - [{}] test n°{} failed: {err}",
                    Severity::Error,
                    index + 1
                );
            }
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}
