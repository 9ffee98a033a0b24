use crate::forwarding::{DisplayHost, ForwardingController};
use crate::state::StateFile;
use crate::CoreError;
use serde::Serialize;
use simbox_runtime::{
    detect_runtime, select_backend, BackendOptions, Confirmer, ContainerBackend, DetectedRuntime,
    Operation, ProcessRunner, ProjectLayout, RuntimeError, RuntimeKind, RuntimeProbe,
    VariableSet,
};
use std::path::PathBuf;
use tracing::{info, warn};

/// One requested lifecycle operation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCommand {
    Start,
    Enter,
    Config { output: Option<PathBuf> },
    Copy { output_dir: Option<PathBuf> },
    Stop,
    HardStop,
    Cleanup,
    DeepCleanup,
}

impl LifecycleCommand {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Start => Operation::Start,
            Self::Enter => Operation::Enter,
            Self::Config { .. } => Operation::Config,
            Self::Copy { .. } => Operation::Copy,
            Self::Stop => Operation::Stop,
            Self::HardStop => Operation::HardStop,
            Self::Cleanup => Operation::Cleanup,
            Self::DeepCleanup => Operation::DeepCleanup,
        }
    }
}

/// What one invocation needs to assemble a session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub context_dir: PathBuf,
    /// Forced runtime binary name; probed when `None`.
    pub runtime: Option<String>,
    pub options: BackendOptions,
}

/// Summary of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub command: Operation,
    pub backend: String,
    pub runtime: RuntimeKind,
    pub profile: String,
    /// Layered variables the backend runs with.
    pub variables: VariableSet,
    pub warnings: Vec<String>,
}

/// Resolve the runtime before anything else touches the host, then build
/// the backend and state handle for this invocation.
pub fn open_session<'a>(
    config: SessionConfig,
    probe: &dyn RuntimeProbe,
    runner: &'a dyn ProcessRunner,
) -> Result<Dispatcher<'a>, CoreError> {
    let runtime = match config.runtime.as_deref() {
        Some(name) => DetectedRuntime::from_name(name)?,
        None => detect_runtime(probe)?,
    };
    info!("using {} runtime ({})", runtime.kind, runtime.binary);

    let layout = ProjectLayout::new(config.context_dir);
    let state = StateFile::new(layout.state_file());
    let backend = select_backend(&runtime, layout.clone(), config.options, runner);
    Ok(Dispatcher::new(backend, state, layout))
}

/// Routes lifecycle commands to a backend, wrapping them with forwarding
/// setup and teardown.
pub struct Dispatcher<'a> {
    backend: Box<dyn ContainerBackend + 'a>,
    state: StateFile,
    host: DisplayHost,
    layout: ProjectLayout,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        backend: Box<dyn ContainerBackend + 'a>,
        state: StateFile,
        layout: ProjectLayout,
    ) -> Self {
        Self {
            backend,
            state,
            host: DisplayHost::detect(),
            layout,
        }
    }

    #[must_use]
    pub fn with_display_host(mut self, host: DisplayHost) -> Self {
        self.host = host;
        self
    }

    pub fn backend(&self) -> &dyn ContainerBackend {
        self.backend.as_ref()
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    fn forwarding(&mut self) -> ForwardingController<'_> {
        ForwardingController::new(
            &mut self.state,
            self.host.clone(),
            self.layout.forwarding_compose_file(),
        )
    }

    pub fn dispatch(
        &mut self,
        command: &LifecycleCommand,
        confirm: &dyn Confirmer,
    ) -> Result<Outcome, CoreError> {
        let op = command.operation();
        let caps = self.backend.capabilities();
        let mut warnings = Vec::new();

        if caps.supports(op) {
            let result = match command {
                LifecycleCommand::Start => {
                    let overlay = self.forwarding().check(caps)?;
                    self.backend.start(&overlay)
                }
                LifecycleCommand::Enter => {
                    let overlay = self.forwarding().refresh(caps)?;
                    self.backend.enter(&overlay)
                }
                LifecycleCommand::Config { output } => self.backend.config(output.as_deref()),
                LifecycleCommand::Copy { output_dir } => {
                    self.backend.copy(output_dir.as_deref())
                }
                LifecycleCommand::Stop => self.backend.stop(),
                LifecycleCommand::HardStop => self.backend.hard_stop(),
                LifecycleCommand::Cleanup => self.backend.cleanup(confirm),
                LifecycleCommand::DeepCleanup => self.backend.deep_cleanup(confirm),
            };
            match result {
                Ok(()) => {}
                Err(e @ RuntimeError::Unsupported { .. }) => warnings.push(e.to_string()),
                Err(e) => return Err(e.into()),
            }
        } else {
            warnings.push(self.backend.unsupported(op).to_string());
        }
        for w in &warnings {
            warn!("{w}");
        }

        if op.ends_session() {
            self.forwarding().cleanup()?;
        }

        Ok(Outcome {
            command: op,
            backend: self.backend.name().to_owned(),
            runtime: self.backend.kind(),
            profile: self.backend.profile().to_string(),
            variables: self.backend.variables().clone(),
            warnings,
        })
    }
}
