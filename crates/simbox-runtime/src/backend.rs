use crate::compose::ComposeBackend;
use crate::env::{VariableSet, IMAGE_ENV_PREFIX};
use crate::image::ImageBackend;
use crate::layout::{Profile, ProjectLayout};
use crate::prereq::{DetectedRuntime, RuntimeKind};
use crate::process::ProcessRunner;
use crate::RuntimeError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// The lifecycle operations every backend is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Start,
    Enter,
    Stop,
    HardStop,
    Cleanup,
    DeepCleanup,
    Copy,
    Config,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Enter => "enter",
            Self::Stop => "stop",
            Self::HardStop => "hard_stop",
            Self::Cleanup => "cleanup",
            Self::DeepCleanup => "deep_cleanup",
            Self::Copy => "copy",
            Self::Config => "config",
        }
    }

    /// Operations after which stale display-forwarding state is dropped.
    pub fn ends_session(self) -> bool {
        matches!(
            self,
            Self::Stop | Self::HardStop | Self::Cleanup | Self::DeepCleanup
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a backend can meaningfully do. Callers query these instead of
/// branching on the runtime name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub supports_stop: bool,
    pub supports_hard_stop: bool,
    pub supports_deep_cleanup: bool,
    pub supports_copy: bool,
    pub supports_config: bool,
    /// Accepts extra declarative compose fragments (e.g. for forwarding).
    pub supports_compose_fragments: bool,
    /// Host variables must be re-exported explicitly to reach the container.
    pub requires_env_propagation: bool,
}

impl Capabilities {
    pub fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::Start | Operation::Enter | Operation::Cleanup => true,
            Operation::Stop => self.supports_stop,
            Operation::HardStop => self.supports_hard_stop,
            Operation::DeepCleanup => self.supports_deep_cleanup,
            Operation::Copy => self.supports_copy,
            Operation::Config => self.supports_config,
        }
    }

    /// `vars` as the runtime process environment, with the prefixed mirror
    /// when the runtime does not pass host variables through.
    pub fn runtime_env(&self, vars: &VariableSet) -> Vec<(String, String)> {
        let mut env = vars.to_process_env();
        if self.requires_env_propagation {
            env.extend(vars.to_prefixed_env(IMAGE_ENV_PREFIX));
        }
        env
    }
}

/// Display forwarding contributed to a start or enter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwardingOverlay {
    /// Extra compose fragments (engine backend only).
    pub compose_files: Vec<PathBuf>,
    /// Variables to add to the session environment.
    pub env: Vec<(String, String)>,
    /// Raw runtime arguments (image backend only).
    pub run_args: Vec<String>,
}

impl ForwardingOverlay {
    pub fn is_empty(&self) -> bool {
        self.compose_files.is_empty() && self.env.is_empty() && self.run_args.is_empty()
    }
}

/// Answer to a destructive-action prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
    /// Stop asking; keep everything not yet removed.
    Cancel,
}

pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> Confirmation;
}

/// A pre-determined answer for non-interactive callers.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub Confirmation);

impl Confirmer for FixedAnswer {
    fn confirm(&self, _prompt: &str) -> Confirmation {
        self.0
    }
}

/// Per-session inputs shared by both backends.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub profile: Profile,
    /// Additional compose files, merged after the base compose file.
    pub extra_compose_files: Vec<PathBuf>,
    /// Additional variable files, layered after the profile file.
    pub extra_env_files: Vec<PathBuf>,
}

/// A container runtime able to run a simulation session.
///
/// Operations a backend cannot perform keep the default implementation, which
/// reports `RuntimeError::Unsupported`; `capabilities()` must agree with the
/// methods actually overridden.
pub trait ContainerBackend {
    fn kind(&self) -> RuntimeKind;

    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn profile(&self) -> &Profile;

    fn variables(&self) -> &VariableSet;

    /// Why `op` is unavailable, shown to the operator.
    fn unsupported_reason(&self, _op: Operation) -> &'static str {
        "not implemented by this backend"
    }

    fn unsupported(&self, op: Operation) -> RuntimeError {
        RuntimeError::Unsupported {
            backend: self.name().to_owned(),
            operation: op,
            reason: self.unsupported_reason(op).to_owned(),
        }
    }

    fn start(&self, forwarding: &ForwardingOverlay) -> Result<(), RuntimeError>;

    fn enter(&self, forwarding: &ForwardingOverlay) -> Result<(), RuntimeError>;

    fn stop(&self) -> Result<(), RuntimeError> {
        Err(self.unsupported(Operation::Stop))
    }

    fn hard_stop(&self) -> Result<(), RuntimeError> {
        Err(self.unsupported(Operation::HardStop))
    }

    fn cleanup(&self, confirm: &dyn Confirmer) -> Result<(), RuntimeError>;

    fn deep_cleanup(&self, _confirm: &dyn Confirmer) -> Result<(), RuntimeError> {
        Err(self.unsupported(Operation::DeepCleanup))
    }

    fn copy(&self, _output_dir: Option<&Path>) -> Result<(), RuntimeError> {
        Err(self.unsupported(Operation::Copy))
    }

    fn config(&self, _output: Option<&Path>) -> Result<(), RuntimeError> {
        Err(self.unsupported(Operation::Config))
    }
}

pub fn select_backend<'a>(
    runtime: &DetectedRuntime,
    layout: ProjectLayout,
    options: BackendOptions,
    runner: &'a dyn ProcessRunner,
) -> Box<dyn ContainerBackend + 'a> {
    match runtime.kind {
        RuntimeKind::Engine => Box::new(ComposeBackend::new(
            &runtime.binary,
            layout,
            options,
            runner,
        )),
        RuntimeKind::Image => Box::new(ImageBackend::new(&runtime.binary, layout, options, runner)),
    }
}

/// Operator-facing progress line for a backend.
pub(crate) fn progress(backend: &str, msg: &str) {
    eprintln!("[simbox/{backend}] {msg}");
}
