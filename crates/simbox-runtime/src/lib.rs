//! Container backends and host preparation for simbox sessions.
//!
//! This crate implements the execution layer: the `ContainerBackend` trait with
//! a compose-orchestrated engine backend (Docker) and a single-image HPC backend
//! (Apptainer/Singularity), layered variable files, the bind-mount table for the
//! image backend, runtime detection, and the external-process seam every backend
//! goes through.

pub mod backend;
pub mod compose;
pub mod env;
pub mod image;
pub mod layout;
pub mod mock;
pub mod mounts;
pub mod prereq;
pub mod process;
pub mod terminal;

pub use backend::{
    select_backend, BackendOptions, Capabilities, Confirmation, Confirmer, ContainerBackend,
    FixedAnswer, ForwardingOverlay, Operation,
};
pub use env::{EnvironmentLayering, VariableSet};
pub use layout::{Profile, ProjectLayout};
pub use mounts::{BindMount, BindMountPlanner, MountKind};
pub use prereq::{detect_runtime, DetectedRuntime, RuntimeKind, RuntimeProbe, SystemProbe};
pub use process::{CapturedOutput, ExternalCommand, ProcessRunner, SystemRunner};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no supported container runtime found on this system\n{0}")]
    RuntimeNotFound(String),
    #[error("{operation} is not supported by the {backend} backend: {reason}")]
    Unsupported {
        backend: String,
        operation: Operation,
        reason: String,
    },
    #[error("command `{command}` failed with exit code {}{}", display_code(.code.as_ref()), display_streams(.stdout, .stderr))]
    ExternalProcess {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("image '{0}' does not exist. Run 'start' first.")]
    ImageMissing(String),
    #[error("container '{0}' is not running")]
    NotRunning(String),
}

fn display_code(code: Option<&i32>) -> String {
    code.map_or_else(|| "none (terminated by signal)".to_owned(), ToString::to_string)
}

fn display_streams(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str("\nstdout:\n");
        out.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        out.push_str("\nstderr:\n");
        out.push_str(stderr.trim_end());
    }
    out
}
