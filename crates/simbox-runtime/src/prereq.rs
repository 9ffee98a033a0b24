use crate::RuntimeError;
use serde::Serialize;
use std::fmt;
use std::process::Command;

/// The two runtime models a session can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Long-lived named containers orchestrated through compose files.
    Engine,
    /// A single immutable image file, no persistent container state.
    Image,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine => f.write_str("engine"),
            Self::Image => f.write_str("image"),
        }
    }
}

/// A runtime binary found on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedRuntime {
    pub kind: RuntimeKind,
    pub binary: String,
}

impl DetectedRuntime {
    /// Map an explicit runtime name to its kind.
    pub fn from_name(name: &str) -> Result<Self, RuntimeError> {
        let kind = match name {
            "docker" => RuntimeKind::Engine,
            "apptainer" | "singularity" => RuntimeKind::Image,
            other => {
                return Err(RuntimeError::Configuration(format!(
                    "unknown runtime '{other}' (expected one of: {})",
                    RUNTIME_CANDIDATES
                        .iter()
                        .map(|(n, _)| *n)
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
        };
        Ok(Self {
            kind,
            binary: name.to_owned(),
        })
    }
}

/// Probing order: the engine binary wins over image runtimes.
const RUNTIME_CANDIDATES: [(&str, RuntimeKind); 3] = [
    ("docker", RuntimeKind::Engine),
    ("apptainer", RuntimeKind::Image),
    ("singularity", RuntimeKind::Image),
];

pub trait RuntimeProbe {
    fn has_binary(&self, name: &str) -> bool;
}

/// Looks binaries up on the host `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl RuntimeProbe for SystemProbe {
    fn has_binary(&self, name: &str) -> bool {
        command_exists(name)
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn detect_runtime(probe: &dyn RuntimeProbe) -> Result<DetectedRuntime, RuntimeError> {
    for (binary, kind) in RUNTIME_CANDIDATES {
        if probe.has_binary(binary) {
            return Ok(DetectedRuntime {
                kind,
                binary: binary.to_owned(),
            });
        }
    }
    Err(RuntimeError::RuntimeNotFound(format_missing(&missing_runtimes())))
}

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn missing_runtimes() -> Vec<MissingPrereq> {
    vec![
        MissingPrereq {
            name: "docker",
            purpose: "compose-orchestrated workstation containers",
            install_hint: "https://docs.docker.com/engine/install/ (with the compose plugin)",
        },
        MissingPrereq {
            name: "apptainer",
            purpose: "single-image containers on clusters without a daemon",
            install_hint: "module load apptainer | apt install apptainer | or singularity",
        },
    ]
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("install one of:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg
}
