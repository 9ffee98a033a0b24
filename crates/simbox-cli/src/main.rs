mod commands;

use clap::{Args, Parser, Subcommand};
use commands::{Failure, EXIT_CONFIG_ERROR};
use simbox_core::{LifecycleCommand, SessionConfig};
use simbox_runtime::{BackendOptions, Profile};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "simbox",
    version,
    about = "Lifecycle manager for sandboxed simulation containers on Docker and Apptainer"
)]
struct Cli {
    /// Directory holding the compose files, variable files and build scripts.
    #[arg(long, env = "SIMBOX_CONTEXT_DIR", default_value = ".", global = true)]
    context_dir: PathBuf,

    /// Force a runtime (docker, apptainer or singularity) instead of probing.
    #[arg(long, env = "SIMBOX_RUNTIME", global = true)]
    runtime: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Answer yes to every cleanup prompt.
    #[arg(long, default_value_t = false, global = true, conflicts_with = "assume_no")]
    assume_yes: bool,

    /// Answer no to every cleanup prompt.
    #[arg(long, default_value_t = false, global = true)]
    assume_no: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Profile selecting the image and the `.env.<profile>` file.
    #[arg(default_value = "base")]
    profile: String,

    /// Extra compose files, merged after the base compose file.
    #[arg(short, long, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Extra variable files, layered after the profile file.
    #[arg(long, num_args = 1..)]
    env_files: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build (if needed) and start the container for a profile.
    Start(CommonArgs),
    /// Open an interactive shell in the container.
    Enter(CommonArgs),
    /// Render the merged compose configuration.
    Config {
        #[command(flatten)]
        common: CommonArgs,
        /// Write the configuration here instead of standard output.
        #[arg(long)]
        output_yaml: Option<PathBuf>,
    },
    /// Copy build artifacts out of the running container.
    Copy {
        #[command(flatten)]
        common: CommonArgs,
        /// Directory receiving `artifacts/` (defaults to the context directory).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Stop the container.
    Stop(CommonArgs),
    /// Stop the container and remove its volumes.
    #[command(name = "hard_stop", alias = "hard-stop")]
    HardStop(CommonArgs),
    /// Remove containers, images and caches; asks before deleting project outputs.
    Cleanup(CommonArgs),
    /// Cleanup plus build caches and every volume except downloaded assets.
    #[command(name = "deep_cleanup", alias = "deep-cleanup")]
    DeepCleanup(CommonArgs),
}

impl Commands {
    fn split(self, cwd: &Path) -> (LifecycleCommand, CommonArgs) {
        let resolve = |p: PathBuf| simbox_runtime::process::resolve_against(cwd, &p);
        match self {
            Self::Start(c) => (LifecycleCommand::Start, c),
            Self::Enter(c) => (LifecycleCommand::Enter, c),
            Self::Config {
                common,
                output_yaml,
            } => (
                LifecycleCommand::Config {
                    output: output_yaml.map(resolve),
                },
                common,
            ),
            Self::Copy { common, output_dir } => (
                LifecycleCommand::Copy {
                    output_dir: output_dir.map(resolve),
                },
                common,
            ),
            Self::Stop(c) => (LifecycleCommand::Stop, c),
            Self::HardStop(c) => (LifecycleCommand::HardStop, c),
            Self::Cleanup(c) => (LifecycleCommand::Cleanup, c),
            Self::DeepCleanup(c) => (LifecycleCommand::DeepCleanup, c),
        }
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SIMBOX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = session_config(&cli.context_dir, cli.runtime, cli.command).and_then(
        |(config, command)| {
            let confirm = commands::confirmer(cli.assume_yes, cli.assume_no);
            commands::lifecycle::run(config, &command, confirm.as_ref(), cli.json)
        },
    );

    match result {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}

/// Resolve paths from the command line into a session configuration.
fn session_config(
    context_dir: &Path,
    runtime: Option<String>,
    command: Commands,
) -> Result<(SessionConfig, LifecycleCommand), Failure> {
    let cwd = std::env::current_dir().map_err(|e| Failure {
        code: EXIT_CONFIG_ERROR,
        message: format!("cannot determine current directory: {e}"),
    })?;
    let context_dir = std::fs::canonicalize(context_dir).map_err(|e| Failure {
        code: EXIT_CONFIG_ERROR,
        message: format!("context directory {}: {e}", context_dir.display()),
    })?;

    let (command, common) = command.split(&cwd);
    let resolve_all = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
        paths
            .iter()
            .map(|p| simbox_runtime::process::resolve_against(&cwd, p))
            .collect()
    };
    let options = BackendOptions {
        profile: Profile::new(&common.profile),
        extra_compose_files: resolve_all(common.files),
        extra_env_files: resolve_all(common.env_files),
    };
    Ok((
        SessionConfig {
            context_dir,
            runtime,
            options,
        },
        command,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn snake_case_command_names() {
        let cli = Cli::try_parse_from(["simbox", "hard_stop", "ros"]).unwrap();
        assert!(matches!(cli.command, Commands::HardStop(ref c) if c.profile == "ros"));
        let cli = Cli::try_parse_from(["simbox", "deep-cleanup"]).unwrap();
        assert!(matches!(cli.command, Commands::DeepCleanup(ref c) if c.profile == "base"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["simbox", "restart"]).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let cli = Cli::try_parse_from([
            "simbox",
            "config",
            "--output-yaml",
            "merged.yaml",
            "--env-files",
            "a.env",
            "/abs/b.env",
        ])
        .unwrap();
        let (command, common) = cli.command.split(Path::new("/work"));
        assert_eq!(
            command,
            LifecycleCommand::Config {
                output: Some(PathBuf::from("/work/merged.yaml"))
            }
        );
        assert_eq!(common.env_files.len(), 2);
    }

    #[test]
    fn assume_flags_conflict() {
        assert!(Cli::try_parse_from(["simbox", "--assume-yes", "--assume-no", "cleanup"]).is_err());
    }
}
