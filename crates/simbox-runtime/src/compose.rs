use crate::backend::{
    progress, BackendOptions, Capabilities, Confirmer, ContainerBackend, ForwardingOverlay,
};
use crate::env::{EnvironmentLayering, VariableSet};
use crate::layout::{Profile, ProjectLayout, CONTAINER_WORKSPACE};
use crate::prereq::RuntimeKind;
use crate::process::{
    run_checked, stream_checked, stream_interactive, ExternalCommand, ProcessRunner,
};
use crate::terminal;
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Service name of the base image in the compose file.
const BASE_SERVICE: &str = "isaac-lab-base";

/// Container paths copied back to the host by `copy`, relative to the workspace.
const ARTIFACT_DIRS: [&str; 3] = ["logs", "docs/_build", "data_storage"];

/// Engine backend: a named, long-lived container managed through
/// multi-file `docker compose` orchestration.
pub struct ComposeBackend<'a> {
    binary: String,
    layout: ProjectLayout,
    profile: Profile,
    vars: VariableSet,
    extra_compose_files: Vec<PathBuf>,
    extra_env_files: Vec<PathBuf>,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ComposeBackend<'a> {
    pub fn new(
        binary: &str,
        layout: ProjectLayout,
        options: BackendOptions,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        let vars = EnvironmentLayering::new(&layout)
            .build(&options.profile, &options.extra_env_files);
        Self {
            binary: binary.to_owned(),
            layout,
            profile: options.profile,
            vars,
            extra_compose_files: options.extra_compose_files,
            extra_env_files: options.extra_env_files,
            runner,
        }
    }

    fn container_name(&self) -> String {
        self.profile.container_name()
    }

    fn command(&self) -> ExternalCommand {
        ExternalCommand::new(&self.binary)
            .current_dir(self.layout.context_dir())
            .envs(self.capabilities().runtime_env(&self.vars))
    }

    /// `--env-file` arguments for the variable files that exist, in layering order.
    fn env_file_args(&self) -> Vec<String> {
        EnvironmentLayering::new(&self.layout)
            .sources(&self.profile, &self.extra_env_files)
            .into_iter()
            .filter(|f| f.exists())
            .flat_map(|f| ["--env-file".to_owned(), path_arg(&f)])
            .collect()
    }

    /// `compose --file ... --profile ... --env-file ...`
    pub fn compose_args(&self, fragments: &[PathBuf]) -> Vec<String> {
        let mut args = vec![
            "compose".to_owned(),
            "--file".to_owned(),
            path_arg(&self.layout.compose_file()),
        ];
        for file in self.extra_compose_files.iter().chain(fragments) {
            args.push("--file".to_owned());
            args.push(path_arg(file));
        }
        args.push("--profile".to_owned());
        args.push(self.profile.to_string());
        args.extend(self.env_file_args());
        args
    }

    pub fn is_running(&self) -> Result<bool, RuntimeError> {
        let cmd = ExternalCommand::new(&self.binary).args(["ps", "--format", "{{.Names}}"]);
        let out = run_checked(self.runner, &cmd)?;
        let name = self.container_name();
        Ok(out.stdout.lines().any(|l| l.trim() == name))
    }

    fn image_exists(&self, tag: &str) -> Result<bool, RuntimeError> {
        let cmd = ExternalCommand::new(&self.binary).args(["image", "inspect", tag]);
        Ok(self.runner.capture(&cmd)?.succeeded())
    }

    /// Profiles extend the base image, which compose cannot build on demand.
    fn ensure_base_image(&self) -> Result<(), RuntimeError> {
        if self.profile.is_default() {
            return Ok(());
        }
        let base = Profile::default();
        if self.image_exists(&base.image_tag())? {
            return Ok(());
        }
        progress(
            self.name(),
            &format!(
                "base image '{}' not found, building it first",
                base.image_tag()
            ),
        );
        let mut args = vec![
            "compose".to_owned(),
            "--file".to_owned(),
            path_arg(&self.layout.compose_file()),
        ];
        let base_env = self.layout.base_env_file();
        if base_env.exists() {
            args.push("--env-file".to_owned());
            args.push(path_arg(&base_env));
        }
        args.push("build".to_owned());
        args.push(BASE_SERVICE.to_owned());
        stream_checked(self.runner, &self.command().args(args))
    }

    fn compose_down(&self, extra: &[&str]) -> Result<(), RuntimeError> {
        let cmd = self
            .command()
            .args(self.compose_args(&[]))
            .arg("down")
            .args(extra.iter().copied());
        stream_checked(self.runner, &cmd)
    }

    fn down_if_running(&self, extra: &[&str], verb: &str) -> Result<(), RuntimeError> {
        if !self.is_running()? {
            progress(
                self.name(),
                &format!(
                    "container '{}' is not running, nothing to {verb}",
                    self.container_name()
                ),
            );
            return Ok(());
        }
        self.compose_down(extra)?;
        progress(
            self.name(),
            &format!("container '{}' stopped", self.container_name()),
        );
        Ok(())
    }
}

impl ContainerBackend for ComposeBackend<'_> {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Engine
    }

    fn name(&self) -> &str {
        &self.binary
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stop: true,
            supports_hard_stop: true,
            supports_deep_cleanup: true,
            supports_copy: true,
            supports_config: true,
            supports_compose_fragments: true,
            requires_env_propagation: false,
        }
    }

    fn profile(&self) -> &Profile {
        &self.profile
    }

    fn variables(&self) -> &VariableSet {
        &self.vars
    }

    fn start(&self, forwarding: &ForwardingOverlay) -> Result<(), RuntimeError> {
        self.ensure_base_image()?;
        progress(
            self.name(),
            &format!(
                "building image '{}' and starting container '{}' in the background",
                self.profile.image_tag(),
                self.container_name()
            ),
        );
        let cmd = self
            .command()
            .envs(forwarding.env.iter().cloned())
            .args(self.compose_args(&forwarding.compose_files))
            .args(["up", "--detach", "--build", "--remove-orphans"]);
        stream_checked(self.runner, &cmd)
    }

    fn enter(&self, forwarding: &ForwardingOverlay) -> Result<(), RuntimeError> {
        let name = self.container_name();
        if !self.is_running()? {
            return Err(RuntimeError::NotRunning(name));
        }
        let mut cmd = self.command().args(["exec", "--interactive", "--tty"]);
        for (key, value) in &forwarding.env {
            cmd = cmd.arg("-e").arg(format!("{key}={value}"));
        }
        let cmd = cmd.arg(&name).arg("bash");

        terminal::print_session_banner(&name, self.profile.as_str(), self.name());
        let result = stream_interactive(self.runner, &cmd);
        terminal::print_session_exit(&name);
        result
    }

    fn stop(&self) -> Result<(), RuntimeError> {
        self.down_if_running(&[], "stop")
    }

    fn hard_stop(&self) -> Result<(), RuntimeError> {
        self.down_if_running(&["--volumes"], "hard stop")
    }

    fn cleanup(&self, _confirm: &dyn Confirmer) -> Result<(), RuntimeError> {
        progress(
            self.name(),
            &format!(
                "removing container, networks, volumes and images of '{}'",
                self.container_name()
            ),
        );
        self.compose_down(&["--volumes", "--rmi", "all", "--remove-orphans"])
    }

    fn deep_cleanup(&self, confirm: &dyn Confirmer) -> Result<(), RuntimeError> {
        self.cleanup(confirm)?;
        for prune in [["builder", "prune", "--force"], ["volume", "prune", "--force"]] {
            let cmd = ExternalCommand::new(&self.binary).args(prune);
            run_checked(self.runner, &cmd)?;
        }
        for removed in self.layout.purge_volumes()? {
            info!("removed {}", removed.display());
        }
        progress(
            self.name(),
            "deep cleanup complete (downloaded assets were preserved)",
        );
        Ok(())
    }

    fn copy(&self, output_dir: Option<&Path>) -> Result<(), RuntimeError> {
        let name = self.container_name();
        if !self.is_running()? {
            return Err(RuntimeError::NotRunning(name));
        }
        let artifacts = output_dir
            .unwrap_or_else(|| self.layout.context_dir())
            .join("artifacts");
        if artifacts.exists() {
            debug!("replacing {}", artifacts.display());
            std::fs::remove_dir_all(&artifacts)?;
        }
        std::fs::create_dir_all(&artifacts)?;

        for dir in ARTIFACT_DIRS {
            let host = artifacts.join(dir);
            if let Some(parent) = host.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let cmd = ExternalCommand::new(&self.binary).args([
                "cp".to_owned(),
                format!("{name}:{CONTAINER_WORKSPACE}/{dir}/"),
                path_arg(&host),
            ]);
            run_checked(self.runner, &cmd)?;
        }
        progress(
            self.name(),
            &format!("artifacts copied to {}", artifacts.display()),
        );
        Ok(())
    }

    fn config(&self, output: Option<&Path>) -> Result<(), RuntimeError> {
        let mut cmd = self.command().args(self.compose_args(&[])).arg("config");
        if let Some(path) = output {
            cmd = cmd.arg("--output").arg(path_arg(path));
        }
        stream_checked(self.runner, &cmd)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
