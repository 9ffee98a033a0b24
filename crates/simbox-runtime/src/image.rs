use crate::backend::{
    progress, BackendOptions, Capabilities, Confirmation, Confirmer, ContainerBackend,
    ForwardingOverlay, Operation,
};
use crate::env::{EnvironmentLayering, VariableSet};
use crate::layout::{Profile, ProjectLayout, CONTAINER_WORKSPACE};
use crate::mounts::{BindMount, BindMountPlanner};
use crate::prereq::RuntimeKind;
use crate::process::{run_checked, stream_interactive, ExternalCommand, ProcessRunner};
use crate::terminal;
use crate::RuntimeError;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

const ASSET_DOWNLOAD_URL: &str = "https://docs.isaacsim.omniverse.nvidia.com/4.5.0/installation/install_faq.html#isaac-sim-setup-assets-content-pack";

/// Asset pack folders that must both be present for a local asset root.
const ASSET_PACKS: [&str; 2] = ["NVIDIA", "Isaac"];

/// Volume subtrees that belong to the image and are dropped by `cleanup`.
const VOLUME_CACHE_DIRS: [&str; 8] = [
    "kit",
    "cache",
    "config",
    "logs",
    "data",
    "docs",
    "shell_history",
    "tmp",
];

/// Shell run inside the container on `enter`.
fn enter_script() -> String {
    format!(
        "cd {CONTAINER_WORKSPACE}
export HISTFILE=/root/.bash_history
export HISTSIZE=1000
export HISTFILESIZE=2000
shopt -s histappend
PROMPT_COMMAND='history -a'
export ISAAC_SIM_ASSET_ROOT=\"/isaacsim_assets/Assets/Isaac/4.5\"
exec /bin/bash --rcfile /root/.bashrc -i"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    Present(PathBuf),
    /// Sessions fall back to the remote asset server.
    Missing(PathBuf),
}

/// Image backend: runs from a single immutable image file with no daemon
/// and no container state between runs.
pub struct ImageBackend<'a> {
    binary: String,
    layout: ProjectLayout,
    profile: Profile,
    vars: VariableSet,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ImageBackend<'a> {
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
            runner,
        }
    }

    pub fn image_path(&self) -> PathBuf {
        self.layout.image_path(&self.profile)
    }

    /// Layered and forwarding variables in the form the runtime passes them on.
    fn session_env(&self, forwarding: &ForwardingOverlay) -> Vec<(String, String)> {
        let mut vars = self.vars.clone();
        for (k, v) in &forwarding.env {
            vars.insert(k.as_str(), v.as_str());
        }
        self.capabilities().runtime_env(&vars)
    }

    pub fn check_assets(&self) -> AssetStatus {
        let dir = self.layout.assets_dir();
        if ASSET_PACKS.iter().all(|pack| dir.join(pack).is_dir()) {
            AssetStatus::Present(dir)
        } else {
            AssetStatus::Missing(dir)
        }
    }

    fn report_assets(&self) {
        match self.check_assets() {
            AssetStatus::Present(dir) => {
                progress(self.name(), &format!("assets found at {}", dir.display()));
            }
            AssetStatus::Missing(dir) => {
                progress(self.name(), &format!("assets not found at {}", dir.display()));
                progress(
                    self.name(),
                    &format!("download the three asset packs from: {ASSET_DOWNLOAD_URL}"),
                );
                progress(self.name(), &format!("extract to: {}", dir.display()));
                progress(
                    self.name(),
                    "cloud assets will be used until local assets are available",
                );
            }
        }
    }

    fn build_image(&self, forwarding: &ForwardingOverlay) -> Result<(), RuntimeError> {
        let script = self.layout.build_script();
        if !script.is_file() {
            return Err(RuntimeError::Configuration(format!(
                "image build script not found at: {}",
                script.display()
            )));
        }
        let image_name = self.profile.image_file_name();
        progress(
            self.name(),
            &format!("image '{image_name}' does not exist, building it"),
        );
        let mut cmd =
            ExternalCommand::new(script.to_string_lossy()).envs(self.session_env(forwarding));
        if let Some(dir) = script.parent() {
            cmd = cmd.current_dir(dir);
        }
        let out = run_checked(self.runner, &cmd)?;
        if !out.stdout.trim().is_empty() {
            eprintln!("{}", out.stdout.trim_end());
        }
        progress(
            self.name(),
            &format!("successfully created image '{image_name}'"),
        );
        Ok(())
    }

    /// The full `exec` invocation for an interactive session.
    pub fn enter_command(
        &self,
        forwarding: &ForwardingOverlay,
        mounts: &[BindMount],
    ) -> ExternalCommand {
        let mut cmd = ExternalCommand::new(&self.binary)
            .args(["exec", "--contain", "--nv"])
            .args(forwarding.run_args.iter().cloned());
        for mount in mounts {
            cmd = cmd.arg("--bind").arg(mount.to_bind_arg());
        }
        cmd.arg(self.image_path().to_string_lossy())
            .args(["/bin/bash".to_owned(), "-c".to_owned(), enter_script()])
            .current_dir(self.layout.context_dir())
            .envs(self.session_env(forwarding))
    }

    fn remove_volume_caches(&self) -> Result<(), RuntimeError> {
        let vol = self.layout.volumes_root();
        for name in VOLUME_CACHE_DIRS {
            let dir = vol.join(name);
            if dir.exists() {
                progress(
                    self.name(),
                    &format!("removing cache directory: {}", dir.display()),
                );
                fs::remove_dir_all(&dir)?;
            } else {
                debug!("cache directory does not exist: {}", dir.display());
            }
        }
        Ok(())
    }

    fn remove_project_outputs(&self, confirm: &dyn Confirmer) -> Result<(), RuntimeError> {
        for dir in self.layout.project_output_dirs() {
            if !dir.exists() {
                debug!("workspace directory does not exist: {}", dir.display());
                continue;
            }
            match confirm.confirm(&format!("Remove workspace directory '{}'?", dir.display())) {
                Confirmation::Yes => {
                    progress(
                        self.name(),
                        &format!("removing workspace directory: {}", dir.display()),
                    );
                    fs::remove_dir_all(&dir)?;
                }
                Confirmation::No => {
                    progress(
                        self.name(),
                        &format!("keeping workspace directory: {}", dir.display()),
                    );
                }
                Confirmation::Cancel => {
                    progress(
                        self.name(),
                        "cleanup prompt cancelled, keeping remaining workspace directories",
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}

impl ContainerBackend for ImageBackend<'_> {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Image
    }

    fn name(&self) -> &str {
        &self.binary
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stop: false,
            supports_hard_stop: false,
            supports_deep_cleanup: true,
            supports_copy: false,
            supports_config: false,
            supports_compose_fragments: false,
            requires_env_propagation: true,
        }
    }

    fn profile(&self) -> &Profile {
        &self.profile
    }

    fn variables(&self) -> &VariableSet {
        &self.vars
    }

    fn unsupported_reason(&self, op: Operation) -> &'static str {
        match op {
            Operation::Stop | Operation::HardStop => {
                "image containers are ephemeral, there is nothing to stop"
            }
            Operation::Copy => "bind mounts already expose artifacts on the host",
            Operation::Config => "there is no compose configuration to render",
            _ => "not implemented by this backend",
        }
    }

    fn start(&self, forwarding: &ForwardingOverlay) -> Result<(), RuntimeError> {
        for dir in self.layout.project_output_dirs() {
            if !dir.exists() {
                info!("creating directory: {}", dir.display());
                fs::create_dir_all(&dir)?;
            }
        }
        self.report_assets();

        if self.image_path().exists() {
            progress(
                self.name(),
                &format!("image '{}' already exists", self.profile.image_file_name()),
            );
            return Ok(());
        }
        self.build_image(forwarding)
    }

    fn enter(&self, forwarding: &ForwardingOverlay) -> Result<(), RuntimeError> {
        if !self.image_path().exists() {
            return Err(RuntimeError::ImageMissing(self.profile.image_file_name()));
        }
        if forwarding.run_args.is_empty() {
            progress(self.name(), "display forwarding is disabled");
        } else {
            progress(self.name(), "display forwarding is enabled");
        }
        let mounts = BindMountPlanner::new(&self.layout).plan()?;
        let cmd = self.enter_command(forwarding, &mounts);

        let name = self.profile.container_name();
        terminal::print_session_banner(&name, self.profile.as_str(), self.name());
        let result = stream_interactive(self.runner, &cmd);
        terminal::print_session_exit(&name);
        result
    }

    fn cleanup(&self, confirm: &dyn Confirmer) -> Result<(), RuntimeError> {
        let image = self.image_path();
        if image.exists() {
            progress(
                self.name(),
                &format!("removing image '{}'", self.profile.image_file_name()),
            );
            fs::remove_file(&image)?;
        } else {
            progress(
                self.name(),
                &format!("image '{}' does not exist", self.profile.image_file_name()),
            );
        }

        self.remove_volume_caches()?;
        self.remove_project_outputs(confirm)?;

        // Best effort: the runtime's own cache lives outside the project.
        let clean = ExternalCommand::new(&self.binary).args(["cache", "clean", "--force"]);
        match self.runner.capture(&clean) {
            Ok(out) if out.succeeded() => debug!("{} cache cleaned", self.binary),
            Ok(out) => debug!("{} cache clean failed: {}", self.binary, out.stderr.trim()),
            Err(e) => debug!("could not clean {} cache: {e}", self.binary),
        }
        Ok(())
    }

    fn deep_cleanup(&self, confirm: &dyn Confirmer) -> Result<(), RuntimeError> {
        self.cleanup(confirm)?;
        for removed in self.layout.purge_volumes()? {
            info!("removed {}", removed.display());
        }
        progress(
            self.name(),
            "deep cleanup complete (downloaded assets were preserved)",
        );
        Ok(())
    }
}
