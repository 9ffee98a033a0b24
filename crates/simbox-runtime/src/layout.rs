use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PROFILE: &str = "base";
/// Older name for the base profile, still accepted on the command line.
const LEGACY_PROFILE_ALIAS: &str = "isaaclab";
const NAME_PREFIX: &str = "isaac-lab";

/// Workspace path of the project inside every container.
pub const CONTAINER_WORKSPACE: &str = "/workspace/isaaclab";

/// Project-side output trees, kept across sessions and only removed on confirmation.
pub const PROJECT_OUTPUT_DIRS: [&str; 3] = ["logs", "outputs", "data_storage"];

/// Directory under the volumes root that holds downloaded asset packs.
pub const ASSETS_DIR: &str = "assets";

/// Named configuration variant selecting image names and profile variable files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Profile(String);

impl Profile {
    /// Canonicalizes the legacy alias to the default profile.
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() || name == LEGACY_PROFILE_ALIAS {
            return Self(DEFAULT_PROFILE.to_owned());
        }
        Self(name.to_owned())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_PROFILE
    }

    pub fn container_name(&self) -> String {
        format!("{NAME_PREFIX}-{}", self.0)
    }

    pub fn image_tag(&self) -> String {
        format!("{NAME_PREFIX}-{}:latest", self.0)
    }

    pub fn image_file_name(&self) -> String {
        format!("{NAME_PREFIX}-{}.sif", self.0)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self(DEFAULT_PROFILE.to_owned())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory layout of a project checkout.
///
/// The context directory holds compose files, variable files and build scripts.
/// Its parent is the project root, whose parent in turn is the repository root
/// that owns the `docker_volumes` tree and the image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    context_dir: PathBuf,
    project_root: PathBuf,
    repo_root: PathBuf,
}

impl ProjectLayout {
    pub fn new(context_dir: impl Into<PathBuf>) -> Self {
        let context_dir: PathBuf = context_dir.into();
        let project_root = parent_or_self(&context_dir);
        let repo_root = parent_or_self(&project_root);
        Self {
            context_dir,
            project_root,
            repo_root,
        }
    }

    #[inline]
    pub fn context_dir(&self) -> &Path {
        &self.context_dir
    }

    #[inline]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[inline]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    #[inline]
    pub fn volumes_root(&self) -> PathBuf {
        self.repo_root.join("docker_volumes")
    }

    #[inline]
    pub fn state_file(&self) -> PathBuf {
        self.volumes_root().join("config").join(".container.cfg")
    }

    #[inline]
    pub fn image_dir(&self) -> PathBuf {
        self.repo_root.join("hyak_transfer")
    }

    pub fn image_path(&self, profile: &Profile) -> PathBuf {
        self.image_dir().join(profile.image_file_name())
    }

    #[inline]
    pub fn build_script(&self) -> PathBuf {
        self.context_dir.join("cluster").join("create_sif.sh")
    }

    #[inline]
    pub fn compose_file(&self) -> PathBuf {
        self.context_dir.join("docker-compose.yaml")
    }

    /// Compose fragment that wires display forwarding into the engine backend.
    #[inline]
    pub fn forwarding_compose_file(&self) -> PathBuf {
        self.context_dir.join("x11.yaml")
    }

    #[inline]
    pub fn base_env_file(&self) -> PathBuf {
        self.context_dir.join(".env.base")
    }

    pub fn profile_env_file(&self, profile: &Profile) -> PathBuf {
        self.context_dir.join(format!(".env.{profile}"))
    }

    #[inline]
    pub fn assets_dir(&self) -> PathBuf {
        self.volumes_root()
            .join(ASSETS_DIR)
            .join("Assets")
            .join("Isaac")
            .join("4.5")
    }

    pub fn project_output_dirs(&self) -> Vec<PathBuf> {
        PROJECT_OUTPUT_DIRS
            .iter()
            .map(|d| self.project_root.join(d))
            .collect()
    }

    /// Remove every entry of the volumes root except downloaded assets.
    /// Returns the removed paths.
    pub fn purge_volumes(&self) -> std::io::Result<Vec<PathBuf>> {
        let root = self.volumes_root();
        let mut removed = Vec::new();
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_name() == ASSETS_DIR {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed.push(path);
        }
        Ok(removed)
    }
}

fn parent_or_self(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}
