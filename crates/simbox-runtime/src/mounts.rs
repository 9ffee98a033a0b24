use crate::layout::{ProjectLayout, CONTAINER_WORKSPACE, PROJECT_OUTPUT_DIRS};
use crate::RuntimeError;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    pub host: PathBuf,
    pub container: PathBuf,
    pub kind: MountKind,
}

impl BindMount {
    fn dir(host: PathBuf, container: &str) -> Self {
        Self {
            host,
            container: PathBuf::from(container),
            kind: MountKind::Directory,
        }
    }

    fn file(host: PathBuf, container: &str) -> Self {
        Self {
            host,
            container: PathBuf::from(container),
            kind: MountKind::File,
        }
    }

    /// `host:container` as accepted by `--bind`.
    pub fn to_bind_arg(&self) -> String {
        format!("{}:{}", self.host.display(), self.container.display())
    }

    /// Create the host side if absent. Returns whether anything was created.
    pub fn ensure_host_path(&self) -> Result<bool, RuntimeError> {
        if self.host.exists() {
            return Ok(false);
        }
        match self.kind {
            MountKind::Directory => fs::create_dir_all(&self.host)?,
            MountKind::File => {
                if let Some(parent) = self.host.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.host)?;
            }
        }
        Ok(true)
    }
}

/// Computes the image backend's bind-mount table and prepares the host side.
pub struct BindMountPlanner<'a> {
    layout: &'a ProjectLayout,
}

impl<'a> BindMountPlanner<'a> {
    pub fn new(layout: &'a ProjectLayout) -> Self {
        Self { layout }
    }

    /// The fixed host-to-container table, without touching the filesystem.
    pub fn table(&self) -> Vec<BindMount> {
        let vol = self.layout.volumes_root();
        let project = self.layout.project_root();
        let workspace = |name: &str| format!("{CONTAINER_WORKSPACE}/{name}");

        let mut mounts = vec![
            // simulator kit cache, logs and data
            BindMount::dir(vol.join("kit/cache"), "/isaac-sim/kit/cache"),
            BindMount::dir(
                vol.join("kit/logs/Kit/Isaac-Sim"),
                "/isaac-sim/kit/logs/Kit/Isaac-Sim",
            ),
            BindMount::dir(vol.join("kit/data"), "/isaac-sim/kit/data"),
            BindMount::dir(self.layout.assets_dir(), "/isaacsim_assets/Assets/Isaac/4.5"),
            BindMount::dir(vol.join("cache/ov"), "/root/.cache/ov"),
            BindMount::dir(vol.join("cache/pip"), "/root/.cache/pip"),
            BindMount::dir(
                vol.join("cache/nvidia/GLCache"),
                "/root/.cache/nvidia/GLCache",
            ),
            BindMount::dir(vol.join("cache/compute"), "/root/.nv/ComputeCache"),
            BindMount::dir(vol.join("logs/omniverse"), "/root/.nvidia-omniverse/logs"),
            BindMount::dir(vol.join("data/omniverse"), "/root/.local/share/ov/data"),
            BindMount::dir(vol.join("docs"), "/root/Documents"),
        ];

        for tree in ["source", "scripts", "docs", "tools"] {
            mounts.push(BindMount::dir(project.join(tree), &workspace(tree)));
        }
        mounts.push(BindMount::dir(
            self.layout.repo_root().join("libraries"),
            &workspace("libraries"),
        ));
        for tree in PROJECT_OUTPUT_DIRS {
            mounts.push(BindMount::dir(project.join(tree), &workspace(tree)));
        }

        mounts.push(BindMount::file(
            vol.join("shell_history/.bash_history"),
            "/root/.bash_history",
        ));
        mounts.push(BindMount::dir(vol.join("tmp"), "/tmp"));
        mounts
    }

    /// The mount table, after making sure every host path exists.
    /// Idempotent: existing paths are left alone.
    pub fn plan(&self) -> Result<Vec<BindMount>, RuntimeError> {
        let mounts = self.table();
        for mount in &mounts {
            if mount.ensure_host_path()? {
                info!("created {}", mount.host.display());
            }
        }
        Ok(mounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn layout(dir: &Path) -> ProjectLayout {
        ProjectLayout::new(dir.join("project").join("docker"))
    }

    #[test]
    fn plan_creates_host_paths() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let mounts = BindMountPlanner::new(&layout).plan().unwrap();

        for m in &mounts {
            assert!(m.host.exists(), "{} not created", m.host.display());
            match m.kind {
                MountKind::Directory => assert!(m.host.is_dir()),
                MountKind::File => assert!(m.host.is_file()),
            }
        }
        let history = layout.volumes_root().join("shell_history/.bash_history");
        assert_eq!(fs::read(&history).unwrap().len(), 0);
    }

    #[test]
    fn plan_is_idempotent_and_preserves_history() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let planner = BindMountPlanner::new(&layout);

        let first = planner.plan().unwrap();
        let history = layout.volumes_root().join("shell_history/.bash_history");
        fs::write(&history, "ls\n").unwrap();
        let second = planner.plan().unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&history).unwrap(), "ls\n");
    }

    #[test]
    fn table_maps_project_trees_under_workspace() {
        let layout = ProjectLayout::new("/repo/project/docker");
        let table = BindMountPlanner::new(&layout).table();
        let find = |container: &str| {
            table
                .iter()
                .find(|m| m.container == Path::new(container))
                .unwrap_or_else(|| panic!("no mount for {container}"))
        };

        assert_eq!(
            find("/workspace/isaaclab/source").host,
            PathBuf::from("/repo/project/source")
        );
        assert_eq!(
            find("/workspace/isaaclab/data_storage").host,
            PathBuf::from("/repo/project/data_storage")
        );
        assert_eq!(
            find("/workspace/isaaclab/libraries").host,
            PathBuf::from("/repo/libraries")
        );
        assert_eq!(find("/root/.bash_history").kind, MountKind::File);
        assert_eq!(find("/tmp").to_bind_arg(), "/repo/docker_volumes/tmp:/tmp");
    }

    #[test]
    fn container_paths_are_unique() {
        let layout = ProjectLayout::new("/repo/project/docker");
        let table = BindMountPlanner::new(&layout).table();
        let mut targets: Vec<_> = table.iter().map(|m| m.container.clone()).collect();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), table.len());
    }
}
