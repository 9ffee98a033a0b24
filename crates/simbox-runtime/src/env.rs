//! Layered variable files.
//!
//! A session's variables come from, in increasing precedence: the built-in
//! defaults, `.env.base`, `.env.<profile>` (non-default profiles only), and
//! any user-supplied files in the order given. Later sources overwrite earlier
//! keys. Missing files are skipped.

use crate::layout::{Profile, ProjectLayout};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefix under which the image runtime forwards variables into the container.
pub const IMAGE_ENV_PREFIX: &str = "APPTAINERENV_";

const DEFAULT_VARIABLES: [(&str, &str); 10] = [
    ("HEADLESS", "1"),
    ("ENABLE_CAMERAS", "1"),
    ("LIVESTREAM", "0"),
    ("ISAACSIM_ASSET_ROOT", "/isaacsim_assets/Assets/Isaac/4.5"),
    ("HISTFILE", "/root/.bash_history"),
    ("HISTSIZE", "1000"),
    ("HISTFILESIZE", "2000"),
    ("TMPDIR", "/tmp"),
    ("TEMP", "/tmp"),
    ("TMP", "/tmp"),
];

/// Insertion-ordered variable map with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSet {
    entries: Vec<(String, String)>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defaults() -> Self {
        let mut set = Self::new();
        for (k, v) in DEFAULT_VARIABLES {
            set.insert(k, v);
        }
        set
    }

    /// Set `key`, replacing an existing value in place so ordering stays stable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Overlay `other` on top of `self`.
    pub fn extend(&mut self, other: VariableSet) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs for the environment of an external command.
    pub fn to_process_env(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }

    /// Pairs with every key prefixed, for runtimes that only forward
    /// explicitly tagged variables into the container.
    pub fn to_prefixed_env(&self, prefix: &str) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (format!("{prefix}{k}"), v.clone()))
            .collect()
    }
}

/// Serialized as a map in insertion order.
impl Serialize for VariableSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Parse `KEY=VALUE` lines. Blank lines, `#` comments and lines without a
/// separator are ignored; the value is everything after the first `=`.
pub fn parse_variables(content: &str) -> VariableSet {
    let mut set = VariableSet::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            set.insert(key, value);
        }
    }
    set
}

/// Read one variable file. `None` when the file is absent or unreadable.
pub fn load_variable_file(path: &Path) -> Option<VariableSet> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!("loaded variables from {}", path.display());
            Some(parse_variables(&content))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("variable file {} not present, skipping", path.display());
            None
        }
        Err(e) => {
            warn!("skipping unreadable variable file {}: {e}", path.display());
            None
        }
    }
}

/// Builds the variable set for one session.
pub struct EnvironmentLayering<'a> {
    layout: &'a ProjectLayout,
}

impl<'a> EnvironmentLayering<'a> {
    pub fn new(layout: &'a ProjectLayout) -> Self {
        Self { layout }
    }

    /// Variable files in precedence order, lowest first.
    pub fn sources(&self, profile: &Profile, extra_files: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = vec![self.layout.base_env_file()];
        if !profile.is_default() {
            files.push(self.layout.profile_env_file(profile));
        }
        files.extend(extra_files.iter().cloned());
        files
    }

    pub fn build(&self, profile: &Profile, extra_files: &[PathBuf]) -> VariableSet {
        let mut vars = VariableSet::defaults();
        for file in self.sources(profile, extra_files) {
            if let Some(layer) = load_variable_file(&file) {
                vars.extend(layer);
            }
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn context() -> (tempfile::TempDir, ProjectLayout) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = dir.path().join("project").join("docker");
        fs::create_dir_all(&ctx).unwrap();
        (dir, ProjectLayout::new(ctx))
    }

    #[test]
    fn parse_skips_comments_blank_and_separatorless_lines() {
        let vars = parse_variables(
            "# comment\n\nNO_SEPARATOR\nA=1\n  B = two  \nURL=http://h/?q=1\n",
        );
        assert_eq!(vars.len(), 3);
        assert_eq!(vars.get("A"), Some("1"));
        assert_eq!(vars.get("B "), Some(" two"));
        assert_eq!(vars.get("URL"), Some("http://h/?q=1"));
        assert!(!vars.contains_key("NO_SEPARATOR"));
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut vars: VariableSet = [("A", "1"), ("B", "2")].into_iter().collect();
        vars.insert("A", "3");
        let keys: Vec<_> = vars.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["A", "B"]);
        assert_eq!(vars.get("A"), Some("3"));
    }

    #[test]
    fn missing_files_leave_defaults() {
        let (_dir, layout) = context();
        let vars = EnvironmentLayering::new(&layout).build(
            &Profile::new("ros"),
            &[PathBuf::from("/nonexistent/extra.env")],
        );
        assert_eq!(vars, VariableSet::defaults());
    }

    #[test]
    fn later_sources_override_earlier() {
        let (dir, layout) = context();
        fs::write(layout.base_env_file(), "HEADLESS=0\nBASE_ONLY=b\nSHARED=base\n").unwrap();
        fs::write(
            layout.profile_env_file(&Profile::new("ros")),
            "SHARED=ros\nROS_DISTRO=humble\n",
        )
        .unwrap();
        let extra = dir.path().join("mine.env");
        fs::write(&extra, "SHARED=mine\n").unwrap();

        let vars = EnvironmentLayering::new(&layout).build(&Profile::new("ros"), &[extra]);
        for (key, _) in DEFAULT_VARIABLES {
            assert!(vars.contains_key(key), "default {key} missing");
        }
        assert_eq!(vars.get("HEADLESS"), Some("0"));
        assert_eq!(vars.get("BASE_ONLY"), Some("b"));
        assert_eq!(vars.get("ROS_DISTRO"), Some("humble"));
        assert_eq!(vars.get("SHARED"), Some("mine"));
    }

    #[test]
    fn default_profile_ignores_profile_file() {
        let (_dir, layout) = context();
        fs::write(layout.context_dir().join(".env.base"), "X=base\n").unwrap();
        let layering = EnvironmentLayering::new(&layout);
        assert_eq!(layering.sources(&Profile::default(), &[]).len(), 1);
        assert_eq!(
            layering.build(&Profile::new("isaaclab"), &[]).get("X"),
            Some("base")
        );
    }

    #[test]
    fn layering_is_deterministic() {
        let (_dir, layout) = context();
        fs::write(layout.base_env_file(), "Z=1\nA=2\n").unwrap();
        let layering = EnvironmentLayering::new(&layout);
        let first = layering.build(&Profile::default(), &[]);
        let second = layering.build(&Profile::default(), &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn prefixed_mirror() {
        let vars: VariableSet = [("HEADLESS", "1")].into_iter().collect();
        assert_eq!(
            vars.to_prefixed_env(IMAGE_ENV_PREFIX),
            vec![("APPTAINERENV_HEADLESS".to_owned(), "1".to_owned())]
        );
        assert_eq!(
            vars.to_process_env(),
            vec![("HEADLESS".to_owned(), "1".to_owned())]
        );
    }
}
