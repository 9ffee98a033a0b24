//! Namespaced key/value state persisted across invocations.
//!
//! The file is TOML with one table per namespace:
//!
//! ```toml
//! [X11]
//! X11_FORWARDING_ENABLED = "1"
//! ```
//!
//! Hand edits are read leniently. Unquoted scalars (`X11_FORWARDING_ENABLED = 1`)
//! keep their text form, and a file that is not valid TOML is read as plain
//! `[SECTION]` headers followed by `key=value` or `key: value` lines.
//!
//! Every write rewrites the whole file. There is no locking; concurrent
//! writers race and the last one wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Namespace used until a caller selects another one.
pub const ROOT_NAMESPACE: &str = "DEFAULT";

type Sections = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Handle on the state file. The active namespace belongs to the handle,
/// not to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    path: PathBuf,
    namespace: String,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            namespace: ROOT_NAMESPACE.to_owned(),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    /// Switch namespace until the returned guard is dropped.
    pub fn scoped(&mut self, namespace: &str) -> ScopedNamespace<'_> {
        let previous = std::mem::replace(&mut self.namespace, namespace.to_owned());
        ScopedNamespace {
            state: self,
            previous,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let sections = self.load()?;
        Ok(sections
            .get(&self.namespace)
            .and_then(|section| section.get(key))
            .cloned())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        let mut sections = self.load()?;
        sections
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        self.store(&sections)
    }

    /// Remove `key` from the active namespace. Returns whether it was present.
    /// A missing file stays missing.
    pub fn delete(&self, key: &str) -> Result<bool, StateError> {
        if !self.exists() {
            return Ok(false);
        }
        let mut sections = self.load()?;
        let Some(section) = sections.get_mut(&self.namespace) else {
            return Ok(false);
        };
        if section.remove(key).is_none() {
            return Ok(false);
        }
        if section.is_empty() {
            sections.remove(&self.namespace);
        }
        self.store(&sections)?;
        Ok(true)
    }

    fn load(&self) -> Result<Sections, StateError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Sections::new()),
            Err(e) => return Err(e.into()),
        };
        match content.parse::<toml::Table>() {
            Ok(table) => Ok(sections_from_table(table)),
            Err(source) => parse_plain(&content).ok_or_else(|| StateError::Parse {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn store(&self, sections: &Sections) -> Result<(), StateError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let content = toml::to_string(sections)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StateError::Io(e.error))?;
        debug!("wrote state file {}", self.path.display());
        Ok(())
    }
}

fn scalar_text(value: toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn sections_from_table(table: toml::Table) -> Sections {
    let mut sections = Sections::new();
    for (name, value) in table {
        let (section, entries) = match value {
            toml::Value::Table(entries) => (name, entries),
            scalar => {
                let mut entries = toml::Table::new();
                entries.insert(name, scalar);
                (ROOT_NAMESPACE.to_owned(), entries)
            }
        };
        let section = sections.entry(section).or_default();
        for (key, value) in entries {
            match scalar_text(value) {
                Some(text) => {
                    section.insert(key, text);
                }
                None => debug!("ignoring nested state value {key}"),
            }
        }
    }
    sections
}

/// Sectioned `key=value` text. `None` when a line is neither a header, an
/// assignment nor a comment.
fn parse_plain(content: &str) -> Option<Sections> {
    let mut sections = Sections::new();
    let mut current = ROOT_NAMESPACE.to_owned();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[') {
            current = header.strip_suffix(']')?.trim().to_owned();
            sections.entry(current.clone()).or_default();
            continue;
        }
        let split = line.find(['=', ':'])?;
        let key = line[..split].trim();
        if key.is_empty() {
            return None;
        }
        let value = unquote(line[split + 1..].trim());
        sections
            .entry(current.clone())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
    }
    Some(sections)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Restores the previous namespace on drop.
pub struct ScopedNamespace<'s> {
    state: &'s mut StateFile,
    previous: String,
}

impl Deref for ScopedNamespace<'_> {
    type Target = StateFile;

    fn deref(&self) -> &StateFile {
        self.state
    }
}

impl DerefMut for ScopedNamespace<'_> {
    fn deref_mut(&mut self) -> &mut StateFile {
        self.state
    }
}

impl Drop for ScopedNamespace<'_> {
    fn drop(&mut self) {
        self.state.namespace = std::mem::take(&mut self.previous);
    }
}
