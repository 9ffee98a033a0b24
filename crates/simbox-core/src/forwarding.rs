//! Display forwarding into sandboxed sessions.
//!
//! The operator's choice is persisted in the state file under the `X11`
//! namespace. Forwarding is only applied when the flag is enabled, `DISPLAY`
//! is set and the host socket directory exists; otherwise no forwarding
//! arguments are produced at all.

use crate::state::{StateError, StateFile};
use simbox_runtime::{Capabilities, ForwardingOverlay};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const FORWARDING_NAMESPACE: &str = "X11";
pub const FLAG_KEY: &str = "X11_FORWARDING_ENABLED";
/// Display recorded for the running session; dropped when the session ends.
pub const SESSION_DISPLAY_KEY: &str = "X11_FORWARDED_DISPLAY";
pub const DISPLAY_VAR: &str = "DISPLAY";
pub const SOCKET_DIR: &str = "/tmp/.X11-unix";

const ENABLED: &str = "1";
const DISABLED: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingFlag {
    Enabled,
    Disabled,
    Unset,
}

impl ForwardingFlag {
    /// Anything other than the enabled marker counts as disabled.
    fn from_value(value: Option<&str>) -> Self {
        match value {
            None => Self::Unset,
            Some(ENABLED) => Self::Enabled,
            Some(_) => Self::Disabled,
        }
    }
}

/// Host-side display facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayHost {
    pub display: Option<String>,
    pub socket_dir: PathBuf,
}

impl DisplayHost {
    pub fn detect() -> Self {
        Self {
            display: std::env::var(DISPLAY_VAR).ok().filter(|d| !d.is_empty()),
            socket_dir: PathBuf::from(SOCKET_DIR),
        }
    }

    /// A display the container could talk to, if any.
    pub fn usable_display(&self) -> Option<&str> {
        match &self.display {
            Some(display) if self.socket_dir.is_dir() => Some(display),
            _ => None,
        }
    }
}

/// Reads and maintains the forwarding flag for one invocation.
pub struct ForwardingController<'s> {
    state: &'s mut StateFile,
    host: DisplayHost,
    compose_fragment: PathBuf,
}

impl<'s> ForwardingController<'s> {
    pub fn new(state: &'s mut StateFile, host: DisplayHost, compose_fragment: PathBuf) -> Self {
        Self {
            state,
            host,
            compose_fragment,
        }
    }

    pub fn flag(&mut self) -> Result<ForwardingFlag, StateError> {
        let state = self.state.scoped(FORWARDING_NAMESPACE);
        Ok(ForwardingFlag::from_value(state.get(FLAG_KEY)?.as_deref()))
    }

    pub fn set_flag(&mut self, enabled: bool) -> Result<(), StateError> {
        let state = self.state.scoped(FORWARDING_NAMESPACE);
        state.set(FLAG_KEY, if enabled { ENABLED } else { DISABLED })
    }

    /// Before a session starts: settle an unset flag from host detection,
    /// persist the decision and build the overlay.
    pub fn check(&mut self, caps: Capabilities) -> Result<ForwardingOverlay, StateError> {
        let mut flag = self.flag()?;
        if flag == ForwardingFlag::Unset {
            let available = self.host.usable_display().is_some();
            info!(
                "display forwarding not configured, defaulting to {}",
                if available { "enabled" } else { "disabled" }
            );
            self.set_flag(available)?;
            flag = if available {
                ForwardingFlag::Enabled
            } else {
                ForwardingFlag::Disabled
            };
        }

        let overlay = self.overlay(flag, caps);
        if let Some(display) = self.active_display(flag) {
            let display = display.to_owned();
            let state = self.state.scoped(FORWARDING_NAMESPACE);
            state.set(SESSION_DISPLAY_KEY, &display)?;
        }
        Ok(overlay)
    }

    /// Before entering an existing session: re-validate without prompting or
    /// persisting anything.
    pub fn refresh(&mut self, caps: Capabilities) -> Result<ForwardingOverlay, StateError> {
        let flag = self.flag()?;
        Ok(self.overlay(flag, caps))
    }

    /// After a session ends: drop per-session data, keep the preference.
    pub fn cleanup(&mut self) -> Result<(), StateError> {
        let state = self.state.scoped(FORWARDING_NAMESPACE);
        if state.delete(SESSION_DISPLAY_KEY)? {
            debug!("cleared forwarded display from state");
        }
        Ok(())
    }

    fn active_display(&self, flag: ForwardingFlag) -> Option<&str> {
        if flag == ForwardingFlag::Enabled {
            self.host.usable_display()
        } else {
            None
        }
    }

    fn overlay(&self, flag: ForwardingFlag, caps: Capabilities) -> ForwardingOverlay {
        let Some(display) = self.active_display(flag) else {
            if flag == ForwardingFlag::Enabled {
                debug!("forwarding enabled but no usable display on this host");
            }
            return ForwardingOverlay::default();
        };

        let mut overlay = ForwardingOverlay {
            env: vec![(DISPLAY_VAR.to_owned(), display.to_owned())],
            ..ForwardingOverlay::default()
        };
        if caps.supports_compose_fragments {
            if self.compose_fragment.is_file() {
                overlay.compose_files.push(self.compose_fragment.clone());
            } else {
                warn!(
                    "forwarding compose fragment {} not found, forwarding DISPLAY only",
                    self.compose_fragment.display()
                );
            }
        } else {
            let socket = self.host.socket_dir.display();
            overlay.run_args = vec![
                "--env".to_owned(),
                format!("{DISPLAY_VAR}={display}"),
                "--bind".to_owned(),
                format!("{socket}:{socket}:rw"),
            ];
        }
        overlay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn caps(fragments: bool) -> Capabilities {
        Capabilities {
            supports_stop: fragments,
            supports_hard_stop: fragments,
            supports_deep_cleanup: true,
            supports_copy: fragments,
            supports_config: fragments,
            supports_compose_fragments: fragments,
            requires_env_propagation: !fragments,
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        state: StateFile,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let state = StateFile::new(dir.path().join("vol/config/.container.cfg"));
            fs::write(dir.path().join("x11.yaml"), "services: {}\n").unwrap();
            Self { dir, state }
        }

        fn host(&self, display: Option<&str>, socket: bool) -> DisplayHost {
            let socket_dir = self.dir.path().join(".X11-unix");
            if socket {
                fs::create_dir_all(&socket_dir).unwrap();
            }
            DisplayHost {
                display: display.map(str::to_owned),
                socket_dir,
            }
        }

        fn controller(&mut self, host: DisplayHost) -> ForwardingController<'_> {
            let fragment = self.dir.path().join("x11.yaml");
            ForwardingController::new(&mut self.state, host, fragment)
        }
    }

    #[test]
    fn unset_flag_defaults_from_host_and_persists() {
        let mut fx = Fixture::new();
        let host = fx.host(Some(":0"), true);
        let overlay = fx.controller(host).check(caps(true)).unwrap();
        assert_eq!(overlay.env, vec![("DISPLAY".to_owned(), ":0".to_owned())]);
        assert_eq!(overlay.compose_files.len(), 1);

        let mut state = fx.state.clone();
        state.set_namespace(FORWARDING_NAMESPACE);
        assert_eq!(state.get(FLAG_KEY).unwrap().as_deref(), Some("1"));
        assert_eq!(state.get(SESSION_DISPLAY_KEY).unwrap().as_deref(), Some(":0"));
    }

    #[test]
    fn unset_flag_without_display_persists_disabled() {
        let mut fx = Fixture::new();
        let host = fx.host(None, true);
        let mut ctl = fx.controller(host);
        assert!(ctl.check(caps(true)).unwrap().is_empty());
        assert_eq!(ctl.flag().unwrap(), ForwardingFlag::Disabled);
    }

    #[test]
    fn every_condition_is_required() {
        for (display, socket, flag) in [
            (None, true, true),
            (Some(":0"), false, true),
            (Some(":0"), true, false),
        ] {
            let mut fx = Fixture::new();
            let host = fx.host(display, socket);
            let mut ctl = fx.controller(host);
            ctl.set_flag(flag).unwrap();
            assert!(ctl.check(caps(false)).unwrap().is_empty());
            assert!(ctl.refresh(caps(true)).unwrap().is_empty());
        }
    }

    #[test]
    fn image_overlay_uses_raw_arguments() {
        let mut fx = Fixture::new();
        let host = fx.host(Some(":1"), true);
        let socket = host.socket_dir.display().to_string();
        let mut ctl = fx.controller(host);
        ctl.set_flag(true).unwrap();
        let overlay = ctl.refresh(caps(false)).unwrap();
        assert!(overlay.compose_files.is_empty());
        assert_eq!(
            overlay.run_args,
            [
                "--env".to_owned(),
                "DISPLAY=:1".to_owned(),
                "--bind".to_owned(),
                format!("{socket}:{socket}:rw"),
            ]
        );
    }

    #[test]
    fn refresh_does_not_persist_unset_flag() {
        let mut fx = Fixture::new();
        let host = fx.host(Some(":0"), true);
        let mut ctl = fx.controller(host);
        assert!(ctl.refresh(caps(true)).unwrap().is_empty());
        assert_eq!(ctl.flag().unwrap(), ForwardingFlag::Unset);
        assert!(!fx.state.exists());
    }

    #[test]
    fn cleanup_drops_session_display_only() {
        let mut fx = Fixture::new();
        let host = fx.host(Some(":0"), true);
        let mut ctl = fx.controller(host);
        ctl.check(caps(true)).unwrap();
        ctl.cleanup().unwrap();
        assert_eq!(ctl.flag().unwrap(), ForwardingFlag::Enabled);

        let mut state = fx.state.clone();
        state.set_namespace(FORWARDING_NAMESPACE);
        assert_eq!(state.get(SESSION_DISPLAY_KEY).unwrap(), None);
    }

    #[test]
    fn cleanup_without_state_file_is_noop() {
        let mut fx = Fixture::new();
        let host = fx.host(None, false);
        fx.controller(host).cleanup().unwrap();
        assert!(!fx.state.exists());
    }

    #[test]
    fn namespace_is_restored_after_each_call() {
        let mut fx = Fixture::new();
        let host = fx.host(None, false);
        fx.controller(host).set_flag(false).unwrap();
        assert_eq!(fx.state.namespace(), crate::state::ROOT_NAMESPACE);
    }
}
