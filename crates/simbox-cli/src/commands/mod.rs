pub mod lifecycle;

use dialoguer::Confirm;
use simbox_core::CoreError;
use simbox_runtime::{Confirmation, Confirmer, FixedAnswer, RuntimeError};
use std::io::{stdin, IsTerminal};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 3;
pub const EXIT_RUNTIME_NOT_FOUND: u8 = 4;

/// A fatal error with the process exit code it maps to.
#[derive(Debug)]
pub struct Failure {
    pub code: u8,
    pub message: String,
}

impl From<CoreError> for Failure {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::Runtime(RuntimeError::RuntimeNotFound(_)) => EXIT_RUNTIME_NOT_FOUND,
            CoreError::Runtime(RuntimeError::Configuration(_)) => EXIT_CONFIG_ERROR,
            _ => EXIT_FAILURE,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, Failure> {
    serde_json::to_string_pretty(value).map_err(|e| Failure {
        code: EXIT_FAILURE,
        message: format!("JSON serialization failed: {e}"),
    })
}

pub fn print_warning(msg: &str) {
    use console::Style;
    eprintln!("{} {msg}", Style::new().yellow().bold().apply_to("warning:"));
}

/// Asks on the terminal. Escape or `q` cancels the remaining prompts.
struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> Confirmation {
        match Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact_opt()
        {
            Ok(Some(true)) => Confirmation::Yes,
            Ok(Some(false)) => Confirmation::No,
            Ok(None) => Confirmation::Cancel,
            Err(e) => {
                print_warning(&format!("prompt failed ({e}), keeping directory"));
                Confirmation::No
            }
        }
    }
}

/// Without a terminal and without an explicit answer, destructive prompts
/// default to "no".
pub fn confirmer(assume_yes: bool, assume_no: bool) -> Box<dyn Confirmer> {
    if assume_yes {
        Box::new(FixedAnswer(Confirmation::Yes))
    } else if assume_no || !stdin().is_terminal() {
        Box::new(FixedAnswer(Confirmation::No))
    } else {
        Box::new(TerminalConfirmer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let not_found: Failure =
            CoreError::Runtime(RuntimeError::RuntimeNotFound("none".to_owned())).into();
        assert_eq!(not_found.code, EXIT_RUNTIME_NOT_FOUND);

        let config: Failure =
            CoreError::Runtime(RuntimeError::Configuration("no script".to_owned())).into();
        assert_eq!(config.code, EXIT_CONFIG_ERROR);

        let external: Failure = CoreError::Runtime(RuntimeError::ExternalProcess {
            command: "docker compose up".to_owned(),
            code: Some(1),
            stdout: String::new(),
            stderr: "boom".to_owned(),
        })
        .into();
        assert_eq!(external.code, EXIT_FAILURE);
        assert!(external.message.contains("boom"));
    }

    #[test]
    fn assume_flags_pick_fixed_answers() {
        assert_eq!(confirmer(true, false).confirm("?"), Confirmation::Yes);
        assert_eq!(confirmer(false, true).confirm("?"), Confirmation::No);
    }
}
