use crate::process::{CapturedOutput, ExternalCommand, ProcessRunner};
use crate::RuntimeError;
use std::sync::Mutex;

/// Process runner that records every command instead of spawning it.
///
/// Responses are matched by the first rule whose needle occurs in the
/// rendered command line; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct MockRunner {
    calls: Mutex<Vec<ExternalCommand>>,
    rules: Mutex<Vec<(String, CapturedOutput)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `output` to every command containing `needle`.
    #[must_use]
    pub fn respond(mut self, needle: &str, output: CapturedOutput) -> Self {
        if let Ok(rules) = self.rules.get_mut() {
            rules.push((needle.to_owned(), output));
        }
        self
    }

    pub fn calls(&self) -> Vec<ExternalCommand> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Rendered command lines, in call order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.command_lines().iter().any(|c| c.contains(needle))
    }

    fn record(&self, command: &ExternalCommand) -> Result<CapturedOutput, RuntimeError> {
        let line = command.to_string();
        self.calls
            .lock()
            .map_err(|e| RuntimeError::Configuration(format!("mutex poisoned: {e}")))?
            .push(command.clone());
        let rules = self
            .rules
            .lock()
            .map_err(|e| RuntimeError::Configuration(format!("mutex poisoned: {e}")))?;
        Ok(rules
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map_or_else(|| CapturedOutput::success(""), |(_, out)| out.clone()))
    }
}

impl ProcessRunner for MockRunner {
    fn capture(&self, command: &ExternalCommand) -> Result<CapturedOutput, RuntimeError> {
        self.record(command)
    }

    fn stream(&self, command: &ExternalCommand) -> Result<Option<i32>, RuntimeError> {
        self.record(command).map(|out| out.code)
    }
}
