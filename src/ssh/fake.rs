use anyhow::Result;
use std::cell::RefCell;

use super::{RemoteOutput, RemoteShell};

/// Scripted stand-in for a remote host. Commands succeed with empty output
/// unless a rule whose needle occurs in the command says otherwise; the
/// first matching rule wins.
pub struct FakeShell {
    rules: Vec<(String, RemoteOutput)>,
    log: RefCell<Vec<String>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            log: RefCell::new(Vec::new()),
        }
    }

    pub fn respond(mut self, needle: &str, stdout: &str) -> Self {
        self.rules.push((
            needle.to_string(),
            RemoteOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn fail(mut self, needle: &str, code: i32, stderr: &str) -> Self {
        self.rules.push((
            needle.to_string(),
            RemoteOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.log.borrow().iter().any(|c| c.contains(needle))
    }

    /// Position of the first command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.log.borrow().iter().position(|c| c.contains(needle))
    }
}

impl RemoteShell for FakeShell {
    fn host(&self) -> &str {
        "fake-host"
    }

    async fn run(&self, cmd: &str) -> Result<RemoteOutput> {
        self.log.borrow_mut().push(cmd.to_string());
        let output = self
            .rules
            .iter()
            .find(|(needle, _)| cmd.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or(RemoteOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            });
        Ok(output)
    }
}
