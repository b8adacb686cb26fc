use anyhow::{bail, Result};
use tracing::debug;

use crate::outcome::Outcome;

/// Exit status and captured streams of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Whichever stream has something to say, for error messages.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Anything that can run `bash -c <cmd>` on the target host.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    fn host(&self) -> &str;

    async fn run(&self, cmd: &str) -> Result<RemoteOutput>;

    /// Execute a command and return stdout
    async fn exec(&self, cmd: &str) -> Result<String> {
        debug!("[{}] exec: {}", self.host(), cmd);

        let output = self.run(cmd).await?;
        if !output.success() {
            bail!(
                "Command failed on {} (exit {}): {}\nstdout: {}\nstderr: {}",
                self.host(),
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                cmd,
                output.stdout.trim(),
                output.stderr.trim()
            );
        }

        Ok(output.stdout)
    }

    /// Execute a command, returning Ok(true) if exit 0, Ok(false) otherwise
    async fn exec_ok(&self, cmd: &str) -> Result<bool> {
        debug!("[{}] exec_ok: {}", self.host(), cmd);
        Ok(self.run(cmd).await?.success())
    }

    /// Execute a command with sudo
    async fn sudo_exec(&self, cmd: &str) -> Result<String> {
        self.exec(&sudo(cmd)).await
    }

    async fn path_exists(&self, path: &str) -> Result<bool> {
        self.exec_ok(&format!("test -e {}", quote(path))).await
    }

    /// Write content to a file on the remote
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.exec(&format!(
            "cat > {} << 'PORTSIDE_EOF'\n{}\nPORTSIDE_EOF",
            quote(path),
            content.trim_end_matches('\n')
        ))
        .await?;
        Ok(())
    }

    /// Run a sudo command whose failure must not stop the run.
    async fn best_effort(&self, cmd: &str) -> Outcome {
        match self.run(&sudo(cmd)).await {
            Ok(out) if out.success() => Outcome::Succeeded,
            Ok(out) => Outcome::FailedIgnored(out.diagnostic()),
            Err(e) => Outcome::FailedIgnored(format!("{:#}", e)),
        }
    }
}

pub fn sudo(cmd: &str) -> String {
    format!("sudo bash -c {}", quote(cmd))
}

/// Single-quote a value for bash.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("/home/deploy/app"), "'/home/deploy/app'");
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn sudo_wraps_whole_command() {
        assert_eq!(
            sudo("docker ps -q | wc -l"),
            "sudo bash -c 'docker ps -q | wc -l'"
        );
    }

    #[test]
    fn diagnostic_prefers_stderr() {
        let out = RemoteOutput {
            code: Some(1),
            stdout: "partial\n".into(),
            stderr: "  boom \n".into(),
        };
        assert_eq!(out.diagnostic(), "boom");
        let quiet = RemoteOutput {
            code: Some(1),
            stdout: "only stdout".into(),
            stderr: String::new(),
        };
        assert_eq!(quiet.diagnostic(), "only stdout");
    }
}
