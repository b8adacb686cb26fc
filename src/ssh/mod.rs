pub mod exec;
#[cfg(test)]
pub mod fake;

pub use exec::{quote, RemoteOutput, RemoteShell};

use anyhow::{Context, Result};
use openssh::{KnownHosts, Session, SessionBuilder};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::DeployError;

/// Bound on the connectivity probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One multiplexed SSH master connection, reused for every remote command.
///
/// Host keys are accepted without verification (`KnownHosts::Accept`).
/// This is a trust trade-off for unattended runs against fresh VMs.
pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    /// Open the master connection, authenticating non-interactively with
    /// `key`. Any failure is `RemoteUnreachable`.
    pub async fn connect(user: &str, host: &str, key: &Path) -> Result<Self> {
        debug!("Connecting to {}@{} with key {}", user, host, key.display());

        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Accept);
        builder.user(user.to_string());
        builder.keyfile(key);
        builder.connect_timeout(PROBE_TIMEOUT);

        let unreachable = |reason: String| DeployError::RemoteUnreachable {
            target: format!("{}@{}", user, host),
            reason,
        };

        let session = match tokio::time::timeout(PROBE_TIMEOUT, builder.connect(host)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(unreachable(e.to_string()).into()),
            Err(_) => {
                return Err(unreachable(format!(
                    "no answer within {}s",
                    PROBE_TIMEOUT.as_secs()
                ))
                .into())
            }
        };

        Ok(Self {
            session,
            host: host.to_string(),
        })
    }

    pub async fn close(self) -> Result<()> {
        self.session
            .close()
            .await
            .with_context(|| format!("Failed to close SSH session to {}", self.host))?;
        Ok(())
    }
}

impl RemoteShell for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, cmd: &str) -> Result<RemoteOutput> {
        let output = self
            .session
            .command("bash")
            .arg("-c")
            .arg(cmd)
            .output()
            .await
            .with_context(|| format!("Failed to execute command on {}: {}", self.host, cmd))?;

        Ok(RemoteOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a no-op within [`PROBE_TIMEOUT`]; must pass before any mutation.
pub async fn probe<S: RemoteShell>(shell: &S) -> Result<()> {
    let unreachable = |reason: String| DeployError::RemoteUnreachable {
        target: shell.host().to_string(),
        reason,
    };

    match tokio::time::timeout(PROBE_TIMEOUT, shell.run("true")).await {
        Ok(Ok(out)) if out.success() => Ok(()),
        Ok(Ok(out)) => Err(unreachable(out.diagnostic()).into()),
        Ok(Err(e)) => Err(unreachable(format!("{:#}", e)).into()),
        Err(_) => Err(unreachable(format!(
            "probe timed out after {}s",
            PROBE_TIMEOUT.as_secs()
        ))
        .into()),
    }
}
