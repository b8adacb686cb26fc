use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::local;
use crate::output;
use crate::ssh::{quote, RemoteShell, PROBE_TIMEOUT};

/// How the working copy reaches the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Mirrors the tree, deleting remote files that are gone locally.
    Rsync,
    /// Recursive copy. Stale remote files are left in place.
    Scp,
}

impl Method {
    pub fn detect() -> Result<Self> {
        if which::which("rsync").is_ok() {
            return Ok(Method::Rsync);
        }
        local::require_tools(&["scp"])?;
        Ok(Method::Scp)
    }

    pub fn program(&self) -> &'static str {
        match self {
            Method::Rsync => "rsync",
            Method::Scp => "scp",
        }
    }

    pub fn args(&self, config: &DeployConfig) -> Result<Vec<String>> {
        let workdir = config.workdir.display();
        let dest = format!("{}:{}/", config.target(), config.remote_dir);

        match self {
            Method::Rsync => {
                let mut shell = vec!["ssh".to_string()];
                shell.extend(ssh_options(config).iter().map(|o| quote(o)));
                Ok(vec![
                    "-az".to_string(),
                    "--delete".to_string(),
                    "--exclude".to_string(),
                    ".git".to_string(),
                    "-e".to_string(),
                    shell.join(" "),
                    format!("{}/", workdir),
                    dest,
                ])
            }
            Method::Scp => {
                let mut args = vec!["-r".to_string()];
                args.extend(ssh_options(config));
                args.extend(scp_sources(&config.workdir)?);
                args.push(dest);
                Ok(args)
            }
        }
    }
}

/// Top-level entries of the working copy, `.git` left out.
/// scp has no exclude option, so each entry is named on its own.
fn scp_sources(workdir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(workdir)
        .with_context(|| format!("Failed to read {}", workdir.display()))?;
    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        sources.push(entry.path().display().to_string());
    }
    if sources.is_empty() {
        return Err(DeployError::TransferFailed(format!(
            "nothing to copy in {}",
            workdir.display()
        ))
        .into());
    }
    sources.sort();
    Ok(sources)
}

/// Options shared by every ssh invocation outside the multiplexed session.
/// Host keys are not verified, matching the session itself.
pub fn ssh_options(config: &DeployConfig) -> Vec<String> {
    vec![
        "-i".to_string(),
        config.ssh_key.display().to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", PROBE_TIMEOUT.as_secs()),
    ]
}

pub async fn prepare_remote_dir<S: RemoteShell>(shell: &S, config: &DeployConfig) -> Result<()> {
    let dir = quote(&config.remote_dir);
    shell
        .sudo_exec(&format!(
            "mkdir -p {} && chown -R {} {}",
            dir,
            quote(&format!("{}:", config.ssh_user)),
            dir
        ))
        .await
        .map_err(|e| DeployError::TransferFailed(format!("cannot prepare {}: {:#}", config.remote_dir, e)))?;
    Ok(())
}

pub async fn run<S: RemoteShell>(shell: &S, config: &DeployConfig, method: Method) -> Result<()> {
    prepare_remote_dir(shell, config).await?;

    if method == Method::Scp {
        output::warning("rsync not found, falling back to scp: stale remote files will not be removed");
    }

    let spinner = output::create_spinner(&format!(
        "Copying {} to {}:{} via {}",
        config.workdir.display(),
        config.ssh_host,
        config.remote_dir,
        method.program()
    ));

    let args = method.args(config)?;
    debug!("{} {:?}", method.program(), args);
    let result = Command::new(method.program()).args(&args).output().await;
    spinner.finish_and_clear();
    let output = result.map_err(|e| {
        DeployError::TransferFailed(format!("cannot run {}: {}", method.program(), e))
    })?;

    if !output.status.success() {
        return Err(DeployError::TransferFailed(format!(
            "{} exited with {}: {}",
            method.program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }

    output::success(&format!("Project synced to {}", config.remote_dir));
    Ok(())
}
