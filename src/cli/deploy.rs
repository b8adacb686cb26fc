use anyhow::Result;
use tracing::{debug, info};

use crate::bootstrap;
use crate::config::DeployConfig;
use crate::deploy::{self, Launch};
use crate::local::{self, dockerfile};
use crate::output;
use crate::proxy;
use crate::ssh::{self, RemoteShell, SshSession};
use crate::transfer;
use crate::verify;

const TOTAL_STEPS: usize = 7;

pub async fn run(config: &DeployConfig) -> Result<()> {
    output::header(&format!(
        "Deploying {} to {}",
        config.project_id,
        config.target()
    ));

    output::step(1, TOTAL_STEPS, "Preparing local working copy");
    local::require_tools(&local::REQUIRED_TOOLS)?;
    let method = transfer::Method::detect()?;
    local::sync_repo(config).await?;
    let source = dockerfile::ensure_dockerfile(&config.workdir, config.app_port)?;
    info!(dockerfile = ?source, "Local preparation done");

    let session = SshSession::connect(&config.ssh_user, &config.ssh_host, &config.ssh_key).await?;
    let result = deploy_remote(&session, config, method).await;
    if let Err(e) = session.close().await {
        debug!("{:#}", e);
    }
    let launch = result?;

    println!();
    match launch {
        Launch::Compose { file } => output::success(&format!(
            "Deploy complete! {} is running from {} behind http://{}/",
            config.project_id, file, config.ssh_host
        )),
        Launch::Container { name, image } => output::success(&format!(
            "Deploy complete! {} is running as {} ({}) behind http://{}/",
            config.project_id, name, image, config.ssh_host
        )),
    }
    Ok(())
}

/// Everything after the connection is open. Nothing is changed on the host
/// unless the connectivity probe passes first.
pub async fn deploy_remote<S: RemoteShell>(
    shell: &S,
    config: &DeployConfig,
    method: transfer::Method,
) -> Result<Launch> {
    output::step(2, TOTAL_STEPS, "Checking SSH connectivity");
    ssh::probe(shell).await?;
    output::success(&format!("{} is reachable", config.target()));

    output::step(3, TOTAL_STEPS, "Bootstrapping remote environment");
    let env = bootstrap::run(shell, &config.ssh_user).await?;
    info!(
        docker = %env.docker_version,
        nginx = %env.nginx_version,
        compose = env.compose.command(),
        docker_group = %env.docker_group,
        "Remote environment ready"
    );

    output::step(4, TOTAL_STEPS, "Transferring project");
    transfer::run(shell, config, method).await?;

    output::step(5, TOTAL_STEPS, "Deploying application");
    let launch = deploy::run(
        shell,
        config,
        env.compose,
        chrono::Utc::now().timestamp(),
    )
    .await?;

    output::step(6, TOTAL_STEPS, "Configuring Nginx");
    proxy::configure(shell, config).await?;

    output::step(7, TOTAL_STEPS, "Validating deployment");
    verify::run(shell, &config.ssh_host, verify::SETTLE_DELAY).await?;

    Ok(launch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use crate::ssh::fake::FakeShell;
    use crate::testutil::sample_config;

    #[tokio::test]
    async fn failed_probe_leaves_host_untouched() {
        let config = sample_config();
        let shell = FakeShell::new().fail("true", 255, "Connection timed out");

        let err = deploy_remote(&shell, &config, transfer::Method::Rsync)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::RemoteUnreachable { .. })
        ));
        assert_eq!(shell.commands(), vec!["true".to_string()]);
    }

    #[tokio::test]
    async fn bootstrap_failure_stops_before_transfer() {
        let config = sample_config();
        let shell = FakeShell::new()
            .fail("command -v docker", 1, "")
            .fail("get.docker.com", 1, "curl: (6) Could not resolve host");

        let err = deploy_remote(&shell, &config, transfer::Method::Rsync)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::BootstrapFailed { .. })
        ));
        assert!(!shell.ran("mkdir -p"));
        assert!(!shell.ran("nginx -t"));
    }
}
