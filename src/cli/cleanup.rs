use anyhow::Result;
use tracing::debug;

use crate::config::DeployConfig;
use crate::deploy;
use crate::outcome::Outcome;
use crate::output;
use crate::proxy;
use crate::ssh::{self, quote, RemoteShell, SshSession};

/// What each teardown step did. Every field is best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub containers: Outcome,
    pub images: Outcome,
    pub site_files: Outcome,
    pub nginx_reload: Outcome,
    pub project_dir: Outcome,
}

pub async fn run(config: &DeployConfig) -> Result<()> {
    output::header(&format!(
        "Cleaning up {} on {}",
        config.project_id,
        config.target()
    ));

    let session = SshSession::connect(&config.ssh_user, &config.ssh_host, &config.ssh_key).await?;
    let result = cleanup_remote(&session, config).await;
    if let Err(e) = session.close().await {
        debug!("{:#}", e);
    }
    let report = result?;

    println!();
    let failed = [
        &report.containers,
        &report.images,
        &report.site_files,
        &report.nginx_reload,
        &report.project_dir,
    ]
    .iter()
    .filter(|o| o.is_failed())
    .count();
    if failed == 0 {
        output::success("Cleanup complete");
    } else {
        output::warning(&format!("Cleanup finished with {} ignored failure(s)", failed));
    }
    Ok(())
}

/// Remove everything a deploy created. Only an unreachable host is an error.
pub async fn cleanup_remote<S: RemoteShell>(shell: &S, config: &DeployConfig) -> Result<CleanupReport> {
    ssh::probe(shell).await?;

    let teardown = deploy::teardown_prior(shell, &config.project_id).await;
    teardown.containers.report("Remove containers");
    teardown.images.report("Remove images");

    let site_files = remove_site_files(shell, &config.project_id).await;
    site_files.report("Remove nginx site files");

    let nginx_reload = match shell.exec_ok("command -v nginx").await {
        Ok(true) => shell.best_effort("systemctl reload nginx").await,
        Ok(false) => Outcome::SkippedAbsent,
        Err(e) => Outcome::FailedIgnored(format!("{:#}", e)),
    };
    nginx_reload.report("Reload nginx");

    let project_dir = match shell.path_exists(&config.remote_dir).await {
        Ok(true) => {
            shell
                .best_effort(&format!("rm -rf {}", quote(&config.remote_dir)))
                .await
        }
        Ok(false) => Outcome::SkippedAbsent,
        Err(e) => Outcome::FailedIgnored(format!("{:#}", e)),
    };
    project_dir.report(&format!("Remove {}", config.remote_dir));

    Ok(CleanupReport {
        containers: teardown.containers,
        images: teardown.images,
        site_files,
        nginx_reload,
        project_dir,
    })
}

async fn remove_site_files<S: RemoteShell>(shell: &S, project_id: &str) -> Outcome {
    let mut present = Vec::new();
    for file in proxy::all_site_files(project_id) {
        // `-L` also catches a dangling sites-enabled link.
        match shell
            .exec_ok(&format!("test -e {f} || test -L {f}", f = quote(&file)))
            .await
        {
            Ok(true) => present.push(quote(&file)),
            Ok(false) => {}
            Err(e) => return Outcome::FailedIgnored(format!("{:#}", e)),
        }
    }

    if present.is_empty() {
        return Outcome::SkippedAbsent;
    }
    shell
        .best_effort(&format!("rm -f {}", present.join(" ")))
        .await
}
