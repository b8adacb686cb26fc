//! Idempotent installation of Docker, Compose and Nginx on the target host.
//!
//! Every component follows the same shape: probe, and if present report the
//! version and stop; otherwise install and enable the service.

use anyhow::{Context, Result};

use crate::error::{Component, DeployError};
use crate::os::PackageFamily;
use crate::outcome::Outcome;
use crate::output;
use crate::ssh::{quote, RemoteShell};

const DOCKER_INSTALL_CMD: &str = "curl -fsSL https://get.docker.com | sh";
const COMPOSE_PLUGIN_PATH: &str = "/usr/local/lib/docker/cli-plugins/docker-compose";
const COMPOSE_BIN_LINK: &str = "/usr/local/bin/docker-compose";
const COMPOSE_RELEASE_URL: &str = "https://github.com/docker/compose/releases/latest/download";

/// How compose is invoked on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    Plugin,
    Standalone,
}

impl ComposeFlavor {
    pub fn command(&self) -> &'static str {
        match self {
            ComposeFlavor::Plugin => "docker compose",
            ComposeFlavor::Standalone => "docker-compose",
        }
    }
}

/// What the bootstrap found or installed.
#[derive(Debug, Clone)]
pub struct RemoteEnv {
    pub docker_version: String,
    pub compose: ComposeFlavor,
    pub nginx_version: String,
    pub docker_group: Outcome,
}

pub async fn run<S: RemoteShell>(shell: &S, user: &str) -> Result<RemoteEnv> {
    let (docker_version, docker_group) = ensure_docker(shell, user)
        .await
        .map_err(|e| failed(Component::Docker, e))?;

    let compose = ensure_compose(shell)
        .await
        .map_err(|e| failed(Component::Compose, e))?;

    let nginx_version = ensure_nginx(shell)
        .await
        .map_err(|e| failed(Component::Nginx, e))?;

    Ok(RemoteEnv {
        docker_version,
        compose,
        nginx_version,
        docker_group,
    })
}

/// Wrap a sub-check error, letting already classified errors through.
fn failed(component: Component, err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<DeployError>().is_some() {
        return err;
    }
    DeployError::BootstrapFailed {
        component,
        reason: format!("{:#}", err),
    }
    .into()
}

async fn ensure_docker<S: RemoteShell>(shell: &S, user: &str) -> Result<(String, Outcome)> {
    output::info("Checking Docker...");

    if shell.exec_ok("command -v docker").await? {
        let version = shell.exec("docker --version").await?.trim().to_string();
        output::success(&format!("Docker already installed ({})", version));
        return Ok((version, Outcome::SkippedAbsent));
    }

    let spinner = output::create_spinner("Installing Docker...");
    let installed = async {
        shell
            .sudo_exec(DOCKER_INSTALL_CMD)
            .await
            .context("Failed to run Docker install script")?;
        shell
            .sudo_exec("systemctl enable --now docker")
            .await
            .context("Failed to enable docker service")
    }
    .await;
    spinner.finish_and_clear();
    installed?;

    let version = shell.exec("docker --version").await?.trim().to_string();
    output::success(&format!("Docker installed ({})", version));

    // Later docker calls use sudo, so group membership is a convenience.
    let group = shell
        .best_effort(&format!("usermod -aG docker {}", quote(user)))
        .await;
    group.report(&format!("Add {} to docker group", user));

    Ok((version, group))
}

async fn probe_compose<S: RemoteShell>(shell: &S) -> Result<Option<(ComposeFlavor, String)>> {
    for flavor in [ComposeFlavor::Plugin, ComposeFlavor::Standalone] {
        let out = shell
            .run(&format!("{} version", flavor.command()))
            .await?;
        if out.success() {
            return Ok(Some((flavor, out.stdout.trim().to_string())));
        }
    }
    Ok(None)
}

async fn ensure_compose<S: RemoteShell>(shell: &S) -> Result<ComposeFlavor> {
    output::info("Checking Docker Compose...");

    if let Some((flavor, version)) = probe_compose(shell).await? {
        output::success(&format!("Docker Compose already installed ({})", version));
        return Ok(flavor);
    }

    let kernel = shell.exec("uname -s").await?;
    let machine = shell.exec("uname -m").await?;
    let url = compose_download_url(&kernel, &machine)?;

    let spinner = output::create_spinner("Installing Docker Compose...");
    let installed = shell
        .sudo_exec(&format!(
            "mkdir -p $(dirname {plugin}) && curl -fsSL {url} -o {plugin} && chmod +x {plugin} && ln -sf {plugin} {link}",
            plugin = COMPOSE_PLUGIN_PATH,
            url = url,
            link = COMPOSE_BIN_LINK,
        ))
        .await
        .context("Failed to download compose binary");
    spinner.finish_and_clear();
    installed?;

    let (flavor, version) = probe_compose(shell)
        .await?
        .context("compose still not runnable after install")?;
    output::success(&format!("Docker Compose installed ({})", version));
    Ok(flavor)
}

/// Release asset matching `uname -s` / `uname -m` of the host.
pub fn compose_download_url(kernel: &str, machine: &str) -> Result<String> {
    let arch = match machine.trim() {
        "x86_64" | "amd64" => "x86_64",
        "aarch64" | "arm64" => "aarch64",
        "armv7l" | "armv7" => "armv7",
        "armv6l" | "armv6" => "armv6",
        "ppc64le" => "ppc64le",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        other => anyhow::bail!("no compose release for architecture '{}'", other),
    };
    Ok(format!(
        "{}/docker-compose-{}-{}",
        COMPOSE_RELEASE_URL,
        kernel.trim().to_lowercase(),
        arch
    ))
}

async fn ensure_nginx<S: RemoteShell>(shell: &S) -> Result<String> {
    output::info("Checking Nginx...");

    if shell.exec_ok("command -v nginx").await? {
        let version = nginx_version(shell).await?;
        output::success(&format!("Nginx already installed ({})", version));
        return Ok(version);
    }

    let family = PackageFamily::detect(shell).await?;
    output::info(&format!("Detected package family: {:?}", family));

    let spinner = output::create_spinner("Installing Nginx...");
    let installed = async {
        shell
            .sudo_exec(family.install_nginx_cmd())
            .await
            .context("Failed to install nginx package")?;
        shell
            .sudo_exec("systemctl enable --now nginx")
            .await
            .context("Failed to enable nginx service")
    }
    .await;
    spinner.finish_and_clear();
    installed?;

    let version = nginx_version(shell).await?;
    output::success(&format!("Nginx installed ({})", version));
    Ok(version)
}

/// `nginx -v` reports on stderr.
async fn nginx_version<S: RemoteShell>(shell: &S) -> Result<String> {
    Ok(shell.exec("nginx -v 2>&1").await?.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::fake::FakeShell;

    #[test]
    fn compose_url_matches_architecture() {
        assert_eq!(
            compose_download_url("Linux\n", "x86_64\n").unwrap(),
            "https://github.com/docker/compose/releases/latest/download/docker-compose-linux-x86_64"
        );
        assert!(compose_download_url("Linux", "arm64")
            .unwrap()
            .ends_with("docker-compose-linux-aarch64"));
        assert!(compose_download_url("Linux", "mips").is_err());
    }

    #[tokio::test]
    async fn present_components_are_not_reinstalled() {
        let shell = FakeShell::new()
            .respond("docker --version", "Docker version 27.0.3")
            .respond("docker compose version", "Docker Compose version v2.29.1")
            .respond("nginx -v", "nginx version: nginx/1.24.0");

        let env = run(&shell, "deploy").await.unwrap();

        assert_eq!(env.docker_version, "Docker version 27.0.3");
        assert_eq!(env.compose, ComposeFlavor::Plugin);
        assert_eq!(env.nginx_version, "nginx version: nginx/1.24.0");
        assert_eq!(env.docker_group, Outcome::SkippedAbsent);
        assert!(!shell.ran("get.docker.com"));
        assert!(!shell.ran("apt-get"));
        assert!(!shell.ran("usermod"));
    }

    #[tokio::test]
    async fn missing_docker_is_installed_and_group_failure_ignored() {
        let shell = FakeShell::new()
            .fail("command -v docker", 1, "")
            .fail("usermod", 6, "usermod: group 'docker' does not exist")
            .respond("docker --version", "Docker version 27.0.3");

        let env = run(&shell, "deploy").await.unwrap();

        assert!(shell.ran("get.docker.com"));
        assert!(shell.ran("systemctl enable --now docker"));
        assert!(shell.ran("usermod -aG docker '\\''deploy'\\''"));
        assert!(env.docker_group.is_failed());
    }

    #[tokio::test]
    async fn standalone_compose_is_accepted() {
        let shell = FakeShell::new()
            .fail("docker compose version", 1, "unknown command")
            .respond("docker-compose version", "docker-compose version 1.29.2");

        let env = run(&shell, "deploy").await.unwrap();

        assert_eq!(env.compose, ComposeFlavor::Standalone);
        assert!(!shell.ran("cli-plugins"));
    }

    #[tokio::test]
    async fn nginx_on_unsupported_os_fails_with_os_error() {
        let shell = FakeShell::new()
            .fail("command -v nginx", 1, "")
            .respond("cat /etc/os-release", "ID=alpine\n");

        let err = run(&shell, "deploy").await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::UnsupportedRemoteOs(_))
        ));
    }

    #[tokio::test]
    async fn failed_nginx_install_names_component() {
        let shell = FakeShell::new()
            .fail("command -v nginx", 1, "")
            .respond("cat /etc/os-release", "ID=debian\n")
            .fail("apt-get", 100, "E: Unable to locate package nginx");

        let err = run(&shell, "deploy").await.unwrap_err();

        match err.downcast_ref::<DeployError>() {
            Some(DeployError::BootstrapFailed { component, reason }) => {
                assert_eq!(*component, Component::Nginx);
                assert!(reason.contains("Unable to locate package"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
