pub mod containers;

use anyhow::Result;

use crate::bootstrap::ComposeFlavor;
use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::outcome::Outcome;
use crate::output;
use crate::ssh::{quote, RemoteShell};

/// Descriptor names compose picks up, in lookup order.
pub const COMPOSE_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

const LIST_CONTAINERS: &str = "docker ps -a --format '{{json .}}'";
const LIST_IMAGES: &str = "docker images --format '{{json .}}'";
const REPORT_CONTAINERS: &str =
    "docker ps --format 'table {{.Names}}\\t{{.Image}}\\t{{.Status}}\\t{{.Ports}}'";

/// Outcome of removing earlier containers and images of the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    pub containers: Outcome,
    pub images: Outcome,
}

/// What was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    Compose { file: String },
    Container { name: String, image: String },
}

pub async fn run<S: RemoteShell>(
    shell: &S,
    config: &DeployConfig,
    compose: ComposeFlavor,
    unix_ts: i64,
) -> Result<Launch> {
    let teardown = teardown_prior(shell, &config.project_id).await;
    teardown.containers.report("Remove previous containers");
    teardown.images.report("Remove previous images");

    let launch = match find_compose_file(shell, &config.remote_dir).await? {
        Some(file) => launch_compose(shell, config, compose, &file).await?,
        None => launch_container(shell, config, unix_ts).await?,
    };

    report_running(shell).await;
    Ok(launch)
}

/// Force-remove every container and image mentioning `project_id`.
/// Never fails: each half reports its own outcome.
pub async fn teardown_prior<S: RemoteShell>(shell: &S, project_id: &str) -> Teardown {
    let containers = remove_matching(shell, LIST_CONTAINERS, "docker rm -f", |out| {
        containers::matching_containers(out, project_id)
    })
    .await;
    let images = remove_matching(shell, LIST_IMAGES, "docker rmi -f", |out| {
        containers::matching_images(out, project_id)
    })
    .await;
    Teardown { containers, images }
}

async fn remove_matching<S, F>(shell: &S, list_cmd: &str, remove_cmd: &str, select: F) -> Outcome
where
    S: RemoteShell,
    F: Fn(&str) -> Vec<String>,
{
    let listing = match shell.sudo_exec(list_cmd).await {
        Ok(out) => out,
        Err(e) => return Outcome::FailedIgnored(format!("{:#}", e)),
    };

    let ids = select(&listing);
    if ids.is_empty() {
        return Outcome::SkippedAbsent;
    }

    shell
        .best_effort(&format!("{} {}", remove_cmd, ids.join(" ")))
        .await
}

pub async fn find_compose_file<S: RemoteShell>(shell: &S, remote_dir: &str) -> Result<Option<String>> {
    for name in COMPOSE_FILES {
        if shell.path_exists(&format!("{}/{}", remote_dir, name)).await? {
            return Ok(Some(name.to_string()));
        }
    }
    Ok(None)
}

async fn launch_compose<S: RemoteShell>(
    shell: &S,
    config: &DeployConfig,
    compose: ComposeFlavor,
    file: &str,
) -> Result<Launch> {
    output::info(&format!("Found {}, deploying with compose", file));

    let base = format!(
        "cd {} && {} -p {} -f {}",
        quote(&config.remote_dir),
        compose.command(),
        quote(&config.docker_name()),
        quote(file)
    );

    shell
        .best_effort(&format!("{} down --remove-orphans", base))
        .await
        .report("Stop previous compose stack");

    let spinner = output::create_spinner("Building and starting compose stack...");
    let up = shell.sudo_exec(&format!("{} up -d --build", base)).await;
    spinner.finish_and_clear();
    up.map_err(|e| DeployError::DeployFailed(format!("compose up: {:#}", e)))?;

    output::success("Compose stack is up");
    Ok(Launch::Compose {
        file: file.to_string(),
    })
}

async fn launch_container<S: RemoteShell>(
    shell: &S,
    config: &DeployConfig,
    unix_ts: i64,
) -> Result<Launch> {
    let image = config.image_tag();
    let name = config.container_name(unix_ts);

    let spinner = output::create_spinner(&format!("Building image {}...", image));
    let built = shell
        .sudo_exec(&format!(
            "docker build -t {} {}",
            quote(&image),
            quote(&config.remote_dir)
        ))
        .await;
    spinner.finish_and_clear();
    built.map_err(|e| DeployError::DeployFailed(format!("docker build: {:#}", e)))?;
    output::success(&format!("Image {} built", image));

    shell
        .sudo_exec(&format!(
            "docker run -d --name {name} --restart on-failure -p {port}:{port} {image}",
            name = quote(&name),
            port = config.app_port,
            image = quote(&image),
        ))
        .await
        .map_err(|e| DeployError::DeployFailed(format!("docker run: {:#}", e)))?;

    output::success(&format!(
        "Container {} running on port {}",
        name, config.app_port
    ));
    Ok(Launch::Container { name, image })
}

async fn report_running<S: RemoteShell>(shell: &S) {
    match shell.sudo_exec(REPORT_CONTAINERS).await {
        Ok(table) => {
            for line in table.lines().filter(|l| !l.trim().is_empty()) {
                output::info(line);
            }
        }
        Err(e) => output::warning(&format!("Could not list running containers: {:#}", e)),
    }
}
