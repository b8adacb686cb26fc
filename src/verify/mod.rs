use anyhow::{Context, Result};
use std::time::Duration;
use tokio::process::Command;

use crate::error::DeployError;
use crate::output;
use crate::ssh::RemoteShell;

/// Time given to containers and nginx before checking them.
pub const SETTLE_DELAY: Duration = Duration::from_secs(5);
pub const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub const SERVICES: [&str; 2] = ["docker", "nginx"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpProbe {
    Reachable(u16),
    Unreachable(String),
}

pub async fn run<S: RemoteShell>(shell: &S, host: &str, settle: Duration) -> Result<HttpProbe> {
    if !settle.is_zero() {
        output::info(&format!("Waiting {}s for services to settle...", settle.as_secs()));
        tokio::time::sleep(settle).await;
    }

    for service in SERVICES {
        ensure_active(shell, service).await?;
    }

    let probe = probe_http(host).await?;
    match &probe {
        HttpProbe::Reachable(code) => {
            output::success(&format!("http://{}/ answered with HTTP {}", host, code))
        }
        HttpProbe::Unreachable(reason) => output::warning(&format!(
            "http://{}/ did not answer ({}). Check the firewall and the container port mapping.",
            host, reason
        )),
    }
    Ok(probe)
}

pub async fn ensure_active<S: RemoteShell>(shell: &S, service: &str) -> Result<()> {
    let out = shell
        .run(&format!("systemctl is-active {}", service))
        .await?;
    let state = out.stdout.trim();

    if state != "active" {
        return Err(DeployError::ServiceNotActive {
            service: service.to_string(),
            state: if state.is_empty() {
                "unknown".to_string()
            } else {
                state.to_string()
            },
        }
        .into());
    }

    output::success(&format!("{} is active", service));
    Ok(())
}

/// One bounded curl request. Only a failure to run curl is an error.
pub async fn probe_http(host: &str) -> Result<HttpProbe> {
    let url = format!("http://{}/", host);
    let output = Command::new("curl")
        .args([
            "-s",
            "-o",
            "/dev/null",
            "-w",
            "%{http_code}",
            "--max-time",
            &HTTP_PROBE_TIMEOUT.as_secs().to_string(),
            &url,
        ])
        .output()
        .await
        .context("Failed to run curl")?;

    Ok(classify_probe(
        output.status.success(),
        &String::from_utf8_lossy(&output.stdout),
    ))
}

/// An HTTP answer below 500 counts as reachable. A 5xx comes from nginx
/// when nothing listens behind it; `000` means no response at all.
pub fn classify_probe(exited_ok: bool, code: &str) -> HttpProbe {
    match code.trim().parse::<u16>() {
        Ok(code) if code >= 500 => HttpProbe::Unreachable(format!(
            "HTTP {}, the application is not answering behind nginx",
            code
        )),
        Ok(code) if code > 0 => HttpProbe::Reachable(code),
        _ if exited_ok => HttpProbe::Unreachable("empty response".to_string()),
        _ => HttpProbe::Unreachable("connection failed or timed out".to_string()),
    }
}
