use anyhow::{Context, Result};
use minijinja::Environment;

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::outcome::Outcome;
use crate::output;
use crate::ssh::{quote, RemoteShell};

const SITE_TEMPLATE: &str = include_str!("../../templates/nginx-site.conf.j2");

const SITES_AVAILABLE: &str = "/etc/nginx/sites-available";
const SITES_ENABLED: &str = "/etc/nginx/sites-enabled";
const CONF_D: &str = "/etc/nginx/conf.d";
const NGINX_CONF: &str = "/etc/nginx/nginx.conf";

/// Where the host's nginx expects site files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Debian style: sites-available plus a link in sites-enabled.
    Sites,
    /// RHEL style: a `.conf` file in conf.d.
    ConfD,
}

impl Layout {
    pub async fn detect<S: RemoteShell>(shell: &S) -> Result<Self> {
        if shell.exec_ok(&format!("test -d {}", SITES_AVAILABLE)).await? {
            Ok(Layout::Sites)
        } else {
            Ok(Layout::ConfD)
        }
    }

    pub fn site_path(&self, project_id: &str) -> String {
        match self {
            Layout::Sites => format!("{}/{}", SITES_AVAILABLE, project_id),
            Layout::ConfD => format!("{}/{}.conf", CONF_D, project_id),
        }
    }

    pub fn enabled_link(&self, project_id: &str) -> Option<String> {
        match self {
            Layout::Sites => Some(format!("{}/{}", SITES_ENABLED, project_id)),
            Layout::ConfD => None,
        }
    }
}

/// Every file a deploy of `project_id` may have created, in either layout.
pub fn all_site_files(project_id: &str) -> Vec<String> {
    vec![
        Layout::Sites.site_path(project_id),
        format!("{}/{}", SITES_ENABLED, project_id),
        Layout::ConfD.site_path(project_id),
    ]
}

pub fn render_site(project_id: &str, port: u16) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("site", SITE_TEMPLATE)
        .context("Failed to load nginx site template")?;
    let tmpl = env.get_template("site")?;
    let rendered = tmpl
        .render(minijinja::context! {
            project_id => project_id,
            server_name => "_",
            port => port,
        })
        .context("Failed to render nginx site template")?;
    Ok(rendered)
}

/// Install the site for `config` and reload nginx.
///
/// The reload only happens after `nginx -t` passes. On a rejected config
/// the previous site file is restored, so the running configuration and
/// the files on disk stay in agreement.
pub async fn configure<S: RemoteShell>(shell: &S, config: &DeployConfig) -> Result<Layout> {
    let id = &config.project_id;
    let layout = Layout::detect(shell).await?;
    let content = render_site(id, config.app_port)?;

    let staging = format!("/tmp/{}.nginx.conf", id);
    shell
        .write_file(&staging, &content)
        .await
        .map_err(|e| install_failed("stage", e))?;

    let site = quote(&layout.site_path(id));
    let backup = quote(&format!("{}.portside-bak", layout.site_path(id)));
    let fresh = quote(&format!("{}.portside-new", layout.site_path(id)));

    shell
        .sudo_exec(&format!(
            "if [ -e {site} ]; then cp -a {site} {backup}; else rm -f {backup}; fi",
            site = site,
            backup = backup
        ))
        .await
        .map_err(|e| install_failed("back up", e))?;

    shell
        .sudo_exec(&format!(
            "cp {staging} {fresh} && mv -f {fresh} {site} && rm -f {staging}",
            staging = quote(&staging),
            fresh = fresh,
            site = site
        ))
        .await
        .map_err(|e| install_failed("install", e))?;

    if let Some(link) = layout.enabled_link(id) {
        shell
            .sudo_exec(&format!("ln -sf {} {}", site, quote(&link)))
            .await
            .map_err(|e| install_failed("enable", e))?;
    }

    disable_default_site(shell, layout)
        .await?
        .report("Disable default nginx site");

    let check = shell.run("sudo nginx -t").await?;
    if !check.success() {
        restore(shell, layout, id).await;
        output::error("nginx -t failed, previous configuration kept");
        return Err(DeployError::ProxyConfigInvalid(check.diagnostic()).into());
    }

    shell
        .best_effort(&format!("rm -f {}", backup))
        .await
        .report("Remove nginx site backup");

    shell
        .sudo_exec("systemctl reload nginx")
        .await
        .map_err(|e| DeployError::ServiceNotActive {
            service: "nginx".to_string(),
            state: format!("reload failed: {:#}", e),
        })?;

    output::success(&format!(
        "Nginx routes port 80 to 127.0.0.1:{}",
        config.app_port
    ));
    Ok(layout)
}

fn install_failed(action: &str, err: anyhow::Error) -> anyhow::Error {
    DeployError::ProxyInstallFailed(format!("{} site file: {:#}", action, err)).into()
}

/// Stop the distribution's welcome server from claiming port 80.
///
/// Debian ships it as a link in sites-enabled. RHEL builds declare it in
/// nginx.conf with `default_server`, and nginx.org packages add
/// conf.d/default.conf. Our site is the default server afterwards.
async fn disable_default_site<S: RemoteShell>(shell: &S, layout: Layout) -> Result<Outcome> {
    match layout {
        Layout::Sites => {
            let default_site = format!("{}/default", SITES_ENABLED);
            if !shell.path_exists(&default_site).await? {
                return Ok(Outcome::SkippedAbsent);
            }
            Ok(shell.best_effort(&format!("rm -f {}", default_site)).await)
        }
        Layout::ConfD => {
            let stock_site = format!("{}/default.conf", CONF_D);
            let mut steps = Vec::new();
            if shell.path_exists(&stock_site).await? {
                steps.push(format!(
                    "mv -f {} {}.portside-disabled",
                    stock_site, stock_site
                ));
            }
            if shell
                .exec_ok(&format!("grep -qs default_server {}", NGINX_CONF))
                .await?
            {
                steps.push(format!(
                    "sed -i.portside-bak -e \"s/ default_server//\" {}",
                    NGINX_CONF
                ));
            }
            if steps.is_empty() {
                return Ok(Outcome::SkippedAbsent);
            }
            Ok(shell.best_effort(&steps.join(" && ")).await)
        }
    }
}

/// Put back the previous site file, or drop the new one if there was none.
async fn restore<S: RemoteShell>(shell: &S, layout: Layout, project_id: &str) {
    let site = quote(&layout.site_path(project_id));
    let backup = quote(&format!("{}.portside-bak", layout.site_path(project_id)));
    let mut cmd = format!(
        "if [ -e {backup} ]; then mv -f {backup} {site}; else rm -f {site}",
        backup = backup,
        site = site
    );
    if let Some(link) = layout.enabled_link(project_id) {
        cmd.push_str(&format!("; rm -f {}", quote(&link)));
    }
    cmd.push_str("; fi");

    shell
        .best_effort(&cmd)
        .await
        .report("Restore previous nginx site");
}
