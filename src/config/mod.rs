use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub mod prompt;
mod validate;

use prompt::Prompter;

const DEFAULT_BRANCH: &str = "main";

/// Value that must never reach the log or the terminal.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Inputs in collection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    RepoUrl,
    Token,
    Branch,
    SshUser,
    SshHost,
    SshKey,
    AppPort,
    RemoteDir,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::RepoUrl,
        Field::Token,
        Field::Branch,
        Field::SshUser,
        Field::SshHost,
        Field::SshKey,
        Field::AppPort,
        Field::RemoteDir,
    ];

    pub fn env_var(&self) -> &'static str {
        match self {
            Field::RepoUrl => "REPO_URL",
            Field::Token => "GIT_TOKEN",
            Field::Branch => "BRANCH",
            Field::SshUser => "SSH_USER",
            Field::SshHost => "SSH_HOST",
            Field::SshKey => "SSH_KEY",
            Field::AppPort => "APP_PORT",
            Field::RemoteDir => "REMOTE_DIR",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::RepoUrl => "Git repository URL",
            Field::Token => "Personal access token (leave empty for public/SSH repos)",
            Field::Branch => "Branch",
            Field::SshUser => "Remote SSH user",
            Field::SshHost => "Remote SSH host",
            Field::SshKey => "Path to SSH private key",
            Field::AppPort => "Application container port",
            Field::RemoteDir => "Remote project directory",
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Field::Token)
    }
}

/// Optional `--config` file. Every key is optional; environment wins.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub repo_url: Option<String>,
    pub token: Option<String>,
    pub branch: Option<String>,
    pub ssh_user: Option<String>,
    pub ssh_host: Option<String>,
    pub ssh_key: Option<String>,
    pub app_port: Option<u16>,
    pub remote_dir: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn get(&self, field: Field) -> Option<String> {
        match field {
            Field::RepoUrl => self.repo_url.clone(),
            Field::Token => self.token.clone(),
            Field::Branch => self.branch.clone(),
            Field::SshUser => self.ssh_user.clone(),
            Field::SshHost => self.ssh_host.clone(),
            Field::SshKey => self.ssh_key.clone(),
            Field::AppPort => self.app_port.map(|p| p.to_string()),
            Field::RemoteDir => self.remote_dir.clone(),
        }
    }
}

/// Values as collected, before validation. Empty string means "not given".
#[derive(Debug, Default, Clone)]
pub struct RawInputs {
    pub repo_url: String,
    pub token: String,
    pub branch: String,
    pub ssh_user: String,
    pub ssh_host: String,
    pub ssh_key: String,
    pub app_port: String,
    pub remote_dir: String,
}

impl RawInputs {
    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::RepoUrl => &mut self.repo_url,
            Field::Token => &mut self.token,
            Field::Branch => &mut self.branch,
            Field::SshUser => &mut self.ssh_user,
            Field::SshHost => &mut self.ssh_host,
            Field::SshKey => &mut self.ssh_key,
            Field::AppPort => &mut self.app_port,
            Field::RemoteDir => &mut self.remote_dir,
        }
    }
}

/// Session configuration. Built once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub repo_url: String,
    pub token: Option<Secret>,
    pub branch: String,
    pub ssh_user: String,
    pub ssh_host: String,
    pub ssh_key: PathBuf,
    pub app_port: u16,
    pub remote_dir: String,
    pub project_id: String,
    pub workdir: PathBuf,
}

impl DeployConfig {
    /// Gather every field from the environment, the config file, or the
    /// prompter, in that order of precedence.
    pub fn collect(
        env: impl Fn(&str) -> Option<String>,
        file: &FileConfig,
        prompter: &dyn Prompter,
        workdir: Option<PathBuf>,
    ) -> Result<Self> {
        let mut raw = RawInputs::default();

        for field in Field::ALL {
            let preset = env(field.env_var())
                .or_else(|| file.get(field))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());

            let value = match preset {
                Some(v) => v,
                None => {
                    let default = suggested_default(field, &raw);
                    prompter
                        .ask(field, default.as_deref())
                        .with_context(|| format!("Failed to read {}", field.env_var()))?
                        .trim()
                        .to_string()
                }
            };

            *raw.slot(field) = value;
        }

        Self::from_raw(raw, workdir)
    }

    pub fn from_raw(raw: RawInputs, workdir: Option<PathBuf>) -> Result<Self> {
        validate::required(&raw)?;

        let project_id = validate::project_id_of(&raw.repo_url)?;
        let app_port = validate::port(&raw.app_port)?;
        let ssh_key = validate::readable_key(&expand_home(&raw.ssh_key))?;

        let branch = if raw.branch.is_empty() {
            DEFAULT_BRANCH.to_string()
        } else {
            raw.branch
        };

        let remote_dir = if raw.remote_dir.is_empty() {
            default_remote_dir(&raw.ssh_user, &project_id)
        } else {
            raw.remote_dir
        };

        let token = Some(raw.token)
            .filter(|t| !t.is_empty())
            .map(Secret::new);

        let workdir = workdir.unwrap_or_else(|| PathBuf::from(&project_id));

        Ok(Self {
            repo_url: raw.repo_url,
            token,
            branch,
            ssh_user: raw.ssh_user,
            ssh_host: raw.ssh_host,
            ssh_key,
            app_port,
            remote_dir,
            project_id,
            workdir,
        })
    }

    /// `user@host`, as used by ssh, rsync and scp.
    pub fn target(&self) -> String {
        format!("{}@{}", self.ssh_user, self.ssh_host)
    }

    /// Project id as docker image references and compose project names
    /// accept it: lowercase only.
    pub fn docker_name(&self) -> String {
        self.project_id.to_ascii_lowercase()
    }

    pub fn image_tag(&self) -> String {
        format!("{}:latest", self.docker_name())
    }

    pub fn container_name(&self, unix_ts: i64) -> String {
        format!("{}_{}", self.project_id, unix_ts)
    }
}

/// Short name of the project: last path segment, `.git` stripped.
pub fn project_id(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(|c: char| c == '/' || c == ':').next()?;
    let id = last.strip_suffix(".git").unwrap_or(last);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

pub fn default_remote_dir(user: &str, project_id: &str) -> String {
    format!("/home/{}/{}", user, project_id)
}

fn suggested_default(field: Field, raw: &RawInputs) -> Option<String> {
    match field {
        Field::Branch => Some(DEFAULT_BRANCH.to_string()),
        Field::SshKey => dirs::home_dir().map(|h| h.join(".ssh/id_rsa").display().to_string()),
        Field::RemoteDir => project_id(&raw.repo_url)
            .filter(|_| !raw.ssh_user.is_empty())
            .map(|id| default_remote_dir(&raw.ssh_user, &id)),
        _ => None,
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
