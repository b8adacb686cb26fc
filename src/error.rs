use std::fmt;

/// Remote component installed by the bootstrap step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Docker,
    Compose,
    Nginx,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Docker => "docker",
            Component::Compose => "docker compose",
            Component::Nginx => "nginx",
        };
        f.write_str(name)
    }
}

/// Classified deployment failures. Each one ends the run with exit status 1.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("missing required value: {0}")]
    MissingRequiredField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("required tool not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("repository sync failed: {0}")]
    SyncFailed(String),

    #[error("cannot reach {target} over SSH: {reason}")]
    RemoteUnreachable { target: String, reason: String },

    #[error("unsupported remote OS '{0}' (expected a Debian or RHEL family distribution)")]
    UnsupportedRemoteOs(String),

    #[error("failed to bootstrap {component}: {reason}")]
    BootstrapFailed { component: Component, reason: String },

    #[error("project transfer failed: {0}")]
    TransferFailed(String),

    #[error("deployment failed: {0}")]
    DeployFailed(String),

    #[error("cannot install nginx site: {0}")]
    ProxyInstallFailed(String),

    #[error("nginx rejected the generated configuration: {0}")]
    ProxyConfigInvalid(String),

    #[error("service {service} is not active (state: {state})")]
    ServiceNotActive { service: String, state: String },
}

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_UNEXPECTED: u8 = 2;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Exit status for an error that reached the top of the run.
///
/// Anything carrying a [`DeployError`] somewhere in its chain is a
/// classified failure; everything else counts as unexpected.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if classify(err).is_some() {
        EXIT_FAILURE
    } else {
        EXIT_UNEXPECTED
    }
}

pub fn classify(err: &anyhow::Error) -> Option<&DeployError> {
    err.chain().find_map(|e| e.downcast_ref::<DeployError>())
}
