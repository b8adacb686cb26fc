use anyhow::Result;

use crate::error::DeployError;
use crate::ssh::RemoteShell;

/// Package manager family of the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    Debian,
    Rhel,
}

impl PackageFamily {
    /// Detect by reading /etc/os-release via SSH.
    pub async fn detect<S: RemoteShell>(shell: &S) -> Result<Self> {
        let output = shell.exec("cat /etc/os-release").await?;
        Self::from_os_release(&output)
    }

    /// `ID` decides first, then each entry of `ID_LIKE`.
    pub fn from_os_release(content: &str) -> Result<Self> {
        let mut id = String::new();
        let mut id_like = String::new();

        for line in content.lines() {
            if let Some(v) = line.strip_prefix("ID=") {
                id = v.trim().trim_matches('"').to_string();
            } else if let Some(v) = line.strip_prefix("ID_LIKE=") {
                id_like = v.trim().trim_matches('"').to_string();
            }
        }

        std::iter::once(id.as_str())
            .chain(id_like.split_whitespace())
            .find_map(Self::from_id)
            .ok_or_else(|| {
                let name = if id.is_empty() { "unknown" } else { id.as_str() };
                DeployError::UnsupportedRemoteOs(name.to_string()).into()
            })
    }

    fn from_id(id: &str) -> Option<Self> {
        match id {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" | "pop" => Some(PackageFamily::Debian),
            "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "amzn" | "ol" => {
                Some(PackageFamily::Rhel)
            }
            _ => None,
        }
    }

    pub fn install_nginx_cmd(&self) -> &'static str {
        match self {
            PackageFamily::Debian => {
                "apt-get update -qq && DEBIAN_FRONTEND=noninteractive apt-get install -y -qq nginx"
            }
            PackageFamily::Rhel => {
                "if command -v dnf >/dev/null 2>&1; then dnf install -y nginx; else yum install -y nginx; fi"
            }
        }
    }
}
