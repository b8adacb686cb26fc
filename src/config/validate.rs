use anyhow::Result;
use std::path::{Path, PathBuf};

use super::{Field, RawInputs};
use crate::error::DeployError;

pub fn required(raw: &RawInputs) -> Result<()> {
    let checks = [
        (Field::RepoUrl, &raw.repo_url),
        (Field::SshUser, &raw.ssh_user),
        (Field::SshHost, &raw.ssh_host),
        (Field::SshKey, &raw.ssh_key),
        (Field::AppPort, &raw.app_port),
    ];

    for (field, value) in checks {
        if value.trim().is_empty() {
            return Err(DeployError::MissingRequiredField(field.env_var()).into());
        }
    }

    Ok(())
}

pub fn project_id_of(url: &str) -> Result<String> {
    super::project_id(url).ok_or_else(|| {
        DeployError::InvalidField {
            field: Field::RepoUrl.env_var(),
            reason: format!("cannot derive a project name from '{}'", url),
        }
        .into()
    })
}

pub fn port(value: &str) -> Result<u16> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(DeployError::InvalidField {
            field: Field::AppPort.env_var(),
            reason: format!("'{}' is not a port between 1 and 65535", value),
        }
        .into()),
    }
}

pub fn readable_key(path: &Path) -> Result<PathBuf> {
    match std::fs::File::open(path) {
        Ok(_) => Ok(path.to_path_buf()),
        Err(e) => Err(DeployError::InvalidField {
            field: Field::SshKey.env_var(),
            reason: format!("cannot read {}: {}", path.display(), e),
        }
        .into()),
    }
}
