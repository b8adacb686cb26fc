use std::path::PathBuf;

use crate::config::DeployConfig;

pub fn sample_config() -> DeployConfig {
    DeployConfig {
        repo_url: "https://example.com/acme/app.git".to_string(),
        token: None,
        branch: "main".to_string(),
        ssh_user: "deploy".to_string(),
        ssh_host: "203.0.113.7".to_string(),
        ssh_key: PathBuf::from("/tmp/id_test"),
        app_port: 8000,
        remote_dir: "/home/deploy/app".to_string(),
        project_id: "app".to_string(),
        workdir: PathBuf::from("app"),
    }
}
