pub mod dockerfile;

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::config::{DeployConfig, Secret};
use crate::error::DeployError;
use crate::output;

/// Executables every deploy needs on the operator's machine.
pub const REQUIRED_TOOLS: [&str; 3] = ["git", "ssh", "curl"];

pub fn require_tools(tools: &[&str]) -> Result<()> {
    for tool in tools {
        which::which(tool).map_err(|_| DeployError::ToolNotFound(tool.to_string()))?;
        debug!("Found {}", tool);
    }
    Ok(())
}

/// Embed the token as credential for HTTP(S) URLs. Other forms are
/// returned as they are.
pub fn authenticated_url(url: &str, token: Option<&Secret>) -> String {
    let Some(token) = token else {
        return url.to_string();
    };
    match url.split_once("://") {
        Some((scheme, rest)) if scheme == "https" || scheme == "http" => {
            format!("{}://{}@{}", scheme, token.expose(), strip_userinfo(rest))
        }
        _ => url.to_string(),
    }
}

/// URL safe for logs: any userinfo is masked.
pub fn redact_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if strip_userinfo(rest) != rest => {
            format!("{}://***@{}", scheme, strip_userinfo(rest))
        }
        _ => url.to_string(),
    }
}

fn strip_userinfo(rest: &str) -> &str {
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => &rest[at + 1..],
        None => rest,
    }
}

/// Clone the repository, or fast-forward an existing working copy.
///
/// The token only ever appears on git's command line. `origin` keeps the
/// plain URL, so `.git/config` never holds a credential.
pub async fn sync_repo(config: &DeployConfig) -> Result<()> {
    let url = authenticated_url(&config.repo_url, config.token.as_ref());
    let branch = &config.branch;
    let workdir = &config.workdir;
    let token = config.token.as_ref();

    if workdir.join(".git").exists() {
        output::info(&format!(
            "Updating {} (branch {})",
            workdir.display(),
            branch
        ));
        git(&["remote", "set-url", "origin", &config.repo_url], Some(workdir), token).await?;
        let refspec = format!("+refs/heads/{b}:refs/remotes/origin/{b}", b = branch);
        git(&["fetch", &url, &refspec], Some(workdir), token).await?;
        git(&["checkout", branch], Some(workdir), token).await?;
        git(
            &["merge", "--ff-only", &format!("origin/{}", branch)],
            Some(workdir),
            token,
        )
        .await?;
        output::success("Working copy up to date");
    } else {
        output::info(&format!(
            "Cloning {} (branch {})",
            redact_url(&config.repo_url),
            branch
        ));
        let dest = workdir.to_string_lossy();
        git(
            &["clone", "--depth", "1", "--branch", branch, &url, &dest],
            None,
            token,
        )
        .await?;
        git(&["remote", "set-url", "origin", &config.repo_url], Some(workdir), token).await?;
        output::success(&format!("Cloned into {}", workdir.display()));
    }

    Ok(())
}

async fn git(args: &[&str], cwd: Option<&Path>, token: Option<&Secret>) -> Result<()> {
    let subcommand = args.first().copied().unwrap_or_default();
    debug!("git {} (cwd: {:?})", subcommand, cwd);

    let mut cmd = Command::new("git");
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to run git {}", subcommand))?;

    if !output.status.success() {
        let stderr = scrub(String::from_utf8_lossy(&output.stderr).trim(), token);
        return Err(DeployError::SyncFailed(format!("git {}: {}", subcommand, stderr)).into());
    }

    Ok(())
}

/// Remove the token from tool output before it can reach a log.
fn scrub(text: &str, token: Option<&Secret>) -> String {
    match token {
        Some(t) if !t.expose().is_empty() => text.replace(t.expose(), "***"),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_goes_into_https_urls_only() {
        let token = Secret::new("ghp_abc");
        assert_eq!(
            authenticated_url("https://github.com/acme/app.git", Some(&token)),
            "https://ghp_abc@github.com/acme/app.git"
        );
        assert_eq!(
            authenticated_url("https://old@github.com/acme/app.git", Some(&token)),
            "https://ghp_abc@github.com/acme/app.git"
        );
        assert_eq!(
            authenticated_url("git@github.com:acme/app.git", Some(&token)),
            "git@github.com:acme/app.git"
        );
        assert_eq!(
            authenticated_url("https://github.com/acme/app.git", None),
            "https://github.com/acme/app.git"
        );
    }

    #[test]
    fn redacted_url_hides_credentials() {
        assert_eq!(
            redact_url("https://ghp_abc@github.com/acme/app.git"),
            "https://***@github.com/acme/app.git"
        );
        assert_eq!(
            redact_url("https://github.com/acme/app.git"),
            "https://github.com/acme/app.git"
        );
    }

    #[test]
    fn at_sign_in_path_is_not_userinfo() {
        assert_eq!(
            redact_url("https://example.com/team/@scope/pkg.git"),
            "https://example.com/team/@scope/pkg.git"
        );
    }

    #[test]
    fn scrub_masks_token_in_stderr() {
        let token = Secret::new("ghp_abc");
        let msg = "fatal: unable to access 'https://ghp_abc@github.com/acme/app.git/'";
        assert!(!scrub(msg, Some(&token)).contains("ghp_abc"));
    }

    #[test]
    fn missing_tool_is_named() {
        let err = require_tools(&["portside-no-such-tool"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::ToolNotFound(t)) if t == "portside-no-such-tool"
        ));
    }

    mod sync {
        use super::*;
        use crate::testutil::sample_config;
        use std::path::PathBuf;
        use std::process::Command as StdCommand;

        fn git_in(dir: &Path, args: &[&str]) -> String {
            let out = StdCommand::new("git")
                .args(["-c", "user.name=Portside", "-c", "user.email=ci@example.com"])
                .args(args)
                .current_dir(dir)
                .output()
                .unwrap();
            assert!(
                out.status.success(),
                "git {:?}: {}",
                args,
                String::from_utf8_lossy(&out.stderr)
            );
            String::from_utf8_lossy(&out.stdout).to_string()
        }

        fn commit(dir: &Path, file: &str, body: &str) {
            std::fs::write(dir.join(file), body).unwrap();
            git_in(dir, &["add", file]);
            git_in(dir, &["commit", "-q", "-m", file]);
        }

        /// A bare origin with one commit on `main`, plus a seed clone to push from.
        struct Upstream {
            _root: tempfile::TempDir,
            origin: PathBuf,
            seed: PathBuf,
            workdir: PathBuf,
        }

        impl Upstream {
            fn new() -> Self {
                let root = tempfile::tempdir().unwrap();
                let origin = root.path().join("origin.git");
                let seed = root.path().join("seed");
                std::fs::create_dir(&origin).unwrap();
                std::fs::create_dir(&seed).unwrap();
                git_in(&origin, &["init", "-q", "--bare"]);
                git_in(&seed, &["init", "-q"]);
                commit(&seed, "app.py", "print('v1')\n");
                git_in(&seed, &["push", "-q", origin.to_str().unwrap(), "HEAD:refs/heads/main"]);
                let workdir = root.path().join("work");
                Self {
                    _root: root,
                    origin,
                    seed,
                    workdir,
                }
            }

            fn push(&self, file: &str, body: &str) {
                commit(&self.seed, file, body);
                git_in(
                    &self.seed,
                    &["push", "-q", self.origin.to_str().unwrap(), "HEAD:refs/heads/main"],
                );
            }

            fn config(&self) -> DeployConfig {
                let mut config = sample_config();
                config.repo_url = self.origin.display().to_string();
                config.workdir = self.workdir.clone();
                config
            }
        }

        #[tokio::test]
        async fn clones_then_fast_forwards() {
            let upstream = Upstream::new();
            let config = upstream.config();

            sync_repo(&config).await.unwrap();
            assert!(upstream.workdir.join("app.py").exists());

            upstream.push("README.md", "v2\n");
            sync_repo(&config).await.unwrap();
            assert_eq!(
                std::fs::read_to_string(upstream.workdir.join("README.md")).unwrap(),
                "v2\n"
            );
        }

        #[tokio::test]
        async fn origin_never_keeps_a_credential() {
            let upstream = Upstream::new();
            let config = upstream.config();
            sync_repo(&config).await.unwrap();

            let url = git_in(&upstream.workdir, &["remote", "get-url", "origin"]);
            assert_eq!(url.trim(), config.repo_url);

            git_in(
                &upstream.workdir,
                &["remote", "set-url", "origin", "https://ghp_leaked@example.com/acme/app.git"],
            );
            sync_repo(&config).await.unwrap();

            let stored = std::fs::read_to_string(upstream.workdir.join(".git/config")).unwrap();
            assert!(!stored.contains("ghp_leaked"));
        }

        #[tokio::test]
        async fn diverged_history_is_sync_failure() {
            let upstream = Upstream::new();
            let config = upstream.config();
            sync_repo(&config).await.unwrap();

            commit(&upstream.workdir, "local.txt", "local edit\n");
            upstream.push("remote.txt", "remote edit\n");

            let err = sync_repo(&config).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<DeployError>(),
                Some(DeployError::SyncFailed(msg)) if msg.starts_with("git merge")
            ));
        }

        #[tokio::test]
        async fn missing_branch_is_sync_failure() {
            let upstream = Upstream::new();
            let mut config = upstream.config();
            config.branch = "release".to_string();

            let err = sync_repo(&config).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<DeployError>(),
                Some(DeployError::SyncFailed(msg)) if msg.starts_with("git clone")
            ));
            assert!(!upstream.workdir.exists());
        }
    }
}
