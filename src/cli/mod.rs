use clap::Parser;
use std::path::PathBuf;

pub mod cleanup;
pub mod deploy;

#[derive(Parser, Debug)]
#[command(
    name = "portside",
    version,
    about = "Deploy a containerized web app to a single VM behind Nginx",
    after_help = "Values are read from REPO_URL, GIT_TOKEN, BRANCH, SSH_USER, SSH_HOST, SSH_KEY, \
                  APP_PORT and REMOTE_DIR, then from --config, and are prompted for otherwise."
)]
pub struct Cli {
    /// Remove containers, images, nginx site and project directory instead of deploying
    #[arg(long)]
    pub cleanup: bool,

    /// TOML file with deployment values (environment variables win)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the run log
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,

    /// Local working copy of the repository [default: ./<project>]
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
