use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{error as log_error, info as log_info, warn as log_warn};

/// Target used to mirror operator output into the run log.
/// The console layer filters it out so nothing prints twice.
pub const LOG_TARGET: &str = "output";

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn step(num: usize, total: usize, msg: &str) {
    log_info!(target: LOG_TARGET, "[{}/{}] {}", num, total, msg);
    println!(
        "{} {}",
        style(format!("[{}/{}]", num, total)).bold().cyan(),
        msg
    );
}

pub fn success(msg: &str) {
    log_info!(target: LOG_TARGET, "{}", msg);
    println!("{} {}", style("✓").bold().green(), msg);
}

pub fn error(msg: &str) {
    log_error!(target: LOG_TARGET, "{}", msg);
    eprintln!("{} {}", style("✗").bold().red(), msg);
}

pub fn warning(msg: &str) {
    log_warn!(target: LOG_TARGET, "{}", msg);
    eprintln!("{} {}", style("!").bold().yellow(), msg);
}

pub fn info(msg: &str) {
    log_info!(target: LOG_TARGET, "{}", msg);
    println!("{} {}", style("→").bold().blue(), msg);
}

pub fn header(msg: &str) {
    log_info!(target: LOG_TARGET, "== {} ==", msg);
    println!("\n{}", style(msg).bold().underlined());
}
