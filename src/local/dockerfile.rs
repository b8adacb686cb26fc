use anyhow::{Context, Result};
use minijinja::Environment;
use std::path::Path;

use crate::output;

const DOCKERFILE_TEMPLATE: &str = include_str!("../../templates/Dockerfile.j2");

/// Port the generated image listens on.
pub const DEFAULT_APP_PORT: u16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerfileSource {
    Existing,
    Generated,
}

pub fn render_default() -> Result<String> {
    let mut env = Environment::new();
    env.add_template("Dockerfile", DOCKERFILE_TEMPLATE)?;
    let tmpl = env.get_template("Dockerfile")?;
    let rendered = tmpl.render(minijinja::context! {
        port => DEFAULT_APP_PORT,
    })?;
    Ok(rendered)
}

/// Write a default Dockerfile unless the working copy already has one.
pub fn ensure_dockerfile(workdir: &Path, app_port: u16) -> Result<DockerfileSource> {
    let path = workdir.join("Dockerfile");

    if path.exists() {
        output::success("Using repository Dockerfile");
        return Ok(DockerfileSource::Existing);
    }

    let content = render_default()?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    output::info(&format!(
        "No Dockerfile found, generated a default one listening on port {}",
        DEFAULT_APP_PORT
    ));
    if app_port != DEFAULT_APP_PORT {
        output::warning(&format!(
            "The generated image listens on {} but APP_PORT is {}",
            DEFAULT_APP_PORT, app_port
        ));
    }

    Ok(DockerfileSource::Generated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_and_keeps_custom_file() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            ensure_dockerfile(dir.path(), 8000).unwrap(),
            DockerfileSource::Generated
        );
        let generated = std::fs::read_to_string(dir.path().join("Dockerfile")).unwrap();
        assert!(generated.contains("EXPOSE 8000"));

        std::fs::write(dir.path().join("Dockerfile"), "FROM nginx:alpine\n").unwrap();
        assert_eq!(
            ensure_dockerfile(dir.path(), 8000).unwrap(),
            DockerfileSource::Existing
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Dockerfile")).unwrap(),
            "FROM nginx:alpine\n"
        );
    }

    #[test]
    fn default_runs_a_web_process_on_fixed_port() {
        let rendered = render_default().unwrap();
        assert!(rendered.contains(r#"CMD ["python", "-m", "http.server", "8000"]"#));
    }
}
