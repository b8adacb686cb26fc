use serde::Deserialize;

/// One line of `docker ps -a --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRow {
    #[serde(rename = "ID")]
    pub id: String,
    pub names: String,
    #[serde(default)]
    pub image: String,
}

/// One line of `docker images --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageRow {
    #[serde(rename = "ID")]
    pub id: String,
    pub repository: String,
    #[serde(default)]
    pub tag: String,
}

impl ImageRow {
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

fn parse_lines<T: for<'de> Deserialize<'de>>(output: &str) -> Vec<T> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::debug!("Skipping unparsable docker line ({}): {}", e, l);
                None
            }
        })
        .collect()
}

fn mentions(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(needle)
}

/// IDs of containers whose name or image mentions the project.
/// Compose and image names are lowercased, so matching ignores case.
pub fn matching_containers(output: &str, project_id: &str) -> Vec<String> {
    let needle = project_id.to_ascii_lowercase();
    parse_lines::<ContainerRow>(output)
        .into_iter()
        .filter(|c| mentions(&c.names, &needle) || mentions(&c.image, &needle))
        .map(|c| c.id)
        .collect()
}

/// IDs of images whose reference mentions the project, deduplicated.
pub fn matching_images(output: &str, project_id: &str) -> Vec<String> {
    let needle = project_id.to_ascii_lowercase();
    let mut ids: Vec<String> = parse_lines::<ImageRow>(output)
        .into_iter()
        .filter(|i| mentions(&i.reference(), &needle))
        .map(|i| i.id)
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS: &str = r#"{"Command":"\"python -m http…\"","ID":"a1b2c3","Image":"app:latest","Names":"app_1700000000","Ports":"0.0.0.0:8000->8000/tcp","State":"running"}
{"Command":"\"/docker-entrypoint.…\"","ID":"d4e5f6","Image":"redis:7","Names":"cache","Ports":"","State":"running"}
{"ID":"0a0b0c","Image":"ghcr.io/acme/app-worker:1","Names":"worker"}
"#;

    const IMAGES: &str = r#"{"ID":"sha1","Repository":"app","Tag":"latest","Size":"150MB"}
{"ID":"sha1","Repository":"registry.local/app","Tag":"latest"}
{"ID":"sha2","Repository":"redis","Tag":"7"}
not json
"#;

    #[test]
    fn containers_match_on_name_or_image() {
        assert_eq!(matching_containers(PS, "app"), vec!["a1b2c3", "0a0b0c"]);
        assert!(matching_containers(PS, "billing").is_empty());
    }

    #[test]
    fn images_match_on_reference_and_dedupe() {
        assert_eq!(matching_images(IMAGES, "app"), vec!["sha1"]);
    }

    #[test]
    fn mixed_case_project_matches_lowercase_names() {
        let ps = r#"{"ID":"c1","Image":"myapp:latest","Names":"MyApp_1700000000"}
{"ID":"c2","Image":"postgres:16","Names":"myapp-db-1"}"#;
        let images = r#"{"ID":"sha9","Repository":"myapp","Tag":"latest"}"#;

        assert_eq!(matching_containers(ps, "MyApp"), vec!["c1", "c2"]);
        assert_eq!(matching_images(images, "MyApp"), vec!["sha9"]);
    }

    #[test]
    fn empty_listing_matches_nothing() {
        assert!(matching_containers("", "app").is_empty());
        assert!(matching_images("\n\n", "app").is_empty());
    }
}
