use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Pick a `config` file format from the file extension (YAML when unknown).
pub fn format_for_path(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    }
}

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format_for_path(config_path),
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(server_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::ResponseHeaderPolicy;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
public_origin: "http://proxy.local:3000"
upstream:
  url: "http://127.0.0.1:8000"
  timeout: "5s"
limits:
  max_request_body_bytes: 4096
inspection:
  builtin_signatures: false
  directives:
    - "rules/a.yaml"
    - "rules/b.yaml"
response_header_policy: all_values
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.upstream.url, "http://127.0.0.1:8000");
        assert_eq!(config.limits.max_request_body_bytes, 4096);
        // unspecified bound keeps its default
        assert_eq!(
            config.limits.max_response_body_bytes,
            crate::config::models::DEFAULT_MAX_BODY_BYTES
        );
        assert!(!config.inspection.builtin_signatures);
        assert_eq!(config.inspection.directives, vec!["rules/a.yaml", "rules/b.yaml"]);
        assert_eq!(config.response_header_policy, ResponseHeaderPolicy::AllValues);
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "listen_addr": "127.0.0.1:3000",
  "upstream": { "url": "http://backend:8080" }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.upstream.timeout, "30s");
        assert!(config.inspection.builtin_signatures);
    }

    #[tokio::test]
    async fn test_load_config_missing_upstream() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "listen_addr = \"127.0.0.1:3000\"\n").unwrap();

        let result = load_config(temp_file.path().to_str().unwrap()).await;
        assert!(result.is_err());
    }
}
