use std::path::Path;

use crate::config::ProviderConfig;
use crate::error::ConfigError;

/// Load and validate a `ProviderConfig` from a YAML file at `path`.
pub fn load_config(path: &Path) -> Result<ProviderConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let cfg: ProviderConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cluster_id: cluster-a\nscheduler_type: slurm\n").unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.cluster_id, "cluster-a");
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_config(Path::new("/no/such/config.yml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cluster_id: [unterminated").unwrap();
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::YamlParse { .. })));
    }
}
