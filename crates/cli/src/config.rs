//! On-disk CLI configuration, loaded from `lispc.toml` if present.

use std::path::Path;

use serde::Deserialize;

/// Tunables that only matter at the embedder boundary (stack sizing,
/// default log level); language semantics have no configuration surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub data_stack_capacity: usize,
    pub frame_capacity: usize,
    pub log_level: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig { data_stack_capacity: 1024, frame_capacity: 64, log_level: "warn".to_string() }
    }
}

impl CliConfig {
    /// Load `path` if it exists; a missing file is not an error, since most
    /// invocations rely entirely on defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(CliConfig::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| format!("reading {path:?}: {e}"))?;
        toml::from_str(&text).map_err(|e| format!("parsing {path:?}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = CliConfig::load(Path::new("/nonexistent/lispc.toml")).unwrap();
        assert_eq!(config.data_stack_capacity, 1024);
    }

    #[test]
    fn partial_toml_fills_in_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lispc.toml");
        std::fs::write(&path, "frame_capacity = 128\n").unwrap();
        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.frame_capacity, 128);
        assert_eq!(config.data_stack_capacity, 1024);
    }
}
