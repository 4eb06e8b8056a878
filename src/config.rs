use crate::error::{Error, Result};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sam_e_path: String,
    pub sam_d_path: String,

    pub bind: String,
    // a fresh temp directory is created when unset
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,

    pub use_cuda: bool,
    pub cuda_device_id: i32,
    pub intra_threads: usize,

    pub simplify_tolerance: f64,
    pub min_area: f64,

    // `null` keeps sessions until they are ended explicitly
    pub session_idle_ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,

    // rotating shared secrets for /auth
    pub passwords: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sam_e_path: "weights/sam_b-encoder.onnx".to_string(),
            sam_d_path: "weights/sam_b-decoder.onnx".to_string(),

            bind: "0.0.0.0:8000".to_string(),
            upload_dir: None,
            max_upload_bytes: 32 * 1024 * 1024,

            use_cuda: true,
            cuda_device_id: 0,
            intra_threads: 4,

            simplify_tolerance: 1.5,
            min_area: 150.0,

            session_idle_ttl_secs: Some(3600),
            sweep_interval_secs: 60,

            passwords: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Config> {
        let path = Path::new("config.json");
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("No config.json found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let json_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        Self::from_json(&json_content)
    }

    pub fn from_json(json_content: &str) -> Result<Config> {
        let config: Config =
            serde_json::from_str(json_content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn session_idle_ttl(&self) -> Option<Duration> {
        self.session_idle_ttl_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.simplify_tolerance < 0.0 || !self.simplify_tolerance.is_finite() {
            return Err(Error::Config(
                "simplify_tolerance must be a non-negative number".to_string(),
            ));
        }
        if self.min_area < 0.0 || !self.min_area.is_finite() {
            return Err(Error::Config("min_area must be a non-negative number".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "min_area": 10.0, "passwords": ["a", "b"] }"#).unwrap();
        assert_eq!(config.min_area, 10.0);
        assert_eq!(config.passwords, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.simplify_tolerance, 1.5);
        assert_eq!(config.session_idle_ttl(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn null_ttl_disables_eviction() {
        let config = Config::from_json(r#"{ "session_idle_ttl_secs": null }"#).unwrap();
        assert_eq!(config.session_idle_ttl(), None);
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let err = Config::from_json(r#"{ "simplify_tolerance": -1.0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::from_file(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
