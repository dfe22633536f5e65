use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_BATCH_SIZE;
use crate::error::SeekerError;
use crate::ncbi::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::store;

pub const DEFAULT_CONFIG_FILE: &str = "mlst-seeker.json";
pub const DEFAULT_WORK_DIR: &str = "mlst-seeker-work";
pub const CACHE_DIR_ENV: &str = "MLST_SEEKER_CACHE_DIR";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub mlst_path: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_base_url: String,
    pub cache_dir: Utf8PathBuf,
    pub work_dir: PathBuf,
    pub mlst_path: Option<PathBuf>,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl ResolvedConfig {
    pub fn genome_dir(&self) -> PathBuf {
        self.work_dir.join("genomes")
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SeekerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| SeekerError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| SeekerError::ConfigParse(err.to_string()))?
        };

        let env_cache_dir = std::env::var(CACHE_DIR_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self::resolve_config(config, env_cache_dir)
    }

    pub fn resolve_config(
        config: Config,
        env_cache_dir: Option<String>,
    ) -> Result<ResolvedConfig, SeekerError> {
        let cache_dir = match env_cache_dir.or(config.cache_dir) {
            Some(dir) => Utf8PathBuf::from(dir),
            None => store::default_cache_root()?,
        };
        let batch_size = match config.batch_size {
            Some(0) => {
                return Err(SeekerError::ConfigParse(
                    "batch_size must be at least 1".to_string(),
                ));
            }
            Some(size) => size,
            None => DEFAULT_BATCH_SIZE,
        };

        Ok(ResolvedConfig {
            api_base_url: config
                .api_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            cache_dir,
            work_dir: PathBuf::from(
                config
                    .work_dir
                    .unwrap_or_else(|| DEFAULT_WORK_DIR.to_string()),
            ),
            mlst_path: config.mlst_path.map(PathBuf::from),
            batch_size,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}
