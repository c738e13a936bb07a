use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::locate;
use crate::pipeline::StoreLocations;
use crate::recover::RecoveryBackendKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_id: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub webkit_history_path: Option<PathBuf>,
    #[serde(default)]
    pub gecko_profiles_root: Option<PathBuf>,
    pub gecko_store_file_name: String,
    pub recovery_backend: RecoveryBackendKind,
    pub sqlite_binary: PathBuf,
    pub error_log_path: PathBuf,
    pub keep_working_files: bool,
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Config {
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("histsalvage"))
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Configured store locations, falling back to the platform defaults.
    pub fn store_locations(&self) -> StoreLocations {
        StoreLocations {
            webkit_history: self
                .webkit_history_path
                .clone()
                .or_else(locate::default_webkit_history_path),
            gecko_profiles_root: self
                .gecko_profiles_root
                .clone()
                .or_else(locate::default_gecko_profiles_root),
            gecko_store_file_name: self.gecko_store_file_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{:08x}", now.format("%Y%m%dT%H%M%SZ"), now.timestamp_subsec_nanos())
}
