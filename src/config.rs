use std::{
    env,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::{fs::File, io::AsyncReadExt};

use crate::callback::DEFAULT_PORT;
use crate::client::DEFAULT_BASE_URL;

/// Defaults that apply when neither a flag nor an environment variable is
/// given
#[derive(Debug, PartialEq)]
pub struct Config {
    pub consumer_key: Option<String>,
    pub port: u16,
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            consumer_key: None,
            port: DEFAULT_PORT,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        let path = get_config_home()?.join("pocket").join("config.json");

        match File::open(&path).await {
            Ok(mut file) => Self::load_from_file(&mut file).await,
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("open {}", path.display())),
        }
    }

    async fn load_from_file(file: &mut File) -> Result<Self> {
        let mut dest = Vec::new();
        file.read_to_end(&mut dest).await?;
        Self::from_slice(&dest)
    }

    fn from_slice(bytes: &[u8]) -> Result<Self> {
        let config_file: ConfigFile = serde_json::from_slice(bytes).context("parse config file")?;
        let defaults = Self::default();

        Ok(Config {
            consumer_key: config_file.consumer_key,
            port: config_file.port.unwrap_or(defaults.port),
            base_url: config_file.base_url.unwrap_or(defaults.base_url),
        })
    }
}

fn get_config_home() -> Result<PathBuf> {
    match env::var("XDG_CONFIG_HOME") {
        Ok(path) => Ok(Path::new(&path).to_path_buf()),
        Err(_) => Ok(homedir::my_home()?.context("home dir")?.join(".config")),
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    consumer_key: Option<String>,
    port: Option<u16>,
    base_url: Option<String>,
}
