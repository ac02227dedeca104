use crate::cache::CacheSettings;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::time::Duration;
use std::{env, fs, path};

const CONFIG_PATH_VAR: &str = "PAGECACHE_CFG_PATH";
const REDIS_ADDR_VAR: &str = "REDIS_ADDR";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "redis_addr_default")]
    pub redis_addr: String,
    #[serde(default = "pool_size_default")]
    pub pool_size: u32,
    #[serde(default = "ttl_secs_default")]
    pub ttl_secs: u64,
    #[serde(default = "coalesce_default")]
    pub coalesce: bool,
    #[serde(default = "fetch_timeout_secs_default")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "log_level_default")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_addr: redis_addr_default(),
            pool_size: pool_size_default(),
            ttl_secs: ttl_secs_default(),
            coalesce: coalesce_default(),
            fetch_timeout_secs: fetch_timeout_secs_default(),
            log_level: log_level_default(),
        }
    }
}

impl Config {
    fn get_config_dir() -> anyhow::Result<path::PathBuf> {
        let config_dir = if let Ok(xdg_path) = env::var("XDG_CONFIG_HOME") {
            path::PathBuf::from(&xdg_path)
        } else {
            let home = env::var("HOME").with_context(|| "neither XDG_CONFIG_HOME nor HOME is set")?;
            path::Path::new(&home).join(".config")
        };

        Ok(config_dir.join("pagecache"))
    }

    /// Resolve the configuration file and load it.
    ///
    /// An explicitly requested file (argument or `PAGECACHE_CFG_PATH`) must exist. The default
    /// `pagecache/config.toml` under the user config directory is optional. `REDIS_ADDR` from the
    /// environment overrides the file.
    pub fn load(explicit: Option<&path::Path>) -> anyhow::Result<Self> {
        let explicit = explicit
            .map(path::Path::to_path_buf)
            .or_else(|| env::var(CONFIG_PATH_VAR).ok().map(path::PathBuf::from));

        let mut config = match explicit {
            Some(file_path) => Self::from_path(&file_path)?,
            None => {
                let file_path = Self::get_config_dir()
                    .with_context(|| "fail to locate config directory")?
                    .join("config.toml");
                if file_path.exists() {
                    Self::from_path(&file_path)?
                } else {
                    tracing::debug!("no config file at {file_path:?}, using defaults");
                    Self::default()
                }
            }
        };

        if let Ok(addr) = env::var(REDIS_ADDR_VAR) {
            config.redis_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_path(file_path: &path::Path) -> anyhow::Result<Self> {
        if !file_path.exists() {
            anyhow::bail!("Config file not found in {file_path:?}");
        }
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("fail to read config file {file_path:?}"))?;

        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.ttl_secs()?;
        if self.pool_size == 0 {
            anyhow::bail!("`pool_size` must be at least 1");
        }
        self.log_level
            .parse::<tracing::Level>()
            .with_context(|| format!("invalid `log_level`: {}", self.log_level))?;
        Ok(())
    }

    fn ttl_secs(&self) -> anyhow::Result<NonZeroU64> {
        NonZeroU64::new(self.ttl_secs).with_context(|| "`ttl_secs` must be at least 1")
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_settings(&self) -> anyhow::Result<CacheSettings> {
        Ok(CacheSettings::builder()
            .ttl_secs(self.ttl_secs()?)
            .coalesce(self.coalesce)
            .build())
    }
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).with_context(|| "fail to parse config from toml")
    }
}

fn redis_addr_default() -> String {
    "redis://localhost:6379".to_string()
}

fn pool_size_default() -> u32 {
    8
}

fn ttl_secs_default() -> u64 {
    10
}

fn coalesce_default() -> bool {
    true
}

fn fetch_timeout_secs_default() -> u64 {
    30
}

fn log_level_default() -> String {
    "INFO".to_string()
}

#[test]
fn validate_file_correctness() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let config = r#"
        redis_addr = "redis://localhost"
        pool_size = 4
        ttl_secs = 60
        coalesce = false
        fetch_timeout_secs = 5
        log_level = "DEBUG"
    "#;
    fs::write(&path, config).unwrap();

    let config = Config::from_path(&path).unwrap();
    assert_eq!(config.redis_addr, "redis://localhost");
    assert_eq!(config.pool_size, 4);
    assert_eq!(config.fetch_timeout(), Duration::from_secs(5));

    let settings = config.cache_settings().unwrap();
    assert_eq!(settings.ttl(), Duration::from_secs(60));
    assert!(!settings.coalesce);
}

#[test]
fn empty_file_uses_defaults() {
    let config: Config = "".parse().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.ttl(), Duration::from_secs(10));
    assert_eq!(config.redis_addr, "redis://localhost:6379");
    assert!(config.cache_settings().unwrap().coalesce);
}

#[test]
fn reject_zero_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "ttl_secs = 0").unwrap();

    let err = Config::from_path(&path).unwrap_err();
    assert!(err.to_string().contains("ttl_secs"));
}

#[test]
fn zero_ttl_never_reaches_the_cache() {
    let config = Config {
        ttl_secs: 0,
        ..Config::default()
    };
    let err = config.cache_settings().unwrap_err();
    assert!(err.to_string().contains("ttl_secs"));
}

#[test]
fn reject_unknown_log_level() {
    let config: Config = r#"log_level = "LOUD""#.parse().unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
}
