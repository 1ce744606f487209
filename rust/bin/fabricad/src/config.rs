//! Server configuration file (`/etc/fabrica/<name>.toml`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use purchasing::PurchasingConfig;

/// Directory holding named server contexts.
pub const CONFIG_DIR: &str = "/etc/fabrica";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub root: RootConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub purchasing: PurchasingConfig,
    #[serde(default)]
    pub watchdog: WatchdogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    /// argon2id PHC string of the root password.
    #[serde(default)]
    pub password_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
    #[serde(default = "default_permit_expiry_interval")]
    pub permit_expiry_interval_secs: u64,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            permit_expiry_interval_secs: default_permit_expiry_interval(),
        }
    }
}

fn default_expire_secs() -> u64 {
    86400
}

fn default_permit_expiry_interval() -> u64 {
    60
}

impl ServerConfig {
    /// Resolve `-c` to a file: a path if it looks like one, otherwise a
    /// context name under [`CONFIG_DIR`].
    pub fn resolve_path(arg: &str) -> PathBuf {
        if arg.contains('/') || arg.ends_with(".toml") {
            PathBuf::from(arg)
        } else {
            Path::new(CONFIG_DIR).join(format!("{arg}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_context_name_and_path() {
        assert_eq!(
            ServerConfig::resolve_path("plant-1"),
            PathBuf::from("/etc/fabrica/plant-1.toml")
        );
        assert_eq!(ServerConfig::resolve_path("./dev.toml"), PathBuf::from("./dev.toml"));
        assert_eq!(ServerConfig::resolve_path("dev.toml"), PathBuf::from("dev.toml"));
    }

    #[test]
    fn load_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.toml");
        std::fs::write(
            &path,
            r#"
[root]
password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"

[jwt]
secret = "dev-secret"

[storage]
data_dir = "/tmp/fabrica"

[purchasing]
high_value_threshold_cents = 250000
"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.jwt.expire_secs, 86400);
        assert_eq!(config.storage.data_dir, "/tmp/fabrica");
        assert_eq!(config.purchasing.high_value_threshold_cents, 250_000);
        assert_eq!(config.watchdog.permit_expiry_interval_secs, 60);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ServerConfig::load(Path::new("/nonexistent/fabrica.toml")).is_err());
    }
}
