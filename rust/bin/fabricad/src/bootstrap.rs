//! First-start checks.
//!
//! The server refuses to start without a root password hash, a JWT secret
//! and a data directory.

use crate::config::ServerConfig;

/// Verify server configuration is ready for production use.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.root.password_hash.is_empty() {
        anyhow::bail!(
            "No root password hash found in configuration.\n\
             Set [root] password_hash to an argon2id PHC string."
        );
    }
    if config.jwt.secret.is_empty() {
        anyhow::bail!("JWT secret is empty in configuration.");
    }
    if config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    if config.purchasing.high_value_threshold_cents < 0 {
        anyhow::bail!("purchasing.high_value_threshold_cents must not be negative.");
    }
    Ok(())
}
