//! Configuration loading.
//!
//! `GrapnelConfig` is read from `<config_dir>/grapnel/config.json`. A missing
//! file yields defaults. A few values can be overridden from the
//! environment so secrets need not live in the file.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use grapnel_core::GrapnelConfig;

use crate::error::StoreError;
use crate::persistence::default_config_path;

/// Overrides the account id.
pub const ENV_ACCOUNT: &str = "GRAPNEL_ACCOUNT";
/// Overrides the TOTP secret.
pub const ENV_TOTP_SECRET: &str = "GRAPNEL_TOTP_SECRET";
/// Overrides the credential storage directory.
pub const ENV_STORAGE_DIR: &str = "GRAPNEL_STORAGE_DIR";

/// Loads configuration from the default path with environment overrides.
pub fn load_config() -> Result<GrapnelConfig, StoreError> {
    let mut config = load_config_from(&default_config_path())?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Loads configuration from a specific path. Environment is not consulted.
pub fn load_config_from(path: &Path) -> Result<GrapnelConfig, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(GrapnelConfig::default());
        }
        Err(e) => return Err(e.into()),
    };

    let config: GrapnelConfig = serde_json::from_str(&content)?;
    validate(&config)?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Applies environment overrides through `lookup`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut GrapnelConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(account) = get(ENV_ACCOUNT) {
        debug!(var = ENV_ACCOUNT, "Account overridden from environment");
        config.account = Some(account);
    }
    if let Some(secret) = get(ENV_TOTP_SECRET) {
        debug!(var = ENV_TOTP_SECRET, "TOTP secret overridden from environment");
        config.two_factor.totp_secret = Some(secret);
    }
    if let Some(dir) = get(ENV_STORAGE_DIR) {
        debug!(var = ENV_STORAGE_DIR, "Storage directory overridden from environment");
        config.storage_dir = Some(PathBuf::from(dir));
    }
}

fn validate(config: &GrapnelConfig) -> Result<(), StoreError> {
    config
        .validate()
        .map_err(|e| StoreError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ACCOUNT, "alice"),
            (ENV_TOTP_SECRET, "GEZDGNBVGY3TQOJQ"),
            (ENV_STORAGE_DIR, ""),
        ]
        .into_iter()
        .collect();

        let mut config = GrapnelConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.account.as_deref(), Some("alice"));
        assert_eq!(config.two_factor.totp_secret.as_deref(), Some("GEZDGNBVGY3TQOJQ"));
        assert_eq!(config.storage_dir, None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config_from(Path::new("/nonexistent/grapnel/config.json")).unwrap();
        assert_eq!(config, GrapnelConfig::default());
    }
}
