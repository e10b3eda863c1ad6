use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Ambient configuration. Everything has a sensible default; env vars
/// override for deployments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the local sandbox backend.
    pub sandbox_root: PathBuf,
    /// Base URL of the remote snapshot store, when one is configured.
    pub store_base_url: Option<String>,
    /// Columns past a suggestion's anchor within which it is still offered.
    pub suggestion_tolerance: u32,
    /// Post-accept window during which the same suggestion is not re-offered.
    pub accept_cooldown: Duration,
    /// Attempts per mirror step before degrading to a warning.
    pub mirror_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox_root: std::env::temp_dir().join("sandpit"),
            store_base_url: None,
            suggestion_tolerance: 2,
            accept_cooldown: Duration::from_secs(1),
            mirror_attempts: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("SANDPIT_SANDBOX_ROOT") {
            if !root.trim().is_empty() {
                config.sandbox_root = PathBuf::from(root.trim());
            }
        }
        if let Ok(url) = std::env::var("SANDPIT_STORE_URL") {
            if !url.trim().is_empty() {
                config.store_base_url = Some(url.trim().to_string());
            }
        }
        if let Ok(attempts) = std::env::var("SANDPIT_MIRROR_ATTEMPTS") {
            if let Ok(parsed) = attempts.trim().parse::<u32>() {
                config.mirror_attempts = parsed.max(1);
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = Config::default();
        assert!(config.store_base_url.is_none());
        assert_eq!(config.suggestion_tolerance, 2);
        assert_eq!(config.mirror_attempts, 3);
        assert_eq!(config.accept_cooldown, Duration::from_secs(1));
    }
}
