//! Configuration service.
//!
//! Loads `regflow.toml` (by default from `~/.config/regflow/`), validates it
//! and writes the starter template for `init-config`.

use crate::paths::RegflowPaths;
use crate::storage::AtomicTomlFile;
use regflow_core::config::AppConfig;
use regflow_core::error::{RegflowError, Result};
use std::path::{Path, PathBuf};

/// Values shipped in the starter template. A config still carrying any of
/// them has not been filled in.
const PLACEHOLDER_USERNAME: &str = "your_email@gmail.com";
const PLACEHOLDER_PASSWORD: &str = "your_app_password";
const PLACEHOLDER_DOMAINS: &[&str] = &["yourdomain.com", "anotherdomain.com"];

const RELAY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `--config` when given, the platform config file otherwise.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        match explicit {
            Some(path) => Ok(Self::new(path)),
            None => RegflowPaths::config_file()
                .map(Self::new)
                .map_err(|e| RegflowError::config(e.to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the configuration file. A missing or empty file is a
    /// configuration error.
    pub fn load(&self) -> Result<AppConfig> {
        AtomicTomlFile::<AppConfig>::new(self.path.clone())
            .load()?
            .ok_or_else(|| {
                RegflowError::config(format!(
                    "no configuration at {:?}; run `regflow init-config` first",
                    self.path
                ))
            })
    }

    /// Loads and validates.
    pub fn load_validated(&self) -> Result<AppConfig> {
        let config = self.load()?;
        Self::validate(&config)?;
        tracing::info!("Loaded configuration from {:?}", self.path);
        Ok(config)
    }

    /// Writes the starter template. Refuses to overwrite unless `force`.
    pub fn init(&self, force: bool) -> Result<()> {
        if self.path.exists() && !force {
            return Err(RegflowError::config(format!(
                "{:?} already exists (use --force to overwrite)",
                self.path
            )));
        }
        AtomicTomlFile::new(self.path.clone()).save(&Self::template())?;
        tracing::info!("Wrote configuration template to {:?}", self.path);
        Ok(())
    }

    /// Starter configuration with obvious placeholders.
    pub fn template() -> AppConfig {
        let mut config = AppConfig::default();
        config.mailbox.username = PLACEHOLDER_USERNAME.to_string();
        config.mailbox.password = PLACEHOLDER_PASSWORD.to_string();
        config.identity.domains = PLACEHOLDER_DOMAINS.iter().map(|d| d.to_string()).collect();
        config
    }

    /// Rejects configurations no flow could succeed with.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: configuration usable
    /// - `Err(Configuration)`: first problem found
    pub fn validate(config: &AppConfig) -> Result<()> {
        validate_endpoint("endpoints.form_submit", &config.endpoints.form_submit)?;
        validate_endpoint("endpoints.form_submit_geo", &config.endpoints.form_submit_geo)?;

        let mailbox = &config.mailbox;
        if mailbox.username.trim() == PLACEHOLDER_USERNAME
            || mailbox.password.trim() == PLACEHOLDER_PASSWORD
        {
            return Err(RegflowError::config(
                "mailbox credentials are still the template placeholders",
            ));
        }
        if !mailbox.username.trim().is_empty() && mailbox.password.is_empty() {
            return Err(RegflowError::config("mailbox.password is empty"));
        }

        if let Some(domain) = config
            .identity
            .domains
            .iter()
            .find(|d| PLACEHOLDER_DOMAINS.contains(&d.trim().to_ascii_lowercase().as_str()))
        {
            return Err(RegflowError::config(format!(
                "identity.domains still contains placeholder '{domain}'"
            )));
        }

        if !RELAY_SCHEMES.contains(&config.relay.scheme.to_ascii_lowercase().as_str()) {
            return Err(RegflowError::config(format!(
                "relay.scheme '{}' is not one of {}",
                config.relay.scheme,
                RELAY_SCHEMES.join(", ")
            )));
        }

        let non_zero = [
            ("transport.timeout_secs", config.transport.timeout_secs),
            ("mailbox.poll_interval_secs", mailbox.poll_interval_secs),
            ("mailbox.deadline_secs", mailbox.deadline_secs),
            ("batch.concurrency", config.batch.concurrency as u64),
            ("batch.max_attempts", u64::from(config.batch.max_attempts)),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(RegflowError::config(format!("{name} must be greater than 0")));
        }

        Ok(())
    }

    /// Extra checks when identities are generated rather than listed: codes
    /// land in the shared mailbox, so it must be configured.
    pub fn validate_for_generation(config: &AppConfig) -> Result<()> {
        if config.identity.domains.iter().all(|d| d.trim().is_empty()) {
            return Err(RegflowError::config(
                "identity.domains is empty; add a domain or pass --identities",
            ));
        }
        if config.mailbox.credentials().is_none() {
            return Err(RegflowError::config(
                "mailbox.username is required for generated identities",
            ));
        }
        Ok(())
    }
}

fn validate_endpoint(name: &str, url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RegflowError::config(format!("{name} is not set")));
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| RegflowError::config(format!("{name} must be an http(s) URL")))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(RegflowError::config(format!("{name} has no host")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.endpoints.form_submit = "https://auth.example.test/submit".into();
        config.endpoints.form_submit_geo = "https://geo.example.test/submit".into();
        config.mailbox.username = "catchall@example.com".into();
        config.mailbox.password = "secret".into();
        config.identity.domains = vec!["example.com".into()];
        config
    }

    #[test]
    fn test_valid_config_passes() {
        ConfigService::validate(&valid()).unwrap();
        ConfigService::validate_for_generation(&valid()).unwrap();
    }

    #[test]
    fn test_template_is_rejected() {
        let mut template = ConfigService::template();
        template.endpoints = valid().endpoints;
        let err = ConfigService::validate(&template).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_placeholder_domain_rejected() {
        let mut config = valid();
        config.identity.domains.push("AnotherDomain.com".into());
        assert!(ConfigService::validate(&config).is_err());
    }

    #[test]
    fn test_endpoint_checks() {
        let mut config = valid();
        config.endpoints.form_submit = String::new();
        assert!(ConfigService::validate(&config).unwrap_err().to_string().contains("not set"));

        config.endpoints.form_submit = "ftp://example.test".into();
        assert!(ConfigService::validate(&config).unwrap_err().to_string().contains("http(s)"));

        config.endpoints.form_submit = "http:///path".into();
        assert!(ConfigService::validate(&config).is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = valid();
        config.batch.concurrency = 0;
        assert!(ConfigService::validate(&config)
            .unwrap_err()
            .to_string()
            .contains("batch.concurrency"));

        let mut config = valid();
        config.mailbox.deadline_secs = 0;
        assert!(ConfigService::validate(&config).is_err());
    }

    #[test]
    fn test_unknown_relay_scheme_rejected() {
        let mut config = valid();
        config.relay.scheme = "gopher".into();
        assert!(ConfigService::validate(&config).is_err());
    }

    #[test]
    fn test_generation_needs_shared_mailbox() {
        let mut config = valid();
        config.mailbox.username = String::new();
        config.mailbox.password = String::new();
        ConfigService::validate(&config).unwrap();
        assert!(ConfigService::validate_for_generation(&config).is_err());
    }

    #[test]
    fn test_init_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(temp_dir.path().join("regflow.toml"));

        assert!(service.load().unwrap_err().is_config());

        service.init(false).unwrap();
        let loaded = service.load().unwrap();
        assert_eq!(loaded.mailbox.username, PLACEHOLDER_USERNAME);
        assert!(service.load_validated().is_err());

        assert!(service.init(false).is_err());
        service.init(true).unwrap();
    }
}
