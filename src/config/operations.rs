//! Config loading, validation, and override operations.

use super::model::Config;
use crate::error::{MarklockError, Result};
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(MarklockError::UserError)` - Read/parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            MarklockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| MarklockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    #[cfg(test)]
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            MarklockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `workers` and `runs` must be positive
    /// - coordinator dial/lock timeouts and TTL must be positive
    /// - coordinator `endpoint` must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("workers must be greater than 0"));
        }

        if self.runs == 0 {
            return Err(invalid("runs must be greater than 0"));
        }

        let coordinator = &self.coordinator;
        if coordinator.endpoint.trim().is_empty() {
            return Err(invalid("coordinator.endpoint must be non-empty"));
        }
        if coordinator.dial_timeout_ms == 0 {
            return Err(invalid("coordinator.dial_timeout_ms must be greater than 0"));
        }
        if coordinator.session_ttl_ms == 0 {
            return Err(invalid("coordinator.session_ttl_ms must be greater than 0"));
        }
        if coordinator.lock_wait_ms == 0 {
            return Err(invalid("coordinator.lock_wait_ms must be greater than 0"));
        }
        if let Some(prefix) = &coordinator.key_prefix
            && prefix.is_empty()
        {
            return Err(invalid(
                "coordinator.key_prefix must be non-empty when set (omit it to use the resource name)",
            ));
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> MarklockError {
    MarklockError::UserError(format!("config validation failed: {}", reason))
}
