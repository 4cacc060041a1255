//! CAP dialog engine configuration

use crate::cap::CapApplicationContext;
use crate::dialog::DialogSettings;
use crate::errors::CapError;
use crate::types::ServiceRole;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix for layered configuration
pub const ENV_PREFIX: &str = "BRIVAS_CAP";

/// Complete CAP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapConfig {
    /// Role of the local node in the call model
    pub role: ServiceRole,
    /// Application context used when opening dialogs
    pub application_context: CapApplicationContext,
    pub dialog: DialogConfig,
    pub registry: RegistryConfig,
    pub tcap: TcapConfig,
    pub logging: LoggingConfig,
}

/// Dialog engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Invoke timeout applied when an add call gives none (ms)
    pub default_invoke_timeout_ms: u64,
    /// Interval of the invoke expiry sweep (ms)
    pub sweep_interval_ms: u64,
    /// How long a terminated dialog stays inspectable (ms)
    pub retain_terminated_ms: u64,
    pub invoke_id_min: i8,
    pub invoke_id_max: i8,
}

/// Network resource registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub name: String,
    /// Directory of the persisted state; in-memory only when unset
    pub persist_dir: Option<PathBuf>,
}

/// TCAP sublayer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcapConfig {
    /// Capacity of the outbound message queue
    pub outbound_queue: usize,
    pub local_ssn: u8,
    pub local_point_code: u32,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for CapConfig {
    fn default() -> Self {
        Self {
            role: ServiceRole::GsmSsf,
            application_context: CapApplicationContext::Phase2,
            dialog: DialogConfig::default(),
            registry: RegistryConfig::default(),
            tcap: TcapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            default_invoke_timeout_ms: 10_000,
            sweep_interval_ms: 500,
            retain_terminated_ms: 30_000,
            invoke_id_min: 0,
            invoke_id_max: 127,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "cap".to_string(),
            persist_dir: None,
        }
    }
}

impl Default for TcapConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 1024,
            local_ssn: 147, // gsmSSF
            local_point_code: 1001,
        }
    }
}

impl CapConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self, CapError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| CapError::Config(e.to_string()))?;

        let config: Self =
            serde_json::from_str(&content).map_err(|e| CapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Layered load: optional file, then `BRIVAS_CAP__SECTION__KEY` environment overrides
    pub fn load(path: Option<&str>) -> Result<Self, CapError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CapError> {
        if self.dialog.invoke_id_min > self.dialog.invoke_id_max {
            return Err(CapError::Config(format!(
                "invoke id range {}..={} is empty",
                self.dialog.invoke_id_min, self.dialog.invoke_id_max
            )));
        }
        if self.dialog.default_invoke_timeout_ms == 0 {
            return Err(CapError::Config("default invoke timeout must be positive".to_string()));
        }
        if self.dialog.sweep_interval_ms == 0 {
            return Err(CapError::Config("sweep interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Get default invoke timeout as Duration
    pub fn default_invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.dialog.default_invoke_timeout_ms)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.dialog.sweep_interval_ms)
    }

    pub fn retain_terminated(&self) -> Duration {
        Duration::from_millis(self.dialog.retain_terminated_ms)
    }

    pub fn dialog_settings(&self) -> DialogSettings {
        DialogSettings {
            default_timeout: self.default_invoke_timeout(),
            invoke_id_min: self.dialog.invoke_id_min,
            invoke_id_max: self.dialog.invoke_id_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_invoke_timeout(), Duration::from_secs(10));
        assert_eq!(config.dialog_settings().invoke_id_max, 127);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"role": "gsm_scf", "dialog": {{"default_invoke_timeout_ms": 2500}}}}"#
        )
        .unwrap();

        let config = CapConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.role, ServiceRole::GsmScf);
        assert_eq!(config.default_invoke_timeout(), Duration::from_millis(2500));
        assert_eq!(config.dialog.invoke_id_max, 127);
        assert_eq!(config.application_context, CapApplicationContext::Phase2);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let mut config = CapConfig::default();
        config.dialog.invoke_id_min = 10;
        config.dialog.invoke_id_max = 5;
        assert!(matches!(config.validate(), Err(CapError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            CapConfig::from_file("/nonexistent/brivas-cap.json"),
            Err(CapError::Config(_))
        ));
    }
}
