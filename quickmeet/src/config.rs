//! Engine configuration
//!
//! Every field has a default, so a partial JSON document (or none at all) is a
//! valid configuration. Environment variables override individual fields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::AutomationError;

/// Labels shown on the injected action control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlLabels {
    pub idle: String,
    pub working: String,
    pub success: String,
}

impl Default for ControlLabels {
    fn default() -> Self {
        Self {
            idle: "Save with Meet".to_string(),
            working: "Adding Meet...".to_string(),
            success: "Saved with Meet".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Display name of the conferencing provider, matched in labels and menus
    pub provider_name: String,
    pub poll_interval_ms: u64,
    /// Terminal wait for the attachment to appear
    pub retry_timeout_ms: u64,
    /// Wait for the provider submenu item to render
    pub dropdown_timeout_ms: u64,
    /// Short wait telling an instant direct attach apart from a submenu.
    /// Empirical; tune against the live host.
    pub optimistic_probe_ms: u64,
    /// How long an error label stays before the control returns to idle
    pub error_reset_delay_ms: u64,
    /// Link fragments marking a dormant template rather than a real attachment
    pub placeholder_markers: Vec<String>,
    pub labels: ControlLabels,
    /// Presentation for the demoted commit control when no sibling can be copied
    pub demoted_fallback: BTreeMap<String, String>,
    /// Properties copied from the commit control onto the action control
    pub presentation_properties: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_name: "Google Meet".to_string(),
            poll_interval_ms: 100,
            retry_timeout_ms: 5000,
            dropdown_timeout_ms: 3000,
            optimistic_probe_ms: 500,
            error_reset_delay_ms: 3000,
            placeholder_markers: vec!["xxx-xxxx-xxx".to_string(), "example".to_string()],
            labels: ControlLabels::default(),
            demoted_fallback: BTreeMap::from([
                ("background-color".to_string(), "transparent".to_string()),
                ("color".to_string(), "rgb(26, 115, 232)".to_string()),
                ("border".to_string(), "1px solid rgb(218, 220, 224)".to_string()),
                ("box-shadow".to_string(), "none".to_string()),
            ]),
            presentation_properties: [
                "background-color",
                "height",
                "min-width",
                "padding",
                "border",
                "border-radius",
                "box-shadow",
                "color",
                "font-weight",
                "font-family",
                "font-size",
                "letter-spacing",
                "text-transform",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AutomationError> {
        let config = Self::parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then `QUICKMEET_CONFIG` (a JSON file), then per-field variables.
    pub fn from_env() -> Result<Self, AutomationError> {
        Self::load(None)
    }

    /// Like [`EngineConfig::from_env`], with `path` taking the place of
    /// `QUICKMEET_CONFIG` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, AutomationError> {
        Self::load_with(path, |var| std::env::var(var).ok())
    }

    /// The loading chain over an arbitrary variable source. Validation runs
    /// once, after every layer is applied.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AutomationError> {
        let from_var = lookup("QUICKMEET_CONFIG")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_var) {
            Some(file) => Self::read_file(&file)?,
            None => Self::default(),
        };

        if let Some(provider) = lookup("QUICKMEET_PROVIDER") {
            if !provider.trim().is_empty() {
                config.provider_name = provider.trim().to_string();
            }
        }
        for (var, field) in [
            ("QUICKMEET_POLL_INTERVAL_MS", &mut config.poll_interval_ms),
            ("QUICKMEET_RETRY_TIMEOUT_MS", &mut config.retry_timeout_ms),
            ("QUICKMEET_DROPDOWN_TIMEOUT_MS", &mut config.dropdown_timeout_ms),
            ("QUICKMEET_OPTIMISTIC_PROBE_MS", &mut config.optimistic_probe_ms),
            ("QUICKMEET_ERROR_RESET_MS", &mut config.error_reset_delay_ms),
        ] {
            if let Some(raw) = lookup(var) {
                *field = raw
                    .trim()
                    .parse()
                    .map_err(|e| AutomationError::Config(format!("{var}={raw:?}: {e}")))?;
                debug!(var, value = *field, "config override from environment");
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn parse_json(json: &str) -> Result<Self, AutomationError> {
        serde_json::from_str(json)
            .map_err(|e| AutomationError::Config(format!("invalid config JSON: {e}")))
    }

    fn read_file(path: &Path) -> Result<Self, AutomationError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "loading config file");
        Self::parse_json(&raw)
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.provider_name.trim().is_empty() {
            return Err(AutomationError::Config("providerName must not be empty".into()));
        }
        if self.retry_timeout_ms == 0 {
            return Err(AutomationError::Config("retryTimeoutMs must be positive".into()));
        }
        if self.optimistic_probe_ms >= self.retry_timeout_ms {
            return Err(AutomationError::Config(format!(
                "optimisticProbeMs ({}) must be shorter than retryTimeoutMs ({})",
                self.optimistic_probe_ms, self.retry_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }

    pub fn dropdown_timeout(&self) -> Duration {
        Duration::from_millis(self.dropdown_timeout_ms)
    }

    pub fn optimistic_probe(&self) -> Duration {
        Duration::from_millis(self.optimistic_probe_ms)
    }

    pub fn error_reset_delay(&self) -> Duration {
        Duration::from_millis(self.error_reset_delay_ms)
    }
}
