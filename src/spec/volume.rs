// ABOUTME: Volume spec parsing for the "external:internal:mode" short form.
// ABOUTME: Also renders specs back into daemon bind strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A parsed volume declaration.
///
/// `external` is the host-side path or named volume; absent for anonymous
/// data volumes. `mode` is `rw` or `ro`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub external: Option<String>,
    pub internal: String,
    pub mode: String,
}

impl VolumeSpec {
    /// Replace the external side, keeping internal path and mode.
    pub fn with_external(&self, external: impl Into<String>) -> Self {
        Self {
            external: Some(external.into()),
            internal: self.internal.clone(),
            mode: self.mode.clone(),
        }
    }

    /// Render as the daemon's bind form, `external:internal:mode`.
    /// Only meaningful when an external side is present.
    pub fn to_bind(&self) -> Option<String> {
        self.external
            .as_ref()
            .map(|ext| format!("{}:{}:{}", ext, self.internal, self.mode))
    }
}

impl fmt::Display for VolumeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external {
            Some(ext) => write!(f, "{}:{}:{}", ext, self.internal, self.mode),
            None => write!(f, "{}", self.internal),
        }
    }
}

/// Parse `[external:]internal[:mode]`.
pub fn parse_volume_spec(config: &str) -> Result<VolumeSpec, ConfigError> {
    let parts: Vec<&str> = config.split(':').collect();
    if parts.len() > 3 {
        return Err(ConfigError::VolumeFormat(config.to_string()));
    }

    if parts.len() == 1 {
        return Ok(VolumeSpec {
            external: None,
            internal: parts[0].to_string(),
            mode: "rw".to_string(),
        });
    }

    let mode = if parts.len() == 3 { parts[2] } else { "rw" };
    if mode != "rw" && mode != "ro" {
        return Err(ConfigError::VolumeMode {
            spec: config.to_string(),
            mode: mode.to_string(),
        });
    }

    Ok(VolumeSpec {
        external: Some(parts[0].to_string()),
        internal: parts[1].to_string(),
        mode: mode.to_string(),
    })
}
