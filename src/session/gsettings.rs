//! GSettings-backed preference store and compositor scale

use tracing::debug;

use super::{run, PreferenceStore, Result, ScaleControl, SessionError};
use crate::scaling::PreferredMode;

const GSETTINGS: &str = "gsettings";

/// Strip GVariant quoting from a `gsettings get` string value
fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SessionError::Parse {
            what: "boolean setting",
            value: other.to_string(),
        }),
    }
}

/// Parse `uint32 2` (or a bare `2`)
fn parse_uint(value: &str) -> Result<u32> {
    let value = value.trim();
    let number = value.strip_prefix("uint32 ").unwrap_or(value);
    number.parse().map_err(|_| SessionError::Parse {
        what: "integer setting",
        value: value.to_string(),
    })
}

/// `enable` and `mode` keys of the daemon's schema
#[derive(Debug, Clone)]
pub struct GSettingsPreferences {
    schema: String,
}

impl GSettingsPreferences {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl PreferenceStore for GSettingsPreferences {
    fn enabled(&self) -> Result<bool> {
        parse_bool(&run(GSETTINGS, &["get", &self.schema, "enable"])?)
    }

    fn mode(&self) -> Result<PreferredMode> {
        let raw = run(GSETTINGS, &["get", &self.schema, "mode"])?;
        unquote(&raw).parse().map_err(|_| SessionError::Parse {
            what: "mode setting",
            value: raw.trim().to_string(),
        })
    }

    fn set_mode(&mut self, mode: PreferredMode) -> Result<()> {
        debug!("Storing mode preference {}", mode);
        run(GSETTINGS, &["set", &self.schema, "mode", mode.as_str()]).map(|_| ())
    }
}

/// Compositor scale through an integer GSettings key
#[derive(Debug, Clone)]
pub struct GSettingsScale {
    schema: String,
    key: String,
}

impl GSettingsScale {
    pub fn new(schema: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            key: key.into(),
        }
    }
}

impl ScaleControl for GSettingsScale {
    fn get_scale(&self) -> Result<u32> {
        parse_uint(&run(GSETTINGS, &["get", &self.schema, &self.key])?)
    }

    fn set_scale(&mut self, scale: u32) -> Result<()> {
        debug!("Setting compositor scale to {}", scale);
        let value = format!("uint32 {}", scale);
        run(GSETTINGS, &["set", &self.schema, &self.key, &value]).map(|_| ())
    }
}
