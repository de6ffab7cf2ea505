//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// X display to connect to (None = `$DISPLAY`)
    #[serde(default)]
    pub display: Option<String>,

    /// Delay before polling after a RandR event, in milliseconds
    #[serde(default = "default_event_settle_ms")]
    pub event_settle_ms: u64,
}

fn default_event_settle_ms() -> u64 {
    100
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            display: None,
            event_settle_ms: default_event_settle_ms(),
        }
    }
}

/// Lid sensing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LidConfig {
    /// Directory holding one subdirectory per lid, each with a `state` file
    pub root: PathBuf,

    /// Settle delay after the lid opens, in milliseconds
    #[serde(default = "default_lid_settle_ms")]
    pub settle_ms: u64,

    /// acpid event socket
    pub acpid_socket: PathBuf,
}

fn default_lid_settle_ms() -> u64 {
    1000
}

impl Default for LidConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(crate::topology::lid::DEFAULT_LID_ROOT),
            settle_ms: default_lid_settle_ms(),
            acpid_socket: PathBuf::from(crate::daemon::listeners::ACPID_SOCKET),
        }
    }
}

/// GPU detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Vendor override ("auto", "intel", "nvidia")
    pub vendor: String,

    /// Hardware model override (None = read `model_file`)
    #[serde(default)]
    pub model: Option<String>,

    /// DMI file with the hardware model
    pub model_file: PathBuf,

    /// Kernel module list
    pub modules_file: PathBuf,

    /// NVIDIA settings CLI
    pub nvidia_settings: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            vendor: "auto".to_string(),
            model: None,
            model_file: PathBuf::from("/sys/class/dmi/id/product_version"),
            modules_file: PathBuf::from("/proc/modules"),
            nvidia_settings: "nvidia-settings".to_string(),
        }
    }
}

/// Preference store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// GSettings schema with the `enable` and `mode` keys
    pub schema: String,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            schema: "com.system76.hidpi".to_string(),
        }
    }
}

/// Compositor scale configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// GSettings schema holding the scale
    pub scale_schema: String,

    /// Integer scale key
    pub scale_key: String,

    /// Wait after a scale change before committing, in milliseconds
    #[serde(default = "default_scale_settle_ms")]
    pub settle_ms: u64,
}

fn default_scale_settle_ms() -> u64 {
    100
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            scale_schema: "org.gnome.desktop.interface".to_string(),
            scale_key: "scaling-factor".to_string(),
            settle_ms: default_scale_settle_ms(),
        }
    }
}

/// Persisted layout configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// monitors.xml to read (None = user config directory)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Primary display prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Ask before switching a low-density primary display
    pub enabled: bool,

    /// Dialog binary printing a GTK response code
    pub binary: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "/usr/lib/hidpi-daemon/prime-dialog".to_string(),
        }
    }
}

/// D-Bus state notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Serve the state interface on the session bus
    pub enabled: bool,

    /// Well-known bus name
    pub bus_name: String,

    /// Object path of the state interface
    pub object_path: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bus_name: crate::session::notify::BUS_NAME.to_string(),
            object_path: crate::session::notify::OBJECT_PATH.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for log files (None = console only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
