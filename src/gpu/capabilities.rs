//! GPU capability structures
//!
//! The vendor decides how scaled modes reach the hardware: Intel (and any
//! driver without the NVIDIA tooling) sets CRTC modes directly, while the
//! proprietary NVIDIA driver pixel-doubles through a metamode.

use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

use super::profiles::ModelProfile;

/// Detected GPU vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    /// Intel integrated graphics, or any open driver
    Intel,

    /// Proprietary NVIDIA driver with `nvidia-settings` available
    Nvidia,
}

impl GpuVendor {
    /// Get a human-readable name for the vendor
    pub fn name(&self) -> &'static str {
        match self {
            Self::Intel => "Intel",
            Self::Nvidia => "NVIDIA",
        }
    }

    /// Configuration path used with this vendor
    pub fn path(&self) -> VendorPath {
        match self {
            Self::Intel => VendorPath::Native,
            Self::Nvidia => VendorPath::PixelDoubling,
        }
    }
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for GpuVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intel" => Ok(Self::Intel),
            "nvidia" => Ok(Self::Nvidia),
            other => Err(format!("unknown GPU vendor: {}", other)),
        }
    }
}

/// How scaled configurations are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VendorPath {
    /// Direct CRTC mode setting at native or halved resolution
    Native,

    /// Vendor metamode with viewport scaling plus compositor scale
    PixelDoubling,
}

impl VendorPath {
    /// Capability string published over D-Bus
    pub fn capability(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::PixelDoubling => "pixel-doubling",
        }
    }

    pub fn is_pixel_doubling(&self) -> bool {
        matches!(self, Self::PixelDoubling)
    }
}

impl std::fmt::Display for VendorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.capability())
    }
}

/// Result of the GPU probe
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// Selected vendor
    pub vendor: GpuVendor,

    /// Hardware model identifier, e.g. "galp3"
    pub model: Option<String>,

    /// Model-specific hints
    pub profile: ModelProfile,

    /// `nvidia` kernel module is loaded
    pub nvidia_module: bool,

    /// Resolved vendor CLI binary
    pub nvidia_settings: Option<PathBuf>,

    /// Vendor was forced by configuration
    pub overridden: bool,
}

impl GpuCapabilities {
    /// Configuration path for the selected vendor
    pub fn path(&self) -> VendorPath {
        self.vendor.path()
    }

    /// Log a summary of detected capabilities
    pub fn log_summary(&self) {
        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║           GPU Capabilities                                 ║");
        info!("╚════════════════════════════════════════════════════════════╝");
        info!(
            "  Vendor: {}{}",
            self.vendor,
            if self.overridden { " (configured)" } else { "" }
        );
        info!("  Path: {}", self.path());
        info!("  Model: {}", self.model.as_deref().unwrap_or("unknown"));
        info!("  nvidia module loaded: {}", self.nvidia_module);
        match &self.nvidia_settings {
            Some(path) => info!("  nvidia-settings: {}", path.display()),
            None => info!("  nvidia-settings: not found"),
        }
        if !self.profile.quirks.is_empty() {
            info!("  Model quirks:");
            for quirk in &self.profile.quirks {
                info!("    - {}", quirk.description());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_paths() {
        assert_eq!(GpuVendor::Intel.path(), VendorPath::Native);
        assert_eq!(GpuVendor::Nvidia.path(), VendorPath::PixelDoubling);
        assert_eq!(VendorPath::Native.capability(), "native");
        assert_eq!(VendorPath::PixelDoubling.capability(), "pixel-doubling");
    }

    #[test]
    fn test_vendor_from_str() {
        assert_eq!("NVIDIA".parse::<GpuVendor>(), Ok(GpuVendor::Nvidia));
        assert_eq!("intel".parse::<GpuVendor>(), Ok(GpuVendor::Intel));
        assert!("amd".parse::<GpuVendor>().is_err());
    }
}
