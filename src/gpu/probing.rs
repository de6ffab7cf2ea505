//! GPU detection and capability probing
//!
//! Vendor selection order:
//! 1. Explicit `gpu.vendor` in the configuration
//! 2. The model profile's vendor hint
//! 3. NVIDIA when the `nvidia` kernel module is loaded and `nvidia-settings`
//!    is on `PATH`
//! 4. Intel otherwise

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::capabilities::{GpuCapabilities, GpuVendor};
use super::profiles::{profile_for, ModelProfile};
use crate::config::GpuConfig;

/// Probe the GPU and pick the configuration path
pub fn probe_gpu(config: &GpuConfig) -> GpuCapabilities {
    info!("Probing GPU capabilities...");

    let model = config
        .model
        .clone()
        .or_else(|| detect_model(&config.model_file));
    let profile = profile_for(model.as_deref());
    if model.is_some() && !profile.needs_autoscaling {
        info!(
            "Model {} is not a known high-density model, continuing anyway",
            model.as_deref().unwrap_or_default()
        );
    }

    let nvidia_module = nvidia_module_loaded(&config.modules_file);
    let nvidia_settings = find_in_path(&config.nvidia_settings);
    debug!(
        "nvidia module: {}, {}: {:?}",
        nvidia_module, config.nvidia_settings, nvidia_settings
    );

    let configured = match config.vendor.as_str() {
        "" | "auto" => None,
        value => match value.parse::<GpuVendor>() {
            Ok(vendor) => Some(vendor),
            Err(e) => {
                warn!("Ignoring gpu.vendor: {}", e);
                None
            }
        },
    };

    let vendor = configured.unwrap_or_else(|| {
        select_vendor(&profile, nvidia_module, nvidia_settings.is_some())
    });

    let capabilities = GpuCapabilities {
        vendor,
        model,
        profile,
        nvidia_module,
        nvidia_settings,
        overridden: configured.is_some(),
    };
    capabilities.log_summary();
    capabilities
}

/// Vendor from the model hint and driver state
pub fn select_vendor(profile: &ModelProfile, nvidia_module: bool, cli_found: bool) -> GpuVendor {
    if let Some(vendor) = profile.vendor_hint {
        return vendor;
    }
    if nvidia_module && cli_found {
        GpuVendor::Nvidia
    } else {
        GpuVendor::Intel
    }
}

/// Read the model identifier from DMI
pub fn detect_model(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let model = content.trim();
            (!model.is_empty()).then(|| model.to_string())
        }
        Err(e) => {
            debug!("Cannot read model from {}: {}", path.display(), e);
            None
        }
    }
}

/// `nvidia` listed in the kernel module table
pub fn nvidia_module_loaded(modules: &Path) -> bool {
    match fs::read_to_string(modules) {
        Ok(content) => content.lines().any(|line| line.starts_with("nvidia ")),
        Err(e) => {
            debug!("Cannot read {}: {}", modules.display(), e);
            false
        }
    }
}

/// Resolve a binary the way a shell would
pub fn find_in_path(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|p| p.is_file())
}
