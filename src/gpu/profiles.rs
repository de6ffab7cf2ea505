//! Hardware model profiles and quirks
//!
//! Some laptop models need help beyond generic detection: a forced vendor
//! path, or an extra panel mode that the EDID does not advertise. Profiles
//! are keyed by the DMI product version string (e.g. "galp3").

use thiserror::Error;

use super::capabilities::GpuVendor;
use crate::protocol::ModeInfo;

/// RandR mode flag bits
pub mod mode_flags {
    pub const HSYNC_POSITIVE: u32 = 1;
    pub const HSYNC_NEGATIVE: u32 = 2;
    pub const VSYNC_POSITIVE: u32 = 4;
    pub const VSYNC_NEGATIVE: u32 = 8;
    pub const INTERLACE: u32 = 16;
    pub const DOUBLE_SCAN: u32 = 32;
}

/// Output the extra panel mode is added to
pub const PANEL_OUTPUT: &str = "eDP-1";

/// Models shipped with a high-density panel or a hybrid GPU
const NEEDS_AUTOSCALING: &[&str] = &[
    "addw1",
    "addw2",
    "bonw12",
    "galp2",
    "galp3",
    "oryp2-ess",
    "oryp3-ess",
    "oryp3",
    "serw10",
    "serw11",
];

/// Models whose discrete GPU drives the panel through the NVIDIA driver
const NVIDIA_MODELS: &[&str] = &[
    "addw1",
    "addw2",
    "bonw12",
    "oryp2-ess",
    "oryp3-ess",
    "serw10",
    "serw11",
];

/// Models that must use the Intel path even if the NVIDIA driver is loaded
const INTEL_MODELS: &[&str] = &["galp2", "galp3"];

const GALP_1600X900: &str = "1600x900  118.25  1600 1696 1856 2112  900 903 908 934 -hsync +vsync";

/// Known model quirks that require workarounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quirk {
    /// Always use the Intel path
    ForceIntelPath,

    /// Panel lacks a usable half resolution; add a modeline at startup
    PanelModeline,

    /// Discrete GPU drives the outputs
    DiscreteGpu,
}

impl Quirk {
    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::ForceIntelPath => "Intel path forced regardless of loaded drivers",
            Self::PanelModeline => "Panel needs an extra 1600x900 mode",
            Self::DiscreteGpu => "Discrete NVIDIA GPU drives the outputs",
        }
    }
}

/// Modeline parse errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelineError {
    #[error("Modeline has {0} fields, expected at least 10")]
    TooShort(usize),

    #[error("Invalid modeline field {field}: {value:?}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offending text
        value: String,
    },

    #[error("Unknown modeline flag: {0}")]
    UnknownFlag(String),
}

/// X modeline as written for `xrandr --newmode`
///
/// `NAME CLOCK_MHZ HDISP HSYNC_START HSYNC_END HTOTAL VDISP VSYNC_START
/// VSYNC_END VTOTAL [FLAGS...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Modeline {
    pub name: String,
    /// Pixel clock in MHz
    pub clock_mhz: f64,
    pub horizontal: [u16; 4],
    pub vertical: [u16; 4],
    pub flags: u32,
}

impl Modeline {
    pub fn parse(line: &str) -> Result<Self, ModelineError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            return Err(ModelineError::TooShort(fields.len()));
        }

        let name = fields[0].trim_matches('"').to_string();
        let clock_mhz: f64 = fields[1]
            .parse()
            .map_err(|_| ModelineError::InvalidField {
                field: "clock",
                value: fields[1].to_string(),
            })?;

        let timing = |i: usize, field: &'static str| -> Result<u16, ModelineError> {
            fields[i].parse().map_err(|_| ModelineError::InvalidField {
                field,
                value: fields[i].to_string(),
            })
        };

        let horizontal = [
            timing(2, "hdisp")?,
            timing(3, "hsync_start")?,
            timing(4, "hsync_end")?,
            timing(5, "htotal")?,
        ];
        let vertical = [
            timing(6, "vdisp")?,
            timing(7, "vsync_start")?,
            timing(8, "vsync_end")?,
            timing(9, "vtotal")?,
        ];

        let mut flags = 0;
        for flag in &fields[10..] {
            flags |= match flag.to_lowercase().as_str() {
                "+hsync" => mode_flags::HSYNC_POSITIVE,
                "-hsync" => mode_flags::HSYNC_NEGATIVE,
                "+vsync" => mode_flags::VSYNC_POSITIVE,
                "-vsync" => mode_flags::VSYNC_NEGATIVE,
                "interlace" => mode_flags::INTERLACE,
                "doublescan" => mode_flags::DOUBLE_SCAN,
                other => return Err(ModelineError::UnknownFlag(other.to_string())),
            };
        }

        Ok(Self {
            name,
            clock_mhz,
            horizontal,
            vertical,
            flags,
        })
    }

    /// Mode description for `CreateMode`; the id is assigned by the server
    pub fn to_mode_info(&self) -> ModeInfo {
        ModeInfo {
            id: 0,
            width: self.horizontal[0],
            height: self.vertical[0],
            dot_clock: (self.clock_mhz * 1_000_000.0).round() as u32,
            hsync_start: self.horizontal[1],
            hsync_end: self.horizontal[2],
            htotal: self.horizontal[3],
            hskew: 0,
            vsync_start: self.vertical[1],
            vsync_end: self.vertical[2],
            vtotal: self.vertical[3],
            flags: self.flags,
            name: self.name.clone(),
        }
    }
}

/// Per-model hints
#[derive(Debug, Clone, Default)]
pub struct ModelProfile {
    /// DMI product version, if known
    pub model: Option<String>,

    /// Vendor the model requires, bypassing driver detection
    pub vendor_hint: Option<GpuVendor>,

    /// Model is one the daemon was built for
    pub needs_autoscaling: bool,

    /// Extra panel mode created at startup on the native path
    pub modeline: Option<Modeline>,

    /// Known quirks that need workarounds
    pub quirks: Vec<Quirk>,
}

/// Look up the profile for a model
pub fn profile_for(model: Option<&str>) -> ModelProfile {
    let Some(model) = model else {
        return ModelProfile::default();
    };

    let mut profile = ModelProfile {
        model: Some(model.to_string()),
        needs_autoscaling: NEEDS_AUTOSCALING.contains(&model),
        ..Default::default()
    };

    if INTEL_MODELS.contains(&model) {
        profile.vendor_hint = Some(GpuVendor::Intel);
        profile.quirks.push(Quirk::ForceIntelPath);

        // The constant is known-good; a parse failure would only drop the mode
        if let Ok(modeline) = Modeline::parse(GALP_1600X900) {
            profile.modeline = Some(modeline);
            profile.quirks.push(Quirk::PanelModeline);
        }
    }

    if NVIDIA_MODELS.contains(&model) {
        profile.quirks.push(Quirk::DiscreteGpu);
    }

    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_galp_modeline() {
        let modeline = Modeline::parse(GALP_1600X900).unwrap();
        assert_eq!(modeline.name, "1600x900");
        assert_eq!(modeline.horizontal, [1600, 1696, 1856, 2112]);
        assert_eq!(modeline.vertical, [900, 903, 908, 934]);
        assert_eq!(
            modeline.flags,
            mode_flags::HSYNC_NEGATIVE | mode_flags::VSYNC_POSITIVE
        );

        let mode = modeline.to_mode_info();
        assert_eq!(mode.dot_clock, 118_250_000);
        assert_eq!((mode.width, mode.height), (1600, 900));
        assert_eq!(mode.vtotal, 934);
    }

    #[test]
    fn test_modeline_errors() {
        assert_eq!(
            Modeline::parse("1600x900 118.25 1600"),
            Err(ModelineError::TooShort(3))
        );
        assert!(matches!(
            Modeline::parse("m x 1 2 3 4 5 6 7 8"),
            Err(ModelineError::InvalidField { field: "clock", .. })
        ));
        assert_eq!(
            Modeline::parse("m 1.0 1 2 3 4 5 6 7 8 +wobble"),
            Err(ModelineError::UnknownFlag("+wobble".to_string()))
        );
    }

    #[test]
    fn test_galp_profile() {
        let profile = profile_for(Some("galp3"));
        assert_eq!(profile.vendor_hint, Some(GpuVendor::Intel));
        assert!(profile.needs_autoscaling);
        assert!(profile.modeline.is_some());
        assert!(profile.quirks.contains(&Quirk::PanelModeline));
    }

    #[test]
    fn test_nvidia_profile_has_no_vendor_hint() {
        let profile = profile_for(Some("oryp3-ess"));
        assert_eq!(profile.vendor_hint, None);
        assert!(profile.quirks.contains(&Quirk::DiscreteGpu));
        assert!(profile.modeline.is_none());
    }

    #[test]
    fn test_unknown_model() {
        let profile = profile_for(Some("lemp9"));
        assert!(!profile.needs_autoscaling);
        assert!(profile.quirks.is_empty());
        assert!(profile_for(None).model.is_none());
    }
}
