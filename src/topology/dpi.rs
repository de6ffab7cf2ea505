//! Physical DPI classification

use serde::Serialize;

/// Above this a display is high-density
pub const HIGH_DENSITY_DPI: f64 = 170.0;

/// Stricter threshold used by the panel escalation and primary checks
pub const STRICT_HIGH_DENSITY_DPI: f64 = 192.0;

const MM_PER_INCH: f64 = 25.4;

/// Classified pixel density of a display at a given resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Dpi {
    /// Computed dots per inch
    Known(f64),
    /// Both physical dimensions are zero (projectors, some TVs)
    NoData,
    /// Only one physical dimension is known
    Unknown,
}

impl Dpi {
    /// Numeric value; `NoData` counts as 0 and `Unknown` has none
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Known(dpi) => Some(dpi),
            Self::NoData => Some(0.0),
            Self::Unknown => None,
        }
    }

    /// DPI > 170
    pub fn is_high_density(self) -> bool {
        self.exceeds(HIGH_DENSITY_DPI)
    }

    /// DPI strictly above `threshold`; unknown never exceeds
    pub fn exceeds(self, threshold: f64) -> bool {
        self.value().is_some_and(|dpi| dpi > threshold)
    }

    /// DPI strictly below `threshold`; unknown is never below
    pub fn below(self, threshold: f64) -> bool {
        self.value().is_some_and(|dpi| dpi < threshold)
    }
}

impl std::fmt::Display for Dpi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(dpi) => write!(f, "{:.1}", dpi),
            Self::NoData => write!(f, "no data"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify a display from its physical size and a pixel resolution
///
/// Some EDIDs report the aspect ratio (160x90) instead of the physical size;
/// those are pinned to 192 for 4K-or-larger resolutions and 96 otherwise.
pub fn classify(mm_width: u32, mm_height: u32, width: u32, height: u32) -> Dpi {
    if mm_width == 160 && mm_height == 90 {
        return if width >= 3840 && height >= 2160 {
            Dpi::Known(192.0)
        } else {
            Dpi::Known(96.0)
        };
    }

    match (mm_width, mm_height) {
        (0, 0) => Dpi::NoData,
        (0, _) | (_, 0) => Dpi::Unknown,
        (mm_w, mm_h) => {
            let dpi_x = f64::from(width) / f64::from(mm_w) * MM_PER_INCH;
            let dpi_y = f64::from(height) / f64::from(mm_h) * MM_PER_INCH;
            Dpi::Known(dpi_x.max(dpi_y))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(dpi: Dpi, expected: f64) -> bool {
        dpi.value().is_some_and(|v| (v - expected).abs() < 0.1)
    }

    #[test]
    fn test_external_1080p_is_low_density() {
        let dpi = classify(509, 286, 1920, 1080);
        assert!(approx(dpi, 96.05));
        assert!(!dpi.is_high_density());
    }

    #[test]
    fn test_4k_laptop_panel_is_high_density() {
        let dpi = classify(338, 190, 3840, 2160);
        assert!(approx(dpi, 288.75));
        assert!(dpi.exceeds(STRICT_HIGH_DENSITY_DPI));
    }

    #[test]
    fn test_qhd_plus_panel() {
        let dpi = classify(277, 156, 3200, 1800);
        assert!(approx(dpi, 293.4));
    }

    #[test]
    fn test_aspect_ratio_edid() {
        assert_eq!(classify(160, 90, 3840, 2160), Dpi::Known(192.0));
        assert_eq!(classify(160, 90, 1920, 1080), Dpi::Known(96.0));
    }

    #[test]
    fn test_missing_dimensions() {
        assert_eq!(classify(0, 0, 1920, 1080), Dpi::NoData);
        assert_eq!(classify(0, 286, 1920, 1080), Dpi::Unknown);
        assert_eq!(classify(509, 0, 1920, 1080), Dpi::Unknown);
    }

    #[test]
    fn test_no_data_counts_as_low_density() {
        assert_eq!(Dpi::NoData.value(), Some(0.0));
        assert!(!Dpi::NoData.is_high_density());
        assert!(Dpi::NoData.below(STRICT_HIGH_DENSITY_DPI));
        assert!(!Dpi::Unknown.below(STRICT_HIGH_DENSITY_DPI));
    }
}
