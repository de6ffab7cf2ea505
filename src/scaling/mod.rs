//! Scale-Mode Decision Engine
//!
//! Turns a topology snapshot plus the daemon's policy state into a [`Plan`]:
//! per-display scale, global mode tag, force flag and the logical layout.
//! [`plan`] is a pure function of its inputs; it performs no I/O and can be
//! evaluated any number of times per cycle.
//!
//! # Policy
//!
//! The native path keeps an `unforce` flag. Forced means scales are matched
//! by running high-density displays at half resolution; unforced keeps
//! native resolutions and leaves scaling to the compositor.
//!
//! The pixel-doubling path keeps a [`ScaleMode`]. In `HiDpi` mode low-density
//! displays are rendered at twice their size (layout factor 0.5) so the
//! compositor can run at scale 2 everywhere, except when a low-density
//! display is wired through another GPU ("prime"), which cannot be doubled.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::gpu::VendorPath;
use crate::multimon::{
    build_graph, Layout, LayoutCalculator, LayoutError, LayoutInput, LogicalSize, Rect,
};
use crate::store::StoredLayout;
use crate::topology::{Display, Dpi, TopologySnapshot, STRICT_HIGH_DENSITY_DPI};

/// Scale mode of the pixel-doubling path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    HiDpi,
    LowDpi,
}

impl ScaleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HiDpi => "hidpi",
            Self::LowDpi => "lowdpi",
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global mode tag of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalMode {
    /// Every display at native resolution
    Native,
    /// Scales matched at 1x
    LowDpi,
    /// Scales matched at 2x
    HiDpi,
    /// 2x, but low-density displays left undoubled because a prime display
    /// cannot be doubled
    LowDpiPrime,
}

/// User preference stored in the session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredMode {
    Native,
    HiDpi,
    LoDpi,
}

impl PreferredMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::HiDpi => "hidpi",
            Self::LoDpi => "lodpi",
        }
    }
}

impl FromStr for PreferredMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "native" => Ok(Self::Native),
            "hidpi" => Ok(Self::HiDpi),
            "lodpi" => Ok(Self::LoDpi),
            other => Err(format!("unknown mode preference: {:?}", other)),
        }
    }
}

impl fmt::Display for PreferredMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which densities are among the connected displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisplayTypes {
    pub mixed: bool,
    pub hidpi: bool,
    pub lowdpi: bool,
}

impl DisplayTypes {
    /// Classify connected displays at native resolution, skipping suppressed
    /// panels and displays with unknown density
    pub fn of(snapshot: &TopologySnapshot) -> Self {
        let mut types = Self::default();
        for display in snapshot.active() {
            match display.native_dpi() {
                Dpi::Unknown => {}
                dpi if dpi.is_high_density() => types.hidpi = true,
                _ => types.lowdpi = true,
            }
        }
        types.mixed = types.hidpi && types.lowdpi;
        types
    }

    /// "mixed, hidpi, lodpi" style summary for notifications
    pub fn describe(&self) -> String {
        [
            (self.mixed, "mixed"),
            (self.hidpi, "hidpi"),
            (self.lowdpi, "lodpi"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Densities among connected prime displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrimeSummary {
    pub lowdpi: bool,
    pub hidpi: bool,
}

impl PrimeSummary {
    pub fn of(snapshot: &TopologySnapshot) -> Self {
        let mut summary = Self::default();
        for display in snapshot.active().filter(|d| d.prime) {
            match display.native_dpi() {
                Dpi::Unknown => {}
                dpi if dpi.is_high_density() => summary.hidpi = true,
                _ => summary.lowdpi = true,
            }
        }
        summary
    }
}

/// State that survives between cycles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyState {
    pub scale_mode: ScaleMode,
    pub unforce: bool,
    /// Display types seen at the end of the last commit
    pub previous_types: Option<DisplayTypes>,
}

impl Default for PolicyState {
    fn default() -> Self {
        Self {
            scale_mode: ScaleMode::HiDpi,
            unforce: false,
            previous_types: None,
        }
    }
}

impl PolicyState {
    /// Adjust policy after the topology changed
    ///
    /// Returns the preference to store, if the policy moved. The native
    /// path remembers the user's mode only while the mix of display types
    /// stays the same: losing every low-density display switches to
    /// unforced, becoming mixed switches to forced. The pixel-doubling path
    /// drops to low-density when the primary display is low-density while a
    /// high-density prime display exists.
    pub fn on_topology_change(
        &mut self,
        path: VendorPath,
        types: DisplayTypes,
        primary_mismatch: bool,
    ) -> Option<PreferredMode> {
        let previous = self.previous_types.unwrap_or_default();
        match path {
            VendorPath::Native => {
                if !types.lowdpi && previous.lowdpi {
                    self.unforce = true;
                    Some(PreferredMode::HiDpi)
                } else if types.mixed && !previous.mixed {
                    self.unforce = false;
                    Some(PreferredMode::LoDpi)
                } else {
                    None
                }
            }
            VendorPath::PixelDoubling => {
                if primary_mismatch {
                    self.scale_mode = ScaleMode::LowDpi;
                    Some(PreferredMode::LoDpi)
                } else {
                    None
                }
            }
        }
    }

    /// Adopt a preference chosen by the user
    pub fn apply_preference(&mut self, path: VendorPath, preference: PreferredMode) {
        match path {
            VendorPath::Native => self.unforce = preference != PreferredMode::LoDpi,
            VendorPath::PixelDoubling => {
                self.scale_mode = if preference == PreferredMode::HiDpi {
                    ScaleMode::HiDpi
                } else {
                    ScaleMode::LowDpi
                }
            }
        }
    }
}

/// Primary display is low-density while a high-density prime display exists
///
/// The compositor picks its scale from the primary display, so on the
/// pixel-doubling path in `HiDpi` mode this combination renders everything
/// at 1x on the doubled framebuffer.
pub fn primary_mismatch(snapshot: &TopologySnapshot, path: VendorPath, policy: &PolicyState) -> bool {
    if !path.is_pixel_doubling() || policy.scale_mode != ScaleMode::HiDpi {
        return false;
    }
    if !PrimeSummary::of(snapshot).hidpi {
        return false;
    }
    snapshot
        .primary()
        .is_some_and(|d| d.native_dpi().below(STRICT_HIGH_DENSITY_DPI))
}

/// Scale decision for one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleDecision {
    /// Committed scale per display, 1 or 2
    pub scales: BTreeMap<String, u32>,
    /// Divisor applied to each display's size for the layout
    pub factors: BTreeMap<String, f64>,
    pub mode: GlobalMode,
    /// Match scales by halving high-density resolutions
    pub force: bool,
    pub types: DisplayTypes,
    pub prime: PrimeSummary,
}

impl ScaleDecision {
    /// Committed scale for `name`, 1 if the display takes no part
    pub fn scale(&self, name: &str) -> u32 {
        self.scales.get(name).copied().unwrap_or(1)
    }
}

/// Inputs to [`plan`]
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub snapshot: &'a TopologySnapshot,
    pub store: Option<&'a StoredLayout>,
    pub path: VendorPath,
    pub policy: &'a PolicyState,
    /// Plan at native resolution with scale 1 everywhere
    pub revert: bool,
}

/// Complete plan for one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub layout: Layout,
    pub decision: ScaleDecision,
    pub sizes: BTreeMap<String, LogicalSize>,
    pub rects: BTreeMap<String, Rect>,
}

/// Resolution the scale of `display` is derived from
///
/// Reverting uses native resolution. Otherwise the stored size wins when a
/// store is present, then the current mode on the native path, then native.
/// The DPI and the logical size always come from the same resolution, so a
/// panel already running halved keeps its halved size.
fn layout_resolution(input: &PlanInput<'_>, display: &Display) -> Option<((u32, u32), Dpi)> {
    let native = || display.native_size().map(|size| (size, display.native_dpi()));
    if input.revert {
        return native();
    }
    if let Some(store) = input.store {
        return match store.size(&display.name) {
            Some((w, h)) => Some(((w, h), display.dpi_at(w, h))),
            None => native(),
        };
    }
    match (input.path, &display.geometry) {
        (VendorPath::Native, Some(g)) if g.width > 0 && g.height > 0 => {
            Some(((g.width, g.height), display.current_dpi()))
        }
        _ => native(),
    }
}

/// Recorded rectangle of an active display
fn rect_of(store: Option<&StoredLayout>, display: &Display) -> Rect {
    if let Some(rect) = store.and_then(|s| s.rect(&display.name)) {
        return rect;
    }
    match &display.geometry {
        Some(g) if display.is_active() => Rect::new(g.x, g.y, g.width, g.height),
        _ => Rect::new(0, 0, 0, 0),
    }
}

/// Compute the plan for a snapshot
pub fn plan(input: PlanInput<'_>) -> Result<Plan, LayoutError> {
    let snapshot = input.snapshot;
    let types = DisplayTypes::of(snapshot);
    let prime = PrimeSummary::of(snapshot);
    let doubling = input.path.is_pixel_doubling()
        && input.policy.scale_mode == ScaleMode::HiDpi
        && !input.revert;

    let mut scales = BTreeMap::new();
    let mut factors = BTreeMap::new();
    let mut sizes = BTreeMap::new();
    let mut rects = BTreeMap::new();

    for display in snapshot.active() {
        let (resolution, dpi) =
            layout_resolution(&input, display).unwrap_or(((0, 0), Dpi::Unknown));
        let scale = if dpi.is_high_density() && !input.revert {
            2
        } else {
            1
        };

        let mut factor = f64::from(scale);
        if doubling {
            factor /= 2.0;
            if dpi != Dpi::Unknown && !dpi.is_high_density() && (display.prime || prime.lowdpi) {
                factor *= 2.0;
            }
        }

        let (width, height) = resolution;
        let size = LogicalSize::new(
            (f64::from(width) / factor) as u32,
            (f64::from(height) / factor) as u32,
        );

        // See topology: `tracing` macros shadow a local named `display`.
        let name = &display.name;
        trace!(
            "{}: dpi {} scale {} factor {} logical {}x{}",
            name,
            dpi,
            scale,
            factor,
            size.width,
            size.height
        );

        scales.insert(display.name.clone(), scale);
        factors.insert(display.name.clone(), factor);
        sizes.insert(display.name.clone(), size);
        rects.insert(display.name.clone(), rect_of(input.store, display));
    }

    let graph = build_graph(&rects);
    let layout = LayoutCalculator::new().calculate(LayoutInput {
        graph: &graph,
        rects: &rects,
        sizes: &sizes,
    })?;

    let prime_connected = snapshot.connected().any(|d| d.prime);
    let force = types.hidpi
        && !input.policy.unforce
        && !(prime_connected && input.policy.scale_mode == ScaleMode::HiDpi);

    let mode = match input.path {
        _ if input.revert => GlobalMode::Native,
        VendorPath::PixelDoubling => match input.policy.scale_mode {
            ScaleMode::HiDpi if prime.lowdpi => GlobalMode::LowDpiPrime,
            ScaleMode::HiDpi => GlobalMode::HiDpi,
            ScaleMode::LowDpi => GlobalMode::LowDpi,
        },
        VendorPath::Native if force => GlobalMode::LowDpi,
        VendorPath::Native => GlobalMode::Native,
    };

    debug!(
        "Plan: mode {:?}, force {}, types [{}], {} displays",
        mode,
        force,
        types.describe(),
        layout.len()
    );

    Ok(Plan {
        layout,
        decision: ScaleDecision {
            scales,
            factors,
            mode,
            force,
            types,
            prime,
        },
        sizes,
        rects,
    })
}
