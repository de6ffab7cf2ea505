//! NVIDIA metamode strategy
//!
//! A metamode describes every display of the X screen in one string:
//!
//! ```text
//! DP-0: nvidia-auto-select @3840x2160 +0+0 {ViewPortIn=3840x2160, ViewPortOut=1920x1080+0+0, ForceCompositionPipeline=On}
//! ```
//!
//! `@WxH` and `ViewPortIn` give the rendered size, `ViewPortOut` the native
//! mode and position. Existing attributes of the current metamode are kept,
//! with the three attributes this daemon owns replaced by key.

use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::{ConfigStrategy, Result};
use crate::multimon::Layout;
use crate::scaling::{GlobalMode, ScaleDecision};
use crate::topology::{Display, Dpi, TopologySnapshot};

const VIEWPORT_IN: &str = "ViewPortIn";
const VIEWPORT_OUT: &str = "ViewPortOut";
const FORCE_COMPOSITION: &str = "ForceCompositionPipeline";

/// `DPY-N` to connector name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DpyMap(BTreeMap<String, String>);

impl DpyMap {
    /// Parse `nvidia-settings -q dpys`
    ///
    /// ```text
    ///     [0] host:1[dpy:0] (DP-0)
    ///     [1] host:1[dpy:4] (HDMI-0)
    /// ```
    pub fn parse(output: &str) -> Self {
        let mut map = BTreeMap::new();
        for line in output.lines() {
            let Some(start) = line.find("[dpy:") else {
                continue;
            };
            let rest = &line[start + 5..];
            let Some(end) = rest.find(']') else {
                continue;
            };
            let number = &rest[..end];
            if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }

            let rest = &rest[end + 1..];
            let Some(open) = rest.find('(') else {
                continue;
            };
            let Some(close) = rest[open..].find(')') else {
                continue;
            };
            let connector = &rest[open + 1..open + close];
            map.insert(format!("DPY-{}", number), connector.to_string());
        }
        Self(map)
    }

    pub fn connector(&self, dpy: &str) -> Option<&str> {
        self.0.get(dpy).map(String::as_str)
    }
}

/// Ordered `{key=value, ...}` attribute list of one display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, Option<String>)>);

impl Attributes {
    fn parse(body: &str) -> Self {
        Self(
            body.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.trim().to_string(), Some(v.trim().to_string())),
                    None => (item.to_string(), None),
                })
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Attributes other than the ones this daemon synthesizes
    fn foreign(&self) -> impl Iterator<Item = String> + '_ {
        self.0
            .iter()
            .filter(|(k, _)| k != VIEWPORT_IN && k != VIEWPORT_OUT && k != FORCE_COMPOSITION)
            .map(|(k, v)| match v {
                Some(v) => format!("{}={}", k, v),
                None => k.clone(),
            })
    }
}

/// Current metamode, keyed by connector name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaMode(BTreeMap<String, Attributes>);

impl MetaMode {
    /// Parse `nvidia-settings -q CurrentMetaMode`
    pub fn parse(output: &str, dpys: &DpyMap) -> Self {
        let flat = output.replace("\n ", "").replace("\n\n", "");
        let body = flat.split_once(" :: ").map_or(flat.as_str(), |(_, b)| b);

        let mut displays = BTreeMap::new();
        let mut rest = body;
        while let Some(start) = rest.find("DPY-") {
            let after = &rest[start + 4..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                rest = after;
                continue;
            }
            let dpy = &rest[start..start + 4 + digits];

            let Some(open) = after.find('{') else {
                break;
            };
            let Some(close) = after[open..].find('}') else {
                break;
            };
            let attributes = Attributes::parse(&after[open + 1..open + close]);

            match dpys.connector(dpy) {
                Some(connector) => {
                    trace!("{} ({}) attributes: {:?}", dpy, connector, attributes);
                    displays.insert(connector.to_string(), attributes);
                }
                None => debug!("{} missing from display device list", dpy),
            }
            rest = &after[open + close + 1..];
        }

        Self(displays)
    }

    pub fn attributes(&self, connector: &str) -> Option<&Attributes> {
        self.0.get(connector)
    }
}

/// Rendered size for a display under `mode`
pub(crate) fn viewport_in(mode: GlobalMode, native: (u32, u32), dpi: Dpi) -> (u32, u32) {
    let (w, h) = native;
    match mode {
        GlobalMode::Native | GlobalMode::LowDpiPrime => native,
        GlobalMode::HiDpi if dpi.is_high_density() => native,
        GlobalMode::HiDpi => (w * 2, h * 2),
        GlobalMode::LowDpi if dpi.is_high_density() => (half(w), half(h)),
        GlobalMode::LowDpi => native,
    }
}

/// Half a dimension, rounding ties to even
pub(crate) fn half(value: u32) -> u32 {
    (f64::from(value) / 2.0).round_ties_even() as u32
}

/// Builds metamode fragments for displays on the NVIDIA screen
pub struct MetamodeStrategy<'a> {
    snapshot: &'a TopologySnapshot,
    current: &'a MetaMode,
    /// Mode to use instead of the decision's, e.g. for a native fallback
    mode_override: Option<GlobalMode>,
}

impl<'a> MetamodeStrategy<'a> {
    pub fn new(snapshot: &'a TopologySnapshot, current: &'a MetaMode) -> Self {
        Self {
            snapshot,
            current,
            mode_override: None,
        }
    }

    /// Use `mode` for every fragment regardless of the decision
    pub fn with_mode(mut self, mode: GlobalMode) -> Self {
        self.mode_override = Some(mode);
        self
    }

    /// Fragment for one display, `None` when it takes no part
    pub fn fragment(
        &self,
        display: &Display,
        layout: &Layout,
        decision: &ScaleDecision,
    ) -> Option<String> {
        if self.snapshot.panel_override(&display.name) {
            return None;
        }
        let dpi = display.native_dpi();
        if dpi == Dpi::Unknown {
            return None;
        }
        let native = display.native_size()?;
        let position = layout.position(&display.name)?;

        let mode = self.mode_override.unwrap_or(decision.mode);
        let (in_w, in_h) = viewport_in(mode, native, dpi);

        let mut attributes = vec![
            format!("{}={}x{}", VIEWPORT_IN, in_w, in_h),
            format!(
                "{}={}x{}+{}+{}",
                VIEWPORT_OUT, native.0, native.1, position.x, position.y
            ),
        ];
        if let Some(existing) = self.current.attributes(&display.name) {
            attributes.extend(existing.foreign());
        }
        attributes.push(format!("{}=On", FORCE_COMPOSITION));

        Some(format!(
            "{}: nvidia-auto-select @{}x{} +{}+{} {{{}}}",
            display.name,
            in_w,
            in_h,
            position.x,
            position.y,
            attributes.join(", ")
        ))
    }
}

impl ConfigStrategy for MetamodeStrategy<'_> {
    fn commit(
        &mut self,
        display: &Display,
        layout: &Layout,
        decision: &ScaleDecision,
    ) -> Result<Option<String>> {
        Ok(self.fragment(display, layout, decision))
    }
}

/// Join per-display fragments into one metamode
pub fn join(fragments: &[String]) -> String {
    fragments.join(", ")
}
