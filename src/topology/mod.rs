//! Display Topology
//!
//! Builds an immutable [`TopologySnapshot`] from the RandR transport and
//! decides whether it differs meaningfully from the previous one.
//!
//! # Snapshot contents
//!
//! One [`Display`] per connector, keyed by connector name in a `BTreeMap`.
//! The map order (lexicographic connector name) is the enumeration order used
//! everywhere downstream, so tie-breaks in the adjacency graph and the layout
//! seed are deterministic.
//!
//! # Change detection
//!
//! [`detect_change`] applies these rules in order:
//!
//! 1. Lid closed → open: changed.
//! 2. Lid open → closed: changed if some non-panel display is connected.
//! 3. A connector appeared, or its connected flag flipped: changed.
//! 4. A connector's CRTC went from 0 to active or back: changed.
//!
//! Anything else (mode switches, moves done by the compositor itself) is
//! ignored, so the daemon never fights manual configuration.
//!
//! # Panel override
//!
//! While the lid is closed the internal panel (connector name containing
//! `eDP`, or `ConnectorType` = `Panel`) is excluded from layout and scaling.

pub mod dpi;
pub mod edid;
pub mod lid;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::protocol::{self, RandrClient};

pub use crate::protocol::ModeInfo as Mode;
pub use dpi::{classify, Dpi, HIGH_DENSITY_DPI, STRICT_HIGH_DENSITY_DPI};
pub use edid::EdidIdentity;
pub use lid::{LidSensor, LidState, ProcLidSensor};

/// Output property naming the connector kind (ATOM)
pub const PROPERTY_CONNECTOR_TYPE: &str = "ConnectorType";
/// Output property present on outputs driven through another GPU
pub const PROPERTY_PRIME_SYNC: &str = "PRIME Synchronization";
/// Output property holding the raw EDID
pub const PROPERTY_EDID: &str = "EDID";

/// Geometry of an active CRTC
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrtcGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub rotation: u16,
    pub outputs: Vec<u32>,
}

/// One connector as seen at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Display {
    /// Connector name, unique within a snapshot
    pub name: String,
    /// RandR output id
    pub output: u32,
    pub connected: bool,
    pub mm_width: u32,
    pub mm_height: u32,
    /// Supported modes, preferred (native) first
    #[serde(skip)]
    pub modes: Vec<Mode>,
    /// Current CRTC, 0 when inactive
    pub crtc: u32,
    /// Current CRTC geometry when active
    pub geometry: Option<CrtcGeometry>,
    /// `ConnectorType` property value, e.g. "Panel" or "HDMI"
    pub connector_type: Option<String>,
    pub primary: bool,
    /// Output exposes `PRIME Synchronization`
    pub prime: bool,
    pub edid: Option<EdidIdentity>,
}

impl Display {
    /// Preferred mode
    pub fn native_mode(&self) -> Option<&Mode> {
        self.modes.first()
    }

    /// Native resolution
    pub fn native_size(&self) -> Option<(u32, u32)> {
        self.native_mode()
            .map(|m| (u32::from(m.width), u32::from(m.height)))
    }

    /// Internal laptop panel
    pub fn is_internal(&self) -> bool {
        self.name.contains("eDP") || self.connector_type.as_deref() == Some("Panel")
    }

    /// Driving a CRTC right now
    pub fn is_active(&self) -> bool {
        self.crtc != 0
    }

    /// DPI at the native resolution
    pub fn native_dpi(&self) -> Dpi {
        match self.native_size() {
            Some((w, h)) => classify(self.mm_width, self.mm_height, w, h),
            None => Dpi::Unknown,
        }
    }

    /// DPI at the current CRTC size, falling back to native
    pub fn current_dpi(&self) -> Dpi {
        match &self.geometry {
            Some(g) => classify(self.mm_width, self.mm_height, g.width, g.height),
            None => self.native_dpi(),
        }
    }

    /// DPI at an arbitrary resolution
    pub fn dpi_at(&self, width: u32, height: u32) -> Dpi {
        classify(self.mm_width, self.mm_height, width, height)
    }

    /// First supported mode with the given size
    pub fn find_mode(&self, width: u32, height: u32) -> Option<&Mode> {
        self.modes
            .iter()
            .find(|m| u32::from(m.width) == width && u32::from(m.height) == height)
    }
}

/// Immutable view of every connector plus lid state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologySnapshot {
    pub displays: BTreeMap<String, Display>,
    pub lid: LidState,
    /// Config timestamp every `SetCrtcConfig` of the cycle is fenced with
    pub config_timestamp: u32,
}

impl TopologySnapshot {
    /// Look up a display by connector name
    pub fn display(&self, name: &str) -> Option<&Display> {
        self.displays.get(name)
    }

    /// Internal panel suppressed because the lid is closed
    pub fn panel_override(&self, name: &str) -> bool {
        !self.lid.is_open() && self.displays.get(name).is_some_and(Display::is_internal)
    }

    /// Connected displays, in connector order
    pub fn connected(&self) -> impl Iterator<Item = &Display> {
        self.displays.values().filter(|d| d.connected)
    }

    /// Connected displays not suppressed by the panel override
    pub fn active(&self) -> impl Iterator<Item = &Display> {
        self.connected().filter(|d| !self.panel_override(&d.name))
    }

    /// EDID identities of connected displays, for matching stored layouts
    pub fn identities(&self) -> Vec<(String, EdidIdentity)> {
        self.connected()
            .filter_map(|d| d.edid.clone().map(|id| (d.name.clone(), id)))
            .collect()
    }

    /// Current primary display
    pub fn primary(&self) -> Option<&Display> {
        self.displays.values().find(|d| d.primary)
    }
}

/// Why a poll reported a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    LidOpened,
    LidClosed,
    ConnectorAdded(String),
    ConnectionChanged(String),
    CrtcToggled(String),
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LidOpened => write!(f, "lid opened"),
            Self::LidClosed => write!(f, "lid closed with external display"),
            Self::ConnectorAdded(name) => write!(f, "connector {} appeared", name),
            Self::ConnectionChanged(name) => write!(f, "{} connection changed", name),
            Self::CrtcToggled(name) => write!(f, "{} CRTC toggled", name),
        }
    }
}

/// Compare two snapshots
pub fn detect_change(
    previous: Option<&TopologySnapshot>,
    next: &TopologySnapshot,
) -> Option<ChangeReason> {
    let previous_lid = previous.map_or(next.lid, |p| p.lid);

    match (previous_lid, next.lid) {
        (LidState::Closed, LidState::Open) => return Some(ChangeReason::LidOpened),
        (LidState::Open, LidState::Closed) => {
            if next.connected().any(|d| !d.is_internal()) {
                return Some(ChangeReason::LidClosed);
            }
        }
        _ => {}
    }

    for (name, display) in &next.displays {
        let Some(old) = previous.and_then(|p| p.displays.get(name)) else {
            return Some(ChangeReason::ConnectorAdded(name.clone()));
        };

        if old.connected != display.connected {
            return Some(ChangeReason::ConnectionChanged(name.clone()));
        }

        if old.crtc != display.crtc && (old.crtc == 0 || display.crtc == 0) {
            return Some(ChangeReason::CrtcToggled(name.clone()));
        }
    }

    None
}

/// Query the transport for a fresh snapshot
pub fn query_snapshot(
    randr: &dyn RandrClient,
    lid: LidState,
) -> protocol::Result<TopologySnapshot> {
    let resources = randr.list_resources()?;
    let ts = resources.config_timestamp;

    let modes: HashMap<u32, &Mode> = resources.modes.iter().map(|m| (m.id, m)).collect();
    let primary = randr.output_primary().ok().flatten();

    let mut displays = BTreeMap::new();
    for &output in &resources.outputs {
        let info = randr.output_info(output, ts)?;

        let geometry = if info.crtc != 0 {
            match randr.crtc_info(info.crtc, ts) {
                Ok(crtc) => Some(CrtcGeometry {
                    x: crtc.x,
                    y: crtc.y,
                    width: crtc.width,
                    height: crtc.height,
                    rotation: crtc.rotation,
                    outputs: crtc.outputs,
                }),
                Err(e) => {
                    debug!("CRTC {} of {} unreadable: {}", info.crtc, info.name, e);
                    None
                }
            }
        } else {
            None
        };

        let property = |name: &str| match randr.output_property(output, name) {
            Ok(value) => value,
            Err(e) => {
                trace!("{} property {} unreadable: {}", info.name, name, e);
                None
            }
        };

        let connector_type = property(PROPERTY_CONNECTOR_TYPE)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        let prime = property(PROPERTY_PRIME_SYNC).is_some();
        let edid = property(PROPERTY_EDID).and_then(|bytes| EdidIdentity::decode(&bytes));

        let display = Display {
            name: info.name.clone(),
            output,
            connected: info.connected,
            mm_width: info.mm_width,
            mm_height: info.mm_height,
            modes: info
                .modes
                .iter()
                .filter_map(|id| modes.get(id).map(|m| (*m).clone()))
                .collect(),
            crtc: info.crtc,
            geometry,
            connector_type,
            primary: primary == Some(output),
            prime,
            edid,
        };

        // `tracing`'s value-set expansion imports `field::display`, which
        // would shadow a local of the same name inside the macro.
        let d = &display;
        trace!(
            "{}: connected={} crtc={} {}x{}mm prime={}",
            d.name,
            d.connected,
            d.crtc,
            d.mm_width,
            d.mm_height,
            d.prime
        );
        displays.insert(info.name, display);
    }

    Ok(TopologySnapshot {
        displays,
        lid,
        config_timestamp: ts,
    })
}

/// Owns the last snapshot and the lid sensor
pub struct TopologyMonitor {
    lid: Box<dyn LidSensor>,
    lid_settle: Duration,
    current: Option<TopologySnapshot>,
}

impl TopologyMonitor {
    /// Create a monitor; `lid_settle` delays re-reading after the lid opens
    pub fn new(lid: Box<dyn LidSensor>, lid_settle: Duration) -> Self {
        Self {
            lid,
            lid_settle,
            current: None,
        }
    }

    /// Last snapshot, if any poll succeeded
    pub fn snapshot(&self) -> Option<&TopologySnapshot> {
        self.current.as_ref()
    }

    /// Current lid state straight from the sensor
    pub fn lid_state(&self) -> LidState {
        self.lid.state()
    }

    /// Replace the snapshot without change detection
    pub fn refresh(&mut self, randr: &dyn RandrClient) -> protocol::Result<&TopologySnapshot> {
        let snapshot = query_snapshot(randr, self.lid.state())?;
        Ok(self.current.insert(snapshot))
    }

    /// Query a new snapshot and report whether it changed
    pub fn poll(&mut self, randr: &dyn RandrClient) -> protocol::Result<Option<ChangeReason>> {
        let next = query_snapshot(randr, self.lid.state())?;
        let reason = detect_change(self.current.as_ref(), &next);
        self.current = Some(next);

        match &reason {
            Some(ChangeReason::LidOpened) => {
                info!("Lid opened, settling for {:?}", self.lid_settle);
                std::thread::sleep(self.lid_settle);
                self.refresh(randr)?;
            }
            Some(reason) => info!("Topology changed: {}", reason),
            None => trace!("Topology unchanged"),
        }

        Ok(reason)
    }
}
