//! Persisted Layout Store
//!
//! Read-only access to the layout the desktop session saved for the current
//! set of monitors. The GNOME session keeps one `<configuration>` per monitor
//! combination in `~/.config/monitors.xml`; the configuration whose monitor
//! specs match the EDID identities of the connected displays is selected.
//!
//! A missing, unreadable or unmatched store yields `None` and the daemon falls
//! back to the live topology.

pub mod monitors_xml;

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::multimon::Rect;
use crate::topology::EdidIdentity;

pub use monitors_xml::MonitorsXmlStore;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// File could not be read
    #[error("Failed to read layout store: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed XML
    #[error("Malformed layout store: {0}")]
    Xml(String),

    /// Element holds a value of the wrong type
    #[error("Invalid {field} value in layout store: {value:?}")]
    InvalidValue {
        /// Element name
        field: &'static str,
        /// Offending text
        value: String,
    },
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

/// Identity of a monitor as recorded by the session
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MonitorSpec {
    pub connector: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

impl MonitorSpec {
    /// Spec for a connected display with a decoded EDID
    pub fn from_identity(connector: &str, identity: &EdidIdentity) -> Self {
        Self {
            connector: connector.to_string(),
            vendor: identity.vendor.clone(),
            product: identity.product.clone(),
            serial: identity.serial.clone(),
        }
    }
}

/// One enabled monitor of a stored configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMonitor {
    pub spec: MonitorSpec,
    /// Logical position
    pub x: i32,
    pub y: i32,
    /// Mode size
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

impl StoredMonitor {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Stored configuration in its raw form
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoredConfiguration {
    pub monitors: Vec<StoredMonitor>,
    pub disabled: Vec<MonitorSpec>,
}

impl StoredConfiguration {
    /// All specs, enabled and disabled, sorted
    fn specs(&self) -> Vec<&MonitorSpec> {
        let mut specs: Vec<&MonitorSpec> = self
            .monitors
            .iter()
            .map(|m| &m.spec)
            .chain(self.disabled.iter())
            .collect();
        specs.sort();
        specs
    }
}

/// Layout selected for the current monitor combination
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoredLayout {
    monitors: BTreeMap<String, StoredMonitor>,
    disabled: Vec<String>,
}

impl StoredLayout {
    /// Recorded monitor for `connector`
    pub fn monitor(&self, connector: &str) -> Option<&StoredMonitor> {
        self.monitors.get(connector)
    }

    /// Recorded rectangle for `connector`
    pub fn rect(&self, connector: &str) -> Option<Rect> {
        self.monitor(connector).map(StoredMonitor::rect)
    }

    /// Recorded mode size for `connector`
    pub fn size(&self, connector: &str) -> Option<(u32, u32)> {
        self.monitor(connector).map(|m| (m.width, m.height))
    }

    /// Connectors the user turned off
    pub fn disabled(&self) -> &[String] {
        &self.disabled
    }

    pub fn is_disabled(&self, connector: &str) -> bool {
        self.disabled.iter().any(|d| d == connector)
    }
}

impl From<StoredConfiguration> for StoredLayout {
    fn from(config: StoredConfiguration) -> Self {
        Self {
            monitors: config
                .monitors
                .into_iter()
                .map(|m| (m.spec.connector.clone(), m))
                .collect(),
            disabled: config.disabled.into_iter().map(|s| s.connector).collect(),
        }
    }
}

/// Pick the configuration recorded for exactly these monitors
pub fn select_configuration(
    configurations: Vec<StoredConfiguration>,
    identities: &[(String, EdidIdentity)],
) -> Option<StoredLayout> {
    if identities.is_empty() {
        return None;
    }

    let mut wanted: Vec<MonitorSpec> = identities
        .iter()
        .map(|(connector, id)| MonitorSpec::from_identity(connector, id))
        .collect();
    wanted.sort();
    let wanted: Vec<&MonitorSpec> = wanted.iter().collect();

    configurations
        .into_iter()
        .find(|c| c.specs() == wanted)
        .map(StoredLayout::from)
}

/// Source of the persisted layout
#[cfg_attr(test, mockall::automock)]
pub trait LayoutStore: Send {
    /// Layout for the connected monitors, or `None` to use live topology
    fn load(&self, identities: &[(String, EdidIdentity)]) -> Option<StoredLayout>;
}

/// Store that never has a layout
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStore;

impl LayoutStore for NoStore {
    fn load(&self, _identities: &[(String, EdidIdentity)]) -> Option<StoredLayout> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(vendor: &str, product: &str) -> EdidIdentity {
        EdidIdentity {
            vendor: vendor.to_string(),
            product: product.to_string(),
            serial: "0x00000000".to_string(),
        }
    }

    fn monitor(connector: &str, id: &EdidIdentity, x: i32) -> StoredMonitor {
        StoredMonitor {
            spec: MonitorSpec::from_identity(connector, id),
            x,
            y: 0,
            width: 1920,
            height: 1080,
            primary: x == 0,
        }
    }

    #[test]
    fn test_select_matching_configuration() {
        let panel = identity("SHP", "0x1476");
        let hdmi = identity("DEL", "DELL U2415");

        let single = StoredConfiguration {
            monitors: vec![monitor("eDP-1", &panel, 0)],
            disabled: vec![],
        };
        let dual = StoredConfiguration {
            monitors: vec![monitor("eDP-1", &panel, 0), monitor("HDMI-1", &hdmi, 1920)],
            disabled: vec![],
        };

        let ids = vec![
            ("HDMI-1".to_string(), hdmi.clone()),
            ("eDP-1".to_string(), panel.clone()),
        ];
        let layout = select_configuration(vec![single, dual], &ids).unwrap();
        assert_eq!(layout.rect("HDMI-1"), Some(Rect::new(1920, 0, 1920, 1080)));
    }

    #[test]
    fn test_disabled_specs_count_for_matching() {
        let panel = identity("SHP", "0x1476");
        let hdmi = identity("DEL", "DELL U2415");

        let config = StoredConfiguration {
            monitors: vec![monitor("HDMI-1", &hdmi, 0)],
            disabled: vec![MonitorSpec::from_identity("eDP-1", &panel)],
        };

        let ids = vec![
            ("HDMI-1".to_string(), hdmi.clone()),
            ("eDP-1".to_string(), panel.clone()),
        ];
        let layout = select_configuration(vec![config], &ids).unwrap();
        assert!(layout.is_disabled("eDP-1"));
        assert!(layout.rect("eDP-1").is_none());
    }

    #[test]
    fn test_no_match_for_other_monitor() {
        let panel = identity("SHP", "0x1476");
        let config = StoredConfiguration {
            monitors: vec![monitor("eDP-1", &panel, 0)],
            disabled: vec![],
        };

        let ids = vec![("eDP-1".to_string(), identity("AUO", "0x303d"))];
        assert!(select_configuration(vec![config], &ids).is_none());
    }

    #[test]
    fn test_no_identities_no_layout() {
        assert!(select_configuration(vec![StoredConfiguration::default()], &[]).is_none());
    }
}
