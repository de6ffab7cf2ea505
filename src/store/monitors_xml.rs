//! GNOME `monitors.xml` reader
//!
//! ```xml
//! <monitors version="2">
//!   <configuration>
//!     <logicalmonitor>
//!       <x>0</x>
//!       <y>0</y>
//!       <primary>yes</primary>
//!       <monitor>
//!         <monitorspec>
//!           <connector>eDP-1</connector>
//!           <vendor>SHP</vendor>
//!           <product>0x1476</product>
//!           <serial>0x00000000</serial>
//!         </monitorspec>
//!         <mode><width>3200</width><height>1800</height></mode>
//!       </monitor>
//!     </logicalmonitor>
//!     <disabled>
//!       <monitorspec>...</monitorspec>
//!     </disabled>
//!   </configuration>
//! </monitors>
//! ```

use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use super::{
    select_configuration, LayoutStore, MonitorSpec, Result, StoreError, StoredConfiguration,
    StoredLayout, StoredMonitor,
};
use crate::topology::EdidIdentity;

/// Default location relative to the user's config directory
pub const MONITORS_XML: &str = "monitors.xml";

/// Reads the session's `monitors.xml` on every load
#[derive(Debug, Clone)]
pub struct MonitorsXmlStore {
    path: PathBuf,
}

impl MonitorsXmlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/monitors.xml`, if a config directory exists
    pub fn user_default() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(MONITORS_XML)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LayoutStore for MonitorsXmlStore {
    fn load(&self, identities: &[(String, EdidIdentity)]) -> Option<StoredLayout> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No layout store at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match parse(&content) {
            Ok(configurations) => {
                let layout = select_configuration(configurations, identities);
                if layout.is_none() {
                    debug!("No stored configuration matches the connected monitors");
                }
                layout
            }
            Err(e) => {
                warn!("Ignoring {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

#[derive(Default)]
struct LogicalMonitor {
    x: i32,
    y: i32,
    primary: bool,
    monitors: Vec<(MonitorSpec, u32, u32)>,
}

#[derive(Default)]
struct Monitor {
    spec: MonitorSpec,
    width: u32,
    height: u32,
}

fn number<T: FromStr>(field: &'static str, text: &str) -> Result<T> {
    text.trim().parse().map_err(|_| StoreError::InvalidValue {
        field,
        value: text.to_string(),
    })
}

/// Parse every `<configuration>` in the document
pub fn parse(xml: &str) -> Result<Vec<StoredConfiguration>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut configurations = Vec::new();

    let mut config: Option<StoredConfiguration> = None;
    let mut logical: Option<LogicalMonitor> = None;
    let mut monitor: Option<Monitor> = None;
    let mut spec: Option<MonitorSpec> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "configuration" => config = Some(StoredConfiguration::default()),
                    "logicalmonitor" => logical = Some(LogicalMonitor::default()),
                    "monitor" => monitor = Some(Monitor::default()),
                    "monitorspec" => spec = Some(MonitorSpec::default()),
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| StoreError::Xml(e.to_string()))?;
                let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
                let element = path.last().map(String::as_str);

                match (parent, element) {
                    (Some("logicalmonitor"), Some("x")) => {
                        if let Some(l) = logical.as_mut() {
                            l.x = number("x", &text)?;
                        }
                    }
                    (Some("logicalmonitor"), Some("y")) => {
                        if let Some(l) = logical.as_mut() {
                            l.y = number("y", &text)?;
                        }
                    }
                    (Some("logicalmonitor"), Some("primary")) => {
                        if let Some(l) = logical.as_mut() {
                            l.primary = text.trim() == "yes";
                        }
                    }
                    (Some("mode"), Some("width")) => {
                        if let Some(m) = monitor.as_mut() {
                            m.width = number("width", &text)?;
                        }
                    }
                    (Some("mode"), Some("height")) => {
                        if let Some(m) = monitor.as_mut() {
                            m.height = number("height", &text)?;
                        }
                    }
                    (Some("monitorspec"), Some(field)) => {
                        if let Some(s) = spec.as_mut() {
                            let value = text.trim().to_string();
                            match field {
                                "connector" => s.connector = value,
                                "vendor" => s.vendor = value,
                                "product" => s.product = value,
                                "serial" => s.serial = value,
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                let Some(name) = path.pop() else {
                    return Err(StoreError::Xml("unbalanced end tag".to_string()));
                };
                let parent = path.last().map(String::as_str);

                match name.as_str() {
                    "monitorspec" => {
                        if let Some(s) = spec.take() {
                            match parent {
                                Some("monitor") => {
                                    if let Some(m) = monitor.as_mut() {
                                        m.spec = s;
                                    }
                                }
                                Some("disabled") => {
                                    if let Some(c) = config.as_mut() {
                                        c.disabled.push(s);
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    "monitor" => {
                        if let (Some(m), Some(l)) = (monitor.take(), logical.as_mut()) {
                            l.monitors.push((m.spec, m.width, m.height));
                        }
                    }
                    "logicalmonitor" => {
                        if let (Some(l), Some(c)) = (logical.take(), config.as_mut()) {
                            for (spec, width, height) in l.monitors {
                                c.monitors.push(StoredMonitor {
                                    spec,
                                    x: l.x,
                                    y: l.y,
                                    width,
                                    height,
                                    primary: l.primary,
                                });
                            }
                        }
                    }
                    "configuration" => {
                        if let Some(c) = config.take() {
                            configurations.push(c);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(StoreError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if !path.is_empty() {
        return Err(StoreError::Xml(format!("unclosed element <{}>", path.join("/"))));
    }

    Ok(configurations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DUAL: &str = r#"<monitors version="2">
  <configuration>
    <logicalmonitor>
      <x>0</x>
      <y>0</y>
      <scale>2</scale>
      <primary>yes</primary>
      <monitor>
        <monitorspec>
          <connector>eDP-1</connector>
          <vendor>SHP</vendor>
          <product>0x1476</product>
          <serial>0x00000000</serial>
        </monitorspec>
        <mode>
          <width>3200</width>
          <height>1800</height>
          <rate>59.98</rate>
        </mode>
      </monitor>
    </logicalmonitor>
    <logicalmonitor>
      <x>1600</x>
      <y>0</y>
      <scale>1</scale>
      <monitor>
        <monitorspec>
          <connector>HDMI-1</connector>
          <vendor>DEL</vendor>
          <product>DELL U2415</product>
          <serial>7MT0186R1FSL</serial>
        </monitorspec>
        <mode>
          <width>1920</width>
          <height>1200</height>
          <rate>59.95</rate>
        </mode>
      </monitor>
    </logicalmonitor>
  </configuration>
  <configuration>
    <logicalmonitor>
      <x>0</x>
      <y>0</y>
      <primary>yes</primary>
      <monitor>
        <monitorspec>
          <connector>HDMI-1</connector>
          <vendor>DEL</vendor>
          <product>DELL U2415</product>
          <serial>7MT0186R1FSL</serial>
        </monitorspec>
        <mode>
          <width>1920</width>
          <height>1200</height>
        </mode>
      </monitor>
    </logicalmonitor>
    <disabled>
      <monitorspec>
        <connector>eDP-1</connector>
        <vendor>SHP</vendor>
        <product>0x1476</product>
        <serial>0x00000000</serial>
      </monitorspec>
    </disabled>
  </configuration>
</monitors>"#;

    fn panel() -> EdidIdentity {
        EdidIdentity {
            vendor: "SHP".to_string(),
            product: "0x1476".to_string(),
            serial: "0x00000000".to_string(),
        }
    }

    fn dell() -> EdidIdentity {
        EdidIdentity {
            vendor: "DEL".to_string(),
            product: "DELL U2415".to_string(),
            serial: "7MT0186R1FSL".to_string(),
        }
    }

    #[test]
    fn test_parse_configurations() {
        let configs = parse(DUAL).unwrap();
        assert_eq!(configs.len(), 2);

        let first = &configs[0];
        assert_eq!(first.monitors.len(), 2);
        assert_eq!(first.monitors[1].spec.connector, "HDMI-1");
        assert_eq!(first.monitors[1].x, 1600);
        assert_eq!(first.monitors[1].height, 1200);
        assert!(first.monitors[0].primary);
        assert!(!first.monitors[1].primary);

        let second = &configs[1];
        assert_eq!(second.disabled.len(), 1);
        assert_eq!(second.disabled[0].connector, "eDP-1");
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MONITORS_XML);
        std::fs::write(&path, DUAL).unwrap();

        let store = MonitorsXmlStore::new(&path);
        let ids = vec![
            ("eDP-1".to_string(), panel()),
            ("HDMI-1".to_string(), dell()),
        ];
        let layout = store.load(&ids).unwrap();
        assert_eq!(layout.size("eDP-1"), Some((3200, 1800)));
        assert!(layout.disabled().is_empty());
    }

    #[test]
    fn test_missing_file_is_none() {
        let store = MonitorsXmlStore::new("/nonexistent/monitors.xml");
        assert!(store.load(&[("eDP-1".to_string(), panel())]).is_none());
    }

    #[test]
    fn test_corrupt_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MONITORS_XML);
        std::fs::write(&path, "<monitors><configuration><logicalmonitor><x>abc</x>").unwrap();

        let store = MonitorsXmlStore::new(&path);
        assert!(store.load(&[("eDP-1".to_string(), panel())]).is_none());
    }

    #[test]
    fn test_invalid_number_rejected() {
        let xml = "<monitors><configuration><logicalmonitor><x>left</x></logicalmonitor></configuration></monitors>";
        assert!(matches!(
            parse(xml),
            Err(StoreError::InvalidValue { field: "x", .. })
        ));
    }

    #[test]
    fn test_truncated_document_rejected() {
        assert!(parse("<monitors><configuration>").is_err());
    }
}
