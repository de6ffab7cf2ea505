//! In-memory RandR server
//!
//! Keeps outputs, CRTCs and modes in a table and applies `SetCrtcConfig`
//! to it, enforcing the configuration timestamp like a real server. Used to
//! drive the reconciler without an X display.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;

use super::{
    CrtcConfig, CrtcInfo, ModeInfo, OutputInfo, ProtocolError, RandrClient, Resources, Result,
    ROTATE_0,
};
use crate::topology::{TopologySnapshot, PROPERTY_CONNECTOR_TYPE, PROPERTY_PRIME_SYNC};

/// Server-side state
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub timestamp: u32,
    pub config_timestamp: u32,
    pub outputs: BTreeMap<u32, OutputInfo>,
    pub crtcs: BTreeMap<u32, CrtcInfo>,
    pub modes: Vec<ModeInfo>,
    pub properties: BTreeMap<(u32, String), Vec<u8>>,
    pub primary: Option<u32>,
    /// Every accepted `SetCrtcConfig`, in order
    pub applied: Vec<CrtcConfig>,
    /// Reject every `SetCrtcConfig` as stale
    pub stale: bool,
    next_mode_id: u32,
}

/// RandR transport backed by [`MemoryState`]
#[derive(Debug)]
pub struct MemoryRandr {
    state: Mutex<MemoryState>,
}

impl MemoryRandr {
    pub fn new(config_timestamp: u32) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                timestamp: config_timestamp,
                config_timestamp,
                next_mode_id: 0x1000,
                ..Default::default()
            }),
        }
    }

    /// Server whose state reproduces `snapshot`
    pub fn from_snapshot(snapshot: &TopologySnapshot) -> Self {
        let randr = Self::new(snapshot.config_timestamp);
        {
            let mut state = randr.state();
            for display in snapshot.displays.values() {
                for mode in &display.modes {
                    if !state.modes.iter().any(|m| m.id == mode.id) {
                        state.modes.push(mode.clone());
                    }
                }

                state.outputs.insert(
                    display.output,
                    OutputInfo {
                        name: display.name.clone(),
                        crtc: display.crtc,
                        mm_width: display.mm_width,
                        mm_height: display.mm_height,
                        connected: display.connected,
                        modes: display.modes.iter().map(|m| m.id).collect(),
                    },
                );

                if let Some(g) = &display.geometry {
                    let mode = display
                        .modes
                        .iter()
                        .find(|m| u32::from(m.width) == g.width && u32::from(m.height) == g.height)
                        .map_or(0, |m| m.id);
                    state.crtcs.insert(
                        display.crtc,
                        CrtcInfo {
                            x: g.x,
                            y: g.y,
                            width: g.width,
                            height: g.height,
                            mode,
                            rotation: g.rotation,
                            outputs: g.outputs.clone(),
                        },
                    );
                }

                if let Some(kind) = &display.connector_type {
                    state.properties.insert(
                        (display.output, PROPERTY_CONNECTOR_TYPE.to_string()),
                        kind.as_bytes().to_vec(),
                    );
                }
                if display.prime {
                    state.properties.insert(
                        (display.output, PROPERTY_PRIME_SYNC.to_string()),
                        vec![1],
                    );
                }
                if display.primary {
                    state.primary = Some(display.output);
                }
            }
        }
        randr
    }

    /// Lock the state for inspection or modification
    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock()
    }

    /// Accepted CRTC configurations so far
    pub fn applied(&self) -> Vec<CrtcConfig> {
        self.state.lock().applied.clone()
    }

    fn output_name(state: &MemoryState, output: u32) -> String {
        state
            .outputs
            .get(&output)
            .map_or_else(|| output.to_string(), |o| o.name.clone())
    }
}

fn unknown(request: &'static str, id: u32) -> ProtocolError {
    ProtocolError::Request {
        request,
        reason: format!("unknown id {}", id),
    }
}

impl RandrClient for MemoryRandr {
    fn list_resources(&self) -> Result<Resources> {
        let state = self.state.lock();
        Ok(Resources {
            timestamp: state.timestamp,
            config_timestamp: state.config_timestamp,
            outputs: state.outputs.keys().copied().collect(),
            crtcs: state.crtcs.keys().copied().collect(),
            modes: state.modes.clone(),
        })
    }

    fn output_info(&self, output: u32, _config_timestamp: u32) -> Result<OutputInfo> {
        self.state
            .lock()
            .outputs
            .get(&output)
            .cloned()
            .ok_or_else(|| unknown("GetOutputInfo", output))
    }

    fn crtc_info(&self, crtc: u32, _config_timestamp: u32) -> Result<CrtcInfo> {
        self.state
            .lock()
            .crtcs
            .get(&crtc)
            .cloned()
            .ok_or_else(|| unknown("GetCrtcInfo", crtc))
    }

    fn set_crtc_config(&self, config: &CrtcConfig) -> Result<()> {
        let mut state = self.state.lock();
        if state.stale || config.config_timestamp != state.config_timestamp {
            return Err(ProtocolError::StaleTimestamp(config.crtc));
        }

        let info = if config.mode == 0 {
            CrtcInfo {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
                mode: 0,
                rotation: ROTATE_0,
                outputs: Vec::new(),
            }
        } else {
            let mode = state
                .modes
                .iter()
                .find(|m| m.id == config.mode)
                .ok_or_else(|| unknown("SetCrtcConfig", config.mode))?;
            CrtcInfo {
                x: config.x,
                y: config.y,
                width: u32::from(mode.width),
                height: u32::from(mode.height),
                mode: config.mode,
                rotation: config.rotation,
                outputs: config.outputs.clone(),
            }
        };

        for (id, output) in state.outputs.iter_mut() {
            if config.outputs.contains(id) {
                output.crtc = config.crtc;
            } else if output.crtc == config.crtc {
                output.crtc = 0;
            }
        }
        state.crtcs.insert(config.crtc, info);
        state.timestamp += 1;
        state.applied.push(config.clone());
        Ok(())
    }

    fn output_property(&self, output: u32, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .state
            .lock()
            .properties
            .get(&(output, name.to_string()))
            .cloned())
    }

    fn create_mode(&self, mode: &ModeInfo) -> Result<u32> {
        let mut state = self.state.lock();
        if state.modes.iter().any(|m| m.name == mode.name) {
            return Err(ProtocolError::Request {
                request: "CreateMode",
                reason: format!("mode {} already exists", mode.name),
            });
        }
        let id = state.next_mode_id;
        state.next_mode_id += 1;
        state.modes.push(ModeInfo {
            id,
            ..mode.clone()
        });
        Ok(id)
    }

    fn add_output_mode(&self, output: u32, mode: u32) -> Result<()> {
        let mut state = self.state.lock();
        let info = state
            .outputs
            .get_mut(&output)
            .ok_or_else(|| unknown("AddOutputMode", output))?;
        if !info.modes.contains(&mode) {
            info.modes.push(mode);
        }
        Ok(())
    }

    fn output_primary(&self) -> Result<Option<u32>> {
        Ok(self.state.lock().primary)
    }

    fn set_output_primary(&self, output: u32) -> Result<()> {
        let mut state = self.state.lock();
        if !state.outputs.contains_key(&output) {
            return Err(unknown("SetOutputPrimary", output));
        }
        tracing::debug!("Primary output: {}", Self::output_name(&state, output));
        state.primary = Some(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::test_support::{display, snapshot};
    use crate::topology::{query_snapshot, LidState};

    fn laptop() -> TopologySnapshot {
        snapshot(
            vec![
                display("eDP-1", 1, (3200, 1800), (277, 156), Some((0, 0))),
                display("HDMI-1", 2, (1920, 1080), (509, 286), None),
            ],
            LidState::Open,
        )
    }

    #[test]
    fn test_snapshot_round_trip_through_queries() {
        let snap = laptop();
        let randr = MemoryRandr::from_snapshot(&snap);
        let queried = query_snapshot(&randr, LidState::Open).unwrap();

        assert_eq!(queried.displays.len(), 2);
        let panel = queried.display("eDP-1").unwrap();
        assert_eq!(panel.crtc, 101);
        assert_eq!(panel.geometry.as_ref().map(|g| g.width), Some(3200));
        assert_eq!(panel.native_size(), Some((3200, 1800)));
        assert!(!queried.display("HDMI-1").unwrap().is_active());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let randr = MemoryRandr::from_snapshot(&laptop());
        let config = CrtcConfig {
            crtc: 101,
            config_timestamp: 999,
            x: 0,
            y: 0,
            mode: 11,
            rotation: ROTATE_0,
            outputs: vec![1],
        };
        assert!(matches!(
            randr.set_crtc_config(&config),
            Err(ProtocolError::StaleTimestamp(101))
        ));
        assert!(randr.applied().is_empty());
    }

    #[test]
    fn test_disable_detaches_outputs() {
        let randr = MemoryRandr::from_snapshot(&laptop());
        randr.set_crtc_config(&CrtcConfig::disable(101, 1000)).unwrap();
        assert_eq!(randr.output_info(1, 1000).unwrap().crtc, 0);
        assert_eq!(randr.crtc_info(101, 1000).unwrap().mode, 0);
    }

    #[test]
    fn test_duplicate_mode_rejected() {
        let randr = MemoryRandr::from_snapshot(&laptop());
        let mut mode = randr.list_resources().unwrap().modes[0].clone();
        mode.name = "1600x900".to_string();
        let id = randr.create_mode(&mode).unwrap();
        assert!(randr.create_mode(&mode).is_err());

        randr.add_output_mode(1, id).unwrap();
        randr.add_output_mode(1, id).unwrap();
        let modes = randr.output_info(1, 1000).unwrap().modes;
        assert_eq!(modes.iter().filter(|m| **m == id).count(), 1);
    }
}
