//! Direct CRTC mode setting

use tracing::{debug, info};

use super::metamode::half;
use super::{ApplyError, ConfigStrategy, Result};
use crate::multimon::Layout;
use crate::protocol::{CrtcConfig, ProtocolError, RandrClient, ROTATE_0};
use crate::scaling::ScaleDecision;
use crate::store::StoredLayout;
use crate::topology::{Display, Dpi, TopologySnapshot, HIGH_DENSITY_DPI};

/// Sets one CRTC per display, fenced by the snapshot's config timestamp
pub struct DirectStrategy<'a> {
    randr: &'a dyn RandrClient,
    snapshot: &'a TopologySnapshot,
    store: Option<&'a StoredLayout>,
    committed: Vec<String>,
}

impl<'a> DirectStrategy<'a> {
    pub fn new(
        randr: &'a dyn RandrClient,
        snapshot: &'a TopologySnapshot,
        store: Option<&'a StoredLayout>,
    ) -> Self {
        Self {
            randr,
            snapshot,
            store,
            committed: Vec::new(),
        }
    }

    /// Displays configured so far, in commit order
    pub fn committed(&self) -> &[String] {
        &self.committed
    }

    /// Resolution to program and the density it was classified at
    ///
    /// When forcing, a stored low-density size is reused as is; anything
    /// else starts from native.
    fn target(&self, display: &Display, force: bool) -> Option<((u32, u32), Dpi)> {
        if force {
            if let Some((w, h)) = self.store.and_then(|s| s.size(&display.name)) {
                let saved = display.dpi_at(w, h);
                if saved.value().is_some_and(|dpi| dpi <= HIGH_DENSITY_DPI) {
                    return Some(((w, h), saved));
                }
            }
        }
        display.native_size().map(|size| (size, display.native_dpi()))
    }
}

impl ConfigStrategy for DirectStrategy<'_> {
    fn commit(
        &mut self,
        display: &Display,
        layout: &Layout,
        decision: &ScaleDecision,
    ) -> Result<Option<String>> {
        if !display.is_active()
            || self.snapshot.panel_override(&display.name)
            || display.modes.is_empty()
        {
            return Ok(None);
        }

        let Some(((width, height), dpi)) = self.target(display, decision.force) else {
            return Ok(None);
        };
        if dpi == Dpi::Unknown {
            // `tracing` macros shadow a local named `display`.
            let name = &display.name;
            debug!("{}: unknown density, leaving as is", name);
            return Ok(None);
        }

        let (width, height) = if decision.force && dpi.is_high_density() {
            (half(width), half(height))
        } else {
            (width, height)
        };

        let mode = display
            .find_mode(width, height)
            .ok_or_else(|| ApplyError::NoMatchingMode {
                display: display.name.clone(),
                width,
                height,
            })?;

        let Some(position) = layout.position(&display.name) else {
            return Ok(None);
        };

        let (rotation, outputs) = match &display.geometry {
            Some(g) => (g.rotation, g.outputs.clone()),
            None => (ROTATE_0, vec![display.output]),
        };

        let config = CrtcConfig {
            crtc: display.crtc,
            config_timestamp: self.snapshot.config_timestamp,
            x: position.x,
            y: position.y,
            mode: mode.id,
            rotation,
            outputs,
        };

        let name = display.name.as_str();
        info!("{}: {}x{} at +{}+{}", name, width, height, position.x, position.y);
        match self.randr.set_crtc_config(&config) {
            Ok(()) => {
                if !self.committed.contains(&display.name) {
                    self.committed.push(display.name.clone());
                }
                Ok(None)
            }
            Err(ProtocolError::StaleTimestamp(_)) => Err(ApplyError::Stale(display.name.clone())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::VendorPath;
    use crate::protocol::MemoryRandr;
    use crate::scaling::{plan, Plan, PlanInput, PolicyState};
    use crate::store::{MonitorSpec, StoredConfiguration, StoredMonitor};
    use crate::topology::test_support::{display, snapshot};
    use crate::topology::LidState;

    fn laptop() -> TopologySnapshot {
        snapshot(
            vec![
                display("eDP-1", 1, (3200, 1800), (277, 156), Some((0, 0))),
                display("HDMI-1", 2, (1920, 1080), (509, 286), Some((3200, 0))),
            ],
            LidState::Open,
        )
    }

    fn native_plan(snap: &TopologySnapshot, store: Option<&StoredLayout>) -> Plan {
        plan(PlanInput {
            snapshot: snap,
            store,
            path: VendorPath::Native,
            policy: &PolicyState::default(),
            revert: false,
        })
        .unwrap()
    }

    #[test]
    fn test_forced_high_density_is_halved() {
        let snap = laptop();
        let plan = native_plan(&snap, None);
        let randr = MemoryRandr::from_snapshot(&snap);
        let mut strategy = DirectStrategy::new(&randr, &snap, None);

        let result = strategy
            .commit(&snap.displays["eDP-1"], &plan.layout, &plan.decision)
            .unwrap();
        assert!(result.is_none());
        assert_eq!(strategy.committed(), ["eDP-1"]);

        let config = &randr.applied()[0];
        assert_eq!(config.mode, 11);
        assert_eq!(config.config_timestamp, 1000);
        assert_eq!(config.outputs, vec![1]);
    }

    #[test]
    fn test_stored_low_density_size_reused() {
        let snap = snapshot(
            vec![display("eDP-1", 1, (3200, 1800), (277, 156), Some((0, 0)))],
            LidState::Open,
        );
        let store = StoredLayout::from(StoredConfiguration {
            monitors: vec![StoredMonitor {
                spec: MonitorSpec {
                    connector: "eDP-1".to_string(),
                    ..MonitorSpec::default()
                },
                x: 0,
                y: 0,
                width: 1600,
                height: 900,
                primary: true,
            }],
            disabled: Vec::new(),
        });
        let plan = native_plan(&snap, Some(&store));
        let randr = MemoryRandr::from_snapshot(&snap);
        let mut strategy = DirectStrategy::new(&randr, &snap, Some(&store));

        strategy
            .commit(&snap.displays["eDP-1"], &plan.layout, &plan.decision)
            .unwrap();
        assert_eq!(randr.applied()[0].mode, 11);
    }

    #[test]
    fn test_missing_mode_is_reported() {
        let mut panel = display("eDP-1", 1, (3200, 1800), (277, 156), Some((0, 0)));
        panel.modes.truncate(1);
        let snap = snapshot(vec![panel], LidState::Open);
        let plan = native_plan(&snap, None);
        let randr = MemoryRandr::from_snapshot(&snap);
        let mut strategy = DirectStrategy::new(&randr, &snap, None);

        let err = strategy
            .commit(&snap.displays["eDP-1"], &plan.layout, &plan.decision)
            .unwrap_err();
        assert!(matches!(
            err,
            ApplyError::NoMatchingMode {
                width: 1600,
                height: 900,
                ..
            }
        ));
        assert!(randr.applied().is_empty());
    }

    #[test]
    fn test_inactive_display_skipped() {
        let snap = snapshot(
            vec![
                display("eDP-1", 1, (3200, 1800), (277, 156), Some((0, 0))),
                display("DP-1", 3, (2560, 1440), (597, 336), None),
            ],
            LidState::Open,
        );
        let plan = native_plan(&snap, None);
        let randr = MemoryRandr::from_snapshot(&snap);
        let mut strategy = DirectStrategy::new(&randr, &snap, None);

        strategy
            .commit(&snap.displays["DP-1"], &plan.layout, &plan.decision)
            .unwrap();
        assert!(strategy.committed().is_empty());
    }
}
