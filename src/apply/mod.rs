//! Output Configuration Applier
//!
//! Commits a [`Plan`] to the hardware. Two strategies implement
//! [`ConfigStrategy`]:
//!
//! - [`DirectStrategy`] programs one CRTC per display through RandR
//! - [`MetamodeStrategy`] builds per-display fragments of an NVIDIA metamode
//!
//! # Sequences
//!
//! ```text
//! Native path                         Pixel-doubling path
//! ───────────                         ───────────────────
//! direct commit, every display        read current metamode
//! unforced? escalate compositor       prime displays: direct commit
//!           scale to 2 if needed      others: metamode fragments
//!                                     compositor scale (native fallback)
//!                                     settle, re-commit prime displays
//!                                     assign joined metamode
//!              └──────────── turn off ────────────┘
//! ```
//!
//! Turning off covers displays the store lists as disabled, connected
//! displays that had no CRTC when the snapshot was taken, and active
//! displays left out of the layout. Configuring other outputs can bring
//! those back, so the applier disables them explicitly at the end.
//!
//! No error here aborts a cycle. Stale timestamps abandon the display,
//! missing modes skip it, and collaborator failures are logged.

pub mod direct;
pub mod metamode;

use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gpu::VendorPath;
use crate::multimon::Layout;
use crate::protocol::{CrtcConfig, ProtocolError, RandrClient};
use crate::scaling::{self, GlobalMode, Plan, PlanInput, PolicyState, ScaleDecision, ScaleMode};
use crate::session::{MetamodeClient, ScaleControl, SessionError};
use crate::store::StoredLayout;
use crate::topology::{Display, TopologySnapshot, STRICT_HIGH_DENSITY_DPI};

pub use direct::DirectStrategy;
pub use metamode::{DpyMap, MetaMode, MetamodeStrategy};

/// Time the compositor gets after a scale change before modes are assigned
pub const SCALE_SETTLE: Duration = Duration::from_millis(100);

/// Applier errors
#[derive(Error, Debug)]
pub enum ApplyError {
    /// RandR request failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Target resolution is not among the display's modes
    #[error("{display} has no {width}x{height} mode")]
    NoMatchingMode {
        display: String,
        width: u32,
        height: u32,
    },

    /// Server configuration moved on since the snapshot
    #[error("Configuration of {0} is stale")]
    Stale(String),

    /// Session collaborator failed
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Applier result type
pub type Result<T> = std::result::Result<T, ApplyError>;

/// Per-display commit step
pub trait ConfigStrategy {
    /// Commit one display
    ///
    /// Returns a fragment when the strategy batches its output (metamode),
    /// `None` when the display was configured directly or skipped.
    fn commit(
        &mut self,
        display: &Display,
        layout: &Layout,
        decision: &ScaleDecision,
    ) -> Result<Option<String>>;
}

/// Outcome of one apply pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Displays configured through RandR
    pub committed: Vec<String>,
    /// Displays given up for this cycle on a stale timestamp
    pub abandoned: Vec<String>,
    /// Displays that could not be configured
    pub failed: Vec<String>,
    /// Metamode assigned last, if any
    pub metamode: Option<String>,
    /// Compositor scale set, if it changed
    pub scale: Option<u32>,
    pub turned_off: Vec<String>,
}

/// What to apply
#[derive(Debug, Clone, Copy)]
pub struct ApplyInput<'a> {
    pub snapshot: &'a TopologySnapshot,
    pub plan: &'a Plan,
    pub store: Option<&'a StoredLayout>,
    pub path: VendorPath,
    pub policy: &'a PolicyState,
}

impl<'a> ApplyInput<'a> {
    fn plan_input(&self, revert: bool) -> PlanInput<'a> {
        PlanInput {
            snapshot: self.snapshot,
            store: self.store,
            path: self.path,
            policy: self.policy,
            revert,
        }
    }

    /// Displays that must not be committed and end up turned off
    fn off_list(&self) -> BTreeSet<String> {
        let mut off: BTreeSet<String> = self
            .store
            .map(|s| s.disabled().iter().cloned().collect())
            .unwrap_or_default();
        off.extend(
            self.snapshot
                .connected()
                .filter(|d| !d.is_active())
                .map(|d| d.name.clone()),
        );
        off
    }
}

/// Drives one commit against the server and the session collaborators
pub struct Applier<'a> {
    randr: &'a dyn RandrClient,
    scale: &'a mut dyn ScaleControl,
    metamode: &'a mut dyn MetamodeClient,
    settle: Duration,
}

impl<'a> Applier<'a> {
    pub fn new(
        randr: &'a dyn RandrClient,
        scale: &'a mut dyn ScaleControl,
        metamode: &'a mut dyn MetamodeClient,
    ) -> Self {
        Self {
            randr,
            scale,
            metamode,
            settle: SCALE_SETTLE,
        }
    }

    /// Override the post-scale settle delay
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Commit `input.plan` along the vendor path
    pub fn apply(&mut self, input: ApplyInput<'_>) -> ApplyReport {
        let mut report = ApplyReport::default();
        let off = input.off_list();
        if !off.is_empty() {
            debug!("Not committing: {:?}", off);
        }

        match input.path {
            VendorPath::Native => self.apply_native(&input, &off, &mut report),
            VendorPath::PixelDoubling => self.apply_pixel_doubling(&input, &off, &mut report),
        }

        if let Err(e) = self.turn_off(&input, &off, &mut report) {
            warn!("Failed to turn off displays: {}", e);
        }

        info!(
            "Applied: {} committed, {} abandoned, {} failed, {} turned off",
            report.committed.len(),
            report.abandoned.len(),
            report.failed.len(),
            report.turned_off.len()
        );
        report
    }

    fn apply_native(&mut self, input: &ApplyInput<'_>, off: &BTreeSet<String>, report: &mut ApplyReport) {
        let mut direct = DirectStrategy::new(self.randr, input.snapshot, input.store);
        let displays = input
            .snapshot
            .active()
            .filter(|d| !off.contains(&d.name));
        commit_each(&mut direct, displays, input.plan, report);
        merge_committed(&direct, report);

        if !input.plan.decision.force {
            self.escalate_unforced(input, report);
        }
    }

    /// Raise the compositor scale when native resolutions are kept
    ///
    /// The compositor only picks scale 2 on its own above 192 DPI. An
    /// internal panel above that, or an external display above 170 with no
    /// low-density display around, still needs it set.
    fn escalate_unforced(&mut self, input: &ApplyInput<'_>, report: &mut ApplyReport) {
        let current = self.scale.get_scale().unwrap_or_else(|e| {
            debug!("Compositor scale unreadable ({}), assuming 2", e);
            2
        });
        if current >= 2 {
            return;
        }

        let lowdpi = input.plan.decision.types.lowdpi;
        let needs_two = input.snapshot.active().any(|d| {
            let dpi = d.native_dpi();
            if d.is_internal() {
                dpi.exceeds(STRICT_HIGH_DENSITY_DPI)
            } else {
                dpi.is_high_density() && !lowdpi
            }
        });
        if needs_two {
            self.set_scale(2, report);
        }
    }

    fn apply_pixel_doubling(
        &mut self,
        input: &ApplyInput<'_>,
        off: &BTreeSet<String>,
        report: &mut ApplyReport,
    ) {
        let current = self.read_metamode();
        let plan = input.plan;
        let decision = &plan.decision;

        let mut direct = DirectStrategy::new(self.randr, input.snapshot, input.store);
        let (prime, batched): (Vec<&Display>, Vec<&Display>) = input
            .snapshot
            .active()
            .filter(|d| !off.contains(&d.name))
            .partition(|d| d.prime);
        commit_each(&mut direct, prime.into_iter(), plan, report);
        let fragments = {
            let mut metamode = MetamodeStrategy::new(input.snapshot, &current);
            commit_each(&mut metamode, batched.into_iter(), plan, report)
        };

        if decision.types.hidpi {
            match input.policy.scale_mode {
                ScaleMode::LowDpi => self.set_scale_with_fallback(1, input, off, &current, report),
                ScaleMode::HiDpi => {
                    let scale = self.scale.get_scale().unwrap_or_else(|e| {
                        debug!("Compositor scale unreadable ({}), assuming 2", e);
                        2
                    });
                    if scale < 2 {
                        self.set_scale_with_fallback(2, input, off, &current, report);
                    }
                }
            }

            std::thread::sleep(self.settle);

            let prime = input
                .snapshot
                .active()
                .filter(|d| d.prime && !off.contains(&d.name));
            commit_each(&mut direct, prime, plan, report);

            if !fragments.is_empty() {
                if let Err(e) = self.assign(&fragments, report) {
                    warn!("Failed to assign metamode: {}", e);
                }
            }

            if input.policy.scale_mode == ScaleMode::LowDpi && self.scale_above_one() {
                self.set_scale(1, report);
            }
        } else if decision.types.lowdpi && self.scale_above_one() {
            debug!("No high-density displays left, dropping compositor scale");
            self.set_scale(1, report);
        }

        merge_committed(&direct, report);
    }

    /// Set the compositor scale, retrying once at native resolution
    ///
    /// The compositor validates the scale against the mode it currently
    /// sees; a doubled framebuffer can make it refuse. Assigning a native
    /// metamode first gives it a configuration it accepts.
    fn set_scale_with_fallback(
        &mut self,
        scale: u32,
        input: &ApplyInput<'_>,
        off: &BTreeSet<String>,
        current: &MetaMode,
        report: &mut ApplyReport,
    ) {
        match self.scale.set_scale(scale) {
            Ok(()) => {
                report.scale = Some(scale);
                return;
            }
            Err(e) => info!(
                "Compositor refused scale {} ({}), retrying at native resolution",
                scale, e
            ),
        }

        let native = match scaling::plan(input.plan_input(true)) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Native fallback layout failed: {}", e);
                return;
            }
        };

        let strategy = MetamodeStrategy::new(input.snapshot, current).with_mode(GlobalMode::Native);
        let fragments: Vec<String> = input
            .snapshot
            .active()
            .filter(|d| !d.prime && !off.contains(&d.name))
            .filter_map(|d| strategy.fragment(d, &native.layout, &native.decision))
            .collect();

        if !fragments.is_empty() {
            if let Err(e) = self.assign(&fragments, report) {
                warn!("Failed to assign native metamode: {}", e);
            }
        }

        self.set_scale(scale, report);
    }

    fn set_scale(&mut self, scale: u32, report: &mut ApplyReport) {
        match self.scale.set_scale(scale) {
            Ok(()) => {
                info!("Compositor scale set to {}", scale);
                report.scale = Some(scale);
            }
            Err(e) => info!("Could not set compositor scale {}: {}", scale, e),
        }
    }

    fn scale_above_one(&self) -> bool {
        matches!(self.scale.get_scale(), Ok(scale) if scale > 1)
    }

    fn read_metamode(&self) -> MetaMode {
        let dpys = match self.metamode.dpys() {
            Ok(output) => DpyMap::parse(&output),
            Err(e) => {
                warn!("Failed to list display devices: {}", e);
                DpyMap::default()
            }
        };
        match self.metamode.current_metamode() {
            Ok(output) => MetaMode::parse(&output, &dpys),
            Err(e) => {
                warn!("Failed to read current metamode: {}", e);
                MetaMode::default()
            }
        }
    }

    fn assign(&mut self, fragments: &[String], report: &mut ApplyReport) -> Result<()> {
        let metamode = metamode::join(fragments);
        self.metamode.assign_metamode(&metamode)?;
        report.metamode = Some(metamode);
        Ok(())
    }

    /// Disable displays that must stay dark
    ///
    /// Reads the outputs again since committing may have moved CRTCs.
    fn turn_off(
        &mut self,
        input: &ApplyInput<'_>,
        off: &BTreeSet<String>,
        report: &mut ApplyReport,
    ) -> Result<()> {
        let mut targets: BTreeSet<&str> = off.iter().map(String::as_str).collect();
        targets.extend(
            input
                .snapshot
                .connected()
                .filter(|d| d.is_active() && !input.plan.layout.contains(&d.name))
                .map(|d| d.name.as_str()),
        );
        if targets.is_empty() {
            return Ok(());
        }

        let resources = self.randr.list_resources()?;
        let ts = resources.config_timestamp;
        for &output in &resources.outputs {
            let info = self.randr.output_info(output, ts)?;
            if info.crtc == 0 || !targets.contains(info.name.as_str()) {
                continue;
            }

            info!("{}: turning off", info.name);
            match self.randr.set_crtc_config(&CrtcConfig::disable(info.crtc, ts)) {
                Ok(()) => report.turned_off.push(info.name),
                Err(ProtocolError::StaleTimestamp(_)) => {
                    warn!("{}: configuration changed, not turned off", info.name);
                    report.abandoned.push(info.name);
                }
                Err(e) => {
                    warn!("{}: failed to turn off: {}", info.name, e);
                    report.failed.push(info.name);
                }
            }
        }
        Ok(())
    }
}

/// Commit `displays` one by one, collecting batched fragments
///
/// Failures are recorded in `report` and never stop the remaining displays.
fn commit_each<'d>(
    strategy: &mut dyn ConfigStrategy,
    displays: impl Iterator<Item = &'d Display>,
    plan: &Plan,
    report: &mut ApplyReport,
) -> Vec<String> {
    let mut fragments = Vec::new();
    for display in displays {
        match strategy.commit(display, &plan.layout, &plan.decision) {
            Ok(Some(fragment)) => fragments.push(fragment),
            Ok(None) => {}
            Err(ApplyError::Stale(name)) => {
                warn!("{}: configuration changed, abandoning for this cycle", name);
                if !report.abandoned.contains(&name) {
                    report.abandoned.push(name);
                }
            }
            Err(e) => {
                let name = &display.name;
                warn!("{}: {}", name, e);
                if !report.failed.contains(name) {
                    report.failed.push(name.clone());
                }
            }
        }
    }
    fragments
}

fn merge_committed(strategy: &DirectStrategy<'_>, report: &mut ApplyReport) {
    for name in strategy.committed() {
        if !report.committed.contains(name) {
            report.committed.push(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MemoryRandr;
    use crate::session::{MockMetamodeClient, MockScaleControl};
    use crate::store::{MonitorSpec, StoredConfiguration};
    use crate::topology::test_support::{display, snapshot};
    use crate::topology::LidState;
    use mockall::predicate::eq;
    use std::sync::Arc;

    // =========================================================================
    // Helpers
    // =========================================================================

    fn mixed_laptop(lid: LidState) -> TopologySnapshot {
        snapshot(
            vec![
                display("eDP-1", 1, (3200, 1800), (277, 156), Some((0, 0))),
                display("HDMI-1", 2, (1920, 1080), (509, 286), Some((3200, 0))),
            ],
            lid,
        )
    }

    fn nvidia_desk() -> TopologySnapshot {
        snapshot(
            vec![
                display("DP-0", 1, (3840, 2160), (344, 194), Some((0, 0))),
                display("HDMI-0", 2, (1920, 1080), (509, 286), Some((3840, 0))),
            ],
            LidState::Open,
        )
    }

    fn plan_for(
        snap: &TopologySnapshot,
        store: Option<&StoredLayout>,
        path: VendorPath,
        policy: &PolicyState,
    ) -> Plan {
        scaling::plan(PlanInput {
            snapshot: snap,
            store,
            path,
            policy,
            revert: false,
        })
        .unwrap()
    }

    fn quiet_metamode() -> MockMetamodeClient {
        let mut client = MockMetamodeClient::new();
        client.expect_dpys().returning(|| Ok(String::new()));
        client
            .expect_current_metamode()
            .returning(|| Ok(String::new()));
        client
    }

    fn apply(
        randr: &MemoryRandr,
        scale: &mut MockScaleControl,
        metamode: &mut MockMetamodeClient,
        input: ApplyInput<'_>,
    ) -> ApplyReport {
        Applier::new(randr, scale, metamode)
            .with_settle(Duration::ZERO)
            .apply(input)
    }

    // =========================================================================
    // Native path
    // =========================================================================

    #[test]
    fn test_native_forced_halves_high_density_panel() {
        let snap = mixed_laptop(LidState::Open);
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::Native, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);
        let mut scale = MockScaleControl::new();
        let mut metamode = MockMetamodeClient::new();

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::Native,
                policy: &policy,
            },
        );

        assert_eq!(report.committed, vec!["HDMI-1", "eDP-1"]);
        let applied = randr.applied();
        let panel = applied.iter().find(|c| c.crtc == 101).unwrap();
        assert_eq!(panel.mode, 11);
        assert_eq!((panel.x, panel.y), (0, 0));
        let hdmi = applied.iter().find(|c| c.crtc == 102).unwrap();
        assert_eq!(hdmi.mode, 20);
        assert_eq!((hdmi.x, hdmi.y), (1600, 0));
        assert!(report.turned_off.is_empty());
    }

    #[test]
    fn test_native_unforced_escalates_scale_for_panel() {
        let snap = snapshot(
            vec![display("eDP-1", 1, (3840, 2160), (344, 194), Some((0, 0)))],
            LidState::Open,
        );
        let policy = PolicyState {
            unforce: true,
            ..PolicyState::default()
        };
        let plan = plan_for(&snap, None, VendorPath::Native, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);

        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(1));
        scale
            .expect_set_scale()
            .with(eq(2))
            .times(1)
            .returning(|_| Ok(()));
        let mut metamode = MockMetamodeClient::new();

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::Native,
                policy: &policy,
            },
        );

        assert_eq!(report.scale, Some(2));
        assert_eq!(randr.applied()[0].mode, 10);
    }

    #[test]
    fn test_native_unforced_keeps_scale_with_low_density_external() {
        let snap = snapshot(
            vec![
                display("DP-1", 1, (2560, 1440), (310, 174), Some((0, 0))),
                display("HDMI-1", 2, (1920, 1080), (509, 286), Some((2560, 0))),
            ],
            LidState::Open,
        );
        let policy = PolicyState {
            unforce: true,
            ..PolicyState::default()
        };
        let plan = plan_for(&snap, None, VendorPath::Native, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);

        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(1));
        scale.expect_set_scale().never();
        let mut metamode = MockMetamodeClient::new();

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::Native,
                policy: &policy,
            },
        );
        assert_eq!(report.scale, None);
    }

    #[test]
    fn test_stale_timestamp_abandons_displays() {
        let snap = mixed_laptop(LidState::Open);
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::Native, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);
        randr.state().stale = true;
        let mut scale = MockScaleControl::new();
        let mut metamode = MockMetamodeClient::new();

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::Native,
                policy: &policy,
            },
        );

        assert!(report.committed.is_empty());
        assert_eq!(report.abandoned, vec!["HDMI-1", "eDP-1"]);
        assert!(randr.applied().is_empty());
    }

    /// Fails on one connector and batches a fragment for every other
    struct FailingOn(&'static str);

    impl ConfigStrategy for FailingOn {
        fn commit(
            &mut self,
            display: &Display,
            _layout: &Layout,
            _decision: &ScaleDecision,
        ) -> Result<Option<String>> {
            if display.name == self.0 {
                Err(ApplyError::NoMatchingMode {
                    display: display.name.clone(),
                    width: 1,
                    height: 1,
                })
            } else {
                Ok(Some(format!("{}: nvidia-auto-select", display.name)))
            }
        }
    }

    #[test]
    fn test_strategy_error_recorded_and_others_batched() {
        let snap = nvidia_desk();
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::PixelDoubling, &policy);
        let mut report = ApplyReport::default();

        let fragments = commit_each(&mut FailingOn("DP-0"), snap.active(), &plan, &mut report);

        assert_eq!(fragments, vec!["HDMI-0: nvidia-auto-select"]);
        assert_eq!(report.failed, vec!["DP-0"]);
        assert!(report.abandoned.is_empty());
    }

    // =========================================================================
    // Turning off
    // =========================================================================

    #[test]
    fn test_store_disabled_display_turned_off() {
        let snap = mixed_laptop(LidState::Open);
        let store = StoredLayout::from(StoredConfiguration {
            monitors: Vec::new(),
            disabled: vec![MonitorSpec {
                connector: "HDMI-1".to_string(),
                ..MonitorSpec::default()
            }],
        });
        let policy = PolicyState::default();
        let plan = plan_for(&snap, Some(&store), VendorPath::Native, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);
        let mut scale = MockScaleControl::new();
        let mut metamode = MockMetamodeClient::new();

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: Some(&store),
                path: VendorPath::Native,
                policy: &policy,
            },
        );

        assert_eq!(report.committed, vec!["eDP-1"]);
        assert_eq!(report.turned_off, vec!["HDMI-1"]);
        assert_eq!(randr.crtc_info(102, 1000).unwrap().mode, 0);
    }

    #[test]
    fn test_closed_lid_panel_turned_off() {
        let snap = mixed_laptop(LidState::Closed);
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::Native, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);
        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(2));
        let mut metamode = MockMetamodeClient::new();

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::Native,
                policy: &policy,
            },
        );

        assert_eq!(report.committed, vec!["HDMI-1"]);
        assert_eq!(report.turned_off, vec!["eDP-1"]);
        let hdmi = randr.crtc_info(102, 1000).unwrap();
        assert_eq!((hdmi.x, hdmi.y), (0, 0));
    }

    // =========================================================================
    // Pixel-doubling path
    // =========================================================================

    #[test]
    fn test_pixel_doubling_sets_scale_then_assigns_metamode() {
        let snap = nvidia_desk();
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::PixelDoubling, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);

        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(1));
        scale
            .expect_set_scale()
            .with(eq(2))
            .times(1)
            .returning(|_| Ok(()));

        let assigned = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut metamode = quiet_metamode();
        let sink = Arc::clone(&assigned);
        metamode.expect_assign_metamode().returning(move |m| {
            sink.lock().push(m.to_string());
            Ok(())
        });

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::PixelDoubling,
                policy: &policy,
            },
        );

        let assigned = assigned.lock();
        assert_eq!(assigned.len(), 1);
        assert!(assigned[0].starts_with("DP-0: nvidia-auto-select @3840x2160 +0+0"));
        assert!(assigned[0].contains("HDMI-0: nvidia-auto-select @3840x2160 +3840+0"));
        assert_eq!(report.metamode.as_deref(), Some(assigned[0].as_str()));
        assert_eq!(report.scale, Some(2));
        assert!(randr.applied().is_empty());
    }

    #[test]
    fn test_pixel_doubling_scale_fallback_assigns_native_first() {
        let snap = nvidia_desk();
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::PixelDoubling, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);

        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(1));
        let mut attempts = 0;
        scale.expect_set_scale().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(SessionError::Parse {
                    what: "scale",
                    value: "refused".to_string(),
                })
            } else {
                Ok(())
            }
        });

        let assigned = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut metamode = quiet_metamode();
        let sink = Arc::clone(&assigned);
        metamode.expect_assign_metamode().returning(move |m| {
            sink.lock().push(m.to_string());
            Ok(())
        });

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::PixelDoubling,
                policy: &policy,
            },
        );

        let assigned = assigned.lock();
        assert_eq!(assigned.len(), 2);
        assert!(assigned[0].contains("HDMI-0: nvidia-auto-select @1920x1080 +3840+0"));
        assert!(assigned[1].contains("HDMI-0: nvidia-auto-select @3840x2160 +3840+0"));
        assert_eq!(report.scale, Some(2));
    }

    #[test]
    fn test_pixel_doubling_low_density_only_drops_scale() {
        let snap = snapshot(
            vec![display("HDMI-0", 2, (1920, 1080), (509, 286), Some((0, 0)))],
            LidState::Open,
        );
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::PixelDoubling, &policy);
        let randr = MemoryRandr::from_snapshot(&snap);

        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(2));
        scale
            .expect_set_scale()
            .with(eq(1))
            .times(1)
            .returning(|_| Ok(()));
        let mut metamode = quiet_metamode();
        metamode.expect_assign_metamode().never();

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::PixelDoubling,
                policy: &policy,
            },
        );
        assert_eq!(report.scale, Some(1));
        assert!(report.metamode.is_none());
    }

    #[test]
    fn test_prime_display_committed_directly() {
        let mut panel = display("eDP-1-1", 1, (3840, 2160), (344, 194), Some((0, 0)));
        panel.prime = true;
        let snap = snapshot(
            vec![
                panel,
                display("HDMI-0", 2, (1920, 1080), (509, 286), Some((3840, 0))),
            ],
            LidState::Open,
        );
        let policy = PolicyState::default();
        let plan = plan_for(&snap, None, VendorPath::PixelDoubling, &policy);
        assert!(!plan.decision.force);
        let randr = MemoryRandr::from_snapshot(&snap);

        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(2));
        let assigned = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut metamode = quiet_metamode();
        let sink = Arc::clone(&assigned);
        metamode.expect_assign_metamode().returning(move |m| {
            sink.lock().push(m.to_string());
            Ok(())
        });

        let report = apply(
            &randr,
            &mut scale,
            &mut metamode,
            ApplyInput {
                snapshot: &snap,
                plan: &plan,
                store: None,
                path: VendorPath::PixelDoubling,
                policy: &policy,
            },
        );

        assert_eq!(report.committed, vec!["eDP-1-1"]);
        let applied = randr.applied();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|c| c.crtc == 101 && c.mode == 10));

        let assigned = assigned.lock();
        assert_eq!(assigned.len(), 1);
        assert!(!assigned[0].contains("eDP-1-1"));
        assert!(assigned[0].starts_with("HDMI-0: nvidia-auto-select @3840x2160 +3840+0"));
    }
}
