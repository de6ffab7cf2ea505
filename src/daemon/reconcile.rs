//! Reconciliation cycles
//!
//! The [`Reconciler`] owns the last snapshot, the policy state and every
//! collaborator. Each cycle is blocking and runs to completion:
//!
//! | Cycle | Entry | Commits when |
//! |-------|-------|--------------|
//! | startup | [`Reconciler::startup`] | mode selection warrants it |
//! | topology | [`Trigger::Topology`] | the topology changed and a high-density display is present |
//! | preference | [`Trigger::Preference`] | always (unless disabled) |
//!
//! Only preference cycles are interactive: a low-density primary display
//! next to a high-density prime display prompts the user there, while
//! topology cycles switch to low density silently.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::trigger::Trigger;
use super::{DaemonError, Result};
use crate::apply::{ApplyInput, ApplyReport, Applier, SCALE_SETTLE};
use crate::gpu::profiles::PANEL_OUTPUT;
use crate::gpu::{Modeline, VendorPath};
use crate::protocol::{self, RandrClient};
use crate::scaling::{
    self, primary_mismatch, DisplayTypes, PlanInput, PolicyState, PreferredMode, ScaleMode,
};
use crate::session::{
    MetamodeClient, NotifyState, PreferenceStore, PrimaryPrompt, PromptResponse, ScaleControl,
};
use crate::store::LayoutStore;
use crate::topology::{LidSensor, TopologyMonitor, TopologySnapshot};

/// Everything a reconciler talks to
pub struct Collaborators {
    pub randr: Box<dyn RandrClient>,
    pub lid: Box<dyn LidSensor>,
    pub store: Box<dyn LayoutStore>,
    pub preferences: Box<dyn PreferenceStore>,
    pub scale: Box<dyn ScaleControl>,
    pub metamode: Box<dyn MetamodeClient>,
    /// `None` resolves primary mismatches without asking
    pub prompt: Option<Box<dyn PrimaryPrompt>>,
}

/// Fixed parameters of a reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub path: VendorPath,
    /// Panel mode to install at startup on the native path
    pub modeline: Option<Modeline>,
    /// Delay before polling after a RandR event
    pub event_settle: Duration,
    /// Delay after the lid opens
    pub lid_settle: Duration,
    /// Delay after a compositor scale change
    pub scale_settle: Duration,
}

impl ReconcilerSettings {
    pub fn new(path: VendorPath) -> Self {
        Self {
            path,
            modeline: None,
            event_settle: Duration::from_millis(100),
            lid_settle: Duration::from_secs(1),
            scale_settle: SCALE_SETTLE,
        }
    }
}

/// What a cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Topology unchanged since the last poll
    Unchanged,
    /// The preference store disables reconfiguration
    Disabled,
    /// No high-density display, configuration left to the compositor
    LowDensityOnly,
    /// Policy changed without touching the hardware
    PolicyOnly,
    Committed(ApplyReport),
}

/// Single owner of all reconciliation state
pub struct Reconciler {
    randr: Box<dyn RandrClient>,
    store: Box<dyn LayoutStore>,
    preferences: Box<dyn PreferenceStore>,
    scale: Box<dyn ScaleControl>,
    metamode: Box<dyn MetamodeClient>,
    prompt: Option<Box<dyn PrimaryPrompt>>,
    monitor: TopologyMonitor,
    policy: PolicyState,
    settings: ReconcilerSettings,
    state: watch::Sender<NotifyState>,
}

impl Reconciler {
    pub fn new(
        collaborators: Collaborators,
        settings: ReconcilerSettings,
        state: watch::Sender<NotifyState>,
    ) -> Self {
        let Collaborators {
            randr,
            lid,
            store,
            preferences,
            scale,
            metamode,
            prompt,
        } = collaborators;

        Self {
            randr,
            store,
            preferences,
            scale,
            metamode,
            prompt,
            monitor: TopologyMonitor::new(lid, settings.lid_settle),
            policy: PolicyState::default(),
            settings,
            state,
        }
    }

    pub fn policy(&self) -> &PolicyState {
        &self.policy
    }

    pub fn snapshot(&self) -> Option<&TopologySnapshot> {
        self.monitor.snapshot()
    }

    /// Initial mode selection and commit
    ///
    /// The native path picks unforced for high-density-only setups and
    /// forced for mixed ones, then polls once more. The pixel-doubling path
    /// commits whenever a high-density display is present.
    pub fn startup(&mut self) -> Result<CycleOutcome> {
        let path = self.settings.path;
        if path == VendorPath::Native {
            if let Some(modeline) = &self.settings.modeline {
                if let Err(e) = install_modeline(self.randr.as_ref(), modeline) {
                    warn!("Failed to install {} mode: {}", modeline.name, e);
                }
            }
        }

        let snapshot = self.monitor.refresh(self.randr.as_ref())?.clone();
        let types = DisplayTypes::of(&snapshot);
        self.policy.previous_types = Some(types);
        info!("Initial display types: [{}]", types.describe());

        let outcome = match path {
            VendorPath::PixelDoubling => {
                if primary_mismatch(&snapshot, path, &self.policy) {
                    info!("Primary display is low density next to a high-density prime display");
                    self.policy.scale_mode = ScaleMode::LowDpi;
                    self.store_preference(PreferredMode::LoDpi);
                    CycleOutcome::PolicyOnly
                } else if types.hidpi {
                    self.commit(false)?
                } else {
                    CycleOutcome::LowDensityOnly
                }
            }
            VendorPath::Native => {
                if !types.lowdpi {
                    self.policy.unforce = true;
                    self.store_preference(PreferredMode::HiDpi);
                    self.commit(false)?
                } else if types.mixed {
                    self.policy.unforce = false;
                    self.store_preference(PreferredMode::LoDpi);
                    self.commit(false)?
                } else {
                    CycleOutcome::LowDensityOnly
                }
            }
        };
        self.publish();

        if path == VendorPath::Native {
            let follow_up = self.topology_cycle()?;
            debug!("Startup follow-up poll: {:?}", follow_up);
        }

        Ok(outcome)
    }

    /// Run one cycle for `trigger`
    pub fn run(&mut self, trigger: Trigger) -> Result<CycleOutcome> {
        info!("Running {} cycle", trigger);
        match trigger {
            Trigger::Topology => self.topology_cycle(),
            Trigger::Preference => self.preference_cycle(),
        }
    }

    fn topology_cycle(&mut self) -> Result<CycleOutcome> {
        std::thread::sleep(self.settings.event_settle);
        if self.monitor.poll(self.randr.as_ref())?.is_none() {
            return Ok(CycleOutcome::Unchanged);
        }

        let path = self.settings.path;
        if path.is_pixel_doubling() {
            // Events right after a hotplug can carry incomplete output data
            std::thread::sleep(self.settings.event_settle);
            self.monitor.refresh(self.randr.as_ref())?;
        }

        let snapshot = self.current_snapshot()?;
        let types = DisplayTypes::of(&snapshot);
        let mismatch = primary_mismatch(&snapshot, path, &self.policy);
        if let Some(preference) = self.policy.on_topology_change(path, types, mismatch) {
            info!("Display types now [{}], preferring {}", types.describe(), preference);
            self.store_preference(preference);
        }

        let outcome = if !self.enabled() {
            info!("Reconfiguration disabled");
            CycleOutcome::Disabled
        } else if !types.hidpi {
            debug!("No high-density displays, leaving configuration as is");
            CycleOutcome::LowDensityOnly
        } else {
            self.commit(false)?
        };

        self.publish();
        Ok(outcome)
    }

    fn preference_cycle(&mut self) -> Result<CycleOutcome> {
        let path = self.settings.path;
        let snapshot = self.monitor.refresh(self.randr.as_ref())?.clone();

        match self.preferences.mode() {
            Ok(preference) => {
                info!("Preferred mode: {}", preference);
                self.policy.apply_preference(path, preference);
            }
            Err(e) => warn!("Failed to read preferred mode: {}", e),
        }

        let mut outcome = self.commit(true)?;

        // The compositor can ignore the first scale change with the lid
        // closed and a marginal external display
        if path == VendorPath::Native
            && matches!(outcome, CycleOutcome::Committed(_))
            && self.policy.unforce
            && !DisplayTypes::of(&snapshot).lowdpi
            && matches!(self.scale.get_scale(), Ok(scale) if scale < 2)
        {
            info!("Compositor scale did not change, committing again");
            outcome = self.commit(true)?;
        }

        self.publish();
        Ok(outcome)
    }

    /// Plan and apply against the current snapshot
    fn commit(&mut self, interactive: bool) -> Result<CycleOutcome> {
        if !self.enabled() {
            info!("Reconfiguration disabled");
            return Ok(CycleOutcome::Disabled);
        }

        let path = self.settings.path;
        let mut snapshot = self.current_snapshot()?;
        if interactive && path.is_pixel_doubling() && self.resolve_primary_mismatch(&snapshot) {
            snapshot = self.monitor.refresh(self.randr.as_ref())?.clone();
        }

        let store = self.store.load(&snapshot.identities());
        if store.is_some() {
            debug!("Using stored layout");
        }

        let plan = scaling::plan(PlanInput {
            snapshot: &snapshot,
            store: store.as_ref(),
            path,
            policy: &self.policy,
            revert: self.policy.unforce,
        })?;

        let report = Applier::new(
            self.randr.as_ref(),
            self.scale.as_mut(),
            self.metamode.as_mut(),
        )
        .with_settle(self.settings.scale_settle)
        .apply(ApplyInput {
            snapshot: &snapshot,
            plan: &plan,
            store: store.as_ref(),
            path,
            policy: &self.policy,
        });

        self.policy.previous_types = Some(plan.decision.types);
        Ok(CycleOutcome::Committed(report))
    }

    /// Ask the user how to handle a low-density primary display
    ///
    /// Returns true when the primary output changed.
    fn resolve_primary_mismatch(&mut self, snapshot: &TopologySnapshot) -> bool {
        let path = self.settings.path;
        if !DisplayTypes::of(snapshot).lowdpi || !primary_mismatch(snapshot, path, &self.policy) {
            return false;
        }

        let response = match self.prompt.as_mut() {
            Some(prompt) => match prompt.ask() {
                Ok(response) => response,
                Err(e) => {
                    warn!("Primary display prompt failed: {}", e);
                    return false;
                }
            },
            None => PromptResponse::ForceLowDensity,
        };

        match response {
            PromptResponse::ForceLowDensity => {
                info!("Switching to low density for the low-density primary display");
                self.policy.scale_mode = ScaleMode::LowDpi;
                self.store_preference(PreferredMode::LoDpi);
                false
            }
            PromptResponse::AcceptHighDensity => {
                self.policy.scale_mode = ScaleMode::HiDpi;
                let panel = snapshot
                    .displays
                    .values()
                    .find(|d| d.name.contains(PANEL_OUTPUT));
                match panel {
                    Some(panel) => match self.randr.set_output_primary(panel.output) {
                        Ok(()) => {
                            info!("{} is now the primary display", panel.name);
                            true
                        }
                        Err(e) => {
                            warn!("Failed to make {} primary: {}", panel.name, e);
                            false
                        }
                    },
                    None => {
                        warn!("No {} output to make primary", PANEL_OUTPUT);
                        false
                    }
                }
            }
        }
    }

    fn current_snapshot(&self) -> Result<TopologySnapshot> {
        self.monitor.snapshot().cloned().ok_or(DaemonError::NoSnapshot)
    }

    fn enabled(&self) -> bool {
        self.preferences.enabled().unwrap_or_else(|e| {
            warn!("Failed to read enable setting, assuming enabled: {}", e);
            true
        })
    }

    fn store_preference(&mut self, preference: PreferredMode) {
        if let Err(e) = self.preferences.set_mode(preference) {
            warn!("Failed to store preferred mode {}: {}", preference, e);
        }
    }

    /// Preference implied by the policy state
    fn policy_preference(&self) -> PreferredMode {
        let high = match self.settings.path {
            VendorPath::Native => self.policy.unforce,
            VendorPath::PixelDoubling => self.policy.scale_mode == ScaleMode::HiDpi,
        };
        if high {
            PreferredMode::HiDpi
        } else {
            PreferredMode::LoDpi
        }
    }

    /// Push the current state to the notification service
    fn publish(&self) {
        let mode = self.preferences.mode().unwrap_or_else(|e| {
            debug!("Preferred mode unreadable ({}), using policy", e);
            self.policy_preference()
        });
        let types = self
            .monitor
            .snapshot()
            .map(DisplayTypes::of)
            .unwrap_or_default();

        let state = NotifyState {
            mode: mode.as_str().to_string(),
            types: types.describe(),
            capability: self.settings.path.capability().to_string(),
        };
        debug!("Publishing {:?}", state);
        self.state.send_replace(state);
    }
}

/// Create `modeline` and make it available on the internal panel
///
/// A mode that already exists is reused. Returns the mode id when the
/// panel has it.
pub fn install_modeline(randr: &dyn RandrClient, modeline: &Modeline) -> protocol::Result<Option<u32>> {
    let id = match randr.create_mode(&modeline.to_mode_info()) {
        Ok(id) => {
            info!("Created mode {}", modeline.name);
            id
        }
        Err(e) => {
            debug!("Mode {} not created ({}), looking it up", modeline.name, e);
            let resources = randr.list_resources()?;
            match resources.modes.iter().find(|m| m.name == modeline.name) {
                Some(mode) => mode.id,
                None => {
                    warn!("Mode {} unavailable", modeline.name);
                    return Ok(None);
                }
            }
        }
    };

    let resources = randr.list_resources()?;
    for &output in &resources.outputs {
        let info = randr.output_info(output, resources.config_timestamp)?;
        if info.name != PANEL_OUTPUT {
            continue;
        }
        if !info.modes.contains(&id) {
            randr.add_output_mode(output, id)?;
            info!("Added mode {} to {}", modeline.name, info.name);
        }
        return Ok(Some(id));
    }

    debug!("No {} output for mode {}", PANEL_OUTPUT, modeline.name);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CrtcInfo, MemoryRandr, ROTATE_0};
    use crate::session::{
        MockMetamodeClient, MockPreferenceStore, MockPrimaryPrompt, MockScaleControl,
    };
    use crate::store::MockLayoutStore;
    use crate::topology::lid::MockLidSensor;
    use crate::topology::test_support::{display, snapshot};
    use crate::topology::LidState;
    use parking_lot::Mutex;
    use std::sync::Arc;

    // =========================================================================
    // Fixtures
    // =========================================================================

    struct Harness {
        randr: Arc<MemoryRandr>,
        stored: Arc<Mutex<Vec<PreferredMode>>>,
        state: watch::Receiver<NotifyState>,
        reconciler: Reconciler,
    }

    fn harness(
        snap: &TopologySnapshot,
        path: VendorPath,
        enabled: bool,
        preferred: PreferredMode,
        prompt: Option<MockPrimaryPrompt>,
    ) -> Harness {
        let randr = Arc::new(MemoryRandr::from_snapshot(snap));

        let mut lid = MockLidSensor::new();
        lid.expect_state().return_const(snap.lid);

        let mut store = MockLayoutStore::new();
        store.expect_load().returning(|_| None);

        let stored = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stored);
        let mut preferences = MockPreferenceStore::new();
        preferences.expect_enabled().returning(move || Ok(enabled));
        preferences.expect_mode().returning(move || Ok(preferred));
        preferences.expect_set_mode().returning(move |mode| {
            sink.lock().push(mode);
            Ok(())
        });

        let mut scale = MockScaleControl::new();
        scale.expect_get_scale().returning(|| Ok(2));
        scale.expect_set_scale().returning(|_| Ok(()));

        let mut metamode = MockMetamodeClient::new();
        metamode.expect_dpys().returning(|| Ok(String::new()));
        metamode
            .expect_current_metamode()
            .returning(|| Ok(String::new()));
        metamode.expect_assign_metamode().returning(|_| Ok(()));

        let settings = ReconcilerSettings {
            event_settle: Duration::ZERO,
            lid_settle: Duration::ZERO,
            scale_settle: Duration::ZERO,
            ..ReconcilerSettings::new(path)
        };

        let (tx, rx) = watch::channel(NotifyState::default());
        let reconciler = Reconciler::new(
            Collaborators {
                randr: Box::new(Arc::clone(&randr)),
                lid: Box::new(lid),
                store: Box::new(store),
                preferences: Box::new(preferences),
                scale: Box::new(scale),
                metamode: Box::new(metamode),
                prompt: prompt.map(|p| Box::new(p) as Box<dyn PrimaryPrompt>),
            },
            settings,
            tx,
        );

        Harness {
            randr,
            stored,
            state: rx,
            reconciler,
        }
    }

    fn panel_with_unplugged_hdmi() -> TopologySnapshot {
        let mut hdmi = display("HDMI-1", 2, (1920, 1080), (509, 286), None);
        hdmi.connected = false;
        snapshot(
            vec![
                display("eDP-1", 1, (3200, 1800), (277, 156), Some((0, 0))),
                hdmi,
            ],
            LidState::Open,
        )
    }

    /// Connect HDMI-1 to the right of the panel, as the compositor would
    fn plug_hdmi(randr: &MemoryRandr) {
        let mut state = randr.state();
        state.config_timestamp += 1;
        if let Some(output) = state.outputs.get_mut(&2) {
            output.connected = true;
            output.crtc = 102;
        }
        state.crtcs.insert(
            102,
            CrtcInfo {
                x: 3200,
                y: 0,
                width: 1920,
                height: 1080,
                mode: 20,
                rotation: ROTATE_0,
                outputs: vec![2],
            },
        );
    }

    fn prime_desk() -> TopologySnapshot {
        let mut panel = display("eDP-1-1", 1, (3840, 2160), (344, 194), Some((0, 0)));
        panel.prime = true;
        let mut hdmi = display("HDMI-0", 2, (1920, 1080), (509, 286), Some((3840, 0)));
        hdmi.primary = true;
        snapshot(vec![panel, hdmi], LidState::Open)
    }

    // =========================================================================
    // Startup
    // =========================================================================

    #[test]
    fn test_startup_high_density_only_goes_unforced() {
        let snap = panel_with_unplugged_hdmi();
        let mut h = harness(&snap, VendorPath::Native, true, PreferredMode::HiDpi, None);

        let outcome = h.reconciler.startup().unwrap();

        let CycleOutcome::Committed(report) = outcome else {
            panic!("expected a commit, got {:?}", outcome);
        };
        assert_eq!(report.committed, vec!["eDP-1"]);
        assert!(h.reconciler.policy().unforce);
        assert_eq!(*h.stored.lock(), vec![PreferredMode::HiDpi]);
        assert_eq!(h.randr.applied()[0].mode, 10);

        let state = h.state.borrow_and_update().clone();
        assert_eq!(state.mode, "hidpi");
        assert_eq!(state.types, "hidpi");
        assert_eq!(state.capability, "native");
    }

    #[test]
    fn test_disabled_preference_blocks_commit() {
        let snap = panel_with_unplugged_hdmi();
        let mut h = harness(&snap, VendorPath::Native, false, PreferredMode::HiDpi, None);

        assert_eq!(h.reconciler.startup().unwrap(), CycleOutcome::Disabled);
        assert!(h.randr.applied().is_empty());
        assert_eq!(
            h.reconciler.run(Trigger::Preference).unwrap(),
            CycleOutcome::Disabled
        );
        assert!(h.randr.applied().is_empty());
    }

    #[test]
    fn test_startup_primary_mismatch_switches_to_low_density() {
        let snap = prime_desk();
        let mut h = harness(
            &snap,
            VendorPath::PixelDoubling,
            true,
            PreferredMode::HiDpi,
            None,
        );

        assert_eq!(h.reconciler.startup().unwrap(), CycleOutcome::PolicyOnly);
        assert_eq!(h.reconciler.policy().scale_mode, ScaleMode::LowDpi);
        assert_eq!(*h.stored.lock(), vec![PreferredMode::LoDpi]);
        assert!(h.randr.applied().is_empty());
        assert_eq!(h.state.borrow().capability, "pixel-doubling");
    }

    // =========================================================================
    // Topology cycles
    // =========================================================================

    #[test]
    fn test_hotplug_low_density_forces_matching_scales() {
        let snap = panel_with_unplugged_hdmi();
        let mut h = harness(&snap, VendorPath::Native, true, PreferredMode::LoDpi, None);
        h.reconciler.startup().unwrap();

        assert_eq!(
            h.reconciler.run(Trigger::Topology).unwrap(),
            CycleOutcome::Unchanged
        );

        plug_hdmi(&h.randr);
        let outcome = h.reconciler.run(Trigger::Topology).unwrap();
        let CycleOutcome::Committed(report) = outcome else {
            panic!("expected a commit, got {:?}", outcome);
        };

        assert!(!h.reconciler.policy().unforce);
        assert_eq!(
            *h.stored.lock(),
            vec![PreferredMode::HiDpi, PreferredMode::LoDpi]
        );
        assert_eq!(report.committed, vec!["HDMI-1", "eDP-1"]);

        let applied = h.randr.applied();
        let panel = applied.iter().rev().find(|c| c.crtc == 101).unwrap();
        assert_eq!(panel.mode, 11);
        let hdmi = applied.iter().rev().find(|c| c.crtc == 102).unwrap();
        assert_eq!((hdmi.x, hdmi.y), (1600, 0));
        assert_eq!(h.state.borrow().types, "mixed, hidpi, lodpi");
    }

    #[test]
    fn test_low_density_only_topology_not_committed() {
        let snap = snapshot(
            vec![display("HDMI-1", 2, (1920, 1080), (509, 286), Some((0, 0)))],
            LidState::Open,
        );
        let mut h = harness(&snap, VendorPath::Native, true, PreferredMode::LoDpi, None);
        assert_eq!(
            h.reconciler.startup().unwrap(),
            CycleOutcome::LowDensityOnly
        );

        {
            let mut state = h.randr.state();
            state.config_timestamp += 1;
            if let Some(output) = state.outputs.get_mut(&2) {
                output.crtc = 0;
            }
        }
        assert_eq!(
            h.reconciler.run(Trigger::Topology).unwrap(),
            CycleOutcome::LowDensityOnly
        );
        assert!(h.randr.applied().is_empty());
    }

    // =========================================================================
    // Preference cycles
    // =========================================================================

    #[test]
    fn test_prompt_accept_makes_panel_primary() {
        let snap = prime_desk();
        let mut prompt = MockPrimaryPrompt::new();
        prompt
            .expect_ask()
            .times(1)
            .returning(|| Ok(PromptResponse::AcceptHighDensity));
        let mut h = harness(
            &snap,
            VendorPath::PixelDoubling,
            true,
            PreferredMode::HiDpi,
            Some(prompt),
        );

        let outcome = h.reconciler.run(Trigger::Preference).unwrap();
        let CycleOutcome::Committed(report) = outcome else {
            panic!("expected a commit, got {:?}", outcome);
        };

        assert_eq!(h.randr.state().primary, Some(1));
        assert_eq!(h.reconciler.policy().scale_mode, ScaleMode::HiDpi);
        assert_eq!(report.committed, vec!["eDP-1-1"]);
        assert!(report
            .metamode
            .as_deref()
            .is_some_and(|m| m.starts_with("HDMI-0: nvidia-auto-select @3840x2160")));
        assert!(h.stored.lock().is_empty());
    }

    #[test]
    fn test_prompt_decline_switches_to_low_density() {
        let snap = prime_desk();
        let mut prompt = MockPrimaryPrompt::new();
        prompt
            .expect_ask()
            .times(1)
            .returning(|| Ok(PromptResponse::ForceLowDensity));
        let mut h = harness(
            &snap,
            VendorPath::PixelDoubling,
            true,
            PreferredMode::HiDpi,
            Some(prompt),
        );

        h.reconciler.run(Trigger::Preference).unwrap();

        assert_eq!(h.reconciler.policy().scale_mode, ScaleMode::LowDpi);
        assert_eq!(*h.stored.lock(), vec![PreferredMode::LoDpi]);
        assert_eq!(h.randr.state().primary, Some(2));
    }

    #[test]
    fn test_preference_applies_stored_mode() {
        let snap = panel_with_unplugged_hdmi();
        let mut h = harness(&snap, VendorPath::Native, true, PreferredMode::LoDpi, None);

        h.reconciler.run(Trigger::Preference).unwrap();

        assert!(!h.reconciler.policy().unforce);
        assert_eq!(h.randr.applied()[0].mode, 11);
        assert_eq!(h.state.borrow().mode, "lodpi");
    }

    // =========================================================================
    // Modelines
    // =========================================================================

    #[test]
    fn test_install_modeline_is_idempotent() {
        let snap = panel_with_unplugged_hdmi();
        let randr = MemoryRandr::from_snapshot(&snap);
        let modeline = crate::gpu::profile_for(Some("galp3")).modeline.unwrap();

        let id = install_modeline(&randr, &modeline).unwrap().unwrap();
        assert!(randr.output_info(1, 1000).unwrap().modes.contains(&id));

        assert_eq!(install_modeline(&randr, &modeline).unwrap(), Some(id));
        let modes = randr.output_info(1, 1000).unwrap().modes;
        assert_eq!(modes.iter().filter(|m| **m == id).count(), 1);
    }
}
