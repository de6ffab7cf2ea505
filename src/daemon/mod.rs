//! Daemon Runtime
//!
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//!   │ randr-events │   │ acpid socket │   │ gsettings monitor│
//!   │  (OS thread) │   │   (tokio)    │   │     (tokio)      │
//!   └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘
//!          └──────────────────┼────────────────────┘
//!                             v
//!                      ┌──────────────┐
//!                      │ TriggerQueue │
//!                      └──────┬───────┘
//!                             v
//!                   ┌───────────────────┐   watch   ┌──────────────┐
//!                   │ Reconciler        │ ────────> │ D-Bus notify │
//!                   │ (blocking pool)   │           └──────────────┘
//!                   └───────────────────┘
//! ```
//!
//! Cycles never overlap: the main loop awaits each one before taking the
//! next batch of triggers.

pub mod listeners;
pub mod reconcile;
pub mod trigger;

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::gpu::{self, GpuCapabilities, VendorPath};
use crate::multimon::LayoutError;
use crate::protocol::x11::{X11Events, X11Randr};
use crate::protocol::ProtocolError;
use crate::scaling::{self, DisplayTypes, Plan, PlanInput, PolicyState};
use crate::session::{
    self, DialogPrompt, GSettingsPreferences, GSettingsScale, NotifyState, NvidiaSettings,
    PreferenceStore, PrimaryPrompt, SessionError,
};
use crate::store::{LayoutStore, MonitorsXmlStore, NoStore};
use crate::topology::{query_snapshot, LidSensor, ProcLidSensor, TopologySnapshot};

pub use reconcile::{Collaborators, CycleOutcome, Reconciler, ReconcilerSettings};
pub use trigger::{Trigger, TriggerQueue};

/// Daemon errors
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Layout failed: {0}")]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// A cycle ran before any snapshot was taken
    #[error("No topology snapshot available")]
    NoSnapshot,

    /// A blocking cycle panicked or was cancelled
    #[error("Reconciliation task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Plan computed by [`Daemon::preview`]
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub path: VendorPath,
    pub policy: PolicyState,
    pub snapshot: TopologySnapshot,
    pub plan: Plan,
}

/// Configured daemon, ready to run
pub struct Daemon {
    config: Config,
    gpu: GpuCapabilities,
}

impl Daemon {
    /// Probe the GPU for `config`
    pub fn new(config: Config) -> Self {
        let gpu = gpu::probe_gpu(&config.gpu);
        Self { config, gpu }
    }

    pub fn path(&self) -> VendorPath {
        self.gpu.path()
    }

    /// Build a reconciler talking to the live session
    pub fn reconciler(&self, state: watch::Sender<NotifyState>) -> Result<Reconciler> {
        let config = &self.config;
        let display = config.daemon.display.as_deref();
        let randr = X11Randr::connect(display)?;

        let store = self.layout_store();

        let prompt = if config.prompt.enabled {
            Some(Box::new(DialogPrompt::new(&config.prompt.binary)) as Box<dyn PrimaryPrompt>)
        } else {
            None
        };

        let collaborators = Collaborators {
            randr: Box::new(randr),
            lid: Box::new(ProcLidSensor::new(config.lid.root.clone())),
            store,
            preferences: Box::new(GSettingsPreferences::new(&config.preferences.schema)),
            scale: Box::new(GSettingsScale::new(
                &config.compositor.scale_schema,
                &config.compositor.scale_key,
            )),
            metamode: Box::new(NvidiaSettings::new(&config.gpu.nvidia_settings)),
            prompt,
        };

        let settings = ReconcilerSettings {
            path: self.path(),
            modeline: self.gpu.profile.modeline.clone(),
            event_settle: Duration::from_millis(config.daemon.event_settle_ms),
            lid_settle: Duration::from_millis(config.lid.settle_ms),
            scale_settle: Duration::from_millis(config.compositor.settle_ms),
        };

        Ok(Reconciler::new(collaborators, settings, state))
    }

    fn layout_store(&self) -> Box<dyn LayoutStore> {
        match &self.config.store.path {
            Some(path) => Box::new(MonitorsXmlStore::new(path.clone())),
            None => match MonitorsXmlStore::user_default() {
                Some(store) => Box::new(store),
                None => {
                    warn!("No configuration directory, stored layouts disabled");
                    Box::new(NoStore)
                }
            },
        }
    }

    /// Compute the plan the next commit would apply, without committing
    ///
    /// Policy starts from the stored preference, or from the startup mode
    /// selection when none is readable.
    pub fn preview(&self) -> anyhow::Result<PlanPreview> {
        let config = &self.config;
        let path = self.path();
        let randr = X11Randr::connect(config.daemon.display.as_deref())?;
        let lid = ProcLidSensor::new(config.lid.root.clone());
        let snapshot = query_snapshot(&randr, lid.state())?;
        let types = DisplayTypes::of(&snapshot);

        let mut policy = PolicyState::default();
        match GSettingsPreferences::new(&config.preferences.schema).mode() {
            Ok(preference) => policy.apply_preference(path, preference),
            Err(e) => {
                warn!("Preferred mode unreadable ({}), using startup selection", e);
                policy.unforce = path == VendorPath::Native && !types.lowdpi;
            }
        }

        let store = self.layout_store().load(&snapshot.identities());
        let plan = scaling::plan(PlanInput {
            snapshot: &snapshot,
            store: store.as_ref(),
            path,
            policy: &policy,
            revert: policy.unforce,
        })
        .context("Failed to compute layout")?;

        Ok(PlanPreview {
            path,
            policy,
            snapshot,
            plan,
        })
    }

    /// Run until interrupted
    pub async fn run(self) -> anyhow::Result<()> {
        let (state_tx, state_rx) = watch::channel(NotifyState::default());

        if self.config.notify.enabled {
            let bus_name = self.config.notify.bus_name.clone();
            let object_path = self.config.notify.object_path.clone();
            tokio::spawn(async move {
                if let Err(e) = session::notify::serve(&bus_name, &object_path, state_rx).await {
                    warn!("Notification service unavailable: {}", e);
                }
            });
        }

        let reconciler = Arc::new(parking_lot::Mutex::new(self.reconciler(state_tx)?));
        let queue = Arc::new(TriggerQueue::new());

        let startup = Arc::clone(&reconciler);
        match run_blocking(move || startup.lock().startup()).await {
            Ok(outcome) => info!("Startup cycle: {:?}", outcome),
            Err(e) => warn!("Startup cycle failed: {}", e),
        }

        let events = X11Events::connect(self.config.daemon.display.as_deref())?;
        listeners::spawn_randr_listener(Box::new(events), Arc::clone(&queue))?;
        tokio::spawn(listeners::listen_acpid(
            self.config.lid.acpid_socket.clone(),
            Arc::clone(&queue),
        ));
        tokio::spawn(listeners::watch_preferences(
            self.config.preferences.schema.clone(),
            Arc::clone(&queue),
        ));

        info!("Daemon running ({} path)", self.path());

        loop {
            tokio::select! {
                triggers = queue.next() => {
                    for trigger in triggers {
                        let reconciler = Arc::clone(&reconciler);
                        match run_blocking(move || reconciler.lock().run(trigger)).await {
                            Ok(outcome) => info!("{} cycle: {:?}", trigger, outcome),
                            Err(e) => error!("{} cycle failed: {}", trigger, e),
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Run a cycle on the blocking pool
async fn run_blocking<F>(cycle: F) -> Result<CycleOutcome>
where
    F: FnOnce() -> Result<CycleOutcome> + Send + 'static,
{
    tokio::task::spawn_blocking(cycle)
        .await
        .map_err(|e| DaemonError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_cycle_result_propagates() {
        let outcome = run_blocking(|| Ok(CycleOutcome::Unchanged)).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Unchanged);

        let err = run_blocking(|| Err(DaemonError::NoSnapshot)).await.unwrap_err();
        assert!(matches!(err, DaemonError::NoSnapshot));
    }

    #[tokio::test]
    async fn test_panicking_cycle_reported_as_task_error() {
        let err = run_blocking(|| panic!("boom")).await.unwrap_err();
        assert!(matches!(err, DaemonError::Task(_)));
    }
}
