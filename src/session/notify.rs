//! D-Bus state notification service
//!
//! Publishes `com.system76.hidpi` on the session bus. The reconciler pushes
//! a [`NotifyState`] through a `watch` channel after every completed cycle;
//! [`serve`] re-emits it as the `state` signal. `getstate` emits the signal
//! again on demand and returns the same triple.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zbus::{interface, SignalContext};

use super::Result;

/// Default well-known name
pub const BUS_NAME: &str = "com.system76.hidpi";
/// Default object path
pub const OBJECT_PATH: &str = "/com/system76/hidpi";

/// Published state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifyState {
    /// Stored preference, e.g. "lodpi"
    pub mode: String,
    /// Display types, e.g. "mixed, hidpi, lodpi"
    pub types: String,
    /// "native" or "pixel-doubling"
    pub capability: String,
}

/// Object served at [`OBJECT_PATH`]
pub struct StateService {
    state: watch::Receiver<NotifyState>,
}

impl StateService {
    pub fn new(state: watch::Receiver<NotifyState>) -> Self {
        Self { state }
    }
}

#[interface(name = "com.system76.hidpi")]
impl StateService {
    #[zbus(name = "getstate")]
    async fn getstate(
        &self,
        #[zbus(signal_context)] ctxt: SignalContext<'_>,
    ) -> zbus::fdo::Result<(String, String, String)> {
        let state = self.state.borrow().clone();
        debug!("getstate: {:?}", state);
        Self::state(&ctxt, &state.mode, &state.types, &state.capability).await?;
        Ok((state.mode, state.types, state.capability))
    }

    #[zbus(signal, name = "state")]
    async fn state(
        ctxt: &SignalContext<'_>,
        mode: &str,
        monitor_types: &str,
        capability: &str,
    ) -> zbus::Result<()>;
}

/// Serve the interface and emit a signal on every state change
///
/// Returns when the sending side of `updates` is dropped.
pub async fn serve(
    bus_name: &str,
    object_path: &str,
    mut updates: watch::Receiver<NotifyState>,
) -> Result<()> {
    let connection = zbus::connection::Builder::session()?
        .name(bus_name)?
        .serve_at(object_path, StateService::new(updates.clone()))?
        .build()
        .await?;

    info!("Notification service registered as {}", bus_name);

    let iface = connection
        .object_server()
        .interface::<_, StateService>(object_path)
        .await?;

    while updates.changed().await.is_ok() {
        let state = updates.borrow_and_update().clone();
        debug!("Emitting state: {:?}", state);
        if let Err(e) = StateService::state(
            iface.signal_context(),
            &state.mode,
            &state.types,
            &state.capability,
        )
        .await
        {
            warn!("Failed to emit state signal: {}", e);
        }
    }

    debug!("State channel closed, stopping notification service");
    Ok(())
}
