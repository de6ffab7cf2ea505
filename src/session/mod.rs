//! Desktop Session Collaborators
//!
//! Everything the reconciler talks to besides the X server:
//!
//! | Trait                | Production implementation | Backing                      |
//! |----------------------|---------------------------|------------------------------|
//! | [`PreferenceStore`]  | [`GSettingsPreferences`]  | `com.system76.hidpi` schema  |
//! | [`ScaleControl`]     | [`GSettingsScale`]        | `scaling-factor` key         |
//! | [`MetamodeClient`]   | [`NvidiaSettings`]        | `nvidia-settings` CLI        |
//! | [`PrimaryPrompt`]    | [`DialogPrompt`]          | external dialog binary       |
//!
//! The D-Bus state service lives in [`notify`].
//!
//! All subprocess collaborators are blocking; the reconciler calls them from
//! the blocking pool.

mod gsettings;
pub mod notify;
mod nvidia;
mod prompt;

use std::process::Command;
use thiserror::Error;
use tracing::trace;

use crate::scaling::PreferredMode;

pub use gsettings::{GSettingsPreferences, GSettingsScale};
pub use notify::{NotifyState, StateService};
pub use nvidia::NvidiaSettings;
pub use prompt::DialogPrompt;

/// Session collaborator errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Program could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Program exited unsuccessfully
    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Output could not be interpreted
    #[error("Unexpected {what}: {value:?}")]
    Parse { what: &'static str, value: String },

    /// D-Bus failure
    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),
}

/// Session result type
pub type Result<T> = std::result::Result<T, SessionError>;

/// Run a program to completion and return its stdout
pub(crate) fn run(program: &str, args: &[&str]) -> Result<String> {
    trace!("Running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| SessionError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(SessionError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// User preference store
#[cfg_attr(test, mockall::automock)]
pub trait PreferenceStore: Send {
    /// Daemon may reconfigure displays
    fn enabled(&self) -> Result<bool>;

    /// Preferred mode
    fn mode(&self) -> Result<PreferredMode>;

    /// Record a new preferred mode
    fn set_mode(&mut self, mode: PreferredMode) -> Result<()>;
}

/// Compositor integer scale
#[cfg_attr(test, mockall::automock)]
pub trait ScaleControl: Send {
    fn get_scale(&self) -> Result<u32>;
    fn set_scale(&mut self, scale: u32) -> Result<()>;
}

/// Vendor metamode interface
#[cfg_attr(test, mockall::automock)]
pub trait MetamodeClient: Send {
    /// Raw `CurrentMetaMode` query output
    fn current_metamode(&self) -> Result<String>;

    /// Raw display device listing
    fn dpys(&self) -> Result<String>;

    /// Assign a complete metamode
    fn assign_metamode(&mut self, metamode: &str) -> Result<()>;
}

/// Answer to the primary display prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    /// Keep high density and make the internal panel primary
    AcceptHighDensity,
    /// Switch to low density
    ForceLowDensity,
}

/// Confirmation prompt shown on a primary display mismatch
#[cfg_attr(test, mockall::automock)]
pub trait PrimaryPrompt: Send {
    fn ask(&mut self) -> Result<PromptResponse>;
}
