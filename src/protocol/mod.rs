//! RandR Protocol Transport
//!
//! Abstraction over the X RandR requests the daemon needs. The reconciler
//! only ever talks to [`RandrClient`]; the production implementation lives in
//! [`x11`] and speaks the wire protocol through `x11rb`; [`memory`] keeps
//! the same state in a table for running without a server.
//!
//! # Requests
//!
//! | Operation | RandR request |
//! |-----------|---------------|
//! | [`RandrClient::list_resources`] | `GetScreenResources` |
//! | [`RandrClient::output_info`] | `GetOutputInfo` |
//! | [`RandrClient::crtc_info`] | `GetCrtcInfo` |
//! | [`RandrClient::set_crtc_config`] | `SetCrtcConfig` |
//! | [`RandrClient::output_property`] | `ListOutputProperties` + `GetOutputProperty` |
//! | [`RandrClient::create_mode`] | `CreateMode` |
//! | [`RandrClient::add_output_mode`] | `AddOutputMode` |
//! | [`RandrClient::output_primary`] | `GetOutputPrimary` |
//! | [`RandrClient::set_output_primary`] | `SetOutputPrimary` |
//!
//! `SetCrtcConfig` is fenced by the configuration timestamp read from
//! `GetScreenResources`. When the server configuration moved on since that
//! read, the request is rejected and surfaces as
//! [`ProtocolError::StaleTimestamp`].

pub mod memory;
pub mod x11;

use thiserror::Error;

pub use memory::MemoryRandr;
pub use x11::{X11Events, X11Randr};

/// RandR rotation value for an unrotated CRTC
pub const ROTATE_0: u16 = 1;

/// Protocol transport errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Could not reach the X server
    #[error("X11 connection failed: {0}")]
    Connection(String),

    /// A request failed or returned an X error
    #[error("RandR request {request} failed: {reason}")]
    Request {
        /// Request name
        request: &'static str,
        /// Server-side reason
        reason: String,
    },

    /// Configuration timestamp advanced since it was read
    #[error("Configuration timestamp is stale for CRTC {0}")]
    StaleTimestamp(u32),

    /// Server refused the configuration
    #[error("CRTC {0} configuration rejected")]
    ConfigRejected(u32),
}

/// Protocol result type
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Mode description as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    /// Mode id (0 when creating a new mode)
    pub id: u32,
    /// Horizontal resolution
    pub width: u16,
    /// Vertical resolution
    pub height: u16,
    /// Pixel clock in Hz
    pub dot_clock: u32,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    /// RandR mode flags bitmask
    pub flags: u32,
    /// Mode name (e.g. "1920x1080")
    pub name: String,
}

/// Reply of `GetScreenResources`
#[derive(Debug, Clone, Default)]
pub struct Resources {
    /// Server timestamp of the last configuration change
    pub timestamp: u32,
    /// Timestamp requests must be fenced with
    pub config_timestamp: u32,
    /// Output ids
    pub outputs: Vec<u32>,
    /// CRTC ids
    pub crtcs: Vec<u32>,
    /// All modes known to the server
    pub modes: Vec<ModeInfo>,
}

/// Reply of `GetOutputInfo`
#[derive(Debug, Clone)]
pub struct OutputInfo {
    /// Connector name (e.g. "eDP-1")
    pub name: String,
    /// Current CRTC, 0 if inactive
    pub crtc: u32,
    /// Physical width in millimeters
    pub mm_width: u32,
    /// Physical height in millimeters
    pub mm_height: u32,
    /// Whether a display is attached
    pub connected: bool,
    /// Supported mode ids, preferred first
    pub modes: Vec<u32>,
}

/// Reply of `GetCrtcInfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcInfo {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Active mode id, 0 if disabled
    pub mode: u32,
    /// RandR rotation bitmask
    pub rotation: u16,
    /// Outputs driven by this CRTC
    pub outputs: Vec<u32>,
}

/// Single `SetCrtcConfig` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcConfig {
    pub crtc: u32,
    pub config_timestamp: u32,
    pub x: i32,
    pub y: i32,
    /// Mode id, 0 disables the CRTC
    pub mode: u32,
    pub rotation: u16,
    pub outputs: Vec<u32>,
}

impl CrtcConfig {
    /// Request that turns the CRTC off
    pub fn disable(crtc: u32, config_timestamp: u32) -> Self {
        Self {
            crtc,
            config_timestamp,
            x: 0,
            y: 0,
            mode: 0,
            rotation: ROTATE_0,
            outputs: Vec::new(),
        }
    }
}

/// Blocking RandR request interface
///
/// Implementations must be usable from the blocking thread pool; the
/// reconciler owns its client exclusively.
pub trait RandrClient: Send {
    /// Query outputs, CRTCs, modes and timestamps
    fn list_resources(&self) -> Result<Resources>;

    /// Query a single output
    fn output_info(&self, output: u32, config_timestamp: u32) -> Result<OutputInfo>;

    /// Query a single CRTC
    fn crtc_info(&self, crtc: u32, config_timestamp: u32) -> Result<CrtcInfo>;

    /// Configure a CRTC
    ///
    /// Fails with [`ProtocolError::StaleTimestamp`] when `config_timestamp`
    /// no longer matches the server.
    fn set_crtc_config(&self, config: &CrtcConfig) -> Result<()>;

    /// Read an output property by name
    ///
    /// Returns `None` when the output does not expose the property.
    /// ATOM-typed properties (like `ConnectorType`) come back as the
    /// atom's name bytes.
    fn output_property(&self, output: u32, name: &str) -> Result<Option<Vec<u8>>>;

    /// Create a user mode, returning its id
    fn create_mode(&self, mode: &ModeInfo) -> Result<u32>;

    /// Make a mode available on an output
    fn add_output_mode(&self, output: u32, mode: u32) -> Result<()>;

    /// Current primary output, if any
    fn output_primary(&self) -> Result<Option<u32>>;

    /// Mark an output as primary
    fn set_output_primary(&self, output: u32) -> Result<()>;
}

impl<T: RandrClient + Sync + ?Sized> RandrClient for std::sync::Arc<T> {
    fn list_resources(&self) -> Result<Resources> {
        (**self).list_resources()
    }

    fn output_info(&self, output: u32, config_timestamp: u32) -> Result<OutputInfo> {
        (**self).output_info(output, config_timestamp)
    }

    fn crtc_info(&self, crtc: u32, config_timestamp: u32) -> Result<CrtcInfo> {
        (**self).crtc_info(crtc, config_timestamp)
    }

    fn set_crtc_config(&self, config: &CrtcConfig) -> Result<()> {
        (**self).set_crtc_config(config)
    }

    fn output_property(&self, output: u32, name: &str) -> Result<Option<Vec<u8>>> {
        (**self).output_property(output, name)
    }

    fn create_mode(&self, mode: &ModeInfo) -> Result<u32> {
        (**self).create_mode(mode)
    }

    fn add_output_mode(&self, output: u32, mode: u32) -> Result<()> {
        (**self).add_output_mode(output, mode)
    }

    fn output_primary(&self) -> Result<Option<u32>> {
        (**self).output_primary()
    }

    fn set_output_primary(&self, output: u32) -> Result<()> {
        (**self).set_output_primary(output)
    }
}

/// Source of RandR change notifications
pub trait RandrEvents: Send {
    /// Block until the next event, returning its timestamp (0 if it has none)
    fn next_event(&mut self) -> Result<u32>;
}
