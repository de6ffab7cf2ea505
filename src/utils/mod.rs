//! Utility Functions and Diagnostics
//!
//! Startup diagnostics and user-friendly error formatting.
//!
//! ## Diagnostics
//!
//! The [`diagnostics`] module logs the runtime environment once at startup:
//!
//! ```rust
//! use lamco_hidpi_daemon::utils::{SessionInfo, SystemInfo};
//!
//! SystemInfo::gather().log();  // OS, kernel, CPU count, memory
//!
//! let session = SessionInfo::detect();
//! if !session.is_x11() {
//!     println!("RandR needs an X11 session");
//! }
//! ```
//!
//! ## Error Formatting
//!
//! The [`errors`] module renders fatal startup errors:
//!
//! ```rust
//! use lamco_hidpi_daemon::utils::format_user_error;
//!
//! let e = anyhow::anyhow!("X11 connection failed: no display");
//! eprintln!("{}", format_user_error(&e));
//! ```
//!
//! Error categories with context-aware help:
//! - X connection errors → session type, `DISPLAY`, autostart timing
//! - RandR errors → server version, transient races, screen limits
//! - D-Bus errors → session bus, bus name ownership
//! - Config errors → syntax, accepted values

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{build_stamp, log_startup_diagnostics, SessionInfo, SystemInfo};
pub use errors::format_user_error;
