//! # lamco-hidpi-daemon
//!
//! HiDPI display reconciliation daemon for X11 sessions.
//!
//! Watches the display topology (RandR outputs, lid state, user preference)
//! and commits a layout where mixed-density displays render at matching
//! scales, either by halving high-density resolutions or by letting the
//! compositor scale while low-density displays are pixel-doubled.
//!
//! # Architecture
//!
//! ```text
//! lamco-hidpi-daemon
//!   ├─> Topology Monitor (RandR snapshot + lid, change detection)
//!   ├─> Scaling Planner (pure: DPI → scales, layout, global mode)
//!   │     └─> Layout Solver (adjacency graph → positions)
//!   ├─> Output Applier (direct CRTC config | NVIDIA metamode)
//!   ├─> Session Collaborators (gsettings, nvidia-settings, prompt, D-Bus)
//!   └─> Daemon (trigger sources → coalescing queue → reconciler)
//! ```
//!
//! # Data Flow
//!
//! **Cycle:** Trigger → Snapshot → Plan → Apply → Notify
//!
//! **Plan:** Snapshot + Stored layout + Policy → [`scaling::Plan`]

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Daemon configuration
pub mod config;

/// Display topology snapshots, DPI classification and lid sensing
pub mod topology;

/// Multi-monitor layout solving
///
/// Builds an adjacency graph from the recorded rectangles and places every
/// display so touching displays keep touching after a resize.
pub mod multimon;

/// Scale policy and plan computation
pub mod scaling;

/// GPU vendor probing and per-model profiles
pub mod gpu;

/// Committing plans to the hardware
pub mod apply;

/// RandR transport abstraction
pub mod protocol;

/// Persisted per-monitor layouts (`monitors.xml`)
pub mod store;

/// Desktop session collaborators
///
/// Preference storage, compositor scale, the NVIDIA settings CLI, the
/// primary display prompt and the D-Bus state service.
pub mod session;

/// Trigger sources, queue and reconciler
pub mod daemon;

/// Utility functions
pub mod utils;

pub use config::Config;
pub use daemon::{Daemon, Reconciler, Trigger};
