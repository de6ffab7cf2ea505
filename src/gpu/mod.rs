//! GPU Detection
//!
//! Identifies the graphics vendor and hardware model and maps them to a
//! [`VendorPath`]:
//!
//! - [`VendorPath::Native`]: direct CRTC mode setting. High-density displays
//!   run at half resolution when scales are matched ("forced"), or at native
//!   resolution with the compositor scaling.
//! - [`VendorPath::PixelDoubling`]: the proprietary NVIDIA driver renders
//!   low-density displays at twice their size through a metamode viewport,
//!   and the compositor runs at scale 2.
//!
//! Model profiles add per-model vendor hints and extra panel modes.

mod capabilities;
mod probing;
pub mod profiles;

pub use capabilities::{GpuCapabilities, GpuVendor, VendorPath};
pub use probing::{detect_model, find_in_path, nvidia_module_loaded, probe_gpu, select_vendor};
pub use profiles::{profile_for, ModelProfile, Modeline, ModelineError, Quirk};
