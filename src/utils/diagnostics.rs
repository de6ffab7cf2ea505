//! System Diagnostics
//!
//! Startup logging of the host and the desktop session the daemon runs in.

use sysinfo::System;
use tracing::info;

/// System information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Operating system name (e.g., "Linux", "Pop!_OS")
    pub os_name: String,
    /// Operating system version string
    pub os_version: String,

    /// Kernel version string
    pub kernel_version: String,

    /// Number of logical CPU cores
    pub cpu_count: usize,

    /// Total system memory in megabytes
    pub total_memory_mb: u64,

    /// System hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Gather system information
    pub fn gather() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        Self {
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            cpu_count: sys.cpus().len(),
            total_memory_mb: sys.total_memory() / 1024 / 1024,
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Log system information
    pub fn log(&self) {
        info!("=== System Information ===");
        info!("  OS: {} {}", self.os_name, self.os_version);
        info!("  Kernel: {}", self.kernel_version);
        info!("  Hostname: {}", self.hostname);
        info!("  CPUs: {}", self.cpu_count);
        info!("  Memory: {} MB", self.total_memory_mb);
    }
}

/// Desktop session the daemon was started in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// `XDG_SESSION_TYPE`, e.g. "x11"
    pub session_type: Option<String>,
    /// `XDG_CURRENT_DESKTOP`, e.g. "pop:GNOME"
    pub desktop: Option<String>,
    /// `DISPLAY`
    pub display: Option<String>,
}

impl SessionInfo {
    /// Read the session from the environment
    pub fn detect() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            session_type: non_empty("XDG_SESSION_TYPE"),
            desktop: non_empty("XDG_CURRENT_DESKTOP"),
            display: non_empty("DISPLAY"),
        }
    }

    /// An X11 session, or one that at least has an X display
    pub fn is_x11(&self) -> bool {
        match self.session_type.as_deref() {
            Some(kind) => kind == "x11",
            None => self.display.is_some(),
        }
    }
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics() {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║          Startup Diagnostics                               ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    SystemInfo::gather().log();

    let session = SessionInfo::detect();
    info!("=== Session ===");
    info!(
        "  Type: {}",
        session.session_type.as_deref().unwrap_or("unknown")
    );
    info!(
        "  Desktop: {}",
        session.desktop.as_deref().unwrap_or("unknown")
    );
    info!("  DISPLAY: {}", session.display.as_deref().unwrap_or("unset"));
    if !session.is_x11() {
        tracing::warn!("Not an X11 session; RandR reconfiguration will likely fail");
    }

    info!("=== Daemon ===");
    info!("  Version: {}", build_stamp());
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");
}

/// Version, commit and build time stamped by the build script
pub fn build_stamp() -> String {
    format!(
        "{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("HIDPI_COMMIT"),
        env!("HIDPI_BUILT")
    )
}
