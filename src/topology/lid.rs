//! Laptop lid state

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Default ACPI lid directory
pub const DEFAULT_LID_ROOT: &str = "/proc/acpi/button/lid";

/// Reported lid position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LidState {
    /// Lid open, or no lid at all
    Open,
    /// Lid closed
    Closed,
}

impl LidState {
    /// Whether the lid is open
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// Source of the current lid state
#[cfg_attr(test, mockall::automock)]
pub trait LidSensor: Send {
    /// Read the lid state, failing safe to [`LidState::Open`]
    fn state(&self) -> LidState;
}

/// Reads `<root>/LID0/state`, or the first lid directory with a `state` file
#[derive(Debug, Clone)]
pub struct ProcLidSensor {
    root: PathBuf,
}

impl ProcLidSensor {
    /// Sensor rooted at `root` (normally [`DEFAULT_LID_ROOT`])
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn state_file(&self) -> Option<PathBuf> {
        let default = self.root.join("LID0").join("state");
        if default.is_file() {
            return Some(default);
        }

        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.root)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().join("state"))
            .filter(|path| path.is_file())
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }
}

impl Default for ProcLidSensor {
    fn default() -> Self {
        Self::new(DEFAULT_LID_ROOT)
    }
}

impl LidSensor for ProcLidSensor {
    fn state(&self) -> LidState {
        let Some(path) = self.state_file() else {
            return LidState::Open;
        };
        read_state(&path)
    }
}

fn read_state(path: &Path) -> LidState {
    match fs::read_to_string(path) {
        Ok(content) if !content.contains("open") => {
            trace!("Lid state from {}: closed", path.display());
            LidState::Closed
        }
        _ => LidState::Open,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_lid(root: &Path, name: &str, content: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("state"), content).unwrap();
    }

    #[test]
    fn test_missing_root_is_open() {
        let sensor = ProcLidSensor::new("/nonexistent/lid/root");
        assert_eq!(sensor.state(), LidState::Open);
    }

    #[test]
    fn test_lid0_closed() {
        let tmp = TempDir::new().unwrap();
        write_lid(tmp.path(), "LID0", "state:      closed\n");
        assert_eq!(ProcLidSensor::new(tmp.path()).state(), LidState::Closed);
    }

    #[test]
    fn test_lid0_open() {
        let tmp = TempDir::new().unwrap();
        write_lid(tmp.path(), "LID0", "state:      open\n");
        assert_eq!(ProcLidSensor::new(tmp.path()).state(), LidState::Open);
    }

    #[test]
    fn test_fallback_lid_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("EMPTY")).unwrap();
        write_lid(tmp.path(), "LID", "state:      closed\n");
        assert_eq!(ProcLidSensor::new(tmp.path()).state(), LidState::Closed);
    }
}
