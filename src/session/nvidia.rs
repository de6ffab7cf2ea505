//! `nvidia-settings` metamode client

use tracing::{debug, info};

use super::{run, MetamodeClient, Result};

/// Drives the NVIDIA driver through its settings CLI
#[derive(Debug, Clone)]
pub struct NvidiaSettings {
    binary: String,
}

impl NvidiaSettings {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl MetamodeClient for NvidiaSettings {
    fn current_metamode(&self) -> Result<String> {
        run(&self.binary, &["-q", "CurrentMetaMode"])
    }

    fn dpys(&self) -> Result<String> {
        run(&self.binary, &["-q", "dpys"])
    }

    fn assign_metamode(&mut self, metamode: &str) -> Result<()> {
        info!("Assigning metamode");
        debug!("CurrentMetaMode={}", metamode);
        let assignment = format!("CurrentMetaMode={}", metamode);
        run(&self.binary, &["--assign", &assignment]).map(|_| ())
    }
}
