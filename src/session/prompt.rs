//! External confirmation dialog

use tracing::info;

use super::{run, PrimaryPrompt, PromptResponse, Result, SessionError};

/// GTK response code for OK
const RESPONSE_OK: i32 = -5;

/// Runs a dialog binary that prints a GTK response code
#[derive(Debug, Clone)]
pub struct DialogPrompt {
    binary: String,
}

impl DialogPrompt {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Map the dialog's output to a response
pub(crate) fn parse_response(output: &str) -> Result<PromptResponse> {
    let code: i32 = output.trim().parse().map_err(|_| SessionError::Parse {
        what: "dialog response",
        value: output.trim().to_string(),
    })?;

    Ok(if code == RESPONSE_OK {
        PromptResponse::AcceptHighDensity
    } else {
        PromptResponse::ForceLowDensity
    })
}

impl PrimaryPrompt for DialogPrompt {
    fn ask(&mut self) -> Result<PromptResponse> {
        info!("Asking the user how to handle the low-density primary display");
        let response = parse_response(&run(&self.binary, &[])?)?;
        info!("Prompt answered: {:?}", response);
        Ok(response)
    }
}
