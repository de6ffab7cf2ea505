//! Trigger sources
//!
//! - RandR screen change events, on a dedicated OS thread since the X
//!   connection blocks
//! - acpid lid button events over its Unix socket
//! - `gsettings monitor` on the preference key

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::trigger::{Trigger, TriggerQueue};
use crate::protocol::{ProtocolError, RandrEvents};

/// Default acpid event socket
pub const ACPID_SOCKET: &str = "/var/run/acpid.socket";

const EVENT_RETRY: Duration = Duration::from_millis(100);

/// Drops events whose timestamp does not advance
///
/// The server sends several notifications per change with the same
/// timestamp; events without one carry 0 and never pass.
#[derive(Debug, Default)]
pub struct EventDebouncer {
    last: u32,
}

impl EventDebouncer {
    pub fn accept(&mut self, timestamp: u32) -> bool {
        if timestamp > self.last {
            self.last = timestamp;
            true
        } else {
            false
        }
    }
}

/// Post a topology trigger for every new RandR change
///
/// Runs until the X connection is lost.
pub fn spawn_randr_listener(
    mut events: Box<dyn RandrEvents>,
    queue: Arc<TriggerQueue>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("randr-events".to_string())
        .spawn(move || {
            let mut debouncer = EventDebouncer::default();
            loop {
                match events.next_event() {
                    Ok(timestamp) if debouncer.accept(timestamp) => {
                        debug!("RandR change at {}", timestamp);
                        queue.post(Trigger::Topology);
                    }
                    Ok(_) => {}
                    Err(ProtocolError::Connection(e)) => {
                        warn!("X connection lost, stopping event listener: {}", e);
                        return;
                    }
                    Err(e) => {
                        debug!("Event read failed: {}", e);
                        std::thread::sleep(EVENT_RETRY);
                    }
                }
            }
        })
}

/// Trigger for one acpid event line, e.g. `button/lid LID0 open`
pub fn parse_acpi_event(line: &str) -> Option<Trigger> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "button/lid" {
        return None;
    }
    match fields.nth(1)? {
        "open" => Some(Trigger::Preference),
        "close" => Some(Trigger::Topology),
        _ => None,
    }
}

/// Forward lid events from acpid
///
/// A missing socket is not an error; RandR events still cover most lid
/// changes.
pub async fn listen_acpid(socket: PathBuf, queue: Arc<TriggerQueue>) {
    let stream = match UnixStream::connect(&socket).await {
        Ok(stream) => stream,
        Err(e) => {
            info!("acpid unavailable at {}: {}", socket.display(), e);
            return;
        }
    };
    info!("Listening for lid events on {}", socket.display());

    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(trigger) = parse_acpi_event(&line) {
                    debug!("acpid: {}", line.trim());
                    queue.post(trigger);
                }
            }
            Ok(None) => {
                info!("acpid closed its socket");
                return;
            }
            Err(e) => {
                warn!("acpid read failed: {}", e);
                return;
            }
        }
    }
}

/// Post a preference trigger whenever the stored mode changes
pub async fn watch_preferences(schema: String, queue: Arc<TriggerQueue>) {
    let mut child = match Command::new("gsettings")
        .args(["monitor", &schema, "mode"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to monitor {}: {}", schema, e);
            return;
        }
    };

    let Some(stdout) = child.stdout.take() else {
        warn!("gsettings monitor has no output");
        return;
    };
    info!("Watching {} for preference changes", schema);

    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("Preference changed: {}", line.trim());
        queue.post(Trigger::Preference);
    }

    match child.wait().await {
        Ok(status) => warn!("gsettings monitor exited: {}", status),
        Err(e) => warn!("gsettings monitor failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;

    struct ScriptedEvents(VecDeque<Result<u32, ProtocolError>>);

    impl RandrEvents for ScriptedEvents {
        fn next_event(&mut self) -> crate::protocol::Result<u32> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(ProtocolError::Connection("closed".to_string())))
        }
    }

    #[test]
    fn test_debouncer_requires_increasing_timestamps() {
        let mut debouncer = EventDebouncer::default();
        assert!(!debouncer.accept(0));
        assert!(debouncer.accept(10));
        assert!(!debouncer.accept(10));
        assert!(!debouncer.accept(9));
        assert!(debouncer.accept(11));
    }

    #[test]
    fn test_acpi_event_parsing() {
        assert_eq!(
            parse_acpi_event("button/lid LID0 open"),
            Some(Trigger::Preference)
        );
        assert_eq!(
            parse_acpi_event("button/lid LID close\n"),
            Some(Trigger::Topology)
        );
        assert_eq!(parse_acpi_event("button/power PBTN 00000080"), None);
        assert_eq!(parse_acpi_event("button/lid"), None);
        assert_eq!(parse_acpi_event(""), None);
    }

    #[test]
    fn test_randr_listener_collapses_duplicates() {
        let queue = Arc::new(TriggerQueue::new());
        let events = ScriptedEvents(VecDeque::from(vec![
            Ok(5),
            Ok(5),
            Ok(0),
            Err(ProtocolError::Request {
                request: "WaitForEvent",
                reason: "spurious".to_string(),
            }),
            Ok(7),
        ]));

        let handle = spawn_randr_listener(Box::new(events), Arc::clone(&queue)).unwrap();
        handle.join().unwrap();
        assert_eq!(queue.drain(), vec![Trigger::Topology]);
    }

    #[tokio::test]
    async fn test_acpid_lid_events_posted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acpid.socket");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"button/lid LID0 close\nac_adapter ACPI0003:00 00000080 00000001\n")
                .await
                .unwrap();
        });

        let queue = Arc::new(TriggerQueue::new());
        listen_acpid(path, Arc::clone(&queue)).await;
        server.await.unwrap();
        assert_eq!(queue.drain(), vec![Trigger::Topology]);
    }

    #[tokio::test]
    async fn test_missing_acpid_socket_returns() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(TriggerQueue::new());
        listen_acpid(dir.path().join("missing.socket"), Arc::clone(&queue)).await;
        assert!(queue.is_empty());
    }
}
