//! x11rb-backed RandR transport

use tracing::{debug, trace};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt};
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::CURRENT_TIME;

use super::{
    CrtcConfig, CrtcInfo, ModeInfo, OutputInfo, ProtocolError, RandrClient, RandrEvents,
    Resources, Result,
};

/// Minimum RandR version for primary output support
const RANDR_MAJOR: u32 = 1;
const RANDR_MINOR: u32 = 3;

/// Length in 32-bit units requested for property reads (covers 256-byte EDIDs)
const PROPERTY_LENGTH: u32 = 128;

fn request_error(request: &'static str, e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Request {
        request,
        reason: e.to_string(),
    }
}

fn connect(display: Option<&str>) -> Result<(RustConnection, Window)> {
    let (conn, screen_num) =
        RustConnection::connect(display).map_err(|e| ProtocolError::Connection(e.to_string()))?;
    let root = conn.setup().roots[screen_num].root;

    let version = conn
        .randr_query_version(RANDR_MAJOR, RANDR_MINOR)
        .map_err(|e| request_error("QueryVersion", e))?
        .reply()
        .map_err(|e| request_error("QueryVersion", e))?;
    debug!(
        "RandR {}.{} on root window {:#x}",
        version.major_version, version.minor_version, root
    );

    Ok((conn, root))
}

/// Request client for RandR
pub struct X11Randr {
    conn: RustConnection,
    root: Window,
}

impl X11Randr {
    /// Connect to `display` (or `$DISPLAY` when `None`)
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, root) = connect(display)?;
        Ok(Self { conn, root })
    }

    fn atom(&self, name: &str) -> Result<u32> {
        let reply = self
            .conn
            .intern_atom(true, name.as_bytes())
            .map_err(|e| request_error("InternAtom", e))?
            .reply()
            .map_err(|e| request_error("InternAtom", e))?;
        Ok(reply.atom)
    }

    fn atom_name(&self, atom: u32) -> Result<Vec<u8>> {
        let reply = self
            .conn
            .get_atom_name(atom)
            .map_err(|e| request_error("GetAtomName", e))?
            .reply()
            .map_err(|e| request_error("GetAtomName", e))?;
        Ok(reply.name)
    }
}

impl RandrClient for X11Randr {
    fn list_resources(&self) -> Result<Resources> {
        let reply = self
            .conn
            .randr_get_screen_resources(self.root)
            .map_err(|e| request_error("GetScreenResources", e))?
            .reply()
            .map_err(|e| request_error("GetScreenResources", e))?;

        // Mode names are packed back to back in `names`
        let mut offset = 0usize;
        let modes = reply
            .modes
            .iter()
            .map(|m| {
                let len = m.name_len as usize;
                let name = reply
                    .names
                    .get(offset..offset + len)
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default();
                offset += len;
                ModeInfo {
                    id: m.id,
                    width: m.width,
                    height: m.height,
                    dot_clock: m.dot_clock,
                    hsync_start: m.hsync_start,
                    hsync_end: m.hsync_end,
                    htotal: m.htotal,
                    hskew: m.hskew,
                    vsync_start: m.vsync_start,
                    vsync_end: m.vsync_end,
                    vtotal: m.vtotal,
                    flags: u32::from(m.mode_flags),
                    name,
                }
            })
            .collect();

        trace!(
            "Screen resources: {} outputs, {} crtcs, config timestamp {}",
            reply.outputs.len(),
            reply.crtcs.len(),
            reply.config_timestamp
        );

        Ok(Resources {
            timestamp: reply.timestamp,
            config_timestamp: reply.config_timestamp,
            outputs: reply.outputs,
            crtcs: reply.crtcs,
            modes,
        })
    }

    fn output_info(&self, output: u32, config_timestamp: u32) -> Result<OutputInfo> {
        let reply = self
            .conn
            .randr_get_output_info(output, config_timestamp)
            .map_err(|e| request_error("GetOutputInfo", e))?
            .reply()
            .map_err(|e| request_error("GetOutputInfo", e))?;

        Ok(OutputInfo {
            name: String::from_utf8_lossy(&reply.name).into_owned(),
            crtc: reply.crtc,
            mm_width: reply.mm_width,
            mm_height: reply.mm_height,
            connected: reply.connection == randr::Connection::CONNECTED,
            modes: reply.modes,
        })
    }

    fn crtc_info(&self, crtc: u32, config_timestamp: u32) -> Result<CrtcInfo> {
        let reply = self
            .conn
            .randr_get_crtc_info(crtc, config_timestamp)
            .map_err(|e| request_error("GetCrtcInfo", e))?
            .reply()
            .map_err(|e| request_error("GetCrtcInfo", e))?;

        Ok(CrtcInfo {
            x: i32::from(reply.x),
            y: i32::from(reply.y),
            width: u32::from(reply.width),
            height: u32::from(reply.height),
            mode: reply.mode,
            rotation: u16::from(reply.rotation),
            outputs: reply.outputs,
        })
    }

    fn set_crtc_config(&self, config: &CrtcConfig) -> Result<()> {
        let x = i16::try_from(config.x).map_err(|e| request_error("SetCrtcConfig", e))?;
        let y = i16::try_from(config.y).map_err(|e| request_error("SetCrtcConfig", e))?;

        let reply = self
            .conn
            .randr_set_crtc_config(
                config.crtc,
                CURRENT_TIME,
                config.config_timestamp,
                x,
                y,
                config.mode,
                randr::Rotation::from(config.rotation),
                &config.outputs,
            )
            .map_err(|e| request_error("SetCrtcConfig", e))?
            .reply()
            .map_err(|e| request_error("SetCrtcConfig", e))?;

        match reply.status {
            randr::SetConfig::SUCCESS => Ok(()),
            randr::SetConfig::INVALID_CONFIG_TIME | randr::SetConfig::INVALID_TIME => {
                Err(ProtocolError::StaleTimestamp(config.crtc))
            }
            _ => Err(ProtocolError::ConfigRejected(config.crtc)),
        }
    }

    fn output_property(&self, output: u32, name: &str) -> Result<Option<Vec<u8>>> {
        let atom = self.atom(name)?;
        if atom == 0 {
            return Ok(None);
        }

        let listed = self
            .conn
            .randr_list_output_properties(output)
            .map_err(|e| request_error("ListOutputProperties", e))?
            .reply()
            .map_err(|e| request_error("ListOutputProperties", e))?;
        if !listed.atoms.contains(&atom) {
            return Ok(None);
        }

        let reply = self
            .conn
            .randr_get_output_property(
                output,
                atom,
                AtomEnum::ANY,
                0,
                PROPERTY_LENGTH,
                false,
                false,
            )
            .map_err(|e| request_error("GetOutputProperty", e))?
            .reply()
            .map_err(|e| request_error("GetOutputProperty", e))?;

        if reply.type_ == u32::from(AtomEnum::ATOM) && reply.data.len() >= 4 {
            let value = u32::from_ne_bytes([
                reply.data[0],
                reply.data[1],
                reply.data[2],
                reply.data[3],
            ]);
            return self.atom_name(value).map(Some);
        }

        Ok(Some(reply.data))
    }

    fn create_mode(&self, mode: &ModeInfo) -> Result<u32> {
        let info = randr::ModeInfo {
            id: 0,
            width: mode.width,
            height: mode.height,
            dot_clock: mode.dot_clock,
            hsync_start: mode.hsync_start,
            hsync_end: mode.hsync_end,
            htotal: mode.htotal,
            hskew: mode.hskew,
            vsync_start: mode.vsync_start,
            vsync_end: mode.vsync_end,
            vtotal: mode.vtotal,
            name_len: mode.name.len() as u16,
            mode_flags: randr::ModeFlag::from(mode.flags),
        };

        let reply = self
            .conn
            .randr_create_mode(self.root, info, mode.name.as_bytes())
            .map_err(|e| request_error("CreateMode", e))?
            .reply()
            .map_err(|e| request_error("CreateMode", e))?;
        Ok(reply.mode)
    }

    fn add_output_mode(&self, output: u32, mode: u32) -> Result<()> {
        self.conn
            .randr_add_output_mode(output, mode)
            .map_err(|e| request_error("AddOutputMode", e))?
            .check()
            .map_err(|e| request_error("AddOutputMode", e))
    }

    fn output_primary(&self) -> Result<Option<u32>> {
        let reply = self
            .conn
            .randr_get_output_primary(self.root)
            .map_err(|e| request_error("GetOutputPrimary", e))?
            .reply()
            .map_err(|e| request_error("GetOutputPrimary", e))?;
        Ok((reply.output != 0).then_some(reply.output))
    }

    fn set_output_primary(&self, output: u32) -> Result<()> {
        self.conn
            .randr_set_output_primary(self.root, output)
            .map_err(|e| request_error("SetOutputPrimary", e))?
            .check()
            .map_err(|e| request_error("SetOutputPrimary", e))
    }
}

/// Dedicated connection subscribed to screen change notifications
pub struct X11Events {
    conn: RustConnection,
}

impl X11Events {
    /// Connect and select `RRScreenChangeNotify` on the root window
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, root) = connect(display)?;
        conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE)
            .map_err(|e| request_error("SelectInput", e))?
            .check()
            .map_err(|e| request_error("SelectInput", e))?;
        Ok(Self { conn })
    }
}

impl RandrEvents for X11Events {
    fn next_event(&mut self) -> Result<u32> {
        let event = self
            .conn
            .wait_for_event()
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;

        let timestamp = match event {
            Event::RandrScreenChangeNotify(ev) => ev.timestamp,
            _ => 0,
        };
        Ok(timestamp)
    }
}
