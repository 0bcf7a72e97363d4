//! X11 output source built on the RandR extension
//!
//! Outputs are read as RandR 1.5 monitors when the server supports them and
//! from CRTC/output resources otherwise. When nothing is connected the server
//! still has a root window; it is reported as the placeholder output ":0.0"
//! so the pool can recognise the "no real outputs" condition.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, error, info};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt, NotifyMask};
use x11rb::protocol::xproto::{Atom, ConnectionExt as XprotoExt, Window};
use x11rb::rust_connection::RustConnection;

use crate::constants::outputs;
use crate::output::{OutputEvent, OutputSource, OutputTracker};
use crate::types::{Output, Rect};

/// Monitors (and their names) need RandR 1.5
const MONITORS_MINOR_VERSION: u32 = 5;

pub struct RandrOutputSource {
    conn: Arc<RustConnection>,
    root: Window,
    use_monitors: bool,
    tracker: OutputTracker,
}

impl RandrOutputSource {
    /// Connect to `display` (or $DISPLAY), subscribe to RandR change
    /// notifications and read the initial output snapshot.
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display).context("Failed to connect to X11 display")?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        info!(
            screen = screen_num,
            width = screen.width_in_pixels,
            height = screen.height_in_pixels,
            "Connected to X11"
        );

        let version = conn
            .randr_query_version(1, MONITORS_MINOR_VERSION)
            .context("Failed to query RandR version")?
            .reply()
            .context("RandR extension not available")?;
        let use_monitors = version.major_version > 1
            || (version.major_version == 1 && version.minor_version >= MONITORS_MINOR_VERSION);
        info!(
            major = version.major_version,
            minor = version.minor_version,
            use_monitors,
            "RandR extension ready"
        );

        conn.randr_select_input(
            root,
            NotifyMask::SCREEN_CHANGE | NotifyMask::CRTC_CHANGE | NotifyMask::OUTPUT_CHANGE,
        )
        .context("Failed to select RandR notifications")?;
        conn.flush().context("Failed to flush X11 connection")?;

        let mut source = Self {
            conn: Arc::new(conn),
            root,
            use_monitors,
            tracker: OutputTracker::new(),
        };
        // The first snapshot seeds the tracker; the pool reads it through `outputs()`
        source.refresh()?;
        Ok(source)
    }

    /// Spawn a thread that blocks on the X11 event queue and sends a wake-up
    /// for every RandR notification. The receiver calls `refresh()`.
    pub fn spawn_listener(&self, wake: Sender<()>) -> thread::JoinHandle<()> {
        let conn = Arc::clone(&self.conn);
        thread::spawn(move || {
            info!("RandR listener started");
            loop {
                match conn.wait_for_event() {
                    Ok(Event::RandrScreenChangeNotify(_)) | Ok(Event::RandrNotify(_)) => {
                        if wake.send(()).is_err() {
                            debug!("Event loop gone, stopping RandR listener");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "X11 connection lost");
                        break;
                    }
                }
            }
        })
    }

    fn atom_name(&self, atom: Atom) -> Result<String> {
        let reply = self
            .conn
            .get_atom_name(atom)
            .context(format!("Failed to query name of atom {}", atom))?
            .reply()
            .context(format!("Failed to get name reply for atom {}", atom))?;
        Ok(String::from_utf8_lossy(&reply.name).into_owned())
    }

    /// Current size of the root window; it changes whenever the screen is resized
    fn query_root_geometry(&self) -> Result<Rect> {
        let reply = self
            .conn
            .get_geometry(self.root)
            .context("Failed to query root window geometry")?
            .reply()
            .context("Failed to get root window geometry reply")?;
        Ok(Rect::new(0, 0, reply.width as i32, reply.height as i32))
    }

    fn query_snapshot(&self) -> Result<(Vec<(String, Rect)>, Option<String>)> {
        let (current, primary) = if self.use_monitors {
            self.query_monitors()?
        } else {
            self.query_crtc_outputs()?
        };

        let root_geometry = if current.is_empty() {
            Some(self.query_root_geometry()?)
        } else {
            None
        };
        Ok(complete_snapshot(current, primary, root_geometry))
    }

    fn query_monitors(&self) -> Result<(Vec<(String, Rect)>, Option<String>)> {
        let reply = self
            .conn
            .randr_get_monitors(self.root, true)
            .context("Failed to query RandR monitors")?
            .reply()
            .context("Failed to get RandR monitors reply")?;

        let mut current = Vec::new();
        let mut primary = None;
        for monitor in &reply.monitors {
            let name = self.atom_name(monitor.name)?;
            let geometry = Rect::new(
                monitor.x as i32,
                monitor.y as i32,
                monitor.width as i32,
                monitor.height as i32,
            );
            if monitor.primary {
                primary = Some(name.clone());
            }
            current.push((name, geometry));
        }
        Ok((current, primary))
    }

    fn query_crtc_outputs(&self) -> Result<(Vec<(String, Rect)>, Option<String>)> {
        let resources = self
            .conn
            .randr_get_screen_resources(self.root)
            .context("Failed to query RandR screen resources")?
            .reply()
            .context("Failed to get RandR screen resources reply")?;
        let primary_output = self
            .conn
            .randr_get_output_primary(self.root)
            .context("Failed to query RandR primary output")?
            .reply()
            .context("Failed to get RandR primary output reply")?
            .output;

        let mut current = Vec::new();
        let mut primary = None;
        for output in &resources.outputs {
            let info = self
                .conn
                .randr_get_output_info(*output, resources.config_timestamp)
                .context(format!("Failed to query RandR output {}", output))?
                .reply()
                .context(format!("Failed to get RandR output {} reply", output))?;

            // Skip disconnected outputs and ones not driven by a CRTC
            if info.connection != randr::Connection::CONNECTED || info.crtc == 0 {
                continue;
            }

            let crtc = self
                .conn
                .randr_get_crtc_info(info.crtc, resources.config_timestamp)
                .context(format!("Failed to query CRTC {}", info.crtc))?
                .reply()
                .context(format!("Failed to get CRTC {} reply", info.crtc))?;
            if crtc.width == 0 || crtc.height == 0 {
                continue;
            }

            let name = String::from_utf8_lossy(&info.name).into_owned();
            if *output == primary_output {
                primary = Some(name.clone());
            }
            current.push((
                name,
                Rect::new(crtc.x as i32, crtc.y as i32, crtc.width as i32, crtc.height as i32),
            ));
        }
        Ok((current, primary))
    }
}

/// Fill in what the server left implicit: the placeholder output when nothing
/// is active (sized like the root window), or the first output as primary
/// when none is flagged.
fn complete_snapshot(
    mut current: Vec<(String, Rect)>,
    mut primary: Option<String>,
    root_geometry: Option<Rect>,
) -> (Vec<(String, Rect)>, Option<String>) {
    if current.is_empty() {
        let geometry = root_geometry.unwrap_or_default();
        debug!(geometry = %geometry, "No active outputs, reporting placeholder");
        current.push((outputs::X11_FAKE_OUTPUT_NAME.to_string(), geometry));
        primary = Some(outputs::X11_FAKE_OUTPUT_NAME.to_string());
    } else if primary.is_none() {
        primary = current.first().map(|(name, _)| name.clone());
    }
    (current, primary)
}

impl OutputSource for RandrOutputSource {
    fn outputs(&self) -> &[Output] {
        self.tracker.outputs()
    }

    fn primary(&self) -> Option<String> {
        self.tracker.primary()
    }

    fn refresh(&mut self) -> Result<Vec<OutputEvent>> {
        let (current, primary) = self.query_snapshot()?;
        let events = self.tracker.update(current, primary);
        if events.is_empty() {
            debug!("RandR notification without visible output change");
        } else {
            info!(count = events.len(), "Display configuration changed");
        }
        Ok(events)
    }
}
