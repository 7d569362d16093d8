//! Host globals exposed to remote evaluation
//!
//! Installs a `host` table in the shared Lua state:
//!
//! | Field | Description |
//! |-------|-------------|
//! | `host.name` | Process name |
//! | `host.pid` | Process id |
//! | `host.ticks()` | Frames driven so far |
//! | `host.uptime()` | Seconds since start |
//! | `host.log(msg)` | Write `msg` to the host's log |

use evalport::mlua::{self, Lua};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Live host state shared with Lua callbacks
#[derive(Clone)]
pub struct HostState {
    pub started: Instant,
    pub ticks: Arc<AtomicU64>,
}

impl HostState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the frame counter; returns the new count
    pub fn advance(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn install(lua: &Lua, state: &HostState) -> mlua::Result<()> {
    let host = lua.create_table()?;
    host.set("name", env!("CARGO_PKG_NAME"))?;
    host.set("pid", std::process::id())?;

    let ticks = Arc::clone(&state.ticks);
    host.set(
        "ticks",
        lua.create_function(move |_, ()| Ok(ticks.load(Ordering::Relaxed)))?,
    )?;

    let started = state.started;
    host.set(
        "uptime",
        lua.create_function(move |_, ()| Ok(started.elapsed().as_secs_f64()))?,
    )?;

    host.set(
        "log",
        lua.create_function(|_, message: String| {
            info!("[lua] {}", message);
            Ok(())
        })?,
    )?;

    lua.globals().set("host", host)
}
