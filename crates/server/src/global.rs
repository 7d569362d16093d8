//! Process-wide REPL server
//!
//! One `ReplServer<LuaContext>` per process, created by `start` and
//! destroyed by `stop`. These are the functions a host wires into its frame
//! loop:
//!
//! ```rust,ignore
//! use evalport::ServerConfig;
//!
//! if !evalport::start(ServerConfig::default()) {
//!     // port in use; the failure has been logged
//! }
//! loop {
//!     evalport::tick();
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! ```
//!
//! Access is serialized by a mutex. Code evaluated during `tick` must not
//! call back into these functions: the lock is held for the whole tick.

use crate::config::ServerConfig;
use crate::lua::LuaContext;
use crate::server::ReplServer;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

static SERVER: Mutex<Option<ReplServer<LuaContext>>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<ReplServer<LuaContext>>> {
    // A panic while holding the lock leaves the slot usable
    SERVER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start the server with a fresh Lua state
///
/// Returns `true` if the server is running afterwards. Calling it while
/// already running returns `true` without rebinding.
pub fn start(config: ServerConfig) -> bool {
    start_with_context(config, LuaContext::new())
}

/// Start the server bound to the host's Lua state
///
/// If the server is already running, `context` is dropped and the running
/// server is left untouched.
pub fn start_with_context(config: ServerConfig, context: LuaContext) -> bool {
    let mut slot = slot();
    if let Some(server) = slot.as_ref()
        && server.is_running()
    {
        return true;
    }

    let mut server = ReplServer::new(config, context);
    match server.start() {
        Ok(()) => {
            *slot = Some(server);
            true
        }
        Err(_) => false,
    }
}

/// Close the client and listener; no-op when not running
pub fn stop() {
    // Drop outside the lock so socket teardown never runs under it
    let server = slot().take();
    if let Some(mut server) = server {
        server.stop();
    }
}

pub fn is_running() -> bool {
    slot().as_ref().is_some_and(ReplServer::is_running)
}

/// One non-blocking step; no-op when not running
pub fn tick() {
    if let Some(server) = slot().as_mut() {
        server.tick();
    }
}

/// Address the server is bound to, if running
pub fn local_addr() -> Option<SocketAddr> {
    slot().as_ref().and_then(ReplServer::local_addr)
}

/// Run `f` against the shared evaluation context, if running
pub fn with_context<R>(f: impl FnOnce(&LuaContext) -> R) -> Option<R> {
    slot().as_ref().map(|server| f(server.context()))
}
