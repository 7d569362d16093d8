//! evalport: a tick-driven remote evaluation server
//!
//! Lets an external console inspect and change a running host process by
//! evaluating Lua against the host's own interpreter state.
//!
//! Key design principles:
//! - Single client, single thread: the host drives `tick` on its own cadence
//! - Nothing blocks: accept and read are non-blocking std sockets
//! - Nothing escapes: compile errors, runtime faults and panics all become
//!   `eval_result` frames instead of errors in the host

pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod lua;
pub mod protocol;
pub mod server;
pub mod transport;

pub use config::{DEFAULT_GREETING, DEFAULT_PORT, ServerConfig};
pub use engine::{CompileMode, Engine, EvalContext, Evaluation};
pub use error::ServerError;
pub use lua::LuaContext;
pub use protocol::{ClientMessage, ServerMessage};
pub use server::ReplServer;

// Process-wide lifecycle API
pub use global::{is_running, local_addr, start, start_with_context, stop, tick, with_context};

// Re-exported so hosts can build a shared state without a direct dependency
pub use mlua;
