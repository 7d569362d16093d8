//! evalport-host - demo host process for the evalport REPL server
//!
//! Owns a Lua state with a few live `host.*` globals and drives the REPL
//! server's `tick` on a fixed cadence, the way a game or service frame loop
//! would.
//!
//! Usage:
//!   evalport-host                         # listen on 127.0.0.1:8172
//!   evalport-host --port 9000             # custom port
//!   evalport-host --config repl.toml      # settings from a file
//!
//! Connect with `evalport-console` and try `host.ticks()`.

use clap::Parser as ClapParser;
use evalport::mlua::Lua;
use evalport::{LuaContext, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

mod host_api;

use host_api::HostState;

#[derive(ClapParser)]
#[command(name = "evalport-host")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Demo host process exposing its Lua state over TCP", long_about = None)]
struct Args {
    /// TOML configuration file (flags below override its values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on (127.0.0.1 only)
    #[arg(long)]
    port: Option<u16>,

    /// Accept timeout in seconds; 0 keeps every tick non-blocking
    #[arg(long)]
    timeout: Option<f64>,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
}

fn main() {
    let args = Args::parse();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evalport=info,evalport_host=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let state = HostState::new();
    let lua = Lua::new();
    if let Err(e) = host_api::install(&lua, &state) {
        eprintln!("Error installing host globals: {}", e);
        std::process::exit(1);
    }

    if !evalport::start_with_context(config, LuaContext::from_lua(lua)) {
        eprintln!("Error: REPL server failed to start (see log)");
        std::process::exit(1);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    install_shutdown_handler(&shutdown);

    let interval = Duration::from_millis(args.tick_ms.max(1));
    info!("Host running, ticking every {:?}", interval);

    while !shutdown.load(Ordering::Relaxed) {
        state.advance();
        evalport::tick();
        std::thread::sleep(interval);
    }

    evalport::stop();
    info!("Host exiting after {} ticks", state.ticks.load(Ordering::Relaxed));
}

/// Config file (if any) merged over defaults, then flag overrides
fn resolve_config(args: &Args) -> Result<ServerConfig, evalport::ServerError> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }

    Ok(config)
}

#[cfg(unix)]
fn install_shutdown_handler(flag: &Arc<AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};

    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(flag)) {
            eprintln!("Warning: cannot handle signal {}: {}", signal, e);
        }
    }
}

#[cfg(not(unix))]
fn install_shutdown_handler(_flag: &Arc<AtomicBool>) {
    // Signal handling not supported on non-Unix platforms; the process
    // runs until killed.
}
